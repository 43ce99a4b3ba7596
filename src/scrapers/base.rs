use crate::errors::Result;
use async_trait::async_trait;

/// Capability providing the current page of a paged table.
///
/// Implementations own whatever session state is needed to observe the page
/// (HTTP client, browser handle); the extraction engine only ever sees header
/// text and row text.
#[async_trait]
pub trait PageSource {
    /// Column names of the table, read from the first page visited in a run.
    /// A missing or malformed header is a structural fault and fatal.
    async fn header(&mut self) -> Result<Vec<String>>;

    /// Body rows of the current page as raw text cells, in document order.
    async fn rows(&mut self) -> Result<Vec<Vec<String>>>;
}

/// Capability that advances a [`PageSource`] to the next page.
#[async_trait]
pub trait PaginationDriver {
    /// True iff a "next" control is present and enabled. Absence and a
    /// disabled control both signal table exhaustion.
    async fn has_next(&mut self) -> bool;

    /// Navigate to the next page and wait for its content to become
    /// available. Performs no internal retries: a single failure terminates
    /// the run as partial, and recovery happens via checkpoint resume on the
    /// next invocation.
    async fn advance(&mut self) -> Result<()>;
}
