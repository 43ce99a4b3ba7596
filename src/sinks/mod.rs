use crate::errors::Result;
use crate::models::table::Table;
use async_trait::async_trait;

pub mod csv;
pub mod sqlite;

pub use self::csv::CsvSink;
pub use self::sqlite::SqliteSink;

/// Durable destination for an extracted table.
///
/// Persistence uses replace semantics: after `replace_all` the destination's
/// full contents equal the supplied table, which keeps the engine's
/// incremental re-persist idempotent. `load_all` hands back the durable copy
/// so a resumed run can seed its accumulator with the already-persisted
/// prefix.
#[async_trait]
pub trait Sink {
    async fn replace_all(&mut self, name: &str, table: &Table) -> Result<()>;

    async fn load_all(&mut self, name: &str) -> Result<Option<Table>>;
}
