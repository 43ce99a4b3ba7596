use chrono::{DateTime, Utc};
use serde::Serialize;

/// Extracted table: one header shared by every row, rows in document order.
/// Cells are raw text; numeric/locale parsing is a downstream concern.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(header: Vec<String>) -> Self {
        Self {
            header,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { header, rows }
    }

    /// 表头列数
    pub fn width(&self) -> usize {
        self.header.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row. Callers are responsible for checking the cell count
    /// against `width()` first.
    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }
}

/// 1-based page index, monotonically increasing. The total page count is
/// unknown in advance and discovered by exhaustion of the "next" control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageCursor(u32);

impl PageCursor {
    pub fn first() -> Self {
        PageCursor(1)
    }

    pub fn index(&self) -> u32 {
        self.0
    }

    pub fn advance(&mut self) {
        self.0 += 1;
    }
}

/// Terminal status of a run. A fatally failed run is reported as the `Err`
/// arm of `extract` instead of a third variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtractionStatus {
    /// Table exhausted, checkpoint deleted.
    Complete,
    /// Navigation failed or the run was stopped; checkpoint left intact.
    Partial,
}

/// Outcome of one extraction run: the accumulated table plus run metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub job: String,
    pub started_at: DateTime<Utc>,
    pub pages_visited: u32,
    pub last_page: u32,
    pub skipped_rows: usize,
    pub status: ExtractionStatus,
    pub table: Table,
}
