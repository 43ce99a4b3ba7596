// 公开导出的模块，供外部使用
pub mod checkpoint;
pub mod errors;
pub mod models;
pub mod scrapers;
pub mod services;
pub mod sinks;

// 为了支持主程序，暂时保持这些模块公开
// 但在库使用场景中，这些应该是内部模块
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod util;

// 重新导出常用类型，方便使用
pub use checkpoint::{CheckpointStore, FileCheckpointStore};
pub use errors::{NepseError, Result};
pub use models::table::{ExtractionResult, ExtractionStatus, Table};
pub use services::extraction::ExtractionEngine;
pub use sinks::{CsvSink, Sink, SqliteSink};
