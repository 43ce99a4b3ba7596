use thiserror::Error;
use std::num::ParseIntError;

#[derive(Error, Debug)]
pub enum NepseError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Database error: {0}")]
    DbError(#[from] rusqlite::Error),

    #[error("Parse int error: {0}")]
    ParseIntError(#[from] ParseIntError),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Source structure error: {0}")]
    SourceStructure(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, NepseError>;

// 用于从字符串创建错误
impl From<String> for NepseError {
    fn from(s: String) -> Self {
        NepseError::Unknown(s)
    }
}

// 用于从&str创建错误
impl From<&str> for NepseError {
    fn from(s: &str) -> Self {
        NepseError::Unknown(s.to_string())
    }
}
