//! FILENAME: persistence/src/error.rs
//! PURPOSE: Errors raised while saving or loading a workbook (§4.9, §6).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("malformed workbook document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    #[error("sheet not found: {0}")]
    SheetNotFound(String),
}
