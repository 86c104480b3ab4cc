use std::path::PathBuf;

use thiserror::Error;

/// Problems with the input file itself. Any of these aborts the run before a
/// single row is processed.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unsupported file type '{0}'. Allowed: .xlsx, .xls, .csv")]
    UnsupportedExtension(String),

    #[error("Could not read spreadsheet: {0}")]
    UnreadableWorkbook(String),

    #[error("No data rows found in spreadsheet")]
    EmptyDataset,

    #[error("No file was uploaded")]
    MissingFile,

    #[error("File is too large ({size} bytes, limit {limit} bytes)")]
    FileTooLarge { size: usize, limit: usize },
}
