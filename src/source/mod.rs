//! Record sources
//!
//! The pipeline reads its rows through [`LoadRows`] so tests can feed records
//! without a spreadsheet on disk. [`SpreadsheetLoader`] is the production
//! implementation.

use crate::protocol::Record;
use std::path::Path;
use thiserror::Error;

pub mod spreadsheet;

pub use spreadsheet::SpreadsheetLoader;

/// Column holding the hotel name
pub const COLUMN_HOTEL_NAME: &str = "Hotel Name";
/// Column holding the record identifier
pub const COLUMN_ID_NUMBER: &str = "ID Number";
/// Column holding the sanitation status
pub const COLUMN_SANITATION: &str = "Sanitation";
/// Column holding the image display name
pub const COLUMN_IMAGE_NAME: &str = "ImageName";
/// Column holding the image file path
pub const COLUMN_IMAGE: &str = "Image";

/// All columns a sheet must provide
pub const REQUIRED_COLUMNS: [&str; 5] = [
    COLUMN_HOTEL_NAME,
    COLUMN_ID_NUMBER,
    COLUMN_SANITATION,
    COLUMN_IMAGE_NAME,
    COLUMN_IMAGE,
];

/// Loads the ordered rows of a tabular file
pub trait LoadRows: Send + Sync {
    fn load_rows(&self, path: &Path) -> Result<Vec<Record>, SourceError>;
}

/// Record loading errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to open spreadsheet: {0}")]
    Open(#[from] calamine::Error),
    #[error("Spreadsheet has no worksheet")]
    NoWorksheet,
    #[error("Worksheet has no header row")]
    EmptySheet,
    #[error("Required column not found: {0}")]
    MissingColumn(String),
    #[error("Row {row}: {message}")]
    InvalidRecord { row: usize, message: String },
}
