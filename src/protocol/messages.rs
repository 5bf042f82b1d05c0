//! Spreadsheet row model and the JSON payload published for each row

use crate::error::PublisherError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Typed value of a single spreadsheet cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// Text rendering used for every payload field.
///
/// Integral floats print without a fraction: spreadsheets store `101` as
/// `101.0`, and the published id must read `"101"`.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 9.0e15 => {
                write!(f, "{}", *x as i64)
            }
            CellValue::Float(x) => write!(f, "{x}"),
            CellValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

/// One spreadsheet row
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub hotel_name: String,
    pub id_number: CellValue,
    pub sanitation: CellValue,
    pub image_name: String,
    /// Value of the `Image` column; only its file name is used
    pub image_path: String,
}

impl Record {
    /// Where the row's image lives: `images_dir` joined with the base name of
    /// the `Image` cell.
    pub fn resolve_image_path(&self, images_dir: &Path) -> PathBuf {
        match Path::new(&self.image_path).file_name() {
            Some(name) => images_dir.join(name),
            None => images_dir.join(&self.image_path),
        }
    }
}

/// JSON message published for one record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payload {
    pub hotel_name: String,
    pub id_number: String,
    pub sanitation: String,
    pub image_name: String,
    /// Standard base64 of the image file
    pub image_data: String,
}

impl Payload {
    /// Assemble a payload from a record and its already encoded image
    pub fn from_record(record: &Record, image_data: String) -> Self {
        Self {
            hotel_name: record.hotel_name.clone(),
            id_number: record.id_number.to_string(),
            sanitation: record.sanitation.to_string(),
            image_name: record.image_name.clone(),
            image_data,
        }
    }

    /// Read the record's image from `images_dir` and build the payload
    pub fn build(record: &Record, images_dir: &Path) -> Result<Self, PublisherError> {
        let image_data = encode_image(&record.resolve_image_path(images_dir))?;
        Ok(Self::from_record(record, image_data))
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, PublisherError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Read a binary file and return its standard base64 encoding
pub fn encode_image(path: &Path) -> Result<String, PublisherError> {
    let bytes = std::fs::read(path).map_err(|source| PublisherError::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(STANDARD.encode(bytes))
}
