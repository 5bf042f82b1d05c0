//! Spreadsheet reader backed by calamine
//!
//! Reads the first worksheet, treats its first row as the header and maps the
//! required columns by trimmed name. Works for xlsx, xlsm, xls and ods files.

use super::{
    LoadRows, SourceError, COLUMN_HOTEL_NAME, COLUMN_ID_NUMBER, COLUMN_IMAGE, COLUMN_IMAGE_NAME,
    COLUMN_SANITATION, REQUIRED_COLUMNS,
};
use crate::protocol::{CellValue, Record};
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;
use tracing::{debug, info};

/// Loads records from the first worksheet of a spreadsheet file
#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadsheetLoader;

impl SpreadsheetLoader {
    pub fn new() -> Self {
        Self
    }
}

impl LoadRows for SpreadsheetLoader {
    fn load_rows(&self, path: &Path) -> Result<Vec<Record>, SourceError> {
        info!(path = %path.display(), "Loading records from spreadsheet");

        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(SourceError::NoWorksheet)??;

        let records = records_from_range(&range)?;
        info!(count = records.len(), "Loaded records");
        Ok(records)
    }
}

/// Positions of the required columns within a row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnMap {
    pub hotel_name: usize,
    pub id_number: usize,
    pub sanitation: usize,
    pub image_name: usize,
    pub image: usize,
}

impl ColumnMap {
    /// Locate every required column in a header row.
    ///
    /// Names are compared after trimming; an exact match wins over a
    /// case-insensitive one, and the first matching column is used.
    pub fn from_header<S: AsRef<str>>(header: &[S]) -> Result<Self, SourceError> {
        let trimmed: Vec<&str> = header.iter().map(|h| h.as_ref().trim()).collect();

        let find = |name: &str| -> Result<usize, SourceError> {
            trimmed
                .iter()
                .position(|h| *h == name)
                .or_else(|| trimmed.iter().position(|h| h.eq_ignore_ascii_case(name)))
                .ok_or_else(|| SourceError::MissingColumn(name.to_string()))
        };

        // Report the first missing column in a stable order
        for name in REQUIRED_COLUMNS {
            find(name)?;
        }

        Ok(Self {
            hotel_name: find(COLUMN_HOTEL_NAME)?,
            id_number: find(COLUMN_ID_NUMBER)?,
            sanitation: find(COLUMN_SANITATION)?,
            image_name: find(COLUMN_IMAGE_NAME)?,
            image: find(COLUMN_IMAGE)?,
        })
    }
}

/// Convert a calamine cell
pub fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        other => CellValue::Text(other.to_string()),
    }
}

/// Build records from a worksheet range whose first row is the header
pub fn records_from_range(range: &Range<Data>) -> Result<Vec<Record>, SourceError> {
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows = range.rows();

    let header: Vec<String> = rows
        .next()
        .ok_or(SourceError::EmptySheet)?
        .iter()
        .map(|cell| cell.to_string())
        .collect();
    let columns = ColumnMap::from_header(&header)?;

    let mut records = Vec::new();
    for (offset, row) in rows.enumerate() {
        // 1-based sheet row number, header included
        let row_number = first_row + offset + 2;

        let cells: Vec<CellValue> = row.iter().map(cell_value).collect();
        if cells.iter().all(CellValue::is_empty) {
            debug!(row = row_number, "Skipping empty row");
            continue;
        }

        records.push(record_from_cells(&cells, &columns, row_number)?);
    }

    Ok(records)
}

fn record_from_cells(
    cells: &[CellValue],
    columns: &ColumnMap,
    row_number: usize,
) -> Result<Record, SourceError> {
    let cell = |index: usize| cells.get(index).cloned().unwrap_or(CellValue::Empty);

    let id_number = cell(columns.id_number);
    if id_number.is_empty() {
        return Err(SourceError::InvalidRecord {
            row: row_number,
            message: format!("'{COLUMN_ID_NUMBER}' is empty"),
        });
    }

    Ok(Record {
        hotel_name: cell(columns.hotel_name).to_string(),
        id_number,
        sanitation: cell(columns.sanitation),
        image_name: cell(columns.image_name).to_string(),
        image_path: cell(columns.image).to_string(),
    })
}
