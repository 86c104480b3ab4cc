use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use calamine::{Data, Range, Reader, Sheets, open_workbook_auto, open_workbook_auto_from_rs};

use crate::error::ImportError;
use crate::models::{CellValue, RawRow};

/// Spreadsheet flavours accepted by the importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Xlsx,
    Xls,
    Csv,
}

impl SpreadsheetFormat {
    pub fn from_extension(ext: &str) -> Result<Self, ImportError> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "xls" => Ok(Self::Xls),
            "csv" => Ok(Self::Csv),
            other => Err(ImportError::UnsupportedExtension(format!(".{other}"))),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ImportError::UnsupportedExtension(path.display().to_string()))?;
        Self::from_extension(ext)
    }
}

/// Read the first sheet of a workbook (or a CSV file) into rows keyed by the
/// header row.
pub fn read_rows(path: &Path) -> Result<Vec<RawRow>, ImportError> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.to_path_buf()));
    }
    let rows = match SpreadsheetFormat::from_path(path)? {
        SpreadsheetFormat::Csv => {
            let file =
                File::open(path).map_err(|e| ImportError::UnreadableWorkbook(e.to_string()))?;
            csv_rows(file)?
        }
        SpreadsheetFormat::Xlsx | SpreadsheetFormat::Xls => {
            let mut workbook = open_workbook_auto(path)
                .map_err(|e| ImportError::UnreadableWorkbook(e.to_string()))?;
            first_sheet_rows(&mut workbook)?
        }
    };
    require_rows(rows)
}

/// Same as [`read_rows`] for an uploaded buffer; the format comes from the
/// uploaded file name.
pub fn read_rows_from_bytes(bytes: &[u8], file_name: &str) -> Result<Vec<RawRow>, ImportError> {
    let rows = match SpreadsheetFormat::from_path(Path::new(file_name))? {
        SpreadsheetFormat::Csv => csv_rows(bytes)?,
        SpreadsheetFormat::Xlsx | SpreadsheetFormat::Xls => {
            let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
                .map_err(|e| ImportError::UnreadableWorkbook(e.to_string()))?;
            first_sheet_rows(&mut workbook)?
        }
    };
    require_rows(rows)
}

fn require_rows(rows: Vec<RawRow>) -> Result<Vec<RawRow>, ImportError> {
    if rows.is_empty() {
        return Err(ImportError::EmptyDataset);
    }
    tracing::debug!(rows = rows.len(), "read spreadsheet rows");
    Ok(rows)
}

fn csv_rows<R: Read>(reader: R) -> Result<Vec<RawRow>, ImportError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    // Read bytes so a stray non-UTF-8 byte only degrades its own cell.
    let headers: Vec<String> = rdr
        .byte_headers()
        .map_err(|e| ImportError::UnreadableWorkbook(format!("failed to read CSV headers: {e}")))?
        .iter()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .collect();

    let mut rows = Vec::new();
    for (line_num, result) in rdr.byte_records().enumerate() {
        let record = result.map_err(|e| {
            ImportError::UnreadableWorkbook(format!("failed to parse CSV row {}: {e}", line_num + 2))
        })?;
        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let cell = String::from_utf8_lossy(record.get(i).unwrap_or_default());
                (h.as_str(), CellValue::from(&*cell))
            })
            .collect();
        if !row.is_blank() {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn first_sheet_rows<RS: Read + Seek>(workbook: &mut Sheets<RS>) -> Result<Vec<RawRow>, ImportError> {
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::EmptyDataset)?
        .map_err(|e| ImportError::UnreadableWorkbook(e.to_string()))?;
    Ok(range_rows(&range))
}

fn range_rows(range: &Range<Data>) -> Vec<RawRow> {
    let mut sheet_rows = range.rows();
    let Some(header_row) = sheet_rows.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header_row.iter().map(|c| cell_value(c).as_text()).collect();

    sheet_rows
        .map(|cells| {
            headers
                .iter()
                .zip(cells)
                .map(|(h, c)| (h.as_str(), cell_value(c)))
                .collect::<RawRow>()
        })
        .filter(|row| !row.is_blank())
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::String(s) => CellValue::from(s.as_str()),
        other => CellValue::from(other.to_string().as_str()),
    }
}
