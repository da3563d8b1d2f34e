use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use tracing::debug;

use crate::error::AcquireError;
use crate::models::{CellGrid, CellValue, GridCell, RawSheet};

/// Decodes the first worksheet of an xls/xlsx/xlsb/ods byte stream.
pub fn decode_sheet(file_name: &str, bytes: Vec<u8>) -> Result<RawSheet, AcquireError> {
    let decode_error = |source| AcquireError::Decode {
        file: file_name.to_string(),
        source,
    };

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(decode_error)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AcquireError::NoWorksheet {
            file: file_name.to_string(),
        })?
        .map_err(decode_error)?;

    let sheet = sheet_from_range(&range);
    debug!(
        file = file_name,
        rows = sheet.rows.len(),
        cells = sheet.grid.as_ref().map(CellGrid::len).unwrap_or(0),
        "decoded first worksheet"
    );
    Ok(sheet)
}

/// Rows are relative to the used range (leading blank rows and columns are
/// not represented); the grid keeps absolute sheet coordinates.
pub fn sheet_from_range(range: &Range<Data>) -> RawSheet {
    let (row_offset, col_offset) = range.start().unwrap_or((0, 0));

    let rows = range
        .rows()
        .map(|row| {
            let mut cells: Vec<CellValue> = row.iter().map(cell_value).collect();
            while matches!(cells.last(), Some(CellValue::Empty)) {
                cells.pop();
            }
            cells
        })
        .collect();

    let mut grid = CellGrid::default();
    for (row, col, cell) in range.used_cells() {
        grid.insert(
            row_offset + row as u32,
            col_offset + col as u32,
            // calamine hands over values only, never the displayed text.
            GridCell {
                formatted: None,
                raw: cell_value(cell),
            },
        );
    }

    RawSheet::new(rows).with_grid(grid)
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(value) => CellValue::Text(value.clone()),
        Data::Float(value) => CellValue::Number(*value),
        Data::Int(value) => CellValue::Number(*value as f64),
        Data::Bool(value) => CellValue::Bool(*value),
        other => CellValue::Text(other.to_string()),
    }
}
