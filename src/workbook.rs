// Spreadsheet read boundary.
//
// Everything past this module works on `Sheet` grids of `Cell`s; calamine
// types never leak out.
use crate::error::{PipelineError, Result};
use crate::types::{Cell, Sheet};
use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use std::path::Path;

pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::InputNotFound(path.to_path_buf()))
    }
}

/// Read every sheet of a workbook, in workbook order.
pub fn read_sheets(path: &Path) -> Result<Vec<Sheet>> {
    ensure_exists(path)?;
    let wrap = |source| PipelineError::Workbook {
        path: path.to_path_buf(),
        source,
    };
    let mut wb = open_workbook_auto(path).map_err(wrap)?;
    let mut sheets = Vec::new();
    for name in wb.sheet_names() {
        let range = wb.worksheet_range(&name).map_err(wrap)?;
        sheets.push(Sheet {
            rows: range_to_rows(&range),
            name,
        });
    }
    Ok(sheets)
}

/// Read the first sheet of a workbook.
pub fn read_first_sheet(path: &Path) -> Result<Sheet> {
    read_sheets(path)?
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::EmptyWorkbook {
            path: path.to_path_buf(),
        })
}

// A range starts at its first used cell; pad so that grid indices match
// spreadsheet coordinates.
fn range_to_rows(range: &Range<Data>) -> Vec<Vec<Cell>> {
    let Some((row0, col0)) = range.start() else {
        return Vec::new();
    };
    let mut rows = vec![Vec::new(); row0 as usize];
    for r in range.rows() {
        let mut row = vec![Cell::Empty; col0 as usize];
        row.extend(r.iter().map(to_cell));
        while matches!(row.last(), Some(Cell::Empty)) {
            row.pop();
        }
        rows.push(row);
    }
    rows
}

fn to_cell(v: &Data) -> Cell {
    match v {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(_) => v
            .as_datetime()
            .map_or_else(|| Cell::Text(v.to_string()), Cell::Date),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(format!("#{}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_input_not_found() {
        let err = read_sheets(Path::new("definitely/not/here.xlsx")).unwrap_err();
        assert!(matches!(err, PipelineError::InputNotFound(_)));
    }

    #[test]
    fn converts_scalar_cells() {
        assert_eq!(to_cell(&Data::Empty), Cell::Empty);
        assert_eq!(to_cell(&Data::Int(3)), Cell::Number(3.0));
        assert_eq!(to_cell(&Data::Float(2.5)), Cell::Number(2.5));
        assert_eq!(to_cell(&Data::String("F01".into())), Cell::text("F01"));
        assert_eq!(to_cell(&Data::Bool(true)), Cell::Bool(true));
    }
}
