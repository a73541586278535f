// Output writers.
//
// Every file is rendered in memory first, then written to a temporary file
// next to the destination and renamed over it. Readers see either the old
// file or the complete new one.
use crate::error::{PipelineError, Result};
use crate::reports::GroupedLayout;
use crate::types::{AnomalyRecord, Cell, GlobalSummary};
use crate::util::excel_serial;
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};
use tempfile::NamedTempFile;
use tracing::warn;

pub const REPORT_SHEET: &str = "Report Macchine";
/// Sheet name of the single-table workbooks.
const FLAT_SHEET: &str = "Sheet1";
const REPORT_COLUMN_WIDTH: f64 = 15.0;
const A4_PAPER: u8 = 9;
const MAX_CELL_CHARS: usize = 32_767;

/// Write `bytes` to `path` through a synced temporary file in the same
/// directory. The temporary file is removed if anything fails.
pub fn persist_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for r in rows {
        wtr.serialize(r)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))?;
    persist_bytes(path, &bytes)
}

/// Like `write_csv`, but the header line is written even with no rows.
pub fn write_csv_with_header<T: Serialize>(
    path: &Path,
    header: &[&str],
    rows: &[T],
) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(header)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))?;
    persist_bytes(path, &bytes)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    persist_bytes(path, s.as_bytes())
}

/// How the consolidated workbook was serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// Typed cells with header and date formats.
    Typed,
    /// Plain values only; over-long strings truncated, non-finite numbers blank.
    Plain,
}

/// Failures while replacing the output sheet of an existing workbook.
#[derive(Debug, thiserror::Error)]
enum BookError {
    #[error("cannot load workbook: {0}")]
    Load(umya_spreadsheet::XlsxError),
    #[error("invalid sheet name '{0}'")]
    SheetName(String),
    #[error("{0}")]
    Sheet(&'static str),
    #[error("cell {0} holds more than 32767 characters")]
    CellTooLong(String),
    #[error("cell {0} holds a non-finite number")]
    NonFinite(String),
    #[error("cannot serialize workbook: {0}")]
    Save(umya_spreadsheet::XlsxError),
}

/// Replace `output_sheet` inside the workbook at `path` with the
/// consolidated table. Every other sheet is carried over untouched; the
/// output sheet is appended last.
pub fn write_consolidated(
    path: &Path,
    output_sheet: &str,
    header: &[String],
    rows: &[Vec<Cell>],
) -> Result<WriteStrategy> {
    let typed = replace_sheet(path, output_sheet, header, rows, WriteStrategy::Typed);
    let (bytes, strategy) = match typed {
        Ok(bytes) => (bytes, WriteStrategy::Typed),
        Err(primary) => {
            warn!(error = %primary, "typed serialization failed, retrying with plain values");
            let bytes = replace_sheet(path, output_sheet, header, rows, WriteStrategy::Plain)
                .map_err(|fallback| PipelineError::OutputFailed {
                    path: path.to_path_buf(),
                    primary: primary.to_string(),
                    fallback: fallback.to_string(),
                })?;
            (bytes, WriteStrategy::Plain)
        }
    };
    persist_bytes(path, &bytes)?;
    Ok(strategy)
}

/// Excel's sheet name rules.
fn check_sheet_name(name: &str) -> std::result::Result<(), BookError> {
    let bad = name.is_empty()
        || name.chars().count() > 31
        || name.starts_with('\'')
        || name.ends_with('\'')
        || name.contains(['[', ']', ':', '*', '?', '/', '\\']);
    if bad {
        return Err(BookError::SheetName(name.to_string()));
    }
    Ok(())
}

fn replace_sheet(
    path: &Path,
    output_sheet: &str,
    header: &[String],
    rows: &[Vec<Cell>],
    strategy: WriteStrategy,
) -> std::result::Result<Vec<u8>, BookError> {
    check_sheet_name(output_sheet)?;
    let mut book = umya_spreadsheet::reader::xlsx::read(path).map_err(BookError::Load)?;
    if book.get_sheet_by_name(output_sheet).is_some() {
        book.remove_sheet_by_name(output_sheet).map_err(BookError::Sheet)?;
    }
    let ws = book.new_sheet(output_sheet).map_err(BookError::Sheet)?;

    for (c, h) in header.iter().enumerate() {
        let coord: (u32, u32) = (c as u32 + 1, 1);
        ws.get_cell_mut(coord).set_value_string(h.as_str());
        if strategy == WriteStrategy::Typed {
            ws.get_style_mut(coord).get_font_mut().set_bold(true);
        }
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            let coord: (u32, u32) = (c as u32 + 1, r as u32 + 2);
            match strategy {
                WriteStrategy::Typed => put_typed(ws, coord, cell)?,
                WriteStrategy::Plain => put_plain(ws, coord, cell),
            }
        }
    }

    let mut buf = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut buf).map_err(BookError::Save)?;
    Ok(buf.into_inner())
}

fn a1((col, row): (u32, u32)) -> String {
    let mut letters = String::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.insert(0, (b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    format!("{}{}", letters, row)
}

fn put_typed(
    ws: &mut umya_spreadsheet::Worksheet,
    coord: (u32, u32),
    cell: &Cell,
) -> std::result::Result<(), BookError> {
    match cell {
        Cell::Empty => {}
        Cell::Text(s) if s.chars().count() > MAX_CELL_CHARS => {
            return Err(BookError::CellTooLong(a1(coord)));
        }
        Cell::Text(s) => {
            ws.get_cell_mut(coord).set_value_string(s.as_str());
        }
        Cell::Number(n) if !n.is_finite() => return Err(BookError::NonFinite(a1(coord))),
        Cell::Number(n) => {
            ws.get_cell_mut(coord).set_value_number(*n);
        }
        Cell::Bool(b) => {
            ws.get_cell_mut(coord).set_value_bool(*b);
        }
        Cell::Date(d) => {
            ws.get_cell_mut(coord).set_value_number(excel_serial(*d));
            ws.get_style_mut(coord)
                .get_number_format_mut()
                .set_format_code("yyyy-mm-dd");
        }
    }
    Ok(())
}

fn put_plain(ws: &mut umya_spreadsheet::Worksheet, coord: (u32, u32), cell: &Cell) {
    match cell {
        Cell::Empty => {}
        Cell::Number(n) if !n.is_finite() => {}
        Cell::Number(n) => {
            ws.get_cell_mut(coord).set_value_number(*n);
        }
        Cell::Bool(b) => {
            ws.get_cell_mut(coord).set_value_bool(*b);
        }
        other => {
            let s: String = other.display().chars().take(MAX_CELL_CHARS).collect();
            ws.get_cell_mut(coord).set_value_string(s);
        }
    }
}

fn write_cell(
    ws: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    base: &Format,
    date: &Format,
) -> std::result::Result<(), XlsxError> {
    match cell {
        Cell::Empty => ws.write_blank(row, col, base)?,
        Cell::Text(s) => ws.write_string_with_format(row, col, s, base)?,
        Cell::Number(n) => ws.write_number_with_format(row, col, *n, base)?,
        Cell::Bool(b) => ws.write_boolean_with_format(row, col, *b, base)?,
        Cell::Date(d) => ws.write_number_with_format(row, col, excel_serial(*d), date)?,
    };
    Ok(())
}

/// The grouped machine report: bordered cells, fixed column width, A4
/// portrait. An empty layout still produces a valid one-sheet workbook.
pub fn write_grouped_report(path: &Path, layout: &GroupedLayout) -> Result<()> {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name(REPORT_SHEET)?;
    ws.set_portrait();
    ws.set_paper_size(A4_PAPER);

    let border = Format::new().set_border(FormatBorder::Thin);
    let header = Format::new()
        .set_border(FormatBorder::Thin)
        .set_bold()
        .set_align(FormatAlign::Center);
    let date = border.clone().set_num_format("yyyy-mm-dd");

    let mut merged: HashSet<(usize, usize)> = HashSet::new();
    for m in &layout.merges {
        let label = layout
            .rows
            .get(m.row)
            .and_then(|r| r.get(m.first_col))
            .map(Cell::display)
            .unwrap_or_default();
        ws.merge_range(
            m.row as u32,
            m.first_col as u16,
            m.row as u32,
            m.last_col as u16,
            &label,
            &header,
        )?;
        merged.extend((m.first_col..=m.last_col).map(|c| (m.row, c)));
    }

    for (r, row) in layout.rows.iter().enumerate() {
        for c in 0..layout.width {
            if merged.contains(&(r, c)) {
                continue;
            }
            let cell = row.get(c).unwrap_or(&Cell::Empty);
            write_cell(ws, r as u32, c as u16, cell, &border, &date)?;
        }
    }
    for c in 0..layout.width {
        ws.set_column_width(c as u16, REPORT_COLUMN_WIDTH)?;
    }

    let bytes = workbook.save_to_buffer()?;
    persist_bytes(path, &bytes)
}

/// Write a flat table (bold header row + data rows) as a one-sheet workbook.
pub fn write_flat_table(
    path: &Path,
    sheet_name: &str,
    header: &[&str],
    rows: &[Vec<Cell>],
) -> Result<()> {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name(sheet_name)?;
    let bold = Format::new().set_bold();
    let plain = Format::new();
    let date = Format::new().set_num_format("yyyy-mm-dd");
    for (c, h) in header.iter().enumerate() {
        ws.write_string_with_format(0, c as u16, *h, &bold)?;
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            write_cell(ws, r as u32 + 1, c as u16, cell, &plain, &date)?;
        }
    }
    let bytes = workbook.save_to_buffer()?;
    persist_bytes(path, &bytes)
}

pub fn write_anomalies(path: &Path, anomalies: &[AnomalyRecord]) -> Result<()> {
    let rows: Vec<Vec<Cell>> = anomalies
        .iter()
        .map(|a| {
            vec![
                Cell::Text(a.aggregate.month.to_string()),
                Cell::Text(a.aggregate.machine_id.clone()),
                Cell::from_opt(a.aggregate.quantity),
                Cell::from_opt(a.aggregate.consumption),
                Cell::Number(a.efficiency),
                Cell::Text(a.reason.clone()),
            ]
        })
        .collect();
    write_flat_table(
        path,
        FLAT_SHEET,
        &[
            "Mese",
            "Macchina",
            "Quantita Prodotta",
            "Consumo Energia",
            "Consumo_per_Pezzo",
            "Motivo_Anomalia",
        ],
        &rows,
    )
}

pub fn write_global_summary(path: &Path, summary: &[GlobalSummary]) -> Result<()> {
    let rows: Vec<Vec<Cell>> = summary
        .iter()
        .map(|s| {
            vec![
                Cell::Text(s.month.to_string()),
                Cell::from_opt(s.total_quantity),
                Cell::from_opt(s.total_consumption),
                Cell::from_opt(s.billed_amount),
            ]
        })
        .collect();
    write_flat_table(
        path,
        FLAT_SHEET,
        &["Mese", "Pezzi Prodotti Totali", "Consumo Globale kWh", "Valore Bolletta"],
        &rows,
    )
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}
