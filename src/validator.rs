// Row validation.
//
// Each row either becomes a `SourceRecord`, is skipped silently (no machine
// id, e.g. trailing blank rows) or yields exactly one `FieldError` for the
// first field that cannot be coerced.
use crate::types::{Cell, Field, RawTable, SourceRecord};
use crate::util::parse_f64_safe;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub sheet: String,
    pub row: usize,
    pub column: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
}

/// Collects validation errors across all sheets of one run.
#[derive(Debug, Default)]
pub struct ErrorLog {
    errors: Vec<ValidationError>,
}

impl ErrorLog {
    pub fn push(&mut self, e: ValidationError) {
        self.errors.push(e);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }
}

/// Position of each known field in a sheet's (normalized) header row.
#[derive(Debug, Clone)]
pub struct ColumnIndex(HashMap<Field, usize>);

impl ColumnIndex {
    pub fn new(headers: &[String]) -> Self {
        let mut map = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            if let Some(f) = Field::from_column(h) {
                map.entry(f).or_insert(i);
            }
        }
        ColumnIndex(map)
    }

    fn get<'a>(&self, row: &'a [Cell], field: Field) -> &'a Cell {
        self.0
            .get(&field)
            .and_then(|i| row.get(*i))
            .unwrap_or(&Cell::Empty)
    }
}

// Blank strings and the "-" placeholder mean "no value".
fn blank_to_empty(cell: &Cell) -> Cell {
    match cell {
        Cell::Text(s) if s.trim().is_empty() || s.trim() == "-" => Cell::Empty,
        other => other.clone(),
    }
}

fn coerce_float(cell: &Cell) -> Result<Option<f64>, String> {
    match blank_to_empty(cell) {
        Cell::Empty => Ok(None),
        Cell::Number(n) if n.is_finite() => Ok(Some(n)),
        Cell::Text(s) => parse_f64_safe(&s)
            .map(Some)
            .ok_or_else(|| format!("expected a number, found '{}'", s.trim())),
        other => Err(format!("expected a number, found '{}'", other.display())),
    }
}

fn coerce_required_int(cell: &Cell, min: i64, max: i64) -> Result<i64, String> {
    let v = coerce_float(cell)?.ok_or_else(|| "missing value".to_string())?;
    if v.fract() != 0.0 {
        return Err(format!("expected a whole number, found {}", v));
    }
    let v = v as i64;
    if v < min || v > max {
        return Err(format!("{} is outside {}..={}", v, min, max));
    }
    Ok(v)
}

fn machine_id(cell: &Cell) -> Option<String> {
    match blank_to_empty(cell) {
        Cell::Empty => None,
        other => Some(other.display().trim().to_string()),
    }
}

/// Validate one row. `Ok(None)` means the row has no machine id and is
/// skipped without being an error.
pub fn validate_row(
    columns: &ColumnIndex,
    row: &[Cell],
) -> Result<Option<SourceRecord>, FieldError> {
    let Some(machine_id) = machine_id(columns.get(row, Field::MachineId)) else {
        return Ok(None);
    };
    let at = |field: Field| columns.get(row, field);
    let float = |field: Field| {
        coerce_float(at(field)).map_err(|message| FieldError { field, message })
    };
    let year = coerce_required_int(at(Field::Year), 1900, 2999).map_err(|message| FieldError {
        field: Field::Year,
        message,
    })?;
    let month = coerce_required_int(at(Field::Month), 1, 12).map_err(|message| FieldError {
        field: Field::Month,
        message,
    })?;
    Ok(Some(SourceRecord {
        machine_id,
        year: year as i32,
        month: month as u32,
        production_hours: float(Field::ProductionHours)?,
        pieces_produced: float(Field::PiecesProduced)?,
        consumption_kwh: float(Field::ConsumptionKwh)?,
        meter_reading: float(Field::MeterReading)?,
        energy_cost_per_kwh: float(Field::EnergyCostPerKwh)?,
        machine_cost: float(Field::MachineCost)?,
        billed_consumption_kwh: float(Field::BilledConsumptionKwh)?,
        total_bill: float(Field::TotalBill)?,
    }))
}

/// Validate every row of a normalized table, recording failures in `log`.
pub fn validate_table(table: &RawTable, log: &mut ErrorLog) -> Vec<SourceRecord> {
    let columns = ColumnIndex::new(&table.headers);
    let mut accepted = Vec::new();
    for (i, row) in table.rows.iter().enumerate() {
        match validate_row(&columns, row) {
            Ok(Some(record)) => accepted.push(record),
            Ok(None) => {}
            Err(e) => log.push(ValidationError {
                sheet: table.name.clone(),
                row: table.first_data_row + i,
                column: e.field.column_name().to_string(),
                message: e.message,
            }),
        }
    }
    accepted
}
