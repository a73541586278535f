use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

/// A single spreadsheet cell, independent of the workbook library.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl Cell {
    pub fn text(s: &str) -> Self {
        Cell::Text(s.to_string())
    }

    pub fn from_opt(v: Option<f64>) -> Self {
        v.map_or(Cell::Empty, Cell::Number)
    }

    /// Render the cell the way a user would type it back in.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    format!("{:.0}", n)
                } else {
                    n.to_string()
                }
            }
            Cell::Bool(b) => b.to_string().to_uppercase(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// A worksheet as a dense grid; row 0 is spreadsheet row 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

/// A sheet viewed as a header row plus data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    /// 1-based spreadsheet row number of `rows[0]`.
    pub first_data_row: usize,
}

impl RawTable {
    /// Split a sheet at `header_row` (0-based); rows above it are discarded.
    pub fn from_sheet(sheet: &Sheet, header_row: usize) -> Self {
        let headers = sheet
            .rows
            .get(header_row)
            .map(|r| r.iter().map(Cell::display).collect())
            .unwrap_or_default();
        let rows = sheet.rows.iter().skip(header_row + 1).cloned().collect();
        RawTable {
            name: sheet.name.clone(),
            headers,
            rows,
            first_data_row: header_row + 2,
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&Cell::Empty)
    }
}

/// The canonical column vocabulary of the consolidated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Field {
    #[serde(rename = "anno")]
    Year,
    #[serde(rename = "mese")]
    Month,
    #[serde(rename = "macchina")]
    MachineId,
    #[serde(rename = "ore_produzione")]
    ProductionHours,
    #[serde(rename = "pezzi_prodotti")]
    PiecesProduced,
    #[serde(rename = "consumo_kwh")]
    ConsumptionKwh,
    #[serde(rename = "lettura")]
    MeterReading,
    #[serde(rename = "costo_energia_per_kwh")]
    EnergyCostPerKwh,
    #[serde(rename = "costo_macchina")]
    MachineCost,
    #[serde(rename = "consumo_bolletta_kwh")]
    BilledConsumptionKwh,
    #[serde(rename = "totale_bolletta")]
    TotalBill,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::Year,
        Field::Month,
        Field::MachineId,
        Field::ProductionHours,
        Field::PiecesProduced,
        Field::ConsumptionKwh,
        Field::MeterReading,
        Field::EnergyCostPerKwh,
        Field::MachineCost,
        Field::BilledConsumptionKwh,
        Field::TotalBill,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            Field::Year => "anno",
            Field::Month => "mese",
            Field::MachineId => "macchina",
            Field::ProductionHours => "ore_produzione",
            Field::PiecesProduced => "pezzi_prodotti",
            Field::ConsumptionKwh => "consumo_kwh",
            Field::MeterReading => "lettura",
            Field::EnergyCostPerKwh => "costo_energia_per_kwh",
            Field::MachineCost => "costo_macchina",
            Field::BilledConsumptionKwh => "consumo_bolletta_kwh",
            Field::TotalBill => "totale_bolletta",
        }
    }

    pub fn from_column(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.column_name() == name)
    }

    pub fn value(self, r: &SourceRecord) -> Cell {
        match self {
            Field::Year => Cell::Number(r.year as f64),
            Field::Month => Cell::Number(r.month as f64),
            Field::MachineId => Cell::Text(r.machine_id.clone()),
            Field::ProductionHours => Cell::from_opt(r.production_hours),
            Field::PiecesProduced => Cell::from_opt(r.pieces_produced),
            Field::ConsumptionKwh => Cell::from_opt(r.consumption_kwh),
            Field::MeterReading => Cell::from_opt(r.meter_reading),
            Field::EnergyCostPerKwh => Cell::from_opt(r.energy_cost_per_kwh),
            Field::MachineCost => Cell::from_opt(r.machine_cost),
            Field::BilledConsumptionKwh => Cell::from_opt(r.billed_consumption_kwh),
            Field::TotalBill => Cell::from_opt(r.total_bill),
        }
    }
}

/// One validated row of one machine sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub machine_id: String,
    pub year: i32,
    pub month: u32,
    pub production_hours: Option<f64>,
    pub pieces_produced: Option<f64>,
    pub consumption_kwh: Option<f64>,
    pub meter_reading: Option<f64>,
    pub energy_cost_per_kwh: Option<f64>,
    pub machine_cost: Option<f64>,
    pub billed_consumption_kwh: Option<f64>,
    pub total_bill: Option<f64>,
}

/// Calendar month, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| MonthKey { year, month })
    }

    pub fn from_date(d: NaiveDate) -> Self {
        MonthKey {
            year: d.year(),
            month: d.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Quantity,
    Consumption,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LongRecord {
    pub month: MonthKey,
    pub machine_id: String,
    pub metric: Metric,
    pub value: Option<f64>,
}

/// Quantity and consumption for one (month, machine) after the outer join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    pub month: MonthKey,
    pub machine_id: String,
    pub quantity: Option<f64>,
    pub consumption: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAggregate {
    pub month: MonthKey,
    pub machine_id: String,
    pub quantity: Option<f64>,
    pub consumption: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    High,
    Low,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::High => f.write_str("ALTO"),
            AnomalyKind::Low => f.write_str("BASSO"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyRecord {
    pub aggregate: MonthlyAggregate,
    pub efficiency: f64,
    pub kind: AnomalyKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSummary {
    pub month: MonthKey,
    pub total_quantity: Option<f64>,
    pub total_consumption: Option<f64>,
    pub billed_amount: Option<f64>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct MachineSummaryRow {
    #[serde(rename = "Machine")]
    #[tabled(rename = "Machine")]
    pub machine: String,
    #[serde(rename = "ConsumptionKwh")]
    #[tabled(rename = "ConsumptionKwh")]
    pub consumption_kwh: String,
    #[serde(rename = "MachineCost")]
    #[tabled(rename = "MachineCost")]
    pub machine_cost: String,
    #[serde(rename = "Pieces")]
    #[tabled(rename = "Pieces")]
    pub pieces: String,
    #[serde(rename = "Hours")]
    #[tabled(rename = "Hours")]
    pub hours: String,
    #[serde(rename = "KwhPerPiece")]
    #[tabled(rename = "KwhPerPiece")]
    pub kwh_per_piece: String,
    #[serde(rename = "CostPerPiece")]
    #[tabled(rename = "CostPerPiece")]
    pub cost_per_piece: String,
}

/// Console preview of a flagged month/machine.
#[derive(Debug, Tabled, Clone)]
pub struct AnomalyPreviewRow {
    #[tabled(rename = "Month")]
    pub month: String,
    #[tabled(rename = "Machine")]
    pub machine: String,
    #[tabled(rename = "Efficiency")]
    pub efficiency: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

/// Console preview of one global summary month.
#[derive(Debug, Tabled, Clone)]
pub struct GlobalPreviewRow {
    #[tabled(rename = "Month")]
    pub month: String,
    #[tabled(rename = "TotalPieces")]
    pub total_quantity: String,
    #[tabled(rename = "TotalKwh")]
    pub total_consumption: String,
    #[tabled(rename = "Billed")]
    pub billed_amount: String,
}

#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub months: usize,
    pub machines: usize,
    pub groups: usize,
    pub anomalies: usize,
    pub mean_efficiency: Option<f64>,
    pub std_dev: Option<f64>,
    pub high_threshold: Option<f64>,
    pub low_threshold: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_key_renders_zero_padded() {
        let key = MonthKey::new(2024, 3).unwrap();
        assert_eq!(key.to_string(), "2024-03");
        assert!(MonthKey::new(2024, 13).is_none());
    }

    #[test]
    fn month_keys_order_chronologically() {
        let dec = MonthKey::new(2023, 12).unwrap();
        let jan = MonthKey::new(2024, 1).unwrap();
        assert!(dec < jan);
    }

    #[test]
    fn table_from_sheet_skips_rows_above_header() {
        let sheet = Sheet {
            name: "Consumi".to_string(),
            rows: vec![
                vec![Cell::text("title")],
                vec![],
                vec![Cell::text("Mese"), Cell::text("F01")],
                vec![Cell::text("GENNAIO 24"), Cell::Number(10.0)],
            ],
        };
        let table = RawTable::from_sheet(&sheet, 2);
        assert_eq!(table.headers, vec!["Mese", "F01"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.first_data_row, 4);
        assert_eq!(table.cell(0, 1), &Cell::Number(10.0));
        assert_eq!(table.cell(0, 5), &Cell::Empty);
    }

    #[test]
    fn field_names_round_trip() {
        for f in Field::ALL {
            assert_eq!(Field::from_column(f.column_name()), Some(f));
        }
        assert_eq!(Field::from_column("unknown"), None);
    }
}
