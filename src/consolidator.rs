use crate::config::ConsolidatorConfig;
use crate::normalizer::{normalize_tables, NormalizeReport};
use crate::types::{Cell, Field, MachineSummaryRow, RawTable, SourceRecord};
use crate::util::format_number;
use crate::validator::{validate_table, ErrorLog};
use std::collections::BTreeMap;
use tracing::debug;

/// The union of all accepted rows, projected onto the configured columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedTable {
    pub columns: Vec<Field>,
    pub records: Vec<SourceRecord>,
}

impl ConsolidatedTable {
    pub fn header(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|f| f.column_name().to_string())
            .collect()
    }

    /// Data rows in column order; fields absent from a sheet come out empty.
    pub fn rows(&self) -> Vec<Vec<Cell>> {
        self.records
            .iter()
            .map(|r| self.columns.iter().map(|f| f.value(r)).collect())
            .collect()
    }
}

pub fn consolidate(
    tables: Vec<RawTable>,
    cfg: &ConsolidatorConfig,
    log: &mut ErrorLog,
) -> (ConsolidatedTable, NormalizeReport) {
    let (tables, report) = normalize_tables(tables, &cfg.excluded_sheets, &cfg.column_mapping);
    let mut records = Vec::new();
    for table in &tables {
        let before = log.len();
        let accepted = validate_table(table, log);
        debug!(
            sheet = %table.name,
            accepted = accepted.len(),
            rejected = log.len() - before,
            "sheet validated"
        );
        records.extend(accepted);
    }
    let table = ConsolidatedTable {
        columns: cfg.final_columns.clone(),
        records,
    };
    (table, report)
}

/// Per-machine totals over the consolidated records, sorted by machine.
///
/// Machine cost is recomputed as consumption times unit energy cost, with
/// absent operands counted as zero.
pub fn machine_summary(records: &[SourceRecord]) -> Vec<MachineSummaryRow> {
    #[derive(Default)]
    struct Acc {
        kwh: f64,
        cost: f64,
        pieces: f64,
        hours: f64,
    }
    let mut map: BTreeMap<&str, Acc> = BTreeMap::new();
    for r in records {
        let kwh = r.consumption_kwh.unwrap_or(0.0);
        let e = map.entry(r.machine_id.as_str()).or_default();
        e.kwh += kwh;
        e.cost += kwh * r.energy_cost_per_kwh.unwrap_or(0.0);
        e.pieces += r.pieces_produced.unwrap_or(0.0);
        e.hours += r.production_hours.unwrap_or(0.0);
    }
    map.into_iter()
        .map(|(machine, acc)| {
            let per_piece = |v: f64, decimals: usize| {
                if acc.pieces > 0.0 {
                    format_number(v / acc.pieces, decimals)
                } else {
                    "-".to_string()
                }
            };
            MachineSummaryRow {
                machine: machine.to_string(),
                consumption_kwh: format_number(acc.kwh, 2),
                machine_cost: format_number(acc.cost, 2),
                pieces: format_number(acc.pieces, 0),
                hours: format_number(acc.hours, 2),
                kwh_per_piece: per_piece(acc.kwh, 4),
                cost_per_piece: per_piece(acc.cost, 4),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn config() -> ConsolidatorConfig {
        ConsolidatorConfig {
            source_path: "dati.xlsx".into(),
            excluded_sheets: BTreeSet::from(["Consolidato".to_string(), "Tabelle".to_string()]),
            column_mapping: BTreeMap::from([
                ("macchina_o_impianto".to_string(), "macchina".to_string()),
                ("consumo".to_string(), "consumo_kwh".to_string()),
            ]),
            final_columns: vec![
                Field::Year,
                Field::Month,
                Field::MachineId,
                Field::ConsumptionKwh,
                Field::TotalBill,
            ],
            output_sheet: "Consolidato".to_string(),
            validation_log: "validation_errors.log".into(),
            machine_summary_path: None,
        }
    }

    fn sheet(name: &str, rows: Vec<Vec<Cell>>) -> RawTable {
        RawTable {
            name: name.to_string(),
            headers: vec![
                "anno".into(),
                "mese".into(),
                "macchina o impianto".into(),
                "consumo".into(),
            ],
            rows,
            first_data_row: 2,
        }
    }

    fn line(machine: &str, month: f64, kwh: Cell) -> Vec<Cell> {
        vec![
            Cell::Number(2024.0),
            Cell::Number(month),
            Cell::text(machine),
            kwh,
        ]
    }

    fn inputs() -> Vec<RawTable> {
        vec![
            sheet(
                "F01",
                vec![
                    line("F01", 1.0, Cell::Number(10.0)),
                    line("F01", 2.0, Cell::text("n/d")),
                    vec![],
                ],
            ),
            sheet("F02", vec![line("F02", 1.0, Cell::Number(7.5))]),
            sheet("Consolidato", vec![line("OLD", 1.0, Cell::Number(1.0))]),
        ]
    }

    #[test]
    fn unions_valid_rows_and_logs_invalid_ones() {
        let mut log = ErrorLog::default();
        let (table, report) = consolidate(inputs(), &config(), &mut log);
        assert_eq!(report.processed, vec!["F01", "F02"]);
        assert_eq!(report.excluded, vec!["Consolidato"]);
        assert_eq!(table.records.len(), 2);
        assert_eq!(log.len(), 1);
        assert_eq!(log.errors()[0].row, 3);
        assert_eq!(log.errors()[0].column, "consumo_kwh");
    }

    #[test]
    fn projects_onto_configured_columns() {
        let mut log = ErrorLog::default();
        let (table, _) = consolidate(inputs(), &config(), &mut log);
        assert_eq!(
            table.header(),
            vec!["anno", "mese", "macchina", "consumo_kwh", "totale_bolletta"]
        );
        let rows = table.rows();
        assert_eq!(
            rows[0],
            vec![
                Cell::Number(2024.0),
                Cell::Number(1.0),
                Cell::text("F01"),
                Cell::Number(10.0),
                Cell::Empty,
            ]
        );
    }

    #[test]
    fn sheet_order_does_not_change_the_rows() {
        let key = |r: &SourceRecord| format!("{}-{}-{}", r.machine_id, r.year, r.month);
        let mut log = ErrorLog::default();
        let (a, _) = consolidate(inputs(), &config(), &mut log);
        let mut reversed = inputs();
        reversed.reverse();
        let (b, _) = consolidate(reversed, &config(), &mut log);
        let mut ka: Vec<String> = a.records.iter().map(key).collect();
        let mut kb: Vec<String> = b.records.iter().map(key).collect();
        ka.sort();
        kb.sort();
        assert_eq!(ka, kb);
    }

    #[test]
    fn summary_recomputes_cost_and_ratios() {
        let rec = |machine: &str, kwh: Option<f64>, pieces: Option<f64>| SourceRecord {
            machine_id: machine.to_string(),
            year: 2024,
            month: 1,
            production_hours: Some(8.0),
            pieces_produced: pieces,
            consumption_kwh: kwh,
            meter_reading: None,
            energy_cost_per_kwh: Some(0.5),
            machine_cost: Some(999.0),
            billed_consumption_kwh: None,
            total_bill: None,
        };
        let rows = machine_summary(&[
            rec("F02", Some(100.0), None),
            rec("F01", Some(100.0), Some(50.0)),
            rec("F01", Some(300.0), Some(150.0)),
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].machine, "F01");
        assert_eq!(rows[0].consumption_kwh, "400.00");
        assert_eq!(rows[0].machine_cost, "200.00");
        assert_eq!(rows[0].kwh_per_piece, "2.0000");
        assert_eq!(rows[0].cost_per_piece, "1.0000");
        assert_eq!(rows[1].kwh_per_piece, "-");
    }
}
