// Wide -> long reshaping and the quantity/consumption join.
use crate::dates::parse_month_label;
use crate::types::{Cell, JoinedRecord, LongRecord, Metric, MonthKey, RawTable};
use crate::util::parse_f64_safe;
use std::collections::HashMap;
use tracing::debug;

fn cell_value(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Text(s) => parse_f64_safe(s),
        _ => None,
    }
}

/// One record per (row, machine column). The first column holds the month
/// label; every other non-blank header is a machine id. Rows whose label
/// does not parse are left out.
pub fn melt(table: &RawTable, metric: Metric) -> Vec<LongRecord> {
    let machines: Vec<(usize, String)> = table
        .headers
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, h)| (i, h.trim().to_string()))
        .filter(|(_, h)| !h.is_empty())
        .collect();
    let mut out = Vec::new();
    let mut unparsed = 0usize;
    for (r, _) in table.rows.iter().enumerate() {
        let label = table.cell(r, 0).display();
        let Some(month) = parse_month_label(&label) else {
            if !label.trim().is_empty() {
                unparsed += 1;
            }
            continue;
        };
        for (c, machine) in &machines {
            out.push(LongRecord {
                month,
                machine_id: machine.clone(),
                metric,
                value: cell_value(table.cell(r, *c)),
            });
        }
    }
    debug!(
        sheet = %table.name,
        records = out.len(),
        unparsed_labels = unparsed,
        "reshaped to long form"
    );
    out
}

/// Full outer join on (month, machine). Records sharing a key are paired in
/// order, so every input value lands in exactly one joined record; a side
/// with fewer records for a key leaves the other metric absent.
pub fn outer_join(quantity: &[LongRecord], consumption: &[LongRecord]) -> Vec<JoinedRecord> {
    let mut keys: Vec<(MonthKey, String)> = Vec::new();
    let mut sides: HashMap<(MonthKey, String), (Vec<Option<f64>>, Vec<Option<f64>>)> =
        HashMap::new();
    let all = quantity.iter().chain(consumption.iter());
    for rec in all {
        let key = (rec.month, rec.machine_id.clone());
        let entry = sides.entry(key.clone()).or_insert_with(|| {
            keys.push(key);
            (Vec::new(), Vec::new())
        });
        match rec.metric {
            Metric::Quantity => entry.0.push(rec.value),
            Metric::Consumption => entry.1.push(rec.value),
        }
    }
    let mut out = Vec::new();
    for key in keys {
        let Some((q, c)) = sides.remove(&key) else {
            continue;
        };
        for i in 0..q.len().max(c.len()) {
            out.push(JoinedRecord {
                month: key.0,
                machine_id: key.1.clone(),
                quantity: q.get(i).copied().flatten(),
                consumption: c.get(i).copied().flatten(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide(headers: &[&str], rows: Vec<Vec<Cell>>) -> RawTable {
        RawTable {
            name: "wide".to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
            first_data_row: 2,
        }
    }

    fn month(y: i32, m: u32) -> MonthKey {
        MonthKey::new(y, m).unwrap()
    }

    #[test]
    fn melts_one_record_per_row_and_machine() {
        let t = wide(
            &["Mese", "F01", "F02", ""],
            vec![
                vec![Cell::text("GENNAIO 24"), Cell::Number(10.0), Cell::text("5,5"), Cell::Number(1.0)],
                vec![Cell::text("FEBBRAIO 24"), Cell::Empty, Cell::Number(3.0)],
                vec![Cell::text("Totale"), Cell::Number(99.0), Cell::Number(99.0)],
            ],
        );
        let long = melt(&t, Metric::Quantity);
        assert_eq!(long.len(), 4);
        assert_eq!(long[0].machine_id, "F01");
        assert_eq!(long[0].month, month(2024, 1));
        assert_eq!(long[1].value, Some(5.5));
        assert_eq!(long[2].value, None);
        assert!(long.iter().all(|r| r.metric == Metric::Quantity));
    }

    #[test]
    fn outer_join_keeps_one_sided_machines() {
        let q = vec![LongRecord {
            month: month(2024, 1),
            machine_id: "F01".into(),
            metric: Metric::Quantity,
            value: Some(10.0),
        }];
        let c = vec![
            LongRecord {
                month: month(2024, 1),
                machine_id: "F01".into(),
                metric: Metric::Consumption,
                value: Some(50.0),
            },
            LongRecord {
                month: month(2024, 1),
                machine_id: "F09".into(),
                metric: Metric::Consumption,
                value: Some(7.0),
            },
        ];
        let joined = outer_join(&q, &c);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].machine_id, "F01");
        assert_eq!(joined[0].quantity, Some(10.0));
        assert_eq!(joined[0].consumption, Some(50.0));
        assert_eq!(joined[1].machine_id, "F09");
        assert_eq!(joined[1].quantity, None);
        assert_eq!(joined[1].consumption, Some(7.0));
    }

    #[test]
    fn duplicate_keys_are_paired_not_multiplied() {
        let rec = |metric, value| LongRecord {
            month: month(2024, 3),
            machine_id: "F01".into(),
            metric,
            value: Some(value),
        };
        let q = vec![rec(Metric::Quantity, 1.0), rec(Metric::Quantity, 2.0)];
        let c = vec![rec(Metric::Consumption, 10.0)];
        let joined = outer_join(&q, &c);
        assert_eq!(joined.len(), 2);
        let total_c: f64 = joined.iter().filter_map(|j| j.consumption).sum();
        assert_eq!(total_c, 10.0);
    }
}
