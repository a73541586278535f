use crate::dates::parse_month_label;
use crate::types::{
    AnomalyPreviewRow, AnomalyRecord, Cell, GlobalPreviewRow, GlobalSummary, MonthKey,
    MonthlyAggregate, Sheet,
};
use crate::util::{format_number, format_opt, parse_f64_safe, sum_present};
use std::collections::{BTreeMap, BTreeSet};

pub const MONTH_HEADER: &str = "Mese";
pub const CONSUMPTION_LABEL: &str = "kWh";
pub const QUANTITY_LABEL: &str = "Pezzi";

/// A horizontal merge within one row, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSpan {
    pub row: usize,
    pub first_col: usize,
    pub last_col: usize,
}

/// The printable machine report as a cell grid. Separator rows are empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupedLayout {
    pub rows: Vec<Vec<Cell>>,
    pub merges: Vec<MergeSpan>,
    pub groups: usize,
    /// Number of columns used by the widest group.
    pub width: usize,
}

/// Lay out the monthly aggregates in blocks of `machines_per_row` machines.
///
/// Each block has a machine header row (names merged over two columns), a
/// metric header row and one row per month that any machine of the block
/// reports. Blocks are separated by one empty row.
pub fn build_grouped_layout(
    aggregates: &[MonthlyAggregate],
    machines_per_row: usize,
) -> GroupedLayout {
    let mut by_key: BTreeMap<(&str, MonthKey), &MonthlyAggregate> = BTreeMap::new();
    for a in aggregates {
        by_key.insert((a.machine_id.as_str(), a.month), a);
    }
    let machines = crate::aggregate::machines(aggregates);
    let chunks: Vec<&[String]> = machines.chunks(machines_per_row.max(1)).collect();

    let mut layout = GroupedLayout {
        groups: chunks.len(),
        ..GroupedLayout::default()
    };
    for (g, chunk) in chunks.iter().enumerate() {
        layout.width = layout.width.max(1 + 2 * chunk.len());

        let header_row = layout.rows.len();
        let mut names = vec![Cell::text(MONTH_HEADER)];
        let mut metrics = vec![Cell::Empty];
        for m in chunk.iter() {
            let col = names.len();
            names.push(Cell::text(m));
            names.push(Cell::Empty);
            metrics.push(Cell::text(CONSUMPTION_LABEL));
            metrics.push(Cell::text(QUANTITY_LABEL));
            layout.merges.push(MergeSpan {
                row: header_row,
                first_col: col,
                last_col: col + 1,
            });
        }
        layout.rows.push(names);
        layout.rows.push(metrics);

        let months: BTreeSet<MonthKey> = aggregates
            .iter()
            .filter(|a| chunk.contains(&a.machine_id))
            .map(|a| a.month)
            .collect();
        for month in months {
            let mut row = vec![Cell::Text(month.to_string())];
            for m in chunk.iter() {
                match by_key.get(&(m.as_str(), month)) {
                    Some(a) => {
                        row.push(Cell::from_opt(a.consumption));
                        row.push(Cell::from_opt(a.quantity));
                    }
                    None => row.extend([Cell::Empty, Cell::Empty]),
                }
            }
            layout.rows.push(row);
        }

        if g + 1 < chunks.len() {
            layout.rows.push(Vec::new());
        }
    }
    layout
}

/// Billed amount per month from a header-less billing sheet: first column
/// is the month, last column the amount. First occurrence of a month wins.
pub fn billing_by_month(sheet: &Sheet) -> BTreeMap<MonthKey, f64> {
    let width = sheet.rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = BTreeMap::new();
    if width < 2 {
        return out;
    }
    for row in &sheet.rows {
        let month = match row.first() {
            Some(Cell::Date(d)) => Some(MonthKey::from_date(d.date())),
            Some(Cell::Text(s)) => parse_month_label(s),
            _ => None,
        };
        let amount = match row.get(width - 1) {
            Some(Cell::Number(n)) if n.is_finite() => Some(*n),
            Some(Cell::Text(s)) => parse_f64_safe(s),
            _ => None,
        };
        if let (Some(month), Some(amount)) = (month, amount) {
            out.entry(month).or_insert(amount);
        }
    }
    out
}

/// Monthly totals across all machines, left-joined with the billing table.
pub fn global_summary(
    aggregates: &[MonthlyAggregate],
    billing: &BTreeMap<MonthKey, f64>,
) -> Vec<GlobalSummary> {
    let mut by_month: BTreeMap<MonthKey, (Vec<Option<f64>>, Vec<Option<f64>>)> = BTreeMap::new();
    for a in aggregates {
        let e = by_month.entry(a.month).or_default();
        e.0.push(a.quantity);
        e.1.push(a.consumption);
    }
    by_month
        .into_iter()
        .map(|(month, (q, c))| GlobalSummary {
            month,
            total_quantity: sum_present(q),
            total_consumption: sum_present(c),
            billed_amount: billing.get(&month).copied(),
        })
        .collect()
}

pub fn anomaly_preview_rows(anomalies: &[AnomalyRecord]) -> Vec<AnomalyPreviewRow> {
    anomalies
        .iter()
        .map(|a| AnomalyPreviewRow {
            month: a.aggregate.month.to_string(),
            machine: a.aggregate.machine_id.clone(),
            efficiency: format_number(a.efficiency, 2),
            kind: a.kind.to_string(),
            reason: a.reason.clone(),
        })
        .collect()
}

pub fn global_preview_rows(summary: &[GlobalSummary]) -> Vec<GlobalPreviewRow> {
    summary
        .iter()
        .map(|s| GlobalPreviewRow {
            month: s.month.to_string(),
            total_quantity: format_opt(s.total_quantity, 0),
            total_consumption: format_opt(s.total_consumption, 2),
            billed_amount: format_opt(s.billed_amount, 2),
        })
        .collect()
}
