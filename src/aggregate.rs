use crate::types::{JoinedRecord, MonthKey, MonthlyAggregate};
use crate::util::sum_present;
use std::collections::BTreeMap;

/// Group by (month, machine) and sum both metrics independently.
///
/// Output is sorted by month then machine and holds at most one row per
/// key. A metric stays absent only when none of its inputs were present.
pub fn aggregate_monthly(joined: &[JoinedRecord]) -> Vec<MonthlyAggregate> {
    let mut groups: BTreeMap<(MonthKey, &str), (Vec<Option<f64>>, Vec<Option<f64>>)> =
        BTreeMap::new();
    for r in joined {
        let e = groups.entry((r.month, r.machine_id.as_str())).or_default();
        e.0.push(r.quantity);
        e.1.push(r.consumption);
    }
    groups
        .into_iter()
        .map(|((month, machine), (q, c))| MonthlyAggregate {
            month,
            machine_id: machine.to_string(),
            quantity: sum_present(q),
            consumption: sum_present(c),
        })
        .collect()
}

impl From<&MonthlyAggregate> for JoinedRecord {
    fn from(a: &MonthlyAggregate) -> Self {
        JoinedRecord {
            month: a.month,
            machine_id: a.machine_id.clone(),
            quantity: a.quantity,
            consumption: a.consumption,
        }
    }
}

/// Distinct machine ids, sorted.
pub fn machines(aggregates: &[MonthlyAggregate]) -> Vec<String> {
    let mut ids: Vec<String> = aggregates.iter().map(|a| a.machine_id.clone()).collect();
    ids.sort();
    ids.dedup();
    ids
}
