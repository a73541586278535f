use crate::types::{Field, RawTable};
use crate::util::normalize_header;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    pub processed: Vec<String>,
    pub excluded: Vec<String>,
    /// Sheets dropped because no column maps to the machine identity.
    pub missing_identity: Vec<String>,
}

/// Normalize headers of every non-excluded sheet and apply the rename
/// mapping. Sheets without a machine column are reported and dropped whole.
pub fn normalize_tables(
    tables: Vec<RawTable>,
    excluded: &BTreeSet<String>,
    mapping: &BTreeMap<String, String>,
) -> (Vec<RawTable>, NormalizeReport) {
    let mut report = NormalizeReport::default();
    let mut out = Vec::new();
    for mut table in tables {
        if excluded.contains(&table.name) {
            debug!(sheet = %table.name, "sheet excluded by configuration");
            report.excluded.push(table.name);
            continue;
        }
        table.headers = table
            .headers
            .iter()
            .map(|h| {
                let h = normalize_header(h);
                mapping.get(&h).cloned().unwrap_or(h)
            })
            .collect();
        if !table
            .headers
            .iter()
            .any(|h| h == Field::MachineId.column_name())
        {
            warn!(
                sheet = %table.name,
                column = Field::MachineId.column_name(),
                "sheet has no machine column, skipping it"
            );
            report.missing_identity.push(table.name);
            continue;
        }
        report.processed.push(table.name.clone());
        out.push(table);
    }
    (out, report)
}
