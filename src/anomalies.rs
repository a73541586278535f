// Efficiency anomaly detection.
//
// Efficiency is consumption per piece. Rows more than two sample standard
// deviations away from the mean of the positive efficiencies are flagged.
use crate::types::{AnomalyKind, AnomalyRecord, MonthlyAggregate};
use crate::util::{average, sample_std_dev};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub mean: f64,
    pub std_dev: f64,
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnomalyReport {
    /// `None` when there were not enough positive efficiencies to judge.
    pub thresholds: Option<Thresholds>,
    pub anomalies: Vec<AnomalyRecord>,
}

/// Consumption / quantity, or 0 when the ratio is undefined.
pub fn efficiency(a: &MonthlyAggregate) -> f64 {
    match (a.consumption, a.quantity) {
        (Some(c), Some(q)) if q != 0.0 => {
            let e = c / q;
            if e.is_finite() {
                e
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

pub fn thresholds(efficiencies: &[f64]) -> Option<Thresholds> {
    let positive: Vec<f64> = efficiencies.iter().copied().filter(|e| *e > 0.0).collect();
    let mean = average(&positive);
    let std_dev = sample_std_dev(&positive)?;
    Some(Thresholds {
        mean,
        std_dev,
        high: mean + 2.0 * std_dev,
        low: (mean - 2.0 * std_dev).max(0.0),
    })
}

pub fn detect_anomalies(aggregates: &[MonthlyAggregate]) -> AnomalyReport {
    let effs: Vec<f64> = aggregates.iter().map(efficiency).collect();
    let Some(t) = thresholds(&effs) else {
        return AnomalyReport::default();
    };
    let anomalies = aggregates
        .iter()
        .zip(effs)
        .filter_map(|(a, e)| {
            let kind = if e > t.high {
                AnomalyKind::High
            } else if e > 0.0 && e < t.low {
                AnomalyKind::Low
            } else {
                return None;
            };
            Some(AnomalyRecord {
                aggregate: a.clone(),
                efficiency: e,
                kind,
                reason: format!(
                    "Consumo/Pezzo {} ({:.2} vs media {:.2})",
                    kind, e, t.mean
                ),
            })
        })
        .collect();
    AnomalyReport {
        thresholds: Some(t),
        anomalies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MonthKey;

    fn agg(i: u32, q: Option<f64>, c: Option<f64>) -> MonthlyAggregate {
        MonthlyAggregate {
            month: MonthKey::new(2024, 1 + (i % 12)).unwrap(),
            machine_id: format!("F{:02}", i),
            quantity: q,
            consumption: c,
        }
    }

    fn series(effs: &[f64]) -> Vec<MonthlyAggregate> {
        effs.iter()
            .enumerate()
            .map(|(i, e)| agg(i as u32, Some(10.0), Some(e * 10.0)))
            .collect()
    }

    #[test]
    fn efficiency_is_zero_when_undefined() {
        assert_eq!(efficiency(&agg(0, Some(0.0), Some(5.0))), 0.0);
        assert_eq!(efficiency(&agg(0, None, Some(5.0))), 0.0);
        assert_eq!(efficiency(&agg(0, Some(5.0), None)), 0.0);
        assert_eq!(efficiency(&agg(0, Some(4.0), Some(10.0))), 2.5);
    }

    #[test]
    fn flags_high_outlier() {
        let mut effs = vec![1.0; 9];
        effs.push(10.0);
        let report = detect_anomalies(&series(&effs));
        assert_eq!(report.anomalies.len(), 1);
        let a = &report.anomalies[0];
        assert_eq!(a.kind, AnomalyKind::High);
        assert_eq!(a.aggregate.machine_id, "F09");
        assert_eq!(a.reason, "Consumo/Pezzo ALTO (10.00 vs media 1.90)");
    }

    #[test]
    fn flags_low_outlier() {
        let mut effs = vec![10.0; 9];
        effs.push(1.0);
        let report = detect_anomalies(&series(&effs));
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].kind, AnomalyKind::Low);
        assert!(report.anomalies[0].reason.contains("BASSO"));
    }

    #[test]
    fn equal_efficiencies_flag_nothing() {
        let report = detect_anomalies(&series(&[2.0, 2.0, 2.0, 2.0]));
        let t = report.thresholds.unwrap();
        assert_eq!(t.std_dev, 0.0);
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn no_positive_efficiency_skips_detection() {
        let rows = vec![agg(0, Some(0.0), Some(3.0)), agg(1, None, None)];
        let report = detect_anomalies(&rows);
        assert_eq!(report, AnomalyReport::default());
    }

    #[test]
    fn zero_efficiency_rows_are_never_low() {
        let mut rows = series(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 1.0]);
        rows.push(agg(11, Some(0.0), Some(1.0)));
        let report = detect_anomalies(&rows);
        assert!(report.anomalies.iter().all(|a| a.efficiency > 0.0));
    }

    #[test]
    fn low_threshold_is_clamped_at_zero() {
        let t = thresholds(&[1.0, 1.0, 1.0, 1.0, 10.0]).unwrap();
        assert!((t.mean - 2.8).abs() < 1e-9);
        assert_eq!(t.low, 0.0);
    }
}
