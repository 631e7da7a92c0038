//! Source Profiler: descriptive totals, shares and a sub-metric correlation.

use crate::cleaner::CleanedTable;
use crate::models::stats;
use crate::types::CanonicalEntity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTotals {
    pub state: String,
    /// Sums in the order of `SourceProfile::metrics`
    pub values: Vec<f64>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCorrelation {
    pub x: String,
    pub y: String,
    /// `None` when undefined (fewer than two districts or no variance)
    pub pearson_r: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub source: String,
    pub rows: usize,
    pub states: usize,
    pub districts: usize,
    pub metrics: Vec<String>,
    pub grand_total: f64,
    pub shares: BTreeMap<String, f64>,
    /// Sorted by total, largest first
    pub state_totals: Vec<StateTotals>,
    pub correlation: Option<MetricCorrelation>,
}

pub fn profile_table(table: &CleanedTable) -> SourceProfile {
    let width = table.metrics.len();
    let mut by_state: BTreeMap<&str, (Vec<f64>, f64)> = BTreeMap::new();
    let mut by_district: BTreeMap<&CanonicalEntity, Vec<f64>> = BTreeMap::new();

    for record in &table.records {
        let state = by_state
            .entry(record.entity.state.as_str())
            .or_insert_with(|| (vec![0.0; width], 0.0));
        let district = by_district
            .entry(&record.entity)
            .or_insert_with(|| vec![0.0; width]);
        for (idx, v) in record.values.iter().enumerate() {
            state.0[idx] += v;
            district[idx] += v;
        }
        state.1 += record.total;
    }

    let mut state_totals: Vec<StateTotals> = by_state
        .into_iter()
        .map(|(state, (values, total))| StateTotals {
            state: state.to_string(),
            values,
            total,
        })
        .collect();
    state_totals.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.state.cmp(&b.state)));

    let grand_total: f64 = state_totals.iter().map(|s| s.total).sum();
    let shares = table
        .metrics
        .iter()
        .enumerate()
        .map(|(idx, metric)| {
            let sum: f64 = state_totals.iter().map(|s| s.values[idx]).sum();
            let share = if grand_total > 0.0 { sum / grand_total } else { 0.0 };
            (metric.clone(), share)
        })
        .collect();

    let correlation = (width >= 2).then(|| {
        let xs: Vec<f64> = by_district.values().map(|v| v[0]).collect();
        let ys: Vec<f64> = by_district.values().map(|v| v[1]).collect();
        MetricCorrelation {
            x: table.metrics[0].clone(),
            y: table.metrics[1].clone(),
            pearson_r: stats::pearson(&xs, &ys),
        }
    });

    let states: BTreeSet<&str> = table.records.iter().map(|r| r.entity.state.as_str()).collect();
    let profile = SourceProfile {
        source: table.source.as_str().to_string(),
        rows: table.len(),
        states: states.len(),
        districts: by_district.len(),
        metrics: table.metrics.clone(),
        grand_total,
        shares,
        state_totals,
        correlation,
    };
    info!(
        "{}: {} rows across {} states and {} districts, total {}",
        profile.source, profile.rows, profile.states, profile.districts, profile.grand_total
    );
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::CleanedRecord;
    use crate::config::SourceKind;

    fn record(state: &str, district: &str, a: f64, b: f64) -> CleanedRecord {
        CleanedRecord {
            date: "01-03-2025".into(),
            entity: CanonicalEntity::new(state, district),
            values: vec![a, b],
            total: a + b,
        }
    }

    #[test]
    fn test_profile_ranks_states_and_shares() {
        let table = CleanedTable {
            source: SourceKind::Biometric,
            metrics: vec!["Bio_age_5_17".into(), "Bio_age_17+".into()],
            records: vec![
                record("Goa", "North Goa", 1.0, 2.0),
                record("Kerala", "Kochi", 10.0, 20.0),
                record("Kerala", "Idukki", 5.0, 10.0),
                record("Kerala", "Kochi", 4.0, 8.0),
            ],
        };
        let profile = profile_table(&table);
        assert_eq!(profile.rows, 4);
        assert_eq!(profile.states, 2);
        assert_eq!(profile.districts, 3);
        assert_eq!(profile.state_totals[0].state, "Kerala");
        assert_eq!(profile.state_totals[0].total, 57.0);
        assert_eq!(profile.grand_total, 60.0);
        assert!((profile.shares["Bio_age_5_17"] - 20.0 / 60.0).abs() < 1e-12);
        let r = profile.correlation.unwrap().pearson_r.unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_table_has_undefined_correlation() {
        let table = CleanedTable {
            source: SourceKind::Demographic,
            metrics: vec!["Demo_age_5_17".into(), "Demo_age_17+".into()],
            records: Vec::new(),
        };
        let profile = profile_table(&table);
        assert_eq!(profile.grand_total, 0.0);
        assert_eq!(profile.correlation.unwrap().pearson_r, None);
        assert_eq!(profile.shares["Demo_age_5_17"], 0.0);
    }
}
