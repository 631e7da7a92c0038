//! Temporal Aggregator
//!
//! Buckets cleaned records by calendar month and entity key. Series are sparse:
//! a month with no records for an entity has no entry.

use crate::cleaner::CleanedTable;
use crate::error::{PipelineError, Result};
use crate::time::{parse_day_first, Month};
use crate::types::{EntityKey, Granularity};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Minimum months of history needed to estimate a yearly seasonal cycle.
pub const MIN_SEASONAL_MONTHS: usize = 12;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    pub rows_in: usize,
    pub rows_aggregated: usize,
    pub unparsable_dates: usize,
}

#[derive(Debug, Clone)]
pub struct MonthlySeries {
    pub metric: String,
    pub granularity: Granularity,
    series: BTreeMap<EntityKey, BTreeMap<Month, f64>>,
}

impl MonthlySeries {
    pub fn new(metric: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            metric: metric.into(),
            granularity,
            series: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, key: EntityKey, month: Month, value: f64) {
        *self.series.entry(key).or_default().entry(month).or_insert(0.0) += value;
    }

    pub fn entity_count(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn entity(&self, key: &EntityKey) -> Option<&BTreeMap<Month, f64>> {
        self.series.get(key)
    }

    pub fn entities(&self) -> impl Iterator<Item = (&EntityKey, &BTreeMap<Month, f64>)> {
        self.series.iter()
    }

    /// Every (entity, month, value) observation in key order.
    pub fn observations(&self) -> impl Iterator<Item = (&EntityKey, Month, f64)> {
        self.series
            .iter()
            .flat_map(|(key, months)| months.iter().map(move |(m, v)| (key, *m, *v)))
    }

    pub fn observation_count(&self) -> usize {
        self.series.values().map(|m| m.len()).sum()
    }

    /// Sum across all entities per month.
    pub fn pan_region_totals(&self) -> BTreeMap<Month, f64> {
        let mut totals = BTreeMap::new();
        for (_, month, value) in self.observations() {
            *totals.entry(month).or_insert(0.0) += value;
        }
        totals
    }
}

/// Group a cleaned table by (entity key, month) and sum `metric`.
///
/// `metric` may be any metric column of the table or `Total`. Rows with an
/// unparsable date are dropped and counted.
pub fn aggregate_monthly(
    table: &CleanedTable,
    metric: &str,
    granularity: Granularity,
) -> Result<(MonthlySeries, AggregationStats)> {
    let first_record = table.records.first();
    if let Some(record) = first_record {
        if table.value(record, metric).is_none() {
            return Err(PipelineError::Config(format!(
                "metric '{}' not present in {} table",
                metric, table.source
            )));
        }
    }

    let mut series = MonthlySeries::new(metric, granularity);
    let mut stats = AggregationStats {
        rows_in: table.len(),
        ..AggregationStats::default()
    };

    for record in &table.records {
        let Some(date) = parse_day_first(&record.date) else {
            stats.unparsable_dates += 1;
            continue;
        };
        let value = table.value(record, metric).unwrap_or(0.0);
        series.add(
            EntityKey::from_entity(&record.entity, granularity),
            Month::of(date),
            value,
        );
        stats.rows_aggregated += 1;
    }

    if stats.unparsable_dates > 0 {
        warn!(
            "{}: dropped {} rows with unparsable dates",
            table.source, stats.unparsable_dates
        );
    }
    debug!(
        "{}: {} entities, {} entity-months for {}",
        table.source,
        series.entity_count(),
        series.observation_count(),
        metric
    );
    Ok((series, stats))
}

/// Pan-region monthly totals of `metric`, sparse.
pub fn monthly_totals(table: &CleanedTable, metric: &str) -> Result<(BTreeMap<Month, f64>, AggregationStats)> {
    let (series, stats) = aggregate_monthly(table, metric, Granularity::State)?;
    Ok((series.pan_region_totals(), stats))
}

/// Fill gaps between the first and last month with zeros.
pub fn densify(sparse: &BTreeMap<Month, f64>) -> Vec<(Month, f64)> {
    let (Some(first), Some(last)) = (sparse.keys().next(), sparse.keys().next_back()) else {
        return Vec::new();
    };
    Month::range_inclusive(*first, *last)
        .into_iter()
        .map(|m| (m, sparse.get(&m).copied().unwrap_or(0.0)))
        .collect()
}

/// Whether a dense series is long enough for seasonal modeling.
pub fn has_seasonal_history(dense_len: usize) -> bool {
    dense_len >= MIN_SEASONAL_MONTHS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::CleanedRecord;
    use crate::config::SourceKind;
    use crate::types::CanonicalEntity;

    fn record(date: &str, state: &str, district: &str, a: f64, b: f64) -> CleanedRecord {
        CleanedRecord {
            date: date.to_string(),
            entity: CanonicalEntity::new(state, district),
            values: vec![a, b],
            total: a + b,
        }
    }

    fn table(records: Vec<CleanedRecord>) -> CleanedTable {
        CleanedTable {
            source: SourceKind::Biometric,
            metrics: vec!["Bio_age_5_17".into(), "Bio_age_17+".into()],
            records,
        }
    }

    #[test]
    fn test_groups_by_entity_and_month() {
        let t = table(vec![
            record("01-03-2025", "Andhra Pradesh", "X", 4.0, 6.0),
            record("15-03-2025", "Andhra Pradesh", "X", 2.0, 3.0),
            record("02-04-2025", "Andhra Pradesh", "X", 1.0, 0.0),
            record("02-04-2025", "Kerala", "Kochi", 1.0, 1.0),
            record("not a date", "Kerala", "Kochi", 9.0, 9.0),
        ]);
        let (series, stats) = aggregate_monthly(&t, "Total", Granularity::District).unwrap();
        assert_eq!(stats.unparsable_dates, 1);
        assert_eq!(stats.rows_aggregated, 4);

        let ap = EntityKey::from_entity(&CanonicalEntity::new("Andhra Pradesh", "X"), Granularity::District);
        let months = series.entity(&ap).unwrap();
        assert_eq!(months.get(&Month::new(2025, 3).unwrap()), Some(&15.0));
        assert_eq!(months.get(&Month::new(2025, 4).unwrap()), Some(&1.0));
        assert_eq!(series.observation_count(), 3);
    }

    #[test]
    fn test_sub_metric_and_state_level() {
        let t = table(vec![
            record("01-03-2025", "Kerala", "Kochi", 4.0, 6.0),
            record("01-03-2025", "Kerala", "Idukki", 1.0, 6.0),
        ]);
        let (series, _) = aggregate_monthly(&t, "Bio_age_5_17", Granularity::State).unwrap();
        assert_eq!(series.entity_count(), 1);
        let totals = series.pan_region_totals();
        assert_eq!(totals.get(&Month::new(2025, 3).unwrap()), Some(&5.0));
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let t = table(vec![record("01-03-2025", "Kerala", "Kochi", 1.0, 1.0)]);
        assert!(aggregate_monthly(&t, "Nope", Granularity::State).is_err());
    }

    #[test]
    fn test_densify_fills_gaps() {
        let mut sparse = BTreeMap::new();
        sparse.insert(Month::new(2024, 11).unwrap(), 5.0);
        sparse.insert(Month::new(2025, 2).unwrap(), 7.0);
        let dense = densify(&sparse);
        assert_eq!(dense.len(), 4);
        assert_eq!(dense[1], (Month::new(2024, 12).unwrap(), 0.0));
        assert!(!has_seasonal_history(dense.len()));
        assert!(densify(&BTreeMap::new()).is_empty());
    }
}
