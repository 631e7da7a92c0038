use aadhaar_pulse::analytics::{
    cluster_entities, detect_anomalies, forecast_source, ForecastStatus,
};
use aadhaar_pulse::cleaner::{CleanedRecord, CleanedTable};
use aadhaar_pulse::config::{PipelineConfig, SourceKind};
use aadhaar_pulse::models::stats;
use aadhaar_pulse::types::CanonicalEntity;
use std::collections::BTreeMap;

fn bio_record(day_month_year: &str, state: &str, district: &str, young: f64, adult: f64) -> CleanedRecord {
    CleanedRecord {
        date: day_month_year.to_string(),
        entity: CanonicalEntity::new(state, district),
        values: vec![young, adult],
        total: young + adult,
    }
}

fn bio_table(records: Vec<CleanedRecord>) -> CleanedTable {
    CleanedTable {
        source: SourceKind::Biometric,
        metrics: vec!["Bio_age_5_17".to_string(), "Bio_age_17+".to_string()],
        records,
    }
}

/// `months` consecutive months starting January 2023, one record per month.
fn monthly_dates(months: usize) -> Vec<String> {
    (0..months)
        .map(|i| format!("15-{:02}-{}", i % 12 + 1, 2023 + i / 12))
        .collect()
}

#[test]
fn test_spike_scenario_pins_sample_std() {
    let dates = monthly_dates(4);
    let values = [10.0, 10.0, 10.0, 100.0];
    let mut records: Vec<CleanedRecord> = dates
        .iter()
        .zip(values)
        .map(|(d, v)| bio_record(d, "Kerala", "Kochi", 0.0, v))
        .collect();
    // a second, flat entity so the forest has something normal to compare
    for d in &dates {
        records.push(bio_record(d, "Goa", "North Goa", 0.0, 50.0));
    }

    let report = detect_anomalies(&PipelineConfig::default(), &bio_table(records)).unwrap();
    let kochi: Vec<_> = report.records.iter().filter(|r| r.district == "Kochi").collect();
    assert_eq!(kochi.len(), 4);
    for r in &kochi[..3] {
        assert!((r.z + 0.5).abs() < 1e-3);
    }
    assert!((kochi[3].z - 1.5).abs() < 1e-3);
    let spike_is_max = kochi
        .iter()
        .all(|r| r.z <= kochi[3].z);
    assert!(spike_is_max);
}

#[test]
fn test_z_scores_center_on_zero_per_entity() {
    let dates = monthly_dates(9);
    let mut records = Vec::new();
    for (e, district) in ["A", "B", "C"].iter().enumerate() {
        for (i, d) in dates.iter().enumerate() {
            let v = ((i * 7 + e * 3) % 11) as f64 * (e + 1) as f64 + 5.0;
            records.push(bio_record(d, "Maharashtra", district, 1.0, v));
        }
    }
    let report = detect_anomalies(&PipelineConfig::default(), &bio_table(records)).unwrap();

    let mut by_entity: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for r in &report.records {
        by_entity.entry(r.district.as_str()).or_default().push(r.z);
    }
    assert_eq!(by_entity.len(), 3);
    for zs in by_entity.values() {
        assert!(zs.len() >= 2);
        assert!(stats::mean(zs).unwrap().abs() < 1e-9);
    }
}

#[test]
fn test_outlier_fraction_tracks_contamination() {
    let dates = monthly_dates(10);
    let mut records = Vec::new();
    let mut n = 0usize;
    for e in 0..100 {
        for (m, d) in dates.iter().enumerate() {
            let base = 1000.0 + e as f64 * 3.7 + m as f64 * 1.3;
            // one observation in twenty is an injected spike
            let value = if n % 20 == 7 { base * 4.0 + n as f64 } else { base };
            records.push(bio_record(d, "Tamil Nadu", &format!("District {:03}", e), 0.0, value));
            n += 1;
        }
    }

    let report = detect_anomalies(&PipelineConfig::default(), &bio_table(records)).unwrap();
    assert_eq!(report.records.len(), 1000);
    let fraction = report.outlier_fraction();
    assert!((0.03..=0.07).contains(&fraction), "fraction {}", fraction);
}

#[test]
fn test_clustering_partition_is_deterministic() {
    let mut records = Vec::new();
    for e in 0..24 {
        let volume = 100.0 + (e * e % 37) as f64 * 25.0;
        let share = (e % 5) as f64 / 5.0 + 0.05;
        records.push(bio_record(
            "01-03-2025",
            if e % 2 == 0 { "Kerala" } else { "Goa" },
            &format!("D{:02}", e),
            volume * share,
            volume * (1.0 - share),
        ));
    }
    let table = bio_table(records);
    let config = PipelineConfig::default();

    let first = cluster_entities(&config, &table).unwrap();
    let second = cluster_entities(&config, &table).unwrap();
    assert_eq!(first.assignments.len(), 24);
    assert_eq!(first.partition(), second.partition());
    assert!(first.assignments.iter().all(|a| a.cluster < config.cluster_count));
}

#[test]
fn test_forecast_horizon_and_short_history() {
    let config = PipelineConfig::default();

    let long: Vec<CleanedRecord> = monthly_dates(30)
        .iter()
        .enumerate()
        .map(|(i, d)| bio_record(d, "Kerala", "Kochi", 10.0, 500.0 + (i % 12) as f64 * 20.0 + i as f64))
        .collect();
    let series = forecast_source(&config, &bio_table(long)).unwrap();
    assert_eq!(series.status, ForecastStatus::Ok);
    assert_eq!(series.history.len(), 30);
    assert_eq!(series.train_len, 24);
    let test_len = series.test().len();
    assert_eq!(test_len, 6);
    assert_eq!(series.forecast.len(), test_len + 6);
    let mut expected = series.train().last().unwrap().0;
    for (month, _) in &series.forecast {
        expected = expected.succ();
        assert_eq!(*month, expected);
    }

    let short: Vec<CleanedRecord> = monthly_dates(6)
        .iter()
        .map(|d| bio_record(d, "Kerala", "Kochi", 1.0, 9.0))
        .collect();
    let series = forecast_source(&config, &bio_table(short)).unwrap();
    assert_eq!(series.status, ForecastStatus::InsufficientHistory);
    assert_eq!(series.history.len(), 6);
    assert!(series.forecast.is_empty());
    assert!(series.rmse.is_none());
}

#[test]
fn test_forecast_fills_gap_months_with_zero() {
    let mut dates = monthly_dates(14);
    dates.remove(5);
    let records: Vec<CleanedRecord> = dates
        .iter()
        .map(|d| bio_record(d, "Goa", "North Goa", 1.0, 1.0))
        .collect();
    let series = forecast_source(&PipelineConfig::default(), &bio_table(records)).unwrap();
    assert_eq!(series.history.len(), 14);
    assert_eq!(series.history[5].1, 0.0);
}
