//! Entity Clusterer
//!
//! Groups districts by update volume and the share of updates coming from the
//! young age band. Cluster ids have unstable identity but a stable partition:
//! for a fixed seed and input the grouping repeats, yet the number a group gets
//! may change between runs with different input, so callers must not rely on
//! id continuity.

use crate::cleaner::CleanedTable;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::kmeans::{self, KMeansParams, StandardScaler};
use crate::types::CanonicalEntity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "District")]
    pub district: String,
    #[serde(rename = "Volume")]
    pub volume: f64,
    #[serde(rename = "ChildShare")]
    pub child_share: f64,
    #[serde(rename = "Cluster")]
    pub cluster: usize,
}

/// Per-cluster means on the original feature scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    #[serde(rename = "Cluster")]
    pub cluster: usize,
    #[serde(rename = "Count")]
    pub count: usize,
    #[serde(rename = "Mean_Volume")]
    pub mean_volume: f64,
    #[serde(rename = "Mean_ChildShare")]
    pub mean_child_share: f64,
}

#[derive(Debug, Clone)]
pub struct ClusteringResult {
    pub assignments: Vec<ClusterAssignment>,
    pub summaries: Vec<ClusterSummary>,
    pub inertia: f64,
}

impl ClusteringResult {
    /// Membership sets, independent of cluster numbering.
    pub fn partition(&self) -> BTreeSet<BTreeSet<CanonicalEntity>> {
        let mut groups: BTreeMap<usize, BTreeSet<CanonicalEntity>> = BTreeMap::new();
        for a in &self.assignments {
            groups
                .entry(a.cluster)
                .or_default()
                .insert(CanonicalEntity::new(&a.state, &a.district));
        }
        groups.into_values().collect()
    }
}

/// Volume and young share per State+District, summed over all dates.
pub fn entity_features(table: &CleanedTable, young_metric: &str) -> Result<Vec<(CanonicalEntity, f64, f64)>> {
    let young_idx = table.metric_index(young_metric).ok_or_else(|| {
        PipelineError::Config(format!(
            "young metric '{}' not present in {} table",
            young_metric, table.source
        ))
    })?;

    let mut sums: BTreeMap<&CanonicalEntity, (f64, f64)> = BTreeMap::new();
    for record in &table.records {
        let entry = sums.entry(&record.entity).or_insert((0.0, 0.0));
        entry.0 += record.total;
        entry.1 += record.values[young_idx];
    }

    Ok(sums
        .into_iter()
        .map(|(entity, (volume, young))| {
            let share = if volume > 0.0 { young / volume } else { 0.0 };
            (entity.clone(), volume, share)
        })
        .collect())
}

pub fn cluster_entities(config: &PipelineConfig, table: &CleanedTable) -> Result<ClusteringResult> {
    let young_metric = config
        .source(table.source)
        .and_then(|s| s.young_metric.clone())
        .ok_or_else(|| {
            PipelineError::Config(format!("no young metric configured for {}", table.source))
        })?;

    let features = entity_features(table, &young_metric)?;
    if features.len() < config.cluster_count {
        return Err(PipelineError::model_fit(
            "clustering",
            format!(
                "{} entities for {} clusters",
                features.len(),
                config.cluster_count
            ),
        ));
    }

    let raw: Vec<Vec<f64>> = features.iter().map(|(_, v, s)| vec![*v, *s]).collect();
    let scaled = StandardScaler::fit(&raw).transform(&raw);
    let params = KMeansParams {
        k: config.cluster_count,
        n_init: config.cluster_initializations,
        seed: config.random_seed,
        ..KMeansParams::default()
    };
    let model = kmeans::fit(&scaled, &params)?;

    let assignments: Vec<ClusterAssignment> = features
        .into_iter()
        .zip(&model.labels)
        .map(|((entity, volume, child_share), cluster)| ClusterAssignment {
            state: entity.state,
            district: entity.district,
            volume,
            child_share,
            cluster: *cluster,
        })
        .collect();

    let summaries = summarize(&assignments, config.cluster_count);
    info!(
        "{}: {} districts in {} clusters (inertia {:.3})",
        table.source,
        assignments.len(),
        summaries.len(),
        model.inertia
    );

    Ok(ClusteringResult {
        assignments,
        summaries,
        inertia: model.inertia,
    })
}

fn summarize(assignments: &[ClusterAssignment], k: usize) -> Vec<ClusterSummary> {
    (0..k)
        .filter_map(|cluster| {
            let members: Vec<&ClusterAssignment> =
                assignments.iter().filter(|a| a.cluster == cluster).collect();
            if members.is_empty() {
                return None;
            }
            let n = members.len() as f64;
            Some(ClusterSummary {
                cluster,
                count: members.len(),
                mean_volume: members.iter().map(|a| a.volume).sum::<f64>() / n,
                mean_child_share: members.iter().map(|a| a.child_share).sum::<f64>() / n,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::CleanedRecord;
    use crate::config::SourceKind;

    fn table() -> CleanedTable {
        let mut records = Vec::new();
        let groups = [(1000.0, 0.1), (1000.0, 0.9), (50.0, 0.1), (50.0, 0.9)];
        for (g, (volume, share)) in groups.iter().enumerate() {
            for i in 0..5 {
                let v = volume + i as f64;
                records.push(CleanedRecord {
                    date: "01-03-2025".into(),
                    entity: CanonicalEntity::new("Kerala", format!("D{}{}", g, i)),
                    values: vec![v * share, v * (1.0 - share)],
                    total: v,
                });
            }
        }
        CleanedTable {
            source: SourceKind::Biometric,
            metrics: vec!["Bio_age_5_17".into(), "Bio_age_17+".into()],
            records,
        }
    }

    #[test]
    fn test_features_and_zero_volume() {
        let mut t = table();
        t.records.push(CleanedRecord {
            date: "01-03-2025".into(),
            entity: CanonicalEntity::new("Goa", "Empty"),
            values: vec![0.0, 0.0],
            total: 0.0,
        });
        let features = entity_features(&t, "Bio_age_5_17").unwrap();
        let (_, volume, share) = features.iter().find(|(e, _, _)| e.district == "Empty").unwrap();
        assert_eq!((*volume, *share), (0.0, 0.0));
        assert!(entity_features(&t, "Nope").is_err());
    }

    #[test]
    fn test_recovers_groups_with_stable_partition() {
        let config = PipelineConfig::default();
        let a = cluster_entities(&config, &table()).unwrap();
        let b = cluster_entities(&config, &table()).unwrap();
        assert_eq!(a.partition(), b.partition());
        assert_eq!(a.partition().len(), 4);
        for group in a.partition() {
            let prefixes: BTreeSet<String> = group.iter().map(|e| e.district[..2].to_string()).collect();
            assert_eq!(prefixes.len(), 1);
        }
        assert_eq!(a.summaries.iter().map(|s| s.count).sum::<usize>(), 20);
    }

    #[test]
    fn test_fewer_entities_than_clusters() {
        let mut t = table();
        t.records.truncate(3);
        let err = cluster_entities(&PipelineConfig::default(), &t).unwrap_err();
        assert_eq!(err.class(), "ModelFitError");
    }
}
