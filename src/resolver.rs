//! Entity Resolver
//!
//! Builds the canonical `NameMapping` from raw (state, district) observations and
//! flags near-duplicate district spellings inside each canonical state.

use crate::config::{PipelineConfig, SourceSpec};
use crate::error::{PipelineError, Result};
use crate::fuzzy_matcher::FuzzyMatcher;
use crate::taxonomy::{self, Resolution};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// One row of the persisted mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    #[serde(rename = "Original_State")]
    pub original_state: String,
    #[serde(rename = "Original_District")]
    pub original_district: String,
    #[serde(rename = "Corrected_State")]
    pub corrected_state: String,
    #[serde(rename = "Corrected_District")]
    pub corrected_district: String,
    #[serde(rename = "Notes", default)]
    pub notes: String,
}

/// Raw (state, district) -> canonical (state, district).
#[derive(Debug, Clone, Default)]
pub struct NameMapping {
    entries: Vec<MappingEntry>,
}

impl NameMapping {
    pub fn new(entries: Vec<MappingEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the note of one raw pair; the only edit allowed after creation.
    pub fn set_note(&mut self, original_state: &str, original_district: &str, note: &str) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.original_state == original_state && e.original_district == original_district)
        {
            Some(entry) => {
                entry.notes = note.to_string();
                true
            }
            None => false,
        }
    }

    /// Drop entries whose corrected state is outside the taxonomy.
    /// Returns the removed entries.
    pub fn retain_canonical(&mut self) -> Vec<MappingEntry> {
        let (kept, rejected): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| taxonomy::is_canonical(&e.corrected_state));
        self.entries = kept;
        rejected
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        if self.entries.is_empty() {
            writer.write_record([
                "Original_State",
                "Original_District",
                "Corrected_State",
                "Corrected_District",
                "Notes",
            ])?;
        }
        for entry in &self.entries {
            writer.serialize(entry)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::MappingMissing(path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::None)
            .from_path(path)?;
        let mut entries = Vec::new();
        for row in reader.deserialize() {
            entries.push(row?);
        }
        Ok(Self { entries })
    }
}

/// Operator queue entry for a raw state spelling that could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    #[serde(rename = "Raw_State")]
    pub raw_state: String,
    #[serde(rename = "Trimmed")]
    pub trimmed: String,
    /// Number of distinct raw pairs carrying this spelling
    #[serde(rename = "Pairs")]
    pub pairs: usize,
    #[serde(rename = "Suggestion")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub distinct_pairs: usize,
    pub mapped_pairs: usize,
    pub dropped_pairs: usize,
    pub unresolved_pairs: usize,
    pub empty_pairs: usize,
    pub flagged_duplicates: usize,
}

#[derive(Debug, Clone)]
pub struct ResolverOutput {
    pub mapping: NameMapping,
    pub review_queue: Vec<ReviewEntry>,
    pub stats: ResolverStats,
}

pub struct EntityResolver {
    matcher: FuzzyMatcher,
    /// Case- and punctuation-insensitive, for review suggestions
    suggester: FuzzyMatcher,
}

impl EntityResolver {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            matcher: FuzzyMatcher::new(config.similarity_cutoff, config.max_duplicate_notes),
            suggester: FuzzyMatcher::new(config.similarity_cutoff, 1).normalizing(),
        }
    }

    /// Resolve raw pairs into a mapping. Input order and duplicates do not matter.
    pub fn resolve<I>(&self, pairs: I) -> ResolverOutput
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let distinct: BTreeSet<(String, String)> = pairs.into_iter().collect();
        let mut stats = ResolverStats {
            distinct_pairs: distinct.len(),
            ..ResolverStats::default()
        };

        let mut entries = Vec::new();
        let mut unresolved: BTreeMap<String, (String, usize)> = BTreeMap::new();

        for (raw_state, raw_district) in distinct {
            let district = raw_district.trim().to_string();
            let state = match taxonomy::resolve_state(&raw_state) {
                Resolution::Resolved(state) => state,
                Resolution::Dropped => {
                    stats.dropped_pairs += 1;
                    continue;
                }
                Resolution::Unresolved(trimmed) => {
                    if trimmed.is_empty() {
                        stats.empty_pairs += 1;
                    } else {
                        stats.unresolved_pairs += 1;
                        unresolved.entry(raw_state.clone()).or_insert((trimmed, 0)).1 += 1;
                    }
                    continue;
                }
            };
            if district.is_empty() {
                stats.empty_pairs += 1;
                continue;
            }

            entries.push(MappingEntry {
                original_state: raw_state,
                original_district: raw_district,
                corrected_state: state.to_string(),
                corrected_district: district,
                notes: String::new(),
            });
        }

        stats.mapped_pairs = entries.len();
        stats.flagged_duplicates = self.flag_duplicates(&mut entries);

        let review_queue = unresolved
            .into_iter()
            .map(|(raw_state, (trimmed, pairs))| {
                let suggestion = self
                    .suggester
                    .best_match(&trimmed, taxonomy::STATES.iter().copied())
                    .map(|(s, _)| s.to_string());
                ReviewEntry {
                    raw_state,
                    trimmed,
                    pairs,
                    suggestion,
                }
            })
            .collect::<Vec<_>>();

        for entry in &review_queue {
            warn!(
                "Unresolved state spelling '{}' ({} pairs), suggestion: {:?}",
                entry.raw_state, entry.pairs, entry.suggestion
            );
        }

        ResolverOutput {
            mapping: NameMapping::new(entries),
            review_queue,
            stats,
        }
    }

    /// Annotate entries whose district has close spellings within the same state.
    /// Returns the number of annotated entries.
    fn flag_duplicates(&self, entries: &mut [MappingEntry]) -> usize {
        let mut by_state: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entry in entries.iter() {
            by_state
                .entry(entry.corrected_state.clone())
                .or_default()
                .insert(entry.corrected_district.clone());
        }

        let mut notes: HashMap<(String, String), String> = HashMap::new();
        for (state, districts) in &by_state {
            for district in districts {
                let matches = self
                    .matcher
                    .close_matches(district, districts.iter().map(|d| d.as_str()));
                if matches.is_empty() {
                    continue;
                }
                let names: Vec<&str> = matches.iter().map(|(m, _)| *m).collect();
                debug!("{} / {} close to {:?}", state, district, names);
                notes.insert(
                    (state.clone(), district.clone()),
                    format!("Possible duplicate of: {}", names.join(", ")),
                );
            }
        }

        let mut flagged = 0;
        for entry in entries.iter_mut() {
            if let Some(note) =
                notes.get(&(entry.corrected_state.clone(), entry.corrected_district.clone()))
            {
                entry.notes = note.clone();
                flagged += 1;
            }
        }
        flagged
    }
}

/// Distinct raw (state, district) pairs of one source table, nulls read as "".
pub fn read_region_pairs(path: &Path, spec: &SourceSpec) -> Result<Vec<(String, String)>> {
    if !path.exists() {
        return Err(PipelineError::source_read(
            spec.kind.as_str(),
            format!("raw file not found: {}", path.display()),
        ));
    }

    let state_col = spec.state_column.as_str();
    let district_col = spec.district_column.as_str();

    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()
        .and_then(|lf| {
            lf.select([
                col(state_col).fill_null(lit("")),
                col(district_col).fill_null(lit("")),
            ])
            .unique(None, UniqueKeepStrategy::First)
            .collect()
        })
        .map_err(|e| PipelineError::source_read(spec.kind.as_str(), e.to_string()))?;

    let states = df.column(state_col)?.str()?;
    let districts = df.column(district_col)?.str()?;

    Ok(states
        .into_iter()
        .zip(districts.into_iter())
        .map(|(s, d)| (s.unwrap_or("").to_string(), d.unwrap_or("").to_string()))
        .collect())
}

/// Read every available raw source, resolve the union of their pairs and persist
/// the mapping plus the review queue.
pub fn generate_mapping(config: &PipelineConfig) -> Result<ResolverOutput> {
    let mut pairs = Vec::new();
    let mut sources_read = 0;
    for spec in &config.sources {
        let path = config.raw_path(spec);
        match read_region_pairs(&path, spec) {
            Ok(found) => {
                info!("{}: {} distinct raw region pairs", spec.kind, found.len());
                pairs.extend(found);
                sources_read += 1;
            }
            Err(e) => warn!("Skipping {} for mapping: {}", spec.kind, e),
        }
    }
    if sources_read == 0 {
        warn!("No raw sources readable; writing an empty mapping");
    }

    let output = EntityResolver::new(config).resolve(pairs);
    info!(
        "Mapping: {} pairs -> {} mapped, {} dropped, {} unresolved, {} flagged as possible duplicates",
        output.stats.distinct_pairs,
        output.stats.mapped_pairs,
        output.stats.dropped_pairs,
        output.stats.unresolved_pairs,
        output.stats.flagged_duplicates
    );

    output.mapping.save(&config.mapping_path())?;
    write_review_queue(&output.review_queue, &config.review_queue_path())?;
    Ok(output)
}

pub fn write_review_queue(queue: &[ReviewEntry], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    if queue.is_empty() {
        writer.write_record(["Raw_State", "Trimmed", "Pairs", "Suggestion"])?;
    }
    for entry in queue {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pair(s: &str, d: &str) -> (String, String) {
        (s.to_string(), d.to_string())
    }

    fn resolver() -> EntityResolver {
        EntityResolver::new(&PipelineConfig::default())
    }

    #[test]
    fn test_aliases_collapse_to_one_entity() {
        let out = resolver().resolve(vec![
            pair("Andra Pradesh", "X"),
            pair("Andhra Pradesh", "X"),
            pair("Andhra Pradesh", "X"),
        ]);
        assert_eq!(out.stats.distinct_pairs, 2);
        assert_eq!(out.mapping.len(), 2);
        for e in out.mapping.entries() {
            assert_eq!(e.corrected_state, "Andhra Pradesh");
            assert_eq!(e.corrected_district, "X");
        }
    }

    #[test]
    fn test_drop_marker_and_unresolved_excluded() {
        let out = resolver().resolve(vec![
            pair("State", "District"),
            pair("Atlantis", "Capital"),
            pair("Keralaa", "Kochi"),
            pair("Kerala", " Kochi "),
        ]);
        assert_eq!(out.stats.dropped_pairs, 1);
        assert_eq!(out.stats.unresolved_pairs, 2);
        assert_eq!(out.mapping.len(), 1);
        assert_eq!(out.mapping.entries()[0].corrected_district, "Kochi");
        assert_eq!(out.mapping.entries()[0].original_district, " Kochi ");

        let keralaa = out.review_queue.iter().find(|r| r.raw_state == "Keralaa").unwrap();
        assert_eq!(keralaa.suggestion.as_deref(), Some("Kerala"));
        let atlantis = out.review_queue.iter().find(|r| r.raw_state == "Atlantis").unwrap();
        assert!(atlantis.suggestion.is_none());
    }

    #[test]
    fn test_every_mapped_state_in_taxonomy() {
        let out = resolver().resolve(vec![
            pair("Orissa", "Puri"),
            pair("west Bengal", "Howrah"),
            pair("Nowhere", "Nothing"),
            pair("", "Blank"),
        ]);
        assert_eq!(out.stats.empty_pairs, 1);
        assert!(out
            .mapping
            .entries()
            .iter()
            .all(|e| taxonomy::is_canonical(&e.corrected_state)));
    }

    #[test]
    fn test_duplicate_flagging_within_state_only() {
        let out = resolver().resolve(vec![
            pair("Maharashtra", "Ahmadnagar"),
            pair("Maharashtra", "Ahmednagar"),
            pair("Maharashtra", "Pune"),
            pair("Gujarat", "Ahmadnagar"),
        ]);
        let note_of = |s: &str, d: &str| {
            out.mapping
                .entries()
                .iter()
                .find(|e| e.corrected_state == s && e.corrected_district == d)
                .map(|e| e.notes.clone())
                .unwrap()
        };
        assert_eq!(note_of("Maharashtra", "Ahmadnagar"), "Possible duplicate of: Ahmednagar");
        assert_eq!(note_of("Maharashtra", "Ahmednagar"), "Possible duplicate of: Ahmadnagar");
        assert_eq!(note_of("Maharashtra", "Pune"), "");
        assert_eq!(note_of("Gujarat", "Ahmadnagar"), "");
        assert_eq!(out.stats.flagged_duplicates, 2);
    }

    #[test]
    fn test_empty_input_gives_empty_mapping() {
        let out = resolver().resolve(Vec::new());
        assert!(out.mapping.is_empty());
        assert!(out.review_queue.is_empty());
    }

    #[test]
    fn test_mapping_persistence_preserves_raw_whitespace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mappings").join("state_mapping.csv");
        let out = resolver().resolve(vec![pair("West  Bengal", " Howrah")]);
        out.mapping.save(&path).unwrap();

        let mut loaded = NameMapping::load(&path).unwrap();
        assert_eq!(loaded.entries(), out.mapping.entries());
        assert!(loaded.set_note("West  Bengal", " Howrah", "checked"));
        assert!(!loaded.set_note("West Bengal", "Howrah", "checked"));
    }

    #[test]
    fn test_retain_canonical_removes_hand_edited_states() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state_mapping.csv");
        std::fs::write(
            &path,
            "Original_State,Original_District,Corrected_State,Corrected_District,Notes\n\
             Atlantis,Capital,Atlantis,Capital,\n\
             Orissa,Puri,Odisha,Puri,\n",
        )
        .unwrap();
        let mut loaded = NameMapping::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        let rejected = loaded.retain_canonical();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].corrected_state, "Atlantis");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entries()[0].corrected_state, "Odisha");
    }

    #[test]
    fn test_missing_mapping_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = NameMapping::load(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::MappingMissing(_)));
    }
}
