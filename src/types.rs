use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized (state, district) identity used as the join key across tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalEntity {
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "District")]
    pub district: String,
}

impl CanonicalEntity {
    pub fn new(state: impl Into<String>, district: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            district: district.into(),
        }
    }
}

impl fmt::Display for CanonicalEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.state, self.district)
    }
}

/// Grouping level for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    State,
    District,
}

/// Entity key at a chosen granularity; `district` is `None` at state level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub state: String,
    pub district: Option<String>,
}

impl EntityKey {
    pub fn from_entity(entity: &CanonicalEntity, granularity: Granularity) -> Self {
        Self {
            state: entity.state.clone(),
            district: match granularity {
                Granularity::State => None,
                Granularity::District => Some(entity.district.clone()),
            },
        }
    }

    pub fn district_or_empty(&self) -> &str {
        self.district.as_deref().unwrap_or("")
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.district {
            Some(d) => write!(f, "{} / {}", self.state, d),
            None => f.write_str(&self.state),
        }
    }
}
