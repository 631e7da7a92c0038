//! Fixed first-level region taxonomy and the hand-maintained raw-spelling overrides.

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

/// The 28 states and 8 union territories.
pub const STATES: [&str; 36] = [
    "Andaman and Nicobar Islands",
    "Andhra Pradesh",
    "Arunachal Pradesh",
    "Assam",
    "Bihar",
    "Chandigarh",
    "Chhattisgarh",
    "Dadra and Nagar Haveli and Daman and Diu",
    "Delhi",
    "Goa",
    "Gujarat",
    "Haryana",
    "Himachal Pradesh",
    "Jammu and Kashmir",
    "Jharkhand",
    "Karnataka",
    "Kerala",
    "Ladakh",
    "Lakshadweep",
    "Madhya Pradesh",
    "Maharashtra",
    "Manipur",
    "Meghalaya",
    "Mizoram",
    "Nagaland",
    "Odisha",
    "Puducherry",
    "Punjab",
    "Rajasthan",
    "Sikkim",
    "Tamil Nadu",
    "Telangana",
    "Tripura",
    "Uttar Pradesh",
    "Uttarakhand",
    "West Bengal",
];

lazy_static! {
    static ref TAXONOMY: HashSet<&'static str> = STATES.iter().copied().collect();

    /// Exact raw string -> canonical state, or `None` for rows to drop.
    static ref OVERRIDES: HashMap<&'static str, Option<&'static str>> = {
        let mut m = HashMap::new();
        // header leakage and garbage
        m.insert("100000", None);
        m.insert("State", None);

        m.insert("Andaman & Nicobar Islands", Some("Andaman and Nicobar Islands"));
        m.insert("Andra Pradesh", Some("Andhra Pradesh"));
        m.insert("andhra pradesh", Some("Andhra Pradesh"));
        m.insert("Madanapalle", Some("Andhra Pradesh"));
        m.insert("Darbhanga", Some("Bihar"));
        m.insert("Chhatisgarh", Some("Chhattisgarh"));
        m.insert("Dadra & Nagar Haveli", Some("Dadra and Nagar Haveli and Daman and Diu"));
        m.insert("Dadra and Nagar Haveli", Some("Dadra and Nagar Haveli and Daman and Diu"));
        m.insert("Daman & Diu", Some("Dadra and Nagar Haveli and Daman and Diu"));
        m.insert("Daman and Diu", Some("Dadra and Nagar Haveli and Daman and Diu"));
        m.insert("Greater Kailash 2", Some("Delhi"));
        m.insert("GURGAON", Some("Haryana"));
        m.insert("Jammu & Kashmir", Some("Jammu and Kashmir"));
        m.insert("J&K", Some("Jammu and Kashmir"));
        m.insert("Zammu & Kashmir", Some("Jammu and Kashmir"));
        m.insert("Puttenahalli", Some("Karnataka"));
        m.insert("Nagpur", Some("Maharashtra"));
        m.insert("ODISHA", Some("Odisha"));
        m.insert("odisha", Some("Odisha"));
        m.insert("Orissa", Some("Odisha"));
        m.insert("Pondicherry", Some("Puducherry"));
        m.insert("Jaipur", Some("Rajasthan"));
        m.insert("Raja Annamalai Puram", Some("Tamil Nadu"));
        m.insert("Tamilnadu", Some("Tamil Nadu"));
        m.insert("BALANAGAR", Some("Telangana"));
        m.insert("Uttaranchal", Some("Uttarakhand"));
        m.insert("WEST BENGAL", Some("West Bengal"));
        m.insert("WESTBENGAL", Some("West Bengal"));
        m.insert("West  Bengal", Some("West Bengal"));
        m.insert("West Bangal", Some("West Bengal"));
        m.insert("west Bengal", Some("West Bengal"));
        m.insert("West Bengli", Some("West Bengal"));
        m.insert("West bengal", Some("West Bengal"));
        m.insert("Westbengal", Some("West Bengal"));
        m
    };
}

/// Outcome of resolving one raw first-level region value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(&'static str),
    /// Explicit drop marker: garbage or a stray header row.
    Dropped,
    /// Unknown spelling, queued for operator review.
    Unresolved(String),
}

pub fn is_canonical(state: &str) -> bool {
    TAXONOMY.contains(state)
}

/// Map a raw string to its canonical taxonomy entry.
///
/// The override table is consulted on the exact raw string first, then the
/// trimmed value is checked against the taxonomy itself.
pub fn resolve_state(raw: &str) -> Resolution {
    if let Some(entry) = OVERRIDES.get(raw) {
        return match entry {
            Some(state) => Resolution::Resolved(*state),
            None => Resolution::Dropped,
        };
    }

    let trimmed = raw.trim();
    if let Some(state) = TAXONOMY.get(trimmed) {
        return Resolution::Resolved(*state);
    }
    if let Some(entry) = OVERRIDES.get(trimmed) {
        return match entry {
            Some(state) => Resolution::Resolved(*state),
            None => Resolution::Dropped,
        };
    }

    Resolution::Unresolved(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert_eq!(resolve_state("Kerala"), Resolution::Resolved("Kerala"));
        assert_eq!(resolve_state("  Kerala "), Resolution::Resolved("Kerala"));
    }

    #[test]
    fn test_alias_and_city_folds() {
        assert_eq!(resolve_state("Andra Pradesh"), Resolution::Resolved("Andhra Pradesh"));
        assert_eq!(resolve_state("Orissa"), Resolution::Resolved("Odisha"));
        assert_eq!(resolve_state("GURGAON"), Resolution::Resolved("Haryana"));
        assert_eq!(resolve_state("West  Bengal"), Resolution::Resolved("West Bengal"));
    }

    #[test]
    fn test_drop_markers() {
        assert_eq!(resolve_state("State"), Resolution::Dropped);
        assert_eq!(resolve_state("100000"), Resolution::Dropped);
    }

    #[test]
    fn test_unknown_is_unresolved() {
        assert_eq!(
            resolve_state(" Atlantis "),
            Resolution::Unresolved("Atlantis".to_string())
        );
    }

    #[test]
    fn test_every_override_target_is_canonical() {
        for target in OVERRIDES.values().flatten() {
            assert!(is_canonical(target), "{} missing from taxonomy", target);
        }
    }
}
