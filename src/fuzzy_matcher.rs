use lazy_static::lazy_static;
use regex::Regex;
use strsim::normalized_levenshtein;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("static regex");
}

/// Fuzzy matcher for region names with spelling variations
pub struct FuzzyMatcher {
    /// Similarity threshold (0.0-1.0) for considering two names close
    pub similarity_threshold: f64,
    /// Maximum number of close matches returned per lookup
    pub max_matches: usize,
    /// Whether to case-fold and collapse whitespace before comparison
    pub normalize: bool,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            max_matches: 3,
            normalize: false,
        }
    }
}

impl FuzzyMatcher {
    pub fn new(threshold: f64, max_matches: usize) -> Self {
        Self {
            similarity_threshold: threshold,
            max_matches,
            normalize: false,
        }
    }

    pub fn normalizing(mut self) -> Self {
        self.normalize = true;
        self
    }

    /// Lowercase and collapse runs of whitespace
    pub fn normalize_string(&self, s: &str) -> String {
        if !self.normalize {
            return s.to_string();
        }
        WHITESPACE
            .replace_all(&s.to_lowercase(), " ")
            .trim()
            .to_string()
    }

    /// Edit-distance similarity ratio between two names
    /// Returns a score between 0.0 and 1.0 (higher = more similar)
    pub fn similarity(&self, s1: &str, s2: &str) -> f64 {
        normalized_levenshtein(&self.normalize_string(s1), &self.normalize_string(s2))
    }

    pub fn is_match(&self, s1: &str, s2: &str) -> bool {
        self.similarity(s1, s2) >= self.similarity_threshold
    }

    /// Close matches for `target` among `candidates`, best first.
    ///
    /// Candidates identical to the target are skipped. Ties are broken by name so
    /// the output is deterministic.
    pub fn close_matches<'a, I>(&self, target: &str, candidates: I) -> Vec<(&'a str, f64)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut matches: Vec<(&'a str, f64)> = candidates
            .into_iter()
            .filter(|c| *c != target)
            .map(|c| (c, self.similarity(target, c)))
            .filter(|(_, score)| *score >= self.similarity_threshold)
            .collect();

        matches.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        matches.dedup_by(|a, b| a.0 == b.0);
        matches.truncate(self.max_matches);
        matches
    }

    /// Single best match, if any clears the threshold
    pub fn best_match<'a, I>(&self, target: &str, candidates: I) -> Option<(&'a str, f64)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<(&'a str, f64)> = None;
        for candidate in candidates {
            let score = self.similarity(target, candidate);
            if score < self.similarity_threshold {
                continue;
            }
            match best {
                Some((_, best_score)) if best_score >= score => {}
                _ => best = Some((candidate, score)),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_string() {
        let matcher = FuzzyMatcher::default().normalizing();
        assert_eq!(matcher.normalize_string("  West   BENGAL "), "west bengal");

        let raw = FuzzyMatcher::default();
        assert_eq!(raw.normalize_string("West  Bengal"), "West  Bengal");
    }

    #[test]
    fn test_similarity() {
        let matcher = FuzzyMatcher::default();
        assert!((matcher.similarity("Nashik", "Nashik") - 1.0).abs() < 1e-12);
        // one substitution in eight characters
        let s = matcher.similarity("Belgaum1", "Belgaum2");
        assert!((s - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_is_match() {
        let matcher = FuzzyMatcher::new(0.85, 3);
        assert!(!matcher.is_match("Bangalore Urban", "Bengaluru Urban"));
        assert!(matcher.is_match("Ahmadnagar", "Ahmednagar"));
        assert!(!matcher.is_match("Pune", "Thane"));
    }

    #[test]
    fn test_close_matches_excludes_self_and_caps() {
        let matcher = FuzzyMatcher::new(0.85, 2);
        let names = ["Ahmadnagar", "Ahmednagar", "Ahmadnagr", "Ahmadnagar ", "Pune"];
        let matches = matcher.close_matches("Ahmadnagar", names.iter().copied());
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|(m, _)| *m != "Ahmadnagar"));
        assert!(matches[0].1 >= matches[1].1);
    }

    #[test]
    fn test_best_match() {
        let matcher = FuzzyMatcher::new(0.85, 3);
        let best = matcher.best_match("Karnatka", ["Kerala", "Karnataka"].iter().copied());
        assert_eq!(best.map(|(m, _)| m), Some("Karnataka"));
        assert!(matcher.best_match("Atlantis", ["Kerala"].iter().copied()).is_none());
    }
}
