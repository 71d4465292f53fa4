//! File-name patterns identifying an artifact category.
//!
//! Patterns are globs over the bare file name: `*` matches any run of
//! characters, `?` matches exactly one, everything else is literal, and the
//! whole name must match. Dot-prefixed names are reserved for in-progress
//! writes and never match.

use regex::Regex;

use crate::error::CoreError;

/// Compiled category pattern, e.g. `emotion_summary_*.json`.
#[derive(Debug, Clone)]
pub struct ArtifactPattern {
    glob: String,
    regex: Regex,
}

impl ArtifactPattern {
    pub fn new(glob: &str) -> Result<Self, CoreError> {
        let glob = glob.trim();
        if glob.is_empty() {
            return Err(CoreError::Validation(
                "Artifact pattern must not be empty".to_string(),
            ));
        }
        if glob.contains('/') {
            return Err(CoreError::Validation(format!(
                "Artifact pattern '{glob}' must match a file name, not a path"
            )));
        }

        let mut source = String::with_capacity(glob.len() * 2 + 2);
        source.push('^');
        for c in glob.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| {
            CoreError::Validation(format!("Invalid artifact pattern '{glob}': {e}"))
        })?;

        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    /// Whether `file_name` belongs to this pattern's category.
    pub fn matches(&self, file_name: &str) -> bool {
        !file_name.starts_with('.') && self.regex.is_match(file_name)
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn pattern(glob: &str) -> ArtifactPattern {
        ArtifactPattern::new(glob).expect("valid pattern")
    }

    #[test]
    fn suffix_pattern() {
        let p = pattern("*.json");
        assert!(p.matches("emotion_analysis_results_1.json"));
        assert!(!p.matches(".json"));
        assert!(!p.matches("results.json.tmp"));
        assert!(!p.matches("results.csv"));
    }

    #[test]
    fn prefix_and_suffix_pattern() {
        let p = pattern("emotion_summary_*.json");
        assert!(p.matches("emotion_summary_20240101.json"));
        assert!(p.matches("emotion_summary_.json"));
        assert!(!p.matches("emotion_dataset_20240101.csv"));
        assert!(!p.matches("xemotion_summary_1.json"));
    }

    #[test]
    fn question_mark_matches_one_character() {
        let p = pattern("run_?.csv");
        assert!(p.matches("run_1.csv"));
        assert!(!p.matches("run_12.csv"));
        assert!(!p.matches("run_.csv"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let p = pattern("a+b(1).json");
        assert!(p.matches("a+b(1).json"));
        assert!(!p.matches("aab1.json"));
    }

    #[test]
    fn dot_prefixed_names_never_match() {
        let p = pattern("*");
        assert!(p.matches("visible.json"));
        assert!(!p.matches(".emotion_summary_1.json.partial"));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert_matches!(ArtifactPattern::new(""), Err(CoreError::Validation(_)));
        assert_matches!(ArtifactPattern::new("   "), Err(CoreError::Validation(_)));
        assert_matches!(
            ArtifactPattern::new("nested/*.json"),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn as_str_keeps_the_glob() {
        assert_eq!(pattern(" *.csv ").as_str(), "*.csv");
    }
}
