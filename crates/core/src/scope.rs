//! Request-bound job scopes.
//!
//! A [`JobScope`] namespaces one request's worker output inside the shared
//! results directory. Scope tokens are random v4 UUIDs rendered without
//! hyphens so they can be embedded in file and directory names as-is.

use std::fmt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Unique namespace token for one orchestrated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobScope(Uuid);

impl JobScope {
    /// Allocate a fresh scope. Never reused once the request ends.
    pub fn allocate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The token embedded in paths (32 lowercase hex characters).
    pub fn token(&self) -> String {
        self.0.simple().to_string()
    }

    /// Directory the worker writes into for this scope.
    pub fn output_dir(&self, results_root: &Path) -> PathBuf {
        results_root.join(self.token())
    }

    /// Whether a file name belongs to this scope.
    pub fn owns_file_name(&self, file_name: &str) -> bool {
        file_name.contains(&self.token())
    }
}

impl fmt::Display for JobScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn allocated_scopes_are_distinct() {
        let scopes: HashSet<JobScope> = (0..1000).map(|_| JobScope::allocate()).collect();
        assert_eq!(scopes.len(), 1000);
    }

    #[test]
    fn token_is_path_safe() {
        let token = JobScope::allocate().token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn output_dir_nests_under_root() {
        let scope = JobScope::allocate();
        let dir = scope.output_dir(Path::new("/srv/results"));
        assert_eq!(dir, Path::new("/srv/results").join(scope.token()));
    }

    #[test]
    fn owns_only_names_carrying_its_token() {
        let scope = JobScope::allocate();
        let other = JobScope::allocate();
        assert!(scope.owns_file_name(&format!("result_{scope}.json")));
        assert!(!scope.owns_file_name(&format!("result_{other}.json")));
        assert!(!scope.owns_file_name("emotion_summary_20240101.json"));
    }
}
