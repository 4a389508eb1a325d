//! Environment lookups with `.env` file fallback.
//!
//! A key is resolved from the process environment first, then from a
//! `.env` file of `KEY=VALUE` lines in the working directory (first
//! match wins), then from the caller's default.

use std::fs;
use std::path::Path;

/// Environment variable naming the default store file for the CLI tools.
pub const STORE_PATH_VAR: &str = "MESHDB_FILE_PATH";

/// Resolve `key` from the environment, a `.env` file, or the default.
pub fn env_value(key: &str, default: &str) -> String {
    if let Ok(value) = std::env::var(key) {
        return value;
    }
    env_file_value(Path::new(".env"), key).unwrap_or_else(|| default.to_string())
}

/// Scan an env file for `key`, returning the first match.
pub fn env_file_value(path: &Path, key: &str) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    for line in contents.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        if name == key {
            return Some(value.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmpfs::TempDir;
    use std::fs;

    #[test]
    fn test_env_file_lookup() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join(".env");
        fs::write(&path, "# comment\nOTHER=1\nMESHDB_FILE_PATH=/data/pop.mdb\n").unwrap();

        assert_eq!(
            env_file_value(&path, "MESHDB_FILE_PATH"),
            Some("/data/pop.mdb".to_string())
        );
        assert_eq!(env_file_value(&path, "MISSING"), None);
    }

    #[test]
    fn test_first_match_wins() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join(".env");
        fs::write(&path, "KEY=first\nKEY=second\n").unwrap();

        assert_eq!(env_file_value(&path, "KEY"), Some("first".to_string()));
    }

    #[test]
    fn test_lines_without_equals_are_skipped() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join(".env");
        fs::write(&path, "garbage line\nKEY=value\n").unwrap();

        assert_eq!(env_file_value(&path, "KEY"), Some("value".to_string()));
    }

    #[test]
    fn test_missing_file_falls_back() {
        assert_eq!(
            env_file_value(Path::new("/nonexistent/.env"), "KEY"),
            None
        );
    }
}
