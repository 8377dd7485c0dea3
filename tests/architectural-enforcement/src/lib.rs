//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code outside retry/backoff logic
//! - No unwrap()/expect() in production code
//!
//! The helpers below locate the workspace and split each source file into
//! production code and its trailing `#[cfg(test)]` module.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["director/core/src", "director/daemon/src"];

/// Workspace root (two levels above this crate)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Every `.rs` file below `dir`
#[must_use]
pub fn rust_sources(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// A line of production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 1-based line number
    pub number: usize,
    /// Line text with any trailing `//` comment removed
    pub code: String,
}

/// Lines before the first `#[cfg(test)]`, with comments stripped
#[must_use]
pub fn production_lines(content: &str) -> Vec<SourceLine> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter(|(_, line)| {
            let trimmed = line.trim_start();
            !trimmed.starts_with("//") && !trimmed.starts_with("///")
        })
        .map(|(idx, line)| SourceLine {
            number: idx + 1,
            code: line.split("//").next().unwrap_or(line).to_string(),
        })
        .collect()
}

/// Read a file and return its production lines
#[must_use]
pub fn production_lines_of(path: &Path) -> Vec<SourceLine> {
    fs::read_to_string(path)
        .map(|content| production_lines(&content))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let content = "fn a() {}\n// comment\nfn b() {} // trailing\n#[cfg(test)]\nmod tests {}\n";
        let lines = production_lines(content);
        assert_eq!(
            lines,
            vec![
                SourceLine {
                    number: 1,
                    code: "fn a() {}".into()
                },
                SourceLine {
                    number: 3,
                    code: "fn b() {} ".into()
                },
            ]
        );
    }

    #[test]
    fn test_workspace_root_contains_core() {
        assert!(workspace_root().join("director/core/Cargo.toml").exists());
    }
}
