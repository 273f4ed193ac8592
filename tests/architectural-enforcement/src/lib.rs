//! Architectural Enforcement
//!
//! Source scanners shared by the integration tests in `tests/`. They walk
//! the production crates and flag calls that would stall the runtime:
//! blocking I/O inside async code and sleeps outside the reconnect timer.
//!
//! Only code above a file's first `#[cfg(test)]` counts as production.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["client/core/src", "client/chat/src"];

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File, relative to the workspace root
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What rule was broken
    pub kind: &'static str,
    /// The offending line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.kind,
            self.text
        )
    }
}

/// A production file, loaded and split into lines
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    lines: Vec<String>,
}

impl SourceFile {
    /// Wrap already-loaded content (used by the detector self-tests)
    pub fn from_content(path: impl Into<PathBuf>, content: &str) -> Self {
        let lines = content
            .lines()
            .take_while(|line| !line.trim_start().starts_with("#[cfg(test)]"))
            .map(str::to_string)
            .collect();
        Self {
            path: path.into(),
            lines,
        }
    }

    /// Production lines as `(index, code)` with line comments stripped
    pub fn code_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines.iter().enumerate().filter_map(|(idx, line)| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("//") {
                return None;
            }
            Some((idx, line.split("//").next().unwrap_or(line)))
        })
    }

    /// Whether line `idx` sits inside an `async fn`
    pub fn is_in_async_function(&self, idx: usize) -> bool {
        for line in self.lines[..=idx].iter().rev() {
            if let Some(is_async) = fn_header(line) {
                return is_async;
            }
            let trimmed = line.trim_start();
            if trimmed.starts_with("mod ") || trimmed.starts_with("impl") {
                return false;
            }
        }
        false
    }

    /// Build a violation for line `idx`
    pub fn violation(&self, idx: usize, kind: &'static str) -> Violation {
        Violation {
            path: self.path.clone(),
            line: idx + 1,
            kind,
            text: self.lines[idx].trim().to_string(),
        }
    }
}

/// `Some(is_async)` if the line opens a function
fn fn_header(line: &str) -> Option<bool> {
    let mut words = line.split_whitespace();
    let mut is_async = false;
    for word in words.by_ref() {
        match word {
            "fn" => return Some(is_async),
            "async" => is_async = true,
            w if w.starts_with("pub") || w == "const" || w == "unsafe" => {}
            _ => return None,
        }
    }
    None
}

/// Workspace root, two levels above this crate
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every `.rs` file under [`PRODUCTION_DIRS`]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        for entry in walkdir::WalkDir::new(root.join(dir))
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(content) = fs::read_to_string(path) else {
                continue;
            };
            let relative = path.strip_prefix(&root).unwrap_or(path);
            files.push(SourceFile::from_content(relative, &content));
        }
    }

    files
}

/// Panic with a readable report when `violations` is non-empty
pub fn report(title: &str, violations: &[Violation], hint: &str) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n{title}\n");
    for violation in violations {
        eprintln!("  {violation}");
    }
    eprintln!("\n{hint}");
    panic!("Found {} violation(s) in production code", violations.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_function_detection() {
        let file = SourceFile::from_content(
            "a.rs",
            "pub async fn load() {\n    let s = std::fs::read_to_string(\"x\");\n}\n",
        );
        assert!(file.is_in_async_function(1));
    }

    #[test]
    fn test_sync_function_detection() {
        let file = SourceFile::from_content(
            "a.rs",
            "fn read_toml(path: &Path) {\n    std::fs::read_to_string(path);\n}\n",
        );
        assert!(!file.is_in_async_function(1));
    }

    #[test]
    fn test_test_module_is_excluded() {
        let file = SourceFile::from_content(
            "a.rs",
            "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n",
        );
        assert_eq!(file.code_lines().count(), 1);
    }

    #[test]
    fn test_comments_are_stripped() {
        let file = SourceFile::from_content("a.rs", "// std::thread::sleep\nlet x = 1; // note\n");
        let lines: Vec<_> = file.code_lines().collect();
        assert_eq!(lines, vec![(1, "let x = 1; ")]);
    }

    #[test]
    fn test_production_dirs_exist() {
        for dir in PRODUCTION_DIRS {
            assert!(workspace_root().join(dir).is_dir(), "{dir} is missing");
        }
    }
}
