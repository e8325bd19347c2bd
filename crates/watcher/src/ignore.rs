//! Ignore pattern management for copycast
//!
//! Two sources of ignore patterns:
//! 1. Built-in patterns (.git and binary assets - always active, cannot be negated)
//! 2. The root ignore file (`.gitignore` by default) plus config patterns

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Patterns excluded regardless of the ignore file
pub const BUILTIN_PATTERNS: &[&str] = &[
    ".git", "*.gif", "*.jpg", "*.png", "*.eot", "*.ttf", "*.woff",
];

/// Compiled ignore rules
///
/// Built-ins are compiled into their own matcher and checked first, so a
/// `!` line in the ignore file can never re-include them.
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// Root the patterns are anchored to
    root: PathBuf,

    /// Always-on patterns
    builtins: Gitignore,

    /// Patterns from the ignore file and config, in order
    rules: Gitignore,
}

impl RuleSet {
    /// Compile ignore-file text plus built-ins
    ///
    /// `None` means there is no ignore file: only built-ins apply.
    pub fn compile(ignore_file_text: Option<&str>, builtins: &[&str]) -> Result<Self> {
        Self::compile_at(Path::new(""), ignore_file_text, builtins, &[])
    }

    /// Load rules for a watched root according to `config`
    ///
    /// A missing ignore file is not an error.
    pub fn load(root: &Path, config: &IgnoreConfig) -> Result<Self> {
        let text = if config.use_ignore_file {
            let ignore_path = root.join(&config.ignore_file);
            match std::fs::read_to_string(&ignore_path) {
                Ok(text) => Some(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to read ignore file {}", ignore_path.display())
                    })
                }
            }
        } else {
            None
        };

        Self::compile_at(
            root,
            text.as_deref(),
            BUILTIN_PATTERNS,
            &config.additional_patterns,
        )
    }

    fn compile_at(
        root: &Path,
        text: Option<&str>,
        builtins: &[&str],
        additional: &[String],
    ) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in builtins {
            builder
                .add_line(None, pattern)
                .with_context(|| format!("Invalid built-in pattern: {}", pattern))?;
        }
        let builtins = builder.build()?;

        // Blank lines, comments, `!` and trailing `/` follow gitignore rules
        let mut builder = GitignoreBuilder::new(root);
        for line in text.unwrap_or_default().lines() {
            builder
                .add_line(None, line)
                .with_context(|| format!("Invalid ignore pattern: {}", line))?;
        }
        for pattern in additional {
            builder
                .add_line(None, pattern)
                .with_context(|| format!("Invalid ignore pattern: {}", pattern))?;
        }
        let rules = builder.build()?;

        Ok(Self {
            root: root.to_path_buf(),
            builtins,
            rules,
        })
    }

    /// Check a single path, relative to the root
    ///
    /// Only the path itself is matched; use
    /// [`matches_path_or_parents`](Self::matches_path_or_parents) when an
    /// ignored ancestor should also exclude it.
    pub fn matches(&self, relative_path: &Path, is_dir: bool) -> bool {
        if self.builtins.matched(relative_path, is_dir).is_ignore() {
            return true;
        }
        self.rules.matched(relative_path, is_dir).is_ignore()
    }

    /// Check a path and every ancestor directory, relative to the root
    pub fn matches_path_or_parents(&self, relative_path: &Path, is_dir: bool) -> bool {
        if self.matches(relative_path, is_dir) {
            return true;
        }
        relative_path
            .ancestors()
            .skip(1)
            .filter(|p| !p.as_os_str().is_empty())
            .any(|p| self.matches(p, true))
    }

    /// Number of patterns coming from the ignore file and config
    pub fn rule_count(&self) -> usize {
        self.rules.num_ignores() as usize + self.rules.num_whitelists() as usize
    }

    /// Root the rules are anchored to
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Ignore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Read the root ignore file (default: true)
    #[serde(default = "default_true")]
    pub use_ignore_file: bool,

    /// Name of the ignore file in the root (default: .gitignore)
    #[serde(default = "default_ignore_file")]
    pub ignore_file: String,

    /// Additional patterns from config, applied after the file's rules
    #[serde(default)]
    pub additional_patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            use_ignore_file: true,
            ignore_file: default_ignore_file(),
            additional_patterns: vec![],
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ignore_file() -> String {
    ".gitignore".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_patterns_always_enforced() {
        let rules = RuleSet::compile(None, BUILTIN_PATTERNS).unwrap();

        assert!(rules.matches(Path::new(".git"), true));
        assert!(rules.matches_path_or_parents(Path::new(".git/objects/ab/cd"), false));
        assert!(rules.matches_path_or_parents(Path::new("src/.git/config"), false));
        assert!(rules.matches(Path::new("assets/logo.png"), false));
        assert!(rules.matches(Path::new("fonts/a.woff"), false));

        assert!(!rules.matches(Path::new("src/main.rs"), false));
        assert!(!rules.matches(Path::new("README.md"), false));
    }

    #[test]
    fn test_negation_later_rule_wins() {
        let rules = RuleSet::compile(Some("*.log\n!important.log\n"), BUILTIN_PATTERNS).unwrap();

        assert!(rules.matches(Path::new("a.log"), false));
        assert!(!rules.matches(Path::new("important.log"), false));
        assert!(rules.matches(Path::new("nested/debug.log"), false));
    }

    #[test]
    fn test_builtins_cannot_be_negated() {
        let rules = RuleSet::compile(Some("!*.png\n!.git/\n"), BUILTIN_PATTERNS).unwrap();

        assert!(rules.matches(Path::new("logo.png"), false));
        assert!(rules.matches(Path::new(".git"), true));
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let rules = RuleSet::compile(Some("# build output\n\n   \ntarget/\n"), &[]).unwrap();
        assert_eq!(rules.rule_count(), 1);
        assert!(rules.matches(Path::new("target"), true));
    }

    #[test]
    fn test_trailing_slash_only_matches_directories() {
        let rules = RuleSet::compile(Some("build/\n"), &[]).unwrap();

        assert!(rules.matches(Path::new("build"), true));
        assert!(!rules.matches(Path::new("build"), false));
        assert!(rules.matches_path_or_parents(Path::new("build/output.txt"), false));
    }

    #[test]
    fn test_missing_ignore_file_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let rules = RuleSet::load(temp_dir.path(), &IgnoreConfig::default()).unwrap();

        assert_eq!(rules.rule_count(), 0);
        assert!(rules.matches(Path::new("x.jpg"), false));
        assert!(!rules.matches(Path::new("x.txt"), false));
    }

    #[test]
    fn test_load_from_root() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(".gitignore"), "*.tmp\nnode_modules/\n")?;

        let config = IgnoreConfig {
            additional_patterns: vec!["*.bak".to_string()],
            ..IgnoreConfig::default()
        };
        let rules = RuleSet::load(temp_dir.path(), &config)?;

        assert!(rules.matches(Path::new("file.tmp"), false));
        assert!(rules.matches(Path::new("node_modules"), true));
        assert!(rules.matches(Path::new("old.bak"), false));
        assert!(!rules.matches(Path::new("src/main.rs"), false));

        Ok(())
    }

    #[test]
    fn test_ignore_file_disabled() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(".gitignore"), "*.log\n")?;

        let config = IgnoreConfig {
            use_ignore_file: false,
            ..IgnoreConfig::default()
        };
        let rules = RuleSet::load(temp_dir.path(), &config)?;

        assert!(!rules.matches(Path::new("test.log"), false));
        assert!(rules.matches(Path::new("img.gif"), false));

        Ok(())
    }
}
