//! Oversized-content policy
//!
//! Huge files are not kept verbatim in the mirrored tree; their content is
//! replaced by [`OVERSIZED_PLACEHOLDER`].

use serde::{Deserialize, Serialize};

/// Text stored instead of content that exceeds the policy limits
pub const OVERSIZED_PLACEHOLDER: &str = "Content too huge";

/// Thresholds above which file content is replaced by the placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentPolicy {
    /// Maximum number of lines (default: 2000)
    pub max_lines: usize,
    /// Maximum number of characters (default: 200,000)
    pub max_chars: usize,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self {
            max_lines: 2000,
            max_chars: 200_000,
        }
    }
}

impl ContentPolicy {
    /// Check whether `content` exceeds either limit
    ///
    /// Lines are the `\n`-separated pieces, so a trailing newline counts as
    /// starting one more (empty) line.
    pub fn is_oversized(&self, content: &str) -> bool {
        if content.len() > self.max_chars && content.chars().count() > self.max_chars {
            return true;
        }
        content.split('\n').count() > self.max_lines
    }

    /// Return content as it should be stored in the tree
    pub fn classify(&self, content: String) -> String {
        if self.is_oversized(&content) {
            OVERSIZED_PLACEHOLDER.to_string()
        } else {
            content
        }
    }

    /// Upper bound on bytes worth reading from disk
    ///
    /// A UTF-8 character is at most 4 bytes, so a file longer than this can
    /// never fit under `max_chars`.
    pub fn byte_budget(&self) -> u64 {
        (self.max_chars as u64).saturating_mul(4)
    }
}
