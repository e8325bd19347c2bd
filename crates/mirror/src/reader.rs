//! File content reads
//!
//! The mutator never touches the filesystem directly; it goes through a
//! [`ContentReader`] so read completion order can be controlled in tests.

use async_trait::async_trait;
use copycast_core::{ContentPolicy, OVERSIZED_PLACEHOLDER};
use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Source of file content
#[async_trait]
pub trait ContentReader: Send + Sync + 'static {
    /// Read `path` and return the content as it should be stored, with the
    /// oversized policy already applied
    async fn read(&self, path: &Path, policy: &ContentPolicy) -> io::Result<String>;
}

/// Reads from the local filesystem
///
/// Never buffers more than [`ContentPolicy::byte_budget`] bytes: anything
/// larger cannot fit under the character limit and is classified oversized
/// from its size alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

#[async_trait]
impl ContentReader for FsReader {
    async fn read(&self, path: &Path, policy: &ContentPolicy) -> io::Result<String> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
        }

        let budget = policy.byte_budget();
        if metadata.len() > budget {
            return Ok(OVERSIZED_PLACEHOLDER.to_string());
        }

        // The file may have grown since the stat
        let file = tokio::fs::File::open(path).await?;
        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        file.take(budget + 1).read_to_end(&mut bytes).await?;
        if bytes.len() as u64 > budget {
            return Ok(OVERSIZED_PLACEHOLDER.to_string());
        }

        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        Ok(policy.classify(content))
    }
}
