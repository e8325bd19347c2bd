//! JSON messages sent to mirror consumers
//!
//! One JSON object per line, tagged by `event`:
//!
//! ```text
//! {"event":"connect"}
//! {"event":"tree","seq":3,"tree":{"name":"proj","children":[...]}}
//! {"event":"disconnect"}
//! ```

use copycast_core::{Node, Snapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Message on the consumer stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum WireMessage {
    /// A consumer attached
    Connect,
    /// Full tree after mutation `seq`
    Tree { seq: u64, tree: Arc<Node> },
    /// A consumer detached
    Disconnect,
}

impl WireMessage {
    pub fn tree(snapshot: &Snapshot) -> Self {
        WireMessage::Tree {
            seq: snapshot.seq(),
            tree: Arc::clone(snapshot.root()),
        }
    }

    /// Serialize as a single line without the trailing newline
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Pretty-printed form for humans
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}
