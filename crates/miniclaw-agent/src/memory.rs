//! Agent memory — three long-lived Markdown documents in the workspace.
//!
//! - `MEMORY.md`: accumulated facts and notes
//! - `IDENTITY.md`: who the agent is
//! - `USER.md`: what the agent knows about its user
//!
//! The context builder reads these once per turn. Reads never fail: a
//! missing or unreadable file is an empty document.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

// ─────────────────────────────────────────────
// Categories
// ─────────────────────────────────────────────

/// One of the three memory documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Memory,
    Identity,
    User,
}

impl MemoryCategory {
    /// Search order: memory, identity, user.
    pub const ALL: [MemoryCategory; 3] = [
        MemoryCategory::Memory,
        MemoryCategory::Identity,
        MemoryCategory::User,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            MemoryCategory::Memory => "MEMORY.md",
            MemoryCategory::Identity => "IDENTITY.md",
            MemoryCategory::User => "USER.md",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Memory => "memory",
            MemoryCategory::Identity => "identity",
            MemoryCategory::User => "user",
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(MemoryCategory::Memory),
            "identity" => Ok(MemoryCategory::Identity),
            "user" => Ok(MemoryCategory::User),
            other => Err(format!(
                "unknown memory category '{other}' (expected memory, identity, or user)"
            )),
        }
    }
}

/// A line that matched a memory search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemoryMatch {
    /// File name, e.g. `MEMORY.md`.
    pub file: String,
    /// 1-based line number.
    pub line: usize,
    /// The matching line, trimmed, in its original case.
    pub content: String,
}

// ─────────────────────────────────────────────
// AgentMemoryStore
// ─────────────────────────────────────────────

/// File-backed store for the three memory documents.
#[derive(Debug)]
pub struct AgentMemoryStore {
    workspace: PathBuf,
    /// Serializes read-modify-write appends within this process.
    append_lock: Mutex<()>,
}

impl AgentMemoryStore {
    /// Create a store rooted at `workspace`. The directory is created lazily
    /// on first write.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn path_of(&self, category: MemoryCategory) -> PathBuf {
        self.workspace.join(category.file_name())
    }

    /// Read a document. Returns an empty string if it is absent.
    pub fn read(&self, category: MemoryCategory) -> String {
        std::fs::read_to_string(self.path_of(category)).unwrap_or_default()
    }

    pub fn read_memory(&self) -> String {
        self.read(MemoryCategory::Memory)
    }

    pub fn read_identity(&self) -> String {
        self.read(MemoryCategory::Identity)
    }

    pub fn read_user(&self) -> String {
        self.read(MemoryCategory::User)
    }

    /// Overwrite a document, creating the workspace if needed.
    pub fn write(&self, category: MemoryCategory, content: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.workspace)?;
        std::fs::write(self.path_of(category), content)?;
        debug!(file = category.file_name(), bytes = content.len(), "memory file written");
        Ok(())
    }

    pub fn write_memory(&self, content: &str) -> std::io::Result<()> {
        self.write(MemoryCategory::Memory, content)
    }

    pub fn write_identity(&self, content: &str) -> std::io::Result<()> {
        self.write(MemoryCategory::Identity, content)
    }

    pub fn write_user(&self, content: &str) -> std::io::Result<()> {
        self.write(MemoryCategory::User, content)
    }

    /// Append `text` on a new line.
    ///
    /// An empty or missing document becomes exactly `text`, not `"\n" + text`,
    /// so the first line of a fresh document is never blank.
    pub fn append(&self, category: MemoryCategory, text: &str) -> std::io::Result<()> {
        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let existing = self.read(category);
        let updated = if existing.is_empty() {
            text.to_string()
        } else {
            format!("{existing}\n{text}")
        };
        self.write(category, &updated)
    }

    /// Case-insensitive substring search over all three documents.
    ///
    /// Results follow document order (memory, identity, user), then line
    /// order. An empty query matches nothing.
    pub fn search(&self, query: &str) -> Vec<MemoryMatch> {
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();

        let mut matches = Vec::new();
        for category in MemoryCategory::ALL {
            let content = self.read(category);
            for (idx, line) in content.lines().enumerate() {
                if line.to_lowercase().contains(&needle) {
                    matches.push(MemoryMatch {
                        file: category.file_name().to_string(),
                        line: idx + 1,
                        content: line.trim().to_string(),
                    });
                }
            }
        }
        matches
    }
}
