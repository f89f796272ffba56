//! `miniclaw memory` and `miniclaw session` — inspect and edit stored state.
//!
//! - `miniclaw memory show [memory|identity|user]`
//! - `miniclaw memory search <QUERY>`
//! - `miniclaw memory append <CATEGORY> <TEXT>`
//! - `miniclaw memory clear [SESSION]`
//! - `miniclaw session list`
//! - `miniclaw session delete <ID>`

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use miniclaw_agent::{AgentMemoryStore, MemoryCategory, MemoryMatch};
use miniclaw_core::config::Config;
use miniclaw_core::session::SessionStore;
use miniclaw_core::types::SessionData;

// ─────────────────────────────────────────────
// Subcommand enums
// ─────────────────────────────────────────────

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// Print one memory document
    Show {
        /// memory, identity, or user
        #[arg(default_value = "memory")]
        category: MemoryCategory,
    },

    /// Case-insensitive search across all memory documents
    Search {
        query: String,
    },

    /// Append a line to a memory document
    Append {
        /// memory, identity, or user
        category: MemoryCategory,
        text: String,
    },

    /// Clear a session's message history
    Clear {
        /// Session id (defaults to the configured default session)
        session: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// List stored sessions, newest first
    List,

    /// Delete a session and everything stored for it
    Delete {
        id: String,
    },
}

// ─────────────────────────────────────────────
// Dispatchers
// ─────────────────────────────────────────────

pub fn dispatch_memory(cmd: MemoryCommands, config: &Config) -> Result<()> {
    let memory = AgentMemoryStore::new(config.workspace_dir());
    match cmd {
        MemoryCommands::Show { category } => {
            println!("{}", format_document(category, &memory.read(category)));
        }
        MemoryCommands::Search { query } => {
            let matches = memory.search(&query);
            if matches.is_empty() {
                println!("{}", format!("No matches for \"{query}\"").dimmed());
            }
            for m in &matches {
                println!("{}", format_match(m));
            }
        }
        MemoryCommands::Append { category, text } => {
            memory
                .append(category, &text)
                .with_context(|| format!("failed to append to {}", category.file_name()))?;
            println!("  {} appended to {}", "✓".green(), category.file_name());
        }
        MemoryCommands::Clear { session } => {
            let id = session.unwrap_or_else(|| config.memory.session.default_session.clone());
            let store = SessionStore::new(config.sessions_dir());
            store
                .clear(&id)
                .with_context(|| format!("failed to clear session '{id}'"))?;
            println!("  {} session \"{id}\" cleared", "✓".green());
        }
    }
    Ok(())
}

pub fn dispatch_session(cmd: SessionCommands, config: &Config) -> Result<()> {
    let store = SessionStore::new(config.sessions_dir());
    match cmd {
        SessionCommands::List => {
            let sessions = store.list_sessions();
            if sessions.is_empty() {
                println!("{}", "No sessions yet.".dimmed());
            }
            for session in &sessions {
                println!("{}", format_session_line(session));
            }
        }
        SessionCommands::Delete { id } => {
            let existed = store
                .delete(&id)
                .with_context(|| format!("failed to delete session '{id}'"))?;
            if existed {
                println!("  {} session \"{id}\" deleted", "✓".green());
            } else {
                println!("  {}", format!("session \"{id}\" did not exist").dimmed());
            }
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────
// Formatting
// ─────────────────────────────────────────────

fn format_document(category: MemoryCategory, content: &str) -> String {
    if content.is_empty() {
        return format!("No {category} content found.");
    }
    let title = category.as_str().to_uppercase();
    format!("=== {title} ===\n{content}\n=== END ===")
}

fn format_match(m: &MemoryMatch) -> String {
    format!("{}:{}: {}", m.file, m.line, m.content)
}

fn format_session_line(session: &SessionData) -> String {
    format!(
        "  {:<24} {:>4} msgs  {:>8} tokens  updated {}",
        session.session_id,
        session.messages.len(),
        session.metadata.total_tokens,
        session.updated_at.format("%Y-%m-%d %H:%M:%S"),
    )
}
