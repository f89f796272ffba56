//! Utility helpers — data paths, home expansion, string trimming.

use std::path::PathBuf;

/// Get the miniclaw data directory (e.g. `~/.miniclaw/`).
pub fn get_data_path() -> PathBuf {
    home_dir().join(".miniclaw")
}

/// Get the default sessions directory (e.g. `~/.miniclaw/sessions/`).
pub fn get_sessions_path() -> PathBuf {
    get_data_path().join("sessions")
}

/// Get the default agent workspace (e.g. `~/.miniclaw/workspace/`).
pub fn get_default_workspace_path() -> PathBuf {
    get_data_path().join("workspace")
}

/// Get the user-level skills directory (e.g. `~/.miniclaw/skills/`).
pub fn get_skills_path() -> PathBuf {
    get_data_path().join("skills")
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Encode a session id as a single path component.
///
/// Bytes outside `[A-Za-z0-9._-]` become `%XX`, so distinct ids never share
/// a component. The empty id maps to `%`, which no non-empty id can produce.
/// Ids made only of dots are fully escaped so they cannot name `.` or `..`.
pub fn safe_filename(s: &str) -> String {
    if s.is_empty() {
        return "%".to_string();
    }
    let dots_only = s.bytes().all(|b| b == b'.');
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        let keep = b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_') || (b == b'.' && !dots_only);
        if keep {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        home_dir()
    } else if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else {
        PathBuf::from(path)
    }
}

fn home_dir() -> PathBuf {
    dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."))
}
