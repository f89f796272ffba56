//! Session persistence.
//!
//! Layout: `<storage_dir>/<safe_id>/session.json`, one pretty-printed
//! [`SessionData`] document per session. Saves go through a temp file and a
//! rename so a reader never sees a half-written record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::types::{SessionData, SessionMessage};
use crate::utils;

const SESSION_FILE: &str = "session.json";

/// Id used when a caller does not name a session.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Durable, append-only conversation history keyed by session id.
#[derive(Clone, Debug)]
pub struct SessionStore {
    storage_dir: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at `storage_dir`. Nothing touches disk until the
    /// first save.
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn session_dir(&self, id: &str) -> PathBuf {
        self.storage_dir.join(utils::safe_filename(id))
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join(SESSION_FILE)
    }

    /// Whether a record exists for `id`.
    pub fn exists(&self, id: &str) -> bool {
        self.session_path(id).is_file()
    }

    /// Load a session. Fails with [`SessionError::NotFound`] if absent.
    pub fn load(&self, id: &str) -> Result<SessionData, SessionError> {
        let path = self.session_path(id);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SessionError::NotFound(id.to_string()));
            }
            Err(e) => return Err(SessionError::Io(e)),
        };

        let session: SessionData =
            serde_json::from_str(&content).map_err(|e| SessionError::Corrupt {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        if session.session_id != id {
            return Err(SessionError::Corrupt {
                id: id.to_string(),
                reason: format!("record belongs to session '{}'", session.session_id),
            });
        }
        debug!(
            session_id = id,
            messages = session.messages.len(),
            "Loaded session"
        );
        Ok(session)
    }

    /// Persist `data` under `id`, refreshing `updated_at`.
    pub fn save(&self, id: &str, data: &mut SessionData) -> Result<(), SessionError> {
        let dir = self.session_dir(id);
        std::fs::create_dir_all(&dir)?;

        data.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(data).map_err(|e| SessionError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        let path = dir.join(SESSION_FILE);
        let tmp = dir.join(format!("{SESSION_FILE}.tmp"));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        debug!(
            session_id = id,
            messages = data.messages.len(),
            path = %path.display(),
            "Saved session"
        );
        Ok(())
    }

    /// Create and persist an empty session. `id` defaults to `"default"`.
    pub fn create(&self, id: Option<&str>) -> Result<SessionData, SessionError> {
        let id = id.unwrap_or(DEFAULT_SESSION_ID);
        let mut session = SessionData::new(id);
        self.save(id, &mut session)?;
        debug!(session_id = id, "Created session");
        Ok(session)
    }

    /// Append one message, stamping it if the caller left the timestamp empty.
    pub fn add_message(
        &self,
        id: &str,
        message: SessionMessage,
    ) -> Result<SessionData, SessionError> {
        let mut session = self.load(id)?;
        session.messages.push(stamp(message));
        session.recount_turns();
        self.save(id, &mut session)?;
        Ok(session)
    }

    /// Append a whole turn in one save and add `tokens` to the running total.
    ///
    /// Creates the session if it vanished since it was resolved.
    pub fn append_turn(
        &self,
        id: &str,
        messages: Vec<SessionMessage>,
        tokens: u64,
    ) -> Result<SessionData, SessionError> {
        let mut session = match self.load(id) {
            Ok(s) => s,
            Err(SessionError::NotFound(_)) => SessionData::new(id),
            Err(e) => return Err(e),
        };
        session.messages.extend(messages.into_iter().map(stamp));
        session.recount_turns();
        session.metadata.total_tokens += tokens;
        self.save(id, &mut session)?;
        Ok(session)
    }

    /// Drop all messages, keeping identity and timestamps. No-op if absent.
    pub fn clear(&self, id: &str) -> Result<(), SessionError> {
        let mut session = match self.load(id) {
            Ok(s) => s,
            Err(SessionError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        session.messages.clear();
        session.recount_turns();
        self.save(id, &mut session)
    }

    /// Remove everything stored for `id`. Returns whether anything existed.
    pub fn delete(&self, id: &str) -> Result<bool, SessionError> {
        let dir = self.session_dir(id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(session_id = id, "Deleted session");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SessionError::Io(e)),
        }
    }

    /// All readable sessions, newest `updated_at` first.
    ///
    /// Corrupt or unreadable records are logged and skipped.
    pub fn list_sessions(&self) -> Vec<SessionData> {
        let entries = match std::fs::read_dir(&self.storage_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read sessions directory: {}", e);
                return Vec::new();
            }
        };

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path().join(SESSION_FILE);
            if !path.is_file() {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| {
                    serde_json::from_str::<SessionData>(&c).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("Skipping unreadable session {}: {}", path.display(), e),
            }
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }
}

fn stamp(mut message: SessionMessage) -> SessionMessage {
    if message.timestamp.is_none() {
        message.timestamp = Some(Utc::now());
    }
    message
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, ToolCallRecord};
    use tempfile::tempdir;

    fn make_store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sessions"));
        (store, dir)
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let (store, _dir) = make_store();
        let err = store.load("ghost").unwrap_err();
        assert!(matches!(err, SessionError::NotFound(ref id) if id == "ghost"));
    }

    #[test]
    fn test_create_defaults_to_default_id() {
        let (store, _dir) = make_store();
        let session = store.create(None).unwrap();
        assert_eq!(session.session_id, "default");
        assert!(session.messages.is_empty());
        assert_eq!(session.metadata.total_turns, 0);
        assert_eq!(session.metadata.total_tokens, 0);
        assert!(store.exists("default"));
    }

    #[test]
    fn test_save_refreshes_updated_at() {
        let (store, _dir) = make_store();
        let mut session = store.create(Some("s1")).unwrap();
        let before = session.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.save("s1", &mut session).unwrap();
        assert!(session.updated_at > before);
        assert_eq!(store.load("s1").unwrap().updated_at, session.updated_at);
    }

    #[test]
    fn test_add_message_stamps_and_counts() {
        let (store, _dir) = make_store();
        store.create(Some("chat")).unwrap();

        store
            .add_message("chat", SessionMessage::new(Role::User, "hello"))
            .unwrap();
        let session = store
            .add_message("chat", SessionMessage::new(Role::Assistant, "hi!"))
            .unwrap();

        assert_eq!(session.messages.len(), 2);
        assert!(session.messages.iter().all(|m| m.timestamp.is_some()));
        assert_eq!(session.metadata.total_turns, 2);
    }

    #[test]
    fn test_add_message_missing_session() {
        let (store, _dir) = make_store();
        let err = store
            .add_message("nope", SessionMessage::new(Role::User, "x"))
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[test]
    fn test_append_turn_accumulates_tokens() {
        let (store, _dir) = make_store();
        store.create(Some("t")).unwrap();

        let turn = vec![
            SessionMessage::new(Role::User, "what's in a.txt?"),
            SessionMessage::new(Role::Assistant, "It says hi.").with_tool_calls(vec![
                ToolCallRecord {
                    name: "read_file".into(),
                    params: Default::default(),
                },
            ]),
        ];
        store.append_turn("t", turn.clone(), 40).unwrap();
        let session = store.append_turn("t", turn, 2).unwrap();

        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.metadata.total_turns, 4);
        assert_eq!(session.metadata.total_tokens, 42);
        assert_eq!(
            session.messages[1].tool_calls.as_ref().unwrap()[0].name,
            "read_file"
        );
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (store, _dir) = make_store();
        let created = store.create(Some("c")).unwrap();
        store
            .add_message("c", SessionMessage::new(Role::User, "one"))
            .unwrap();

        store.clear("c").unwrap();
        let session = store.load("c").unwrap();
        assert!(session.messages.is_empty());
        assert_eq!(session.metadata.total_turns, 0);
        assert_eq!(session.created_at, created.created_at);

        store.clear("c").unwrap();
        store.clear("never-existed").unwrap();
        assert!(!store.exists("never-existed"));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (store, _dir) = make_store();
        store.create(Some("d")).unwrap();

        assert!(store.delete("d").unwrap());
        assert!(!store.exists("d"));
        assert!(!store.delete("d").unwrap());
    }

    #[test]
    fn test_list_sessions_skips_corrupt() {
        let (store, _dir) = make_store();
        store.create(Some("older")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.create(Some("newer")).unwrap();

        let bad_dir = store.storage_dir().join("broken");
        std::fs::create_dir_all(&bad_dir).unwrap();
        std::fs::write(bad_dir.join(SESSION_FILE), "{not json").unwrap();

        let sessions = store.list_sessions();
        let ids: Vec<_> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[test]
    fn test_list_sessions_missing_dir() {
        let (store, _dir) = make_store();
        assert!(store.list_sessions().is_empty());
    }

    #[test]
    fn test_load_corrupt() {
        let (store, _dir) = make_store();
        let dir = store.storage_dir().join("bad");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SESSION_FILE), "[]").unwrap();

        let err = store.load("bad").unwrap_err();
        assert!(matches!(err, SessionError::Corrupt { .. }));
    }

    #[test]
    fn test_ids_are_encoded() {
        let (store, _dir) = make_store();
        store.create(Some("../escape")).unwrap();
        assert!(store
            .storage_dir()
            .join("..%2Fescape")
            .join(SESSION_FILE)
            .is_file());
        assert_eq!(store.load("../escape").unwrap().session_id, "../escape");
    }

    #[test]
    fn test_similar_ids_stay_separate() {
        let (store, _dir) = make_store();
        store.create(Some("a b")).unwrap();
        store
            .add_message("a b", SessionMessage::new(Role::User, "hi"))
            .unwrap();

        assert!(matches!(
            store.load("a_b").unwrap_err(),
            SessionError::NotFound(_)
        ));
        store.create(Some("a_b")).unwrap();
        store.create(Some("a/b")).unwrap();
        assert_eq!(store.load("a b").unwrap().messages.len(), 1);
        assert!(store.load("a_b").unwrap().messages.is_empty());
        assert_eq!(store.list_sessions().len(), 3);
    }

    #[test]
    fn test_empty_id_is_an_ordinary_session() {
        let (store, _dir) = make_store();
        store.create(Some("alice")).unwrap();
        store.create(Some("bob")).unwrap();

        assert!(!store.delete("").unwrap());
        assert!(store.exists("alice"));
        assert!(store.exists("bob"));

        store.create(Some("")).unwrap();
        assert!(!store.storage_dir().join(SESSION_FILE).exists());
        assert_eq!(store.list_sessions().len(), 3);
        assert!(store.delete("").unwrap());
        assert!(store.exists("alice"));
        assert!(store.exists("bob"));
    }

    #[test]
    fn test_load_rejects_foreign_record() {
        let (store, _dir) = make_store();
        let mut other = SessionData::new("someone-else");
        store.save("mine", &mut other).unwrap();

        let err = store.load("mine").unwrap_err();
        assert!(matches!(err, SessionError::Corrupt { ref id, .. } if id == "mine"));
    }
}
