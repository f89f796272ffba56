//! Session storage — one JSON document per session id, plus the per-id
//! locks that keep concurrent turns from clobbering each other.

pub mod lock;
pub mod store;

pub use lock::SessionLocks;
pub use store::{SessionStore, DEFAULT_SESSION_ID};
