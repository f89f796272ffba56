use miniclaw_core::error::{ProviderError, SessionError};
use thiserror::Error;

/// A turn that could not produce a result. Nothing is persisted when a
/// turn ends with one of these.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Session storage failed for a reason other than absence.
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid messages: {0}")]
    InvalidMessages(String),

    #[error("turn cancelled")]
    Cancelled,
}
