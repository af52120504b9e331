use std::path::PathBuf;

/// Core error type for the bot.
///
/// Adapter crates should map their specific errors into this type so the
/// core can handle failures consistently (user-facing message vs recoverable
/// via fallback).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no such source: {0}")]
    NotFound(String),

    #[error("name already in use: {0}")]
    Conflict(String),

    #[error("failed to launch worker: {0}")]
    Spawn(String),

    /// The output sink refused an edit/delete of an existing message.
    /// Distinct from a network failure so callers can fall back to
    /// delete-and-repost instead of giving up.
    #[error("transport rejected the update: {0}")]
    TransportRejected(String),

    #[error("{} is still locked after {attempts} attempts", .path.display())]
    StillLocked { path: PathBuf, attempts: u32 },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
