//! Error taxonomy for the session core.
//!
//! Nothing in here is fatal to the daemon: every variant maps to a safe
//! default (empty list, full catalog, or a notice the listener can act on).

use thiserror::Error;

use crate::channels::ChannelId;

pub type Result<T> = std::result::Result<T, SednaError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SednaError {
    /// Channel id not present in the configured channel set.
    #[error("invalid channel id: {0}")]
    InvalidChannel(ChannelId),

    /// Channel exists but no catalog entry matches its rule.
    #[error("channel {0} has no episodes")]
    EmptyChannel(ChannelId),

    /// No channel is active and the catalog itself is empty.
    #[error("catalog is empty")]
    EmptyCatalog,

    /// History cursor is already at the oldest entry.
    #[error("no previous track")]
    NoPrevious,

    /// Mood endpoint returned non-2xx, failed to connect, or sent garbage.
    #[error("recommendation failed: {0}")]
    RecommendationFailed(String),

    /// Session storage could not be read or written.
    #[error("session storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("unknown mood: {0}")]
    UnknownMood(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SednaError {
    /// Message suitable for a transient notice.
    pub fn notice(&self) -> String {
        match self {
            SednaError::InvalidChannel(id) => format!("Channel {} does not exist", id),
            SednaError::EmptyChannel(_) => "No episodes available in this channel".to_string(),
            SednaError::EmptyCatalog => "No episodes available".to_string(),
            SednaError::NoPrevious => "No previous track".to_string(),
            SednaError::RecommendationFailed(_) => {
                "Sorry, we couldn't get a recommendation right now. Please try again.".to_string()
            }
            SednaError::StorageUnavailable(_) => "Session memory unavailable".to_string(),
            SednaError::UnknownMood(m) => format!("Unknown mood: {}", m),
            SednaError::Config(e) => format!("Configuration error: {}", e),
        }
    }
}
