//! Narrow contract the session core needs from a media player.
//!
//! Whatever actually produces sound (mpv in the daemon, a fake in tests)
//! implements [`PlayerAdapter`].  Notifications arrive asynchronously on the
//! channel returned by [`PlayerAdapter::subscribe`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Asynchronous notifications from the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlayerEvent {
    /// A track is loaded and metadata can be queried.
    Ready,
    Play,
    Pause,
    /// Track reached its end.
    Finish,
    /// Buffering progressed; metadata may have changed.
    LoadProgress,
    /// Playback position, `0.0..=1.0` of the track.
    PlayProgress { relative_position: f64 },
}

/// What the player reports about the loaded track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoundInfo {
    pub title: Option<String>,
    pub artwork_url: Option<String>,
    pub permalink_url: Option<String>,
}

#[async_trait]
pub trait PlayerAdapter: Send + Sync {
    /// Replace the current track.
    async fn load(&self, url: &str, autoplay: bool) -> anyhow::Result<()>;
    async fn play(&self) -> anyhow::Result<()>;
    async fn pause(&self) -> anyhow::Result<()>;
    async fn is_paused(&self) -> anyhow::Result<bool>;
    async fn current_sound(&self) -> anyhow::Result<Option<SoundInfo>>;
    fn subscribe(&self) -> broadcast::Receiver<PlayerEvent>;

    /// Release the underlying player at session end.
    async fn shutdown(&self) {}
}
