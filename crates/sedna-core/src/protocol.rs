use serde::{Deserialize, Serialize};

use crate::api::daily_fact::DailyFact;
use crate::channels::{Channel, ChannelId};
use crate::mood::Mood;

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check it on connect.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Messages sent from a client to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Play/pause the radio; starts a random episode when nothing is loaded.
    TogglePause,
    Next,
    Previous,
    Random,
    /// Toggle a channel: selecting the active one clears it.
    SelectChannel { channel: ChannelId },
    PlayUrl { url: String },
    Mood { mood: Mood },
    /// Another recommendation for the last selected mood.
    MoodNext,
    DailyFactToggle,
    GetState,
    ValidateChannels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

/// Messages sent from the daemon to clients (broadcasts)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: protocol version + full state snapshot.
    Hello {
        protocol_version: u32,
        rev: u64,
        state: SessionSnapshot,
    },
    State {
        data: SessionSnapshot,
    },
    /// Transient user-facing message (a toast).
    Notice {
        message: String,
        severity: Severity,
    },
    Log {
        message: String,
    },
    Error {
        message: String,
    },
}

/// Which part of the station the loaded track came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackSource {
    #[default]
    Radio,
    Mood,
    DailyFact,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NowPlaying {
    pub title: Option<String>,
    pub artwork_url: Option<String>,
    /// Link target for the title; the loaded track URL.
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MoodStatus {
    pub mood: Option<Mood>,
    /// A recommendation request is in flight.
    pub loading: bool,
    pub episode_title: Option<String>,
    pub episode_description: Option<String>,
    pub reason: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DailyFactStatus {
    pub fact: Option<DailyFact>,
    pub artwork_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelSummary {
    pub id: ChannelId,
    pub name: String,
    pub description: String,
    pub episode_count: usize,
}

impl ChannelSummary {
    pub fn new(channel: &Channel, episode_count: usize) -> Self {
        Self {
            id: channel.id,
            name: channel.name.clone(),
            description: channel.description.clone(),
            episode_count,
        }
    }
}

/// Everything a front-end needs to render the station.  `rev` is a
/// monotonically increasing counter incremented every time the state
/// changes.  Clients can use it to detect missed updates and resync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub rev: u64,
    pub channels: Vec<ChannelSummary>,
    pub active_channel: Option<ChannelId>,
    pub current_track: Option<String>,
    pub source: PlaybackSource,
    pub is_playing: bool,
    pub now_playing: NowPlaying,
    /// Playback position, `0.0..=1.0`.
    pub progress: Option<f64>,
    pub catalog_size: usize,
    pub played_count: usize,
    pub history_len: usize,
    pub history_index: Option<usize>,
    #[serde(default)]
    pub mood: MoodStatus,
    #[serde(default)]
    pub daily_fact: DailyFactStatus,
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    /// Total size of the first frame in `data`, header included.  `Ok(None)`
    /// while the frame has not fully arrived; an oversized length header is
    /// an error since the stream cannot be resynchronised after it.
    pub fn frame_len(data: &[u8]) -> anyhow::Result<Option<usize>> {
        if data.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("Frame of {} bytes exceeds limit of {}", len, MAX_FRAME_LEN);
        }
        if data.len() < 4 + len {
            return Ok(None);
        }
        Ok(Some(4 + len))
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        let Some(frame_len) = Self::frame_len(data)? else {
            anyhow::bail!("Insufficient data for message");
        };
        let msg: Self = serde_json::from_slice(&data[4..frame_len])?;
        Ok((msg, frame_len))
    }
}
