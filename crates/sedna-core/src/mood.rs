//! Moods and per-mood episode memory.
//!
//! The recommender is told which episodes were already served for a mood so
//! it can avoid repeats.  Memory is a `{mood: [episode_id, ...]}` JSON object
//! kept under one key in the session store.  Storage failures are logged and
//! treated as "no memory"; they never abort a mood request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::recommend::Recommendation;
use crate::error::SednaError;
use crate::store::SessionStore;

pub const MOOD_MEMORY_KEY: &str = "sedna_played_episodes";

pub type EpisodeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Mood {
    Happy,
    Calm,
    Reflective,
    Sad,
    Energetic,
    Intimate,
    Moody,
    Carefree,
}

impl Mood {
    pub const ALL: [Mood; 8] = [
        Mood::Happy,
        Mood::Calm,
        Mood::Reflective,
        Mood::Sad,
        Mood::Energetic,
        Mood::Intimate,
        Mood::Moody,
        Mood::Carefree,
    ];

    /// Capitalised form the recommender expects.
    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Happy => "Happy",
            Mood::Calm => "Calm",
            Mood::Reflective => "Reflective",
            Mood::Sad => "Sad",
            Mood::Energetic => "Energetic",
            Mood::Intimate => "Intimate",
            Mood::Moody => "Moody",
            Mood::Carefree => "Carefree",
        }
    }

    /// Memory key: lowercased name.
    pub fn key(self) -> String {
        self.as_str().to_lowercase()
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = SednaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Mood::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SednaError::UnknownMood(s.to_string()))
    }
}

impl TryFrom<String> for Mood {
    type Error = SednaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

type MemoryMap = HashMap<String, Vec<EpisodeId>>;

pub struct MoodMemory {
    store: Arc<dyn SessionStore>,
}

impl MoodMemory {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Episode ids already served for `mood`, oldest first.
    pub fn excluded_for(&self, mood: Mood) -> Vec<EpisodeId> {
        self.load().remove(&mood.key()).unwrap_or_default()
    }

    /// Append `id` to the mood's list unless it is already there.
    pub fn record_played(&self, mood: Mood, id: EpisodeId) {
        let mut map = self.load();
        let list = map.entry(mood.key()).or_default();
        if list.contains(&id) {
            return;
        }
        list.push(id);
        self.save(&map);
    }

    pub fn reset_mood(&self, mood: Mood) {
        let mut map = self.load();
        map.insert(mood.key(), Vec::new());
        self.save(&map);
    }

    /// Bookkeeping after a successful recommendation.  On a server-side
    /// memory reset the served episode stays as the only exclusion.
    pub fn apply_recommendation(&self, mood: Mood, rec: &Recommendation) {
        self.record_played(mood, rec.episode.id);
        if rec.memory_reset {
            info!("mood: all {} episodes served, memory reset", mood);
            self.reset_mood(mood);
            self.record_played(mood, rec.episode.id);
        }
    }

    fn load(&self) -> MemoryMap {
        let raw = match self.store.get(MOOD_MEMORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return MemoryMap::new(),
            Err(e) => {
                warn!("mood: error reading session storage: {}", e);
                return MemoryMap::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!("mood: discarding unreadable memory: {}", e);
                MemoryMap::new()
            }
        }
    }

    fn save(&self, map: &MemoryMap) {
        let json = match serde_json::to_string(map) {
            Ok(json) => json,
            Err(e) => {
                warn!("mood: failed to serialise memory: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(MOOD_MEMORY_KEY, &json) {
            warn!("mood: error saving to session storage: {}", e);
        }
    }
}
