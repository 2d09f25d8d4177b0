//! Channel classification of the catalog by URL substring rules.
//!
//! Membership is a pure function of the URL, matched case-insensitively.
//! Channels are meant to partition the catalog but nothing enforces it;
//! [`ChannelFilter::validate_counts`] reports a mismatch without fixing it.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::error::{Result, SednaError};

pub type ChannelId = u8;

/// How a channel selects its episodes.  Exactly one mode per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRule {
    /// URL must contain this substring.
    Include(String),
    /// URL must contain none of these substrings.
    Exclude(Vec<String>),
}

impl ChannelRule {
    pub fn matches(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        match self {
            ChannelRule::Include(pattern) => lower.contains(&pattern.to_lowercase()),
            ChannelRule::Exclude(patterns) => !patterns
                .iter()
                .any(|p| lower.contains(&p.to_lowercase())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ChannelConfig", into = "ChannelConfig")]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub description: String,
    pub rule: ChannelRule,
}

/// TOML shape of a `[[channels]]` table.  Kept separate from `Channel` so the
/// either/or rule can be validated on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_patterns: Vec<String>,
}

impl TryFrom<ChannelConfig> for Channel {
    type Error = SednaError;

    fn try_from(cfg: ChannelConfig) -> Result<Self> {
        if cfg.id == 0 {
            return Err(SednaError::Config(format!(
                "channel '{}': id must be positive",
                cfg.name
            )));
        }
        let rule = match (cfg.pattern, cfg.exclude_patterns.is_empty()) {
            (Some(p), true) if !p.trim().is_empty() => ChannelRule::Include(p),
            (None, false) => ChannelRule::Exclude(cfg.exclude_patterns),
            (Some(_), false) => {
                return Err(SednaError::Config(format!(
                    "channel {}: set either pattern or exclude_patterns, not both",
                    cfg.id
                )))
            }
            _ => {
                return Err(SednaError::Config(format!(
                    "channel {}: needs a non-empty pattern or exclude_patterns",
                    cfg.id
                )))
            }
        };
        Ok(Self {
            id: cfg.id,
            name: cfg.name,
            description: cfg.description,
            rule,
        })
    }
}

impl From<Channel> for ChannelConfig {
    fn from(ch: Channel) -> Self {
        let (pattern, exclude_patterns) = match ch.rule {
            ChannelRule::Include(p) => (Some(p), Vec::new()),
            ChannelRule::Exclude(ps) => (None, ps),
        };
        Self {
            id: ch.id,
            name: ch.name,
            description: ch.description,
            pattern,
            exclude_patterns,
        }
    }
}

/// The four production channels.
pub fn default_channels() -> Vec<Channel> {
    vec![
        Channel {
            id: 1,
            name: "Morning Drops".to_string(),
            description: "Start your day with Morning Drops episodes".to_string(),
            rule: ChannelRule::Include("/morning-drops".to_string()),
        },
        Channel {
            id: 2,
            name: "Sedna FM".to_string(),
            description: "Core Sedna FM episodes".to_string(),
            rule: ChannelRule::Exclude(vec![
                "/morning-drops".to_string(),
                "/on-the-go".to_string(),
                "/evening-flows".to_string(),
            ]),
        },
        Channel {
            id: 3,
            name: "Evening Flows".to_string(),
            description: "Wind down with Evening Flows episodes".to_string(),
            rule: ChannelRule::Include("/evening-flows".to_string()),
        },
        Channel {
            id: 4,
            name: "On The Go".to_string(),
            description: "Episodes for when you are on the move".to_string(),
            rule: ChannelRule::Include("/on-the-go".to_string()),
        },
    ]
}

/// Result of the partition diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCounts {
    pub per_channel: Vec<(ChannelId, usize)>,
    pub total: usize,
    pub sum: usize,
    pub valid: bool,
}

pub struct ChannelFilter {
    catalog: Catalog,
    channels: Vec<Channel>,
}

impl ChannelFilter {
    pub fn new(catalog: Catalog, channels: Vec<Channel>) -> Self {
        Self { catalog, channels }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel_info(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn list_all(&self) -> Vec<String> {
        self.catalog.urls()
    }

    /// Catalog entries matching the channel's rule, in catalog order.
    /// Unknown ids log a warning and yield an empty list.
    pub fn list_for_channel(&self, id: ChannelId) -> Vec<String> {
        let Some(channel) = self.channel_info(id) else {
            warn!("{}", SednaError::InvalidChannel(id));
            return Vec::new();
        };
        self.catalog
            .episodes()
            .iter()
            .filter(|ep| channel.rule.matches(&ep.url))
            .map(|ep| ep.url.clone())
            .collect()
    }

    pub fn episode_count(&self, id: ChannelId) -> usize {
        self.list_for_channel(id).len()
    }

    /// Selection pool for the active channel (`None` = whole catalog).
    pub fn pool(&self, active: Option<ChannelId>) -> Result<Vec<String>> {
        match active {
            None => Ok(self.list_all()),
            Some(id) => {
                if self.channel_info(id).is_none() {
                    return Err(SednaError::InvalidChannel(id));
                }
                let episodes = self.list_for_channel(id);
                if episodes.is_empty() {
                    return Err(SednaError::EmptyChannel(id));
                }
                Ok(episodes)
            }
        }
    }

    /// Uniform pick from the channel, or from the whole catalog for `None`.
    pub fn random_from_channel<R: Rng + ?Sized>(
        &self,
        active: Option<ChannelId>,
        rng: &mut R,
    ) -> Option<String> {
        match self.pool(active) {
            Ok(pool) => pool.choose(rng).cloned(),
            Err(e) => {
                warn!("channels: {}", e);
                None
            }
        }
    }

    /// Check that the channel counts add up to the catalog size.
    pub fn validate_counts(&self) -> ChannelCounts {
        let per_channel: Vec<(ChannelId, usize)> = self
            .channels
            .iter()
            .map(|c| (c.id, self.episode_count(c.id)))
            .collect();
        let sum: usize = per_channel.iter().map(|(_, n)| n).sum();
        let total = self.catalog.len();
        let counts = ChannelCounts {
            per_channel,
            total,
            sum,
            valid: sum == total,
        };
        if counts.valid {
            info!("channels: counts {:?}", counts);
        } else {
            warn!(
                "channels: partition mismatch, sum={} total={} ({:?})",
                counts.sum, counts.total, counts.per_channel
            );
        }
        counts
    }
}
