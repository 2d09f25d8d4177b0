//! Daily fact & matching episode.
//!
//! Two document shapes exist in the wild:
//!
//! ```text
//!   hourly:  { "date": "...", "current_hour": 13, "current_fact": { <fact> } }
//!   legacy:  { <fact> }
//! ```
//!
//! The hourly schedule is the current contract.  Legacy documents are still
//! accepted and normalised into the same [`DailyFact`].

use anyhow::{Context, Result};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mood::EpisodeId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactEpisode {
    #[serde(default)]
    pub id: Option<EpisodeId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub soundcloud_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyFact {
    #[serde(default)]
    pub episode: Option<FactEpisode>,
    #[serde(default)]
    pub fact_year: Option<i32>,
    #[serde(default)]
    pub fact_text: Option<String>,
    #[serde(default)]
    pub fact_wikipedia_url: Option<String>,
    #[serde(default)]
    pub match_reason: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub current_hour: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DailyMatchDocument {
    Hourly {
        current_fact: DailyFact,
        #[serde(default)]
        date: Option<String>,
        #[serde(default)]
        current_hour: Option<u32>,
    },
    Legacy(DailyFact),
}

pub fn parse_daily_fact(content: &str) -> Result<DailyFact> {
    let doc: DailyMatchDocument =
        serde_json::from_str(content).context("Failed to parse daily match document")?;
    let fact = match doc {
        DailyMatchDocument::Hourly {
            current_fact,
            date,
            current_hour,
        } => DailyFact {
            date,
            current_hour,
            ..current_fact
        },
        DailyMatchDocument::Legacy(fact) => fact,
    };
    if fact.fact_text.is_none() && fact.episode.is_none() {
        anyhow::bail!("Daily match document has neither a fact nor an episode");
    }
    Ok(fact)
}

/// Cache-busting key that changes every UTC hour, e.g. `2026-10-19-7`.
pub fn cache_key(now: DateTime<Utc>) -> String {
    format!("{}-{}", now.format("%Y-%m-%d"), now.hour())
}

/// Load the daily fact from an `http(s)://` URL or a local file path.
pub async fn fetch_daily_fact(
    client: &reqwest::Client,
    source: &str,
    now: DateTime<Utc>,
) -> Result<DailyFact> {
    let content = if source.starts_with("http://") || source.starts_with("https://") {
        let key = cache_key(now);
        debug!("daily-fact: fetching {} v={}", source, key);
        let response = client
            .get(source)
            .query(&[("v", key.as_str())])
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to fetch daily match")?;

        if !response.status().is_success() {
            anyhow::bail!("Daily match returned status: {}", response.status());
        }

        response
            .text()
            .await
            .context("Failed to read daily match body")?
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("Failed to read daily match file {}", source))?
    };

    parse_daily_fact(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_hourly_schedule() {
        let json = r#"{
            "date": "2026-10-19",
            "current_hour": 14,
            "schedule": [],
            "current_fact": {
                "fact_text": "Something happened.",
                "fact_year": 1969,
                "fact_wikipedia_url": "https://en.wikipedia.org/wiki/X",
                "match_reason": "Both are lunar.",
                "episode": {"id": 3, "title": "Moon", "soundcloudUrl": "https://soundcloud.com/sedna/moon"}
            }
        }"#;
        let fact = parse_daily_fact(json).unwrap();
        assert_eq!(fact.date.as_deref(), Some("2026-10-19"));
        assert_eq!(fact.current_hour, Some(14));
        assert_eq!(fact.fact_year, Some(1969));
        assert_eq!(fact.episode.unwrap().id, Some(3));
    }

    #[test]
    fn test_parse_legacy_shape() {
        let json = r#"{
            "date": "2025-01-01",
            "fact_text": "Old.",
            "fact_year": 1801,
            "match_reason": "Old vibes.",
            "episode": {"title": "Ancient", "soundcloudUrl": "https://soundcloud.com/sedna/ancient"}
        }"#;
        let fact = parse_daily_fact(json).unwrap();
        assert_eq!(fact.fact_text.as_deref(), Some("Old."));
        assert_eq!(fact.date.as_deref(), Some("2025-01-01"));
        assert_eq!(fact.current_hour, None);
        assert_eq!(
            fact.episode.unwrap().soundcloud_url.as_deref(),
            Some("https://soundcloud.com/sedna/ancient")
        );
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_daily_fact("{}").is_err());
        assert!(parse_daily_fact("42").is_err());
        assert!(parse_daily_fact("not json").is_err());
    }

    #[test]
    fn test_cache_key_is_hourly() {
        let t = Utc.with_ymd_and_hms(2026, 10, 19, 7, 59, 0).unwrap();
        assert_eq!(cache_key(t), "2026-10-19-7");
    }

    #[tokio::test]
    async fn test_fetch_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("daily_match.json");
        std::fs::write(&path, r#"{"fact_text": "From disk."}"#).unwrap();
        let client = reqwest::Client::new();
        let fact = fetch_daily_fact(&client, path.to_str().unwrap(), Utc::now())
            .await
            .unwrap();
        assert_eq!(fact.fact_text.as_deref(), Some("From disk."));
    }
}
