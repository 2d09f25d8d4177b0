//! Mood recommendation endpoint client.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SednaError};
use crate::mood::{EpisodeId, Mood};

#[derive(Debug, Serialize)]
struct RecommendRequest<'a> {
    mood: &'a str,
    exclude: &'a [EpisodeId],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedEpisode {
    pub id: EpisodeId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub soundcloud_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub episode: RecommendedEpisode,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub memory_reset: bool,
}

/// Wire shape; `episode` may be missing on a degenerate response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendResponse {
    episode: Option<RecommendedEpisode>,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    memory_reset: bool,
}

#[derive(Clone)]
pub struct RecommendClient {
    client: reqwest::Client,
    url: String,
}

impl RecommendClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Ask for one episode matching `mood`, skipping `exclude`.
    pub async fn recommend(&self, mood: Mood, exclude: &[EpisodeId]) -> Result<Recommendation> {
        info!(
            "mood: requesting recommendation for {:?} excluding {:?}",
            mood.as_str(),
            exclude
        );

        let response = self
            .client
            .post(&self.url)
            .json(&RecommendRequest {
                mood: mood.as_str(),
                exclude,
            })
            .send()
            .await
            .map_err(|e| SednaError::RecommendationFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SednaError::RecommendationFailed(format!(
                "API error: {}",
                response.status()
            )));
        }

        let body: RecommendResponse = response
            .json()
            .await
            .map_err(|e| SednaError::RecommendationFailed(e.to_string()))?;

        let episode = body
            .episode
            .ok_or_else(|| SednaError::RecommendationFailed("No episode returned".into()))?;

        info!(
            "mood: received episode id={} title={:?} memory_reset={}",
            episode.id, episode.title, body.memory_reset
        );

        Ok(Recommendation {
            episode,
            reason: body.reason,
            memory_reset: body.memory_reset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(RecommendRequest {
            mood: Mood::Calm.as_str(),
            exclude: &[3, 1],
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "mood": "Calm", "exclude": [3, 1] }));
    }

    #[test]
    fn test_response_without_episode_parses() {
        let body: RecommendResponse =
            serde_json::from_str(r#"{"success": true, "reason": "x"}"#).unwrap();
        assert!(body.episode.is_none());
        assert!(!body.memory_reset);
    }

    #[test]
    fn test_response_camel_case() {
        let body: RecommendResponse = serde_json::from_str(
            r#"{
                "success": true,
                "episode": {"id": 12, "title": "T", "description": "D",
                            "soundcloudUrl": "https://soundcloud.com/sedna/t",
                            "songs": ["a"]},
                "reason": "because",
                "memoryReset": true
            }"#,
        )
        .unwrap();
        let ep = body.episode.unwrap();
        assert_eq!(ep.id, 12);
        assert_eq!(ep.soundcloud_url, "https://soundcloud.com/sedna/t");
        assert!(body.memory_reset);
    }
}
