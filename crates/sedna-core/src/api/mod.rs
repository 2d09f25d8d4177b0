//! Clients for the remote collaborators: the mood recommender, the daily
//! fact document and the SoundCloud oEmbed artwork lookup.

pub mod artwork;
pub mod daily_fact;
pub mod recommend;

use std::time::Duration;

use crate::config::ApiConfig;

/// Shared HTTP client for all remote calls.
pub fn build_client(config: &ApiConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("sedna/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;
    Ok(client)
}
