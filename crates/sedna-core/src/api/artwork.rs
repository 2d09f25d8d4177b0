//! SoundCloud artwork lookup via oEmbed.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

/// oEmbed thumbnails are 300px; the CDN serves the same image at 500px.
const OEMBED_SUFFIX: &str = "-t300x300";
/// Widget artwork defaults to the 100px "large" variant.
const WIDGET_SUFFIX: &str = "-large";
const HIGH_RES_SUFFIX: &str = "-t500x500";

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    thumbnail_url: Option<String>,
}

/// Swap a known low-resolution suffix at the end of the file stem for the
/// 500px variant.  Other URLs come back unchanged.
pub fn upgrade_artwork_url(url: &str) -> String {
    let (path, query) = match url.find('?') {
        Some(i) => url.split_at(i),
        None => (url, ""),
    };
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    let stem_end = path[name_start..]
        .rfind('.')
        .map_or(path.len(), |i| name_start + i);
    let stem = &path[..stem_end];

    for suffix in [OEMBED_SUFFIX, WIDGET_SUFFIX] {
        if let Some(base) = stem.strip_suffix(suffix) {
            return format!("{}{}{}{}", base, HIGH_RES_SUFFIX, &path[stem_end..], query);
        }
    }
    url.to_string()
}

/// Resolve a high-resolution artwork URL for a track page.
/// `Ok(None)` when the track has no thumbnail.
pub async fn fetch_artwork(
    client: &reqwest::Client,
    oembed_url: &str,
    track_url: &str,
) -> Result<Option<String>> {
    let response = client
        .get(oembed_url)
        .query(&[("format", "json"), ("url", track_url)])
        .send()
        .await
        .context("Failed to reach oEmbed endpoint")?;

    if !response.status().is_success() {
        anyhow::bail!("oEmbed error: {}", response.status());
    }

    let data: OEmbedResponse = response
        .json()
        .await
        .context("Failed to parse oEmbed response")?;

    let artwork = data.thumbnail_url.map(|u| upgrade_artwork_url(&u));
    debug!("artwork: {} -> {:?}", track_url, artwork);
    Ok(artwork)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_oembed_thumbnail() {
        assert_eq!(
            upgrade_artwork_url("https://i1.sndcdn.com/artworks-abc-t300x300.jpg"),
            "https://i1.sndcdn.com/artworks-abc-t500x500.jpg"
        );
    }

    #[test]
    fn test_upgrade_large_artwork() {
        assert_eq!(
            upgrade_artwork_url("https://i1.sndcdn.com/artworks-abc-large.jpg"),
            "https://i1.sndcdn.com/artworks-abc-t500x500.jpg"
        );
    }

    #[test]
    fn test_only_stem_suffix_is_replaced() {
        assert_eq!(
            upgrade_artwork_url("https://i1.sndcdn.com/artworks-large-abc-large.jpg?x=1"),
            "https://i1.sndcdn.com/artworks-large-abc-t500x500.jpg?x=1"
        );
        let url = "https://i1.sndcdn.com/artworks-large-abc.jpg";
        assert_eq!(upgrade_artwork_url(url), url);
    }

    #[test]
    fn test_unknown_suffix_untouched() {
        let url = "https://i1.sndcdn.com/artworks-abc-original.png";
        assert_eq!(upgrade_artwork_url(url), url);
    }
}
