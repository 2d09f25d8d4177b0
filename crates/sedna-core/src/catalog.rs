use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// One catalog entry.  The URL is the identity; the title is cosmetic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Episode {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl Episode {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }
}

/// Static, ordered episode list.  Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    episodes: Vec<Episode>,
}

impl Catalog {
    /// Build a catalog, dropping blank URLs and duplicates (first one wins).
    pub fn new(episodes: Vec<Episode>) -> Self {
        let mut seen = HashSet::new();
        let episodes: Vec<Episode> = episodes
            .into_iter()
            .filter_map(|mut ep| {
                ep.url = ep.url.trim().to_string();
                if ep.url.is_empty() || !seen.insert(ep.url.clone()) {
                    return None;
                }
                Some(ep)
            })
            .collect();
        if episodes.is_empty() {
            warn!("catalog: no episodes loaded");
        }
        Self { episodes }
    }

    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(urls.into_iter().map(Episode::new).collect())
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    /// All URLs in catalog order.
    pub fn urls(&self) -> Vec<String> {
        self.episodes.iter().map(|e| e.url.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn title_for(&self, url: &str) -> Option<&str> {
        self.episodes
            .iter()
            .find(|e| e.url == url)
            .and_then(|e| e.title.as_deref())
    }
}

// ── loaders ───────────────────────────────────────────────────────────────────

pub fn parse_m3u_from_str(content: &str) -> Catalog {
    let mut episodes = Vec::new();
    let mut pending_title: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            if let Some(comma_idx) = rest.find(',') {
                pending_title = Some(rest[comma_idx + 1..].trim().to_string());
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        episodes.push(Episode {
            url: line.to_string(),
            title: pending_title.take(),
        });
    }

    Catalog::new(episodes)
}

/// Matches the `[[episode]]` tables of `episodes.toml`.
#[derive(Debug, Deserialize)]
struct TomlCatalogFile {
    #[serde(default)]
    episode: Vec<Episode>,
}

pub fn parse_catalog_from_toml_str(content: &str) -> anyhow::Result<Catalog> {
    let file: TomlCatalogFile = toml::from_str(content)?;
    Ok(Catalog::new(file.episode))
}

pub fn load_catalog_from_toml(path: &std::path::Path) -> anyhow::Result<Catalog> {
    let content = std::fs::read_to_string(path)?;
    parse_catalog_from_toml_str(&content)
}

pub fn load_catalog_from_list(path: &std::path::Path) -> anyhow::Result<Catalog> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_m3u_from_str(&content))
}

/// Fetch a plain or m3u episode list over HTTP.
pub async fn fetch_catalog_list(client: &reqwest::Client, url: &str) -> anyhow::Result<Catalog> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("HTTP {}", response.status());
    }
    let text = response.text().await?;
    Ok(parse_m3u_from_str(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_m3u_with_titles() {
        let content = "#EXTM3U\n#EXTINF:-1,First Drop\nhttps://soundcloud.com/sedna/a\n\n# note\nhttps://soundcloud.com/sedna/b\n";
        let catalog = parse_m3u_from_str(content);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.episodes()[0].title.as_deref(), Some("First Drop"));
        assert_eq!(catalog.episodes()[1].title, None);
    }

    #[test]
    fn test_duplicates_dropped_order_kept() {
        let catalog = Catalog::from_urls(["u2", "u1", "u2", "  ", "u3"]);
        assert_eq!(catalog.urls(), vec!["u2", "u1", "u3"]);
    }

    #[test]
    fn test_parse_toml() {
        let content = r#"
[[episode]]
url = "https://soundcloud.com/sedna/morning-drops-1"
title = "Morning Drops #1"

[[episode]]
url = "https://soundcloud.com/sedna/episode-7"
"#;
        let catalog = parse_catalog_from_toml_str(content).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.title_for("https://soundcloud.com/sedna/morning-drops-1"),
            Some("Morning Drops #1")
        );
    }

    #[test]
    fn test_empty_toml_is_empty_catalog() {
        let catalog = parse_catalog_from_toml_str("").unwrap();
        assert!(catalog.is_empty());
    }
}
