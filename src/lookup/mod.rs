//! Barcode lookup proxy.
//!
//! Resolves a scanned barcode against a release-metadata service
//! (MusicBrainz-shaped search API) and falls back to a cover-art search
//! service (iTunes-shaped) when the primary result has no artwork. Base
//! URLs come from the environment so deployments can point at mirrors.

use reqwest::Client;
use thiserror::Error;

use crate::models::BarcodeLookupResult;

const DEFAULT_METADATA_BASE: &str = "https://musicbrainz.org/ws/2";
const DEFAULT_COVERART_BASE: &str = "https://itunes.apple.com";

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("lookup request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

pub struct LookupService {
    http_client: Client,
    metadata_base: String,
    coverart_base: String,
}

impl LookupService {
    pub fn new(metadata_base: Option<String>, coverart_base: Option<String>) -> Self {
        Self {
            http_client: Client::builder()
                .user_agent("wax-social/0.1")
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            metadata_base: metadata_base.unwrap_or_else(|| DEFAULT_METADATA_BASE.to_string()),
            coverart_base: coverart_base.unwrap_or_else(|| DEFAULT_COVERART_BASE.to_string()),
        }
    }

    /// Resolve a barcode to release metadata. Returns Ok(None) when neither
    /// service knows the code.
    pub async fn lookup_barcode(&self, barcode: &str) -> Result<Option<BarcodeLookupResult>, LookupError> {
        let url = format!(
            "{}/release/?query=barcode:{}&fmt=json&limit=1",
            self.metadata_base.trim_end_matches('/'),
            barcode
        );

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            log::warn!("Metadata lookup returned HTTP {}", response.status());
            return Ok(None);
        }

        let body: serde_json::Value = response.json().await?;
        let Some(mut result) = parse_release_search(&body) else {
            return Ok(None);
        };

        if result.cover_url.is_none() {
            match self.search_cover(&result.artist, &result.title).await {
                Ok(cover) => result.cover_url = cover,
                Err(e) => log::warn!("Cover art fallback failed: {}", e),
            }
        }

        Ok(Some(result))
    }

    async fn search_cover(&self, artist: &str, title: &str) -> Result<Option<String>, LookupError> {
        let url = format!(
            "{}/search?term={}&entity=album&limit=1",
            self.coverart_base.trim_end_matches('/'),
            urlencode(&format!("{} {}", artist, title))
        );

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }

        let body: serde_json::Value = response.json().await?;
        Ok(parse_cover_search(&body))
    }
}

/// First release out of a MusicBrainz-shaped search response.
fn parse_release_search(value: &serde_json::Value) -> Option<BarcodeLookupResult> {
    let release = value.get("releases")?.as_array()?.first()?;

    let title = release.get("title")?.as_str()?.to_string();
    let artist = release
        .get("artist-credit")
        .and_then(|credit| credit.as_array())
        .and_then(|credits| credits.first())
        .and_then(|first| first.get("name"))
        .and_then(|name| name.as_str())
        .unwrap_or("Unknown artist")
        .to_string();

    // Release dates come as YYYY or YYYY-MM-DD
    let year = release
        .get("date")
        .and_then(|d| d.as_str())
        .and_then(|d| d.split('-').next())
        .and_then(|y| y.parse::<i32>().ok());

    let cover_url = release
        .get("cover_url")
        .and_then(|c| c.as_str())
        .map(String::from);

    Some(BarcodeLookupResult {
        artist,
        title,
        year,
        cover_url,
    })
}

/// Artwork URL out of an iTunes-shaped search response, upscaled from the
/// 100px thumbnail the API returns.
fn parse_cover_search(value: &serde_json::Value) -> Option<String> {
    value
        .get("results")?
        .as_array()?
        .first()?
        .get("artworkUrl100")?
        .as_str()
        .map(|url| url.replace("100x100", "600x600"))
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => c.to_string(),
            ' ' => "+".to_string(),
            other => {
                let mut buf = [0u8; 4];
                other
                    .encode_utf8(&mut buf)
                    .as_bytes()
                    .iter()
                    .map(|b| format!("%{:02X}", b))
                    .collect()
            }
        })
        .collect()
}
