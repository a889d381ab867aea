//! Provider Client (C5, §4.5). A generic match/search contract plus one
//! concrete JSON-backed implementation, parsed the way the source
//! ecosystem's dynamic `.get()`-chained payloads are handled — but landed
//! into the explicit [`response::GameRecord`] shape at the boundary instead
//! of carried as loose `serde_json::Value` through the rest of the engine.

pub mod response;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::MediaAsset;
pub use response::{GameRecord, ProviderLimits, RegionalText};

/// Per-call Provider failure taxonomy (§4.5, §7) — distinct from
/// [`crate::error::AppError`] because each variant drives different
/// scheduler behavior instead of aborting the run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Credentials rejected, account banned, or a response shape no
    /// version of the contract can explain: stop the run.
    #[error("fatal provider error: {0}")]
    Fatal(String),
    /// Transient: network blip, 5xx, 429. Re-enqueue at HIGH priority.
    #[error("retryable provider error: {0}")]
    Retryable(String),
    /// The Provider has no record for this ROM. Not an error for run
    /// purposes — goes on the not-found list.
    #[error("no matching record")]
    NotFound,
    /// Response parsed but didn't contain what was expected; treated as a
    /// soft degrade (log + skip media type / skip field), never fatal.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Retryable(_))
    }
}

/// Contract every Provider backend implements (§4.5).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Look up by content hash + size, the primary identification path (§1, §4.5).
    async fn match_by_identity(
        &self,
        platform_code: &str,
        hash: &str,
        size: u64,
    ) -> Result<Option<GameRecord>, ProviderError>;

    /// Fallback: search by display name when identity lookup misses (§4.5, §4.8).
    async fn search_by_name(
        &self,
        platform_code: &str,
        name: &str,
    ) -> Result<Vec<GameRecord>, ProviderError>;

    /// Operating limits reported by the Provider, consulted once at session
    /// start to size the worker pool and throttle (§4.5, §4.6, §4.12).
    async fn limits(&self) -> Result<ProviderLimits, ProviderError>;
}

/// A JSON HTTP Provider: one concrete backend driving the trait above
/// through a configurable base URL and query-parameter credential pair.
pub struct JsonHttpProvider {
    http: reqwest::Client,
    base_url: String,
    dev_id: String,
    dev_password: String,
    software_name: String,
}

impl JsonHttpProvider {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        dev_id: String,
        dev_password: String,
        software_name: String,
    ) -> Self {
        Self {
            http,
            base_url,
            dev_id,
            dev_password,
            software_name,
        }
    }

    fn auth_query(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("devid", self.dev_id.as_str()),
            ("devpassword", self.dev_password.as_str()),
            ("softname", self.software_name.as_str()),
            ("output", "json"),
        ]
    }

    async fn get(&self, path: &str, extra: &[(&str, &str)]) -> Result<Value, ProviderError> {
        let mut query = self.auth_query();
        query.extend(extra.iter().copied());

        let resp = self
            .http
            .get(format!("{}/{}", self.base_url, path))
            .query(&query)
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(ProviderError::NotFound);
        }
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ProviderError::Retryable(format!("http {status}")));
        }
        if !status.is_success() {
            return Err(ProviderError::Fatal(format!("http {status}")));
        }

        let text = resp.text().await.map_err(map_transport)?;
        if text.contains("Erreur") || text.contains("API closed") {
            return Err(ProviderError::Fatal(format!("provider reported: {text}")));
        }

        serde_json::from_str(&text)
            .map_err(|e| ProviderError::Malformed(format!("invalid JSON: {e}")))
    }
}

#[async_trait]
impl Provider for JsonHttpProvider {
    async fn match_by_identity(
        &self,
        platform_code: &str,
        hash: &str,
        size: u64,
    ) -> Result<Option<GameRecord>, ProviderError> {
        let size_text = size.to_string();
        let body = self
            .get(
                "jeuInfos.php",
                &[
                    ("systemeid", platform_code),
                    ("crc", hash),
                    ("romtaille", size_text.as_str()),
                ],
            )
            .await?;

        let Some(game) = body.pointer("/response/jeu") else {
            return Ok(None);
        };
        Ok(Some(parse_game(game)?))
    }

    async fn search_by_name(
        &self,
        platform_code: &str,
        name: &str,
    ) -> Result<Vec<GameRecord>, ProviderError> {
        let body = self
            .get("jeuRecherche.php", &[("systemeid", platform_code), ("recherche", name)])
            .await?;

        let Some(list) = body.pointer("/response/jeux").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        list.iter().map(parse_game).collect()
    }

    async fn limits(&self) -> Result<ProviderLimits, ProviderError> {
        let body = self.get("ssinfrainfos.php", &[]).await?;
        Ok(ProviderLimits {
            max_threads: body
                .pointer("/response/ssuser/maxthreads")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
            calls_per_day: body
                .pointer("/response/ssuser/requeststoday")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
        })
    }
}

fn map_transport(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() {
        ProviderError::Retryable(e.to_string())
    } else {
        ProviderError::Fatal(e.to_string())
    }
}

fn parse_game(game: &Value) -> Result<GameRecord, ProviderError> {
    let provider_id = game
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Malformed("game missing id".into()))?
        .to_string();

    Ok(GameRecord {
        provider_id,
        names: extract_regional_text(game, "noms", "text"),
        descriptions: extract_lang_text(game, "synopsis", "text"),
        release_dates: extract_regional_text(game, "dates", "text"),
        developer: game.pointer("/developpeur/text").and_then(Value::as_str).map(String::from),
        publisher: game.pointer("/editeur/text").and_then(Value::as_str).map(String::from),
        genres: game
            .get("genres")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|g| g.pointer("/noms/0/text").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        player_count: game
            .get("joueurs")
            .and_then(Value::as_str)
            .and_then(|s| s.trim().parse().ok()),
        rating: game
            .get("note")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .map(|n| (n / 20.0).clamp(0.0, 1.0)),
        media: extract_media(game),
        rom_size_bytes: game
            .pointer("/rom/taille")
            .and_then(Value::as_str)
            .and_then(|s| s.trim().parse().ok()),
    })
}

/// Extract a `region`-keyed text list, e.g. `noms: [{region: "us", text: "Foo"}]`.
fn extract_regional_text(game: &Value, field: &str, text_key: &str) -> RegionalText {
    let mut out = RegionalText::default();
    if let Some(items) = game.get(field).and_then(Value::as_array) {
        for item in items {
            if let Some(text) = item.get(text_key).and_then(Value::as_str) {
                if out.first.is_none() {
                    out.first = Some(text.to_string());
                }
                if let Some(region) = item.get("region").and_then(Value::as_str) {
                    out.by_region.insert(region.to_uppercase(), text.to_string());
                }
            }
        }
    }
    out
}

/// Like [`extract_regional_text`] but keyed by `langue` instead of `region`.
fn extract_lang_text(game: &Value, field: &str, text_key: &str) -> RegionalText {
    let mut out = RegionalText::default();
    if let Some(items) = game.get(field).and_then(Value::as_array) {
        for item in items {
            if let Some(text) = item.get(text_key).and_then(Value::as_str) {
                if out.first.is_none() {
                    out.first = Some(text.to_string());
                }
                if let Some(lang) = item.get("langue").and_then(Value::as_str) {
                    out.by_region.insert(lang.to_uppercase(), text.to_string());
                }
            }
        }
    }
    out
}

fn extract_media(game: &Value) -> Vec<MediaAsset> {
    let Some(medias) = game.get("medias").and_then(Value::as_array) else {
        return Vec::new();
    };
    medias
        .iter()
        .filter_map(|m| {
            let url = m.get("url").and_then(Value::as_str)?.to_string();
            let raw_type = m.get("type").and_then(Value::as_str)?;
            let media_type = map_media_type(raw_type)?;
            Some(MediaAsset {
                media_type: media_type.to_string(),
                region: m.get("region").and_then(Value::as_str).map(|s| s.to_uppercase()),
                language: None,
                extension: m
                    .get("format")
                    .and_then(Value::as_str)
                    .unwrap_or("png")
                    .to_lowercase(),
                size: None,
                hash: m.get("crc").and_then(Value::as_str).map(String::from),
                url,
            })
        })
        .collect()
}

fn map_media_type(raw: &str) -> Option<&'static str> {
    match raw {
        "box-2D" | "box-3D" => Some("cover"),
        "ss" | "sstitle" => Some("screenshot"),
        "screenmarquee" | "marquee" => Some("marquee"),
        "video" | "video-normalized" => Some("video"),
        "manuel" => Some("manual"),
        "fanart" => Some("fanart"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_game_extracts_regional_name_and_media() {
        let json = serde_json::json!({
            "id": "1234",
            "noms": [
                {"region": "jp", "text": "Sample JP"},
                {"region": "us", "text": "Sample US"}
            ],
            "synopsis": [{"langue": "en", "text": "A sample game."}],
            "developpeur": {"text": "Sample Studio"},
            "editeur": {"text": "Sample Publisher"},
            "genres": [{"noms": [{"text": "Action"}]}],
            "joueurs": "2",
            "note": "16",
            "medias": [
                {"type": "box-2D", "region": "us", "url": "https://example.test/cover.png", "format": "png"}
            ]
        });

        let record = parse_game(&json).unwrap();
        assert_eq!(record.provider_id, "1234");
        assert_eq!(record.names.resolve(&["US".into()]), Some("Sample US"));
        assert_eq!(record.developer.as_deref(), Some("Sample Studio"));
        assert_eq!(record.player_count, Some(2));
        assert!((record.rating.unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(record.media.len(), 1);
        assert_eq!(record.media[0].media_type, "cover");
    }

    #[test]
    fn parse_game_without_id_is_malformed() {
        let json = serde_json::json!({});
        assert!(parse_game(&json).is_err());
    }

    #[test]
    fn unmapped_media_type_is_dropped_not_errored() {
        let json = serde_json::json!({
            "id": "1",
            "medias": [{"type": "unknown-type", "url": "https://x", "format": "png"}]
        });
        let record = parse_game(&json).unwrap();
        assert!(record.media.is_empty());
    }
}
