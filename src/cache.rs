//! Response Cache (C7, §4.7). A write-through, per-platform on-disk cache of
//! Provider responses keyed by identity hash (or filename+size fallback),
//! so a rerun within the TTL window skips the network call entirely. Atomic
//! writes follow the same temp-file-then-rename discipline as the catalog.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::MediaAsset;
use crate::provider::GameRecord;

/// Default cache lifetime before an entry is treated as a miss (§4.7).
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A cached Provider response, resolved to the run's region priority for
/// scalar text fields but keeping the raw media candidate list — media
/// selection still needs the individual ROM's regions/languages at fetch
/// time, not the cache's (§4.7, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRecord {
    cached_at: DateTime<Utc>,
    pub provider_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub release_date: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub genres: Vec<String>,
    pub player_count: Option<u32>,
    pub rating: Option<f64>,
    pub media: Vec<MediaAsset>,
}

impl CachedRecord {
    fn from_record(record: &GameRecord, region_priority: &[String]) -> Self {
        Self {
            cached_at: Utc::now(),
            provider_id: record.provider_id.clone(),
            name: record.names.resolve(region_priority).map(String::from),
            description: record.descriptions.resolve(region_priority).map(String::from),
            release_date: record.release_dates.resolve(region_priority).map(String::from),
            developer: record.developer.clone(),
            publisher: record.publisher.clone(),
            genres: record.genres.clone(),
            player_count: record.player_count,
            rating: record.rating,
            media: record.media.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    entries: HashMap<String, CachedRecord>,
}

/// Cache key: identity hash when known, else `filename:size` (§4.7).
pub fn cache_key(content_hash: Option<&str>, filename: &str, size: u64) -> String {
    match content_hash {
        Some(hash) => hash.to_string(),
        None => format!("{filename}:{size}"),
    }
}

/// A loaded, mutable in-memory view of one platform's cache file.
pub struct ResponseCache {
    path: PathBuf,
    file: CacheFile,
    ttl: Duration,
}

impl ResponseCache {
    pub fn load(path: &Path, ttl: Duration) -> AppResult<Self> {
        let file = if path.exists() {
            let json = std::fs::read_to_string(path)?;
            serde_json::from_str(&json).unwrap_or_default()
        } else {
            CacheFile::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
            ttl,
        })
    }

    /// Returns the cached response if present and not expired (§4.7). A hit
    /// lets the Provider client skip the network call entirely.
    pub fn get(&self, key: &str) -> Option<&CachedRecord> {
        let entry = self.file.entries.get(key)?;
        let age = Utc::now().signed_duration_since(entry.cached_at);
        if age.to_std().ok()? > self.ttl {
            return None;
        }
        Some(entry)
    }

    pub fn put(&mut self, key: &str, record: &GameRecord, region_priority: &[String]) {
        self.file
            .entries
            .insert(key.to_string(), CachedRecord::from_record(record, region_priority));
    }

    pub fn commit(&self) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.file)
            .map_err(|e| AppError::Other(format!("failed to serialize cache: {e}")))?;

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| AppError::Io(e.error))?;
        Ok(())
    }

    /// Wholesale invalidation: drop every entry (§4.7).
    pub fn invalidate_all(&mut self) {
        self.file.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::response::RegionalText;

    fn sample_record() -> GameRecord {
        GameRecord {
            provider_id: "42".into(),
            names: RegionalText {
                first: Some("Sample".into()),
                by_region: HashMap::new(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn put_then_get_round_trips_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = ResponseCache::load(&path, Duration::from_secs(60)).unwrap();
        cache.put("ABC123", &sample_record(), &[]);
        assert_eq!(cache.get("ABC123").and_then(|r| r.name.as_deref()), Some("Sample"));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = ResponseCache::load(&path, Duration::from_secs(0)).unwrap();
        cache.put("ABC123", &sample_record(), &[]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("ABC123").is_none());
    }

    #[test]
    fn cache_key_prefers_hash_over_filename() {
        assert_eq!(cache_key(Some("DEADBEEF"), "game.zip", 100), "DEADBEEF");
        assert_eq!(cache_key(None, "game.zip", 100), "game.zip:100");
    }

    #[test]
    fn invalidate_all_clears_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = ResponseCache::load(&path, Duration::from_secs(60)).unwrap();
        cache.put("A", &sample_record(), &[]);
        cache.put("B", &sample_record(), &[]);
        cache.invalidate_all();
        assert!(cache.get("A").is_none());
        assert!(cache.get("B").is_none());
    }

    #[test]
    fn commit_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = ResponseCache::load(&path, Duration::from_secs(60)).unwrap();
        cache.put("ABC123", &sample_record(), &[]);
        cache.commit().unwrap();

        let reloaded = ResponseCache::load(&path, Duration::from_secs(60)).unwrap();
        assert_eq!(reloaded.get("ABC123").and_then(|r| r.name.as_deref()), Some("Sample"));
    }
}
