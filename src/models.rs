//! Domain entities (§3): Platform, RomEntity, CatalogEntry, MediaAsset,
//! WorkItem. These are plain records; behavior lives in the modules that
//! own each entity's lifecycle (quota/sliding-window state lives in
//! [`crate::throttle`], which owns its own `Window` type per endpoint).

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Downstream-frontend identifier for a console/computer family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub id: String,
    pub name: String,
    pub provider_code: String,
    pub rom_root: PathBuf,
    pub extensions: Vec<String>,
}

/// Classification of a RomEntity per §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RomKind {
    Single,
    Playlist,
    DiscFolder,
}

/// One addressable game within a platform (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RomEntity {
    pub kind: RomKind,
    /// What filenames for media/catalog are derived from.
    pub display_basename: String,
    /// The file used for identity hashing: disc 1 for playlists, the
    /// stem-matching contained file for disc folders, the file itself otherwise.
    pub primary_file: PathBuf,
    /// The path recorded in the catalog (`.m3u` for playlists, the directory
    /// for disc folders, the file itself for single-file ROMs).
    pub catalog_path: PathBuf,
    pub regions: Vec<String>,
    pub languages: Vec<String>,
    pub size: u64,
    /// `None` when `size` exceeds the configured hashing cap (§4.2).
    pub content_hash: Option<String>,
    pub auxiliary_files: Vec<PathBuf>,
}

/// Fields the engine is permitted to write and never touches on rescrape
/// (§3, §4.10). The engine reads these out of an existing CatalogEntry but
/// never synthesizes or overwrites them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserOwnedFields {
    pub favorite: Option<bool>,
    pub last_played: Option<DateTime<Utc>>,
    pub hidden: Option<bool>,
    pub kid_appropriate: Option<bool>,
}

/// Fields the Provider supplies and the engine overwrites wholesale
/// (empty provider values never blank an existing field, §4.10).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOwnedFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub release_date: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub genres: Vec<String>,
    pub player_count: Option<u32>,
    pub rating: Option<f64>,
}

/// Engine-private bookkeeping recording what was used at last successful action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub provider_record_id: Option<String>,
    pub identity_hash: Option<String>,
    pub media_hashes: HashMap<String, String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A raw sub-element preserved verbatim for round-trip fidelity (§4.3, §9).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownElement {
    pub name: String,
    pub raw_xml: String,
}

/// Persisted record for a RomEntity (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub display_basename: String,
    pub path: PathBuf,
    pub user_owned: UserOwnedFields,
    pub provider_owned: ProviderOwnedFields,
    pub provenance: Provenance,
    /// Media references as written into the catalog (type → relative path).
    pub media_refs: HashMap<String, String>,
    pub unknown_elements: Vec<UnknownElement>,
}

impl CatalogEntry {
    /// "Complete" per §4.4: all provider-owned fields populated.
    pub fn provider_fields_complete(&self) -> bool {
        let p = &self.provider_owned;
        p.name.is_some()
            && p.description.is_some()
            && p.release_date.is_some()
            && p.developer.is_some()
            && p.publisher.is_some()
            && !p.genres.is_empty()
    }
}

/// A downloadable media item (§3, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub media_type: String,
    pub region: Option<String>,
    pub language: Option<String>,
    pub url: String,
    pub extension: String,
    pub size: Option<u64>,
    pub hash: Option<String>,
}

/// Priority bands for the work queue (§4.12). Higher variants drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
}

/// One pending unit of work for the scheduler (§3, §4.12).
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub rom: RomEntity,
    pub action: crate::decision::Action,
    pub priority: Priority,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_fields_complete_requires_all_text_fields() {
        let mut entry = CatalogEntry::default();
        assert!(!entry.provider_fields_complete());
        entry.provider_owned = ProviderOwnedFields {
            name: Some("Foo".into()),
            description: Some("desc".into()),
            release_date: Some("1999".into()),
            developer: Some("dev".into()),
            publisher: Some("pub".into()),
            genres: vec!["Action".into()],
            player_count: None,
            rating: None,
        };
        assert!(entry.provider_fields_complete());
    }

    #[test]
    fn priority_ordering_drains_high_first() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }
}
