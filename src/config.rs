//! Configuration surface (§6.7). Plain `serde::Deserialize` structs with
//! defaults matching the documented values; loading and validating a YAML
//! file into these types is the caller's job, not this crate's.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level run configuration, assembled by an external CLI/YAML loader.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub paths: Paths,
    pub platforms: PlatformSelection,
    /// Preference order for media & search (region codes: US, EU, JP, WOR, ...).
    pub regions: Vec<String>,
    /// Preference order for language-bearing assets (En, Fr, De, ...).
    pub languages: Vec<String>,
    pub media: MediaConfig,
    pub scraping: ScrapingConfig,
    pub search: SearchConfig,
    pub api: ApiConfig,
    pub runtime: RuntimeConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            paths: Paths::default(),
            platforms: PlatformSelection::default(),
            regions: vec!["US".into(), "WOR".into(), "EU".into(), "JP".into()],
            languages: vec!["En".into()],
            media: MediaConfig::default(),
            scraping: ScrapingConfig::default(),
            search: SearchConfig::default(),
            api: ApiConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub rom_root: PathBuf,
    pub media_root: PathBuf,
    pub catalog_root: PathBuf,
    pub platform_index: PathBuf,
}

/// Allowlist of platform identifiers; empty means "all platforms".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlatformSelection {
    pub selection: Vec<String>,
}

impl PlatformSelection {
    pub fn allows(&self, platform_id: &str) -> bool {
        self.selection.is_empty() || self.selection.iter().any(|s| s == platform_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Provider media types enabled for this run (filtered to Provider-supported types
    /// at runtime; see [`crate::media::MediaType`]).
    pub enabled_types: Vec<String>,
    pub validation: MediaValidation,
    pub skip_existing_media: bool,
    /// Strict-mode minimum side length in pixels.
    pub min_image_side: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            enabled_types: vec!["cover".into(), "screenshot".into()],
            validation: MediaValidation::Normal,
            skip_existing_media: true,
            min_image_side: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaValidation {
    Disabled,
    #[default]
    Normal,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    Never,
    ChangedOnly,
    Always,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        UpdatePolicy::ChangedOnly
    }
}

/// Merge strategy applied uniformly across entries in one run (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    #[default]
    PreserveUserEdits,
    ProviderWinsOnAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameVerification {
    Strict,
    Normal,
    Lenient,
    Disabled,
}

impl Default for NameVerification {
    fn default() -> Self {
        NameVerification::Normal
    }
}

impl NameVerification {
    /// Confidence threshold for this verification level (§6.7).
    pub fn threshold(self) -> f64 {
        match self {
            NameVerification::Strict => 0.8,
            NameVerification::Normal => 0.6,
            NameVerification::Lenient => 0.4,
            NameVerification::Disabled => 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub update_policy: UpdatePolicy,
    pub skip_scraped: bool,
    pub merge_policy: MergePolicy,
    pub integrity_threshold: f64,
    pub name_verification: NameVerification,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            update_policy: UpdatePolicy::default(),
            skip_scraped: true,
            merge_policy: MergePolicy::default(),
            integrity_threshold: 0.95,
            name_verification: NameVerification::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub enable_fallback: bool,
    pub threshold: f64,
    pub max_results: usize,
    pub interactive: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enable_fallback: true,
            threshold: 0.6,
            max_results: 10,
            interactive: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub request_timeout_s: u64,
    pub max_retries: u32,
    pub initial_retry_delay_s: u64,
    pub quota_warning_ratio: f64,
    pub r#override: QuotaOverride,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            request_timeout_s: 30,
            max_retries: 5,
            initial_retry_delay_s: 2,
            quota_warning_ratio: 0.8,
            r#override: QuotaOverride::default(),
        }
    }
}

/// Operator overrides; always lower-bounded by Provider-reported caps (§4.6/§4.12).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuotaOverride {
    pub max_workers: Option<usize>,
    pub requests_per_minute: Option<u32>,
    pub daily_quota: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HashAlgorithm {
    Crc32,
    Md5,
    Sha1,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Crc32
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub hash_algorithm: HashAlgorithm,
    pub hash_size_cap_bytes: u64,
    pub dry_run: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            // 512 MiB default cap; files above this hash to `None` (§4.2).
            hash_size_cap_bytes: 512 * 1024 * 1024,
            dry_run: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.scraping.integrity_threshold, 0.95);
        assert_eq!(cfg.scraping.name_verification.threshold(), 0.6);
        assert_eq!(NameVerification::Strict.threshold(), 0.8);
        assert_eq!(NameVerification::Lenient.threshold(), 0.4);
        assert_eq!(NameVerification::Disabled.threshold(), 0.0);
        assert_eq!(cfg.media.validation, MediaValidation::Normal);
        assert_eq!(cfg.scraping.merge_policy, MergePolicy::PreserveUserEdits);
    }

    #[test]
    fn empty_selection_allows_all_platforms() {
        let sel = PlatformSelection::default();
        assert!(sel.allows("nes"));
        assert!(sel.allows("anything"));
    }

    #[test]
    fn nonempty_selection_is_an_allowlist() {
        let sel = PlatformSelection {
            selection: vec!["nes".into(), "snes".into()],
        };
        assert!(sel.allows("nes"));
        assert!(!sel.allows("gba"));
    }
}
