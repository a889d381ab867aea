//! Generic Provider response model (§4.5). The source ecosystem hands back
//! deeply nested, dynamically-shaped JSON keyed by region/language; here
//! that is normalized once, at the parsing boundary, into explicit records
//! with a bounded lookup rule instead of ad-hoc `.get()` chains downstream.

use std::collections::HashMap;

use crate::models::MediaAsset;

/// Text that varies by region/language, e.g. a localized game name.
/// Resolution tries the caller's region list in order, then falls back to
/// whatever value came first in the Provider's response (§4.9's pattern,
/// reused here since both match the Provider's own region-then-first rule).
#[derive(Debug, Clone, Default)]
pub struct RegionalText {
    pub by_region: HashMap<String, String>,
    pub first: Option<String>,
}

impl RegionalText {
    pub fn resolve(&self, region_priority: &[String]) -> Option<&str> {
        for region in region_priority {
            if let Some(v) = self.by_region.get(region) {
                return Some(v.as_str());
            }
        }
        self.first.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.by_region.is_empty()
    }
}

/// One candidate game record returned by a Provider match or search call
/// (§4.5).
#[derive(Debug, Clone, Default)]
pub struct GameRecord {
    pub provider_id: String,
    pub names: RegionalText,
    pub descriptions: RegionalText,
    pub release_dates: RegionalText,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub genres: Vec<String>,
    pub player_count: Option<u32>,
    /// Normalized to 0.0..=1.0 regardless of the Provider's native scale.
    pub rating: Option<f64>,
    pub media: Vec<MediaAsset>,
    /// The candidate's own reported ROM file size, when the Provider
    /// includes one (search results carry a per-region `rom` sub-object
    /// with its file size) — used for size-proximity scoring (§4.8).
    pub rom_size_bytes: Option<u64>,
}

/// Provider-reported operating limits, read once per session and fed into
/// [`crate::throttle`] (§4.5, §4.6).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderLimits {
    pub max_threads: Option<u32>,
    pub calls_per_day: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_priority_region_over_first() {
        let mut text = RegionalText {
            first: Some("JP name".into()),
            ..Default::default()
        };
        text.by_region.insert("JP".into(), "JP name".into());
        text.by_region.insert("US".into(), "US name".into());
        assert_eq!(text.resolve(&["US".into(), "JP".into()]), Some("US name"));
    }

    #[test]
    fn resolve_falls_back_to_first_with_no_priority_match() {
        let text = RegionalText {
            first: Some("fallback".into()),
            by_region: HashMap::new(),
        };
        assert_eq!(text.resolve(&["US".into()]), Some("fallback"));
    }
}
