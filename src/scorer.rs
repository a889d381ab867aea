//! Match Scorer (C8, §4.8). Invoked when `match_by_identity` comes back
//! not-found and name search is enabled: scores each search candidate
//! against the RomEntity and either auto-selects the winner, defers to an
//! interactive prompt, or gives up as unmatched.

use std::collections::HashSet;

use regex::Regex;
use std::sync::LazyLock;

use crate::models::RomEntity;
use crate::provider::GameRecord;

/// Weights for the five scoring factors (§4.8). Always sums to 1.0.
const WEIGHT_FILENAME: f64 = 0.40;
const WEIGHT_REGION: f64 = 0.30;
const WEIGHT_SIZE: f64 = 0.15;
const WEIGHT_MEDIA: f64 = 0.10;
const WEIGHT_RATING: f64 = 0.05;

/// Number of distinct media types at which the breadth factor saturates at 1.0.
const MEDIA_BREADTH_SATURATION: usize = 3;

static PARENTHESIZED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[(\[][^)\]]*[)\]]").unwrap());
static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9 ]").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Normalize a title for comparison: strip parenthesized/bracketed tags,
/// punctuation, a leading "The", and collapse whitespace (§4.8).
pub fn normalize_title(s: &str) -> String {
    let no_tags = PARENTHESIZED.replace_all(s, " ");
    let lower = no_tags.to_lowercase();
    let no_punct = PUNCTUATION.replace_all(&lower, " ");
    let collapsed = WHITESPACE.replace_all(no_punct.trim(), " ").to_string();
    collapsed
        .strip_prefix("the ")
        .map(str::to_string)
        .unwrap_or(collapsed)
}

/// Best filename-similarity ratio across all of a candidate's regional
/// names, after normalizing both sides (§4.8). `SequenceMatcher.ratio()`
/// from the source ecosystem is approximated here with normalized
/// Levenshtein similarity (`strsim`), the closest equivalent this crate's
/// dependency stack offers.
fn filename_similarity(rom_basename: &str, candidate: &GameRecord) -> f64 {
    let rom_norm = normalize_title(rom_basename);
    let mut names: Vec<&str> = candidate.names.by_region.values().map(String::as_str).collect();
    if let Some(first) = candidate.names.first.as_deref() {
        names.push(first);
    }
    if names.is_empty() {
        return 0.0;
    }
    names
        .iter()
        .map(|n| strsim::normalized_levenshtein(&rom_norm, &normalize_title(n)))
        .fold(0.0, f64::max)
}

/// Region match score (§4.8): 1.0 if the ROM's top region is available,
/// else decreasing by position in the ROM's own region list, 0.1 if none
/// match, 0.5 if the ROM declares no region at all.
fn region_score(rom_regions: &[String], candidate_regions: &HashSet<&str>) -> f64 {
    if rom_regions.is_empty() {
        return 0.5;
    }
    if candidate_regions.contains(rom_regions[0].as_str()) {
        return 1.0;
    }
    for (i, region) in rom_regions.iter().enumerate().skip(1) {
        if candidate_regions.contains(region.as_str()) {
            return (0.8 - 0.2 * (i as f64 - 1.0)).max(0.2);
        }
    }
    0.1
}

/// Size proximity score (§4.8): exact, then widening percentage bands,
/// 0.5 when the candidate has no reported size to compare against.
fn size_score(rom_size: u64, candidate_size: Option<u64>) -> f64 {
    let Some(candidate_size) = candidate_size else {
        return 0.5;
    };
    if rom_size == candidate_size {
        return 1.0;
    }
    if rom_size == 0 {
        return 0.2;
    }
    let diff = rom_size.abs_diff(candidate_size) as f64 / rom_size as f64;
    if diff <= 0.05 {
        0.9
    } else if diff <= 0.10 {
        0.7
    } else if diff <= 0.20 {
        0.5
    } else {
        0.2
    }
}

/// Media breadth score (§4.8): linear up to `MEDIA_BREADTH_SATURATION`
/// distinct media types, capped at 1.0.
fn media_breadth_score(candidate: &GameRecord) -> f64 {
    let distinct: HashSet<&str> = candidate.media.iter().map(|m| m.media_type.as_str()).collect();
    (distinct.len() as f64 / MEDIA_BREADTH_SATURATION as f64).min(1.0)
}

fn rating_score(candidate: &GameRecord) -> f64 {
    candidate.rating.unwrap_or(0.5)
}

/// Confidence in `[0, 1]` for one candidate against one RomEntity (§4.8).
pub fn score_candidate(rom: &RomEntity, candidate: &GameRecord) -> f64 {
    let candidate_regions: HashSet<&str> = candidate.names.by_region.keys().map(String::as_str).collect();

    WEIGHT_FILENAME * filename_similarity(&rom.display_basename, candidate)
        + WEIGHT_REGION * region_score(&rom.regions, &candidate_regions)
        + WEIGHT_SIZE * size_score(rom.size, candidate.rom_size_bytes)
        + WEIGHT_MEDIA * media_breadth_score(candidate)
        + WEIGHT_RATING * rating_score(candidate)
}

/// One scored candidate, preserving its original search-result position
/// for stable tie-breaking (§4.8: "all ties broken by insertion order").
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub index: usize,
    pub confidence: f64,
}

/// Score every candidate and return them in descending-confidence order,
/// ties broken by original (insertion) order.
pub fn rank_candidates(rom: &RomEntity, candidates: &[GameRecord]) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .enumerate()
        .map(|(index, c)| ScoredCandidate {
            index,
            confidence: score_candidate(rom, c),
        })
        .collect();
    // `sort_by` is stable, so equal confidences keep insertion order.
    scored.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// The outcome of attempting to resolve a not-found identity lookup via
/// search (§4.8, §6.3).
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResolution {
    /// The top-ranked candidate cleared the threshold; use it directly.
    Accepted(usize),
    /// No candidate cleared the threshold but interactive mode is on:
    /// surface the ranked list to the operator prompt (§6.3).
    NeedsPrompt(Vec<ScoredCandidate>),
    /// No candidate cleared the threshold and no prompt is available
    /// (non-interactive run, or zero candidates): unmatched.
    Unmatched,
}

/// Decide what to do with a ranked candidate list (§4.8).
pub fn resolve(ranked: Vec<ScoredCandidate>, threshold: f64, interactive: bool) -> MatchResolution {
    match ranked.first() {
        Some(top) if top.confidence >= threshold => MatchResolution::Accepted(top.index),
        _ if interactive && !ranked.is_empty() => MatchResolution::NeedsPrompt(ranked),
        _ => MatchResolution::Unmatched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RomKind};
    use std::path::PathBuf;

    fn rom(basename: &str, regions: &[&str], size: u64) -> RomEntity {
        RomEntity {
            kind: RomKind::Single,
            display_basename: basename.into(),
            primary_file: PathBuf::from(basename),
            catalog_path: PathBuf::from(basename),
            regions: regions.iter().map(|s| s.to_string()).collect(),
            languages: Vec::new(),
            size,
            content_hash: Some("ABC".into()),
            auxiliary_files: Vec::new(),
        }
    }

    fn candidate(name: &str, region: &str, size: Option<u64>) -> GameRecord {
        let mut names = crate::provider::response::RegionalText::default();
        names.first = Some(name.into());
        names.by_region.insert(region.to_string(), name.to_string());
        GameRecord {
            provider_id: "1".into(),
            names,
            rom_size_bytes: size,
            ..Default::default()
        }
    }

    #[test]
    fn normalize_strips_tags_punctuation_and_leading_the() {
        assert_eq!(normalize_title("The Sample Saga (USA, Europe)!"), "sample saga");
        assert_eq!(normalize_title("Demo: Orbit [Proto]"), "demo orbit");
    }

    #[test]
    fn exact_name_and_region_scores_near_one() {
        let r = rom("Sample Saga", &["US"], 1000);
        let c = candidate("Sample Saga", "US", Some(1000));
        let score = score_candidate(&r, &c);
        assert!(score > 0.9, "expected high confidence, got {score}");
    }

    #[test]
    fn region_score_falls_back_by_position() {
        let regions = vec!["US".to_string(), "EU".to_string(), "JP".to_string()];
        let available: HashSet<&str> = ["EU"].into_iter().collect();
        assert_eq!(region_score(&regions, &available), 0.8);
    }

    #[test]
    fn size_score_boundaries() {
        assert_eq!(size_score(1000, Some(1000)), 1.0);
        assert_eq!(size_score(1000, Some(1040)), 0.9); // 4% off
        assert_eq!(size_score(1000, Some(1090)), 0.7); // 9% off
        assert_eq!(size_score(1000, Some(1150)), 0.5); // 15% off
        assert_eq!(size_score(1000, Some(1300)), 0.2); // 30% off
        assert_eq!(size_score(1000, None), 0.5);
    }

    #[test]
    fn rank_candidates_is_stable_on_ties() {
        let r = rom("Sample Saga", &[], 0);
        let candidates = vec![candidate("Zzz", "US", None), candidate("Zzz", "US", None)];
        let ranked = rank_candidates(&r, &candidates);
        assert_eq!(ranked[0].index, 0);
        assert_eq!(ranked[1].index, 1);
    }

    #[test]
    fn resolve_accepts_top_candidate_at_threshold() {
        let ranked = vec![ScoredCandidate { index: 0, confidence: 0.6 }];
        assert_eq!(resolve(ranked, 0.6, false), MatchResolution::Accepted(0));
    }

    #[test]
    fn resolve_prompts_when_interactive_and_below_threshold() {
        let ranked = vec![ScoredCandidate { index: 0, confidence: 0.3 }];
        assert!(matches!(resolve(ranked, 0.6, true), MatchResolution::NeedsPrompt(_)));
    }

    #[test]
    fn resolve_is_unmatched_when_noninteractive_and_below_threshold() {
        let ranked = vec![ScoredCandidate { index: 0, confidence: 0.3 }];
        assert_eq!(resolve(ranked, 0.6, false), MatchResolution::Unmatched);
    }

    #[test]
    fn zero_candidates_is_unmatched_even_when_interactive() {
        assert_eq!(resolve(Vec::new(), 0.6, true), MatchResolution::Unmatched);
    }
}
