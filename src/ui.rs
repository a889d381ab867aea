//! Operator interaction points (§6.3). Three prompt hooks behind one
//! trait, serialized the way the source ecosystem's "global UI lock" is
//! generalized in §9: a single consumer processes one prompt at a time,
//! workers never render directly. The default, used for non-TTY runs and
//! anywhere no UI is wired up, resolves every prompt to "no"/"skip" (§6.3).

use async_trait::async_trait;

use crate::scorer::ScoredCandidate;

/// What the integrity-cleanup prompt (§4.3.1) asks the operator.
#[derive(Debug, Clone)]
pub struct IntegrityCleanupRequest {
    pub platform_id: String,
    pub presence_ratio: f64,
    pub orphan_count: usize,
}

/// What the search-candidate prompt (§4.8, §6.3) asks the operator.
#[derive(Debug, Clone)]
pub struct SearchPromptRequest {
    pub rom_basename: String,
    pub candidates: Vec<ScoredCandidate>,
}

/// The operator's reply to a search-candidate prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPromptReply {
    Select(usize),
    Skip,
    Cancel,
}

/// What the media-type-cleanup prompt (§6.3) asks when a previously
/// enabled media type is now disabled.
#[derive(Debug, Clone)]
pub struct MediaCleanupRequest {
    pub platform_id: String,
    pub media_type: String,
    pub file_count: usize,
}

/// Thread-safe prompt surface; at most one prompt in flight at a time is a
/// property of the implementation (e.g. an internal mutex around a
/// terminal), not of this trait (§6.3, §9).
#[async_trait]
pub trait Prompts: Send + Sync {
    async fn confirm_integrity_cleanup(&self, request: IntegrityCleanupRequest) -> bool;
    async fn select_search_candidate(&self, request: SearchPromptRequest) -> SearchPromptReply;
    async fn confirm_media_cleanup(&self, request: MediaCleanupRequest) -> bool;
}

/// Default surface for non-TTY runs (§6.3: "In non-TTY runs these prompts
/// resolve to 'no' / 'skip'").
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

#[async_trait]
impl Prompts for NonInteractive {
    async fn confirm_integrity_cleanup(&self, _request: IntegrityCleanupRequest) -> bool {
        false
    }

    async fn select_search_candidate(&self, _request: SearchPromptRequest) -> SearchPromptReply {
        SearchPromptReply::Skip
    }

    async fn confirm_media_cleanup(&self, _request: MediaCleanupRequest) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_interactive_resolves_every_prompt_to_no_or_skip() {
        let prompts = NonInteractive;
        assert!(
            !prompts
                .confirm_integrity_cleanup(IntegrityCleanupRequest {
                    platform_id: "nes".into(),
                    presence_ratio: 0.5,
                    orphan_count: 10,
                })
                .await
        );
        assert_eq!(
            prompts
                .select_search_candidate(SearchPromptRequest {
                    rom_basename: "Foo".into(),
                    candidates: Vec::new(),
                })
                .await,
            SearchPromptReply::Skip
        );
        assert!(
            !prompts
                .confirm_media_cleanup(MediaCleanupRequest {
                    platform_id: "nes".into(),
                    media_type: "fanart".into(),
                    file_count: 3,
                })
                .await
        );
    }
}
