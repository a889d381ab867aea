//! Decision Evaluator (C4, §4.4). A pure function: given a RomEntity, its
//! existing catalog entry (if any), and the run's update policy, decides
//! what — if anything — this run should do about it.

use crate::config::UpdatePolicy;
use crate::models::CatalogEntry;

/// What the scheduler should do about one RomEntity (§4.4, §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do: already cataloged, complete, media present, unchanged.
    Skip,
    /// No existing entry, or provider fields incomplete: do a full lookup
    /// and fetch every enabled media type.
    FullScrape { media_types: Vec<String> },
    /// Provider fields are complete but one or more media types are missing.
    MediaOnly { media_types: Vec<String> },
    /// Cataloged and complete, but the ROM's content hash changed since the
    /// last successful scrape: re-run the full pipeline.
    Update { media_types: Vec<String> },
}

impl Action {
    /// Whether this action needs a Provider record (cache hit or network
    /// call) at all. All non-Skip actions do — `MediaOnly` still needs one
    /// because media URLs are only discoverable from the Provider response
    /// (§4.4), even though the record itself may come from the response
    /// cache instead of a fresh network call.
    pub fn requires_http_call(&self) -> bool {
        !matches!(self, Action::Skip)
    }

    pub fn media_types(&self) -> &[String] {
        match self {
            Action::Skip => &[],
            Action::FullScrape { media_types }
            | Action::MediaOnly { media_types }
            | Action::Update { media_types } => media_types,
        }
    }
}

/// Evaluate the 7-row decision table (§4.4).
///
/// | # | in catalog? | provider complete? | media present? | hash changed? | policy | → action |
/// |---|---|---|---|---|---|---|
/// | 1 | no  | -   | -       | -   | -                      | FullScrape |
/// | 2 | yes | no  | -       | -   | -                      | FullScrape |
/// | 3 | yes | yes | yes     | no  | skip_scraped=true      | Skip |
/// | 4 | yes | yes | partial | no  | skip_scraped=true      | MediaOnly |
/// | 5 | yes | yes | -       | yes | update=changed_only    | Update |
/// | 6 | yes | yes | -       | -   | update=always          | Update |
/// | 7 | yes | yes | -       | -   | update=never,skip=false| FullScrape |
pub fn evaluate(
    existing: Option<&CatalogEntry>,
    current_hash: Option<&str>,
    enabled_media_types: &[String],
    update_policy: UpdatePolicy,
    skip_scraped: bool,
) -> Action {
    let Some(entry) = existing else {
        return Action::FullScrape {
            media_types: enabled_media_types.to_vec(),
        };
    };

    if !entry.provider_fields_complete() {
        return Action::FullScrape {
            media_types: enabled_media_types.to_vec(),
        };
    }

    if matches!(update_policy, UpdatePolicy::Always) {
        return Action::Update {
            media_types: enabled_media_types.to_vec(),
        };
    }

    let hash_changed = match (entry.provenance.identity_hash.as_deref(), current_hash) {
        (Some(old), Some(new)) => old != new,
        // A missing prior hash (size exceeded the cap) can't signal change;
        // a missing current hash means this run exceeded the cap too.
        _ => false,
    };

    if hash_changed && matches!(update_policy, UpdatePolicy::ChangedOnly) {
        return Action::Update {
            media_types: enabled_media_types.to_vec(),
        };
    }

    // Rows 3/4 only apply when skip_scraped is enabled; otherwise (row 7,
    // generalized to changed_only-unchanged too) a complete, unchanged entry
    // still gets a full rescrape rather than being silently skipped.
    if !skip_scraped {
        return Action::FullScrape {
            media_types: enabled_media_types.to_vec(),
        };
    }

    let missing: Vec<String> = enabled_media_types
        .iter()
        .filter(|t| !entry.media_refs.contains_key(*t))
        .cloned()
        .collect();

    if missing.is_empty() {
        Action::Skip
    } else {
        Action::MediaOnly {
            media_types: missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderOwnedFields;

    fn complete_entry() -> CatalogEntry {
        CatalogEntry {
            provider_owned: ProviderOwnedFields {
                name: Some("Foo".into()),
                description: Some("d".into()),
                release_date: Some("1999".into()),
                developer: Some("dev".into()),
                publisher: Some("pub".into()),
                genres: vec!["Action".into()],
                player_count: None,
                rating: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn no_existing_entry_is_full_scrape() {
        let action = evaluate(None, Some("ABC"), &["cover".into()], UpdatePolicy::ChangedOnly, true);
        assert_eq!(
            action,
            Action::FullScrape {
                media_types: vec!["cover".into()]
            }
        );
        assert!(action.requires_http_call());
    }

    #[test]
    fn incomplete_provider_fields_is_full_scrape() {
        let entry = CatalogEntry::default();
        let action = evaluate(
            Some(&entry),
            Some("ABC"),
            &["cover".into()],
            UpdatePolicy::ChangedOnly,
            true,
        );
        assert!(matches!(action, Action::FullScrape { .. }));
    }

    #[test]
    fn complete_with_all_media_present_is_skip() {
        let mut entry = complete_entry();
        entry.media_refs.insert("cover".into(), "./media/cover/Foo.png".into());
        let action = evaluate(
            Some(&entry),
            Some("ABC"),
            &["cover".into()],
            UpdatePolicy::ChangedOnly,
            true,
        );
        assert_eq!(action, Action::Skip);
        assert!(!action.requires_http_call());
    }

    #[test]
    fn complete_with_missing_media_is_media_only_and_requires_a_call() {
        let entry = complete_entry();
        let action = evaluate(
            Some(&entry),
            Some("ABC"),
            &["cover".into(), "screenshot".into()],
            UpdatePolicy::ChangedOnly,
            true,
        );
        assert_eq!(
            action,
            Action::MediaOnly {
                media_types: vec!["cover".into(), "screenshot".into()]
            }
        );
        assert!(action.requires_http_call());
    }

    #[test]
    fn hash_change_triggers_update_under_changed_only_policy() {
        let mut entry = complete_entry();
        entry.media_refs.insert("cover".into(), "x".into());
        entry.provenance.identity_hash = Some("OLD".into());
        let action = evaluate(
            Some(&entry),
            Some("NEW"),
            &["cover".into()],
            UpdatePolicy::ChangedOnly,
            true,
        );
        assert!(matches!(action, Action::Update { .. }));
    }

    #[test]
    fn never_policy_does_not_update_on_hash_change_but_still_skips_when_skip_scraped() {
        let mut entry = complete_entry();
        entry.media_refs.insert("cover".into(), "x".into());
        entry.provenance.identity_hash = Some("OLD".into());
        let action = evaluate(
            Some(&entry),
            Some("NEW"),
            &["cover".into()],
            UpdatePolicy::Never,
            true,
        );
        assert_eq!(action, Action::Skip);
    }

    #[test]
    fn always_policy_forces_update_even_when_unchanged() {
        let mut entry = complete_entry();
        entry.media_refs.insert("cover".into(), "x".into());
        entry.provenance.identity_hash = Some("SAME".into());
        let action = evaluate(
            Some(&entry),
            Some("SAME"),
            &["cover".into()],
            UpdatePolicy::Always,
            true,
        );
        assert!(matches!(action, Action::Update { .. }));
    }

    /// Row 7: update=never, skip_scraped=false → FullScrape even though the
    /// entry is complete, media present, and the hash is unchanged (§4.4).
    #[test]
    fn never_policy_with_skip_scraped_disabled_forces_full_scrape() {
        let mut entry = complete_entry();
        entry.media_refs.insert("cover".into(), "x".into());
        entry.provenance.identity_hash = Some("SAME".into());
        let action = evaluate(
            Some(&entry),
            Some("SAME"),
            &["cover".into()],
            UpdatePolicy::Never,
            false,
        );
        assert!(matches!(action, Action::FullScrape { .. }));
    }
}
