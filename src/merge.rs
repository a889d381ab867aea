//! Merge Engine (C10, §4.10). Combines a freshly fetched Provider record
//! (already reduced to [`ProviderOwnedFields`] + media refs by the caller)
//! with whatever [`CatalogEntry`] already existed, producing the entry to
//! write back plus a [`ChangeReport`] of what moved.

use std::collections::HashMap;

use crate::config::MergePolicy;
use crate::models::{CatalogEntry, Provenance, ProviderOwnedFields, RomEntity};

/// One field's before/after state, used to build a [`ChangeReport`] (§4.10).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    Added { field: String, value: String },
    Modified { field: String, old: String, new: String },
    Removed { field: String, old: String },
    Unchanged { field: String },
}

/// Per-entry field-level diff, aggregated by the caller into the
/// per-platform change log written as part of the summary artifact (§4.10).
#[derive(Debug, Clone, Default)]
pub struct ChangeReport {
    pub display_basename: String,
    pub changes: Vec<FieldChange>,
}

impl ChangeReport {
    pub fn added(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter().filter(|c| matches!(c, FieldChange::Added { .. }))
    }

    pub fn modified(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter().filter(|c| matches!(c, FieldChange::Modified { .. }))
    }

    pub fn has_changes(&self) -> bool {
        self.changes
            .iter()
            .any(|c| !matches!(c, FieldChange::Unchanged { .. }))
    }
}

/// Merge a fresh provider record (already reduced to scalar fields) and a
/// set of newly written media refs into `existing` (if any), per `policy`.
/// `verbose` controls whether removed/unchanged fields are recorded in the
/// [`ChangeReport`] (§4.10) — they are always computed, just filtered out
/// for a terse report when `false`.
pub fn merge(
    rom: &RomEntity,
    existing: Option<&CatalogEntry>,
    fresh_provider: &ProviderOwnedFields,
    new_media_refs: &HashMap<String, String>,
    provenance: Provenance,
    policy: MergePolicy,
    verbose: bool,
) -> (CatalogEntry, ChangeReport) {
    let mut entry = existing.cloned().unwrap_or_default();
    let mut report = ChangeReport {
        display_basename: rom.display_basename.clone(),
        ..Default::default()
    };

    entry.display_basename = rom.display_basename.clone();
    entry.path = rom.catalog_path.clone();
    // user_owned and unknown_elements are never touched — `entry` already
    // carries them forward verbatim from `existing` via the clone above,
    // and stays at their defaults for a brand-new entry (§3, §4.10).

    merge_scalar(&mut report, "name", &mut entry.provider_owned.name, fresh_provider.name.clone(), policy);
    merge_scalar(
        &mut report,
        "description",
        &mut entry.provider_owned.description,
        fresh_provider.description.clone(),
        policy,
    );
    merge_scalar(
        &mut report,
        "release_date",
        &mut entry.provider_owned.release_date,
        fresh_provider.release_date.clone(),
        policy,
    );
    merge_scalar(
        &mut report,
        "developer",
        &mut entry.provider_owned.developer,
        fresh_provider.developer.clone(),
        policy,
    );
    merge_scalar(
        &mut report,
        "publisher",
        &mut entry.provider_owned.publisher,
        fresh_provider.publisher.clone(),
        policy,
    );
    merge_genres(&mut report, &mut entry.provider_owned.genres, fresh_provider.genres.clone(), policy);
    merge_scalar_display(
        &mut report,
        "player_count",
        &mut entry.provider_owned.player_count,
        fresh_provider.player_count,
        policy,
    );
    merge_scalar_display(&mut report, "rating", &mut entry.provider_owned.rating, fresh_provider.rating, policy);

    for (media_type, path) in new_media_refs {
        let field = format!("media:{media_type}");
        let old = entry.media_refs.get(media_type).cloned();
        match &old {
            Some(o) if o == path => report.changes.push(FieldChange::Unchanged { field }),
            Some(o) => report.changes.push(FieldChange::Modified {
                field,
                old: o.clone(),
                new: path.clone(),
            }),
            None => report.changes.push(FieldChange::Added {
                field,
                value: path.clone(),
            }),
        }
        entry.media_refs.insert(media_type.clone(), path.clone());
    }

    entry.provenance = provenance;

    if !verbose {
        report.changes.retain(|c| !matches!(c, FieldChange::Unchanged { .. } | FieldChange::Removed { .. }));
    }

    (entry, report)
}

fn merge_scalar(
    report: &mut ChangeReport,
    field: &str,
    existing: &mut Option<String>,
    fresh: Option<String>,
    policy: MergePolicy,
) {
    match policy {
        MergePolicy::PreserveUserEdits => {
            // Empty provider values never blank a populated field (§4.10).
            let Some(fresh) = fresh else {
                if let Some(old) = existing.clone() {
                    report.changes.push(FieldChange::Unchanged { field: field.into() });
                    let _ = old;
                }
                return;
            };
            apply_scalar_change(report, field, existing, Some(fresh));
        }
        MergePolicy::ProviderWinsOnAll => apply_scalar_change(report, field, existing, fresh),
    }
}

fn apply_scalar_change(
    report: &mut ChangeReport,
    field: &str,
    existing: &mut Option<String>,
    fresh: Option<String>,
) {
    match (existing.clone(), fresh) {
        (None, None) => {}
        (None, Some(new)) => {
            report.changes.push(FieldChange::Added { field: field.into(), value: new.clone() });
            *existing = Some(new);
        }
        (Some(old), None) => {
            report.changes.push(FieldChange::Removed { field: field.into(), old });
            *existing = None;
        }
        (Some(old), Some(new)) if old == new => {
            report.changes.push(FieldChange::Unchanged { field: field.into() });
        }
        (Some(old), Some(new)) => {
            report.changes.push(FieldChange::Modified { field: field.into(), old, new: new.clone() });
            *existing = Some(new);
        }
    }
}

fn merge_genres(report: &mut ChangeReport, existing: &mut Vec<String>, fresh: Vec<String>, policy: MergePolicy) {
    let field = "genre";
    match policy {
        MergePolicy::PreserveUserEdits if fresh.is_empty() => {
            report.changes.push(FieldChange::Unchanged { field: field.into() });
        }
        _ => {
            let old_joined = existing.join(", ");
            let new_joined = fresh.join(", ");
            if existing.is_empty() && !fresh.is_empty() {
                report.changes.push(FieldChange::Added { field: field.into(), value: new_joined });
            } else if !existing.is_empty() && fresh.is_empty() {
                report.changes.push(FieldChange::Removed { field: field.into(), old: old_joined });
            } else if old_joined == new_joined {
                report.changes.push(FieldChange::Unchanged { field: field.into() });
            } else {
                report.changes.push(FieldChange::Modified { field: field.into(), old: old_joined, new: new_joined });
            }
            *existing = fresh;
        }
    }
}

fn merge_scalar_display<T: std::fmt::Display + Clone + PartialEq>(
    report: &mut ChangeReport,
    field: &str,
    existing: &mut Option<T>,
    fresh: Option<T>,
    policy: MergePolicy,
) {
    match policy {
        MergePolicy::PreserveUserEdits if fresh.is_none() => {
            if existing.is_some() {
                report.changes.push(FieldChange::Unchanged { field: field.into() });
            }
        }
        _ => match (existing.clone(), fresh) {
            (None, None) => {}
            (None, Some(new)) => {
                report.changes.push(FieldChange::Added { field: field.into(), value: new.to_string() });
                *existing = Some(new);
            }
            (Some(old), None) => {
                report.changes.push(FieldChange::Removed { field: field.into(), old: old.to_string() });
                *existing = None;
            }
            (Some(old), Some(new)) if old == new => {
                report.changes.push(FieldChange::Unchanged { field: field.into() });
            }
            (Some(old), Some(new)) => {
                report.changes.push(FieldChange::Modified {
                    field: field.into(),
                    old: old.to_string(),
                    new: new.to_string(),
                });
                *existing = Some(new);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RomKind, UnknownElement, UserOwnedFields};
    use std::path::PathBuf;

    fn rom() -> RomEntity {
        RomEntity {
            kind: RomKind::Single,
            display_basename: "World Explorer (World)".into(),
            primary_file: PathBuf::from("World Explorer (World).zip"),
            catalog_path: PathBuf::from("./World Explorer (World).zip"),
            regions: vec!["WOR".into()],
            languages: Vec::new(),
            size: 100,
            content_hash: Some("ABC".into()),
            auxiliary_files: Vec::new(),
        }
    }

    #[test]
    fn preserves_user_owned_and_unknown_fields_s4() {
        let existing = CatalogEntry {
            display_basename: rom().display_basename,
            user_owned: UserOwnedFields {
                favorite: Some(true),
                ..Default::default()
            },
            unknown_elements: vec![UnknownElement {
                name: "mycustom".into(),
                raw_xml: "<mycustom>tag</mycustom>".into(),
            }],
            provider_owned: ProviderOwnedFields {
                description: Some("Old description".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let fresh = ProviderOwnedFields {
            description: Some("New description".into()),
            ..Default::default()
        };

        let (merged, report) = merge(
            &rom(),
            Some(&existing),
            &fresh,
            &HashMap::new(),
            Provenance::default(),
            MergePolicy::PreserveUserEdits,
            false,
        );

        assert_eq!(merged.user_owned.favorite, Some(true));
        assert_eq!(merged.unknown_elements.len(), 1);
        assert_eq!(merged.provider_owned.description.as_deref(), Some("New description"));
        assert_eq!(report.modified().count(), 1);
    }

    #[test]
    fn empty_provider_field_never_blanks_existing_value() {
        let existing = CatalogEntry {
            provider_owned: ProviderOwnedFields {
                developer: Some("Known Studio".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let fresh = ProviderOwnedFields::default();

        let (merged, _) = merge(
            &rom(),
            Some(&existing),
            &fresh,
            &HashMap::new(),
            Provenance::default(),
            MergePolicy::PreserveUserEdits,
            false,
        );
        assert_eq!(merged.provider_owned.developer.as_deref(), Some("Known Studio"));
    }

    #[test]
    fn provider_wins_on_all_blanks_fields_the_provider_omits() {
        let existing = CatalogEntry {
            provider_owned: ProviderOwnedFields {
                developer: Some("Known Studio".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let fresh = ProviderOwnedFields::default();

        let (merged, report) = merge(
            &rom(),
            Some(&existing),
            &fresh,
            &HashMap::new(),
            Provenance::default(),
            MergePolicy::ProviderWinsOnAll,
            true,
        );
        assert_eq!(merged.provider_owned.developer, None);
        assert!(report.changes.iter().any(|c| matches!(c, FieldChange::Removed { .. })));
    }

    #[test]
    fn new_media_ref_is_added_and_recorded() {
        let mut refs = HashMap::new();
        refs.insert("cover".to_string(), "./media/covers/Foo.jpg".to_string());

        let (merged, report) = merge(
            &rom(),
            None,
            &ProviderOwnedFields::default(),
            &refs,
            Provenance::default(),
            MergePolicy::PreserveUserEdits,
            false,
        );
        assert_eq!(merged.media_refs.get("cover"), Some(&"./media/covers/Foo.jpg".to_string()));
        assert_eq!(report.added().count(), 1);
    }

    #[test]
    fn no_op_merge_on_fresh_entry_reports_nothing_but_additions() {
        let fresh = ProviderOwnedFields {
            name: Some("Foo".into()),
            ..Default::default()
        };
        let (_, report) = merge(
            &rom(),
            None,
            &fresh,
            &HashMap::new(),
            Provenance::default(),
            MergePolicy::PreserveUserEdits,
            false,
        );
        assert!(report.changes.iter().all(|c| matches!(c, FieldChange::Added { .. })));
    }
}
