//! Catalog Store (C3) + Catalog Writer (C11), §4.3/§4.11.
//!
//! Parses and serializes the downstream frontend's XML gamelist, keeping any
//! sub-element outside the known schema in an ordered, verbatim preservation
//! buffer (§9 "XML parsing tolerating unknown elements"). Provenance is a
//! JSON sidecar keyed by display basename, written alongside the catalog.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{AppError, AppResult};
use crate::models::{CatalogEntry, Provenance, ProviderOwnedFields, UnknownElement, UserOwnedFields};

/// Known sub-element tag names; anything else inside `<game>` is preserved
/// verbatim via [`UnknownElement`]. Media tags are not listed here — they are
/// recognized by [`crate::media::MEDIA_TAGS`] and folded into `media_refs`.
const KNOWN_SCALAR_TAGS: &[&str] = &[
    "path",
    "basename",
    "name",
    "desc",
    "releasedate",
    "developer",
    "publisher",
    "genre",
    "players",
    "rating",
    "favorite",
    "lastplayed",
    "hidden",
    "kidgame",
];

/// An entry loaded from the existing catalog, in source (scan) order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Load and parse a platform's catalog file. Tolerates malformed
    /// individual `<game>` records by skipping them with a warning;
    /// never aborts the whole read (§4.3).
    pub fn load(path: &Path) -> AppResult<Catalog> {
        if !path.exists() {
            return Ok(Catalog::default());
        }
        let xml = std::fs::read_to_string(path)?;
        parse_gamelist(&xml)
    }

    pub fn lookup(&self, basename: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.display_basename == basename)
    }

    /// Atomically write the catalog to `path`: serialize to a sibling temp
    /// file, fsync, rename over the old file (§4.3, §4.11). On any failure
    /// the previous file is left intact.
    pub fn commit(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let xml = serialize_gamelist(&self.entries)?;

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(xml.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| AppError::Io(e.error))?;
        Ok(())
    }
}

/// Provenance index keyed by display basename (§3, §4.3).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ProvenanceIndex {
    pub entries: HashMap<String, Provenance>,
}

impl ProvenanceIndex {
    pub fn load(path: &Path) -> AppResult<ProvenanceIndex> {
        if !path.exists() {
            return Ok(ProvenanceIndex::default());
        }
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| AppError::Other(format!("malformed provenance sidecar: {e}")))
    }

    pub fn commit(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Other(format!("failed to serialize provenance: {e}")))?;

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| AppError::Io(e.error))?;
        Ok(())
    }
}

/// Presence ratio for the pre-run integrity check (§4.3.1):
/// `|found ∩ catalog| / |catalog|`. A catalog with zero entries is
/// vacuously fully present (ratio 1.0) — there is nothing to prune.
pub fn presence_ratio(found_basenames: &[String], catalog: &Catalog) -> f64 {
    if catalog.entries.is_empty() {
        return 1.0;
    }
    let found: std::collections::HashSet<&str> =
        found_basenames.iter().map(String::as_str).collect();
    let present = catalog
        .entries
        .iter()
        .filter(|e| found.contains(e.display_basename.as_str()))
        .count();
    present as f64 / catalog.entries.len() as f64
}

fn parse_gamelist(xml: &str) -> AppResult<Catalog> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();

    let mut in_game = false;
    let mut current_tag = String::new();
    let mut current_text = String::new();
    let mut entry = CatalogEntry::default();
    let mut unknown_depth = 0usize;
    let mut unknown_buf = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if !in_game && e.name().as_ref() == b"game" => {
                in_game = true;
                entry = CatalogEntry::default();
            }
            Ok(Event::Start(e)) if in_game && unknown_depth == 0 => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if KNOWN_SCALAR_TAGS.contains(&tag.as_str())
                    || crate::media::MEDIA_TAGS.iter().any(|(_, t)| *t == tag)
                {
                    current_tag = tag;
                    current_text.clear();
                } else {
                    unknown_depth = 1;
                    unknown_buf.clear();
                    write_start_tag(&mut unknown_buf, &e);
                }
            }
            Ok(Event::Start(e)) if in_game && unknown_depth > 0 => {
                unknown_depth += 1;
                write_start_tag(&mut unknown_buf, &e);
            }
            Ok(Event::Empty(e)) if in_game && unknown_depth == 0 => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if !KNOWN_SCALAR_TAGS.contains(&tag.as_str())
                    && !crate::media::MEDIA_TAGS.iter().any(|(_, t)| *t == tag)
                {
                    let mut raw = String::new();
                    write_start_tag(&mut raw, &e);
                    entry.unknown_elements.push(UnknownElement {
                        name: tag,
                        raw_xml: raw.replace("><", "/><").replacen('>', "/>", 1),
                    });
                }
            }
            Ok(Event::Text(e)) if in_game && unknown_depth == 0 => {
                current_text.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::Text(e)) if in_game && unknown_depth > 0 => {
                unknown_buf.push_str(&escape_text(&e.unescape().unwrap_or_default()));
            }
            Ok(Event::End(e)) if in_game && unknown_depth > 0 => {
                write_end_tag(&mut unknown_buf, &e);
                unknown_depth -= 1;
                if unknown_depth == 0 {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    entry.unknown_elements.push(UnknownElement {
                        name,
                        raw_xml: unknown_buf.clone(),
                    });
                }
            }
            Ok(Event::End(e)) if in_game && e.name().as_ref() == b"game" => {
                in_game = false;
                if let Err(reason) = finalize_entry(&mut entry) {
                    log::warn!("skipping malformed catalog entry: {reason}");
                } else {
                    entries.push(entry.clone());
                }
            }
            Ok(Event::End(e)) if in_game => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                apply_scalar(&mut entry, &tag, &current_text);
                current_tag.clear();
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("XML parse error, stopping: {e}");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(Catalog { entries })
}

fn apply_scalar(entry: &mut CatalogEntry, tag: &str, text: &str) {
    if let Some((media_type, _)) = crate::media::MEDIA_TAGS.iter().find(|(_, t)| *t == tag) {
        entry.media_refs.insert((*media_type).to_string(), text.to_string());
        return;
    }
    match tag {
        "path" => entry.path = PathBuf::from(text),
        // Stored explicitly rather than re-derived from `<path>` on reload:
        // a disc-folder's basename keeps its directory extension
        // (`Title.cue`) while `Path::file_stem` on that same `<path>` would
        // strip it, breaking the lookup a rerun uses to find this entry.
        "basename" => entry.display_basename = text.to_string(),
        "name" => entry.provider_owned.name = non_empty(text),
        "desc" => entry.provider_owned.description = non_empty(text),
        "releasedate" => entry.provider_owned.release_date = non_empty(text),
        "developer" => entry.provider_owned.developer = non_empty(text),
        "publisher" => entry.provider_owned.publisher = non_empty(text),
        "genre" => {
            entry.provider_owned.genres =
                text.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        }
        "players" => entry.provider_owned.player_count = text.trim().parse().ok(),
        "rating" => entry.provider_owned.rating = text.trim().parse().ok(),
        "favorite" => entry.user_owned.favorite = parse_bool(text),
        "lastplayed" => {
            entry.user_owned.last_played =
                chrono::DateTime::parse_from_rfc3339(text).ok().map(|d| d.with_timezone(&chrono::Utc));
        }
        "hidden" => entry.user_owned.hidden = parse_bool(text),
        "kidgame" => entry.user_owned.kid_appropriate = parse_bool(text),
        _ => {}
    }
}

fn finalize_entry(entry: &mut CatalogEntry) -> Result<(), String> {
    // An explicit `<basename>` tag (written by this crate) wins outright;
    // older catalogs without one fall back to deriving it from `<path>`,
    // which is only correct for single-file and playlist entries.
    if entry.display_basename.is_empty() {
        let basename = entry
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or("entry missing a usable <path>")?
            .to_string();
        entry.display_basename = basename;
    }
    Ok(())
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn write_start_tag(out: &mut String, e: &BytesStart) {
    out.push('<');
    out.push_str(&String::from_utf8_lossy(e.name().as_ref()));
    for attr in e.attributes().flatten() {
        out.push(' ');
        out.push_str(&String::from_utf8_lossy(attr.key.as_ref()));
        out.push_str("=\"");
        out.push_str(&attr.unescape_value().unwrap_or_default());
        out.push('"');
    }
    out.push('>');
}

fn write_end_tag(out: &mut String, e: &BytesEnd) {
    out.push_str("</");
    out.push_str(&String::from_utf8_lossy(e.name().as_ref()));
    out.push('>');
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Serialize entries back to UTF-8 pretty-printed XML, in the given (scan)
/// order, deterministic across runs on identical input (§4.11).
fn serialize_gamelist(entries: &[CatalogEntry]) -> AppResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Start(BytesStart::new("gameList")))
        .map_err(AppError::Xml)?;

    for entry in entries {
        write_game(&mut writer, entry)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("gameList")))
        .map_err(AppError::Xml)?;

    let bytes = writer.into_inner();
    let body = String::from_utf8(bytes).map_err(|e| AppError::Other(e.to_string()))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
}

fn write_game(writer: &mut Writer<Vec<u8>>, entry: &CatalogEntry) -> AppResult<()> {
    writer
        .write_event(Event::Start(BytesStart::new("game")))
        .map_err(AppError::Xml)?;

    write_scalar(writer, "path", &path_text(&entry.path))?;
    write_scalar(writer, "basename", &entry.display_basename)?;
    if let Some(v) = &entry.provider_owned.name {
        write_scalar(writer, "name", v)?;
    }
    if let Some(v) = &entry.provider_owned.description {
        write_scalar(writer, "desc", v)?;
    }
    if let Some(v) = &entry.provider_owned.release_date {
        write_scalar(writer, "releasedate", v)?;
    }
    if let Some(v) = &entry.provider_owned.developer {
        write_scalar(writer, "developer", v)?;
    }
    if let Some(v) = &entry.provider_owned.publisher {
        write_scalar(writer, "publisher", v)?;
    }
    if !entry.provider_owned.genres.is_empty() {
        write_scalar(writer, "genre", &entry.provider_owned.genres.join(", "))?;
    }
    if let Some(v) = entry.provider_owned.player_count {
        write_scalar(writer, "players", &v.to_string())?;
    }
    if let Some(v) = entry.provider_owned.rating {
        write_scalar(writer, "rating", &format!("{v}"))?;
    }

    for (media_type, tag) in crate::media::MEDIA_TAGS {
        if let Some(path) = entry.media_refs.get(*media_type) {
            write_scalar(writer, tag, path)?;
        }
    }

    if let Some(v) = entry.user_owned.favorite {
        write_scalar(writer, "favorite", if v { "true" } else { "false" })?;
    }
    if let Some(v) = entry.user_owned.last_played {
        write_scalar(writer, "lastplayed", &v.to_rfc3339())?;
    }
    if let Some(v) = entry.user_owned.hidden {
        write_scalar(writer, "hidden", if v { "true" } else { "false" })?;
    }
    if let Some(v) = entry.user_owned.kid_appropriate {
        write_scalar(writer, "kidgame", if v { "true" } else { "false" })?;
    }

    for unknown in &entry.unknown_elements {
        writer
            .get_mut()
            .write_all(unknown.raw_xml.as_bytes())
            .map_err(AppError::Io)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("game")))
        .map_err(AppError::Xml)?;
    Ok(())
}

fn write_scalar(writer: &mut Writer<Vec<u8>>, tag: &str, text: &str) -> AppResult<()> {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(AppError::Xml)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(AppError::Xml)?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(AppError::Xml)?;
    Ok(())
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_known_and_unknown_fields_s4() {
        let xml = r#"<?xml version="1.0"?>
<gameList>
  <game>
    <path>./World Explorer (World).zip</path>
    <name>World Explorer</name>
    <desc>Old description</desc>
    <favorite>true</favorite>
    <mycustom>tag</mycustom>
  </game>
</gameList>"#;

        let catalog = parse_gamelist(xml).unwrap();
        assert_eq!(catalog.entries.len(), 1);
        let entry = &catalog.entries[0];
        assert_eq!(entry.display_basename, "World Explorer (World)");
        assert_eq!(entry.user_owned.favorite, Some(true));
        assert_eq!(entry.unknown_elements.len(), 1);
        assert_eq!(entry.unknown_elements[0].name, "mycustom");

        let serialized = serialize_gamelist(&catalog.entries).unwrap();
        let reparsed = parse_gamelist(&serialized).unwrap();
        assert_eq!(reparsed.entries.len(), 1);
        assert_eq!(reparsed.entries[0].user_owned.favorite, Some(true));
        assert_eq!(reparsed.entries[0].unknown_elements.len(), 1);
    }

    #[test]
    fn malformed_entry_is_skipped_not_aborted() {
        let xml = r#"<gameList>
  <game>
    <name>No path here</name>
  </game>
  <game>
    <path>./Good.zip</path>
    <name>Good</name>
  </game>
</gameList>"#;
        let catalog = parse_gamelist(xml).unwrap();
        assert_eq!(catalog.entries.len(), 1);
        assert_eq!(catalog.entries[0].display_basename, "Good");
    }

    #[test]
    fn atomic_write_leaves_previous_file_intact_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gamelist.xml");
        std::fs::write(&path, "previous content").unwrap();

        // Writing into a missing parent directory used to leave a truncated
        // file; commit() now creates parents first, so this should succeed
        // rather than clobber `path` halfway through.
        let catalog = Catalog {
            entries: vec![CatalogEntry {
                path: PathBuf::from("./Game.zip"),
                display_basename: "Game".into(),
                ..Default::default()
            }],
        };
        catalog.commit(&path).unwrap();
        assert!(Catalog::load(&path).unwrap().entries.len() == 1);
    }

    #[test]
    fn presence_ratio_boundary() {
        let catalog = Catalog {
            entries: (0..20)
                .map(|i| CatalogEntry {
                    display_basename: format!("g{i}"),
                    ..Default::default()
                })
                .collect(),
        };
        let found: Vec<String> = (0..19).map(|i| format!("g{i}")).collect();
        let ratio = presence_ratio(&found, &catalog);
        assert!((ratio - 0.95).abs() < 1e-9);
    }
}
