//! Inventory Scanner (C1, §4.1). Enumerates a platform's ROM root and
//! classifies each entry as single-file, playlist, or disc-folder.

pub mod regions;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppResult;
use crate::models::{Platform, RomEntity, RomKind};

/// Conventional playlist extension; playlists are M3U files listing disc
/// paths one per line (§4.1).
const PLAYLIST_EXTENSION: &str = "m3u";

/// A dropped or malformed entity surfaced to the run summary (§4.1, §7).
#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub basename: String,
    pub reason: String,
}

/// Walk `platform.rom_root` and return classified entities plus any conflicts.
/// Scans only the platform's ROM root (not recursively into subdirectories,
/// other than opening disc-folder directories to find their single contained file).
pub fn scan(platform: &Platform) -> AppResult<(Vec<RomEntity>, Vec<ConflictReport>)> {
    let mut candidates: HashMap<String, RomEntity> = HashMap::new();
    let mut conflicts = Vec::new();

    let read_dir = match fs::read_dir(&platform.rom_root) {
        Ok(rd) => rd,
        Err(e) => {
            log::warn!(
                "failed to read ROM root {}: {e}",
                platform.rom_root.display()
            );
            return Ok((Vec::new(), Vec::new()));
        }
    };

    let mut entries: Vec<PathBuf> = read_dir.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    entries.sort();

    for path in entries {
        let result = if path.is_dir() {
            classify_disc_folder(&path, &platform.extensions)
        } else {
            classify_file(&path, &platform.extensions)
        };

        match result {
            Ok(Some(entity)) => {
                let key = conflict_key(&entity);
                if let Some(existing) = candidates.remove(&key) {
                    conflicts.push(ConflictReport {
                        basename: entity.display_basename.clone(),
                        reason: "basename collision between playlist and disc-folder".into(),
                    });
                    log::warn!(
                        "conflict: '{}' and '{}' share stem '{}', dropping both",
                        existing.primary_file.display(),
                        entity.primary_file.display(),
                        key
                    );
                } else {
                    candidates.insert(key, entity);
                }
            }
            Ok(None) => {}
            Err(reason) => {
                conflicts.push(ConflictReport {
                    basename: path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    reason,
                });
            }
        }
    }

    let mut entities: Vec<RomEntity> = candidates.into_values().collect();
    entities.sort_by(|a, b| a.display_basename.cmp(&b.display_basename));

    Ok((entities, conflicts))
}

/// Key used to detect cross-kind basename collisions (§4.1): a disc-folder's
/// `display_basename` keeps its directory extension (e.g. `Title.cue`) while
/// a playlist's is already a bare stem (e.g. `Title`) — so catching "a
/// playlist's stem equals that of a disc_folder" means comparing disc-folder
/// entries by their *stem*, not their display basename, while single-file
/// and playlist entries (whose display basename already has no extension)
/// compare as-is.
fn conflict_key(entity: &RomEntity) -> String {
    match entity.kind {
        RomKind::DiscFolder => Path::new(&entity.display_basename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&entity.display_basename)
            .to_string(),
        RomKind::Single | RomKind::Playlist => entity.display_basename.clone(),
    }
}

fn has_extension(path: &Path, accepted: &[String]) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    accepted
        .iter()
        .find(|e| e.to_lowercase() == ext)
        .map(|_| ext)
}

fn classify_file(path: &Path, accepted: &[String]) -> Result<Option<RomEntity>, String> {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_lowercase(),
        None => return Ok(None),
    };

    if ext == PLAYLIST_EXTENSION {
        return classify_playlist(path).map(Some);
    }

    if has_extension(path, accepted).is_none() {
        return Ok(None);
    }

    let basename = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| format!("non-UTF8 filename: {}", path.display()))?
        .to_string();

    let size = std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| format!("unreadable file {}: {e}", path.display()))?;

    let (regions, languages) = regions::parse_tags(&basename);

    Ok(Some(RomEntity {
        kind: RomKind::Single,
        display_basename: basename,
        primary_file: path.to_path_buf(),
        catalog_path: path.to_path_buf(),
        regions,
        languages,
        size,
        content_hash: None,
        auxiliary_files: Vec::new(),
    }))
}

fn classify_playlist(path: &Path) -> Result<RomEntity, String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("unreadable playlist {}: {e}", path.display()))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut discs: Vec<PathBuf> = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let disc_path = PathBuf::from(line);
        let resolved = if disc_path.is_absolute() {
            disc_path
        } else {
            dir.join(disc_path)
        };
        discs.push(resolved);
    }

    let disc1 = discs
        .first()
        .ok_or_else(|| format!("playlist {} has no entries", path.display()))?;

    if !disc1.is_file() {
        return Err(format!(
            "playlist {} disc 1 does not exist: {}",
            path.display(),
            disc1.display()
        ));
    }

    let size = std::fs::metadata(disc1)
        .map(|m| m.len())
        .map_err(|e| format!("unreadable disc 1 {}: {e}", disc1.display()))?;

    let basename = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| format!("non-UTF8 filename: {}", path.display()))?
        .to_string();

    let (regions, languages) = regions::parse_tags(&basename);
    let auxiliary = discs[1..].to_vec();

    Ok(RomEntity {
        kind: RomKind::Playlist,
        display_basename: basename,
        primary_file: disc1.clone(),
        catalog_path: path.to_path_buf(),
        regions,
        languages,
        size,
        content_hash: None,
        auxiliary_files: auxiliary,
    })
}

fn classify_disc_folder(dir: &Path, accepted: &[String]) -> Result<Option<RomEntity>, String> {
    if has_extension(dir, accepted).is_none() {
        return Ok(None);
    }

    let dir_stem = dir
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| format!("non-UTF8 directory name: {}", dir.display()))?;

    let dir_name = dir
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| format!("non-UTF8 directory name: {}", dir.display()))?
        .to_string();

    let entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| format!("unreadable directory {}: {e}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();

    let matching: Vec<&PathBuf> = entries
        .iter()
        .filter(|p| p.file_stem().and_then(|s| s.to_str()) == Some(dir_stem))
        .collect();

    let primary = match matching.as_slice() {
        [single] => (*single).clone(),
        [] => {
            return Err(format!(
                "disc-folder {} has no file matching its stem",
                dir.display()
            ))
        }
        _ => {
            return Err(format!(
                "disc-folder {} has more than one file matching its stem",
                dir.display()
            ))
        }
    };

    let size = std::fs::metadata(&primary)
        .map(|m| m.len())
        .map_err(|e| format!("unreadable file {}: {e}", primary.display()))?;

    let (regions, languages) = regions::parse_tags(&dir_name);

    Ok(Some(RomEntity {
        kind: RomKind::DiscFolder,
        display_basename: dir_name,
        primary_file: primary,
        catalog_path: dir.to_path_buf(),
        regions,
        languages,
        size,
        content_hash: None,
        auxiliary_files: Vec::new(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn platform(root: &Path) -> Platform {
        Platform {
            id: "nes".into(),
            name: "Nintendo Entertainment System".into(),
            provider_code: "3".into(),
            rom_root: root.to_path_buf(),
            extensions: vec!["nes".into(), "zip".into(), "cue".into()],
        }
    }

    #[test]
    fn single_file_classification() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("World Explorer (World).zip"), b"data").unwrap();

        let (entities, conflicts) = scan(&platform(dir.path())).unwrap();
        assert!(conflicts.is_empty());
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].kind, RomKind::Single);
        assert_eq!(entities[0].display_basename, "World Explorer (World)");
        assert_eq!(entities[0].regions, vec!["WOR"]);
    }

    #[test]
    fn playlist_classification_s2() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".multidisc")).unwrap();
        std::fs::write(
            dir.path().join(".multidisc/Sample Saga (Disc 1).cue"),
            b"disc1",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(".multidisc/Sample Saga (Disc 2).cue"),
            b"disc2",
        )
        .unwrap();
        let mut m3u = std::fs::File::create(dir.path().join("Sample Saga.m3u")).unwrap();
        writeln!(m3u, "./.multidisc/Sample Saga (Disc 1).cue").unwrap();
        writeln!(m3u, "./.multidisc/Sample Saga (Disc 2).cue").unwrap();

        let (entities, _) = scan(&platform(dir.path())).unwrap();
        assert_eq!(entities.len(), 1);
        let e = &entities[0];
        assert_eq!(e.kind, RomKind::Playlist);
        assert_eq!(e.display_basename, "Sample Saga");
        assert!(e.primary_file.ends_with("Sample Saga (Disc 1).cue"));
        assert_eq!(e.auxiliary_files.len(), 1);
    }

    #[test]
    fn disc_folder_classification_s3() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Demo Orbit (Disc 1).cue");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("Demo Orbit (Disc 1).cue"), b"data").unwrap();

        let (entities, _) = scan(&platform(dir.path())).unwrap();
        assert_eq!(entities.len(), 1);
        let e = &entities[0];
        assert_eq!(e.kind, RomKind::DiscFolder);
        assert_eq!(e.display_basename, "Demo Orbit (Disc 1).cue");
    }

    #[test]
    fn playlist_and_disc_folder_basename_collision_drops_both_s6() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Title.m3u"), "Title.cue/Title.cue\n").unwrap();
        let folder = dir.path().join("Title.cue");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("Title.cue"), b"data").unwrap();

        let (entities, conflicts) = scan(&platform(dir.path())).unwrap();
        assert!(entities.is_empty());
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn playlist_missing_disc_one_is_dropped_with_report() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Broken.m3u"), "missing.cue\n").unwrap();

        let (entities, conflicts) = scan(&platform(dir.path())).unwrap();
        assert!(entities.is_empty());
        assert_eq!(conflicts.len(), 1);
    }
}
