//! Platform-index input (§6.2). A read-only XML document maintained by the
//! downstream frontend, listing platforms with their accepted extensions
//! and a path macro the engine resolves against its own configured ROM
//! root. Parsed with the same `quick-xml` reader idiom as
//! [`crate::catalog`]; never written back.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{AppError, AppResult};
use crate::models::Platform;

/// One `<system>` entry from the platform-index document before path macro
/// resolution.
struct RawSystem {
    id: String,
    name: String,
    provider_code: String,
    path_macro: String,
    extensions: Vec<String>,
}

/// Parse the platform-index document, then resolve each system's `path`
/// macro (`%ROMPATH%/<id>` in the reference frontend) against
/// `rom_root_base` to produce concrete [`Platform`]s (§6.2).
///
/// Unknown elements inside a `<system>` are ignored rather than erroring —
/// the engine only reads the fields it needs from a document it does not
/// own the schema of.
pub fn load(path: &Path, rom_root_base: &Path) -> AppResult<Vec<Platform>> {
    let xml = std::fs::read_to_string(path)?;
    let raw = parse_systems(&xml)?;
    Ok(raw.into_iter().map(|r| resolve(r, rom_root_base)).collect())
}

fn resolve(raw: RawSystem, rom_root_base: &Path) -> Platform {
    let relative = raw
        .path_macro
        .replace("%ROMPATH%", "")
        .trim_start_matches(['/', '\\'])
        .replace("%SYSTEM%", &raw.id);
    let rom_root = if relative.is_empty() {
        rom_root_base.join(&raw.id)
    } else {
        rom_root_base.join(relative)
    };

    Platform {
        id: raw.id,
        name: raw.name,
        provider_code: raw.provider_code,
        rom_root,
        extensions: raw.extensions,
    }
}

fn parse_systems(xml: &str) -> AppResult<Vec<RawSystem>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut systems = Vec::new();
    let mut buf = Vec::new();

    let mut in_system = false;
    let mut current_tag = String::new();
    let mut current_text = String::new();
    let mut id = String::new();
    let mut name = String::new();
    let mut provider_code = String::new();
    let mut path_macro = String::new();
    let mut extensions = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if !in_system && e.name().as_ref() == b"system" => {
                in_system = true;
                id.clear();
                name.clear();
                provider_code.clear();
                path_macro.clear();
                extensions.clear();
            }
            Ok(Event::Start(e)) if in_system => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                current_text.clear();
            }
            Ok(Event::Text(e)) if in_system => {
                current_text.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) if in_system && e.name().as_ref() == b"system" => {
                in_system = false;
                if id.is_empty() {
                    log::warn!("platform-index: skipping <system> with no name/id");
                    continue;
                }
                systems.push(RawSystem {
                    id: id.clone(),
                    name: name.clone(),
                    provider_code: provider_code.clone(),
                    path_macro: path_macro.clone(),
                    extensions: extensions.clone(),
                });
            }
            Ok(Event::End(e)) if in_system => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "name" => {
                        id = current_text.clone();
                        if name.is_empty() {
                            name.clone_from(&current_text);
                        }
                    }
                    "fullname" => name = current_text.clone(),
                    "providerid" | "scraperid" => provider_code = current_text.clone(),
                    "path" => path_macro = current_text.clone(),
                    "extension" => {
                        extensions = current_text
                            .split_whitespace()
                            .map(|e| e.trim_start_matches('.').to_lowercase())
                            .collect();
                    }
                    _ => {}
                }
                current_tag.clear();
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(AppError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(systems)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<systemList>
  <system>
    <name>nes</name>
    <fullname>Nintendo Entertainment System</fullname>
    <path>%ROMPATH%/nes</path>
    <extension>.nes .zip</extension>
    <providerid>3</providerid>
  </system>
  <system>
    <name>snes</name>
    <fullname>Super Nintendo</fullname>
    <path>%ROMPATH%/snes</path>
    <extension>.sfc .smc .zip</extension>
    <providerid>4</providerid>
  </system>
</systemList>"#;

    #[test]
    fn parses_systems_and_resolves_path_macro() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("es_systems.cfg");
        std::fs::write(&path, SAMPLE).unwrap();

        let platforms = load(&path, Path::new("/roms")).unwrap();
        assert_eq!(platforms.len(), 2);
        assert_eq!(platforms[0].id, "nes");
        assert_eq!(platforms[0].name, "Nintendo Entertainment System");
        assert_eq!(platforms[0].provider_code, "3");
        assert_eq!(platforms[0].extensions, vec!["nes", "zip"]);
        assert_eq!(platforms[0].rom_root, Path::new("/roms/nes"));
    }

    #[test]
    fn system_missing_name_is_skipped() {
        let xml = r#"<systemList><system><fullname>Orphan</fullname></system></systemList>"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("es_systems.cfg");
        std::fs::write(&path, xml).unwrap();

        let platforms = load(&path, Path::new("/roms")).unwrap();
        assert!(platforms.is_empty());
    }
}
