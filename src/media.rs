//! Media Selector & Fetcher (C9, §4.9). Picks one asset per requested media
//! type out of the Provider's candidate list, downloads it through the
//! shared pooled transport, validates it, and writes it into the platform's
//! media tree under an atomic rename.

use std::path::{Path, PathBuf};

use crate::config::MediaValidation;
use crate::identity::compute_identity;
use crate::models::MediaAsset;
use crate::provider::ProviderError;

/// Closed mapping from media type to both its gamelist XML tag and its
/// on-disk directory name (§4.9, §6.4). The set itself is an Open Question
/// left to the operator's enabled-media-types config (§9); this is the
/// common EmulationStation-style vocabulary.
pub const MEDIA_TAGS: &[(&str, &str)] = &[
    ("cover", "image"),
    ("screenshot", "thumbnail"),
    ("marquee", "marquee"),
    ("video", "video"),
    ("manual", "manual"),
    ("fanart", "fanart"),
];

pub fn directory_for(media_type: &str) -> Option<&'static str> {
    MEDIA_TAGS.iter().find(|(t, _)| *t == media_type).map(|_| match media_type {
        "cover" => "covers",
        "screenshot" => "screenshots",
        "marquee" => "marquees",
        "video" => "videos",
        "manual" => "manuals",
        "fanart" => "fanart",
        _ => unreachable!(),
    })
}

/// Media types that carry no meaningful region (§4.9: "region filtering is
/// skipped for asset types that are inherently regionless"). Left as a
/// closed set here the way the Provider media-type vocabulary itself is
/// closed (§9 Open Question); callers who need a different split can filter
/// `requested_types` before calling in.
pub const REGIONLESS_TYPES: &[&str] = &["video", "fanart"];

/// Media types whose candidates vary by language rather than region.
pub const LANGUAGE_BEARING_TYPES: &[&str] = &["manual"];

/// Pick one candidate per requested media type out of everything the
/// Provider returned (§4.9):
///
/// 1. filter to candidates of that type;
/// 2. partition by region — the ROM's own declared regions first (in ROM
///    order), then the configured preferred regions (in config order),
///    skipping regions already covered; skipped entirely for regionless
///    types;
/// 3. language applies the same way for language-bearing types;
/// 4. within the first non-empty bucket, pick the first candidate
///    (deterministic).
pub fn select_assets<'a>(
    candidates: &'a [MediaAsset],
    requested_types: &[String],
    rom_regions: &[String],
    region_priority: &[String],
    rom_languages: &[String],
    language_priority: &[String],
) -> Vec<&'a MediaAsset> {
    let mut picked = Vec::new();
    for media_type in requested_types {
        let bucket: Vec<&MediaAsset> = candidates
            .iter()
            .filter(|a| &a.media_type == media_type)
            .collect();
        if bucket.is_empty() {
            continue;
        }

        let chosen = if REGIONLESS_TYPES.contains(&media_type.as_str()) {
            bucket[0]
        } else if LANGUAGE_BEARING_TYPES.contains(&media_type.as_str()) {
            select_by_priority(&bucket, rom_languages, language_priority, |a| a.language.as_deref())
                .unwrap_or(bucket[0])
        } else {
            select_by_priority(&bucket, rom_regions, region_priority, |a| a.region.as_deref())
                .unwrap_or(bucket[0])
        };
        picked.push(chosen);
    }
    picked
}

/// Build the combined priority order (entity-declared tags first, in their
/// own order, then the configured preference order, de-duplicated) and
/// return the first bucket member matching it.
fn select_by_priority<'a>(
    bucket: &[&'a MediaAsset],
    entity_tags: &[String],
    config_priority: &[String],
    tag_of: impl Fn(&MediaAsset) -> Option<&str>,
) -> Option<&'a MediaAsset> {
    let mut order: Vec<&str> = Vec::with_capacity(entity_tags.len() + config_priority.len());
    for tag in entity_tags.iter().chain(config_priority.iter()) {
        if !order.contains(&tag.as_str()) {
            order.push(tag.as_str());
        }
    }
    for tag in order {
        if let Some(found) = bucket.iter().find(|a| tag_of(a) == Some(tag)) {
            return Some(*found);
        }
    }
    None
}

/// Minimum non-empty-file size accepted regardless of validation level —
/// a zero-byte "image" is never a legitimate asset (§4.9).
const MIN_ASSET_BYTES: usize = 1;

/// Download and validate one asset into `platform_media_root`, returning the
/// catalog-relative path to record in `media_refs` (§4.9, §6.4).
///
/// Skips the network call entirely if a file already exists at the target
/// path and either `skip_existing_media` is set, or the existing file's
/// hash matches `asset.hash` (write-avoidance, §4.9).
#[allow(clippy::too_many_arguments)]
pub async fn fetch_asset(
    http: &reqwest::Client,
    asset: &MediaAsset,
    display_basename: &str,
    platform_media_root: &Path,
    validation: MediaValidation,
    min_image_side: u32,
    skip_existing_media: bool,
) -> Result<PathBuf, ProviderError> {
    let dir_name = directory_for(&asset.media_type)
        .ok_or_else(|| ProviderError::Malformed(format!("unknown media type {}", asset.media_type)))?;
    let dir = platform_media_root.join(dir_name);
    let filename = format!("{display_basename}.{}", asset.extension);
    let target = dir.join(&filename);

    if target.exists() {
        if skip_existing_media {
            return Ok(catalog_relative(dir_name, &filename));
        }
        if let Some(expected) = &asset.hash {
            if let Ok(existing) =
                compute_identity(&target, crate::config::HashAlgorithm::Sha1, u64::MAX)
            {
                if existing.content_hash.as_deref() == Some(expected.as_str()) {
                    return Ok(catalog_relative(dir_name, &filename));
                }
            }
        }
    }

    std::fs::create_dir_all(&dir).map_err(|e| ProviderError::Retryable(e.to_string()))?;

    let bytes = download_with_retry(http, &asset.url).await?;
    validate_asset(&bytes, validation, min_image_side)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .map_err(|e| ProviderError::Retryable(e.to_string()))?;
    std::io::Write::write_all(&mut tmp, &bytes).map_err(|e| ProviderError::Retryable(e.to_string()))?;
    tmp.persist(&target)
        .map_err(|e| ProviderError::Retryable(e.error.to_string()))?;

    Ok(catalog_relative(dir_name, &filename))
}

/// Validate a downloaded asset per the configured level (§6.7):
/// `disabled` skips entirely; `normal` just checks non-empty bytes;
/// `strict` decodes the image and enforces `min_image_side`.
fn validate_asset(
    bytes: &[u8],
    validation: MediaValidation,
    min_image_side: u32,
) -> Result<(), ProviderError> {
    if matches!(validation, MediaValidation::Disabled) {
        return Ok(());
    }
    if bytes.len() < MIN_ASSET_BYTES {
        return Err(ProviderError::Malformed("empty asset body".into()));
    }
    if matches!(validation, MediaValidation::Strict) {
        let img = image::load_from_memory(bytes)
            .map_err(|e| ProviderError::Malformed(format!("invalid image data: {e}")))?;
        let (w, h) = (img.width(), img.height());
        if w < min_image_side || h < min_image_side {
            return Err(ProviderError::Malformed(format!(
                "image {w}x{h} below minimum side {min_image_side}"
            )));
        }
    }
    Ok(())
}

fn catalog_relative(dir_name: &str, filename: &str) -> PathBuf {
    PathBuf::from(format!("./{dir_name}/{filename}"))
}

/// One retry on a retryable transport failure; permanent failures and
/// 4xx/5xx are classified the way [`crate::provider`] classifies them.
async fn download_with_retry(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, ProviderError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match download_once(http, url).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_retryable() && attempts < 2 => continue,
            Err(e) => return Err(e),
        }
    }
}

async fn download_once(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, ProviderError> {
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e: reqwest::Error| map_transport_error(e))?;

    if resp.status().is_success() {
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| map_transport_error(e))
    } else if resp.status().as_u16() == 404 {
        Err(ProviderError::NotFound)
    } else if resp.status().is_server_error() || resp.status().as_u16() == 429 {
        Err(ProviderError::Retryable(format!("http {}", resp.status())))
    } else {
        Err(ProviderError::Fatal(format!("http {}", resp.status())))
    }
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() {
        ProviderError::Retryable(e.to_string())
    } else {
        ProviderError::Fatal(e.to_string())
    }
}
