//! Run Orchestrator (C13, §4.13). Drives the platform loop end to end:
//! parses the platform-index, runs inventory + identity + the integrity
//! check per platform, enqueues decided work onto a [`Scheduler`], and
//! wires the per-item pipeline (cache → throttle → Provider → scorer →
//! media → merge) as that scheduler's handler. Generalizes the teacher's
//! sequential `metadata/mod.rs::enrich_roms` driver loop (progress
//! callback + cooperative cancellation) into a pipeline run through a
//! bounded worker pool instead of one ROM at a time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::cache::{cache_key, ResponseCache, DEFAULT_TTL};
use crate::catalog::{presence_ratio, Catalog, ProvenanceIndex};
use crate::config::RunConfig;
use crate::decision::{self, Action};
use crate::error::AppResult;
use crate::identity::compute_identity;
use crate::media::{fetch_asset, select_assets};
use crate::merge::{merge, ChangeReport};
use crate::models::{CatalogEntry, MediaAsset, Platform, Priority, Provenance, ProviderOwnedFields, RomEntity, WorkItem};
use crate::platform_index;
use crate::provider::{GameRecord, Provider, ProviderError};
use crate::scheduler::{ItemOutcome, Scheduler};
use crate::scorer::{rank_candidates, resolve, MatchResolution};
use crate::summary::{CleanupMove, Counts, PlatformSummary, RunSummary};
use crate::throttle::Throttle;
use crate::ui::{IntegrityCleanupRequest, MediaCleanupRequest, Prompts, SearchPromptReply, SearchPromptRequest};

const CATALOG_FILE: &str = "gamelist.xml";
const PROVENANCE_FILE: &str = "provenance.json";
const CACHE_FILE: &str = "response_cache.json";
const PROVIDER_ENDPOINT: &str = "provider";
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// One progress tick, emitted as each ROM's pipeline finishes (generalizes
/// the teacher's `ScanProgress` callback shape to the per-platform loop).
#[derive(Debug, Clone)]
pub struct RunProgress {
    pub platform_id: String,
    pub total: u64,
    pub current: u64,
    pub current_item: String,
}

/// Run every selected platform in the index against `config`, returning a
/// [`RunSummary`] covering however much of the run completed (§4.13, §6.6).
pub async fn run(
    config: &RunConfig,
    provider: Arc<dyn Provider>,
    prompts: Arc<dyn Prompts>,
    cancel: CancellationToken,
    on_progress: impl Fn(RunProgress) + Send + Sync + 'static,
) -> RunSummary {
    let on_progress = Arc::new(on_progress);
    let platforms = match platform_index::load(&config.paths.platform_index, &config.paths.rom_root) {
        Ok(platforms) => platforms,
        Err(e) => {
            return RunSummary {
                platforms: Vec::new(),
                fatal_error: Some(format!("failed to load platform index: {e}")),
                cancelled: false,
            }
        }
    };

    let http = match build_http_client(config) {
        Ok(http) => http,
        Err(e) => {
            return RunSummary {
                platforms: Vec::new(),
                fatal_error: Some(format!("failed to build HTTP client: {e}")),
                cancelled: false,
            }
        }
    };

    let mut run_summary = RunSummary::default();

    for platform in platforms.into_iter().filter(|p| config.platforms.allows(&p.id)) {
        if cancel.is_cancelled() {
            run_summary.cancelled = true;
            break;
        }

        match run_platform(
            config,
            &platform,
            Arc::clone(&provider),
            Arc::clone(&prompts),
            http.clone(),
            cancel.clone(),
            Arc::clone(&on_progress),
        )
        .await
        {
            Ok(summary) => {
                let cancelled_here = summary.cancelled;
                run_summary.platforms.push(summary);
                if cancelled_here {
                    run_summary.cancelled = true;
                    break;
                }
            }
            Err(e) => {
                run_summary.fatal_error = Some(format!("platform {}: {e}", platform.id));
                break;
            }
        }
    }

    run_summary
}

fn build_http_client(config: &RunConfig) -> AppResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.api.request_timeout_s))
        .build()?)
}

#[allow(clippy::too_many_arguments)]
async fn run_platform(
    config: &RunConfig,
    platform: &Platform,
    provider: Arc<dyn Provider>,
    prompts: Arc<dyn Prompts>,
    http: reqwest::Client,
    cancel: CancellationToken,
    on_progress: Arc<impl Fn(RunProgress) + Send + Sync + 'static>,
) -> AppResult<PlatformSummary> {
    let started_at = Utc::now();
    let platform_catalog_dir = config.paths.catalog_root.join(&platform.id);
    let catalog_path = platform_catalog_dir.join(CATALOG_FILE);
    let provenance_path = platform_catalog_dir.join(PROVENANCE_FILE);
    let cache_path = platform_catalog_dir.join(".cache").join(CACHE_FILE);

    let (mut roms, conflicts) = crate::inventory::scan(platform)?;
    let catalog = Catalog::load(&catalog_path)?;
    let mut provenance_index = ProvenanceIndex::load(&provenance_path)?;

    let found_basenames: Vec<String> = roms.iter().map(|r| r.display_basename.clone()).collect();
    let ratio = presence_ratio(&found_basenames, &catalog);
    let mut cleanup_moves = Vec::new();
    let mut catalog = catalog;
    if ratio < config.scraping.integrity_threshold {
        let found_set: std::collections::HashSet<&str> = found_basenames.iter().map(String::as_str).collect();
        let orphan_count = catalog.entries.iter().filter(|e| !found_set.contains(e.display_basename.as_str())).count();
        if orphan_count > 0 {
            let confirmed = prompts
                .confirm_integrity_cleanup(IntegrityCleanupRequest {
                    platform_id: platform.id.clone(),
                    presence_ratio: ratio,
                    orphan_count,
                })
                .await;
            if confirmed {
                cleanup_moves = cleanup_orphans(&mut catalog, &found_set, &config.paths.media_root, platform);
            }
        }
    }

    cleanup_moves.extend(
        cleanup_disabled_media_types(
            &mut catalog,
            &config.media.enabled_types,
            &config.paths.media_root,
            platform,
            prompts.as_ref(),
        )
        .await,
    );

    compute_identities(&mut roms, config).await;

    let limits = provider.limits().await.map_err(|e| crate::error::AppError::Auth(e.to_string()))?;
    let requests_per_minute = config.api.r#override.requests_per_minute.unwrap_or(DEFAULT_REQUESTS_PER_MINUTE);
    let max_workers = config
        .api
        .r#override
        .max_workers
        .unwrap_or(DEFAULT_WORKERS)
        .min(limits.max_threads.unwrap_or(DEFAULT_WORKERS as u32) as usize)
        .max(1);

    let throttle = Throttle::new();
    throttle.configure(PROVIDER_ENDPOINT, requests_per_minute, Duration::from_secs(60)).await;
    let throttle_for_stats = Arc::clone(&throttle);

    let response_cache = Arc::new(AsyncMutex::new(ResponseCache::load(&cache_path, DEFAULT_TTL)?));
    let merged_entries: Arc<AsyncMutex<HashMap<String, CatalogEntry>>> = Arc::new(AsyncMutex::new(HashMap::new()));
    let change_reports: Arc<AsyncMutex<Vec<ChangeReport>>> = Arc::new(AsyncMutex::new(Vec::new()));
    let not_found_names: Arc<AsyncMutex<Vec<String>>> = Arc::new(AsyncMutex::new(Vec::new()));

    let mut counts = Counts::default();
    let scheduler = Scheduler::new(config.api.max_retries, cancel.clone());
    let mut skipped_existing: HashMap<String, CatalogEntry> = HashMap::new();

    for rom in &roms {
        counts.scanned += 1;
        let existing = catalog.lookup(&rom.display_basename);
        let action = decision::evaluate(
            existing,
            rom.content_hash.as_deref(),
            &config.media.enabled_types,
            config.scraping.update_policy,
            config.scraping.skip_scraped,
        );
        if matches!(action, Action::Skip) {
            counts.skipped += 1;
            if let Some(entry) = existing {
                skipped_existing.insert(rom.display_basename.clone(), entry.clone());
            }
            continue;
        }
        scheduler
            .enqueue(WorkItem {
                rom: rom.clone(),
                action,
                priority: Priority::Normal,
                retry_count: 0,
                last_error: None,
            })
            .await;
    }

    let total = roms.len() as u64 - counts.skipped;
    let progress_done = Arc::new(std::sync::atomic::AtomicU64::new(0));
    let existing_by_basename: Arc<HashMap<String, CatalogEntry>> = Arc::new(
        catalog
            .entries
            .iter()
            .map(|e| (e.display_basename.clone(), e.clone()))
            .collect(),
    );

    let handler_platform_code = platform.provider_code.clone();
    let handler_platform_id = platform.id.clone();
    let handler_media_root = config.paths.media_root.join(&platform.id);
    let handler_regions = config.regions.clone();
    let handler_languages = config.languages.clone();
    let handler_merge_policy = config.scraping.merge_policy;
    let handler_validation = config.media.validation;
    let handler_min_image_side = config.media.min_image_side;
    let handler_skip_existing_media = config.media.skip_existing_media;
    let handler_search_threshold = config.search.threshold;
    let handler_search_interactive = config.search.interactive;
    let handler_enable_fallback = config.search.enable_fallback;

    let report = scheduler
        .run(max_workers, move |work_item| {
            let provider = Arc::clone(&provider);
            let prompts = Arc::clone(&prompts);
            let throttle = Arc::clone(&throttle);
            let http = http.clone();
            let response_cache = Arc::clone(&response_cache);
            let merged_entries = Arc::clone(&merged_entries);
            let change_reports = Arc::clone(&change_reports);
            let not_found_names = Arc::clone(&not_found_names);
            let on_progress = Arc::clone(&on_progress);
            let progress_done = Arc::clone(&progress_done);
            let platform_code = handler_platform_code.clone();
            let platform_id = handler_platform_id.clone();
            let media_root = handler_media_root.clone();
            let regions = handler_regions.clone();
            let languages = handler_languages.clone();
            let existing_entry = existing_by_basename.get(&work_item.rom.display_basename).cloned();

            async move {
                let outcome = process_item(
                    &work_item,
                    existing_entry,
                    &*provider,
                    &*prompts,
                    &throttle,
                    &http,
                    &response_cache,
                    &merged_entries,
                    &change_reports,
                    &platform_code,
                    &media_root,
                    &regions,
                    &languages,
                    handler_merge_policy,
                    handler_validation,
                    handler_min_image_side,
                    handler_skip_existing_media,
                    handler_search_threshold,
                    handler_search_interactive,
                    handler_enable_fallback,
                )
                .await;

                match &outcome {
                    ItemOutcome::Completed => {}
                    ItemOutcome::NotFound => {
                        not_found_names.lock().await.push(work_item.rom.display_basename.clone());
                    }
                    _ => {}
                }

                let done = progress_done.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                on_progress.as_ref()(RunProgress {
                    platform_id: platform_id.clone(),
                    total,
                    current: done,
                    current_item: work_item.rom.display_basename.clone(),
                });

                outcome
            }
        })
        .await;

    // Pull the side channel populated by `process_item` back out; the
    // scheduler's own report only tracks pass/fail/not-found bookkeeping.
    let merged_entries = Arc::try_unwrap(merged_entries).map(AsyncMutex::into_inner).unwrap_or_default();
    let change_reports = Arc::try_unwrap(change_reports).map(AsyncMutex::into_inner).unwrap_or_default();
    let not_found_names = Arc::try_unwrap(not_found_names).map(AsyncMutex::into_inner).unwrap_or_default();

    for (basename, entry) in &merged_entries {
        match catalog.lookup(basename) {
            Some(_) => counts.updated += 1,
            None => counts.full_scraped += 1,
        }
        provenance_index.entries.insert(basename.clone(), entry.provenance.clone());
    }
    counts.failed = report.failed.len() as u64;
    counts.not_found = report.not_found.len() as u64;

    // Assigned in scan order (the order `roms` was produced in, §4.11), not
    // `HashMap` iteration order, so a no-op rerun serializes byte-identical
    // output (§8). For each scanned ROM: a fresh/updated entry if one was
    // merged this run, else the unchanged entry if it was skipped, else
    // whatever was already cataloged if this run never touched it (failed,
    // not-found, or a platform filter that left it alone).
    let mut final_entries: Vec<CatalogEntry> = Vec::with_capacity(roms.len());
    for rom in &roms {
        if let Some(entry) = merged_entries.get(&rom.display_basename) {
            final_entries.push(entry.clone());
        } else if let Some(entry) = skipped_existing.get(&rom.display_basename) {
            final_entries.push(entry.clone());
        } else if let Some(entry) = existing_by_basename.get(&rom.display_basename) {
            final_entries.push(entry.clone());
        }
    }
    catalog.entries = final_entries;
    catalog.commit(&catalog_path)?;
    provenance_index.commit(&provenance_path)?;
    {
        let cache = response_cache.lock().await;
        cache.commit()?;
    }

    let throttle_stats = {
        let mut stats = HashMap::new();
        stats.insert(PROVIDER_ENDPOINT.to_string(), throttle_for_stats.stats(PROVIDER_ENDPOINT).await);
        stats
    };

    let mut top_errors: HashMap<String, u32> = HashMap::new();
    for item in &report.failed {
        if let Some(reason) = &item.last_error {
            *top_errors.entry(reason.clone()).or_insert(0) += 1;
        }
    }
    let mut top_errors: Vec<(String, u32)> = top_errors.into_iter().collect();
    top_errors.sort_by(|a, b| b.1.cmp(&a.1));
    top_errors.truncate(10);

    let summary = PlatformSummary {
        platform_id: platform.id.clone(),
        started_at,
        ended_at: Utc::now(),
        counts,
        throttle_stats,
        top_errors,
        change_reports,
        cleanup_moves,
        conflicts: conflicts.into_iter().map(|c| format!("{}: {}", c.basename, c.reason)).collect(),
        cancelled: scheduler.is_cancelled() && report.fatal_error.is_none(),
    };

    summary.write(&platform_catalog_dir)?;
    summary.write_not_found(&platform_catalog_dir, &not_found_names)?;

    if let Some(fatal) = &report.fatal_error {
        return Err(crate::error::AppError::Other(fatal.clone()));
    }

    Ok(summary)
}

/// Run C2 over every scanned entity, bounded by `max_workers` blocking
/// tasks at a time so a platform with thousands of ROMs doesn't spawn
/// thousands of OS threads at once.
async fn compute_identities(roms: &mut [RomEntity], config: &RunConfig) {
    let algorithm = config.runtime.hash_algorithm;
    let cap = config.runtime.hash_size_cap_bytes;
    let futures = roms.iter().map(|rom| {
        let path = rom.primary_file.clone();
        async move { tokio::task::spawn_blocking(move || compute_identity(&path, algorithm, cap)).await }
    });
    let results = join_all(futures).await;
    for (rom, result) in roms.iter_mut().zip(results) {
        match result {
            Ok(Ok(identity)) => {
                rom.size = identity.size;
                rom.content_hash = identity.content_hash;
            }
            Ok(Err(e)) => log::warn!("identity computation failed for {}: {e}", rom.display_basename),
            Err(e) => log::warn!("identity task panicked for {}: {e}", rom.display_basename),
        }
    }
}

/// Move media belonging to catalog entries no longer present on disk into
/// the CLEANUP tree, then drop those entries from `catalog` (§4.3.1, §6.4).
fn cleanup_orphans(
    catalog: &mut Catalog,
    found: &std::collections::HashSet<&str>,
    media_root: &Path,
    platform: &Platform,
) -> Vec<CleanupMove> {
    let mut moves = Vec::new();
    let mut kept = Vec::new();
    for entry in catalog.entries.drain(..) {
        if found.contains(entry.display_basename.as_str()) {
            kept.push(entry);
            continue;
        }
        for relative in entry.media_refs.values() {
            let from = media_root.join(&platform.id).join(relative.trim_start_matches("./"));
            if !from.exists() {
                continue;
            }
            let to = media_root.join("CLEANUP").join(&platform.id).join(relative.trim_start_matches("./"));
            if let Some(parent) = to.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if std::fs::rename(&from, &to).is_ok() {
                moves.push(CleanupMove { from, to });
            }
        }
    }
    catalog.entries = kept;
    moves
}

/// Prompt once per platform for each media type that used to be enabled but
/// no longer is, then relocate those files into the CLEANUP tree and strip
/// the refs from every entry that carries them (§4.3.1, §6.3).
async fn cleanup_disabled_media_types(
    catalog: &mut Catalog,
    enabled_types: &[String],
    media_root: &Path,
    platform: &Platform,
    prompts: &dyn Prompts,
) -> Vec<CleanupMove> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in &catalog.entries {
        for media_type in entry.media_refs.keys() {
            if !enabled_types.iter().any(|t| t == media_type) {
                *counts.entry(media_type.as_str()).or_insert(0) += 1;
            }
        }
    }
    // Sorted so prompt order doesn't depend on `HashMap` iteration, matching
    // the scan-order determinism the rest of a platform run keeps to.
    let mut disabled_types: Vec<&str> = counts.keys().copied().collect();
    disabled_types.sort_unstable();

    let mut moves = Vec::new();
    for media_type in disabled_types {
        let confirmed = prompts
            .confirm_media_cleanup(MediaCleanupRequest {
                platform_id: platform.id.clone(),
                media_type: media_type.to_string(),
                file_count: counts[media_type],
            })
            .await;
        if !confirmed {
            continue;
        }
        for entry in &mut catalog.entries {
            let Some(relative) = entry.media_refs.remove(media_type) else {
                continue;
            };
            let from = media_root.join(&platform.id).join(relative.trim_start_matches("./"));
            if !from.exists() {
                continue;
            }
            let to = media_root.join("CLEANUP").join(&platform.id).join(relative.trim_start_matches("./"));
            if let Some(parent) = to.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if std::fs::rename(&from, &to).is_ok() {
                moves.push(CleanupMove { from, to });
            }
        }
    }
    moves
}

#[allow(clippy::too_many_arguments)]
async fn process_item(
    work_item: &WorkItem,
    existing_entry: Option<CatalogEntry>,
    provider: &dyn Provider,
    prompts: &dyn Prompts,
    throttle: &Throttle,
    http: &reqwest::Client,
    response_cache: &AsyncMutex<ResponseCache>,
    merged_entries: &AsyncMutex<HashMap<String, CatalogEntry>>,
    change_reports: &AsyncMutex<Vec<ChangeReport>>,
    platform_code: &str,
    media_root: &Path,
    regions: &[String],
    languages: &[String],
    merge_policy: crate::config::MergePolicy,
    validation: crate::config::MediaValidation,
    min_image_side: u32,
    skip_existing_media: bool,
    search_threshold: f64,
    search_interactive: bool,
    enable_fallback: bool,
) -> ItemOutcome {
    let rom = &work_item.rom;
    let key = cache_key(rom.content_hash.as_deref(), &rom.display_basename, rom.size);

    let cached = {
        let cache = response_cache.lock().await;
        cache.get(&key).map(|c| GameRecord {
            provider_id: c.provider_id.clone(),
            names: crate::provider::response::RegionalText {
                by_region: HashMap::new(),
                first: c.name.clone(),
            },
            descriptions: crate::provider::response::RegionalText {
                by_region: HashMap::new(),
                first: c.description.clone(),
            },
            release_dates: crate::provider::response::RegionalText {
                by_region: HashMap::new(),
                first: c.release_date.clone(),
            },
            developer: c.developer.clone(),
            publisher: c.publisher.clone(),
            genres: c.genres.clone(),
            player_count: c.player_count,
            rating: c.rating,
            media: c.media.clone(),
            rom_size_bytes: None,
        })
    };

    let record = match cached {
        Some(record) => record,
        None => match fetch_record(
            work_item,
            provider,
            prompts,
            throttle,
            platform_code,
            search_threshold,
            search_interactive,
            enable_fallback,
        )
        .await
        {
            Ok(Some(record)) => {
                let mut cache = response_cache.lock().await;
                cache.put(&key, &record, regions);
                record
            }
            Ok(None) => return ItemOutcome::NotFound,
            Err(outcome) => return outcome,
        },
    };

    let media_types = work_item.action.media_types();
    let mut new_media_refs = HashMap::new();
    let mut media_hashes = HashMap::new();
    if !media_types.is_empty() {
        let chosen: Vec<&MediaAsset> =
            select_assets(&record.media, media_types, &rom.regions, regions, &rom.languages, languages);
        let fetches = chosen.iter().map(|asset| {
            fetch_asset(
                http,
                asset,
                &rom.display_basename,
                media_root,
                validation,
                min_image_side,
                skip_existing_media,
            )
        });
        let results = join_all(fetches).await;
        for (asset, result) in chosen.iter().zip(results) {
            match result {
                Ok(path) => {
                    new_media_refs.insert(asset.media_type.clone(), path.to_string_lossy().into_owned());
                    if let Some(hash) = &asset.hash {
                        media_hashes.insert(asset.media_type.clone(), hash.clone());
                    }
                }
                Err(e) if e.is_retryable() => return ItemOutcome::Retryable(e.to_string()),
                Err(e) => log::warn!("media fetch failed for {} ({}): {e}", rom.display_basename, asset.media_type),
            }
        }
    }

    let fresh_provider = ProviderOwnedFields {
        name: record.names.resolve(regions).map(String::from),
        description: record.descriptions.resolve(regions).map(String::from),
        release_date: record.release_dates.resolve(regions).map(String::from),
        developer: record.developer.clone(),
        publisher: record.publisher.clone(),
        genres: record.genres.clone(),
        player_count: record.player_count,
        rating: record.rating,
    };

    let provenance = Provenance {
        provider_record_id: Some(record.provider_id.clone()),
        identity_hash: rom.content_hash.clone(),
        media_hashes,
        timestamp: Some(Utc::now()),
    };

    let (entry, change_report) = merge(
        rom,
        existing_entry.as_ref(),
        &fresh_provider,
        &new_media_refs,
        provenance,
        merge_policy,
        true,
    );

    merged_entries.lock().await.insert(rom.display_basename.clone(), entry);
    change_reports.lock().await.push(change_report);

    ItemOutcome::Completed
}

/// Call the Provider (identity match, falling back to name search) and
/// classify the result against the scheduler's outcome vocabulary (§4.5,
/// §4.8, §7). Throttle acquisition and success/failure reporting happen
/// here, at the single call site that owns the endpoint's rate limit.
#[allow(clippy::too_many_arguments)]
async fn fetch_record(
    work_item: &WorkItem,
    provider: &dyn Provider,
    prompts: &dyn Prompts,
    throttle: &Throttle,
    platform_code: &str,
    search_threshold: f64,
    search_interactive: bool,
    enable_fallback: bool,
) -> Result<Option<GameRecord>, ItemOutcome> {
    let rom = &work_item.rom;

    let by_identity = if let Some(hash) = &rom.content_hash {
        throttle.acquire(PROVIDER_ENDPOINT).await;
        let result = provider.match_by_identity(platform_code, hash, rom.size).await;
        report_throttle(throttle, &result).await;
        Some(result)
    } else {
        None
    };

    match by_identity {
        Some(Ok(Some(record))) => return Ok(Some(record)),
        Some(Ok(None)) => {}
        Some(Err(ProviderError::NotFound)) => {}
        Some(Err(e)) => return Err(classify_provider_error(e)),
        None => {}
    }

    if !enable_fallback {
        return Ok(None);
    }

    throttle.acquire(PROVIDER_ENDPOINT).await;
    let search_result = provider.search_by_name(platform_code, &rom.display_basename).await;
    report_throttle(throttle, &search_result).await;
    let candidates = match search_result {
        Ok(candidates) => candidates,
        Err(ProviderError::NotFound) => return Ok(None),
        Err(e) => return Err(classify_provider_error(e)),
    };

    let ranked = rank_candidates(rom, &candidates);
    match resolve(ranked, search_threshold, search_interactive) {
        MatchResolution::Accepted(index) => Ok(candidates.into_iter().nth(index)),
        MatchResolution::NeedsPrompt(ranked) => {
            let reply = prompts
                .select_search_candidate(SearchPromptRequest {
                    rom_basename: rom.display_basename.clone(),
                    candidates: ranked,
                })
                .await;
            match reply {
                SearchPromptReply::Select(index) => Ok(candidates.into_iter().nth(index)),
                SearchPromptReply::Skip | SearchPromptReply::Cancel => Ok(None),
            }
        }
        MatchResolution::Unmatched => Ok(None),
    }
}

async fn report_throttle<T>(throttle: &Throttle, result: &Result<T, ProviderError>) {
    match result {
        Ok(_) => throttle.report_success(PROVIDER_ENDPOINT).await,
        Err(e) if e.is_retryable() => throttle.report_failure(PROVIDER_ENDPOINT, None).await,
        Err(_) => {}
    }
}

fn classify_provider_error(e: ProviderError) -> ItemOutcome {
    match e {
        ProviderError::Fatal(msg) => ItemOutcome::Fatal(msg),
        ProviderError::Retryable(msg) => ItemOutcome::Retryable(msg),
        ProviderError::Malformed(msg) => ItemOutcome::Retryable(msg),
        ProviderError::NotFound => ItemOutcome::NotFound,
    }
}
