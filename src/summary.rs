//! Summary artifact (C13, §6.5). A stable, grep-able text report written
//! per platform (and aggregated once per run), in the teacher's convention
//! of building up a plain `String` rather than reaching for a templating
//! crate — the same approach `metadata/mod.rs`'s `ScanProgress` messages
//! and `commands.rs`'s progress channel payloads take to user-facing text.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::merge::ChangeReport;
use crate::throttle::ThrottleStats;

/// One platform's outcome counts (§6.5).
#[derive(Debug, Clone, Default)]
pub struct Counts {
    pub scanned: u64,
    pub skipped: u64,
    pub full_scraped: u64,
    pub media_only: u64,
    pub updated: u64,
    pub failed: u64,
    pub not_found: u64,
}

/// A file moved into the CLEANUP tree (§4.3.1, §6.4).
#[derive(Debug, Clone)]
pub struct CleanupMove {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Everything the per-platform summary artifact reports (§6.5).
#[derive(Debug, Clone)]
pub struct PlatformSummary {
    pub platform_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub counts: Counts,
    pub throttle_stats: HashMap<String, ThrottleStats>,
    pub top_errors: Vec<(String, u32)>,
    pub change_reports: Vec<ChangeReport>,
    pub cleanup_moves: Vec<CleanupMove>,
    pub conflicts: Vec<String>,
    pub cancelled: bool,
}

impl PlatformSummary {
    /// Render the stable, grep-able text format (§6.5). Field order and
    /// the `key: value` shape are fixed across runs so `grep`/`awk` against
    /// historical summaries keeps working.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("platform: {}\n", self.platform_id));
        out.push_str(&format!("started_at: {}\n", self.started_at.to_rfc3339()));
        out.push_str(&format!("ended_at: {}\n", self.ended_at.to_rfc3339()));
        out.push_str(&format!("cancelled: {}\n", self.cancelled));
        out.push_str("counts:\n");
        out.push_str(&format!("  scanned: {}\n", self.counts.scanned));
        out.push_str(&format!("  skipped: {}\n", self.counts.skipped));
        out.push_str(&format!("  full_scraped: {}\n", self.counts.full_scraped));
        out.push_str(&format!("  media_only: {}\n", self.counts.media_only));
        out.push_str(&format!("  updated: {}\n", self.counts.updated));
        out.push_str(&format!("  failed: {}\n", self.counts.failed));
        out.push_str(&format!("  not_found: {}\n", self.counts.not_found));

        out.push_str("throttle:\n");
        let mut endpoints: Vec<&String> = self.throttle_stats.keys().collect();
        endpoints.sort();
        for endpoint in endpoints {
            let stats = &self.throttle_stats[endpoint];
            out.push_str(&format!(
                "  {endpoint}: wait={:.2}s events_429={} max_multiplier={}\n",
                stats.total_wait.as_secs_f64(),
                stats.rate_exceeded_events,
                stats.max_multiplier_reached
            ));
        }

        out.push_str("top_errors:\n");
        for (reason, count) in &self.top_errors {
            out.push_str(&format!("  {count}x {reason}\n"));
        }

        let changed_entries: Vec<&ChangeReport> = self.change_reports.iter().filter(|r| r.has_changes()).collect();
        out.push_str(&format!("change_report: {} entries changed\n", changed_entries.len()));
        for report in &changed_entries {
            let fields: Vec<String> = report
                .changes
                .iter()
                .filter(|c| !matches!(c, crate::merge::FieldChange::Unchanged { .. }))
                .map(field_change_label)
                .collect();
            out.push_str(&format!("  {}: {}\n", report.display_basename, fields.join(", ")));
        }

        out.push_str(&format!("cleanup_moves: {}\n", self.cleanup_moves.len()));
        for mv in &self.cleanup_moves {
            out.push_str(&format!("  {} -> {}\n", mv.from.display(), mv.to.display()));
        }

        if !self.conflicts.is_empty() {
            out.push_str("conflicts:\n");
            for conflict in &self.conflicts {
                out.push_str(&format!("  {conflict}\n"));
            }
        }

        out
    }

    /// Write this summary to `<catalog_root>/<platform>/curateur_summary_<date>_<time>.log`
    /// (§6.4). The filename embeds `ended_at` so repeated runs never collide.
    pub fn write(&self, platform_catalog_dir: &Path) -> AppResult<PathBuf> {
        std::fs::create_dir_all(platform_catalog_dir)?;
        let filename = format!(
            "curateur_summary_{}.log",
            self.ended_at.format("%Y-%m-%d_%H-%M-%S")
        );
        let path = platform_catalog_dir.join(filename);
        std::fs::write(&path, self.render())?;
        Ok(path)
    }

    /// Write the platform's not-found list, if any (§6.4:
    /// `<platform>_not_found.txt`, only created when non-empty).
    pub fn write_not_found(&self, platform_catalog_dir: &Path, basenames: &[String]) -> AppResult<Option<PathBuf>> {
        if basenames.is_empty() {
            return Ok(None);
        }
        std::fs::create_dir_all(platform_catalog_dir)?;
        let path = platform_catalog_dir.join(format!("{}_not_found.txt", self.platform_id));
        std::fs::write(&path, basenames.join("\n") + "\n")?;
        Ok(Some(path))
    }
}

fn field_change_label(change: &crate::merge::FieldChange) -> String {
    use crate::merge::FieldChange;
    match change {
        FieldChange::Added { field, .. } => format!("+{field}"),
        FieldChange::Modified { field, .. } => format!("~{field}"),
        FieldChange::Removed { field, .. } => format!("-{field}"),
        FieldChange::Unchanged { field } => field.clone(),
    }
}

/// Aggregate across every platform processed in one invocation, used only
/// to decide the process exit code (§6.6) — the per-platform artifacts
/// remain the durable record.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub platforms: Vec<PlatformSummary>,
    pub fatal_error: Option<String>,
    pub cancelled: bool,
}

impl RunSummary {
    /// Process exit code per §6.6: 1 if a fatal error poisoned the run, 2
    /// if cancelled (and not fatal), else 0 even with not-found/failed items.
    pub fn exit_code(&self) -> i32 {
        if self.fatal_error.is_some() {
            1
        } else if self.cancelled {
            2
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PlatformSummary {
        PlatformSummary {
            platform_id: "nes".into(),
            started_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc),
            ended_at: DateTime::parse_from_rfc3339("2026-01-01T00:05:00Z").unwrap().with_timezone(&Utc),
            counts: Counts {
                scanned: 10,
                skipped: 5,
                full_scraped: 3,
                media_only: 1,
                updated: 1,
                failed: 0,
                not_found: 0,
            },
            throttle_stats: HashMap::new(),
            top_errors: Vec::new(),
            change_reports: Vec::new(),
            cleanup_moves: Vec::new(),
            conflicts: Vec::new(),
            cancelled: false,
        }
    }

    #[test]
    fn render_includes_all_documented_sections() {
        let rendered = sample().render();
        assert!(rendered.contains("platform: nes"));
        assert!(rendered.contains("scanned: 10"));
        assert!(rendered.contains("change_report: 0 entries changed"));
        assert!(rendered.contains("cleanup_moves: 0"));
    }

    #[test]
    fn write_produces_a_file_under_the_platform_catalog_dir() {
        let dir = tempfile::tempdir().unwrap();
        let summary = sample();
        let path = summary.write(dir.path()).unwrap();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("curateur_summary_"));
    }

    #[test]
    fn not_found_file_is_only_written_when_nonempty() {
        let dir = tempfile::tempdir().unwrap();
        let summary = sample();
        assert!(summary.write_not_found(dir.path(), &[]).unwrap().is_none());
        let path = summary.write_not_found(dir.path(), &["Foo".into()]).unwrap().unwrap();
        assert!(path.ends_with("nes_not_found.txt"));
    }

    #[test]
    fn exit_code_reflects_fatal_then_cancelled_then_success() {
        let mut run = RunSummary::default();
        assert_eq!(run.exit_code(), 0);
        run.cancelled = true;
        assert_eq!(run.exit_code(), 2);
        run.fatal_error = Some("auth rejected".into());
        assert_eq!(run.exit_code(), 1);
    }
}
