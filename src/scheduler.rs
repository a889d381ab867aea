//! Scheduler / Work Queue (C12, §4.12). A single shared priority queue
//! draining into a bounded worker pool, generalized from the teacher's
//! sequential `for rom in &roms { ... }` enrichment loop (`metadata/mod.rs
//! ::enrich_roms`) into a proper concurrent dispatcher: same cancellation
//! idiom (`tokio_util::sync::CancellationToken`, checked before every
//! suspension point), same progress-callback shape, but with `max_workers`
//! items in flight instead of one at a time.
//!
//! Each worker here is a "lookup worker" in §4.12's terms: it drives one
//! ROM's match/search/merge pipeline. The per-asset "download workers" are
//! the nested `futures_util::future::join_all` fan-out inside that single
//! pipeline call (C9's "parallel per asset"), not a second queue — one
//! shared queue, one pool, per §4.12's literal text.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::models::{Priority, WorkItem};

/// What a handler reports back about one dispatched [`WorkItem`] (§4.12, §7).
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    /// Pipeline ran to completion (merge staged, media written as applicable).
    Completed,
    /// A retryable failure occurred (throttle/network/malformed-bounded).
    /// Re-enqueued at HIGH priority with `retry_count` incremented, unless
    /// that would exceed `max_retries`.
    Retryable(String),
    /// Provider has no record; never retried (§4.12, §8).
    NotFound,
    /// Unrecoverable; poisons the scheduler's cancel token for every worker.
    Fatal(String),
}

/// Heap entry ordered by `(priority, insertion order)` so the queue drains
/// higher priority first and is FIFO within a priority band (§4.12).
struct QueuedItem {
    seq: u64,
    item: WorkItem,
}

impl PartialEq for QueuedItem {
    fn eq(&self, other: &Self) -> bool {
        self.item.priority == other.item.priority && self.seq == other.seq
    }
}
impl Eq for QueuedItem {}

impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority must compare greater;
        // within equal priority, the *earlier* (smaller) seq must compare
        // greater so it pops first (FIFO within a priority band).
        self.item
            .priority
            .cmp(&other.item.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    heap: BinaryHeap<QueuedItem>,
    in_flight: usize,
    failed: Vec<WorkItem>,
    not_found: Vec<WorkItem>,
    fatal_error: Option<String>,
}

/// Final tallies after a scheduler run drains (§4.12, §6.5).
#[derive(Debug, Default)]
pub struct SchedulerReport {
    pub completed: u64,
    pub failed: Vec<WorkItem>,
    pub not_found: Vec<WorkItem>,
    pub fatal_error: Option<String>,
}

/// Owns the pool of workers and the shared priority queue (§4.12, §5).
pub struct Scheduler {
    inner: Mutex<Inner>,
    notify: Notify,
    seq: AtomicU64,
    max_retries: u32,
    cancel: CancellationToken,
    completed: std::sync::atomic::AtomicU64,
}

impl Scheduler {
    pub fn new(max_retries: u32, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                in_flight: 0,
                failed: Vec::new(),
                not_found: Vec::new(),
                fatal_error: None,
            }),
            notify: Notify::new(),
            seq: AtomicU64::new(0),
            max_retries,
            cancel,
            completed: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Total enqueue order is a strict counter: every `enqueue` call
    /// (fresh or retry) gets the next sequence number, so retries raised to
    /// HIGH still drain FIFO relative to each other (§4.12).
    pub async fn enqueue(&self, item: WorkItem) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::SeqCst);
        let mut inner = self.inner.lock().await;
        inner.heap.push(QueuedItem { seq, item });
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Blocks until an item is available or the queue is provably drained
    /// (empty heap and nothing in flight). A suspension point (§5): holds
    /// no lock across the wait.
    async fn dequeue(&self) -> Option<WorkItem> {
        loop {
            // Register for the next notification before re-checking the
            // queue under the lock, so a `finish()` that calls
            // `notify_waiters()` between our `drop(inner)` and the await
            // below can't be missed (`Notify` stores no permit).
            let notified = self.notify.notified();
            let mut inner = self.inner.lock().await;
            if let Some(q) = inner.heap.pop() {
                inner.in_flight += 1;
                return Some(q.item);
            }
            if inner.in_flight == 0 {
                return None;
            }
            drop(inner);
            notified.await;
        }
    }

    async fn finish(&self, mut item: WorkItem, outcome: ItemOutcome) {
        let mut inner = self.inner.lock().await;
        inner.in_flight -= 1;
        match outcome {
            ItemOutcome::Completed => {
                self.completed.fetch_add(1, AtomicOrdering::Relaxed);
            }
            ItemOutcome::NotFound => {
                inner.not_found.push(item);
            }
            ItemOutcome::Fatal(msg) => {
                inner.fatal_error.get_or_insert(msg);
                drop(inner);
                self.cancel.cancel();
                self.notify.notify_waiters();
                return;
            }
            ItemOutcome::Retryable(msg) => {
                item.last_error = Some(msg);
                if item.retry_count >= self.max_retries {
                    inner.failed.push(item);
                } else {
                    item.retry_count += 1;
                    item.priority = Priority::High;
                    let seq = self.seq.fetch_add(1, AtomicOrdering::SeqCst);
                    inner.heap.push(QueuedItem { seq, item });
                }
            }
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Drain the queue with `workers` concurrent tasks, each calling
    /// `handler` for one dispatched item at a time (§4.12, §5: a worker
    /// blocks on at most one resource — here, the handler's own suspension
    /// points — and never holds the queue lock across it).
    pub async fn run<F, Fut>(self: &Arc<Self>, workers: usize, handler: F) -> SchedulerReport
    where
        F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ItemOutcome> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let mut handles = Vec::with_capacity(workers.max(1));
        for _ in 0..workers.max(1) {
            let this = Arc::clone(self);
            let handler = Arc::clone(&handler);
            handles.push(tokio::spawn(async move { this.worker_loop(handler).await }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        self.report().await
    }

    async fn worker_loop<F, Fut>(self: Arc<Self>, handler: Arc<F>)
    where
        F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ItemOutcome> + Send + 'static,
    {
        loop {
            if self.cancel.is_cancelled() {
                // Drain what's left into the failed/pending accounting
                // without dispatching new work (§5 cancellation semantics).
                let mut inner = self.inner.lock().await;
                while let Some(q) = inner.heap.pop() {
                    inner.failed.push(q.item);
                }
                break;
            }
            let Some(item) = self.dequeue().await else {
                break;
            };
            // The item is already dispatched at this point; per §5, an
            // in-flight call is allowed to finish even if cancel flips mid-flight.
            let outcome = handler(item.clone()).await;
            self.finish(item, outcome).await;
        }
    }

    async fn report(&self) -> SchedulerReport {
        let inner = self.inner.lock().await;
        SchedulerReport {
            completed: self.completed.load(AtomicOrdering::Relaxed),
            failed: inner.failed.clone(),
            not_found: inner.not_found.clone(),
            fatal_error: inner.fatal_error.clone(),
        }
    }

    /// Whether the scheduler has been poisoned by a fatal error (§7).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Action;
    use crate::models::RomKind;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    fn item(basename: &str, priority: Priority) -> WorkItem {
        WorkItem {
            rom: crate::models::RomEntity {
                kind: RomKind::Single,
                display_basename: basename.into(),
                primary_file: PathBuf::from(basename),
                catalog_path: PathBuf::from(basename),
                regions: Vec::new(),
                languages: Vec::new(),
                size: 0,
                content_hash: None,
                auxiliary_files: Vec::new(),
            },
            action: Action::FullScrape { media_types: vec![] },
            priority,
            retry_count: 0,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn drains_all_items_and_reports_completion() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(3, cancel);
        for i in 0..5 {
            scheduler.enqueue(item(&format!("g{i}"), Priority::Normal)).await;
        }

        let report = scheduler.run(2, |_item| async move { ItemOutcome::Completed }).await;
        assert_eq!(report.completed, 5);
        assert!(report.failed.is_empty());
        assert!(report.not_found.is_empty());
    }

    #[tokio::test]
    async fn retryable_failure_reappears_at_high_priority_until_max_retries() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(2, cancel);
        scheduler.enqueue(item("flaky", Priority::Normal)).await;

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts2 = Arc::clone(&attempts);
        let report = scheduler
            .run(1, move |_item| {
                let attempts = Arc::clone(&attempts2);
                async move {
                    attempts.fetch_add(1, AtomicOrdering::SeqCst);
                    ItemOutcome::Retryable("boom".into())
                }
            })
            .await;

        // initial attempt + 2 retries = 3 total attempts before landing on failed.
        assert_eq!(attempts.load(AtomicOrdering::SeqCst), 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].retry_count, 2);
        assert_eq!(report.failed[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn not_found_is_recorded_once_and_never_retried() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(5, cancel);
        scheduler.enqueue(item("missing", Priority::Normal)).await;

        let report = scheduler.run(1, |_item| async move { ItemOutcome::NotFound }).await;
        assert_eq!(report.not_found.len(), 1);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn fatal_error_cancels_remaining_queue() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(5, cancel.clone());
        scheduler.enqueue(item("a", Priority::Normal)).await;
        scheduler.enqueue(item("b", Priority::Normal)).await;

        let report = scheduler
            .run(1, |wi| async move {
                if wi.rom.display_basename == "a" {
                    ItemOutcome::Fatal("credentials rejected".into())
                } else {
                    ItemOutcome::Completed
                }
            })
            .await;

        assert!(report.fatal_error.is_some());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn high_priority_drains_before_normal() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(2, cancel);
        scheduler.enqueue(item("low-pri", Priority::Normal)).await;
        scheduler.enqueue(item("high-pri", Priority::High)).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let order2 = Arc::clone(&order);
        scheduler
            .run(1, move |wi| {
                let order = Arc::clone(&order2);
                async move {
                    order.lock().await.push(wi.rom.display_basename.clone());
                    ItemOutcome::Completed
                }
            })
            .await;

        let seen = order.lock().await.clone();
        assert_eq!(seen, vec!["high-pri".to_string(), "low-pri".to_string()]);
    }
}
