//! Reconciliation engine: keep the store consistent with the remote feed.
//!
//! A cycle reads one remote snapshot and one store enumeration, computes the
//! minimal diff between them, and applies it as a single atomic batch. Cycles
//! run on a dedicated scheduler thread (the store's one writer), so two
//! cycles can never mutate the store concurrently; manual refresh requests
//! arriving while a cycle is in flight are coalesced into exactly one
//! follow-up cycle.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::feed::{FeedError, FeedReader, RemoteRecord};
use crate::store::{encode_description, DiffOp, Store, StoreError};

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one reconciliation cycle did.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleReport {
    pub remote_records: usize,
    pub puts: usize,
    pub deletes: usize,
}

/// Compute the minimal diff plan bringing `existing` in line with `remote`.
///
/// Diffed over full key sets in both directions: a remote record whose
/// encoded value already matches the stored value produces no op, a changed
/// or new record produces a put, and a stored key absent from the remote set
/// produces a delete. Deletes come first, then puts, each sorted by key, so
/// identical inputs always yield an identical plan.
pub fn compute_diff(existing: &HashMap<String, String>, remote: &[RemoteRecord]) -> Vec<DiffOp> {
    let remote_keys: HashSet<&str> = remote.iter().map(|r| r.name.as_str()).collect();

    let mut deletes: Vec<String> = existing
        .keys()
        .filter(|key| !remote_keys.contains(key.as_str()))
        .cloned()
        .collect();
    deletes.sort_unstable();

    let mut puts: Vec<(String, String)> = remote
        .iter()
        .filter_map(|record| {
            let value = encode_description(record.description.as_deref());
            match existing.get(&record.name) {
                Some(current) if *current == value => None,
                _ => Some((record.name.clone(), value)),
            }
        })
        .collect();
    puts.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    deletes
        .into_iter()
        .map(DiffOp::Delete)
        .chain(puts.into_iter().map(|(k, v)| DiffOp::Put(k, v)))
        .collect()
}

/// Run one fetch-diff-apply cycle.
///
/// A feed or store failure aborts the cycle before any mutation; the store is
/// only touched by the final atomic batch, so a failed cycle leaves it
/// exactly as it was and the next cycle retries from scratch.
pub fn run_cycle(store: &Store, feed: &FeedReader) -> Result<CycleReport, RefreshError> {
    let remote = feed.fetch_records()?;
    let existing: HashMap<String, String> = store.all_entries()?.into_iter().collect();

    let plan = compute_diff(&existing, &remote);
    let puts = plan
        .iter()
        .filter(|op| matches!(op, DiffOp::Put(..)))
        .count();
    let report = CycleReport {
        remote_records: remote.len(),
        puts,
        deletes: plan.len() - puts,
    };

    if plan.is_empty() {
        tracing::info!(remote = remote.len(), "Refresh cycle: store already current");
        return Ok(report);
    }

    store.apply_batch(&plan)?;
    tracing::info!(
        remote = report.remote_records,
        puts = report.puts,
        deletes = report.deletes,
        "Refresh cycle applied"
    );
    Ok(report)
}

enum Msg {
    Refresh,
    Shutdown,
}

/// Handle to the background refresh scheduler.
///
/// Owns the scheduler thread; dropping the handle (or calling [`shutdown`])
/// stops the loop. The thread is the only writer the store ever sees.
///
/// [`shutdown`]: Refresher::shutdown
pub struct Refresher {
    tx: mpsc::Sender<Msg>,
    handle: Option<JoinHandle<()>>,
    cycles: Arc<AtomicU64>,
}

impl Refresher {
    /// Spawn the scheduler.
    ///
    /// With `refresh_on_start`, one cycle runs immediately; queries issued
    /// before it completes may see an empty or partial index. Each cycle,
    /// successful or not, re-arms the timer: a bad cycle logs and the next
    /// interval retries from scratch.
    pub fn spawn(
        store: Arc<Store>,
        feed: FeedReader,
        interval: Duration,
        refresh_on_start: bool,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let cycles = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&cycles);

        let handle = std::thread::spawn(move || {
            scheduler_loop(rx, store, feed, interval, refresh_on_start, counter);
        });

        Self {
            tx,
            handle: Some(handle),
            cycles,
        }
    }

    /// Request an immediate refresh.
    ///
    /// If a cycle is already in flight the request is queued; any number of
    /// requests arriving during one cycle coalesce into a single follow-up
    /// cycle. Returns without waiting for the cycle to finish.
    pub fn refresh_now(&self) {
        // A closed channel means the scheduler already stopped
        let _ = self.tx.send(Msg::Refresh);
    }

    /// Number of cycles completed so far (successful or failed).
    pub fn cycles_run(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Stop the scheduler and wait for the thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.tx.send(Msg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn scheduler_loop(
    rx: mpsc::Receiver<Msg>,
    store: Arc<Store>,
    feed: FeedReader,
    interval: Duration,
    refresh_on_start: bool,
    cycles: Arc<AtomicU64>,
) {
    let run = |cycles: &AtomicU64| {
        if let Err(e) = run_cycle(&store, &feed) {
            tracing::warn!(error = %e, "Refresh cycle failed; will retry next interval");
        }
        cycles.fetch_add(1, Ordering::SeqCst);
    };

    let mut next_deadline = Instant::now() + interval;
    if refresh_on_start {
        run(&cycles);
        match drain_requests(&rx) {
            Drained::Shutdown => {
                tracing::debug!("Refresh scheduler stopped");
                return;
            }
            Drained::Refresh => run(&cycles),
            Drained::Empty => {}
        }
        next_deadline = Instant::now() + interval;
    }

    loop {
        let timeout = next_deadline.saturating_duration_since(Instant::now());
        let msg = rx.recv_timeout(timeout);
        match msg {
            Ok(Msg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Msg::Refresh) | Err(RecvTimeoutError::Timeout) => {
                run(&cycles);
                // Requests that piled up while the cycle ran collapse into
                // one follow-up cycle, never a concurrent one. A shutdown
                // that arrived mid-cycle must still stop the loop.
                match drain_requests(&rx) {
                    Drained::Shutdown => break,
                    Drained::Refresh => run(&cycles),
                    Drained::Empty => {}
                }
                next_deadline = Instant::now() + interval;
            }
        }
    }
    tracing::debug!("Refresh scheduler stopped");
}

/// What draining the queue found.
enum Drained {
    /// At least one refresh request was pending (and no shutdown)
    Refresh,
    /// A shutdown was queued, or the channel disconnected; stop the loop
    Shutdown,
    Empty,
}

/// Drain every queued message. A queued shutdown wins over queued refreshes
/// and must be reported to the caller, not swallowed: it may be the only one
/// ever sent.
fn drain_requests(rx: &mpsc::Receiver<Msg>) -> Drained {
    let mut pending = false;
    loop {
        match rx.try_recv() {
            Ok(Msg::Refresh) => pending = true,
            Ok(Msg::Shutdown) | Err(TryRecvError::Disconnected) => return Drained::Shutdown,
            Err(TryRecvError::Empty) => {
                return if pending {
                    Drained::Refresh
                } else {
                    Drained::Empty
                }
            }
        }
    }
}
