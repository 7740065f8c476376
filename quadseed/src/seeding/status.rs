//! Seeding progress reporting.
//!
//! - `SeedingStatus` - Shared state of one partial, updated as it walks
//! - `SeedingEvent` - Progress messages streamed to observers
//! - `SeedingHandle` - Handle to query status, cancel, and wait for a run

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::coord::TileAddress;

/// Warnings kept on a status snapshot.
const MAX_MESSAGES: usize = 100;

/// Events buffered for observers. Further events are dropped until the
/// receiver drains; the shared status stays authoritative.
pub const EVENT_BUFFER: usize = 1024;

/// Lifecycle of one seeding partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkerState {
    Idle,
    Purging,
    Walking,
    Done,
    Cancelled,
}

impl WalkerState {
    pub fn is_finished(&self) -> bool {
        matches!(self, WalkerState::Done | WalkerState::Cancelled)
    }
}

impl fmt::Display for WalkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WalkerState::Idle => "idle",
            WalkerState::Purging => "purging",
            WalkerState::Walking => "walking",
            WalkerState::Done => "done",
            WalkerState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Authoritative progress of one seeding partial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedingStatus {
    pub dataset: String,
    pub partition: u32,
    pub state: WalkerState,
    /// Subtrees in the full tree of every collection
    pub total: u64,
    /// Subtrees popped from the queue
    pub processed: u64,
    /// Subtrees computed from the data source
    pub computed: u64,
    /// Subtrees loaded from the cache
    pub cache_hits: u64,
    /// Subtrees not visited: unavailable, owned by another partial, or below a failure
    pub skipped: u64,
    /// Subtrees whose computation failed
    pub failed: u64,
    /// Content cells materialized
    pub content_written: u64,
    /// Content cells already cached
    pub content_existing: u64,
    /// Content cells whose materialization failed
    pub content_failed: u64,
    /// Fatal error that ended the partial
    pub error: Option<String>,
    /// Most recent warnings
    pub messages: Vec<String>,
}

impl SeedingStatus {
    pub(crate) fn new(dataset: String, partition: u32) -> Self {
        Self {
            dataset,
            partition,
            state: WalkerState::Idle,
            total: 0,
            processed: 0,
            computed: 0,
            cache_hits: 0,
            skipped: 0,
            failed: 0,
            content_written: 0,
            content_existing: 0,
            content_failed: 0,
            error: None,
            messages: Vec::new(),
        }
    }

    /// Progress as a fraction from 0.0 to 1.0.
    ///
    /// Pruned branches count as done so the fraction stays meaningful.
    pub fn progress_fraction(&self) -> f64 {
        if self.total == 0 {
            return if self.state.is_finished() { 1.0 } else { 0.0 };
        }
        ((self.processed + self.skipped) as f64 / self.total as f64).min(1.0)
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_finished()
    }

    pub(crate) fn push_message(&mut self, message: String) {
        if self.messages.len() == MAX_MESSAGES {
            self.messages.remove(0);
        }
        self.messages.push(message);
    }
}

/// Progress message emitted while seeding.
#[derive(Debug, Clone)]
pub enum SeedingEvent {
    StateChanged {
        partition: u32,
        state: WalkerState,
    },
    SubtreeCompleted {
        partition: u32,
        address: TileAddress,
        from_cache: bool,
    },
    Warning {
        partition: u32,
        message: String,
    },
    Finished(SeedingStatus),
}

/// Handle to a running seeding run.
///
/// Holds one status per partial started by this process.
pub struct SeedingHandle {
    statuses: Vec<Arc<Mutex<SeedingStatus>>>,
    cancellation: CancellationToken,
    events: Option<mpsc::Receiver<SeedingEvent>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SeedingHandle {
    pub(crate) fn new(
        statuses: Vec<Arc<Mutex<SeedingStatus>>>,
        cancellation: CancellationToken,
        events: mpsc::Receiver<SeedingEvent>,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            statuses,
            cancellation,
            events: Some(events),
            tasks,
        }
    }

    /// Snapshot of every partial's status.
    pub fn status(&self) -> Vec<SeedingStatus> {
        self.statuses.iter().map(|s| s.lock().clone()).collect()
    }

    /// Combined progress over all partials of this run.
    pub fn progress_fraction(&self) -> f64 {
        let statuses = self.status();
        if statuses.is_empty() {
            return 1.0;
        }
        statuses.iter().map(SeedingStatus::progress_fraction).sum::<f64>() / statuses.len() as f64
    }

    pub fn is_complete(&self) -> bool {
        self.statuses.iter().all(|s| s.lock().is_complete())
    }

    /// Request cooperative cancellation of every partial.
    pub fn cancel(&self) {
        info!("Seeding cancellation requested");
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Take the event stream. Returns `None` after the first call.
    ///
    /// The stream holds at most [`EVENT_BUFFER`] undelivered events.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SeedingEvent>> {
        self.events.take()
    }

    /// Wait for every partial to finish and return their final status.
    pub async fn wait(self) -> Vec<SeedingStatus> {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Seeding task ended abnormally");
            }
        }
        self.statuses.iter().map(|s| s.lock().clone()).collect()
    }
}
