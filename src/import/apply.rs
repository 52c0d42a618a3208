//! Apply coordinator
//!
//! Second phase of a batch: once every container has been wrapped and
//! materialized, a worker pool pops nodes off the pending queue and finalizes
//! them. The queue lock is held only to pop; finalizing runs outside it.
//! Progress is counted and emitted under one small lock so the host always
//! sees `applied` increase by one per event, ending at the final count.

use crate::bridge::ImportBridge;
use crate::error::{panic_message, ApplyOutcome, BridgeError, WorkerError};
use crate::events::{EventHub, ImportEvent};
use crate::import::queue::LoadMode;
use crate::tree::{NodeHandle, NodeId};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, error, info, warn};

/// A materialized node waiting for finalize
pub struct PendingApply<G> {
    pub node: NodeHandle<G>,
    pub mode: LoadMode,
}

struct Pending<G> {
    order: VecDeque<PendingApply<G>>,
    queued: HashSet<NodeId>,
}

/// FIFO of nodes awaiting finalize, holding each node at most once
pub struct ApplyQueue<G> {
    nodes: Mutex<Pending<G>>,
}

impl<G> ApplyQueue<G> {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(Pending {
                order: VecDeque::new(),
                queued: HashSet::new(),
            }),
        }
    }

    /// Queue a node; returns false if it was already pending.
    ///
    /// A node already pending keeps its place. Its latest staged geometry is
    /// what gets finalized, and a reload marks the entry as a reload.
    pub fn push(&self, pending: PendingApply<G>) -> bool {
        let mut nodes = self.nodes.lock();
        if nodes.queued.insert(pending.node.id()) {
            nodes.order.push_back(pending);
            return true;
        }

        if pending.mode == LoadMode::Reload {
            if let Some(entry) = nodes
                .order
                .iter_mut()
                .find(|entry| entry.node.id() == pending.node.id())
            {
                entry.mode = LoadMode::Reload;
            }
        }
        false
    }

    pub fn pop_front(&self) -> Option<PendingApply<G>> {
        let mut nodes = self.nodes.lock();
        let pending = nodes.order.pop_front()?;
        nodes.queued.remove(&pending.node.id());
        Some(pending)
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().order.is_empty()
    }
}

impl<G> Default for ApplyQueue<G> {
    fn default() -> Self {
        Self::new()
    }
}

/// Totals for one apply phase
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    /// Nodes queued when the phase started
    pub total: usize,

    /// Nodes whose new geometry was published
    pub applied: usize,

    /// Nodes whose finalize failed
    pub failed: usize,

    /// Nodes skipped because another caller was finalizing them
    pub busy: usize,

    /// Nodes with nothing staged
    pub empty: usize,

    /// Reloaded nodes that completed
    pub reloaded: usize,

    /// Whether cancellation left nodes in the queue
    pub cancelled: bool,
}

/// Fans a worker pool out over the pending queue
pub struct ApplyCoordinator<'a, B: ImportBridge> {
    bridge: &'a B,
    worker_count: usize,
    cancel: &'a AtomicBool,
    events: &'a EventHub<B::Geometry>,
}

impl<'a, B: ImportBridge> ApplyCoordinator<'a, B> {
    pub fn new(
        bridge: &'a B,
        worker_count: usize,
        cancel: &'a AtomicBool,
        events: &'a EventHub<B::Geometry>,
    ) -> Self {
        Self {
            bridge,
            worker_count: worker_count.max(1),
            cancel,
            events,
        }
    }

    /// Finalize every node in `queue`, returning once the pool has drained it
    pub fn apply_all(&self, queue: &ApplyQueue<B::Geometry>) -> ApplyStats {
        let total = queue.len();
        if total == 0 {
            return ApplyStats::default();
        }

        info!(nodes = total, workers = self.worker_count, "Applying nodes");
        self.events.emit(ImportEvent::ApplyStarted { total });

        let tally = Mutex::new(ApplyStats {
            total,
            ..ApplyStats::default()
        });
        let workers = self.worker_count.min(total);

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);

            for id in 0..workers {
                let tally = &tally;
                let spawned = thread::Builder::new()
                    .name(format!("apply-{}", id))
                    .spawn_scoped(scope, move || self.apply_loop(id, queue, tally));

                match spawned {
                    Ok(handle) => handles.push((id, handle)),
                    Err(e) => {
                        let err = WorkerError::SpawnFailed {
                            id,
                            reason: e.to_string(),
                        };
                        warn!(error = %err, "Continuing with fewer apply workers");
                    }
                }
            }

            if handles.is_empty() {
                // Nothing could be spawned; apply on the control thread
                self.apply_loop(0, queue, &tally);
            }

            for (id, handle) in handles {
                if let Err(payload) = handle.join() {
                    let err = WorkerError::Panicked {
                        id,
                        message: panic_message(payload.as_ref()),
                    };
                    error!(error = %err, "Apply worker died");
                }
            }
        });

        let mut stats = tally.into_inner();
        stats.cancelled = !queue.is_empty();
        stats
    }

    fn apply_loop(&self, id: usize, queue: &ApplyQueue<B::Geometry>, tally: &Mutex<ApplyStats>) {
        let mut handled = 0usize;

        while !self.cancel.load(Ordering::Relaxed) {
            let Some(pending) = queue.pop_front() else {
                break;
            };

            let bridge = self.bridge;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                pending
                    .node
                    .apply_with(|name, staged| bridge.finalize(name, staged))
            }))
            .unwrap_or_else(|payload| {
                ApplyOutcome::Failed(BridgeError::Other(format!(
                    "finalize panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

            self.record(&pending, outcome, tally);
            handled += 1;
        }

        debug!(worker = id, nodes = handled, "Apply worker finished");
    }

    fn record(
        &self,
        pending: &PendingApply<B::Geometry>,
        outcome: ApplyOutcome,
        tally: &Mutex<ApplyStats>,
    ) {
        let mut stats = tally.lock();
        match outcome {
            ApplyOutcome::Applied => {
                stats.applied += 1;
                self.events.emit(ImportEvent::ApplyProgress {
                    applied: stats.applied,
                    total: stats.total,
                });
                if pending.mode == LoadMode::Reload {
                    stats.reloaded += 1;
                    self.events
                        .emit(ImportEvent::NodeReloadCompleted(pending.node.clone()));
                }
            }
            ApplyOutcome::Failed(err) => {
                stats.failed += 1;
                warn!(node = %pending.node.name(), error = %err, "Finalize failed");
                self.events.emit(ImportEvent::FinalizeFailed {
                    node: pending.node.clone(),
                    reason: err.to_string(),
                });
            }
            ApplyOutcome::Busy => {
                stats.busy += 1;
                debug!(node = %pending.node.name(), "Node already being applied");
            }
            ApplyOutcome::Empty => {
                stats.empty += 1;
                debug!(node = %pending.node.name(), "Nothing staged to apply");
            }
        }
    }
}
