//! Import driver
//!
//! Top-level state machine for a batch:
//!
//! ```text
//!   Idle ──run()──▶ Draining ──queue empty──▶ Finalizing ──pool done──▶ Idle
//!                      │                                                ▲
//!                      └──────────────── cancelled ─────────────────────┘
//! ```
//!
//! Draining takes one work item at a time, wraps it on the worker pool and
//! materializes it before touching the next, so containers land in the tree
//! in submission order. Finalizing only starts once the queue is empty.
//! Rendering is suspended for the whole span and resumed when the driver
//! returns to Idle, however the run ended.

use crate::bridge::ImportBridge;
use crate::config::ImportConfig;
use crate::error::Result;
use crate::events::{EventHub, ImportEvent};
use crate::import::apply::{ApplyCoordinator, ApplyQueue};
use crate::import::materialize::Materializer;
use crate::import::queue::{LoadMode, WorkItem, WorkQueue};
use crate::import::wrap::WrapCoordinator;
use crate::tree::FilterTree;
use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where the driver is in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Draining,
    Finalizing,
}

/// Result of one `run()`
#[derive(Debug, Clone)]
pub struct ImportSummary {
    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Work items taken off the queue
    pub containers: usize,

    /// Work items that could not be unwrapped
    pub failed_containers: usize,

    /// Nodes created in import mode
    pub created: usize,

    /// Nodes rebound in reload mode
    pub rebound: usize,

    /// Sub-units that held nothing renderable
    pub skipped: usize,

    /// Reload records with no matching node
    pub reload_dropped: usize,

    /// Nodes finalized
    pub applied: usize,

    /// Nodes whose finalize failed
    pub finalize_failed: usize,

    /// Reloaded nodes whose new geometry was published
    pub reloaded: usize,

    /// Queued nodes left unapplied because they were busy or had nothing staged
    pub unapplied: usize,

    /// Wall time of the run
    pub duration: Duration,

    /// False if the run was cancelled
    pub completed: bool,
}

impl ImportSummary {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            containers: 0,
            failed_containers: 0,
            created: 0,
            rebound: 0,
            skipped: 0,
            reload_dropped: 0,
            applied: 0,
            finalize_failed: 0,
            reloaded: 0,
            unapplied: 0,
            duration: Duration::ZERO,
            completed: false,
        }
    }

    /// Nodes that produced a `NodeMaterialized` event
    pub fn materialized(&self) -> usize {
        self.created + self.rebound
    }
}

/// Sequences the wrap, materialize and apply phases over a work queue
pub struct ImportDriver<B: ImportBridge> {
    bridge: B,
    config: ImportConfig,
    queue: WorkQueue<B::Container>,
    pending: ApplyQueue<B::Geometry>,
    tree: Arc<FilterTree<B::Geometry>>,
    events: EventHub<B::Geometry>,
    state: Mutex<DriverState>,
    running: AtomicBool,
    cancel: Arc<AtomicBool>,
}

/// Returns the driver to Idle when a run ends, including by panic
struct RunGuard<'a, B: ImportBridge> {
    driver: &'a ImportDriver<B>,
}

impl<B: ImportBridge> Drop for RunGuard<'_, B> {
    fn drop(&mut self) {
        *self.driver.state.lock() = DriverState::Idle;
        self.driver.cancel.store(false, Ordering::Relaxed);
        self.driver
            .events
            .emit(ImportEvent::RenderSuspendRequested(false));
        self.driver.running.store(false, Ordering::Release);
    }
}

impl<B: ImportBridge> ImportDriver<B> {
    /// Create a driver over a fresh, empty tree
    pub fn new(bridge: B, config: ImportConfig) -> Self {
        Self::with_tree(bridge, config, Arc::new(FilterTree::new()))
    }

    /// Create a driver that imports into an existing tree
    pub fn with_tree(
        bridge: B,
        config: ImportConfig,
        tree: Arc<FilterTree<B::Geometry>>,
    ) -> Self {
        Self {
            bridge,
            config,
            queue: WorkQueue::new(),
            pending: ApplyQueue::new(),
            tree,
            events: EventHub::new(),
            state: Mutex::new(DriverState::Idle),
            running: AtomicBool::new(false),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a container; may be called any number of times before `run()`
    pub fn enqueue(
        &self,
        source_id: impl Into<Arc<str>>,
        container: B::Container,
        mode: LoadMode,
    ) {
        let item = WorkItem::new(source_id, container, mode);
        debug!(source = %item.source_id, mode = ?item.mode, "Work item queued");
        self.queue.push(item);
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> Receiver<ImportEvent<B::Geometry>> {
        self.events.subscribe()
    }

    pub fn tree(&self) -> &Arc<FilterTree<B::Geometry>> {
        &self.tree
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn state(&self) -> DriverState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Work items not yet taken by a run
    pub fn pending_items(&self) -> usize {
        self.queue.len()
    }

    /// Materialized nodes not yet finalized
    pub fn pending_apply(&self) -> usize {
        self.pending.len()
    }

    /// Get a clone of the cancellation flag (for signal handlers)
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Ask the current run to stop as soon as possible.
    ///
    /// A request made while idle applies to the next run. The flag is cleared
    /// whenever a run ends.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Drain the queue and finalize everything it produced.
    ///
    /// Returns `None` without doing anything if a run is already in progress
    /// or there is no work. Per-container and per-node failures are reported
    /// as events and never end the run early.
    pub fn run(&self) -> Option<ImportSummary> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Import already running");
            return None;
        }

        if self.queue.is_empty() && self.pending.is_empty() {
            self.running.store(false, Ordering::Release);
            return None;
        }

        let _guard = RunGuard { driver: self };

        let start = Instant::now();
        let mut summary = ImportSummary::new();
        let workers = self.config.worker_count;

        info!(
            containers = self.queue.len(),
            workers = workers,
            subscribers = self.events.subscriber_count(),
            "Starting import"
        );

        self.events.emit(ImportEvent::RenderSuspendRequested(true));
        *self.state.lock() = DriverState::Draining;
        self.drain(workers, &mut summary);

        if !self.is_cancelled() {
            *self.state.lock() = DriverState::Finalizing;
            let stats = ApplyCoordinator::new(&self.bridge, workers, &self.cancel, &self.events)
                .apply_all(&self.pending);
            summary.applied = stats.applied;
            summary.finalize_failed = stats.failed;
            summary.reloaded = stats.reloaded;
            summary.unapplied = stats.busy + stats.empty;
            if summary.unapplied > 0 {
                warn!(
                    busy = stats.busy,
                    empty = stats.empty,
                    "Some queued nodes were not applied"
                );
            }
        }

        summary.completed = !self.is_cancelled();
        summary.duration = start.elapsed();

        if summary.completed {
            info!(
                containers = summary.containers,
                failed = summary.failed_containers,
                materialized = summary.materialized(),
                applied = summary.applied,
                duration_ms = summary.duration.as_millis() as u64,
                "Import complete"
            );
        } else {
            warn!(
                remaining_items = self.queue.len(),
                remaining_nodes = self.pending.len(),
                "Import cancelled"
            );
        }

        Some(summary)
    }

    fn drain(&self, workers: usize, summary: &mut ImportSummary) {
        let wrapper = WrapCoordinator::new(&self.bridge, workers, &self.cancel);
        let materializer = Materializer::new(&self.tree, &self.pending, &self.events);

        while !self.is_cancelled() {
            let Some(item) = self.queue.pop_front() else {
                break;
            };
            summary.containers += 1;
            debug!(source = %item.source_id, mode = ?item.mode, "Wrapping container");

            match wrapper.wrap_container(&item) {
                Ok(wrapped) => {
                    summary.skipped += wrapped.skipped;
                    let stats =
                        materializer.materialize(&item.source_id, item.mode, wrapped.records);
                    summary.created += stats.created;
                    summary.rebound += stats.rebound;
                    summary.reload_dropped += stats.dropped;
                }
                Err(e) => {
                    summary.failed_containers += 1;
                    warn!(source = %item.source_id, error = %e, "Container failed");
                    self.events.emit(ImportEvent::ContainerFailed {
                        source_id: item.source_id.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

impl<B> ImportDriver<B>
where
    B: ImportBridge + 'static,
{
    /// Run on a dedicated control thread
    pub fn spawn(self: &Arc<Self>) -> Result<JoinHandle<Option<ImportSummary>>> {
        let driver = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("import-driver".into())
            .spawn(move || driver.run())?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::WrappedRecord;
    use crate::error::BridgeResult;

    /// Containers are lists of sub-unit names
    struct ListBridge;

    impl ImportBridge for ListBridge {
        type Container = Vec<&'static str>;
        type SubUnit = &'static str;
        type Geometry = String;

        fn sub_units(
            &self,
            _: &str,
            container: &Vec<&'static str>,
        ) -> BridgeResult<Vec<&'static str>> {
            Ok(container.clone())
        }

        fn wrap(
            &self,
            source_id: &str,
            _: &Vec<&'static str>,
            unit: &'static str,
        ) -> Option<WrappedRecord<String>> {
            Some(WrappedRecord::new(source_id, unit, unit.to_uppercase()))
        }

        fn finalize(&self, _: &str, staged: &String) -> BridgeResult<String> {
            Ok(format!("{}!", staged))
        }
    }

    fn driver() -> ImportDriver<ListBridge> {
        ImportDriver::new(ListBridge, ImportConfig::from_parallelism(4))
    }

    #[test]
    fn test_run_without_work_is_noop() {
        let driver = driver();
        let rx = driver.subscribe();
        assert!(driver.run().is_none());
        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_run_returns_to_idle() {
        let driver = driver();
        driver.enqueue("row_0", vec!["a", "b"], LoadMode::Import);

        let summary = driver.run().unwrap();
        assert!(summary.completed);
        assert_eq!(summary.containers, 1);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.applied, 2);
        assert_eq!(driver.state(), DriverState::Idle);
        assert!(!driver.is_running());
        assert_eq!(driver.pending_apply(), 0);

        let source = driver.tree().source("row_0").unwrap();
        for node in driver.tree().children(source.id()) {
            assert!(node.geometry().unwrap().ends_with('!'));
        }
    }

    #[test]
    fn test_run_while_running_is_noop() {
        let driver = driver();
        driver.enqueue("row_0", vec!["a"], LoadMode::Import);
        driver.running.store(true, Ordering::Release);
        assert!(driver.run().is_none());
        assert_eq!(driver.pending_items(), 1);
    }

    #[test]
    fn test_spawn_on_control_thread() {
        let driver = Arc::new(driver());
        driver.enqueue("row_0", vec!["a", "b", "c"], LoadMode::Import);

        let summary = driver.spawn().unwrap().join().unwrap().unwrap();
        assert_eq!(summary.applied, 3);
        assert_eq!(driver.tree().len(), 4);
    }
}
