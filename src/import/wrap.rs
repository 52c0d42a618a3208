//! Wrap coordinator
//!
//! Drains one container's sub-units on a pool of worker threads:
//!
//! ```text
//!            sub-unit injector (work stealing)
//!                       │
//!       ┌───────────────┼───────────────┐
//!       ▼               ▼               ▼
//!   ┌────────┐      ┌────────┐      ┌────────┐
//!   │ wrap-0 │      │ wrap-1 │  ... │ wrap-N │   bridge.wrap() outside any lock
//!   └───┬────┘      └───┬────┘      └───┬────┘
//!       └───────────────┼───────────────┘
//!                       ▼
//!        result channel: Wrapped(record) ... Done(worker)
//!                       │
//!                       ▼
//!        coordinator counts Done tokens down to zero
//! ```
//!
//! A worker claims a sub-unit by stealing it from the injector, so a unit is
//! never handed to two workers. Each worker sends a `Done` token after its
//! last record; because the channel preserves per-sender order, once every
//! token has arrived every record has too.

use crate::bridge::{ImportBridge, WrappedRecord};
use crate::error::{panic_message, Result, WorkerError, WrapOutcome};
use crate::import::queue::WorkItem;
use crossbeam_channel::{unbounded, Sender};
use crossbeam_deque::{Injector, Steal};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, trace, warn};

/// Everything wrapped out of one container
#[derive(Debug)]
pub struct WrappedContainer<G> {
    /// Records in the order workers produced them
    pub records: Vec<WrappedRecord<G>>,

    /// Sub-units listed by the bridge
    pub sub_units: usize,

    /// Sub-units that produced no record
    pub skipped: usize,

    /// Whether cancellation left sub-units unwrapped
    pub cancelled: bool,
}

enum WorkerMessage<G> {
    Wrapped(WrappedRecord<G>),
    Done {
        worker: usize,
        wrapped: usize,
        skipped: usize,
    },
}

/// Fans a worker pool out over one container at a time
pub struct WrapCoordinator<'a, B: ImportBridge> {
    bridge: &'a B,
    worker_count: usize,
    cancel: &'a AtomicBool,
}

impl<'a, B: ImportBridge> WrapCoordinator<'a, B> {
    pub fn new(bridge: &'a B, worker_count: usize, cancel: &'a AtomicBool) -> Self {
        Self {
            bridge,
            worker_count: worker_count.max(1),
            cancel,
        }
    }

    /// Wrap every sub-unit of `item`, returning once all workers are done.
    ///
    /// Fails if the bridge cannot open the container or a worker dies before
    /// reporting completion.
    pub fn wrap_container(
        &self,
        item: &WorkItem<B::Container>,
    ) -> Result<WrappedContainer<B::Geometry>> {
        let units = self.bridge.sub_units(&item.source_id, &item.container)?;
        let sub_units = units.len();

        if sub_units == 0 {
            return Ok(WrappedContainer {
                records: Vec::new(),
                sub_units,
                skipped: 0,
                cancelled: false,
            });
        }

        let injector = Injector::new();
        for unit in units {
            injector.push(unit);
        }

        // No point in idle workers for small containers
        let workers = self.worker_count.min(sub_units);
        let (tx, rx) = unbounded();

        let bridge = self.bridge;
        let cancel = self.cancel;

        let (records, skipped) = thread::scope(|scope| -> Result<_> {
            let mut handles = Vec::with_capacity(workers);

            for id in 0..workers {
                let tx = tx.clone();
                let injector = &injector;
                let spawned = thread::Builder::new()
                    .name(format!("wrap-{}", id))
                    .spawn_scoped(scope, move || wrap_loop(id, bridge, item, injector, cancel, tx));

                match spawned {
                    Ok(handle) => handles.push((id, handle)),
                    Err(e) => {
                        let err = WorkerError::SpawnFailed {
                            id,
                            reason: e.to_string(),
                        };
                        warn!(error = %err, "Continuing with fewer wrap workers");
                    }
                }
            }

            let mut outstanding = handles.len();
            if handles.is_empty() {
                // Nothing could be spawned; wrap on the control thread
                wrap_inline(bridge, item, &injector, cancel, tx.clone())?;
                outstanding = 1;
            }
            drop(tx);

            let mut records = Vec::new();
            let mut skipped = 0;
            let expected = outstanding;

            while outstanding > 0 {
                match rx.recv() {
                    Ok(WorkerMessage::Wrapped(record)) => records.push(record),
                    Ok(WorkerMessage::Done {
                        worker,
                        wrapped,
                        skipped: worker_skipped,
                    }) => {
                        outstanding -= 1;
                        skipped += worker_skipped;
                        debug!(
                            source = %item.source_id,
                            worker = worker,
                            wrapped = wrapped,
                            skipped = worker_skipped,
                            remaining = outstanding,
                            "Wrap worker finished"
                        );
                    }
                    // Every sender is gone without all tokens: a worker died
                    Err(_) => break,
                }
            }

            let mut panicked = None;
            for (id, handle) in handles {
                if let Err(payload) = handle.join() {
                    panicked.get_or_insert(WorkerError::Panicked {
                        id,
                        message: panic_message(payload.as_ref()),
                    });
                }
            }
            if let Some(err) = panicked {
                return Err(err.into());
            }

            if outstanding > 0 {
                return Err(WorkerError::MissingCompletion {
                    missing: outstanding,
                    total: expected,
                }
                .into());
            }

            Ok((records, skipped))
        })?;

        let cancelled = !injector.is_empty();

        Ok(WrappedContainer {
            records,
            sub_units,
            skipped,
            cancelled,
        })
    }
}

/// Run the wrap loop on the calling thread, turning a panic into a worker error
fn wrap_inline<B: ImportBridge>(
    bridge: &B,
    item: &WorkItem<B::Container>,
    units: &Injector<B::SubUnit>,
    cancel: &AtomicBool,
    tx: Sender<WorkerMessage<B::Geometry>>,
) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(|| {
        wrap_loop(0, bridge, item, units, cancel, tx)
    }))
    .map_err(|payload| {
        WorkerError::Panicked {
            id: 0,
            message: panic_message(payload.as_ref()),
        }
        .into()
    })
}

/// Claim sub-units until the injector is empty or the batch is cancelled
fn wrap_loop<B: ImportBridge>(
    id: usize,
    bridge: &B,
    item: &WorkItem<B::Container>,
    units: &Injector<B::SubUnit>,
    cancel: &AtomicBool,
    tx: Sender<WorkerMessage<B::Geometry>>,
) {
    let mut wrapped = 0;
    let mut skipped = 0;

    while !cancel.load(Ordering::Relaxed) {
        let unit = match units.steal() {
            Steal::Success(unit) => unit,
            Steal::Retry => continue,
            Steal::Empty => break,
        };

        match WrapOutcome::from_option(bridge.wrap(&item.source_id, &item.container, unit)) {
            WrapOutcome::Wrapped(record) => {
                trace!(worker = id, name = %record.name, "Sub-unit wrapped");
                wrapped += 1;
                if tx.send(WorkerMessage::Wrapped(record)).is_err() {
                    break;
                }
            }
            WrapOutcome::Skipped => skipped += 1,
        }
    }

    let _ = tx.send(WorkerMessage::Done {
        worker: id,
        wrapped,
        skipped,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BridgeError, BridgeResult};
    use crate::import::queue::LoadMode;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    /// Container is a list of sub-unit names; names starting with '-' hold nothing
    struct NameBridge {
        calls: AtomicUsize,
        panic_on: Option<&'static str>,
    }

    impl NameBridge {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                panic_on: None,
            }
        }
    }

    impl ImportBridge for NameBridge {
        type Container = Option<Vec<&'static str>>;
        type SubUnit = &'static str;
        type Geometry = usize;

        fn sub_units(
            &self,
            source_id: &str,
            container: &Self::Container,
        ) -> BridgeResult<Vec<&'static str>> {
            container
                .clone()
                .ok_or_else(|| BridgeError::ContainerUnreadable {
                    source_id: source_id.to_string(),
                    reason: "invalid handle".into(),
                })
        }

        fn wrap(
            &self,
            source_id: &str,
            _container: &Self::Container,
            unit: &'static str,
        ) -> Option<WrappedRecord<usize>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on == Some(unit) {
                panic!("cannot wrap {}", unit);
            }
            if unit.starts_with('-') {
                return None;
            }
            Some(WrappedRecord::new(source_id, unit, unit.len()))
        }

        fn finalize(&self, _name: &str, staged: &usize) -> BridgeResult<usize> {
            Ok(*staged)
        }
    }

    fn item(units: Option<Vec<&'static str>>) -> WorkItem<Option<Vec<&'static str>>> {
        WorkItem::new("row_0", units, LoadMode::Import)
    }

    #[test]
    fn test_every_sub_unit_wrapped_once() {
        let bridge = NameBridge::new();
        let cancel = AtomicBool::new(false);
        let names: Vec<&'static str> = vec!["a", "b", "-c", "d", "e", "-f", "g"];
        let coordinator = WrapCoordinator::new(&bridge, 4, &cancel);

        let wrapped = coordinator.wrap_container(&item(Some(names))).unwrap();
        assert_eq!(wrapped.sub_units, 7);
        assert_eq!(wrapped.skipped, 2);
        assert_eq!(wrapped.records.len(), 5);
        assert!(!wrapped.cancelled);
        assert_eq!(bridge.calls.load(Ordering::SeqCst), 7);

        let got: HashSet<_> = wrapped.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(got, HashSet::from(["a", "b", "d", "e", "g"]));
    }

    #[test]
    fn test_single_worker() {
        let bridge = NameBridge::new();
        let cancel = AtomicBool::new(false);
        let coordinator = WrapCoordinator::new(&bridge, 1, &cancel);

        let wrapped = coordinator
            .wrap_container(&item(Some(vec!["a", "b", "c"])))
            .unwrap();
        let names: Vec<_> = wrapped.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_container() {
        let bridge = NameBridge::new();
        let cancel = AtomicBool::new(false);
        let coordinator = WrapCoordinator::new(&bridge, 4, &cancel);

        let wrapped = coordinator.wrap_container(&item(Some(Vec::new()))).unwrap();
        assert!(wrapped.records.is_empty());
        assert_eq!(wrapped.sub_units, 0);
    }

    #[test]
    fn test_unreadable_container() {
        let bridge = NameBridge::new();
        let cancel = AtomicBool::new(false);
        let coordinator = WrapCoordinator::new(&bridge, 4, &cancel);

        let err = coordinator.wrap_container(&item(None)).unwrap_err();
        assert!(err.to_string().contains("invalid handle"));
        assert_eq!(bridge.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let bridge = NameBridge::new();
        let cancel = AtomicBool::new(true);
        let coordinator = WrapCoordinator::new(&bridge, 2, &cancel);

        let wrapped = coordinator
            .wrap_container(&item(Some(vec!["a", "b"])))
            .unwrap();
        assert!(wrapped.records.is_empty());
        assert!(wrapped.cancelled);
        assert_eq!(bridge.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_inline_wrap_catches_panic() {
        let bridge = NameBridge {
            calls: AtomicUsize::new(0),
            panic_on: Some("b"),
        };
        let cancel = AtomicBool::new(false);
        let item = item(Some(vec!["a", "b"]));
        let injector = Injector::new();
        injector.push("a");
        injector.push("b");
        let (tx, rx) = unbounded();

        let err = wrap_inline(&bridge, &item, &injector, &cancel, tx).unwrap_err();
        assert!(err.to_string().contains("cannot wrap b"));
        assert!(matches!(rx.try_recv(), Ok(WorkerMessage::Wrapped(r)) if r.name == "a"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_inline_wrap_reports_done() {
        let bridge = NameBridge::new();
        let cancel = AtomicBool::new(false);
        let item = item(Some(vec!["a", "-b"]));
        let injector = Injector::new();
        injector.push("a");
        injector.push("-b");
        let (tx, rx) = unbounded();

        wrap_inline(&bridge, &item, &injector, &cancel, tx).unwrap();
        let messages: Vec<_> = rx.try_iter().collect();
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            messages[1],
            WorkerMessage::Done {
                worker: 0,
                wrapped: 1,
                skipped: 1
            }
        ));
    }

    #[test]
    fn test_panicking_worker_fails_container() {
        let bridge = NameBridge {
            calls: AtomicUsize::new(0),
            panic_on: Some("b"),
        };
        let cancel = AtomicBool::new(false);
        let coordinator = WrapCoordinator::new(&bridge, 2, &cancel);

        let err = coordinator
            .wrap_container(&item(Some(vec!["a", "b", "c"])))
            .unwrap_err();
        assert!(err.to_string().contains("panicked"));
    }
}
