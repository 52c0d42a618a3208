//! Events published to the host while a batch runs
//!
//! The host subscribes before calling `run()` and drains its receiver on its
//! own thread. Every subscriber sees every event in emission order.

use crate::import::LoadMode;
use crate::tree::NodeHandle;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;

/// Notification emitted by the import driver
pub enum ImportEvent<G> {
    /// Suspend (`true`) or resume (`false`) rendering
    RenderSuspendRequested(bool),

    /// A root node was created for an imported source
    SourceAdded(NodeHandle<G>),

    /// A data node was created (import) or rebound (reload)
    NodeMaterialized { node: NodeHandle<G>, mode: LoadMode },

    /// The active selection moved to this node
    SelectionChanged(NodeHandle<G>),

    /// A container could not be opened or unwrapped
    ContainerFailed { source_id: String, reason: String },

    /// The apply phase is starting over `total` nodes
    ApplyStarted { total: usize },

    /// `applied` of `total` nodes have been finalized
    ApplyProgress { applied: usize, total: usize },

    /// A rebound node finished applying its new geometry
    NodeReloadCompleted(NodeHandle<G>),

    /// Finalizing a node failed; it keeps its previous geometry
    FinalizeFailed { node: NodeHandle<G>, reason: String },
}

impl<G> Clone for ImportEvent<G> {
    fn clone(&self) -> Self {
        match self {
            Self::RenderSuspendRequested(b) => Self::RenderSuspendRequested(*b),
            Self::SourceAdded(n) => Self::SourceAdded(n.clone()),
            Self::NodeMaterialized { node, mode } => Self::NodeMaterialized {
                node: node.clone(),
                mode: *mode,
            },
            Self::SelectionChanged(n) => Self::SelectionChanged(n.clone()),
            Self::ContainerFailed { source_id, reason } => Self::ContainerFailed {
                source_id: source_id.clone(),
                reason: reason.clone(),
            },
            Self::ApplyStarted { total } => Self::ApplyStarted { total: *total },
            Self::ApplyProgress { applied, total } => Self::ApplyProgress {
                applied: *applied,
                total: *total,
            },
            Self::NodeReloadCompleted(n) => Self::NodeReloadCompleted(n.clone()),
            Self::FinalizeFailed { node, reason } => Self::FinalizeFailed {
                node: node.clone(),
                reason: reason.clone(),
            },
        }
    }
}

impl<G> fmt::Debug for ImportEvent<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RenderSuspendRequested(b) => write!(f, "RenderSuspendRequested({})", b),
            Self::SourceAdded(n) => write!(f, "SourceAdded({})", n.name()),
            Self::NodeMaterialized { node, mode } => {
                write!(f, "NodeMaterialized({}, {:?})", node.name(), mode)
            }
            Self::SelectionChanged(n) => write!(f, "SelectionChanged({})", n.name()),
            Self::ContainerFailed { source_id, reason } => {
                write!(f, "ContainerFailed({}: {})", source_id, reason)
            }
            Self::ApplyStarted { total } => write!(f, "ApplyStarted({})", total),
            Self::ApplyProgress { applied, total } => {
                write!(f, "ApplyProgress({}/{})", applied, total)
            }
            Self::NodeReloadCompleted(n) => write!(f, "NodeReloadCompleted({})", n.name()),
            Self::FinalizeFailed { node, reason } => {
                write!(f, "FinalizeFailed({}: {})", node.name(), reason)
            }
        }
    }
}

/// Fan-out of events to any number of subscribers
pub struct EventHub<G> {
    subscribers: Mutex<Vec<Sender<ImportEvent<G>>>>,
}

impl<G> EventHub<G> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> Receiver<ImportEvent<G>> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to all live subscribers, forgetting dropped ones
    pub fn emit(&self, event: ImportEvent<G>) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<G> Default for EventHub<G> {
    fn default() -> Self {
        Self::new()
    }
}
