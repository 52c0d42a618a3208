//! Filter tree nodes
//!
//! A node owns two geometry slots:
//! - `staged`: the wrapped geometry handed over by the materializer
//! - `visible`: the finalized geometry readers see
//!
//! Finalizing reads the staged buffer, builds the definitive geometry outside
//! any lock, and swaps it into the visible slot in one write. Readers clone an
//! `Arc` out of the visible slot, so they observe either the old or the new
//! geometry and never a partial one.

use crate::error::{ApplyOutcome, BridgeResult};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Index of a node inside its [`FilterTree`](super::FilterTree)
pub type NodeId = usize;

/// Role of a node in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Root node standing for one imported source
    Source,

    /// One sub-unit of a container
    Data,
}

/// A persistent node of the filter tree
pub struct FilterNode<G> {
    id: NodeId,
    name: String,
    kind: NodeKind,
    parent: Option<NodeId>,
    tooltip: String,
    staged: Mutex<Option<Arc<G>>>,
    visible: RwLock<Option<Arc<G>>>,
    apply_lock: Mutex<()>,
    generation: AtomicU64,
}

impl<G> FilterNode<G> {
    pub(crate) fn source(id: NodeId, source_id: &str) -> Self {
        Self::new(
            id,
            source_id.to_string(),
            NodeKind::Source,
            None,
            source_id.to_string(),
            None,
        )
    }

    pub(crate) fn data(
        id: NodeId,
        parent: NodeId,
        name: String,
        source_id: &str,
        staged: G,
    ) -> Self {
        let tooltip = format!("{} in {}", name, source_id);
        Self::new(
            id,
            name,
            NodeKind::Data,
            Some(parent),
            tooltip,
            Some(Arc::new(staged)),
        )
    }

    fn new(
        id: NodeId,
        name: String,
        kind: NodeKind,
        parent: Option<NodeId>,
        tooltip: String,
        staged: Option<Arc<G>>,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            parent,
            tooltip,
            staged: Mutex::new(staged),
            visible: RwLock::new(None),
            apply_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn tooltip(&self) -> &str {
        &self.tooltip
    }

    /// The geometry readers should display, if any has been applied
    pub fn geometry(&self) -> Option<Arc<G>> {
        self.visible.read().clone()
    }

    /// Geometry waiting to be finalized
    pub fn staged(&self) -> Option<Arc<G>> {
        self.staged.lock().clone()
    }

    /// Number of successful applies so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether any geometry has ever been applied
    pub fn is_applied(&self) -> bool {
        self.generation() > 0
    }

    /// Rebind the node to freshly wrapped geometry.
    ///
    /// Only the staged slot changes; readers keep seeing the previous
    /// geometry until the next apply.
    pub fn rebind(&self, staged: G) {
        *self.staged.lock() = Some(Arc::new(staged));
    }

    /// Finalize the staged geometry with `finalize` and publish the result.
    ///
    /// Returns [`ApplyOutcome::Busy`] without waiting when another caller is
    /// already finalizing this node.
    pub fn apply_with<F>(&self, finalize: F) -> ApplyOutcome
    where
        F: FnOnce(&str, &G) -> BridgeResult<G>,
    {
        let Some(_guard) = self.apply_lock.try_lock() else {
            return ApplyOutcome::Busy;
        };

        let Some(staged) = self.staged() else {
            return ApplyOutcome::Empty;
        };

        match finalize(&self.name, &staged) {
            Ok(geometry) => {
                *self.visible.write() = Some(Arc::new(geometry));
                self.generation.fetch_add(1, Ordering::AcqRel);

                // A rebind that raced with this apply stays staged
                let mut slot = self.staged.lock();
                if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, &staged)) {
                    *slot = None;
                }
                ApplyOutcome::Applied
            }
            Err(e) => ApplyOutcome::Failed(e),
        }
    }
}

impl<G> fmt::Debug for FilterNode<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .field("generation", &self.generation())
            .finish()
    }
}
