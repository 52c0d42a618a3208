//! Filter materializer
//!
//! Turns the records wrapped out of one container into tree nodes and queues
//! each node for the apply phase.
//!
//! - Import: a fresh source node is appended for the container and every
//!   record becomes its last child.
//! - Reload: every record is matched by name to a child of the existing
//!   source node and rebound in place. Records with no match are dropped;
//!   a reload never introduces new nodes.

use crate::bridge::WrappedRecord;
use crate::events::{EventHub, ImportEvent};
use crate::import::apply::{ApplyQueue, PendingApply};
use crate::import::queue::LoadMode;
use crate::tree::{FilterTree, NodeHandle};
use tracing::{debug, warn};

/// Counts for one materialized container
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeStats {
    /// Nodes created (import)
    pub created: usize,

    /// Nodes rebound in place (reload)
    pub rebound: usize,

    /// Reload records with no matching node
    pub dropped: usize,
}

impl MaterializeStats {
    /// Nodes that produced a `NodeMaterialized` event
    pub fn materialized(&self) -> usize {
        self.created + self.rebound
    }
}

/// Attaches wrapped records to the tree
pub struct Materializer<'a, G> {
    tree: &'a FilterTree<G>,
    pending: &'a ApplyQueue<G>,
    events: &'a EventHub<G>,
}

impl<'a, G> Materializer<'a, G> {
    pub fn new(
        tree: &'a FilterTree<G>,
        pending: &'a ApplyQueue<G>,
        events: &'a EventHub<G>,
    ) -> Self {
        Self {
            tree,
            pending,
            events,
        }
    }

    /// Materialize all records of one container
    pub fn materialize(
        &self,
        source_id: &str,
        mode: LoadMode,
        records: Vec<WrappedRecord<G>>,
    ) -> MaterializeStats {
        let mut stats = MaterializeStats::default();

        let source = match mode {
            LoadMode::Import => {
                let source = self.tree.add_source(source_id);
                self.events.emit(ImportEvent::SourceAdded(source.clone()));
                Some(source)
            }
            LoadMode::Reload => self.tree.source(source_id),
        };

        let Some(source) = source else {
            warn!(
                source = %source_id,
                records = records.len(),
                "No imported source to reload; dropping records"
            );
            stats.dropped = records.len();
            return stats;
        };

        let mut last: Option<NodeHandle<G>> = None;

        for record in records {
            let node = match mode {
                LoadMode::Import => {
                    let node = self.tree.add_child(source.id(), record.name, record.geometry);
                    if node.is_some() {
                        stats.created += 1;
                    }
                    node
                }
                LoadMode::Reload => match self.tree.find_child(source.id(), &record.name) {
                    Some(node) => {
                        node.rebind(record.geometry);
                        stats.rebound += 1;
                        Some(node)
                    }
                    None => {
                        warn!(
                            source = %record.source_id,
                            name = %record.name,
                            "Reload target missing; record dropped"
                        );
                        stats.dropped += 1;
                        None
                    }
                },
            };

            if let Some(node) = node {
                let queued = self.pending.push(PendingApply {
                    node: node.clone(),
                    mode,
                });
                if !queued {
                    debug!(name = %node.name(), "Node already pending apply");
                }
                self.events.emit(ImportEvent::NodeMaterialized {
                    node: node.clone(),
                    mode,
                });
                last = Some(node);
            }
        }

        if let Some(node) = last {
            self.tree.select(node.id());
            self.events.emit(ImportEvent::SelectionChanged(node));
        }

        debug!(
            source = %source_id,
            created = stats.created,
            rebound = stats.rebound,
            dropped = stats.dropped,
            "Container materialized"
        );

        stats
    }
}
