//! Work item queue
//!
//! Strict FIFO of containers awaiting import. Containers are materialized in
//! the order they were pushed; the driver only pops the next item once the
//! previous one is fully wrapped and attached to the tree.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Whether a work item creates new nodes or rebinds existing ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Create a fresh source node and one child per wrapped record
    Import,

    /// Rebind the existing children of the source node in place
    Reload,
}

/// A container waiting to be imported
#[derive(Debug)]
pub struct WorkItem<C> {
    /// Identifier of the source the container was loaded from
    pub source_id: Arc<str>,

    /// Loadable container handle
    pub container: C,

    /// Import or reload
    pub mode: LoadMode,
}

impl<C> WorkItem<C> {
    pub fn new(source_id: impl Into<Arc<str>>, container: C, mode: LoadMode) -> Self {
        Self {
            source_id: source_id.into(),
            container,
            mode,
        }
    }
}

/// FIFO queue of work items
pub struct WorkQueue<C> {
    items: Mutex<VecDeque<WorkItem<C>>>,
}

impl<C> WorkQueue<C> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Append an item at the back
    pub fn push(&self, item: WorkItem<C>) {
        self.items.lock().push_back(item);
    }

    /// Remove and return the oldest item
    pub fn pop_front(&self) -> Option<WorkItem<C>> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<C> Default for WorkQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_is_fifo() {
        let queue = WorkQueue::new();
        queue.push(WorkItem::new("a", 1, LoadMode::Import));
        queue.push(WorkItem::new("b", 2, LoadMode::Reload));
        queue.push(WorkItem::new("c", 3, LoadMode::Import));
        assert_eq!(queue.len(), 3);

        let order: Vec<_> = std::iter::from_fn(|| queue.pop_front())
            .map(|item| item.source_id.to_string())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
        assert!(queue.pop_front().is_none());
    }
}
