//! Two-phase import pipeline
//!
//! This module contains the pieces the driver sequences for each batch:
//! - `queue`: FIFO of containers awaiting import
//! - `wrap`: fans a worker pool out over one container's sub-units
//! - `materialize`: attaches wrapped records to the filter tree
//! - `apply`: fans a worker pool out over every node awaiting finalize
//! - `driver`: the state machine tying the phases together

pub mod apply;
pub mod driver;
pub mod materialize;
pub mod queue;
pub mod wrap;

pub use apply::{ApplyCoordinator, ApplyQueue, ApplyStats, PendingApply};
pub use driver::{DriverState, ImportDriver, ImportSummary};
pub use materialize::{MaterializeStats, Materializer};
pub use queue::{LoadMode, WorkItem, WorkQueue};
pub use wrap::{WrapCoordinator, WrappedContainer};
