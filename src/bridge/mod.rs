//! Bridge between the import pipeline and the data it imports
//!
//! The pipeline never looks inside containers or geometry. It only asks a
//! bridge to:
//! - list the sub-units of a container (failing here fails the container)
//! - wrap one sub-unit into a record (no record means nothing renderable)
//! - finalize a node's staged geometry into its definitive form
//!
//! All three are called from worker threads, outside every pipeline lock.

pub mod fs;

pub use fs::{FileGeometry, FsBridge};

use crate::error::BridgeResult;
use std::sync::Arc;

/// A wrapped sub-unit ready to become a tree node
#[derive(Debug)]
pub struct WrappedRecord<G> {
    /// Sub-unit name, unique within its container
    pub name: String,

    /// Staged geometry; finalized later by the apply phase
    pub geometry: G,

    /// Source id of the work item this record came from
    pub source_id: Arc<str>,
}

impl<G> WrappedRecord<G> {
    pub fn new(source_id: impl Into<Arc<str>>, name: impl Into<String>, geometry: G) -> Self {
        Self {
            name: name.into(),
            geometry,
            source_id: source_id.into(),
        }
    }
}

/// Opaque wrap/finalize operations delegated by the pipeline
pub trait ImportBridge: Send + Sync {
    /// Loadable container handle
    type Container: Send + Sync;

    /// One independently wrappable element of a container
    type SubUnit: Send;

    /// Staged and finalized geometry
    type Geometry: Send + Sync;

    /// List the sub-units of `container`.
    ///
    /// An error here fails the whole container; nothing from it is imported.
    fn sub_units(
        &self,
        source_id: &str,
        container: &Self::Container,
    ) -> BridgeResult<Vec<Self::SubUnit>>;

    /// Wrap one sub-unit. `None` means it holds nothing renderable.
    fn wrap(
        &self,
        source_id: &str,
        container: &Self::Container,
        unit: Self::SubUnit,
    ) -> Option<WrappedRecord<Self::Geometry>>;

    /// Produce the definitive geometry for a node from its staged geometry
    fn finalize(&self, name: &str, staged: &Self::Geometry) -> BridgeResult<Self::Geometry>;
}

