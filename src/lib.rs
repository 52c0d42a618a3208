//! dc-import - Concurrent Two-Phase Data Importer
//!
//! A pipeline for importing batches of data containers into a filter tree.
//! Each container is unwrapped into sub-units on a worker pool; once every
//! container of the batch is attached to the tree, a second pool finalizes
//! the new geometry into the nodes.
//!
//! # Features
//!
//! - **Ordered Containers, Parallel Sub-units**: containers are processed one
//!   at a time in submission order; the sub-units of each are wrapped on
//!   `max(1, cpus - 2)` worker threads.
//!
//! - **Two-Phase Barrier**: no node is finalized before the whole batch has
//!   been materialized, so the host never renders a half-imported batch.
//!
//! - **Tear-Free Nodes**: finalize works on a staged copy and publishes the
//!   result with a single swap; readers see old or new geometry, never a mix.
//!
//! - **Reload in Place**: reload rebinds existing nodes by identity instead
//!   of creating new ones.
//!
//! - **Best Effort**: container and node failures are events, not errors; a
//!   batch always returns the driver to Idle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Host (enqueue + run)                         │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ WorkItem (FIFO)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Import Driver (control thread)                  │
//! │                                                                  │
//! │   Draining: one container at a time                              │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐      │
//! │  │ wrap-0  │  │ wrap-1  │  │ wrap-2  │  ...    │ wrap-N  │      │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘      │
//! │       └────────────┴─────┬──────┴───────────────────┘           │
//! │                          ▼                                      │
//! │            ┌──────────────────────────┐                         │
//! │            │   Filter Materializer    │──▶ FilterTree           │
//! │            └────────────┬─────────────┘                         │
//! │                         ▼                                       │
//! │            ┌──────────────────────────┐                         │
//! │            │   Pending Apply Queue    │                         │
//! │            └────────────┬─────────────┘                         │
//! │   Finalizing: once the work queue is empty                      │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐      │
//! │  │ apply-0 │  │ apply-1 │  │ apply-2 │  ...    │ apply-N │      │
//! │  └─────────┘  └─────────┘  └─────────┘         └─────────┘      │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ ImportEvent
//!                               ▼
//!                    ┌──────────────────┐
//!                    │   Subscribers    │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Import two directories as containers
//! dc-import tiles/row_0 tiles/row_1
//!
//! # Re-read them in place afterwards and dump the tree
//! dc-import tiles/row_0 tiles/row_1 --reload --tree-json tree.json
//! ```

pub mod bridge;
pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod import;
pub mod progress;
pub mod tree;

pub use bridge::{ImportBridge, WrappedRecord};
pub use config::{AppConfig, CliArgs, ImportConfig};
pub use error::{ApplyOutcome, BridgeError, ImportError, Result};
pub use events::{EventHub, ImportEvent};
pub use import::{DriverState, ImportDriver, ImportSummary, LoadMode};
pub use tree::{FilterNode, FilterTree, NodeHandle};
