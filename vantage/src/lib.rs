//! # Vantage: Graph-driven Agent Workflow Framework
//!
//! Vantage is a framework for building concurrent, stateful workflows using graph-based
//! execution with versioned state management and deterministic barrier merges. It backs
//! the progressive enrichment and multi-stage analysis pipelines built on top of it: each
//! enrichment layer and each analysis stage is a node, fanned out and merged by the same
//! barrier machinery.
//!
//! ## Core Concepts
//!
//! - **Nodes**: Async units of work that process state snapshots
//! - **Observations**: Append-only field provenance ledger with source/layer/confidence
//! - **State**: Versioned, channel-based state management
//! - **Graph**: Declarative workflow definition with conditional edges
//! - **Scheduler**: Concurrent execution with dependency tracking
//!
//! ## Quick Start
//!
//! ### Working with field observations
//!
//! Observations are the primary data-carrying primitive. Use convenience constructors:
//!
//! ```
//! use vantage::observation::FieldObservation;
//! use serde_json::json;
//!
//! // Preferred: Use convenience constructors
//! let scraped = FieldObservation::new("name", json!("Acme"), "metadata-scraper", 1, 70);
//! let user_edit = FieldObservation::from_user("name", json!("Acme Corp"));
//!
//! assert!(user_edit.is_from_user());
//! assert_eq!(user_edit.confidence, 100);
//! ```
//!
//! ### Building a Simple Workflow
//!
//! ```
//! use vantage::{
//!     graphs::GraphBuilder,
//!     node::{Node, NodeContext, NodePartial},
//!     observation::FieldObservation,
//!     state::VersionedState,
//!     types::NodeKind,
//! };
//! use async_trait::async_trait;
//! use serde_json::json;
//!
//! // Define a simple node
//! struct MetadataNode;
//!
//! #[async_trait]
//! impl Node for MetadataNode {
//!     async fn run(
//!         &self,
//!         snapshot: vantage::state::StateSnapshot,
//!         _ctx: NodeContext,
//!     ) -> Result<NodePartial, vantage::node::NodeError> {
//!         let observation = FieldObservation::new("name", json!("Acme"), "metadata", 1, 80);
//!
//!         Ok(NodePartial::new().with_fields(vec![observation]))
//!     }
//! }
//! ```
//!
//! ### State Management
//!
//! ```
//! use vantage::state::VersionedState;
//! use serde_json::json;
//!
//! // Create initial state seeded with a user-supplied form field
//! let complex_state = VersionedState::builder()
//!     .with_user_field("name", json!("Acme Corp"))
//!     .with_extra("domain", json!("acme.com"))
//!     .build();
//! ```
//!
//! ## Best Practices
//!
//! ### Error Handling
//!
//! The framework uses comprehensive error types with detailed context:
//!
//! ```
//! use vantage::node::{NodeError, NodeContext};
//!
//! // Errors are automatically traced and can be emitted to the event bus
//! fn example_error_handling(ctx: &NodeContext) -> Result<(), NodeError> {
//!     ctx.emit("validation", "Checking input parameters")?;
//!
//!     // Framework provides rich error types
//!     Err(NodeError::MissingInput {
//!         what: "user_id",
//!     })
//! }
//! ```
//!
//! ## Module Guide
//!
//! - [`observation`] - Field observation / provenance primitives
//! - [`state`] - Versioned state management and snapshots
//! - [`node`] - Node trait and execution primitives
//! - [`graphs`] - Workflow graph definition and compilation
//! - [`schedulers`] - Concurrent execution and dependency resolution
//! - [`runtimes`] - High-level execution runtime and checkpointing
//! - [`channels`] - Channel-based state storage and versioning
//! - [`reducers`] - State merge strategies and conflict resolution

pub mod app;
pub mod channels;
pub mod control;
pub mod event_bus;
pub mod graphs;
pub mod node;
pub mod observation;
pub mod reducers;
pub mod runtimes;
pub mod schedulers;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod utils;
