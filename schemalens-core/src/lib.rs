//! Core library for SchemaLens.
//!
//! SchemaLens reads the table catalog of a relational database, normalizes it
//! into a small engine-neutral model, derives the foreign-key dependency graph
//! and runs structural integrity checks against it.
//!
//! # Guarantees
//! - All catalog access is read-only
//! - Credentials never appear in `Display` output, logs or error messages
//! - Verification never mutates the snapshot it is checking
//!
//! # Architecture
//! - [`connectors`]: one [`SchemaConnector`] per engine, selected at runtime
//!   by [`EngineKind`] through a [`ConnectorFactory`]
//! - [`graph`]: graph construction and strongly connected components
//! - [`integrity`]: the individual checks and the concurrent verifier
//! - [`snapshot`]: the holder that ties fetch, graph and verification together

pub mod connectors;
pub mod error;
pub mod graph;
pub mod integrity;
pub mod logging;
pub mod models;
pub mod snapshot;

// Re-export commonly used types
pub use connectors::{
    ConnectionParams, ConnectorFactory, EngineConnectorFactory, SchemaConnector,
    supported_engines,
};
pub use error::{Result, SchemaLensError};
pub use graph::{Graph, build_graph, circular_dependencies, find_sccs};
pub use integrity::{
    CheckKind, IncompleteCheck, IntegrityVerifier, RedundancyRule, SchemaVerificationResults,
    VerifierConfig,
};
pub use logging::{LogFormat, init_logging};
pub use models::{Column, EngineKind, Index, Relationship, TableMetadata};
pub use snapshot::{SchemaSnapshotHolder, Snapshot};
