//! Structural integrity verification.
//!
//! This module looks for design smells in a schema snapshot:
//! - **Primary keys**: tables without one
//! - **Nullability**: columns that accept NULL
//! - **Unique indexes**: unique columns no index covers
//! - **Foreign keys**: dangling or unindexed references
//! - **Redundant indexes**: indexes covered by another index
//! - **Cycles**: strongly connected components of the foreign-key graph
//!
//! # Example
//! ```rust,ignore
//! use schemalens_core::integrity::{IntegrityVerifier, VerifierConfig};
//!
//! let verifier = IntegrityVerifier::new(VerifierConfig::default());
//! let report = verifier.verify(snapshot).await?;
//! println!("{} issues", report.issue_count());
//! ```

mod checks;
mod config;
mod models;
mod verifier;

// Re-export public API
pub use checks::{
    check_components, check_foreign_keys, check_nullable_columns, check_primary_keys,
    check_redundant_indexes, check_unique_indexes,
};
pub use config::{ConfigValidationError, RedundancyRule, VerifierConfig};
pub use models::{
    CheckKind, ForeignKeyIssue, IncompleteCheck, NullableColumnIssue, PrimaryKeyIssue,
    RedundantIndexIssue, SchemaVerificationResults, UniqueIndexIssue,
};
pub use verifier::IntegrityVerifier;
