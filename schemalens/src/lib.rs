//! SchemaLens command-line front end.
//!
//! The binary is a thin wrapper around [`commands::execute`]; keeping the
//! commands in a library lets tests drive them with injected connectors.
//!
//! # Security Guarantees
//! - Read-only database sessions
//! - Passwords come from flags, the environment or a no-echo prompt and are
//!   never logged
//! - Logs go to stderr; stdout carries only the JSON document

pub mod cli;
pub mod commands;
pub mod output;

pub use cli::{Cli, Command};
pub use commands::{ISSUES_FOUND, execute, is_verification_timeout, verify_exit_code};
