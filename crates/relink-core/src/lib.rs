//! Relink Core - Core abstractions for the reconnecting SQL session layer
//!
//! This crate provides the fundamental traits and types that the other
//! Relink crates depend on. It defines:
//!
//! - `Connection` - The capability a database driver exposes to the retry layer
//! - `Statement` / `StatementBatch` - Immutable units of work and their read/write kind
//! - `RelinkError` - The error taxonomy shared by drivers and the retry layer
//! - Common result types like `Value`, `QueryResult`, `StatementResult`

mod connection;
mod error;
pub mod statement;
mod types;

pub use connection::*;
pub use error::*;
pub use statement::{Statement, StatementBatch, StatementKind};
pub use types::*;
