// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the federation engine
//!
//! Every failure in the pipeline (malformed SQL, a non-federated query,
//! an unschedulable plan, a failed step) maps to one of these variants
//! so callers get a single typed surface to match on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all federation operations
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum EngineError {
    /// Malformed SQL. The tokenizer never fails; only the parser raises this.
    #[error("Syntax error: {message}")]
    Syntax { message: String },

    /// Federation precondition violation: a single-database query routed
    /// here, or a reference to an unknown/disconnected database.
    #[error("Federation error: {message}")]
    Federation { message: String },

    /// The plan DAG has no topological ordering. This is a planner bug,
    /// not user error.
    #[error("Circular dependency in execution plan: {message}")]
    CircularDependency { message: String },

    /// A step failed: a source fetch error or an in-memory operator error.
    #[error("Execution error: {message}")]
    Execution { message: String },

    #[error("No connection registered for database '{database}'")]
    ConnectionNotFound { database: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax { message: msg.into() }
    }

    pub fn federation(msg: impl Into<String>) -> Self {
        Self::Federation { message: msg.into() }
    }

    pub fn circular_dependency(msg: impl Into<String>) -> Self {
        Self::CircularDependency { message: msg.into() }
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution { message: msg.into() }
    }

    pub fn connection_not_found(database: impl Into<String>) -> Self {
        Self::ConnectionNotFound { database: database.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
