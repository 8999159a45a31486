// SPDX-License-Identifier: Apache-2.0

//! Federation preconditions.
//!
//! A query only belongs on the federation path when it references at least
//! two distinct databases, every one of which must hold a live connection.
//! Checks are read-only against the registry.

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::registry::ConnectionRegistry;

use super::types::ParsedQuery;

/// Validates federation preconditions against live connection state.
pub fn validate(query: &ParsedQuery, registry: &ConnectionRegistry) -> EngineResult<()> {
    let databases = query.databases();

    if databases.len() < 2 {
        return Err(EngineError::federation(format!(
            "query references {} database(s); federated execution requires at least 2. \
             Run single-database queries through the regular query path",
            databases.len()
        )));
    }

    for database in &databases {
        match registry.info(database) {
            None => {
                return Err(EngineError::federation(format!(
                    "no connection registered for database '{database}'"
                )));
            }
            Some(info) if !info.connected => {
                return Err(EngineError::federation(format!(
                    "connection '{database}' is registered but not connected"
                )));
            }
            Some(_) => {}
        }
    }

    Ok(())
}
