// SPDX-License-Identifier: Apache-2.0

//! Bundled reference connectors.
//!
//! Real drivers (PostgreSQL, MySQL, MongoDB, ...) live outside this crate
//! and implement [`Connector`](crate::engine::traits::Connector) at their
//! boundary. The in-memory connector here backs the test suite and demos.

pub mod memory;

pub use memory::MemoryConnector;
