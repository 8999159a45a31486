// SPDX-License-Identifier: Apache-2.0

//! Cross-Database Federation Engine
//!
//! Executes a single SQL statement that references tables across two or
//! more independently connected databases as if they were one: sources are
//! fetched concurrently, then an in-memory relational engine joins,
//! aggregates, sorts, and paginates the rows.

pub mod cache;
pub mod engine;
pub mod executor;
pub mod parser;
pub mod planner;
pub mod stats;
pub mod tokenizer;
pub mod types;
pub mod validator;
