// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the berth coordination daemon.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and typed query
//! functions for every persisted table. This crate is mechanical: it never
//! interprets domain semantics (that is `berth-kernel`'s job), but it does
//! own the atomic primitives (unique-constraint claims, guarded state
//! transitions, cascading deletes) that the kernel's invariants rest on.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
