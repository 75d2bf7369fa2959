// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pub/sub messaging for the berth coordination daemon.
//!
//! A channel is an append-only log (persisted by `berth-store`) plus a set
//! of live subscribers. Within one channel every subscriber observes the
//! publish order; across channels nothing is guaranteed.

pub mod broker;

pub use broker::{Broker, BusFrame, Subscription};
