// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the berth workspace.

pub mod harness;

pub use harness::{TestHarness, TestHarnessBuilder};
