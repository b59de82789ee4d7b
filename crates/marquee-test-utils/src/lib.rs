// SPDX-FileCopyrightText: 2026 Marquee Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Marquee integration tests.
//!
//! [`TestHarness`] opens a throwaway on-disk database and wires up both
//! message stores, the synchronous-access adapter, and a retention runner.

pub mod harness;

pub use harness::{TestHarness, TestHarnessBuilder};
