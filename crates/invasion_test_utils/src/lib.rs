//! # Invasion Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Determinism test harness
//! - Fixtures: canned configs, scripted pathfinding, scenario runner
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;
