//! Shared test utilities for sketchops integration tests.
//!
//! This module provides:
//! - `TestHarness` with a file-backed database and artifact directory in a
//!   temp dir
//! - Fakes for the generation provider, timeline importer and evidence store

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;
