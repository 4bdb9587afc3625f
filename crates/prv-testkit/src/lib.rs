//! # PRV Testkit
//!
//! Shared fixtures and proptest generators for tests across the workspace.
//! Not intended for production use.

pub mod fixtures;
pub mod generators;
