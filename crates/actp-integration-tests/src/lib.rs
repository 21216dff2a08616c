//! Integration test crate for the ACTP settlement engine.
//!
//! This crate exists solely to run integration tests that span the ACTP crates.
//! It has no public API - all functionality is in the test modules.

#![forbid(unsafe_code)]
