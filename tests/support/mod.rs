//! Test support module
//!
//! Shared fixtures and scripted capabilities for the integration tests.

#![allow(dead_code)]

pub mod helpers;

// Re-export rstest fixtures for convenient use in tests
pub mod fixtures;
