//! Tracklift - background sample import from multi-track media containers
//!
//! This library crate holds the glue behind the `tracklift` binary so it can
//! be exercised by integration tests.

pub mod config;
pub mod import;
pub mod probe;
