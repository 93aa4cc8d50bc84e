//! Command implementations for the CLI
//!
//! - serve: Run the tracking server
//! - test: Test configuration validity
//! - stats: Print analytics tables from the store
//! - prune: Delete stored records
//! - config: Write a default configuration file

pub mod config;
pub mod prune;
pub mod serve;
pub mod stats;
