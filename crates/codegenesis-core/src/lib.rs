//! Core records, config, errors, and persistence model for CodeGenesis.

pub mod config;
pub mod error;
pub mod store;
pub mod types;
