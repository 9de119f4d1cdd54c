//! wikivox library interface
//!
//! Exposes the pipeline components for the CLI binary and integration tests.

pub mod commands;
pub mod export;
pub mod models;
pub mod pages;
pub mod services;
pub mod store;
pub mod tables;
pub mod wiki;
