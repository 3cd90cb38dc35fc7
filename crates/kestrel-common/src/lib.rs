//! Kestrel Common - Shared types and utilities
//!
//! This crate provides the error type, configuration structures and
//! small domain types (account names, timestamps, listing options)
//! shared by the storage crate and the proxy.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
