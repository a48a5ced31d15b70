//! # Core Module
//!
//! Shared configuration for the registry. The configuration types live here;
//! file loading and saving come from the [`Config`](crate::config::Config) trait.

pub mod config;

pub use config::{DuplicateNamePolicy, RegistryConfig};
