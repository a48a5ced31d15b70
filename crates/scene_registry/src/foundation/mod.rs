//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the registry:
//! - Handle-based collections for scene incarnations
//! - Logging utilities

pub mod collections;
pub mod logging;
