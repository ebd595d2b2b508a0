//! Core utilities for the Yahoo Fantasy export toolkit
//!
//! This module consolidates common utilities that are used across
//! the application:
//! - `files`: Atomic writes, digests and read helpers
//! - `paths`: Export directory layout

pub mod files;
pub mod paths;

// Re-export commonly used items for convenience
pub use files::{
    read_if_exists, sha256_file, sha256_hex, to_json_bytes, try_read_to_string, write_atomic,
    write_atomic_new,
};
pub use paths::{ExportPaths, ModulePaths};
