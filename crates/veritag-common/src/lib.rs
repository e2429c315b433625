//! Veritag Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the Veritag workspace.
//!
//! # Overview
//!
//! This crate provides functionality used across all Veritag workspace
//! members:
//!
//! - **Error Handling**: Custom error and result types
//! - **Logging**: Centralized tracing subscriber setup
//! - **Types**: Shared domain types (job status, progress, row errors)

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, VeritagError};
