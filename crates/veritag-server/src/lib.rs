//! Veritag Server Library
//!
//! HTTP server for the product authentication platform: accepts bulk
//! identifier uploads and turns them into validated, deduplicated
//! authentication code records.
//!
//! # Overview
//!
//! - **Ingest pipeline**: streaming parse, validation, batched dedup and
//!   persistence, progress tracking, cooperative cancellation
//! - **API endpoints**: job status reads and cancellation
//! - **Notifications**: per-user broadcast of progress events
//! - **Database management**: PostgreSQL integration with SQLx
//! - **Configuration**: environment-based configuration management
//!
//! # Architecture
//!
//! HTTP features follow a **CQRS (Command Query Responsibility
//! Segregation)** layout: each feature is a vertical slice with its own
//! commands, queries, and routes. The ingestion pipeline itself lives in
//! [`ingest`] and talks to its collaborators (job records, identifier
//! store, brand aggregate, notification channel) through trait seams, so
//! it can run against PostgreSQL in production and in-memory stores in
//! tests.
//!
//! ## Framework Stack
//!
//! - **Axum**: web framework
//! - **SQLx**: PostgreSQL access
//! - **Tower**: middleware and service abstractions

pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;

pub use error::AppError;
