//! Tutoring calendar service library crate.
//!
//! # Purpose
//! Exposes the recurrence and ledger engine, its storage backends, the HTTP
//! API and configuration for use by the binary and tests.
pub mod api;
pub mod app;
pub mod config;
pub mod ledger;
pub mod model;
pub mod observability;
pub mod scheduler;
pub mod store;
