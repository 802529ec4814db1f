//! Calendar HTTP API module.
//!
//! # Purpose
//! Route handlers, wire types, error mapping and the OpenAPI document.
pub mod clients;
pub mod error;
pub mod events;
pub mod openapi;
pub mod system;
pub mod types;
