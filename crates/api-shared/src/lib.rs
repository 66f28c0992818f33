//! # API Shared
//!
//! Shared utilities and definitions for the rxcheck APIs.
//!
//! Contains:
//! - Wire request/response types (`dto` module) with OpenAPI schemas
//! - Shared services like `HealthService`
//! - Authentication utilities (usable by both REST and CLI tooling)
//!
//! Used by `rxcheck-core`, `api-rest` and `cli` for common functionality.

pub mod auth;
pub mod dto;
pub mod health;

pub use health::HealthService;
pub use dto::*;
