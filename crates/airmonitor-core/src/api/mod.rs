//! REST API client module for the Airly service.
//!
//! This module provides the `ApiClient` for fetching the installations
//! nearest to a position and the current measurements of an installation.
//!
//! Every request carries the account's API key in the `apikey` header.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::{ApiError, RateLimitWindow};
