//! REST API client module for the account service.
//!
//! This module provides the `ApiClient` used by the session manager for
//! every request, and the `ApiError` it reports non-success statuses with.
//!
//! Authentication is a JWT bearer token obtained from `/auth/authenticate`
//! plus a refresh cookie the server sets on the client's cookie jar.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
