//! sidita-core - client-side session management for the account API.
//!
//! This crate contains the shared logic for sidita front ends:
//! - `api`: HTTP client and error type
//! - `auth`: session manager, token refresh, cookie persistence
//! - `models`: session, account and request types
//! - `config`: configuration loading

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{SessionManager, SessionOptions, SessionState};
pub use config::Config;
pub use models::{Account, Session, UpdatedUser, UserId};
