//! Data models for the account API.
//!
//! - `Session`: the signed-in user with its bearer token
//! - `Account`: a user record from the user collection endpoints
//! - `UpdatedUser`: the result of updating a user record
//! - Request bodies for the auth and password flows

pub mod requests;
pub mod user;

pub use requests::{Credentials, EmailRequest, ResetPasswordRequest, TokenRequest};
pub use user::{Account, Session, UpdatedUser, UserId};
