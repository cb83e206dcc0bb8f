//! Authentication module for managing the signed-in user.
//!
//! This module provides:
//! - `SessionManager`: login, logout, token refresh and the user resource
//! - `SessionState`: the observable current user, injected by the application
//! - `RefreshTimer`: the single pending token refresh
//! - `CookieJar`: where the session token is persisted between runs
//! - `Navigator`: the redirect performed on logout
//!
//! Tokens are refreshed one minute before the `exp` claim says they expire.

pub mod cookie;
pub mod manager;
pub mod navigator;
pub mod state;
pub mod timer;
pub mod token;

pub use cookie::{
    CookieJar, FileCookieJar, KeyringCookieJar, MemoryCookieJar, PersistedCookie, SameSite,
    SESSION_COOKIE,
};
pub use manager::{SessionManager, SessionOptions};
pub use navigator::{LogNavigator, Navigator, LOGIN_ROUTE};
pub use state::SessionState;
pub use timer::RefreshTimer;
pub use token::{decode_claims, refresh_delay, Claims, TokenError};
