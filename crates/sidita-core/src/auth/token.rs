//! JWT payload inspection.
//!
//! Tokens are opaque to this crate except for the `exp` claim, which drives
//! the refresh timer. Signatures are never checked.

use std::time::Duration;

use base64::alphabet;
use base64::engine::{general_purpose, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Refresh this long before the token expires.
pub const REFRESH_LEAD_MS: i64 = 60 * 1000;

/// JWT segments are base64url without padding, but some issuers pad anyway.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token is not a three-part JWT")]
    Malformed,

    #[error("Token payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Token payload is not a JSON claims object: {0}")]
    Claims(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Decode the payload (second segment) of a dot-delimited JWT
pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
        _ => return Err(TokenError::Malformed),
    };

    let bytes = URL_SAFE_LENIENT
        .decode(payload)
        .or_else(|_| general_purpose::STANDARD.decode(payload))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Milliseconds until the refresh should run: `exp - now - 60s`.
/// Negative when the token is already inside the lead window.
pub fn refresh_offset_ms(claims: &Claims, now: DateTime<Utc>) -> i64 {
    claims
        .exp
        .saturating_mul(1000)
        .saturating_sub(now.timestamp_millis())
        .saturating_sub(REFRESH_LEAD_MS)
}

/// How long to wait before refreshing `token`, clamped at zero so an
/// expired or nearly expired token refreshes immediately.
pub fn refresh_delay(token: &str, now: DateTime<Utc>) -> Result<Duration, TokenError> {
    let claims = decode_claims(token)?;
    let offset = refresh_offset_ms(&claims, now).max(0);
    Ok(Duration::from_millis(offset as u64))
}
