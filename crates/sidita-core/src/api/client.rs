//! HTTP client for the account API.
//!
//! `ApiClient` owns the connection pool and the cookie jar that carries the
//! server-issued refresh cookie. It knows nothing about sessions; callers
//! pass the bearer token for each request.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::cookie::Jar;
use reqwest::{header, Client, Method, RequestBuilder, Url};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// API client for the account service.
/// Clone is cheap - reqwest::Client and the cookie jar are both behind Arcs.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    cookies: Arc<Jar>,
}

impl ApiClient {
    /// Create a client rooted at `base_url` (e.g. `https://example.com/accounts`)
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid API base URL: {}", base_url))?;
        let cookies = Arc::new(Jar::default());

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .cookie_provider(Arc::clone(&cookies))
            .build()?;

        Ok(Self {
            client,
            base_url,
            cookies,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Host of the API base URL, used as the default cookie domain
    pub fn host(&self) -> Option<&str> {
        self.base_url.host_str()
    }

    /// Seed the cookie jar, as a browser would replay a stored cookie
    pub fn add_cookie(&self, set_cookie: &str) {
        self.cookies.add_cookie_str(set_cookie, &self.base_url);
    }

    /// Absolute URL for an endpoint path. An empty path is the collection root.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str, bearer: Option<&str>) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.endpoint(path))
            .header(header::ACCEPT, "application/json");
        match bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send the request and decode its JSON body. An empty body decodes as
    /// `null`, so `T` may be `Value` or `Option<_>` for endpoints that return
    /// nothing.
    async fn execute<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        method: &Method,
        path: &str,
    ) -> Result<T, ApiError> {
        debug!(%method, path, "Sending API request");

        let response = builder.send().await?;
        let response = Self::check_response(response).await?;
        let text = response.text().await?;

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                ApiError::InvalidResponse(format!("{} {}: {}", method, path, e))
            })?
        };

        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("{} {}: {}", method, path, e)))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Option<&str>,
    ) -> Result<T, ApiError> {
        let builder = self.request(Method::GET, path, bearer);
        self.execute(builder, &Method::GET, path).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> Result<T, ApiError> {
        let builder = self.request(Method::POST, path, bearer).json(body);
        self.execute(builder, &Method::POST, path).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> Result<T, ApiError> {
        let builder = self.request(Method::PUT, path, bearer).json(body);
        self.execute(builder, &Method::PUT, path).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Option<&str>,
    ) -> Result<T, ApiError> {
        let builder = self.request(Method::DELETE, path, bearer);
        self.execute(builder, &Method::DELETE, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_and_path() {
        let client = ApiClient::new("https://example.com/accounts/").unwrap();
        assert_eq!(
            client.endpoint("/auth/authenticate"),
            "https://example.com/accounts/auth/authenticate"
        );
        assert_eq!(client.endpoint(""), "https://example.com/accounts");
        assert_eq!(client.endpoint("/42"), "https://example.com/accounts/42");
    }

    #[test]
    fn test_host() {
        let client = ApiClient::new("http://127.0.0.1:4000").unwrap();
        assert_eq!(client.host(), Some("127.0.0.1"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
