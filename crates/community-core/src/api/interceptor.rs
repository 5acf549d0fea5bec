//! Request/response pipeline stages run by `ApiClient` around every call.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Request, StatusCode, Url};
use tracing::{debug, error, info};

use super::ApiError;
use crate::auth::{CredentialStore, ACCESS_TOKEN_KEY};

/// Status line and headers of a received response, handed to response stages
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub url: Url,
    pub headers: HeaderMap,
}

/// Runs on every outgoing request before it is sent.
/// Returning an error aborts the request.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn on_request(&self, request: &mut Request) -> Result<(), ApiError>;
}

/// Runs on every received response before its status is checked.
/// All stages run; the first error replaces the call's result.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn on_response(&self, response: &ResponseMeta) -> Result<(), ApiError>;
}

/// Attaches `Authorization: Bearer <token>` from the credential store.
///
/// The token is read on every request, so a login or logout between calls
/// takes effect immediately.
pub struct BearerAuth {
    store: Arc<dyn CredentialStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RequestInterceptor for BearerAuth {
    async fn on_request(&self, request: &mut Request) -> Result<(), ApiError> {
        let token = self.store.get(ACCESS_TOKEN_KEY).await?;
        let headers = request.headers_mut();
        match token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| ApiError::InvalidToken)?;
                value.set_sensitive(true);
                headers.insert(header::AUTHORIZATION, value);
            }
            None => {
                headers.remove(header::AUTHORIZATION);
            }
        }
        Ok(())
    }
}

/// Clears the stored token and cached profile whenever the server answers 401.
pub struct PurgeOnUnauthorized {
    store: Arc<dyn CredentialStore>,
}

impl PurgeOnUnauthorized {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResponseInterceptor for PurgeOnUnauthorized {
    async fn on_response(&self, response: &ResponseMeta) -> Result<(), ApiError> {
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(());
        }

        info!(path = response.url.path(), "Unauthorized response, purging stored credentials");
        if let Err(e) = self.store.clear().await {
            error!(error = %e, "Failed to purge credentials after 401");
            return Err(e.into());
        }
        debug!("Stored credentials purged");
        Ok(())
    }
}
