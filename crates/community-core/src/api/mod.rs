//! REST API client module for the community backend.
//!
//! This module provides the `ApiClient` with typed methods for every
//! endpoint under `/api`, and the interceptor stages it runs around each
//! request.
//!
//! The API uses bearer token authentication. The token is read from the
//! credential store on every request, and a 401 from any endpoint purges
//! the stored credentials.

pub mod client;
pub mod error;
pub mod interceptor;

pub use client::{ApiClient, ApiClientBuilder, DEFAULT_PAGE, DEFAULT_PAGE_SIZE, DEFAULT_UPLOAD_FOLDER};
pub use error::ApiError;
pub use interceptor::{
    BearerAuth, PurgeOnUnauthorized, RequestInterceptor, ResponseInterceptor, ResponseMeta,
};
