//! API client for communicating with the community REST backend.
//!
//! Every call goes through the same pipeline: request interceptors (bearer
//! token), send, response interceptors (401 purge), status check, decode.

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use super::interceptor::{
    BearerAuth, PurgeOnUnauthorized, RequestInterceptor, ResponseInterceptor, ResponseMeta,
};
use super::ApiError;
use crate::auth::{CredentialStore, ACCESS_TOKEN_KEY};
use crate::models::{
    ActionResponse, Comment, CommentRequest, CountResponse, ImageUpload, LoginRequest,
    LoginResponse, Post, PostPage, PostRequest, ProfileImageRequest, RegisterRequest,
    UploadResponse, UserProfile, UserStats,
};

// ============================================================================
// Constants
// ============================================================================

/// Base URL used when nothing is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// HTTP request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// First page of `GET /posts` (pages are 1-based)
pub const DEFAULT_PAGE: u32 = 1;

/// Posts per page when the caller does not choose
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Upload folder the backend uses for post images
pub const DEFAULT_UPLOAD_FOLDER: &str = "images";

/// API client for the community backend.
/// Clone is cheap - reqwest::Client and the interceptor lists are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    request_interceptors: Arc<[Arc<dyn RequestInterceptor>]>,
    response_interceptors: Arc<[Arc<dyn ResponseInterceptor>]>,
}

/// Configures an `ApiClient`.
///
/// `BearerAuth` and `PurgeOnUnauthorized` are always installed first; extra
/// stages run after them in the order they were added.
pub struct ApiClientBuilder {
    base_url: String,
    timeout: Duration,
    store: Arc<dyn CredentialStore>,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl ApiClientBuilder {
    pub fn new(base_url: impl Into<String>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            store,
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn request_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.request_interceptors.push(interceptor);
        self
    }

    pub fn response_interceptor(mut self, interceptor: Arc<dyn ResponseInterceptor>) -> Self {
        self.response_interceptors.push(interceptor);
        self
    }

    pub fn store(&self) -> Arc<dyn CredentialStore> {
        self.store.clone()
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(self.timeout)
            .default_headers(default_headers)
            .build()?;

        let mut request_interceptors: Vec<Arc<dyn RequestInterceptor>> =
            vec![Arc::new(BearerAuth::new(self.store.clone()))];
        request_interceptors.extend(self.request_interceptors);

        let mut response_interceptors: Vec<Arc<dyn ResponseInterceptor>> =
            vec![Arc::new(PurgeOnUnauthorized::new(self.store.clone()))];
        response_interceptors.extend(self.response_interceptors);

        Ok(ApiClient {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            store: self.store,
            request_interceptors: request_interceptors.into(),
            response_interceptors: response_interceptors.into(),
        })
    }
}

impl ApiClient {
    /// Create a client with the default timeout and interceptors
    pub fn new(base_url: impl Into<String>, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        ApiClientBuilder::new(base_url, store).build()
    }

    pub fn builder(base_url: impl Into<String>, store: Arc<dyn CredentialStore>) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url, store)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The credential store the interceptors read from and purge
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Run the full pipeline for one request
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let mut request = builder.build()?;
        for interceptor in self.request_interceptors.iter() {
            interceptor.on_request(&mut request).await?;
        }

        let method = request.method().clone();
        let path = request.url().path().to_string();
        debug!(%method, path = %path, "Sending request");

        let response = self.client.execute(request).await?;

        let meta = ResponseMeta {
            status: response.status(),
            url: response.url().clone(),
            headers: response.headers().clone(),
        };
        debug!(%method, path = %path, status = meta.status.as_u16(), "Response received");

        let mut first_error = None;
        for interceptor in self.response_interceptors.iter() {
            if let Err(e) = interceptor.on_response(&meta).await {
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        Self::check_response(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let path = response.url().path().to_string();
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        Self::parse_json(response).await
    }

    async fn send_json<T, B>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(self.request(method, path).json(body)).await?;
        Self::parse_json(response).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::DELETE, path)).await?;
        Self::parse_json(response).await
    }

    // ===== Auth =====

    /// Create an account. Does not log in.
    pub async fn register(&self, request: &RegisterRequest) -> Result<ActionResponse, ApiError> {
        self.send_json(Method::POST, "/auth/register", request).await
    }

    /// Log in; on success the issued token is persisted before returning
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let response: LoginResponse = self.send_json(Method::POST, "/auth/login", request).await?;
        if let Some(token) = response.issued_token() {
            self.store.set(ACCESS_TOKEN_KEY, token).await?;
            info!(username = %request.username, "Access token stored");
        } else {
            debug!(username = %request.username, "Login rejected by server");
        }
        Ok(response)
    }

    pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
        self.get("/auth/me").await
    }

    /// Clear stored credentials.
    ///
    /// Tokens are stateless on the backend and it has no logout route, so
    /// nothing is sent.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.store.clear().await?;
        info!("Stored credentials cleared");
        Ok(())
    }

    // ===== Posts =====

    pub async fn list_posts(&self, page: u32, size: u32) -> Result<PostPage, ApiError> {
        let builder = self
            .request(Method::GET, "/posts")
            .query(&[("page", page), ("size", size)]);
        let response = self.send(builder).await?;
        Self::parse_json(response).await
    }

    pub async fn get_post(&self, post_id: i64) -> Result<Post, ApiError> {
        self.get(&format!("/posts/{}", post_id)).await
    }

    pub async fn create_post(&self, request: &PostRequest) -> Result<ActionResponse, ApiError> {
        self.send_json(Method::POST, "/posts", request).await
    }

    pub async fn update_post(
        &self,
        post_id: i64,
        request: &PostRequest,
    ) -> Result<ActionResponse, ApiError> {
        self.send_json(Method::PUT, &format!("/posts/{}", post_id), request)
            .await
    }

    pub async fn delete_post(&self, post_id: i64) -> Result<ActionResponse, ApiError> {
        self.delete(&format!("/posts/{}", post_id)).await
    }

    // ===== Comments =====

    pub async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, ApiError> {
        self.get(&format!("/posts/{}/comments", post_id)).await
    }

    pub async fn create_comment(
        &self,
        post_id: i64,
        request: &CommentRequest,
    ) -> Result<ActionResponse, ApiError> {
        self.send_json(Method::POST, &format!("/posts/{}/comments", post_id), request)
            .await
    }

    pub async fn update_comment(
        &self,
        comment_id: i64,
        request: &CommentRequest,
    ) -> Result<ActionResponse, ApiError> {
        self.send_json(Method::PUT, &format!("/comments/{}", comment_id), request)
            .await
    }

    pub async fn delete_comment(&self, comment_id: i64) -> Result<ActionResponse, ApiError> {
        self.delete(&format!("/comments/{}", comment_id)).await
    }

    // ===== Users =====

    pub async fn user_posts(&self, user_id: i64) -> Result<Vec<Post>, ApiError> {
        self.get(&format!("/users/{}/posts", user_id)).await
    }

    pub async fn user_comments(&self, user_id: i64) -> Result<Vec<Comment>, ApiError> {
        self.get(&format!("/users/{}/comments", user_id)).await
    }

    pub async fn user_post_count(&self, user_id: i64) -> Result<i64, ApiError> {
        let response: CountResponse = self.get(&format!("/users/{}/posts/count", user_id)).await?;
        Ok(response.count)
    }

    pub async fn user_comment_count(&self, user_id: i64) -> Result<i64, ApiError> {
        let response: CountResponse = self
            .get(&format!("/users/{}/comments/count", user_id))
            .await?;
        Ok(response.count)
    }

    /// Fetch both profile counters concurrently
    pub async fn user_stats(&self, user_id: i64) -> Result<UserStats, ApiError> {
        let (post_count, comment_count) = futures::future::try_join(
            self.user_post_count(user_id),
            self.user_comment_count(user_id),
        )
        .await?;
        Ok(UserStats {
            post_count,
            comment_count,
        })
    }

    /// Point the logged-in user's avatar at an already-uploaded image
    pub async fn update_profile_image(&self, profile_image_url: &str) -> Result<(), ApiError> {
        let body = ProfileImageRequest {
            profile_image_url: profile_image_url.to_string(),
        };
        self.send(self.request(Method::PUT, "/users/profile-image").json(&body))
            .await?;
        Ok(())
    }

    // ===== Uploads =====

    /// Upload image bytes as multipart form data and return the hosted URL
    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        folder: &str,
    ) -> Result<ImageUpload, ApiError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(image_mime_type(file_name))?;
        let form = Form::new()
            .part("file", part)
            .text("folder", folder.to_string());

        let response = self
            .send(self.request(Method::POST, "/upload/image").multipart(form))
            .await?;
        let upload: UploadResponse = Self::parse_json(response).await?;

        match upload.data {
            Some(data) if upload.success => Ok(data),
            _ => Err(ApiError::InvalidResponse(
                upload
                    .message
                    .unwrap_or_else(|| "Upload response carried no image".to_string()),
            )),
        }
    }
}

/// Guess an image MIME type from the file extension
fn image_mime_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}
