use serde::{Deserialize, Serialize};

/// Envelope returned by register and the post/comment mutations.
/// The id fields are only present on the endpoints that create things.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub user_id: Option<i64>,
    pub post_id: Option<i64>,
    pub comment_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    pub token: Option<String>,
    pub token_type: Option<String>,
    pub message: Option<String>,
}

impl LoginResponse {
    /// The issued token, only when the backend reported success
    pub fn issued_token(&self) -> Option<&str> {
        if self.success {
            self.token.as_deref().filter(|t| !t.is_empty())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct CountResponse {
    #[serde(default)]
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileImageRequest {
    pub profile_image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ImageUpload {
    pub image_url: String,
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: i64,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<ImageUpload>,
}
