use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::utils::truncate_string;

/// Characters of content shown in list previews
const PREVIEW_LENGTH: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub user_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub view_count: i64,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub user_nickname: Option<String>,
    pub user_profile_image_url: Option<String>,
}

impl Post {
    pub fn is_authored_by(&self, user_id: Option<i64>) -> bool {
        matches!((self.user_id, user_id), (Some(a), Some(b)) if a == b)
    }

    /// Single-line content preview for list rows
    pub fn preview(&self) -> String {
        let flat = self.content.split_whitespace().collect::<Vec<_>>().join(" ");
        truncate_string(&flat, PREVIEW_LENGTH)
    }

    pub fn author_display(&self) -> &str {
        self.user_nickname.as_deref().unwrap_or("Unknown")
    }
}

/// One page of `GET /posts`.
/// A missing `list` is an empty page and a missing `hasNextPage` ends paging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    #[serde(default)]
    pub list: Vec<Post>,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub page_num: i64,
    #[serde(default)]
    pub page_size: i64,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub pages: i64,
}

impl PostPage {
    /// Page number to request next, if there is one
    pub fn next_page(&self) -> Option<u32> {
        if self.has_next_page {
            u32::try_from(self.page_num).ok().map(|p| p.max(1) + 1)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct PostRequest {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl PostRequest {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            image_url: None,
        }
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}
