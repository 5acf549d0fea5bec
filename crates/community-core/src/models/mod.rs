//! Data models for the community service.
//!
//! This module contains the request and response bodies exchanged with the
//! REST backend:
//!
//! - `UserProfile`, `LoginRequest`, `RegisterRequest`: account data
//! - `Post`, `PostPage`, `PostRequest`: posts and paged listings
//! - `Comment`, `CommentRequest`, `CommentThread`: comments and reply threads
//! - `ActionResponse`, `LoginResponse`, `CountResponse`, `ImageUpload`:
//!   generic envelopes returned by mutating endpoints
//!
//! Field names are camelCase on the wire.

pub mod comment;
pub mod post;
pub mod response;
pub mod user;

pub use comment::{organize_comments, Comment, CommentRequest, CommentThread};
pub use post::{Post, PostPage, PostRequest};
pub use response::{
    ActionResponse, CountResponse, ImageUpload, LoginResponse, ProfileImageRequest, UploadResponse,
};
pub use user::{LoginRequest, RegisterRequest, UserProfile, UserStats};
