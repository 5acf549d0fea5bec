//! Core library for the community forum client.
//!
//! This crate holds everything a front end needs to talk to the community
//! REST service:
//!
//! - `api`: the `ApiClient` with its request/response interceptor pipeline
//! - `auth`: credential persistence and the `SessionManager` state machine
//! - `models`: request and response bodies for users, posts and comments
//! - `validation`: client-side checks for the login, register and post forms
//! - `config`: base URL, timeout and storage backend selection
//! - `utils`: display formatting helpers

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;
pub mod validation;

pub use api::{ApiClient, ApiClientBuilder, ApiError};
pub use auth::{
    AuthOutcome, AuthPhase, CredentialStore, FileStore, KeyringStore, MemoryStore, SessionManager,
    SessionState, StoreError,
};
pub use config::{Config, StoreBackend};
