//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `CredentialStore`: durable key-value storage for the access token and
//!   the cached user profile, with file, keyring and in-memory backends
//! - `SessionManager`: the login/logout/restore state machine that owns the
//!   in-memory `SessionState`
//!
//! Exactly two keys are persisted: `accessToken` and `user`.

pub mod credentials;
pub mod keychain;
pub mod session;

pub use keychain::KeyringStore;
pub use credentials::{CredentialStore, FileStore, MemoryStore, StoreError, ACCESS_TOKEN_KEY, USER_KEY};
pub use session::{AuthOutcome, AuthPhase, SessionManager, SessionState};
