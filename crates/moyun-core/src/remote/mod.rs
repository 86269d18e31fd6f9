//! Remote store client.
//!
//! The remote side is a path-addressed JSON tree. A [`RemoteTransport`] moves
//! values to and from absolute paths; [`RemoteStore`] scopes every path to the
//! signed-in user and turns into a no-op while nobody is signed in.

mod http;
mod memory;
pub mod paths;

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use thiserror::Error;

pub use http::HttpTransport;
pub use memory::{InjectedFailure, MemoryTransport};

/// Errors raised by a remote transport
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Permission denied for {0}")]
    PermissionDenied(String),
    /// Built without the request URL, which carries the auth token
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),
    #[error("Remote API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Invalid remote path: {0}")]
    InvalidPath(String),
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Moves JSON values to and from absolute paths of a remote tree.
///
/// Reading a path that holds nothing yields `Ok(None)`; deleting a missing
/// path succeeds.
pub trait RemoteTransport: Send + Sync {
    fn get(&self, path: &str) -> impl Future<Output = RemoteResult<Option<Value>>> + Send;

    fn put(&self, path: &str, value: &Value) -> impl Future<Output = RemoteResult<()>> + Send;

    fn delete(&self, path: &str) -> impl Future<Output = RemoteResult<()>> + Send;
}

/// Yields the stable id of the signed-in user, if any
pub trait AuthProvider: Send + Sync {
    fn user_id(&self) -> Option<String>;
}

/// In-process session holding the current user id
#[derive(Default)]
pub struct SessionAuth {
    user_id: RwLock<Option<String>>,
}

impl SessionAuth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let auth = Self::new();
        auth.sign_in(user_id);
        auth
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into().trim().to_string();
        let mut guard = self.user_id.write().unwrap_or_else(PoisonError::into_inner);
        *guard = (!user_id.is_empty()).then_some(user_id);
    }

    pub fn sign_out(&self) {
        let mut guard = self.user_id.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }
}

impl AuthProvider for SessionAuth {
    fn user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for SessionAuth {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionAuth")
            .field("user_id", &self.user_id())
            .finish()
    }
}

/// User-scoped view over a transport
pub struct RemoteStore<T> {
    transport: Arc<T>,
    auth: Arc<dyn AuthProvider>,
}

impl<T> Clone for RemoteStore<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            auth: Arc::clone(&self.auth),
        }
    }
}

impl<T: RemoteTransport> RemoteStore<T> {
    pub fn new(transport: Arc<T>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { transport, auth }
    }

    /// Current user id, if signed in.
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.auth.user_id().filter(|id| !id.trim().is_empty())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_some()
    }

    /// Read a user-relative path; `Ok(None)` when signed out or absent.
    pub async fn read(&self, path: &str) -> RemoteResult<Option<Value>> {
        let Some(full_path) = self.scoped(path)? else {
            return Ok(None);
        };
        let value = self.transport.get(&full_path).await?;
        Ok(value.filter(|value| !value.is_null()))
    }

    /// Write a user-relative path; `Ok(false)` when signed out.
    pub async fn write(&self, path: &str, value: &Value) -> RemoteResult<bool> {
        let Some(full_path) = self.scoped(path)? else {
            return Ok(false);
        };
        self.transport.put(&full_path, value).await?;
        Ok(true)
    }

    /// Delete a user-relative path; `Ok(false)` when signed out.
    pub async fn delete(&self, path: &str) -> RemoteResult<bool> {
        let Some(full_path) = self.scoped(path)? else {
            return Ok(false);
        };
        self.transport.delete(&full_path).await?;
        Ok(true)
    }

    fn scoped(&self, path: &str) -> RemoteResult<Option<String>> {
        let Some(user_id) = self.user_id() else {
            return Ok(None);
        };
        paths::validate(path)?;
        paths::validate_segment(&user_id)?;
        Ok(Some(format!("users/{user_id}/{path}")))
    }
}
