// Credential source for the push connection and the HTTP fallback.
//
// Token storage and refresh belong to the host application; the sync core
// only asks for the current bearer value. The token is read once per connect
// (a rotation therefore requires a reconnect) and once per fallback request.

use std::sync::Arc;

use crate::error::SyncError;

/// Supplies the current bearer credential on demand.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Result<String, SyncError>;
}

/// Fixed-token provider for tests and tooling.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn bearer_token(&self) -> Result<String, SyncError> {
        Ok(self.token.clone())
    }
}

impl<T: TokenProvider + ?Sized> TokenProvider for Arc<T> {
    fn bearer_token(&self) -> Result<String, SyncError> {
        (**self).bearer_token()
    }
}
