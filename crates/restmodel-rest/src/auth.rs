//! Credential checks bridged through the offload pool, plus request guards.

use std::sync::Arc;

use restmodel_core::Value;
use restmodel_offload::{Affinity, ChainId, OffloadPool};

use crate::error::RestError;
use crate::request::ApiRequest;

/// The authenticated principal attached to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Value,
    pub username: String,
    pub active: bool,
}

/// A blocking credential backend.
///
/// Implementations may hit a user store or password hasher; they run on
/// offload workers, never on async task threads.
pub trait AuthBackend: Send + Sync + 'static {
    fn authenticate(&self, username: &str, password: &str) -> Option<AuthUser>;
}

/// Async front for an [`AuthBackend`], pinned to its own chain.
pub struct AsyncAuth {
    backend: Arc<dyn AuthBackend>,
    pool: Arc<OffloadPool>,
    chain: ChainId,
}

impl AsyncAuth {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, pool: Arc<OffloadPool>) -> Self {
        Self {
            backend,
            pool,
            chain: ChainId::next(),
        }
    }

    /// Check credentials without blocking the calling task.
    pub async fn authenticate(&self, username: &str, password: &str) -> Option<AuthUser> {
        let backend = Arc::clone(&self.backend);
        let username = username.to_string();
        let password = password.to_string();
        self.pool
            .spawn(Affinity::Chain(self.chain), move || {
                backend.authenticate(&username, &password)
            })
            .await
    }
}

/// Guard for endpoints requiring a signed-in user.
///
/// Anonymous requests are rejected with 401; with `require_active`,
/// deactivated users are rejected with 403.
pub fn require_login(request: &ApiRequest, require_active: bool) -> Result<&AuthUser, RestError> {
    let user = request
        .user
        .as_ref()
        .ok_or_else(|| RestError::unauthorized("User is not authenticated"))?;
    if require_active && !user.active {
        return Err(RestError::forbidden("User is not active"));
    }
    Ok(user)
}
