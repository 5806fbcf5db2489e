//! The transport-neutral request handed to endpoints.

use crate::auth::AuthUser;

/// One inbound request, already decoupled from any HTTP framework.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    /// Query pairs in arrival order; repeated keys are meaningful for
    /// array-typed parameters.
    pub query: Vec<(String, String)>,
    /// Raw request body, still unparsed.
    pub body: Option<String>,
    /// Authenticated user, when some outer layer resolved one.
    pub user: Option<AuthUser>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach a JSON value as the raw body.
    #[must_use]
    pub fn with_json(self, body: &serde_json::Value) -> Self {
        self.with_body(body.to_string())
    }

    #[must_use]
    pub fn with_user(mut self, user: AuthUser) -> Self {
        self.user = Some(user);
        self
    }
}
