//! REST-facing errors: a status code plus a field-keyed message map.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use restmodel_core::Error;

/// Key used for errors not tied to any payload field.
pub const META_FIELD: &str = "meta";

/// Classification of a [`RestError`], mapping one-to-one onto a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestErrorKind {
    /// Request payload failed validation (400).
    Validation,
    /// No authenticated user (401).
    Unauthorized,
    /// Authenticated but not allowed (403).
    Forbidden,
    /// Addressed resource does not exist (404).
    NotFound,
    /// Endpoint does not serve this method (405).
    MethodNotAllowed,
    /// Response payload failed serialization validation (406).
    NotAcceptable,
    /// Engine failure wrapped for transport through REST plumbing (500).
    Internal,
}

impl RestErrorKind {
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::NotAcceptable => 406,
            Self::Internal => 500,
        }
    }
}

/// An error a REST boundary can turn into a response.
///
/// Every variant except `Internal` is recoverable at the boundary: the
/// dispatcher renders it as `{field: [messages]}` with the matching status.
/// `Internal` wraps an engine [`Error`] and is re-raised instead.
#[derive(Debug)]
pub struct RestError {
    kind: RestErrorKind,
    errors: BTreeMap<String, Vec<String>>,
    source: Option<Error>,
}

fn meta_map(message: impl Into<String>) -> BTreeMap<String, Vec<String>> {
    let mut errors = BTreeMap::new();
    errors.insert(META_FIELD.to_string(), vec![message.into()]);
    errors
}

impl RestError {
    #[must_use]
    pub fn validation(errors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            kind: RestErrorKind::Validation,
            errors,
            source: None,
        }
    }

    /// A validation error on a single field.
    #[must_use]
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.into(), vec![message.into()]);
        Self::validation(errors)
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            kind: RestErrorKind::Unauthorized,
            errors: meta_map(message),
            source: None,
        }
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            kind: RestErrorKind::Forbidden,
            errors: meta_map(message),
            source: None,
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: RestErrorKind::NotFound,
            errors: meta_map(message),
            source: None,
        }
    }

    #[must_use]
    pub fn method_not_allowed() -> Self {
        Self {
            kind: RestErrorKind::MethodNotAllowed,
            errors: meta_map("Method not allowed"),
            source: None,
        }
    }

    #[must_use]
    pub fn not_acceptable(errors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            kind: RestErrorKind::NotAcceptable,
            errors,
            source: None,
        }
    }

    #[must_use]
    pub fn internal(source: Error) -> Self {
        Self {
            kind: RestErrorKind::Internal,
            errors: meta_map(source.to_string()),
            source: Some(source),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> RestErrorKind {
        self.kind
    }

    #[must_use]
    pub const fn status(&self) -> u16 {
        self.kind.status()
    }

    #[must_use]
    pub const fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    /// The wrapped engine error, when this is `Internal`.
    #[must_use]
    pub fn into_internal(self) -> Result<Error, Self> {
        match self.source {
            Some(source) if self.kind == RestErrorKind::Internal => Ok(source),
            _ => Err(self),
        }
    }

    /// The `{field: [messages]}` response body.
    #[must_use]
    pub fn to_body(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (field, messages) in &self.errors {
            map.insert(
                field.clone(),
                serde_json::Value::Array(
                    messages
                        .iter()
                        .map(|m| serde_json::Value::String(m.clone()))
                        .collect(),
                ),
            );
        }
        serde_json::Value::Object(map)
    }
}

impl fmt::Display for RestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.status())?;
        let mut first = true;
        for (field, messages) in &self.errors {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl StdError for RestError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn StdError + 'static))
    }
}

impl From<Error> for RestError {
    fn from(err: Error) -> Self {
        Self::internal(err)
    }
}
