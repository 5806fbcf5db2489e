//! REST bridge for RestModel entities.
//!
//! This crate closes the gap between the entity layer and an HTTP
//! framework without depending on one: transport-neutral requests and
//! responses, schema-driven validation with async enrichment hooks,
//! relation-resolving serialization, payload cleaners, offloaded
//! credential checks, and an [`Endpoint`] dispatcher that recovers
//! [`RestError`]s into responses.

pub mod auth;
pub mod cleaners;
pub mod endpoint;
pub mod error;
pub mod request;
pub mod schema;
pub mod serialize;
pub mod validator;

pub use auth::{AsyncAuth, AuthBackend, AuthUser, require_login};
pub use cleaners::{clean_db_field, clean_none_values, clean_params};
pub use endpoint::{
    ApiResponse, Endpoint, HandlerFuture, clean_request_body, clean_request_params,
};
pub use error::{META_FIELD, RestError, RestErrorKind};
pub use request::ApiRequest;
pub use schema::{FieldSchema, Schema};
pub use serialize::serialize_entity;
pub use validator::{HookContext, HookFuture, HookMode, Validator};
