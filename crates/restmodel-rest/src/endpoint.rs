//! Transport-neutral endpoints: method gating, error recovery, response
//! serialization.

use std::pin::Pin;
use std::sync::Arc;

use asupersync::Outcome;
use restmodel_core::Error;

use crate::error::{META_FIELD, RestError};
use crate::request::ApiRequest;
use crate::schema::Schema;
use crate::validator::{HookContext, HookMode, Validator};

/// Status and JSON body an outer transport can ship as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ApiResponse {
    #[must_use]
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

/// Boxed future returned by an endpoint handler.
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Outcome<ApiResponse, RestError>> + Send + 'static>>;

type Handler = Arc<dyn Fn(ApiRequest) -> HandlerFuture + Send + Sync>;

/// Parse a request body as JSON.
///
/// Absent and malformed bodies fail the same way, as a field error on the
/// meta key.
pub fn clean_request_body(request: &ApiRequest) -> Result<serde_json::Value, RestError> {
    let invalid = || RestError::field(META_FIELD, "Invalid body json data");
    let raw = request.body.as_deref().ok_or_else(invalid)?;
    serde_json::from_str(raw).map_err(|_| invalid())
}

/// Typed query parameters for a request, guided by a schema.
#[must_use]
pub fn clean_request_params(schema: &Schema, request: &ApiRequest) -> serde_json::Value {
    crate::cleaners::clean_params(schema, &request.query)
}

/// One routable operation.
///
/// The handler speaks [`RestError`]; dispatch recovers every recoverable
/// kind into a response and re-raises wrapped engine errors, so transports
/// only ever see clean responses or genuine failures.
pub struct Endpoint {
    methods: Vec<String>,
    handler: Handler,
    response_validator: Option<Arc<Validator>>,
}

impl Endpoint {
    pub fn new<F, Fut>(methods: impl IntoIterator<Item = &'static str>, handler: F) -> Self
    where
        F: Fn(ApiRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<ApiResponse, RestError>> + Send + 'static,
    {
        Self {
            methods: methods.into_iter().map(str::to_uppercase).collect(),
            handler: Arc::new(move |request| Box::pin(handler(request)) as HandlerFuture),
            response_validator: None,
        }
    }

    /// Run successful response bodies through a validator's serialize hooks
    /// and check them against its schema before they leave.
    #[must_use]
    pub fn serialize_with(mut self, validator: Validator) -> Self {
        self.response_validator = Some(Arc::new(validator));
        self
    }

    #[must_use]
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    async fn serialize_response(
        &self,
        validator: &Validator,
        request: &ApiRequest,
        body: serde_json::Value,
    ) -> Outcome<serde_json::Value, RestError> {
        let context = HookContext {
            request: request.clone(),
            root: body.clone(),
        };
        let check = |value: &serde_json::Value| {
            validator
                .validate(value)
                .map_err(|err| RestError::not_acceptable(err.errors().clone()))
        };
        // A results envelope is serialized element-wise; anything else is
        // treated as one payload.
        if let serde_json::Value::Object(mut map) = body {
            if let Some(serde_json::Value::Array(items)) = map.remove("results") {
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    let item = match validator.enrich(HookMode::Serialize, item, &context).await {
                        Outcome::Ok(item) => item,
                        Outcome::Err(err) => return Outcome::Err(err),
                        Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
                        Outcome::Panicked(payload) => return Outcome::Panicked(payload),
                    };
                    if let Err(err) = check(&item) {
                        return Outcome::Err(err);
                    }
                    rendered.push(item);
                }
                map.insert("results".to_string(), serde_json::Value::Array(rendered));
                return Outcome::Ok(serde_json::Value::Object(map));
            }
            let body = serde_json::Value::Object(map);
            let enriched = match validator.enrich(HookMode::Serialize, body, &context).await {
                Outcome::Ok(enriched) => enriched,
                Outcome::Err(err) => return Outcome::Err(err),
                Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
                Outcome::Panicked(payload) => return Outcome::Panicked(payload),
            };
            if let Err(err) = check(&enriched) {
                return Outcome::Err(err);
            }
            return Outcome::Ok(enriched);
        }
        Outcome::Ok(body)
    }

    /// Serve one request.
    ///
    /// Recoverable [`RestError`]s become responses with their status and
    /// field-keyed body; wrapped engine errors are re-raised for the caller
    /// to handle as real failures.
    #[tracing::instrument(level = "debug", skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn dispatch(&self, request: ApiRequest) -> Outcome<ApiResponse, Error> {
        let outcome = if self.methods.iter().any(|m| *m == request.method) {
            let mut outcome = (self.handler)(request.clone()).await;
            if let (Outcome::Ok(response), Some(validator)) =
                (&mut outcome, &self.response_validator)
            {
                match self
                    .serialize_response(validator, &request, response.body.clone())
                    .await
                {
                    Outcome::Ok(body) => response.body = body,
                    Outcome::Err(err) => outcome = Outcome::Err(err),
                    Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
                    Outcome::Panicked(payload) => return Outcome::Panicked(payload),
                }
            }
            outcome
        } else {
            Outcome::Err(RestError::method_not_allowed())
        };
        match outcome {
            Outcome::Ok(response) => Outcome::Ok(response),
            Outcome::Err(err) => match err.into_internal() {
                Ok(engine_err) => Outcome::Err(engine_err),
                Err(rest) => Outcome::Ok(ApiResponse {
                    status: rest.status(),
                    body: rest.to_body(),
                }),
            },
            Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
            Outcome::Panicked(payload) => Outcome::Panicked(payload),
        }
    }
}
