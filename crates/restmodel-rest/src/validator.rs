//! Schema-driven payload validation and hook-driven enrichment.

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::Arc;

use asupersync::Outcome;
use restmodel_core::{matches_pattern, try_outcome};

use crate::error::{META_FIELD, RestError};
use crate::request::ApiRequest;
use crate::schema::Schema;

/// Which hook family an enrichment pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    /// Inbound payloads, after validation.
    Clean,
    /// Outbound payloads, before response validation.
    Serialize,
}

/// Context handed to every hook invocation.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub request: ApiRequest,
    /// The full payload the walk started from.
    pub root: serde_json::Value,
}

/// Boxed future returned by a field hook.
pub type HookFuture =
    Pin<Box<dyn Future<Output = Outcome<serde_json::Value, RestError>> + Send + 'static>>;

type Hook = Arc<dyn Fn(serde_json::Value, HookContext) -> HookFuture + Send + Sync>;

fn json_type_ok(expected: &str, value: &serde_json::Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn push_error(errors: &mut BTreeMap<String, Vec<String>>, field: &str, message: String) {
    errors.entry(field.to_string()).or_default().push(message);
}

fn merge_errors(into: &mut BTreeMap<String, Vec<String>>, from: BTreeMap<String, Vec<String>>) {
    for (field, messages) in from {
        into.entry(field).or_default().extend(messages);
    }
}

/// A schema plus explicitly registered field hooks and child validators.
///
/// Validation is structural: type tags, the required list, and string
/// patterns, with errors aggregated per field. Enrichment walks the same
/// shape and awaits each hook sequentially, recursing into registered
/// children behind `$ref` and array-of-`$ref` properties.
///
/// Hooks are registered per field and mode; there is no name-based
/// discovery.
pub struct Validator {
    schema: Schema,
    clean_hooks: HashMap<String, Hook>,
    serialize_hooks: HashMap<String, Hook>,
    children: HashMap<String, Validator>,
}

impl Validator {
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            clean_hooks: HashMap::new(),
            serialize_hooks: HashMap::new(),
            children: HashMap::new(),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Register an inbound hook for one field.
    ///
    /// The hook receives the current nesting level's payload and the walk
    /// context, and returns the field's replacement value.
    #[must_use]
    pub fn on_clean<F, Fut>(mut self, field: impl Into<String>, hook: F) -> Self
    where
        F: Fn(serde_json::Value, HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<serde_json::Value, RestError>> + Send + 'static,
    {
        self.clean_hooks.insert(
            field.into(),
            Arc::new(move |data, context| Box::pin(hook(data, context)) as HookFuture),
        );
        self
    }

    /// Register an outbound hook for one field.
    #[must_use]
    pub fn on_serialize<F, Fut>(mut self, field: impl Into<String>, hook: F) -> Self
    where
        F: Fn(serde_json::Value, HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<serde_json::Value, RestError>> + Send + 'static,
    {
        self.serialize_hooks.insert(
            field.into(),
            Arc::new(move |data, context| Box::pin(hook(data, context)) as HookFuture),
        );
        self
    }

    /// Register the validator for a `$ref` or array-of-`$ref` field.
    #[must_use]
    pub fn nested(mut self, field: impl Into<String>, child: Validator) -> Self {
        self.children.insert(field.into(), child);
        self
    }

    const fn hooks(&self, mode: HookMode) -> &HashMap<String, Hook> {
        match mode {
            HookMode::Clean => &self.clean_hooks,
            HookMode::Serialize => &self.serialize_hooks,
        }
    }

    fn collect_errors(
        &self,
        data: &serde_json::Value,
        errors: &mut BTreeMap<String, Vec<String>>,
    ) {
        let Some(map) = data.as_object() else {
            push_error(errors, META_FIELD, "Invalid data".to_string());
            return;
        };
        for (field, fs) in &self.schema.properties {
            let value = map.get(field);
            let missing = value.is_none_or(serde_json::Value::is_null);
            if missing {
                if self.schema.is_required(field) {
                    push_error(errors, field, "This field is required".to_string());
                }
                continue;
            }
            let value = value.unwrap_or(&serde_json::Value::Null);
            if let Some(expected) = &fs.field_type {
                if !json_type_ok(expected, value) {
                    push_error(errors, field, format!("Expected {expected} value"));
                    continue;
                }
            }
            if let Some(pattern) = &fs.pattern {
                if let Some(text) = value.as_str() {
                    if !matches_pattern(text, pattern) {
                        push_error(
                            errors,
                            field,
                            "Value does not match the expected pattern".to_string(),
                        );
                    }
                }
            }
            if fs.is_array() {
                if let (Some(child), Some(items)) = (self.children.get(field), value.as_array()) {
                    let mut child_errors = BTreeMap::new();
                    for item in items {
                        child.collect_errors(item, &mut child_errors);
                    }
                    merge_errors(errors, child_errors);
                } else if let (Some(item_schema), Some(items)) =
                    (fs.items.as_deref(), value.as_array())
                {
                    if let Some(expected) = &item_schema.field_type {
                        if items.iter().any(|item| !json_type_ok(expected, item)) {
                            push_error(
                                errors,
                                field,
                                format!("Expected every item to be a {expected} value"),
                            );
                        }
                    }
                }
            } else if fs.ref_name().is_some() {
                if let Some(child) = self.children.get(field) {
                    let mut child_errors = BTreeMap::new();
                    child.collect_errors(value, &mut child_errors);
                    merge_errors(errors, child_errors);
                }
            }
        }
    }

    /// Structurally validate a payload against the schema.
    pub fn validate(&self, data: &serde_json::Value) -> Result<(), RestError> {
        let mut errors = BTreeMap::new();
        self.collect_errors(data, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RestError::validation(errors))
        }
    }

    /// Run the registered hooks of `mode` over a payload, recursing into
    /// child validators, and return the rewritten payload.
    pub fn enrich<'a>(
        &'a self,
        mode: HookMode,
        data: serde_json::Value,
        context: &'a HookContext,
    ) -> Pin<Box<dyn Future<Output = Outcome<serde_json::Value, RestError>> + Send + 'a>> {
        Box::pin(async move {
            let mut map = match data {
                serde_json::Value::Object(map) => map,
                other => return Outcome::Ok(other),
            };
            for (field, fs) in &self.schema.properties {
                if let Some(hook) = self.hooks(mode).get(field) {
                    let level = serde_json::Value::Object(map.clone());
                    let replacement = try_outcome!(hook(level, context.clone()).await);
                    map.insert(field.clone(), replacement);
                }
                if fs.is_array() && fs.items_ref_name().is_some() {
                    if let Some(child) = self.children.get(field) {
                        let items = match map.get(field) {
                            Some(serde_json::Value::Array(items)) if !items.is_empty() => {
                                items.clone()
                            }
                            _ => continue,
                        };
                        let mut rewritten = Vec::with_capacity(items.len());
                        for item in items {
                            rewritten.push(try_outcome!(child.enrich(mode, item, context).await));
                        }
                        map.insert(field.clone(), serde_json::Value::Array(rewritten));
                    }
                } else if fs.ref_name().is_some() {
                    if let Some(child) = self.children.get(field) {
                        let nested = match map.get(field) {
                            Some(value) if value.is_object() => value.clone(),
                            _ => continue,
                        };
                        let replacement = try_outcome!(child.enrich(mode, nested, context).await);
                        map.insert(field.clone(), replacement);
                    }
                }
            }
            Outcome::Ok(serde_json::Value::Object(map))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSchema;

    fn run<T>(future: impl Future<Output = T>) -> T {
        let rt = asupersync::runtime::RuntimeBuilder::current_thread()
            .build()
            .expect("runtime");
        rt.block_on(future)
    }

    fn person_validator() -> Validator {
        let schema = Schema::default()
            .property("name", FieldSchema::typed("string").with_pattern("^[a-z]+$"))
            .property("age", FieldSchema::typed("integer"))
            .property("friend", FieldSchema::reference("Friend"))
            .property(
                "pets",
                FieldSchema::array_of(FieldSchema::reference("Pet")),
            )
            .require("name");
        let friend = Validator::new(
            Schema::default()
                .property("name", FieldSchema::typed("string"))
                .require("name"),
        );
        let pet = Validator::new(
            Schema::default()
                .property("species", FieldSchema::typed("string"))
                .require("species"),
        );
        Validator::new(schema).nested("friend", friend).nested("pets", pet)
    }

    #[test]
    fn validate_aggregates_field_errors() {
        let validator = person_validator();
        let err = validator
            .validate(&serde_json::json!({"age": "old", "name": "UPPER"}))
            .unwrap_err();
        assert_eq!(err.status(), 400);
        let body = err.to_body();
        assert_eq!(body["age"], serde_json::json!(["Expected integer value"]));
        assert_eq!(
            body["name"],
            serde_json::json!(["Value does not match the expected pattern"])
        );
    }

    #[test]
    fn missing_required_field_is_reported() {
        let validator = person_validator();
        let err = validator.validate(&serde_json::json!({})).unwrap_err();
        assert_eq!(
            err.to_body()["name"],
            serde_json::json!(["This field is required"])
        );
        // Optional fields may be absent or null.
        assert!(validator
            .validate(&serde_json::json!({"name": "ann", "age": null}))
            .is_ok());
    }

    #[test]
    fn nested_validators_check_children() {
        let validator = person_validator();
        let err = validator
            .validate(&serde_json::json!({
                "name": "ann",
                "friend": {"name": 7},
                "pets": [{"species": "cat"}, {}],
            }))
            .unwrap_err();
        let body = err.to_body();
        assert_eq!(body["name"], serde_json::json!(["Expected string value"]));
        assert_eq!(body["species"], serde_json::json!(["This field is required"]));
    }

    #[test]
    fn non_object_payloads_fail_with_a_meta_error() {
        let validator = person_validator();
        let err = validator.validate(&serde_json::json!([1, 2])).unwrap_err();
        assert_eq!(err.to_body()["meta"], serde_json::json!(["Invalid data"]));
    }

    #[test]
    fn enrich_replaces_hooked_fields_and_recurses() {
        let validator = person_validator().on_clean("name", |level, context| async move {
            let current = level["name"].as_str().unwrap_or_default().to_string();
            assert_eq!(context.request.method, "POST");
            Outcome::Ok(serde_json::json!(format!("{current}!")))
        });
        let nested_hooked = Validator::new(
            Schema::default().property("species", FieldSchema::typed("string")),
        )
        .on_clean("species", |level, _context| async move {
            let species = level["species"].as_str().unwrap_or_default().to_uppercase();
            Outcome::Ok(serde_json::json!(species))
        });
        let validator = validator.nested("pets", nested_hooked);

        let payload = serde_json::json!({
            "name": "ann",
            "pets": [{"species": "cat"}, {"species": "dog"}],
        });
        let context = HookContext {
            request: ApiRequest::new("POST", "/people"),
            root: payload.clone(),
        };
        let enriched = run(async {
            match validator.enrich(HookMode::Clean, payload, &context).await {
                Outcome::Ok(v) => v,
                other => panic!("enrich failed: {other:?}"),
            }
        });
        assert_eq!(enriched["name"], serde_json::json!("ann!"));
        assert_eq!(enriched["pets"][0]["species"], serde_json::json!("CAT"));
        assert_eq!(enriched["pets"][1]["species"], serde_json::json!("DOG"));
    }

    #[test]
    fn serialize_hooks_are_a_separate_family() {
        let validator = Validator::new(
            Schema::default().property("name", FieldSchema::typed("string")),
        )
        .on_serialize("name", |_level, _context| async {
            Outcome::Ok(serde_json::json!("serialized"))
        });
        let payload = serde_json::json!({"name": "raw"});
        let context = HookContext {
            request: ApiRequest::new("GET", "/"),
            root: payload.clone(),
        };
        let cleaned = run(async {
            match validator.enrich(HookMode::Clean, payload.clone(), &context).await {
                Outcome::Ok(v) => v,
                other => panic!("enrich failed: {other:?}"),
            }
        });
        assert_eq!(cleaned["name"], serde_json::json!("raw"));
        let serialized = run(async {
            match validator.enrich(HookMode::Serialize, payload, &context).await {
                Outcome::Ok(v) => v,
                other => panic!("enrich failed: {other:?}"),
            }
        });
        assert_eq!(serialized["name"], serde_json::json!("serialized"));
    }
}
