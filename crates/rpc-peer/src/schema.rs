use std::collections::HashMap;
use std::fmt;

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

/// The issues a [`Validator`] reports when rejecting a value. Carried as the
/// `data` payload of `ErrorMsg(InvalidParams | ValidationError, ...)` frames.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationIssues(pub Vec<String>);

impl fmt::Display for ValidationIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("; "))
    }
}

impl From<Vec<String>> for ValidationIssues {
    fn from(issues: Vec<String>) -> Self {
        ValidationIssues(issues)
    }
}

/// A schema validator for one method input/output or event data shape.
///
/// The schema DSL itself is external to this crate, treated as an opaque
/// collaborator; this trait is the boundary a concrete validator
/// — e.g. a `jsonschema`-backed one — plugs into.
pub trait Validator: Send + Sync {
    /// Validates `value`, returning a (possibly normalized) copy on success.
    fn validate(&self, value: Value) -> Result<Value, ValidationIssues>;
}

/// A validator that accepts anything unchanged. Useful for methods/events
/// with no declared shape, and in tests.
pub struct AnyValidator;

impl Validator for AnyValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationIssues> {
        Ok(value)
    }
}

/// The reference `Validator` backed by a compiled JSON Schema document.
/// Validation never normalizes the instance (JSON Schema draft 2020-12 has
/// no notion of "the validated copy differs from the input"), so success
/// always returns `value` unchanged.
pub struct JsonSchemaValidator {
    compiled: JSONSchema,
}

impl JsonSchemaValidator {
    /// Compiles `schema` against JSON Schema draft 2020-12. Returns the
    /// compiler's error message on a malformed schema document.
    pub fn compile(schema: Value) -> Result<Self, String> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft202012)
            .compile(&schema)
            .map_err(|err| err.to_string())?;
        Ok(Self { compiled })
    }
}

impl Validator for JsonSchemaValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationIssues> {
        match self.compiled.validate(&value) {
            Ok(()) => Ok(value),
            Err(errors) => {
                let issues = errors
                    .map(|err| {
                        let pointer = err.instance_path.to_string();
                        if pointer.is_empty() {
                            err.to_string()
                        } else {
                            format!("{pointer}: {err}")
                        }
                    })
                    .collect();
                Err(ValidationIssues(issues))
            }
        }
    }
}

/// One method's declared input and output validators.
pub struct MethodSchema {
    pub input: Box<dyn Validator>,
    pub output: Box<dyn Validator>,
}

/// The pair of mappings a `Peer` consults at each call edge: `methods` for
/// request/response traffic, `events` for fire-and-forget notifications.
#[derive(Default)]
pub struct Schema {
    methods: HashMap<String, MethodSchema>,
    events: HashMap<String, Box<dyn Validator>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(
        mut self,
        name: impl Into<String>,
        input: impl Validator + 'static,
        output: impl Validator + 'static,
    ) -> Self {
        self.methods.insert(
            name.into(),
            MethodSchema {
                input: Box::new(input),
                output: Box::new(output),
            },
        );
        self
    }

    pub fn with_event(mut self, name: impl Into<String>, data: impl Validator + 'static) -> Self {
        self.events.insert(name.into(), Box::new(data));
        self
    }

    pub fn method(&self, name: &str) -> Option<&MethodSchema> {
        self.methods.get(name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn event(&self, name: &str) -> Option<&dyn Validator> {
        self.events.get(name).map(|v| v.as_ref())
    }
}
