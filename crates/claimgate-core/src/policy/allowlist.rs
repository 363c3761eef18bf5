//! Allowlist schema validator.
//!
//! Evaluates a claim envelope against a JSON Schema-style document of the
//! shape the registration-policy docs describe:
//!
//! ```json
//! {
//!     "type": "object",
//!     "properties": {
//!         "issuer": {"enum": ["did:web:example.org"], "type": "string"}
//!     },
//!     "required": ["issuer"]
//! }
//! ```
//!
//! Supported keywords are `required` at the top level and `enum` / `type`
//! per property. Diagnostics are rendered in the upstream jsonschema
//! validator's report format so the denial detail a submitter retrieves is
//! byte-for-byte what that tool would have printed: the violation message,
//! the failing sub-schema, and the offending instance value, with the
//! sub-schema shown as a Python-repr dict preserving the schema file's key
//! order.

use std::fs;

use serde_json::Value;

use super::{SchemaRef, ValidationOutcome, Validator, ValidatorError};

/// Validator enforcing an issuer-allowlist schema document.
///
/// The schema is re-read on every check, matching the one-shot validator
/// invocation this stage replaces; operators can therefore swap the policy
/// file without restarting the engine.
#[derive(Debug, Default, Clone)]
pub struct AllowlistValidator;

impl AllowlistValidator {
    /// Creates a new allowlist validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn load_schema(schema: &SchemaRef) -> Result<Value, ValidatorError> {
        let bytes = fs::read(schema.path()).map_err(|source| ValidatorError::SchemaRead {
            path: schema.path().to_path_buf(),
            source,
        })?;
        let doc: Value =
            serde_json::from_slice(&bytes).map_err(|err| ValidatorError::SchemaParse {
                path: schema.path().to_path_buf(),
                detail: err.to_string(),
            })?;
        if !doc.is_object() {
            return Err(ValidatorError::SchemaParse {
                path: schema.path().to_path_buf(),
                detail: "top-level schema must be an object".to_string(),
            });
        }
        Ok(doc)
    }
}

impl Validator for AllowlistValidator {
    fn check(&self, claim: &[u8], schema: &SchemaRef) -> Result<ValidationOutcome, ValidatorError> {
        let schema_doc = Self::load_schema(schema)?;

        // An unparseable claim can never satisfy the schema, and retrying
        // will not change that: it fails validation outright, with the
        // parse error as the diagnostic, rather than lingering pending.
        let instance: Value = match serde_json::from_slice(claim) {
            Ok(instance) => instance,
            Err(err) => {
                return Ok(ValidationOutcome::fail(format!(
                    "claim envelope is not valid JSON: {err}\n"
                )));
            },
        };
        let Some(instance_obj) = instance.as_object() else {
            return Ok(ValidationOutcome::fail(format!(
                "claim envelope must be a JSON object, got {}\n",
                py_repr(&instance)
            )));
        };

        if let Some(required) = schema_doc.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !instance_obj.contains_key(name) {
                    return Ok(ValidationOutcome::fail(render_schema_violation(
                        &format!("'{name}' is a required property"),
                        "required",
                        &schema_doc,
                        &instance,
                    )));
                }
            }
        }

        if let Some(properties) = schema_doc.get("properties").and_then(Value::as_object) {
            for (field, subschema) in properties {
                let Some(value) = instance_obj.get(field) else {
                    continue;
                };

                if let Some(expected) = subschema.get("type").and_then(Value::as_str) {
                    if !type_matches(value, expected) {
                        return Ok(ValidationOutcome::fail(render_property_violation(
                            &format!("{} is not of type '{expected}'", py_repr(value)),
                            "type",
                            field,
                            subschema,
                            value,
                        )));
                    }
                }

                if let Some(enum_value) = subschema.get("enum") {
                    let allowed = enum_value.as_array();
                    if allowed.is_some_and(|allowed| !allowed.contains(value)) {
                        return Ok(ValidationOutcome::fail(render_property_violation(
                            &format!(
                                "{} is not one of {}",
                                py_repr(value),
                                py_repr(enum_value),
                            ),
                            "enum",
                            field,
                            subschema,
                            value,
                        )));
                    }
                }
            }
        }

        Ok(ValidationOutcome::pass())
    }
}

/// Whether a JSON value satisfies a JSON Schema primitive `type` keyword.
fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "null" => value.is_null(),
        _ => false,
    }
}

/// Renders a violation of a per-property keyword.
fn render_property_violation(
    message: &str,
    keyword: &str,
    field: &str,
    subschema: &Value,
    value: &Value,
) -> String {
    format!(
        "{message}\n\nFailed validating '{keyword}' in schema['properties']['{field}']:\n    \
         {}\n\nOn instance['{field}']:\n    {}\n",
        py_repr(subschema),
        py_repr(value),
    )
}

/// Renders a violation of a top-level keyword (`required`).
fn render_schema_violation(
    message: &str,
    keyword: &str,
    schema_doc: &Value,
    instance: &Value,
) -> String {
    format!(
        "{message}\n\nFailed validating '{keyword}' in schema:\n    {}\n\nOn instance:\n    {}\n",
        py_repr(schema_doc),
        py_repr(instance),
    )
}

/// Python-repr rendering of a JSON value.
///
/// Matches how the upstream report prints schema fragments: single-quoted
/// strings, `True`/`False`/`None`, dicts in key order.
fn py_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => py_repr_str(s),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(py_repr).collect();
            format!("[{}]", rendered.join(", "))
        },
        Value::Object(entries) => {
            let rendered: Vec<String> = entries
                .iter()
                .map(|(key, val)| format!("{}: {}", py_repr_str(key), py_repr(val)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        },
    }
}

/// Quote selection follows Python `repr`: single quotes by default, double
/// quotes for a string containing `'` but no `"`, escaped single quotes
/// only when both appear.
fn py_repr_str(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\");
    if escaped.contains('\'') && !escaped.contains('"') {
        format!("\"{escaped}\"")
    } else {
        let escaped = escaped.replace('\'', "\\'");
        format!("'{escaped}'")
    }
}
