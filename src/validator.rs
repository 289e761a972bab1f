//! Declaration documents validated against a JSON Schema.

use serde_json::{json, Value};

use crate::error::{LoadError, SchemaError};
use crate::query::Lookup;

/// JSON Schema describing a declaration document.
pub fn declaration_schema() -> Value {
    let lookups: Vec<&str> = Lookup::ALL.iter().map(Lookup::as_str).collect();
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "additionalProperties": false,
        "required": ["resources"],
        "properties": {
            "resources": {
                "type": "object",
                "additionalProperties": { "$ref": "#/$defs/resource" }
            }
        },
        "$defs": {
            "resource": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "relationships": {
                        "type": "object",
                        "additionalProperties": { "$ref": "#/$defs/relationship" }
                    },
                    "sortable": {
                        "type": "array",
                        "items": { "type": "string" },
                        "uniqueItems": true
                    },
                    "filterable": {
                        "type": "object",
                        "additionalProperties": {
                            "type": "array",
                            "items": { "enum": lookups },
                            "uniqueItems": true
                        }
                    }
                }
            },
            "relationship": {
                "type": "object",
                "additionalProperties": false,
                "required": ["type"],
                "properties": {
                    "type": { "type": "string", "minLength": 1 },
                    "includable": { "type": "boolean" },
                    "default": { "type": "boolean" },
                    "scope": { "$ref": "#/$defs/scope" }
                }
            },
            "scope": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "filter": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "additionalProperties": false,
                            "required": ["field", "value"],
                            "properties": {
                                "field": { "type": "string" },
                                "lookup": { "enum": lookups },
                                "value": {}
                            }
                        }
                    },
                    "order": {
                        "type": "array",
                        "items": { "type": "string", "minLength": 1 }
                    }
                }
            }
        }
    })
}

/// Validate a declaration document.
///
/// # Errors
///
/// Returns `LoadError::InvalidDocument` listing every violation with the
/// JSON pointer of the offending member.
pub fn validate_declaration(document: &Value) -> Result<(), LoadError> {
    validate_against_schema(&declaration_schema(), document)
}

/// Validate any document against a JSON Schema.
pub fn validate_against_schema(schema: &Value, document: &Value) -> Result<(), LoadError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| LoadError::InvalidSchema {
        message: e.to_string(),
    })?;

    let errors: Vec<SchemaError> = validator
        .iter_errors(document)
        .map(|e| SchemaError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        tracing::debug!(errors = errors.len(), "document failed schema validation");
        Err(LoadError::InvalidDocument { errors })
    }
}
