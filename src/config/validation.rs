//! The built-in minimal config validator, and the default-injection and
//! `${NAME}` substitution steps that follow it. Translated directly from
//! the reference implementation's `_basic_validate` /
//! `_apply_schema_defaults` / `substitute_env_vars`.

use crate::error::{ConfigError, ConfigErrorKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("static pattern is valid"));

/// Required-keys + type-agreement validation, recursing into
/// `properties.*`, `additionalProperties`, and array `items`.
pub fn basic_validate(instance: &Value, schema: &Value, path: &str) -> Result<(), ConfigError> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        let instance_obj = instance.as_object();
        for prop in required {
            let Some(prop) = prop.as_str() else { continue };
            let present = instance_obj.map(|o| o.contains_key(prop)).unwrap_or(false);
            if !present {
                return Err(ConfigError::new(
                    ConfigErrorKind::SchemaViolation,
                    format!(
                        "missing required property '{prop}' at {}",
                        if path.is_empty() { "root" } else { path }
                    ),
                ));
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(Value::as_object) {
        if let Some(instance_obj) = instance.as_object() {
            for (prop_name, prop_schema) in properties {
                let Some(prop_value) = instance_obj.get(prop_name) else {
                    continue;
                };
                let prop_path = if path.is_empty() {
                    prop_name.clone()
                } else {
                    format!("{path}.{prop_name}")
                };

                if let Some(expected_type) =
                    prop_schema.get("type").and_then(Value::as_str)
                {
                    check_type(prop_value, expected_type, &prop_path)?;
                }

                if prop_value.is_object() && prop_schema.get("properties").is_some() {
                    basic_validate(prop_value, prop_schema, &prop_path)?;
                }

                if let Some(items) = prop_value.as_array() {
                    if let Some(item_schema) = prop_schema.get("items") {
                        for (i, item) in items.iter().enumerate() {
                            if item.is_object() && item_schema.is_object() {
                                basic_validate(item, item_schema, &format!("{prop_path}[{i}]"))?;
                            }
                        }
                    }
                }
            }
        }
    }

    if let Some(additional) = schema_obj.get("additionalProperties") {
        if additional.is_object() {
            if let Some(instance_obj) = instance.as_object() {
                let declared = schema_obj.get("properties").and_then(Value::as_object);
                for (prop_name, prop_value) in instance_obj {
                    let already_declared =
                        declared.map(|d| d.contains_key(prop_name)).unwrap_or(false);
                    if already_declared {
                        continue;
                    }
                    let prop_path = if path.is_empty() {
                        prop_name.clone()
                    } else {
                        format!("{path}.{prop_name}")
                    };
                    if prop_value.is_object() {
                        basic_validate(prop_value, additional, &prop_path)?;
                    }
                }
            }
        }
    }

    Ok(())
}

fn check_type(value: &Value, expected: &str, path: &str) -> Result<(), ConfigError> {
    let ok = match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(ConfigError::new(
            ConfigErrorKind::SchemaViolation,
            format!("property '{path}' must be a {expected}"),
        ))
    }
}

/// Injects `schema["properties"][k]["default"]` for every key absent from
/// `document`, recursing into nested objects. Never overwrites a key that
/// is already present, however it is typed.
pub fn apply_schema_defaults(document: &mut Value, schema: &Value) {
    let Some(schema_obj) = schema.as_object() else {
        return;
    };
    let Some(properties) = schema_obj.get("properties").and_then(Value::as_object) else {
        return;
    };
    let Some(doc_obj) = document.as_object_mut() else {
        return;
    };

    for (prop_name, prop_schema) in properties {
        if !doc_obj.contains_key(prop_name) {
            if let Some(default) = prop_schema.get("default") {
                doc_obj.insert(prop_name.clone(), default.clone());
                continue;
            }
            if prop_schema.get("type").and_then(Value::as_str) == Some("object") {
                doc_obj.insert(prop_name.clone(), Value::Object(Default::default()));
            }
        }

        if let Some(child) = doc_obj.get_mut(prop_name) {
            if child.is_object() {
                apply_schema_defaults(child, prop_schema);
            }
        }
    }
}

/// Whole-document `${NAME}` substitution. Every missing name anywhere in
/// the document is collected; the call fails once with the complete set
/// rather than failing on the first occurrence. This is distinct from the
/// supervisor's per-key child-environment substitution, which keeps the
/// literal string and only logs a warning.
pub fn substitute_env_vars(document: &mut Value) -> Result<(), ConfigError> {
    let mut missing = BTreeSet::new();
    substitute_in_place(document, &mut missing);

    if missing.is_empty() {
        Ok(())
    } else {
        let names: Vec<&str> = missing.iter().map(String::as_str).collect();
        Err(ConfigError::new(
            ConfigErrorKind::MissingEnvVar,
            format!("Missing required environment variables: {}", names.join(", ")),
        ))
    }
}

fn substitute_in_place(value: &mut Value, missing: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            *s = substitute_string(s, missing);
        },
        Value::Array(items) => {
            for item in items {
                substitute_in_place(item, missing);
            }
        },
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                substitute_in_place(v, missing);
            }
        },
        _ => {},
    }
}

fn substitute_string(input: &str, missing: &mut BTreeSet<String>) -> String {
    let mut result = input.to_string();
    for caps in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &caps[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&format!("${{{var_name}}}"), &value);
            },
            Err(_) => {
                missing.insert(var_name.to_string());
            },
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_key_fails() {
        let schema = json!({"required": ["mcpServers"]});
        let instance = json!({});
        let err = basic_validate(&instance, &schema, "").unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::SchemaViolation);
    }

    #[test]
    fn type_mismatch_fails() {
        let schema = json!({"properties": {"proxy": {"type": "object"}}});
        let instance = json!({"proxy": "not-an-object"});
        assert!(basic_validate(&instance, &schema, "").is_err());
    }

    #[test]
    fn defaults_fill_only_missing_keys() {
        let schema = json!({
            "properties": {
                "proxy": {
                    "type": "object",
                    "properties": {
                        "host": {"type": "string", "default": "0.0.0.0"},
                        "port": {"type": "number", "default": 8000}
                    }
                }
            }
        });
        let mut doc = json!({"proxy": {"port": 9000}});
        apply_schema_defaults(&mut doc, &schema);
        assert_eq!(doc["proxy"]["port"], 9000);
        assert_eq!(doc["proxy"]["host"], "0.0.0.0");
    }

    #[test]
    fn substitution_collects_every_missing_name_before_failing() {
        std::env::remove_var("SPEC_TEST_UNSET_A");
        std::env::remove_var("SPEC_TEST_UNSET_B");
        let mut doc = json!({"a": "${SPEC_TEST_UNSET_A}", "b": ["${SPEC_TEST_UNSET_B}"]});
        let err = substitute_env_vars(&mut doc).unwrap_err();
        assert!(err.detail.contains("SPEC_TEST_UNSET_A"));
        assert!(err.detail.contains("SPEC_TEST_UNSET_B"));
    }

    #[test]
    fn substitution_replaces_present_vars() {
        std::env::set_var("SPEC_TEST_TK", "secret");
        let mut doc = json!({"env": {"API_KEY": "${SPEC_TEST_TK}"}});
        substitute_env_vars(&mut doc).unwrap();
        assert_eq!(doc["env"]["API_KEY"], "secret");
    }
}
