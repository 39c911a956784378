//! Type and allowed-value rules applied to a single field
//!
//! Declared types come from schema files and use a loose vocabulary
//! (`int64`, `uint32`, `double`, `list_str`, ...). They are normalised to the
//! tags produced by [`classify`] before comparison.

use std::sync::OnceLock;

use moka::sync::Cache;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::schema::SchemaFieldDefinition;
use crate::value::{Value, classify, tags};

/// How allowed values are compared with record values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueMatching {
    /// Canonical text or numeric equality
    #[default]
    Exact,
    /// Allowed strings containing `*` match any run of characters
    Wildcard,
}

/// Map a declared type onto the canonical tag vocabulary
pub fn normalize_type(declared: &str) -> &str {
    match declared.trim() {
        "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "uint16" | "uint32"
        | "uint64" | "integer" => tags::INT,
        "float32" => tags::FLOAT,
        "double" => tags::FLOAT64,
        "str" => tags::STRING,
        "boolean" => tags::BOOL,
        "list_string" => tags::LIST_STR,
        other => other,
    }
}

fn is_int_type(declared: &str) -> bool {
    declared == tags::INT
}

fn is_float_type(declared: &str) -> bool {
    declared == tags::FLOAT || declared == tags::FLOAT64
}

fn is_list_type(declared: &str) -> bool {
    declared.starts_with("list_")
}

/// Check that `value` is acceptable for the field's declared type.
pub fn check_type(def: &SchemaFieldDefinition, value: &Value) -> bool {
    let declared = normalize_type(&def.declared_type);

    if declared == tags::ANY {
        return true;
    }
    if declared == tags::STRUCT {
        return matches!(value, Value::Map(_));
    }
    if declared == tags::LIST_STRUCT {
        return value
            .as_list()
            .is_some_and(|items| items.iter().all(|item| matches!(item, Value::Map(_))));
    }

    if value.is_zero() && (is_int_type(declared) || is_float_type(declared)) {
        return true;
    }

    let actual = classify(value);
    if declared == actual {
        return true;
    }

    if let Some(element) = declared.strip_prefix("list_") {
        if scalar_fits_element(element, actual) {
            return true;
        }
        // An empty list carries no element type
        if value.as_list().is_some_and(|items| items.is_empty()) {
            return true;
        }
    }

    match declared {
        tags::INT => actual == tags::FLOAT64 && value.as_integer().is_some(),
        tags::FLOAT | tags::FLOAT64 => {
            actual == tags::INT || actual == tags::FLOAT || actual == tags::FLOAT64
        }
        tags::LIST_FLOAT => actual == tags::LIST_INT,
        _ => false,
    }
}

fn scalar_fits_element(element: &str, actual: &str) -> bool {
    match element {
        "str" => actual == tags::STRING,
        "int" => actual == tags::INT,
        "float" => actual == tags::FLOAT || actual == tags::FLOAT64,
        _ => false,
    }
}

/// Check that `value` is one of the field's allowed values.
///
/// Fields without an allowed value (null, empty string or empty list) accept
/// anything. For list types every element of a list candidate must be allowed.
pub fn check_value(def: &SchemaFieldDefinition, value: &Value, matching: ValueMatching) -> bool {
    let allowed = &def.allowed_value;
    if allowed.is_empty() {
        return true;
    }

    let declared = normalize_type(&def.declared_type);
    let candidates: &[Value] = match allowed {
        Value::List(items) => items,
        scalar => std::slice::from_ref(scalar),
    };

    if is_list_type(declared) {
        let allowed_text: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        return match value {
            Value::List(items) => items
                .iter()
                .all(|item| text_in_set(&allowed_text, &item.to_string(), matching)),
            scalar => text_in_set(&allowed_text, &scalar.to_string(), matching),
        };
    }

    candidates
        .iter()
        .any(|candidate| scalar_matches(declared, candidate, value, matching))
}

fn scalar_matches(declared: &str, allowed: &Value, value: &Value, matching: ValueMatching) -> bool {
    if allowed.is_numeric() && value.is_numeric() {
        if is_int_type(declared) {
            if let (Some(expected), Some(actual)) = (allowed.as_integer(), value.as_integer()) {
                return expected == actual;
            }
        }
        return match (allowed.as_f64(), value.as_f64()) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        };
    }

    text_matches(&allowed.to_string(), &value.to_string(), matching)
}

fn text_in_set(allowed: &[String], candidate: &str, matching: ValueMatching) -> bool {
    allowed
        .iter()
        .any(|entry| text_matches(entry, candidate, matching))
}

fn text_matches(allowed: &str, candidate: &str, matching: ValueMatching) -> bool {
    if allowed == candidate {
        return true;
    }
    if matching == ValueMatching::Wildcard && allowed.contains('*') {
        return wildcard_pattern(allowed).is_some_and(|pattern| pattern.is_match(candidate));
    }
    false
}

/// Compiled wildcard patterns keyed by the allowed-value text
static WILDCARD_PATTERNS: OnceLock<Cache<String, Option<Regex>>> = OnceLock::new();

const WILDCARD_PATTERN_CAPACITY: u64 = 1024;

fn wildcard_patterns() -> &'static Cache<String, Option<Regex>> {
    WILDCARD_PATTERNS.get_or_init(|| Cache::new(WILDCARD_PATTERN_CAPACITY))
}

/// Anchored regex where `*` matches any run of characters, compiled once per pattern
fn wildcard_pattern(allowed: &str) -> Option<Regex> {
    wildcard_patterns().get_with(allowed.to_string(), || compile_wildcard(allowed))
}

fn compile_wildcard(allowed: &str) -> Option<Regex> {
    let body = allowed
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", body)).ok()
}
