//! Typed key/value settings with a fixed schema, validated writes, and
//! default fallback (spec.md §4.10).

use std::collections::HashMap;
use std::sync::LazyLock;

use serde_json::Value;

use crate::error::{PrintarrError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingValueType {
    Integer,
    Float,
    Boolean,
    String,
}

#[derive(Debug, Clone)]
pub struct SettingSchemaEntry {
    pub key: &'static str,
    pub value_type: SettingValueType,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub description: &'static str,
    pub default: Value,
    pub restart_required: bool,
}

fn entry(
    key: &'static str,
    value_type: SettingValueType,
    min: Option<f64>,
    max: Option<f64>,
    description: &'static str,
    default: Value,
    restart_required: bool,
) -> SettingSchemaEntry {
    SettingSchemaEntry {
        key,
        value_type,
        min,
        max,
        description,
        default,
        restart_required,
    }
}

pub static SCHEMA: LazyLock<Vec<SettingSchemaEntry>> = LazyLock::new(|| {
    vec![
        entry(
            "max_concurrent_downloads",
            SettingValueType::Integer,
            Some(1.0),
            Some(10.0),
            "Maximum number of download workers running concurrently",
            Value::from(3),
            true,
        ),
        entry(
            "delete_archives_after_extraction",
            SettingValueType::Boolean,
            None,
            None,
            "Delete original archives once extraction succeeds",
            Value::Bool(false),
            false,
        ),
        entry(
            "auto_queue_render_after_import",
            SettingValueType::Boolean,
            None,
            None,
            "Queue a render job when a design has no existing preview after import",
            Value::Bool(true),
            false,
        ),
        entry(
            "ai_configured",
            SettingValueType::Boolean,
            None,
            None,
            "Whether an external AI tagging/analysis backend is configured",
            Value::Bool(false),
            false,
        ),
        entry(
            "ai_auto_analyze_on_import",
            SettingValueType::Boolean,
            None,
            None,
            "Automatically queue AI analysis after library import",
            Value::Bool(false),
            false,
        ),
        entry(
            "library_path_template",
            SettingValueType::String,
            None,
            None,
            "Template used to build each design's library directory",
            Value::from("{designer}/{channel}/{title}"),
            false,
        ),
        entry(
            "count_cache_exact_threshold",
            SettingValueType::Integer,
            Some(1.0),
            None,
            "Row count above which unfiltered counts use the approximate strategy",
            Value::from(10_000),
            false,
        ),
        entry(
            "adapter_call_timeout_secs",
            SettingValueType::Integer,
            Some(1.0),
            Some(300.0),
            "Per-call timeout for source adapter network operations",
            Value::from(30),
            false,
        ),
    ]
});

fn schema_entry(key: &str) -> Option<&'static SettingSchemaEntry> {
    SCHEMA.iter().find(|e| e.key == key)
}

/// Validate a proposed value against the schema entry for `key`.
pub fn validate(key: &str, value: &Value) -> Result<()> {
    let Some(entry) = schema_entry(key) else {
        return Err(PrintarrError::NotFound {
            resource: "setting".to_string(),
            id: key.to_string(),
        });
    };

    let type_ok = match entry.value_type {
        SettingValueType::Integer => value.is_i64() || value.is_u64(),
        SettingValueType::Float => value.is_number(),
        SettingValueType::Boolean => value.is_boolean(),
        SettingValueType::String => value.is_string(),
    };
    if !type_ok {
        return Err(PrintarrError::Validation {
            field: key.to_string(),
            message: format!("expected a {:?} value", entry.value_type),
        });
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = entry.min {
            if n < min {
                return Err(PrintarrError::Validation {
                    field: key.to_string(),
                    message: format!("value {n} is below minimum {min}"),
                });
            }
        }
        if let Some(max) = entry.max {
            if n > max {
                return Err(PrintarrError::Validation {
                    field: key.to_string(),
                    message: format!("value {n} exceeds maximum {max}"),
                });
            }
        }
    }

    Ok(())
}

pub fn default_value(key: &str) -> Option<Value> {
    schema_entry(key).map(|e| e.default.clone())
}

/// Returns the full default map, used by `reset_to_defaults`.
pub fn defaults() -> HashMap<String, Value> {
    SCHEMA.iter().map(|e| (e.key.to_string(), e.default.clone())).collect()
}

/// A write equal to the default does not persist (spec.md §4.10):
/// callers should skip storing a row when this returns true.
pub fn is_default(key: &str, value: &Value) -> bool {
    default_value(key).as_ref() == Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_6_rejects_out_of_bounds_value() {
        let result = validate("max_concurrent_downloads", &Value::from(15));
        assert!(result.is_err());
    }

    #[test]
    fn scenario_6_accepts_in_bounds_value() {
        let result = validate("max_concurrent_downloads", &Value::from(5));
        assert!(result.is_ok());
    }

    #[test]
    fn unknown_key_is_not_found() {
        let result = validate("does_not_exist", &Value::from(1));
        assert!(matches!(result, Err(PrintarrError::NotFound { .. })));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let result = validate("max_concurrent_downloads", &Value::from("five"));
        assert!(result.is_err());
    }

    #[test]
    fn write_equal_to_default_is_recognised() {
        assert!(is_default("delete_archives_after_extraction", &Value::Bool(false)));
        assert!(!is_default("delete_archives_after_extraction", &Value::Bool(true)));
    }
}
