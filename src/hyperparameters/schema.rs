//! Declarative hyperparameter schemas.
//!
//! Schemas are plain serde data, read from primitive descriptors and written
//! back into pipeline configurations. A tunable schema is tagged by `type`:
//!
//! ```json
//! {"type": "float", "default": 0.1, "range": [0.001, 1.0]}
//! {"type": "str", "default": "mean", "values": ["mean", "median"]}
//! {"type": "conditional", "condition": "penalty",
//!  "values": {"l2": {"type": "float", "default": 0.01}, "none": null}}
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;

use super::Hyperparameters;

/// Deserialize a field that is present in the input, keeping an explicit
/// `null` as `Some(Json::Null)` instead of folding it into `None`.
pub(crate) fn present<'de, D>(deserializer: D) -> Result<Option<Json>, D::Error>
where
    D: Deserializer<'de>,
{
    Json::deserialize(deserializer).map(Some)
}

/// Schema of a fixed (non-tunable) hyperparameter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FixedSpec {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Default value. An explicit `null` default is a real default.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Json>,
}

impl FixedSpec {
    /// A fixed hyperparameter that must be supplied at construction.
    pub fn required(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            default: None,
        }
    }

    pub fn with_default(type_name: impl Into<String>, default: impl Into<Json>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            default: Some(default.into()),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Schema of a tunable hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TunableSpec {
    #[serde(alias = "integer")]
    Int {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<[i64; 2]>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<Vec<i64>>,
    },
    Float {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<[f64; 2]>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<Vec<f64>>,
    },
    #[serde(alias = "string")]
    Str {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<Vec<String>>,
    },
    Bool {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<bool>,
    },
    /// The JSON type of the value selects one of several sub-schemas.
    Multitype {
        #[serde(
            default,
            deserialize_with = "present",
            skip_serializing_if = "Option::is_none"
        )]
        default: Option<Json>,
        types: IndexMap<String, TunableSpec>,
    },
    /// The schema depends on the current value of another hyperparameter.
    ///
    /// A `null` entry in `values` (or a `null`/absent `default`) means the
    /// hyperparameter is inactive for that controlling value.
    Conditional {
        condition: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Box<TunableSpec>>,
        values: IndexMap<String, Option<TunableSpec>>,
    },
}

impl TunableSpec {
    pub fn int(default: i64, range: [i64; 2]) -> Self {
        TunableSpec::Int {
            default: Some(default),
            range: Some(range),
            values: None,
        }
    }

    pub fn float(default: f64, range: [f64; 2]) -> Self {
        TunableSpec::Float {
            default: Some(default),
            range: Some(range),
            values: None,
        }
    }

    pub fn choice<S: Into<String>>(default: &str, values: impl IntoIterator<Item = S>) -> Self {
        TunableSpec::Str {
            default: Some(default.to_string()),
            values: Some(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn boolean(default: bool) -> Self {
        TunableSpec::Bool {
            default: Some(default),
        }
    }

    /// Type tag as it appears in JSON.
    pub fn type_name(&self) -> &'static str {
        match self {
            TunableSpec::Int { .. } => "int",
            TunableSpec::Float { .. } => "float",
            TunableSpec::Str { .. } => "str",
            TunableSpec::Bool { .. } => "bool",
            TunableSpec::Multitype { .. } => "multitype",
            TunableSpec::Conditional { .. } => "conditional",
        }
    }

    /// Name of the controlling hyperparameter for conditional schemas.
    pub fn condition(&self) -> Option<&str> {
        match self {
            TunableSpec::Conditional { condition, .. } => Some(condition),
            _ => None,
        }
    }

    /// Default value of a resolved schema.
    ///
    /// Conditional schemas have no default of their own; resolve them first.
    pub fn default_value(&self) -> Option<Json> {
        match self {
            TunableSpec::Int { default, .. } => default.map(Json::from),
            TunableSpec::Float { default, .. } => default.map(Json::from),
            TunableSpec::Str { default, .. } => default.clone().map(Json::from),
            TunableSpec::Bool { default } => default.map(Json::from),
            TunableSpec::Multitype { default, .. } => default.clone(),
            TunableSpec::Conditional { .. } => None,
        }
    }

    /// Resolve conditional schemas against the current hyperparameter values.
    ///
    /// Returns the schema that applies right now, or `None` if the
    /// hyperparameter is inactive. Non-conditional schemas resolve to
    /// themselves.
    pub fn resolve(&self, current: &Hyperparameters) -> Option<TunableSpec> {
        match self {
            TunableSpec::Conditional {
                condition,
                default,
                values,
            } => {
                let selected = current
                    .get(condition)
                    .and_then(|value| values.get(&condition_key(value)));

                let spec = match selected {
                    Some(entry) => entry.as_ref(),
                    None => default.as_deref(),
                };
                spec.and_then(|s| s.resolve(current))
            }
            other => Some(other.clone()),
        }
    }

    /// Check a value against a resolved schema.
    pub fn check(&self, value: &Json) -> Result<(), String> {
        match self {
            TunableSpec::Int { range, values, .. } => {
                let v = value
                    .as_i64()
                    .ok_or_else(|| format!("expected an integer, got {}", value))?;
                if let Some([lo, hi]) = range {
                    if v < *lo || v > *hi {
                        return Err(format!("{} is outside the range [{}, {}]", v, lo, hi));
                    }
                }
                if let Some(allowed) = values {
                    if !allowed.contains(&v) {
                        return Err(format!("{} is not one of {:?}", v, allowed));
                    }
                }
                Ok(())
            }
            TunableSpec::Float { range, values, .. } => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| format!("expected a number, got {}", value))?;
                if let Some([lo, hi]) = range {
                    if v < *lo || v > *hi {
                        return Err(format!("{} is outside the range [{}, {}]", v, lo, hi));
                    }
                }
                if let Some(allowed) = values {
                    if !allowed.contains(&v) {
                        return Err(format!("{} is not one of {:?}", v, allowed));
                    }
                }
                Ok(())
            }
            TunableSpec::Str { values, .. } => {
                let v = value
                    .as_str()
                    .ok_or_else(|| format!("expected a string, got {}", value))?;
                if let Some(allowed) = values {
                    if !allowed.iter().any(|a| a == v) {
                        return Err(format!("'{}' is not one of {:?}", v, allowed));
                    }
                }
                Ok(())
            }
            TunableSpec::Bool { .. } => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(format!("expected a boolean, got {}", value))
                }
            }
            TunableSpec::Multitype { default, types } => {
                if default.as_ref() == Some(value) {
                    return Ok(());
                }
                let kind = json_type(value);
                let spec = types
                    .get(kind)
                    .or_else(|| (kind == "int").then(|| types.get("float")).flatten());
                match spec {
                    Some(spec) => spec.check(value),
                    None if kind == "null" && types.is_empty() => Ok(()),
                    None => Err(format!(
                        "a {} value is not accepted; allowed types are {:?}",
                        kind,
                        types.keys().collect::<Vec<_>>()
                    )),
                }
            }
            TunableSpec::Conditional { condition, .. } => Err(format!(
                "conditional schema on '{}' must be resolved before checking",
                condition
            )),
        }
    }
}

/// Lookup key of a controlling value inside a conditional's `values` table.
fn condition_key(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(n) if n.is_i64() || n.is_u64() => "int",
        Json::Number(_) => "float",
        Json::String(_) => "str",
        Json::Array(_) => "list",
        Json::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alpha_spec() -> TunableSpec {
        serde_json::from_value(json!({
            "type": "conditional",
            "condition": "penalty",
            "values": {
                "l2": {"type": "float", "default": 0.01, "range": [0.0, 1.0]},
                "none": null
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_tagged_specs() {
        let spec: TunableSpec =
            serde_json::from_value(json!({"type": "float", "default": 0.5, "range": [0, 1]}))
                .unwrap();
        assert_eq!(spec, TunableSpec::float(0.5, [0.0, 1.0]));

        let spec: TunableSpec =
            serde_json::from_value(json!({"type": "string", "default": "a", "values": ["a", "b"]}))
                .unwrap();
        assert_eq!(spec, TunableSpec::choice("a", ["a", "b"]));
        assert_eq!(spec.type_name(), "str");
    }

    #[test]
    fn test_fixed_null_default_is_a_default() {
        let spec: FixedSpec = serde_json::from_value(json!({"type": "int", "default": null})).unwrap();
        assert_eq!(spec.default, Some(Json::Null));
        assert!(!spec.is_required());

        let spec: FixedSpec = serde_json::from_value(json!({"type": "int"})).unwrap();
        assert!(spec.is_required());
    }

    #[test]
    fn test_check_ranges_and_values() {
        let spec = TunableSpec::int(5, [1, 10]);
        assert!(spec.check(&json!(1)).is_ok());
        assert!(spec.check(&json!(10)).is_ok());
        assert!(spec.check(&json!(11)).is_err());
        assert!(spec.check(&json!(2.5)).is_err());

        let spec = TunableSpec::float(0.5, [0.0, 1.0]);
        assert!(spec.check(&json!(1)).is_ok());
        assert!(spec.check(&json!(-0.1)).is_err());

        let spec = TunableSpec::choice("mean", ["mean", "median"]);
        assert!(spec.check(&json!("median")).is_ok());
        assert!(spec.check(&json!("mode")).is_err());

        assert!(TunableSpec::boolean(true).check(&json!(false)).is_ok());
        assert!(TunableSpec::boolean(true).check(&json!(0)).is_err());
    }

    #[test]
    fn test_check_multitype() {
        let spec: TunableSpec = serde_json::from_value(json!({
            "type": "multitype",
            "default": null,
            "types": {
                "int": {"type": "int", "range": [1, 5]},
                "str": {"type": "str", "values": ["auto"]}
            }
        }))
        .unwrap();

        assert_eq!(spec.default_value(), Some(Json::Null));
        assert!(spec.check(&Json::Null).is_ok(), "the declared default is always accepted");
        assert!(spec.check(&json!(3)).is_ok());
        assert!(spec.check(&json!("auto")).is_ok());
        assert!(spec.check(&json!("other")).is_err());
        assert!(spec.check(&json!(true)).is_err());
    }

    #[test]
    fn test_resolve_conditional() {
        let spec = alpha_spec();

        let mut current = Hyperparameters::new();
        assert_eq!(spec.resolve(&current), None);

        current.insert("penalty".to_string(), json!("l2"));
        let resolved = spec.resolve(&current).unwrap();
        assert_eq!(resolved.default_value(), Some(json!(0.01)));

        current.insert("penalty".to_string(), json!("none"));
        assert_eq!(spec.resolve(&current), None);
    }

    #[test]
    fn test_resolve_conditional_falls_back_to_default() {
        let spec: TunableSpec = serde_json::from_value(json!({
            "type": "conditional",
            "condition": "mode",
            "default": {"type": "int", "default": 3},
            "values": {"off": null}
        }))
        .unwrap();

        let mut current = Hyperparameters::new();
        current.insert("mode".to_string(), json!("fast"));
        assert_eq!(
            spec.resolve(&current).and_then(|s| s.default_value()),
            Some(json!(3))
        );

        current.insert("mode".to_string(), json!("off"));
        assert_eq!(spec.resolve(&current), None);
    }

    #[test]
    fn test_non_string_condition_keys() {
        let spec: TunableSpec = serde_json::from_value(json!({
            "type": "conditional",
            "condition": "enabled",
            "values": {"true": {"type": "int", "default": 1}}
        }))
        .unwrap();

        let mut current = Hyperparameters::new();
        current.insert("enabled".to_string(), json!(true));
        assert!(spec.resolve(&current).is_some());
    }

    #[test]
    fn test_serialize_round_trip_keeps_shape() {
        let spec = alpha_spec();
        let text = serde_json::to_string(&spec).unwrap();
        let back: TunableSpec = serde_json::from_str(&text).unwrap();
        assert_eq!(spec, back);
        assert!(text.contains("\"none\":null"));
    }
}
