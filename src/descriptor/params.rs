//! Command parameter schema and argument binding.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Bound parameter values keyed by parameter name
pub type BoundParams = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Array,
    Boolean,
    Number,
}

impl ParamType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "string" => Some(ParamType::String),
            "array" => Some(ParamType::Array),
            "boolean" | "bool" => Some(ParamType::Boolean),
            "number" | "integer" => Some(ParamType::Number),
            _ => None,
        }
    }

    /// Whether a JSON value is acceptable for this type (used for defaults)
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Array => value.is_array(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Number => value.is_number(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Array => "array",
            ParamType::Boolean => "boolean",
            ParamType::Number => "number",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Typed parameter schema of a Command, in schema (name) order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterSchema {
    params: Vec<ParameterSpec>,
}

impl ParameterSchema {
    pub fn new(mut params: Vec<ParameterSpec>) -> Self {
        params.sort_by(|a, b| a.name.cmp(&b.name));
        Self { params }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Flags match parameter names with `-` and `_` treated as equal.
    fn lookup_flag(&self, flag: &str) -> Option<&ParameterSpec> {
        let wanted = flag.replace('_', "-");
        self.params
            .iter()
            .find(|p| p.name == flag || p.name.replace('_', "-") == wanted)
    }

    /// Bind CLI-style arguments (`--flag value`, `--flag=value`, bare
    /// `--flag` for booleans) against the schema.
    ///
    /// Positional arguments fill still-unset parameters in schema order; an
    /// array parameter absorbs all remaining positionals. All problems are
    /// reported together.
    pub fn bind(&self, args: &[String]) -> Result<BoundParams, Vec<String>> {
        let mut values = BoundParams::new();
        let mut errors = Vec::new();
        let mut positionals: Vec<&str> = Vec::new();

        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_str();
            i += 1;

            let Some(flag) = arg.strip_prefix("--").filter(|f| !f.is_empty()) else {
                positionals.push(arg);
                continue;
            };

            let (key, inline) = match flag.split_once('=') {
                Some((k, v)) => (k, Some(v)),
                None => (flag, None),
            };

            let Some(spec) = self.lookup_flag(key) else {
                errors.push(format!("unknown flag '--{}'", key));
                continue;
            };

            let raw = match (spec.kind, inline) {
                (_, Some(v)) => v.to_string(),
                (ParamType::Boolean, None) => match args.get(i).map(String::as_str) {
                    Some(v @ ("true" | "false")) => {
                        i += 1;
                        v.to_string()
                    }
                    _ => "true".to_string(),
                },
                (_, None) => match args.get(i) {
                    Some(v) if !v.starts_with("--") => {
                        i += 1;
                        v.clone()
                    }
                    _ => {
                        errors.push(format!("flag '--{}' requires a value", key));
                        continue;
                    }
                },
            };

            match coerce(spec, &raw) {
                Ok(value) => merge_value(&mut values, spec, value),
                Err(e) => errors.push(e),
            }
        }

        let mut remaining = positionals.into_iter().peekable();
        for spec in &self.params {
            if remaining.peek().is_none() {
                break;
            }
            if values.contains_key(&spec.name) {
                continue;
            }
            if spec.kind == ParamType::Array {
                let items: Vec<Value> = remaining.by_ref().map(Value::from).collect();
                values.insert(spec.name.clone(), Value::Array(items));
                break;
            }
            if let Some(raw) = remaining.next() {
                match coerce(spec, raw) {
                    Ok(value) => {
                        values.insert(spec.name.clone(), value);
                    }
                    Err(e) => errors.push(e),
                }
            }
        }
        for extra in remaining {
            errors.push(format!("unexpected argument '{}'", extra));
        }

        for spec in &self.params {
            if values.contains_key(&spec.name) {
                continue;
            }
            if let Some(default) = &spec.default {
                values.insert(spec.name.clone(), default.clone());
            } else if spec.required {
                errors.push(format!("missing required parameter '--{}'", spec.name));
            }
        }

        if errors.is_empty() {
            Ok(values)
        } else {
            Err(errors)
        }
    }
}

fn coerce(spec: &ParameterSpec, raw: &str) -> Result<Value, String> {
    match spec.kind {
        ParamType::String => Ok(Value::String(raw.to_string())),
        ParamType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!(
                "parameter '{}' expects a boolean, got '{}'",
                spec.name, raw
            )),
        },
        ParamType::Number => {
            if let Ok(n) = raw.parse::<i64>() {
                return Ok(Value::from(n));
            }
            raw.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| {
                    format!("parameter '{}' expects a number, got '{}'", spec.name, raw)
                })
        }
        ParamType::Array => Ok(Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Value::from)
                .collect(),
        )),
    }
}

/// Repeated array flags accumulate; any other repeated flag keeps the last value.
fn merge_value(values: &mut BoundParams, spec: &ParameterSpec, value: Value) {
    match (values.get_mut(&spec.name), value) {
        (Some(Value::Array(existing)), Value::Array(more)) if spec.kind == ParamType::Array => {
            existing.extend(more);
        }
        (_, value) => {
            values.insert(spec.name.clone(), value);
        }
    }
}

/// Render a bound value for prompt substitution
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
