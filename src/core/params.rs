//! Parameter resolution: merges template declarations with caller-supplied
//! values into the typed, validated set one run executes against.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::template::{ParameterSpec, ParameterType};

/// Replacement emitted wherever a secure value would otherwise appear.
pub const REDACTED: &str = "********";

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl ParamValue {
    /// String form substituted into command text.
    pub fn render(&self) -> String {
        match self {
            ParamValue::Str(s) => s.clone(),
            ParamValue::Num(n) => {
                // Whole numbers print without a trailing .0 so container
                // ids and ports survive the round trip through text.
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            ParamValue::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct ResolvedParam {
    value: ParamValue,
    secure: bool,
}

/// Fully validated, defaulted, typed parameter values for one run.
/// Built once at run start and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ResolvedParams {
    values: HashMap<String, ResolvedParam>,
}

impl ResolvedParams {
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Real string form, for execution. Callers must pair any external
    /// emission with [`ResolvedParams::display`] instead.
    pub fn render(&self, name: &str) -> Option<String> {
        self.values.get(name).map(|p| p.value.render())
    }

    /// Redacted string form, for logs, records, and error text.
    pub fn display(&self, name: &str) -> Option<String> {
        self.values.get(name).map(|p| {
            if p.secure {
                REDACTED.to_string()
            } else {
                p.value.render()
            }
        })
    }

    pub fn is_secure(&self, name: &str) -> bool {
        self.values.get(name).map(|p| p.secure).unwrap_or(false)
    }

    /// Every secure value, in no particular order, used to scrub
    /// free-form text (stderr, causes) before emission.
    pub fn secure_values(&self) -> Vec<String> {
        self.values
            .values()
            .filter(|p| p.secure)
            .map(|p| p.value.render())
            .collect()
    }
}

/// Resolve `declarations` against caller-supplied raw values.
///
/// Pure function of its inputs: declared order, supplied value coerced to
/// the declared type, else default, else an error if required. Derived
/// declarations (those with a `template` sub-expression) resolve last, in
/// declared order, against everything resolved before them.
pub fn resolve(
    declarations: &[ParameterSpec],
    supplied: &HashMap<String, String>,
) -> Result<ResolvedParams> {
    let mut resolved = ResolvedParams::default();

    for spec in declarations.iter().filter(|s| s.template.is_none()) {
        if let Some(raw) = supplied.get(&spec.name) {
            let value = coerce(spec, raw)?;
            resolved.values.insert(
                spec.name.clone(),
                ResolvedParam {
                    value,
                    secure: spec.secure,
                },
            );
        } else if let Some(default) = &spec.default {
            let value = coerce_default(spec, default)?;
            resolved.values.insert(
                spec.name.clone(),
                ResolvedParam {
                    value,
                    secure: spec.secure,
                },
            );
        } else if spec.required {
            return Err(Error::params_missing_required(&spec.name));
        }
    }

    for spec in declarations.iter().filter(|s| s.template.is_some()) {
        let expression = spec.template.as_deref().unwrap_or("");
        let derived = derive(&spec.name, expression, &resolved)?;
        resolved.values.insert(
            spec.name.clone(),
            ResolvedParam {
                value: ParamValue::Str(derived),
                secure: spec.secure,
            },
        );
    }

    Ok(resolved)
}

/// Substitute `{{ name }}` tokens in a derivation expression with
/// already-resolved values.
fn derive(name: &str, expression: &str, resolved: &ResolvedParams) -> Result<String> {
    let mut out = String::with_capacity(expression.len());
    let mut rest = expression;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            Error::params_unresolved_reference(name, rest[start..].trim().to_string())
        })?;
        let token = after[..end].trim();
        match resolved.render(token) {
            Some(value) => out.push_str(&value),
            None => return Err(Error::params_unresolved_reference(name, token.to_string())),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn coerce(spec: &ParameterSpec, raw: &str) -> Result<ParamValue> {
    match spec.parameter_type {
        ParameterType::String => Ok(ParamValue::Str(raw.to_string())),
        ParameterType::Number => raw
            .trim()
            .parse::<f64>()
            .map(ParamValue::Num)
            .map_err(|_| Error::params_invalid_type(&spec.name, "number", raw)),
        ParameterType::Boolean => match raw.trim() {
            "true" => Ok(ParamValue::Bool(true)),
            "false" => Ok(ParamValue::Bool(false)),
            other => Err(Error::params_invalid_type(&spec.name, "boolean", other)),
        },
        ParameterType::Enum => {
            let allowed = spec.enum_values.clone().unwrap_or_default();
            if allowed.iter().any(|v| v == raw) {
                Ok(ParamValue::Str(raw.to_string()))
            } else {
                Err(Error::params_invalid_enum(&spec.name, raw, allowed))
            }
        }
    }
}

/// Defaults come from the template document as JSON values; they follow
/// the same typing rules as supplied values but accept native JSON types.
fn coerce_default(spec: &ParameterSpec, default: &Value) -> Result<ParamValue> {
    match default {
        Value::String(s) => coerce(spec, s),
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or(0.0);
            match spec.parameter_type {
                ParameterType::Number => Ok(ParamValue::Num(n)),
                _ => coerce(spec, &ParamValue::Num(n).render()),
            }
        }
        Value::Bool(b) => match spec.parameter_type {
            ParameterType::Boolean => Ok(ParamValue::Bool(*b)),
            _ => coerce(spec, &b.to_string()),
        },
        other => Err(Error::params_invalid_type(
            &spec.name,
            spec.parameter_type.as_str(),
            other.to_string(),
        )),
    }
}
