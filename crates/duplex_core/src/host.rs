//! Host values
//!
//! The scripting host is dynamically typed. Everything it hands to the engine
//! arrives as a [`HostValue`], a closed set of shapes the host can produce.
//! Property decoding (see [`crate::property`]) turns these into typed native
//! payloads; pushes back to the host go the other way.
//!
//! Conversions follow the host language's coercion rules where the engine
//! needs them (`to_number`, `to_int32`, `to_uint32`, `to_display_string`).

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use crate::object::ObjectId;

/// Signature of a host function.
pub type HostFn = dyn Fn(&[HostValue]) -> HostValue + Send + Sync;

/// A callable host value.
///
/// Host functions are only ever invoked on the control thread; the engine
/// merely carries them across (inside records and animations).
#[derive(Clone)]
pub struct HostFunction(Arc<HostFn>);

impl HostFunction {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[HostValue]) -> HostValue + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the function with the given arguments.
    pub fn call(&self, args: &[HostValue]) -> HostValue {
        (self.0)(args)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostFunction")
    }
}

impl PartialEq for HostFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A dynamically-typed value owned by the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    /// Missing value
    #[default]
    Undefined,
    /// Explicit null
    Null,
    /// Boolean value
    Bool(bool),
    /// Number (the host has a single double-precision number type)
    Number(f64),
    /// UTF-8 string
    String(String),
    /// Typed float array
    Float32Array(Vec<f32>),
    /// Typed unsigned short array
    Uint16Array(Vec<u16>),
    /// Plain array
    Array(Vec<HostValue>),
    /// Plain object used as a dictionary (e.g. parameter bags)
    Dict(FxHashMap<String, HostValue>),
    /// Handle to a managed object
    Object(ObjectId),
    /// Callable
    Function(HostFunction),
}

impl HostValue {
    /// Build a dictionary value from key/value pairs.
    pub fn dict<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, HostValue)>,
    {
        HostValue::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a function value.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[HostValue]) -> HostValue + Send + Sync + 'static,
    {
        HostValue::Function(HostFunction::new(f))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, HostValue::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, HostValue::Number(_))
    }

    /// Extract as number (no coercion)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract as bool (no coercion)
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Extract as managed object handle
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            HostValue::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Extract as function
    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            HostValue::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Look up a key in a dictionary value.
    ///
    /// Returns `None` for missing keys and for non-dictionary values.
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        match self {
            HostValue::Dict(map) => map.get(key),
            _ => None,
        }
    }

    /// Numeric coercion.
    pub fn to_number(&self) -> f64 {
        match self {
            HostValue::Number(v) => *v,
            HostValue::Bool(true) => 1.0,
            HostValue::Bool(false) | HostValue::Null => 0.0,
            HostValue::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    0.0
                } else {
                    s.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// Signed 32-bit coercion (modulo 2^32, non-finite becomes 0).
    pub fn to_int32(&self) -> i32 {
        let m = modulo_u32_range(self.to_number());
        if m >= 2_147_483_648.0 {
            (m - 4_294_967_296.0) as i32
        } else {
            m as i32
        }
    }

    /// Unsigned 32-bit coercion (modulo 2^32, non-finite becomes 0).
    pub fn to_uint32(&self) -> u32 {
        modulo_u32_range(self.to_number()) as u32
    }

    /// Boolean coercion.
    pub fn truthy(&self) -> bool {
        match self {
            HostValue::Undefined | HostValue::Null => false,
            HostValue::Bool(b) => *b,
            HostValue::Number(n) => *n != 0.0 && !n.is_nan(),
            HostValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// String coercion.
    pub fn to_display_string(&self) -> String {
        match self {
            HostValue::Undefined => "undefined".to_string(),
            HostValue::Null => "null".to_string(),
            HostValue::Bool(b) => b.to_string(),
            HostValue::Number(n) => format_number(*n),
            HostValue::String(s) => s.clone(),
            HostValue::Float32Array(v) => join(v.iter().map(|f| format_number(f64::from(*f)))),
            HostValue::Uint16Array(v) => join(v.iter().map(|u| u.to_string())),
            HostValue::Array(v) => join(v.iter().map(|item| match item {
                HostValue::Undefined | HostValue::Null => String::new(),
                other => other.to_display_string(),
            })),
            HostValue::Dict(_) | HostValue::Object(_) => "[object Object]".to_string(),
            HostValue::Function(_) => "function".to_string(),
        }
    }

    /// Get type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::String(_) => "string",
            HostValue::Float32Array(_) => "Float32Array",
            HostValue::Uint16Array(_) => "Uint16Array",
            HostValue::Array(_) => "array",
            HostValue::Dict(_) => "object",
            HostValue::Object(_) => "managed object",
            HostValue::Function(_) => "function",
        }
    }
}

fn modulo_u32_range(n: f64) -> f64 {
    if !n.is_finite() {
        return 0.0;
    }
    n.trunc().rem_euclid(4_294_967_296.0)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn join<I: Iterator<Item = String>>(items: I) -> String {
    items.collect::<Vec<_>>().join(",")
}

// ============================================================================
// Conversions
// ============================================================================

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        HostValue::Number(v)
    }
}

impl From<f32> for HostValue {
    fn from(v: f32) -> Self {
        HostValue::Number(f64::from(v))
    }
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        HostValue::Number(f64::from(v))
    }
}

impl From<u32> for HostValue {
    fn from(v: u32) -> Self {
        HostValue::Number(f64::from(v))
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        HostValue::Bool(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        HostValue::String(v.to_string())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        HostValue::String(v)
    }
}

impl From<ObjectId> for HostValue {
    fn from(id: ObjectId) -> Self {
        HostValue::Object(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_coercion_wraps() {
        assert_eq!(HostValue::Number(4_294_967_297.0).to_uint32(), 1);
        assert_eq!(HostValue::Number(2_147_483_648.0).to_int32(), i32::MIN);
        assert_eq!(HostValue::Number(-1.0).to_uint32(), u32::MAX);
        assert_eq!(HostValue::Number(f64::NAN).to_int32(), 0);
        assert_eq!(HostValue::Number(-3.7).to_int32(), -3);
    }

    #[test]
    fn test_display_string() {
        assert_eq!(HostValue::Number(3.0).to_display_string(), "3");
        assert_eq!(HostValue::Number(0.5).to_display_string(), "0.5");
        assert_eq!(HostValue::Null.to_display_string(), "null");
        assert_eq!(
            HostValue::Array(vec![1.into(), HostValue::Null, "a".into()]).to_display_string(),
            "1,,a"
        );
    }

    #[test]
    fn test_dict_lookup() {
        let value = HostValue::dict([("from", 1.0.into()), ("to", 2.0.into())]);
        assert_eq!(value.get("to").and_then(HostValue::as_f64), Some(2.0));
        assert!(value.get("missing").is_none());
        assert!(HostValue::Null.get("to").is_none());
    }

    #[test]
    fn test_function_identity() {
        let f = HostFunction::new(|args| args.first().cloned().unwrap_or_default());
        let g = f.clone();
        assert_eq!(f, g);
        assert_eq!(f.call(&[HostValue::Bool(true)]), HostValue::Bool(true));
        assert_ne!(f, HostFunction::new(|_| HostValue::Undefined));
    }
}
