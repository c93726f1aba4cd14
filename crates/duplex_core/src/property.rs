//! Typed properties
//!
//! Every managed object carries a small set of typed, change-tracked fields.
//! The set of native kinds is closed: [`PropertyKind`] names them and
//! [`PropertyValue`] is the tagged union holding one value of any kind.
//!
//! Host writes never touch a property directly. They are decoded on the
//! control thread into a self-contained [`Payload`] which travels to the
//! render thread inside an update record and is applied there.

use std::fmt;

use crate::host::HostValue;
use crate::object::ObjectId;

/// Native property kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Float,
    Double,
    Int32,
    UInt32,
    Bool,
    FloatArray,
    UShortArray,
    Utf8,
    /// Reference to another managed object
    Object,
}

impl PropertyKind {
    /// Scalar numeric kinds (the ones an animation can drive)
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            PropertyKind::Float | PropertyKind::Double | PropertyKind::Int32 | PropertyKind::UInt32
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            PropertyKind::Float => "float",
            PropertyKind::Double => "double",
            PropertyKind::Int32 => "int32",
            PropertyKind::UInt32 => "uint32",
            PropertyKind::Bool => "boolean",
            PropertyKind::FloatArray => "float[]",
            PropertyKind::UShortArray => "ushort[]",
            PropertyKind::Utf8 => "utf8",
            PropertyKind::Object => "object",
        }
    }
}

/// A value of one of the native property kinds
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Float(f32),
    Double(f64),
    Int32(i32),
    UInt32(u32),
    Bool(bool),
    FloatArray(Vec<f32>),
    UShortArray(Vec<u16>),
    Utf8(String),
    Object(Option<ObjectId>),
}

impl PropertyValue {
    /// The zero value of a kind
    pub fn default_for(kind: PropertyKind) -> Self {
        match kind {
            PropertyKind::Float => PropertyValue::Float(0.0),
            PropertyKind::Double => PropertyValue::Double(0.0),
            PropertyKind::Int32 => PropertyValue::Int32(0),
            PropertyKind::UInt32 => PropertyValue::UInt32(0),
            PropertyKind::Bool => PropertyValue::Bool(false),
            PropertyKind::FloatArray => PropertyValue::FloatArray(Vec::new()),
            PropertyKind::UShortArray => PropertyValue::UShortArray(Vec::new()),
            PropertyKind::Utf8 => PropertyValue::Utf8(String::new()),
            PropertyKind::Object => PropertyValue::Object(None),
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Float(_) => PropertyKind::Float,
            PropertyValue::Double(_) => PropertyKind::Double,
            PropertyValue::Int32(_) => PropertyKind::Int32,
            PropertyValue::UInt32(_) => PropertyKind::UInt32,
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::FloatArray(_) => PropertyKind::FloatArray,
            PropertyValue::UShortArray(_) => PropertyKind::UShortArray,
            PropertyValue::Utf8(_) => PropertyKind::Utf8,
            PropertyValue::Object(_) => PropertyKind::Object,
        }
    }

    /// Numeric view of a scalar numeric value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(f64::from(*v)),
            PropertyValue::Double(v) => Some(*v),
            PropertyValue::Int32(v) => Some(f64::from(*v)),
            PropertyValue::UInt32(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Build a scalar numeric value of `kind` from a double.
    ///
    /// Integer kinds truncate toward zero and saturate.
    pub fn from_f64(kind: PropertyKind, v: f64) -> Option<Self> {
        match kind {
            PropertyKind::Float => Some(PropertyValue::Float(v as f32)),
            PropertyKind::Double => Some(PropertyValue::Double(v)),
            PropertyKind::Int32 => Some(PropertyValue::Int32(v as i32)),
            PropertyKind::UInt32 => Some(PropertyValue::UInt32(v as u32)),
            _ => None,
        }
    }

    /// Referenced object, if this is a non-null object reference
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            PropertyValue::Object(id) => *id,
            _ => None,
        }
    }

    /// Convert to the value the host observes
    pub fn to_host(&self) -> HostValue {
        match self {
            PropertyValue::Float(v) => HostValue::Number(f64::from(*v)),
            PropertyValue::Double(v) => HostValue::Number(*v),
            PropertyValue::Int32(v) => HostValue::Number(f64::from(*v)),
            PropertyValue::UInt32(v) => HostValue::Number(f64::from(*v)),
            PropertyValue::Bool(v) => HostValue::Bool(*v),
            PropertyValue::FloatArray(v) => HostValue::Float32Array(v.clone()),
            PropertyValue::UShortArray(v) => HostValue::Uint16Array(v.clone()),
            PropertyValue::Utf8(v) => HostValue::String(v.clone()),
            PropertyValue::Object(Some(id)) => HostValue::Object(*id),
            PropertyValue::Object(None) => HostValue::Null,
        }
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int32(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        PropertyValue::UInt32(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Utf8(v.to_string())
    }
}

/// Decoded host write, ready to be applied on the render thread.
///
/// `None` clears the property to its kind's default.
pub type Payload = Option<PropertyValue>;

/// Decode a host value for a property of `kind`.
///
/// Returns `None` when the host value does not fit the kind; the write is
/// then dropped by the caller. Object references are decoded here but their
/// liveness and retain are handled by the event handler, which owns the
/// object table.
pub fn decode(kind: PropertyKind, value: &HostValue) -> Option<Payload> {
    let decoded = match kind {
        PropertyKind::Float => PropertyValue::Float(value.as_f64()? as f32),
        PropertyKind::Double => PropertyValue::Double(value.as_f64()?),
        PropertyKind::Int32 => {
            value.as_f64()?;
            PropertyValue::Int32(value.to_int32())
        }
        PropertyKind::UInt32 => {
            value.as_f64()?;
            PropertyValue::UInt32(value.to_uint32())
        }
        PropertyKind::Bool => PropertyValue::Bool(value.as_bool()?),
        PropertyKind::FloatArray => match value {
            HostValue::Float32Array(v) => PropertyValue::FloatArray(v.clone()),
            HostValue::Uint16Array(v) => {
                PropertyValue::FloatArray(v.iter().map(|u| f32::from(*u)).collect())
            }
            HostValue::Array(items) => {
                PropertyValue::FloatArray(items.iter().map(|i| i.to_number() as f32).collect())
            }
            _ => return None,
        },
        PropertyKind::UShortArray => match value {
            HostValue::Uint16Array(v) => PropertyValue::UShortArray(v.clone()),
            HostValue::Float32Array(v) => PropertyValue::UShortArray(
                v.iter()
                    .map(|f| HostValue::Number(f64::from(*f)).to_uint32() as u16)
                    .collect(),
            ),
            HostValue::Array(items) => {
                PropertyValue::UShortArray(items.iter().map(|i| i.to_uint32() as u16).collect())
            }
            _ => return None,
        },
        PropertyKind::Utf8 => PropertyValue::Utf8(value.to_display_string()),
        PropertyKind::Object => PropertyValue::Object(value.as_object()),
    };
    Some(Some(decoded))
}

/// Numeric property id, unique per owning object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub u32);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Address of one property: owning object plus property id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyRef {
    pub object: ObjectId,
    pub id: PropertyId,
}

impl PropertyRef {
    pub fn new(object: ObjectId, id: PropertyId) -> Self {
        Self { object, id }
    }
}

/// A typed, change-tracked field of a managed object
#[derive(Debug, Clone)]
pub struct Property {
    name: String,
    id: PropertyId,
    kind: PropertyKind,
    value: PropertyValue,
    connected: bool,
}

impl Property {
    pub(crate) fn new(name: &str, id: PropertyId, kind: PropertyKind, connected: bool) -> Self {
        Self {
            name: name.to_string(),
            id,
            kind,
            value: PropertyValue::default_for(kind),
            connected,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> PropertyId {
        self.id
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    /// Whether the host has an accessor bound to this property
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Store a native value.
    ///
    /// Returns true when the value changed and the property is connected,
    /// i.e. when the host needs a push. Equal values are a no-op.
    pub(crate) fn set_value(&mut self, value: PropertyValue) -> bool {
        debug_assert_eq!(value.kind(), self.kind);
        if self.value == value {
            return false;
        }
        self.value = value;
        self.connected
    }

    pub(crate) fn into_value(self) -> PropertyValue {
        self.value
    }

    /// Apply a decoded payload, returning the value it replaced.
    pub fn apply(&mut self, payload: Payload) -> PropertyValue {
        let next = payload.unwrap_or_else(|| PropertyValue::default_for(self.kind));
        debug_assert_eq!(next.kind(), self.kind);
        std::mem::replace(&mut self.value, next)
    }
}
