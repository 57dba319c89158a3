//! Canonical values exchanged between the host and plugin methods
//!
//! The host decodes raw native argument buffers into [`ScriptValue`]s before
//! calling into a plugin, and encodes the plugin's returned [`ScriptValue`]
//! back into the caller's buffer. Plugins never see the caller's raw memory.

use crate::interop::{Transform, Vector3};
use std::fmt;

/// Maximum number of scalar fields in a module-declared aggregate
pub const MAX_AGGREGATE_FIELDS: usize = 16;

/// Scalar field kind of an aggregate layout
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int32 = 1,
    Float32 = 2,
    Bool = 3,
}

impl ScalarKind {
    /// Decode a raw discriminant written by a plugin
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(ScalarKind::Int32),
            2 => Some(ScalarKind::Float32),
            3 => Some(ScalarKind::Bool),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::Int32 => "int32",
            ScalarKind::Float32 => "float32",
            ScalarKind::Bool => "bool",
        }
    }
}

/// Discriminant of a [`ScriptValue`]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Void = 0,
    Int32 = 1,
    Float32 = 2,
    Bool = 3,
    Vector3 = 4,
    Transform = 5,
    Aggregate = 6,
}

impl ValueKind {
    /// Decode a raw discriminant written by a plugin
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ValueKind::Void),
            1 => Some(ValueKind::Int32),
            2 => Some(ValueKind::Float32),
            3 => Some(ValueKind::Bool),
            4 => Some(ValueKind::Vector3),
            5 => Some(ValueKind::Transform),
            6 => Some(ValueKind::Aggregate),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Void => "void",
            ValueKind::Int32 => "int32",
            ValueKind::Float32 => "float32",
            ValueKind::Bool => "bool",
            ValueKind::Vector3 => "vector3",
            ValueKind::Transform => "transform",
            ValueKind::Aggregate => "aggregate",
        }
    }
}

/// Payload storage. Every field is plain data valid for any bit pattern.
#[repr(C)]
#[derive(Clone, Copy)]
pub union ValuePayload {
    pub int32: i32,
    pub float32: f32,
    pub boolean: u32,
    pub vector3: Vector3,
    pub transform: Transform,
    /// Raw little-endian words of a module-declared aggregate
    pub words: [u32; MAX_AGGREGATE_FIELDS],
}

/// A tagged value passed to and returned from plugin methods
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ScriptValue {
    /// Raw [`ValueKind`] discriminant
    pub kind: u32,
    /// Number of valid words for [`ValueKind::Aggregate`], zero otherwise
    pub field_count: u32,
    pub payload: ValuePayload,
}

impl ScriptValue {
    fn with_kind(kind: ValueKind) -> Self {
        Self {
            kind: kind as u32,
            field_count: 0,
            payload: ValuePayload { words: [0; MAX_AGGREGATE_FIELDS] },
        }
    }

    pub fn void() -> Self {
        Self::with_kind(ValueKind::Void)
    }

    pub fn int32(v: i32) -> Self {
        let mut value = Self::with_kind(ValueKind::Int32);
        value.payload.int32 = v;
        value
    }

    pub fn float32(v: f32) -> Self {
        let mut value = Self::with_kind(ValueKind::Float32);
        value.payload.float32 = v;
        value
    }

    pub fn bool(v: bool) -> Self {
        let mut value = Self::with_kind(ValueKind::Bool);
        value.payload.boolean = v as u32;
        value
    }

    pub fn vector3(v: Vector3) -> Self {
        let mut value = Self::with_kind(ValueKind::Vector3);
        value.payload.vector3 = v;
        value
    }

    pub fn transform(v: Transform) -> Self {
        let mut value = Self::with_kind(ValueKind::Transform);
        value.payload.transform = v;
        value
    }

    /// Build an aggregate from raw field words. Returns `None` if there are
    /// more than [`MAX_AGGREGATE_FIELDS`] words.
    pub fn aggregate(words: &[u32]) -> Option<Self> {
        if words.len() > MAX_AGGREGATE_FIELDS {
            return None;
        }
        let mut buf = [0u32; MAX_AGGREGATE_FIELDS];
        buf[..words.len()].copy_from_slice(words);

        let mut value = Self::with_kind(ValueKind::Aggregate);
        value.field_count = words.len() as u32;
        value.payload.words = buf;
        Some(value)
    }

    /// Decoded kind, `None` if a plugin wrote an unknown discriminant
    pub fn kind(&self) -> Option<ValueKind> {
        ValueKind::from_raw(self.kind)
    }

    pub fn is_void(&self) -> bool {
        self.kind() == Some(ValueKind::Void)
    }

    pub fn as_int32(&self) -> Option<i32> {
        match self.kind()? {
            // SAFETY: int32 is valid for any bit pattern
            ValueKind::Int32 => Some(unsafe { self.payload.int32 }),
            _ => None,
        }
    }

    pub fn as_float32(&self) -> Option<f32> {
        match self.kind()? {
            // SAFETY: f32 is valid for any bit pattern
            ValueKind::Float32 => Some(unsafe { self.payload.float32 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind()? {
            // SAFETY: u32 is valid for any bit pattern
            ValueKind::Bool => Some(unsafe { self.payload.boolean } != 0),
            _ => None,
        }
    }

    pub fn as_vector3(&self) -> Option<Vector3> {
        match self.kind()? {
            // SAFETY: Vector3 is three f32s
            ValueKind::Vector3 => Some(unsafe { self.payload.vector3 }),
            _ => None,
        }
    }

    pub fn as_transform(&self) -> Option<Transform> {
        match self.kind()? {
            // SAFETY: Transform is nine f32s
            ValueKind::Transform => Some(unsafe { self.payload.transform }),
            _ => None,
        }
    }

    /// Raw field words of an aggregate value
    pub fn as_aggregate(&self) -> Option<&[u32]> {
        match self.kind()? {
            ValueKind::Aggregate => {
                let count = (self.field_count as usize).min(MAX_AGGREGATE_FIELDS);
                // SAFETY: the words array spans the whole payload
                Some(unsafe { &self.payload.words[..count] })
            }
            _ => None,
        }
    }
}

impl Default for ScriptValue {
    fn default() -> Self {
        Self::void()
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(ValueKind::Void) => write!(f, "Void"),
            Some(ValueKind::Int32) => write!(f, "Int32({:?})", self.as_int32()),
            Some(ValueKind::Float32) => write!(f, "Float32({:?})", self.as_float32()),
            Some(ValueKind::Bool) => write!(f, "Bool({:?})", self.as_bool()),
            Some(ValueKind::Vector3) => write!(f, "Vector3({:?})", self.as_vector3()),
            Some(ValueKind::Transform) => write!(f, "Transform({:?})", self.as_transform()),
            Some(ValueKind::Aggregate) => write!(f, "Aggregate({:?})", self.as_aggregate()),
            None => write!(f, "Invalid(kind={})", self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_check_kind() {
        let v = ScriptValue::int32(-7);
        assert_eq!(v.as_int32(), Some(-7));
        assert_eq!(v.as_float32(), None);
        assert_eq!(v.as_bool(), None);

        let b = ScriptValue::bool(true);
        assert_eq!(b.as_bool(), Some(true));
        assert_eq!(b.as_int32(), None);
    }

    #[test]
    fn test_aggregate_words() {
        let v = ScriptValue::aggregate(&[1, 2, 3]).unwrap();
        assert_eq!(v.as_aggregate(), Some(&[1u32, 2, 3][..]));
        assert!(ScriptValue::aggregate(&[0; MAX_AGGREGATE_FIELDS + 1]).is_none());
    }

    #[test]
    fn test_unknown_kind() {
        let mut v = ScriptValue::void();
        v.kind = 99;
        assert_eq!(v.kind(), None);
        assert_eq!(v.as_int32(), None);
        assert_eq!(format!("{:?}", v), "Invalid(kind=99)");
    }

    #[test]
    fn test_scalar_kind_raw() {
        assert_eq!(ScalarKind::from_raw(2), Some(ScalarKind::Float32));
        assert_eq!(ScalarKind::from_raw(0), None);
    }
}
