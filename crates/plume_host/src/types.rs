//! Type tags for signatures and marshaling
//!
//! A [`TypeTag`] is either a primitive or a reference to an aggregate layout.
//! Aggregates compare by [`AggregateId`], never by name, so a layout declared
//! by a plugin can never be confused with the shared core type of the same
//! shape.

use plume_core::{ScalarKind, TRANSFORM_TYPE_NAME, VECTOR3_TYPE_NAME};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Identity of an aggregate layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateId(pub u32);

impl AggregateId {
    pub const VECTOR3: Self = Self(1);
    pub const TRANSFORM: Self = Self(2);
    /// First id handed to module-declared aggregates
    pub const FIRST_MODULE: u32 = 1000;
}

/// Shared core aggregates, which marshal to dedicated value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreAggregate {
    Vector3,
    Transform,
}

/// Packed field layout of an aggregate type
#[derive(Debug)]
pub struct AggregateLayout {
    pub id: AggregateId,
    pub name: String,
    pub fields: Vec<ScalarKind>,
    pub core: Option<CoreAggregate>,
}

impl AggregateLayout {
    /// Size of the packed wire representation in bytes
    pub fn size(&self) -> usize {
        self.fields.len() * 4
    }
}

impl PartialEq for AggregateLayout {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AggregateLayout {}

impl Hash for AggregateLayout {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Layout of `Plume.Core.Vector3`
pub fn vector3_layout() -> Arc<AggregateLayout> {
    static LAYOUT: OnceLock<Arc<AggregateLayout>> = OnceLock::new();
    LAYOUT
        .get_or_init(|| {
            Arc::new(AggregateLayout {
                id: AggregateId::VECTOR3,
                name: VECTOR3_TYPE_NAME.to_string(),
                fields: vec![ScalarKind::Float32; 3],
                core: Some(CoreAggregate::Vector3),
            })
        })
        .clone()
}

/// Layout of `Plume.Core.Transform`
pub fn transform_layout() -> Arc<AggregateLayout> {
    static LAYOUT: OnceLock<Arc<AggregateLayout>> = OnceLock::new();
    LAYOUT
        .get_or_init(|| {
            Arc::new(AggregateLayout {
                id: AggregateId::TRANSFORM,
                name: TRANSFORM_TYPE_NAME.to_string(),
                fields: vec![ScalarKind::Float32; 9],
                core: Some(CoreAggregate::Transform),
            })
        })
        .clone()
}

/// Look up a shared core aggregate by fully qualified name
pub fn core_aggregate(name: &str) -> Option<Arc<AggregateLayout>> {
    if name == VECTOR3_TYPE_NAME {
        Some(vector3_layout())
    } else if name == TRANSFORM_TYPE_NAME {
        Some(transform_layout())
    } else {
        None
    }
}

/// A parameter or return type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Void,
    Int32,
    Float32,
    Bool,
    Aggregate(Arc<AggregateLayout>),
}

impl TypeTag {
    pub fn vector3() -> Self {
        TypeTag::Aggregate(vector3_layout())
    }

    pub fn transform() -> Self {
        TypeTag::Aggregate(transform_layout())
    }

    /// Match a primitive type name, ignoring case
    pub fn primitive(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "void" => Some(TypeTag::Void),
            "int" | "int32" | "i32" => Some(TypeTag::Int32),
            "float" | "float32" | "single" | "f32" => Some(TypeTag::Float32),
            "bool" | "boolean" => Some(TypeTag::Bool),
            _ => None,
        }
    }

    /// Size of the wire representation in bytes
    pub fn size(&self) -> usize {
        match self {
            TypeTag::Void => 0,
            TypeTag::Int32 | TypeTag::Float32 | TypeTag::Bool => 4,
            TypeTag::Aggregate(layout) => layout.size(),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeTag::Void)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Void => write!(f, "void"),
            TypeTag::Int32 => write!(f, "int32"),
            TypeTag::Float32 => write!(f, "float32"),
            TypeTag::Bool => write!(f, "bool"),
            TypeTag::Aggregate(layout) => write!(f, "{}", layout.name),
        }
    }
}

/// Strip an assembly-qualified suffix (`"Name, Module"` becomes `"Name"`)
pub fn strip_qualifier(name: &str) -> &str {
    name.split(',').next().unwrap_or(name).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_names_ignore_case() {
        assert_eq!(TypeTag::primitive("INT"), Some(TypeTag::Int32));
        assert_eq!(TypeTag::primitive("Float"), Some(TypeTag::Float32));
        assert_eq!(TypeTag::primitive(" bool "), Some(TypeTag::Bool));
        assert_eq!(TypeTag::primitive("Void"), Some(TypeTag::Void));
        assert_eq!(TypeTag::primitive("double"), None);
    }

    #[test]
    fn test_core_layouts_share_identity() {
        assert_eq!(TypeTag::vector3(), TypeTag::vector3());
        assert_ne!(TypeTag::vector3(), TypeTag::transform());
        assert_eq!(TypeTag::vector3().size(), 12);
        assert_eq!(TypeTag::transform().size(), 36);
        assert!(core_aggregate("Plume.Core.Vector3").is_some());
        assert!(core_aggregate("Vector3").is_none());
    }

    #[test]
    fn test_same_shape_different_identity() {
        let impostor = TypeTag::Aggregate(Arc::new(AggregateLayout {
            id: AggregateId(AggregateId::FIRST_MODULE),
            name: "Plugin.Vector3".into(),
            fields: vec![ScalarKind::Float32; 3],
            core: None,
        }));
        assert_ne!(impostor, TypeTag::vector3());
    }

    #[test]
    fn test_strip_qualifier() {
        assert_eq!(strip_qualifier("Plume.Core.Vector3, plume_core"), "Plume.Core.Vector3");
        assert_eq!(strip_qualifier("int"), "int");
    }
}
