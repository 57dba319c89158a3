//! Registered method signatures
//!
//! A signature is an immutable (return type, parameter types) tuple registered
//! under a small non-negative id before any method using it is bound.

use crate::error::{Result, ScriptError};
use crate::types::TypeTag;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Return type and ordered parameter types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub return_type: TypeTag,
    pub params: Vec<TypeTag>,
}

impl Signature {
    pub fn new(return_type: TypeTag, params: Vec<TypeTag>) -> Self {
        Self { return_type, params }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

/// Signatures of the current generation, keyed by id
#[derive(Debug, Default)]
pub struct SignatureTable {
    entries: HashMap<i32, Arc<Signature>>,
}

impl SignatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a signature. Ids are write-once.
    pub fn register(&mut self, id: i32, signature: Signature) -> Result<()> {
        if id < 0 {
            return Err(ScriptError::InvalidArgument(format!(
                "signature id must be non-negative, got {}",
                id
            )));
        }
        if self.entries.contains_key(&id) {
            return Err(ScriptError::SignatureAlreadyRegistered(id));
        }

        log::debug!("Registered signature {}: {}", id, signature);
        self.entries.insert(id, Arc::new(signature));
        Ok(())
    }

    pub fn get(&self, id: i32) -> Result<Arc<Signature>> {
        self.entries
            .get(&id)
            .cloned()
            .ok_or(ScriptError::SignatureNotRegistered(id))
    }

    pub fn contains(&self, id: i32) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Shapes served by the narrow invoke entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedSignature {
    /// `() -> void`
    Void,
    /// `(float32) -> void`
    Float,
    /// `(int32, int32) -> int32`
    Int2,
    /// `(Vector3, Vector3) -> Vector3`
    Vector3Pair,
    /// `(Transform) -> void`
    TransformIn,
    /// `() -> Transform`
    TransformOut,
}

impl FixedSignature {
    pub fn signature(&self) -> Signature {
        match self {
            FixedSignature::Void => Signature::new(TypeTag::Void, vec![]),
            FixedSignature::Float => Signature::new(TypeTag::Void, vec![TypeTag::Float32]),
            FixedSignature::Int2 => {
                Signature::new(TypeTag::Int32, vec![TypeTag::Int32, TypeTag::Int32])
            }
            FixedSignature::Vector3Pair => {
                Signature::new(TypeTag::vector3(), vec![TypeTag::vector3(), TypeTag::vector3()])
            }
            FixedSignature::TransformIn => Signature::new(TypeTag::Void, vec![TypeTag::transform()]),
            FixedSignature::TransformOut => Signature::new(TypeTag::transform(), vec![]),
        }
    }

    /// Whether a bound signature has exactly this shape
    pub fn matches(&self, signature: &Signature) -> bool {
        self.signature() == *signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let sig = Signature::new(TypeTag::Int32, vec![TypeTag::Int32, TypeTag::Int32]);
        assert_eq!(sig.to_string(), "(int32, int32) -> int32");
        assert_eq!(FixedSignature::Void.signature().to_string(), "() -> void");
        assert_eq!(
            FixedSignature::Vector3Pair.signature().to_string(),
            "(Plume.Core.Vector3, Plume.Core.Vector3) -> Plume.Core.Vector3"
        );
    }

    #[test]
    fn test_register_is_write_once() {
        let mut table = SignatureTable::new();
        table.register(0, FixedSignature::Void.signature()).unwrap();

        let err = table.register(0, FixedSignature::Float.signature()).unwrap_err();
        assert!(matches!(err, ScriptError::SignatureAlreadyRegistered(0)));
        assert!(FixedSignature::Void.matches(&table.get(0).unwrap()));
    }

    #[test]
    fn test_negative_and_missing_ids() {
        let mut table = SignatureTable::new();
        assert!(matches!(
            table.register(-1, FixedSignature::Void.signature()),
            Err(ScriptError::InvalidArgument(_))
        ));
        assert!(matches!(table.get(4), Err(ScriptError::SignatureNotRegistered(4))));
    }

    #[test]
    fn test_clear() {
        let mut table = SignatureTable::new();
        table.register(1, FixedSignature::Int2.signature()).unwrap();
        assert_eq!(table.len(), 1);
        table.clear();
        assert!(table.is_empty());
        assert!(!table.contains(1));
    }
}
