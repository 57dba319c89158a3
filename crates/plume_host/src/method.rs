//! Method binding
//!
//! A bind resolves a method by name and the parameter types of a registered
//! signature, checks the return type once, and stores the result under a
//! method handle. Invocations trust the bound shape.

use crate::domain::{LoadedModule, MethodEntry, ScriptType};
use crate::error::{Result, ScriptError};
use crate::handle::MethodId;
use crate::instance::ScriptObject;
use crate::signature::Signature;
use crate::types::TypeTag;
use plume_core::{ScriptValue, CALL_OK};
use std::collections::HashMap;
use std::sync::Arc;

/// Find a method with exactly these parameter types.
///
/// The per-type index holds the first export for each (name, params) key. If
/// it misses, or holds an entry of the wrong static-ness, every method with
/// the name is scanned in export order.
pub fn find_method<'a>(
    ty: &'a ScriptType,
    name: &'a str,
    params: &[TypeTag],
    want_static: bool,
) -> Result<&'a MethodEntry> {
    if let Some(entry) = ty.indexed(name, params) {
        if entry.is_static == want_static {
            return Ok(entry);
        }
    }

    if let Some(entry) = ty
        .methods_named(name)
        .find(|m| m.is_static == want_static && m.params_match(params))
    {
        return Ok(entry);
    }

    if want_static && ty.methods_named(name).any(|m| m.params_match(params)) {
        return Err(ScriptError::NotStatic {
            type_name: ty.name().to_string(),
            method: name.to_string(),
        });
    }

    let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
    Err(ScriptError::MethodNotFound(format!(
        "{}.{}({})",
        ty.name(),
        name,
        params.join(", ")
    )))
}

/// A resolved method, ready to invoke
pub struct BoundMethod {
    name: String,
    entry: MethodEntry,
    signature: Arc<Signature>,
    target: Option<Arc<ScriptObject>>,
    _module: Arc<LoadedModule>,
}

impl BoundMethod {
    /// Bind a non-static method of a live instance
    pub fn bind_instance(object: Arc<ScriptObject>, method: &str, signature: Arc<Signature>) -> Result<Self> {
        let entry = find_method(object.script_type(), method, &signature.params, false)?.clone();
        let module = object.module().clone();
        let type_name = object.type_name().to_string();
        Self::checked(&type_name, entry, signature, Some(object), module)
    }

    /// Bind a static method of a type
    pub fn bind_static(
        module: Arc<LoadedModule>,
        ty: &ScriptType,
        method: &str,
        signature: Arc<Signature>,
    ) -> Result<Self> {
        let entry = find_method(ty, method, &signature.params, true)?.clone();
        Self::checked(ty.name(), entry, signature, None, module)
    }

    fn checked(
        type_name: &str,
        entry: MethodEntry,
        signature: Arc<Signature>,
        target: Option<Arc<ScriptObject>>,
        module: Arc<LoadedModule>,
    ) -> Result<Self> {
        let name = format!("{}.{}", type_name, entry.name);
        if entry.return_type != signature.return_type {
            return Err(ScriptError::SignatureMismatch {
                method: name,
                expected: signature.to_string(),
                found: Signature::new(entry.return_type.clone(), entry.params.clone()).to_string(),
            });
        }

        Ok(Self {
            name,
            entry,
            signature,
            target,
            _module: module,
        })
    }

    /// `Type.Method`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Arc<Signature> {
        &self.signature
    }

    pub fn is_static(&self) -> bool {
        self.target.is_none()
    }

    /// Call with decoded arguments. Arity and kinds must already match.
    pub fn call(&self, args: &[ScriptValue]) -> Result<ScriptValue> {
        let this = self
            .target
            .as_ref()
            .map(|t| t.as_ptr())
            .unwrap_or(std::ptr::null_mut());

        let mut ret = ScriptValue::void();
        let status = unsafe { (self.entry.invoke)(this, args.as_ptr(), args.len(), &mut ret) };
        if status != CALL_OK {
            return Err(ScriptError::invocation_failed(
                &self.name,
                format!("plugin reported status {}", status),
            ));
        }
        Ok(ret)
    }
}

impl std::fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundMethod")
            .field("name", &self.name)
            .field("signature", &self.signature.to_string())
            .field("static", &self.is_static())
            .finish()
    }
}

/// Bound methods of one generation
#[derive(Debug, Default)]
pub struct MethodRegistry {
    entries: HashMap<MethodId, Arc<BoundMethod>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: MethodId, method: BoundMethod) {
        log::debug!("Bound {} as method {}", method.name(), id);
        self.entries.insert(id, Arc::new(method));
    }

    pub fn get(&self, id: MethodId) -> Result<Arc<BoundMethod>> {
        self.entries
            .get(&id)
            .cloned()
            .ok_or_else(|| ScriptError::stale_method(id))
    }

    /// Remove a binding. Returns whether it was present.
    pub fn remove(&mut self, id: MethodId) -> bool {
        self.entries.remove(&id).is_some()
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
