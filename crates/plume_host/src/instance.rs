//! Script object instances
//!
//! Each instance is a plugin-owned object created by its type's zero-argument
//! constructor. The host holds it through an `Arc<ScriptObject>`; the object
//! is released back to the plugin when the registry entry and every method
//! bound to it are gone.

use crate::domain::{HostLoadSpace, IsolationDomain, LoadedModule, ScriptType};
use crate::error::{Result, ScriptError};
use crate::handle::{InstanceId, InstanceKey};
use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// A live object created inside an isolation domain
pub struct ScriptObject {
    object: NonNull<c_void>,
    ty: Arc<ScriptType>,
    disposed: AtomicBool,
    // Keeps the image mapped until the object is released
    module: Arc<LoadedModule>,
}

// Safety: the host drives each object from one owner thread at a time;
// the pointer is only passed back to the plugin that created it
unsafe impl Send for ScriptObject {}
unsafe impl Sync for ScriptObject {}

impl ScriptObject {
    /// Default-construct a type visible to the domain
    pub fn create(domain: &IsolationDomain, host: &HostLoadSpace, type_name: &str) -> Result<Self> {
        let (module, ty) = domain
            .find_type(type_name, host)
            .ok_or_else(|| ScriptError::TypeNotFound(type_name.to_string()))?;
        Self::construct(module, ty)
    }

    pub fn construct(module: Arc<LoadedModule>, ty: Arc<ScriptType>) -> Result<Self> {
        let construct = ty
            .constructor()
            .ok_or_else(|| ScriptError::construction_error(ty.name(), "no zero-argument constructor"))?;

        let raw = unsafe { construct() };
        let object = NonNull::new(raw)
            .ok_or_else(|| ScriptError::construction_error(ty.name(), "constructor returned null"))?;

        Ok(Self {
            object,
            ty,
            disposed: AtomicBool::new(false),
            module,
        })
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.object.as_ptr()
    }

    /// Module that defines the object's type
    pub fn module(&self) -> &Arc<LoadedModule> {
        &self.module
    }

    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    pub fn script_type(&self) -> &Arc<ScriptType> {
        &self.ty
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Run the type's disposal callback. Later calls do nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(dispose) = self.ty.disposer() {
            unsafe { dispose(self.object.as_ptr()) };
        }
    }
}

impl Drop for ScriptObject {
    fn drop(&mut self) {
        if let Some(release) = self.ty.releaser() {
            unsafe { release(self.object.as_ptr()) };
        }
    }
}

impl std::fmt::Debug for ScriptObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptObject")
            .field("type", &self.ty.name())
            .field("object", &self.object)
            .finish()
    }
}

/// Live instances of one generation
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    by_id: HashMap<InstanceId, Arc<ScriptObject>>,
    by_guid: HashMap<Uuid, Arc<ScriptObject>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: InstanceId, object: ScriptObject) -> Arc<ScriptObject> {
        let object = Arc::new(object);
        self.by_id.insert(id, object.clone());
        object
    }

    pub fn insert_guid(&mut self, guid: Uuid, object: ScriptObject) -> Result<Arc<ScriptObject>> {
        if self.by_guid.contains_key(&guid) {
            return Err(ScriptError::DuplicateInstance(guid));
        }
        let object = Arc::new(object);
        self.by_guid.insert(guid, object.clone());
        Ok(object)
    }

    pub fn get(&self, key: impl Into<InstanceKey>) -> Result<Arc<ScriptObject>> {
        let key = key.into();
        let found = match key {
            InstanceKey::Id(id) => self.by_id.get(&id),
            InstanceKey::Guid(guid) => self.by_guid.get(&guid),
        };
        found.cloned().ok_or(ScriptError::InstanceNotFound(key))
    }

    pub fn contains(&self, key: impl Into<InstanceKey>) -> bool {
        match key.into() {
            InstanceKey::Id(id) => self.by_id.contains_key(&id),
            InstanceKey::Guid(guid) => self.by_guid.contains_key(&guid),
        }
    }

    /// Dispose and remove an instance. Returns whether it was present.
    pub fn destroy(&mut self, key: impl Into<InstanceKey>) -> bool {
        let removed = match key.into() {
            InstanceKey::Id(id) => self.by_id.remove(&id),
            InstanceKey::Guid(guid) => self.by_guid.remove(&guid),
        };
        match removed {
            Some(object) => {
                object.dispose();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len() + self.by_guid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry without running disposal callbacks
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_guid.clear();
    }
}
