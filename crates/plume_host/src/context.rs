//! Script context
//!
//! The context owns at most one generation: a loaded isolation domain together
//! with the signature table and the instance and method registries created
//! against it. Loading a new module tears the current generation down first.
//! Handle counters live on the context, so handles from an earlier generation
//! never alias entries of a later one.

use crate::config::RuntimeConfig;
use crate::domain::{DomainWitness, HostLoadSpace, IsolationDomain};
use crate::error::{Result, ScriptError};
use crate::handle::{HandleCounter, InstanceId, InstanceKey, MethodId};
use crate::hook::HostHook;
use crate::instance::{InstanceRegistry, ScriptObject};
use crate::marshal;
use crate::method::{BoundMethod, MethodRegistry};
use crate::signature::{Signature, SignatureTable};
use plume_core::{ModuleExport, ScriptValue, Transform, Vector3};
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Everything created by one successful load
struct Generation {
    number: u64,
    // Handles below these were issued by an earlier generation
    first_instance_id: i32,
    first_method_id: i32,
    // Tables are declared before the domain so they drop first
    signatures: SignatureTable,
    instances: InstanceRegistry,
    methods: MethodRegistry,
    domain: IsolationDomain,
}

fn current(generation: &mut Option<Generation>) -> Result<&mut Generation> {
    generation.as_mut().ok_or(ScriptError::NoModuleLoaded)
}

/// Loads, binds and invokes one plugin module at a time
pub struct ScriptContext {
    config: RuntimeConfig,
    host_space: HostLoadSpace,
    hook: HostHook,
    generation: Option<Generation>,
    generation_counter: u64,
    instance_ids: HandleCounter,
    method_ids: HandleCounter,
    last_path: Option<PathBuf>,
}

impl ScriptContext {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_hook(config, HostHook::none())
    }

    pub fn with_hook(config: RuntimeConfig, hook: HostHook) -> Self {
        Self {
            config,
            host_space: HostLoadSpace::new(),
            hook,
            generation: None,
            generation_counter: 0,
            instance_ids: HandleCounter::new(),
            method_ids: HandleCounter::new(),
            last_path: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Modules shared into every domain on demand
    pub fn host_space(&self) -> &HostLoadSpace {
        &self.host_space
    }

    pub fn set_hook(&mut self, hook: HostHook) {
        self.hook = hook;
    }

    fn notify(&self, message: &str) {
        self.hook.log(message);
    }

    // ========== Loading ==========

    /// Load a module file, replacing any loaded generation
    pub fn load_module(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.unload();

        match IsolationDomain::load(path, &self.host_space, &self.config) {
            Ok(domain) => {
                self.last_path = Some(path.to_path_buf());
                self.install(domain);
                Ok(())
            }
            Err(e) => Err(self.load_failed(&path.display().to_string(), e)),
        }
    }

    /// Load a registration table linked into the host process
    pub fn load_static_module(
        &mut self,
        export: &'static ModuleExport,
        manifest: Option<&Path>,
    ) -> Result<()> {
        self.unload();

        match IsolationDomain::load_static(export, manifest, &self.host_space, &self.config) {
            Ok(domain) => {
                self.install(domain);
                Ok(())
            }
            Err(e) => Err(self.load_failed("static module", e)),
        }
    }

    /// Load failures are reported here and nowhere else
    fn load_failed(&self, what: &str, error: ScriptError) -> ScriptError {
        let message = format!("Failed to load {}: {}", what, error);
        log::error!("{}", message);
        self.notify(&message);
        error
    }

    /// Load the last module file again
    pub fn reload_module(&mut self) -> Result<()> {
        let Some(path) = self.last_path.clone() else {
            return Err(self.load_failed("previous module", ScriptError::NoModuleLoaded));
        };
        log::info!("Reloading {}", path.display());
        self.load_module(path)
    }

    fn install(&mut self, domain: IsolationDomain) {
        self.generation_counter += 1;
        let message = format!(
            "Loaded module '{}' as generation {}",
            domain.name(),
            self.generation_counter
        );
        log::info!("{}", message);
        self.notify(&message);

        self.generation = Some(Generation {
            number: self.generation_counter,
            first_instance_id: self.instance_ids.peek(),
            first_method_id: self.method_ids.peek(),
            signatures: SignatureTable::new(),
            instances: InstanceRegistry::new(),
            methods: MethodRegistry::new(),
            domain,
        });
    }

    /// Tear down the current generation. Does nothing when unloaded.
    pub fn unload(&mut self) {
        let Some(generation) = self.generation.take() else {
            return;
        };

        let Generation {
            number,
            first_instance_id: _,
            first_method_id: _,
            mut signatures,
            mut instances,
            mut methods,
            domain,
        } = generation;

        let name = domain.name().to_string();
        instances.clear();
        methods.clear();
        signatures.clear();
        drop(instances);
        drop(methods);

        let witness = domain.unload();
        self.reclaim(&name, &witness);

        let message = format!("Unloaded module '{}' (generation {})", name, number);
        self.notify(&message);
    }

    /// Poll the witness until the domain's modules are released
    fn reclaim(&self, name: &str, witness: &DomainWitness) -> bool {
        let interval = self.config.reclaim_interval();
        for pass in 0..self.config.reclaim_passes {
            if !witness.is_alive() {
                log::debug!("Module '{}' released after {} passes", name, pass);
                return true;
            }
            std::thread::sleep(interval);
        }

        if !witness.is_alive() {
            return true;
        }

        let message = format!(
            "Module '{}' still has {} live images after {} reclaim passes",
            name,
            witness.alive_count(),
            self.config.reclaim_passes
        );
        log::warn!("{}", message);
        self.notify(&message);
        false
    }

    // ========== Introspection ==========

    pub fn is_loaded(&self) -> bool {
        self.generation.is_some()
    }

    /// Number of the live generation
    pub fn generation(&self) -> Option<u64> {
        self.generation.as_ref().map(|g| g.number)
    }

    pub fn module_name(&self) -> Option<&str> {
        self.generation.as_ref().map(|g| g.domain.name())
    }

    pub fn type_names(&self) -> Vec<String> {
        self.generation
            .as_ref()
            .map(|g| g.domain.type_names())
            .unwrap_or_default()
    }

    pub fn instance_count(&self) -> usize {
        self.generation.as_ref().map(|g| g.instances.len()).unwrap_or(0)
    }

    pub fn method_count(&self) -> usize {
        self.generation.as_ref().map(|g| g.methods.len()).unwrap_or(0)
    }

    pub fn signature_count(&self) -> usize {
        self.generation.as_ref().map(|g| g.signatures.len()).unwrap_or(0)
    }

    /// Path of the last module loaded from disk
    pub fn module_path(&self) -> Option<&Path> {
        self.last_path.as_deref()
    }

    // ========== Signatures ==========

    /// Register a signature from type names
    pub fn register_signature(&mut self, id: i32, return_type: &str, params: &[&str]) -> Result<()> {
        let generation = current(&mut self.generation)?;
        let host = &self.host_space;
        let return_type = generation.domain.resolve_type_name(return_type, host)?;
        let params = params
            .iter()
            .map(|p| generation.domain.resolve_type_name(p, host))
            .collect::<Result<Vec<_>>>()?;
        generation.signatures.register(id, Signature::new(return_type, params))
    }

    pub fn signature(&mut self, id: i32) -> Result<Arc<Signature>> {
        current(&mut self.generation)?.signatures.get(id)
    }

    // ========== Instances ==========

    /// Default-construct a script type
    pub fn create_instance(&mut self, type_name: &str) -> Result<InstanceId> {
        let generation = current(&mut self.generation)?;
        let object = ScriptObject::create(&generation.domain, &self.host_space, type_name)?;
        let id = InstanceId(self.instance_ids.allocate()?);
        generation.instances.insert(id, object);
        log::debug!("Created '{}' instance {}", type_name, id);
        Ok(id)
    }

    /// Default-construct a script type under a caller-supplied id
    pub fn create_instance_with_guid(&mut self, guid: Uuid, type_name: &str) -> Result<()> {
        let generation = current(&mut self.generation)?;
        if generation.instances.contains(guid) {
            return Err(ScriptError::DuplicateInstance(guid));
        }
        let object = ScriptObject::create(&generation.domain, &self.host_space, type_name)?;
        generation.instances.insert_guid(guid, object)?;
        log::debug!("Created '{}' instance {{{}}}", type_name, guid);
        Ok(())
    }

    /// Dispose and drop an instance.
    ///
    /// Destroying an absent handle of this generation is not an error. An
    /// integer handle issued before the last load is rejected.
    pub fn destroy_instance(&mut self, instance: impl Into<InstanceKey>) -> Result<()> {
        let key = instance.into();
        let generation = current(&mut self.generation)?;
        if generation.instances.destroy(key) {
            log::debug!("Destroyed instance {}", key);
            return Ok(());
        }
        match key {
            InstanceKey::Id(InstanceId(id)) if id < generation.first_instance_id => {
                Err(ScriptError::InstanceNotFound(key))
            }
            _ => Ok(()),
        }
    }

    pub fn destroy_instance_by_guid(&mut self, guid: Uuid) -> Result<()> {
        self.destroy_instance(guid)
    }

    pub fn has_instance(&self, instance: impl Into<InstanceKey>) -> bool {
        self.generation
            .as_ref()
            .map(|g| g.instances.contains(instance))
            .unwrap_or(false)
    }

    // ========== Binding ==========

    /// Bind a non-static method of an instance
    pub fn bind_instance_method(
        &mut self,
        instance: impl Into<InstanceKey>,
        method: &str,
        signature_id: i32,
    ) -> Result<MethodId> {
        let generation = current(&mut self.generation)?;
        let object = generation.instances.get(instance)?;
        let signature = generation.signatures.get(signature_id)?;
        let bound = BoundMethod::bind_instance(object, method, signature)?;

        let id = MethodId(self.method_ids.allocate()?);
        generation.methods.insert(id, bound);
        Ok(id)
    }

    pub fn bind_instance_method_by_guid(
        &mut self,
        guid: Uuid,
        method: &str,
        signature_id: i32,
    ) -> Result<MethodId> {
        self.bind_instance_method(guid, method, signature_id)
    }

    /// Bind a static method of a type
    pub fn bind_static_method(
        &mut self,
        type_name: &str,
        method: &str,
        signature_id: i32,
    ) -> Result<MethodId> {
        let generation = current(&mut self.generation)?;
        let (module, ty) = generation
            .domain
            .find_type(type_name, &self.host_space)
            .ok_or_else(|| ScriptError::TypeNotFound(type_name.to_string()))?;
        let signature = generation.signatures.get(signature_id)?;
        let bound = BoundMethod::bind_static(module, &ty, method, signature)?;

        let id = MethodId(self.method_ids.allocate()?);
        generation.methods.insert(id, bound);
        Ok(id)
    }

    /// Remove a binding. Absent handles of this generation are not an error.
    pub fn unbind_method(&mut self, method: MethodId) -> Result<()> {
        let generation = current(&mut self.generation)?;
        if !generation.methods.remove(method) && method.0 < generation.first_method_id {
            return Err(ScriptError::stale_method(method));
        }
        Ok(())
    }

    pub fn method(&mut self, method: MethodId) -> Result<Arc<BoundMethod>> {
        current(&mut self.generation)?.methods.get(method)
    }

    // ========== Invocation ==========

    /// Invoke with raw argument slots and a raw return buffer.
    ///
    /// # Safety
    /// See [`marshal::invoke_raw`].
    pub unsafe fn invoke(
        &mut self,
        method: MethodId,
        args: *const *const c_void,
        arg_count: i32,
        ret: *mut c_void,
    ) -> Result<()> {
        let bound = self.method(method)?;
        marshal::invoke_raw(&bound, args, arg_count, ret)
    }

    /// Invoke with canonical values
    pub fn invoke_values(&mut self, method: MethodId, args: &[ScriptValue]) -> Result<ScriptValue> {
        let bound = self.method(method)?;
        marshal::invoke_values(&bound, args)
    }

    pub fn invoke_void(&mut self, method: MethodId) -> Result<()> {
        let bound = self.method(method)?;
        marshal::invoke_void(&bound)
    }

    pub fn invoke_float(&mut self, method: MethodId, value: f32) -> Result<()> {
        let bound = self.method(method)?;
        marshal::invoke_float(&bound, value)
    }

    pub fn invoke_int2(&mut self, method: MethodId, a: i32, b: i32) -> Result<i32> {
        let bound = self.method(method)?;
        marshal::invoke_int2(&bound, a, b)
    }

    pub fn invoke_vector3(&mut self, method: MethodId, a: Vector3, b: Vector3) -> Result<Vector3> {
        let bound = self.method(method)?;
        marshal::invoke_vector3(&bound, a, b)
    }

    pub fn invoke_transform_in(&mut self, method: MethodId, transform: &Transform) -> Result<()> {
        let bound = self.method(method)?;
        marshal::invoke_transform_in(&bound, transform)
    }

    pub fn invoke_transform_out(&mut self, method: MethodId) -> Result<Transform> {
        let bound = self.method(method)?;
        marshal::invoke_transform_out(&bound)
    }
}

impl Default for ScriptContext {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Drop for ScriptContext {
    fn drop(&mut self) {
        self.unload();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unloaded_context_rejects_operations() {
        let mut ctx = ScriptContext::default();
        assert!(!ctx.is_loaded());
        assert_eq!(ctx.generation(), None);

        assert!(matches!(ctx.register_signature(0, "void", &[]), Err(ScriptError::NoModuleLoaded)));
        assert!(matches!(ctx.create_instance("Any"), Err(ScriptError::NoModuleLoaded)));
        assert!(matches!(ctx.destroy_instance(InstanceId(1)), Err(ScriptError::NoModuleLoaded)));
        assert!(matches!(
            ctx.bind_static_method("Any", "Run", 0),
            Err(ScriptError::NoModuleLoaded)
        ));
        assert!(matches!(ctx.invoke_void(MethodId(1)), Err(ScriptError::NoModuleLoaded)));
        assert!(matches!(ctx.reload_module(), Err(ScriptError::NoModuleLoaded)));

        // Unloading while unloaded is a no-op
        ctx.unload();
    }

    #[test]
    fn test_failed_load_leaves_context_unloaded() {
        let mut ctx = ScriptContext::default();
        let err = ctx.load_module("/nonexistent/libmissing.so").unwrap_err();
        assert!(matches!(err, ScriptError::LoadError { .. }));
        assert!(!ctx.is_loaded());
        assert_eq!(ctx.module_path(), None);
    }
}
