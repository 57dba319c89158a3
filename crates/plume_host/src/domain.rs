//! Isolation domains
//!
//! An [`IsolationDomain`] owns one plugin module image plus whatever of its
//! dependencies had to be loaded fresh for it. Dependencies named as shared
//! core are bound to the host's own types; dependencies the host already
//! loaded into its [`HostLoadSpace`] are shared rather than loaded twice.
//!
//! Dropping a domain only releases the domain's own references. Live objects
//! and bound methods keep their module alive until they are dropped, which is
//! what [`DomainWitness`] observes.

use crate::config::RuntimeConfig;
use crate::error::{Result, ScriptError};
use crate::types::{core_aggregate, strip_qualifier, AggregateId, AggregateLayout, TypeTag};
use libloading::Library;
use parking_lot::RwLock;
use plume_core::ffi::*;
use plume_core::{ScalarKind, CORE_NAMESPACE, MAX_AGGREGATE_FIELDS};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_char, CStr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tempfile::TempPath;

/// Aggregate ids are process-wide so layouts from different generations never compare equal
static NEXT_AGGREGATE_ID: AtomicU32 = AtomicU32::new(AggregateId::FIRST_MODULE);

fn next_aggregate_id() -> AggregateId {
    AggregateId(NEXT_AGGREGATE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Copy a C string out of a registration table
unsafe fn read_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// Backing storage of a module's code
pub enum ModuleImage {
    /// Loaded from a private copy of the module file. The library is
    /// unloaded before the copy is deleted.
    Dynamic { library: Library, shadow: TempPath },
    /// Linked into the host process
    Static,
}

/// A method as exported by a module, with its declared types resolved
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub name: String,
    pub is_static: bool,
    pub return_type: TypeTag,
    pub params: Vec<TypeTag>,
    pub invoke: MethodFn,
}

impl MethodEntry {
    pub fn params_match(&self, params: &[TypeTag]) -> bool {
        self.params.len() == params.len() && self.params.iter().zip(params).all(|(a, b)| a == b)
    }
}

/// A script type exported by a module
pub struct ScriptType {
    name: String,
    construct: Option<ConstructFn>,
    dispose: Option<DisposeFn>,
    release: Option<ReleaseFn>,
    methods: Vec<MethodEntry>,
    /// (name, params) -> first method exported with that key
    index: HashMap<(String, Vec<TypeTag>), usize>,
}

impl ScriptType {
    pub fn new(
        name: impl Into<String>,
        construct: Option<ConstructFn>,
        dispose: Option<DisposeFn>,
        release: Option<ReleaseFn>,
        methods: Vec<MethodEntry>,
    ) -> Self {
        let mut index = HashMap::new();
        for (i, method) in methods.iter().enumerate() {
            index
                .entry((method.name.clone(), method.params.clone()))
                .or_insert(i);
        }

        Self {
            name: name.into(),
            construct,
            dispose,
            release,
            methods,
            index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constructor(&self) -> Option<ConstructFn> {
        self.construct
    }

    pub fn disposer(&self) -> Option<DisposeFn> {
        self.dispose
    }

    pub fn releaser(&self) -> Option<ReleaseFn> {
        self.release
    }

    pub fn methods(&self) -> &[MethodEntry] {
        &self.methods
    }

    /// Indexed lookup by exact name and parameter types
    pub fn indexed(&self, name: &str, params: &[TypeTag]) -> Option<&MethodEntry> {
        self.index
            .get(&(name.to_string(), params.to_vec()))
            .map(|&i| &self.methods[i])
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodEntry> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }
}

impl std::fmt::Debug for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptType")
            .field("name", &self.name)
            .field("constructible", &self.construct.is_some())
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// A module image and the types it exports
pub struct LoadedModule {
    name: String,
    version: String,
    path: Option<PathBuf>,
    types: Vec<Arc<ScriptType>>,
    aggregates: Vec<Arc<AggregateLayout>>,
    // Dropped last: every function pointer above points into it
    image: ModuleImage,
}

impl LoadedModule {
    /// Load a module library from disk.
    ///
    /// `known` lists aggregates of already-loaded modules that this module's
    /// signatures may refer to.
    pub fn open(path: &Path, known: &[Arc<AggregateLayout>]) -> Result<Self> {
        if !path.is_file() {
            return Err(ScriptError::load_error(path, "file not found"));
        }

        // The original stays free to be rebuilt while this image is loaded
        let shadow = shadow_copy(path)?;
        let library = unsafe { Library::new(shadow.as_os_str()) }
            .map_err(|e| ScriptError::load_error(path, e.to_string()))?;

        let entry: ModuleEntryFn = unsafe {
            *library
                .get::<ModuleEntryFn>(MODULE_ENTRY_SYMBOL)
                .map_err(|_| ScriptError::load_error(path, "missing plume_module_entry symbol"))?
        };

        let export = unsafe { entry() };
        if export.is_null() {
            return Err(ScriptError::load_error(path, "module entry returned null"));
        }

        // SAFETY: the table lives as long as the library, which the module owns
        let export = unsafe { &*export };
        Self::from_export(export, ModuleImage::Dynamic { library, shadow }, Some(path), known)
    }

    /// Wrap a registration table linked into the host process
    pub fn from_static(export: &'static ModuleExport, known: &[Arc<AggregateLayout>]) -> Result<Self> {
        Self::from_export(export, ModuleImage::Static, None, known)
    }

    fn from_export(
        export: &ModuleExport,
        image: ModuleImage,
        path: Option<&Path>,
        known: &[Arc<AggregateLayout>],
    ) -> Result<Self> {
        let display_path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("<static>"));

        if export.abi_version != PLUME_ABI_VERSION {
            return Err(ScriptError::load_error(
                display_path,
                format!(
                    "ABI version {} does not match host version {}",
                    export.abi_version, PLUME_ABI_VERSION
                ),
            ));
        }

        let name = unsafe { read_c_str(export.name) }
            .or_else(|| path.and_then(module_name_from_path))
            .unwrap_or_else(|| "unknown".to_string());
        let version = unsafe { read_c_str(export.version) }.unwrap_or_else(|| "0.0.0".to_string());

        let aggregates = Self::read_aggregates(&name, export);

        let mut types = Vec::new();
        for ty in unsafe { table_slice(export.types, export.type_count) } {
            let Some(type_name) = (unsafe { read_c_str(ty.name) }) else {
                log::warn!("Module '{}' exports a type without a name, skipping", name);
                continue;
            };

            let mut methods = Vec::new();
            for method in unsafe { table_slice(ty.methods, ty.method_count) } {
                match Self::read_method(method, &aggregates, known) {
                    Ok(entry) => methods.push(entry),
                    Err(reason) => log::warn!("Skipping method on '{}': {}", type_name, reason),
                }
            }

            types.push(Arc::new(ScriptType::new(
                type_name,
                ty.construct,
                ty.dispose,
                ty.release,
                methods,
            )));
        }

        log::info!(
            "Loaded module '{}' v{} with {} types",
            name,
            version,
            types.len()
        );

        Ok(Self {
            name,
            version,
            path: path.map(Path::to_path_buf),
            types,
            aggregates,
            image,
        })
    }

    fn read_aggregates(module: &str, export: &ModuleExport) -> Vec<Arc<AggregateLayout>> {
        let mut layouts = Vec::new();
        for agg in unsafe { table_slice(export.aggregates, export.aggregate_count) } {
            let Some(agg_name) = (unsafe { read_c_str(agg.name) }) else {
                continue;
            };

            if agg_name.starts_with(CORE_NAMESPACE) {
                log::warn!(
                    "Module '{}' redeclares shared core type '{}', using the host's",
                    module,
                    agg_name
                );
                continue;
            }

            let raw = unsafe { table_slice(agg.fields, agg.field_count) };
            if raw.is_empty() || raw.len() > MAX_AGGREGATE_FIELDS {
                log::warn!(
                    "Aggregate '{}' has {} fields (1 to {} supported), skipping",
                    agg_name,
                    raw.len(),
                    MAX_AGGREGATE_FIELDS
                );
                continue;
            }

            let fields: Option<Vec<ScalarKind>> = raw.iter().map(|&k| ScalarKind::from_raw(k)).collect();
            let Some(fields) = fields else {
                log::warn!("Aggregate '{}' has an unknown field kind, skipping", agg_name);
                continue;
            };

            layouts.push(Arc::new(AggregateLayout {
                id: next_aggregate_id(),
                name: agg_name,
                fields,
                core: None,
            }));
        }
        layouts
    }

    fn read_method(
        method: &MethodExport,
        own: &[Arc<AggregateLayout>],
        known: &[Arc<AggregateLayout>],
    ) -> std::result::Result<MethodEntry, String> {
        let name = unsafe { read_c_str(method.name) }.ok_or("method without a name")?;
        let invoke = method
            .invoke
            .ok_or_else(|| format!("'{}' has no entry point", name))?;

        let resolve = |ptr: *const c_char| -> std::result::Result<TypeTag, String> {
            let type_name = unsafe { read_c_str(ptr) }
                .ok_or_else(|| format!("'{}' has an unnamed type", name))?;
            resolve_in(&type_name, own.iter().chain(known))
                .ok_or_else(|| format!("'{}' uses unknown type '{}'", name, type_name))
        };

        let return_type = resolve(method.return_type)?;
        let params = unsafe { table_slice(method.params, method.param_count) }
            .iter()
            .map(|&p| resolve(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(MethodEntry {
            name,
            is_static: method.is_static(),
            return_type,
            params,
            invoke,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.image, ModuleImage::Dynamic { .. })
    }

    /// File the loader actually mapped, for modules loaded from disk
    pub fn image_path(&self) -> Option<&Path> {
        match &self.image {
            ModuleImage::Dynamic { shadow, .. } => Some(&**shadow),
            ModuleImage::Static => None,
        }
    }

    pub fn types(&self) -> &[Arc<ScriptType>] {
        &self.types
    }

    pub fn find_type(&self, name: &str) -> Option<Arc<ScriptType>> {
        self.types.iter().find(|t| t.name() == name).cloned()
    }

    pub fn aggregates(&self) -> &[Arc<AggregateLayout>] {
        &self.aggregates
    }

    pub fn find_aggregate(&self, name: &str) -> Option<Arc<AggregateLayout>> {
        self.aggregates.iter().find(|a| a.name == name).cloned()
    }
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        log::debug!("Releasing module '{}'", self.name);
    }
}

/// Resolve a declared type name against the core and the given aggregates
fn resolve_in<'a>(
    name: &str,
    aggregates: impl IntoIterator<Item = &'a Arc<AggregateLayout>>,
) -> Option<TypeTag> {
    if let Some(tag) = TypeTag::primitive(name) {
        return Some(tag);
    }
    let name = strip_qualifier(name);
    if let Some(layout) = core_aggregate(name) {
        return Some(TypeTag::Aggregate(layout));
    }
    aggregates
        .into_iter()
        .find(|a| a.name == name)
        .map(|a| TypeTag::Aggregate(a.clone()))
}

/// Module name implied by a library file name (`libfoo.so` is `foo`)
pub fn module_name_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let stem = if cfg!(windows) {
        stem
    } else {
        stem.strip_prefix("lib").unwrap_or(stem)
    };
    Some(stem.to_string())
}

/// Candidate library file names for a module name
pub fn library_file_names(name: &str) -> Vec<String> {
    let mut names = vec![
        format!("lib{}.so", name),
        format!("{}.dll", name),
        format!("lib{}.dylib", name),
        format!("{}.{}", name, std::env::consts::DLL_EXTENSION),
    ];
    let mut seen = HashSet::new();
    names.retain(|n| seen.insert(n.clone()));
    names
}

/// Modules the host loaded itself, shared into every domain on demand
#[derive(Default)]
pub struct HostLoadSpace {
    modules: RwLock<Vec<Arc<LoadedModule>>>,
}

impl HostLoadSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a library into the host space
    pub fn preload(&self, path: impl AsRef<Path>) -> Result<Arc<LoadedModule>> {
        let known = self.aggregates();
        let module = Arc::new(LoadedModule::open(path.as_ref(), &known)?);
        self.modules.write().push(module.clone());
        Ok(module)
    }

    /// Register a table linked into the host process
    pub fn preload_static(&self, export: &'static ModuleExport) -> Result<Arc<LoadedModule>> {
        let known = self.aggregates();
        let module = Arc::new(LoadedModule::from_static(export, &known)?);
        self.modules.write().push(module.clone());
        Ok(module)
    }

    /// Find a module by name, ignoring case
    pub fn find(&self, name: &str) -> Option<Arc<LoadedModule>> {
        self.modules
            .read()
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Snapshot of the preloaded modules, in load order
    pub fn modules(&self) -> Vec<Arc<LoadedModule>> {
        self.modules.read().clone()
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }

    fn aggregates(&self) -> Vec<Arc<AggregateLayout>> {
        self.modules
            .read()
            .iter()
            .flat_map(|m| m.aggregates().iter().cloned())
            .collect()
    }
}

/// Dependency manifest stored next to a module (`<stem>.deps.json`)
#[derive(Debug, Default, Deserialize)]
pub struct DependencyManifest {
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
}

#[derive(Debug, Deserialize)]
pub struct DependencySpec {
    pub name: String,
    /// Explicit location, relative to the module's directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DependencyManifest {
    /// Manifest location for a module file
    pub fn location(module_path: &Path, suffix: &str) -> Option<PathBuf> {
        let stem = module_path.file_stem()?.to_str()?;
        Some(module_dir(module_path).join(format!("{}{}", stem, suffix)))
    }

    /// Read a manifest. A missing file means no dependencies.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let source = std::fs::read_to_string(path)
            .map_err(|e| ScriptError::load_error(path, e.to_string()))?;
        serde_json::from_str(&source)
            .map_err(|e| ScriptError::load_error(path, format!("invalid manifest: {}", e)))
    }
}

/// Copy a module file to a fresh temporary file with the same extension
fn shadow_copy(path: &Path) -> Result<TempPath> {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("module");
    let suffix = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    let shadow = tempfile::Builder::new()
        .prefix(&format!("{}-", stem))
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| ScriptError::load_error(path, format!("cannot create shadow copy: {}", e)))?
        .into_temp_path();
    std::fs::copy(path, &shadow)
        .map_err(|e| ScriptError::load_error(path, format!("cannot create shadow copy: {}", e)))?;
    log::trace!("Shadow copy of {} at {}", path.display(), shadow.display());
    Ok(shadow)
}

fn module_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Walks manifests depth-first, loading what the host does not already provide
struct DependencyResolver<'a> {
    host: &'a HostLoadSpace,
    config: &'a RuntimeConfig,
    visited: HashSet<String>,
    /// Resolved dependencies in load order
    modules: Vec<Arc<LoadedModule>>,
    /// Modules loaded fresh for this domain
    owned: Vec<Weak<LoadedModule>>,
}

impl<'a> DependencyResolver<'a> {
    fn new(host: &'a HostLoadSpace, config: &'a RuntimeConfig) -> Self {
        Self {
            host,
            config,
            visited: HashSet::new(),
            modules: Vec::new(),
            owned: Vec::new(),
        }
    }

    fn visit(&mut self, name: &str) -> bool {
        self.visited.insert(name.to_lowercase())
    }

    fn known_aggregates(&self) -> Vec<Arc<AggregateLayout>> {
        let mut known: Vec<Arc<AggregateLayout>> = self
            .modules
            .iter()
            .flat_map(|m| m.aggregates().iter().cloned())
            .collect();
        known.extend(self.host.aggregates());
        known
    }

    fn resolve_manifest(&mut self, manifest_path: &Path) -> Result<()> {
        let manifest = DependencyManifest::read(manifest_path)?;
        let base = module_dir(manifest_path);

        for dep in &manifest.dependencies {
            if !self.visit(&dep.name) {
                continue;
            }

            if self.config.is_shared_core(&dep.name) {
                log::debug!("Dependency '{}' bound to the host's shared core", dep.name);
                continue;
            }

            if let Some(shared) = self.host.find(&dep.name) {
                log::debug!("Dependency '{}' shared from the host load space", dep.name);
                self.modules.push(shared);
                continue;
            }

            let Some(found) = self.search(dep, &base) else {
                return Err(ScriptError::load_error(
                    base.join(&dep.name),
                    format!("unresolved dependency '{}'", dep.name),
                ));
            };

            if let Some(nested) = DependencyManifest::location(&found, &self.config.manifest_suffix) {
                self.resolve_manifest(&nested)?;
            }

            let module = Arc::new(LoadedModule::open(&found, &self.known_aggregates())?);
            log::debug!("Dependency '{}' loaded from {}", dep.name, found.display());
            self.owned.push(Arc::downgrade(&module));
            self.modules.push(module);
        }

        Ok(())
    }

    fn search(&self, dep: &DependencySpec, module_dir: &Path) -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(explicit) = &dep.path {
            candidates.push(module_dir.join(explicit));
        }
        for dir in [module_dir, self.config.base_dir.as_path()] {
            for file in library_file_names(&dep.name) {
                candidates.push(dir.join(file));
            }
        }
        candidates.into_iter().find(|c| c.is_file())
    }
}

/// Observes whether the modules of an unloaded domain have been released
#[derive(Debug, Clone, Default)]
pub struct DomainWitness {
    modules: Vec<Weak<LoadedModule>>,
}

impl DomainWitness {
    /// Whether any module of the domain is still referenced
    pub fn is_alive(&self) -> bool {
        self.modules.iter().any(|m| m.strong_count() > 0)
    }

    pub fn alive_count(&self) -> usize {
        self.modules.iter().filter(|m| m.strong_count() > 0).count()
    }
}

/// One plugin module and its resolved dependencies
pub struct IsolationDomain {
    main: Arc<LoadedModule>,
    dependencies: Vec<Arc<LoadedModule>>,
    owned: Vec<Weak<LoadedModule>>,
}

impl IsolationDomain {
    /// Load a module file and its dependencies
    pub fn load(path: impl AsRef<Path>, host: &HostLoadSpace, config: &RuntimeConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ScriptError::load_error(path, "file not found"));
        }

        let mut resolver = DependencyResolver::new(host, config);
        if let Some(name) = module_name_from_path(path) {
            resolver.visit(&name);
        }
        if let Some(manifest) = DependencyManifest::location(path, &config.manifest_suffix) {
            resolver.resolve_manifest(&manifest)?;
        }

        let main = Arc::new(LoadedModule::open(path, &resolver.known_aggregates())?);
        Ok(Self::assemble(main, resolver))
    }

    /// Load a table linked into the host process, resolving dependencies
    /// from an optional manifest file
    pub fn load_static(
        export: &'static ModuleExport,
        manifest: Option<&Path>,
        host: &HostLoadSpace,
        config: &RuntimeConfig,
    ) -> Result<Self> {
        let mut resolver = DependencyResolver::new(host, config);
        if let Some(name) = unsafe { read_c_str(export.name) } {
            resolver.visit(&name);
        }
        if let Some(manifest) = manifest {
            resolver.resolve_manifest(manifest)?;
        }

        let main = Arc::new(LoadedModule::from_static(export, &resolver.known_aggregates())?);
        Ok(Self::assemble(main, resolver))
    }

    fn assemble(main: Arc<LoadedModule>, resolver: DependencyResolver<'_>) -> Self {
        let mut owned = resolver.owned;
        owned.push(Arc::downgrade(&main));
        Self {
            main,
            dependencies: resolver.modules,
            owned,
        }
    }

    pub fn name(&self) -> &str {
        self.main.name()
    }

    pub fn main_module(&self) -> &Arc<LoadedModule> {
        &self.main
    }

    /// Main module first, then dependencies in load order
    pub fn modules(&self) -> impl Iterator<Item = &Arc<LoadedModule>> {
        std::iter::once(&self.main).chain(self.dependencies.iter())
    }

    /// Find a type: main module first, then dependencies in load order, then
    /// whatever the host preloaded
    pub fn find_type(
        &self,
        name: &str,
        host: &HostLoadSpace,
    ) -> Option<(Arc<LoadedModule>, Arc<ScriptType>)> {
        let name = strip_qualifier(name);
        self.modules()
            .cloned()
            .chain(host.modules())
            .find_map(|m| m.find_type(name).map(|t| (m.clone(), t)))
    }

    /// Names of the main module's types
    pub fn type_names(&self) -> Vec<String> {
        self.main.types().iter().map(|t| t.name().to_string()).collect()
    }

    /// Resolve a type name used in a signature. Aggregates of the domain's
    /// modules shadow those of the host load space.
    pub fn resolve_type_name(&self, name: &str, host: &HostLoadSpace) -> Result<TypeTag> {
        let mut aggregates: Vec<Arc<AggregateLayout>> = self
            .modules()
            .flat_map(|m| m.aggregates().iter().cloned())
            .collect();
        aggregates.extend(host.aggregates());
        resolve_in(name, &aggregates).ok_or_else(|| ScriptError::UnknownType(name.to_string()))
    }

    /// Liveness witness over the modules this domain loaded
    pub fn witness(&self) -> DomainWitness {
        DomainWitness {
            modules: self.owned.clone(),
        }
    }

    /// Release the domain's references and return its witness
    pub fn unload(self) -> DomainWitness {
        let witness = self.witness();
        log::info!("Unloading domain '{}'", self.name());
        drop(self);
        witness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_core::{ModuleBuilder, ScriptValue, TypeBuilder};
    use std::ffi::c_void;

    unsafe extern "C" fn noop(
        _this: *mut c_void,
        _args: *const ScriptValue,
        _count: usize,
        _ret: *mut ScriptValue,
    ) -> i32 {
        CALL_OK
    }

    fn test_export() -> &'static ModuleExport {
        ModuleBuilder::new("domain_test", "0.1.0")
            .aggregate("Test.Pair", &[ScalarKind::Int32, ScalarKind::Int32])
            .aggregate("Plume.Core.Vector3", &[ScalarKind::Int32])
            .with_type(
                TypeBuilder::new("Test.Thing")
                    .static_method("Swap", "Test.Pair", &["Test.Pair"], noop)
                    .static_method("Move", "void", &["Plume.Core.Vector3, plume_core"], noop)
                    .static_method("Broken", "double", &[], noop),
            )
            .build()
            .leak()
    }

    #[test]
    fn test_static_load_reads_table() {
        let domain = IsolationDomain::load_static(
            test_export(),
            None,
            &HostLoadSpace::new(),
            &RuntimeConfig::default(),
        )
        .unwrap();

        assert_eq!(domain.name(), "domain_test");
        assert_eq!(domain.type_names(), vec!["Test.Thing".to_string()]);

        let (_, ty) = domain.find_type("Test.Thing", &HostLoadSpace::new()).unwrap();
        // Broken uses an unknown type and is skipped
        assert_eq!(ty.methods().len(), 2);
        assert_eq!(ty.methods()[1].params, vec![TypeTag::vector3()]);
    }

    #[test]
    fn test_core_redeclaration_is_ignored() {
        let host = HostLoadSpace::new();
        let domain = IsolationDomain::load_static(
            test_export(),
            None,
            &host,
            &RuntimeConfig::default(),
        )
        .unwrap();

        assert_eq!(domain.main_module().aggregates().len(), 1);
        assert_eq!(
            domain.resolve_type_name("Plume.Core.Vector3", &host).unwrap(),
            TypeTag::vector3()
        );
        let pair = domain.resolve_type_name("Test.Pair, domain_test", &host).unwrap();
        assert_eq!(pair.size(), 8);
        assert!(matches!(
            domain.resolve_type_name("Test.Missing", &host),
            Err(ScriptError::UnknownType(_))
        ));
    }

    #[test]
    fn test_witness_tracks_release() {
        let domain = IsolationDomain::load_static(
            test_export(),
            None,
            &HostLoadSpace::new(),
            &RuntimeConfig::default(),
        )
        .unwrap();

        let held = domain.main_module().clone();
        let witness = domain.unload();
        assert!(witness.is_alive());
        drop(held);
        assert!(!witness.is_alive());
        assert_eq!(witness.alive_count(), 0);
    }

    #[test]
    fn test_library_names() {
        let names = library_file_names("physics");
        assert_eq!(names[0], "libphysics.so");
        assert!(names.contains(&"physics.dll".to_string()));
        assert!(names.contains(&"libphysics.dylib".to_string()));
        assert_eq!(
            module_name_from_path(Path::new("/tmp/libgame.so")).as_deref(),
            if cfg!(windows) { Some("libgame") } else { Some("game") }
        );
    }

    #[test]
    fn test_missing_file() {
        let err = IsolationDomain::load(
            "/nonexistent/libnothing.so",
            &HostLoadSpace::new(),
            &RuntimeConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ScriptError::LoadError { .. }));
    }

    #[test]
    fn test_shadow_copy_is_private() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("libgame.so");
        std::fs::write(&original, b"image v1").unwrap();

        let first = shadow_copy(&original).unwrap();
        let second = shadow_copy(&original).unwrap();
        assert_ne!(&*first, &*second);
        assert_ne!(&*first, original.as_path());
        assert_eq!(first.extension(), original.extension());
        assert_eq!(std::fs::read(&first).unwrap(), b"image v1");

        // Rewriting the original leaves the copy alone
        std::fs::write(&original, b"image v2").unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), b"image v1");

        let copied = first.to_path_buf();
        drop(first);
        assert!(!copied.exists());

        let missing = dir.path().join("libgone.so");
        match shadow_copy(&missing) {
            Err(ScriptError::LoadError { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected LoadError, got {:?}", other.err()),
        }
    }
}
