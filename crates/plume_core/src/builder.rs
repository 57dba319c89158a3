//! Safe construction of a module registration table
//!
//! Plugins written in Rust describe their types with [`ModuleBuilder`] and
//! keep the resulting [`ModuleDefinition`] in a static. The definition owns
//! every string and table the exported [`ModuleExport`] points into.
//!
//! ```ignore
//! static MODULE: OnceLock<ModuleDefinition> = OnceLock::new();
//!
//! #[no_mangle]
//! pub extern "C" fn plume_module_entry() -> *const ModuleExport {
//!     MODULE.get_or_init(|| {
//!         ModuleBuilder::new("game", "1.0.0")
//!             .with_type(
//!                 TypeBuilder::of::<Player>("Game.Player")
//!                     .method("OnUpdate", "void", &["float"], player_update),
//!             )
//!             .build()
//!     }).export()
//! }
//! ```

use crate::ffi::*;
use crate::value::ScalarKind;
use std::ffi::{c_char, c_void, CString};

/// Script types that want a callback when the host destroys them explicitly
pub trait Disposable {
    fn dispose(&mut self);
}

unsafe extern "C" fn construct_thunk<T: Default>() -> *mut c_void {
    Box::into_raw(Box::new(T::default())) as *mut c_void
}

unsafe extern "C" fn release_thunk<T>(this: *mut c_void) {
    if !this.is_null() {
        drop(Box::from_raw(this as *mut T));
    }
}

unsafe extern "C" fn dispose_thunk<T: Disposable>(this: *mut c_void) {
    if let Some(object) = (this as *mut T).as_mut() {
        object.dispose();
    }
}

struct MethodSpec {
    name: String,
    flags: u32,
    return_type: String,
    params: Vec<String>,
    invoke: MethodFn,
}

/// Describes one exported script type
pub struct TypeBuilder {
    name: String,
    construct: Option<ConstructFn>,
    dispose: Option<DisposeFn>,
    release: Option<ReleaseFn>,
    methods: Vec<MethodSpec>,
}

impl TypeBuilder {
    /// A type without a constructor. Only its static methods are usable.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            construct: None,
            dispose: None,
            release: None,
            methods: Vec::new(),
        }
    }

    /// A type constructed with `T::default()` and freed as a `Box<T>`
    pub fn of<T: Default + 'static>(name: impl Into<String>) -> Self {
        Self {
            construct: Some(construct_thunk::<T>),
            release: Some(release_thunk::<T>),
            ..Self::new(name)
        }
    }

    /// Route explicit destruction to `T::dispose`
    pub fn disposable<T: Disposable + 'static>(mut self) -> Self {
        self.dispose = Some(dispose_thunk::<T>);
        self
    }

    /// Use hand-written lifecycle callbacks
    pub fn with_lifecycle(
        mut self,
        construct: Option<ConstructFn>,
        release: Option<ReleaseFn>,
    ) -> Self {
        self.construct = construct;
        self.release = release;
        self
    }

    /// Add an instance method
    pub fn method(self, name: &str, return_type: &str, params: &[&str], invoke: MethodFn) -> Self {
        self.push_method(name, 0, return_type, params, invoke)
    }

    /// Add a static method
    pub fn static_method(self, name: &str, return_type: &str, params: &[&str], invoke: MethodFn) -> Self {
        self.push_method(name, METHOD_FLAG_STATIC, return_type, params, invoke)
    }

    fn push_method(
        mut self,
        name: &str,
        flags: u32,
        return_type: &str,
        params: &[&str],
        invoke: MethodFn,
    ) -> Self {
        self.methods.push(MethodSpec {
            name: name.to_string(),
            flags,
            return_type: return_type.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            invoke,
        });
        self
    }
}

/// Describes a whole module
pub struct ModuleBuilder {
    name: String,
    version: String,
    aggregates: Vec<(String, Vec<ScalarKind>)>,
    types: Vec<TypeBuilder>,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            aggregates: Vec::new(),
            types: Vec::new(),
        }
    }

    /// Declare a fixed-layout aggregate type
    pub fn aggregate(mut self, name: impl Into<String>, fields: &[ScalarKind]) -> Self {
        self.aggregates.push((name.into(), fields.to_vec()));
        self
    }

    pub fn with_type(mut self, ty: TypeBuilder) -> Self {
        self.types.push(ty);
        self
    }

    /// Freeze the description into an exportable table
    pub fn build(self) -> ModuleDefinition {
        let mut strings = Vec::new();
        let mut intern = |s: &str| -> *const c_char {
            let c = CString::new(s.replace('\0', "")).unwrap_or_default();
            let ptr = c.as_ptr();
            strings.push(c);
            ptr
        };

        let name = intern(&self.name);
        let version = intern(&self.version);

        let mut field_tables = Vec::with_capacity(self.aggregates.len());
        let mut aggregates = Vec::with_capacity(self.aggregates.len());
        for (agg_name, fields) in &self.aggregates {
            let raw: Vec<u32> = fields.iter().map(|k| *k as u32).collect();
            aggregates.push(AggregateExport {
                name: intern(agg_name),
                fields: raw.as_ptr(),
                field_count: raw.len(),
            });
            field_tables.push(raw);
        }

        let mut param_tables = Vec::new();
        let mut method_tables = Vec::with_capacity(self.types.len());
        let mut types = Vec::with_capacity(self.types.len());
        for ty in &self.types {
            let mut methods = Vec::with_capacity(ty.methods.len());
            for spec in &ty.methods {
                let params: Vec<*const c_char> = spec.params.iter().map(|p| intern(p)).collect();
                methods.push(MethodExport {
                    name: intern(&spec.name),
                    flags: spec.flags,
                    return_type: intern(&spec.return_type),
                    params: params.as_ptr(),
                    param_count: params.len(),
                    invoke: Some(spec.invoke),
                });
                param_tables.push(params);
            }

            types.push(TypeExport {
                name: intern(&ty.name),
                construct: ty.construct,
                dispose: ty.dispose,
                release: ty.release,
                methods: methods.as_ptr(),
                method_count: methods.len(),
            });
            method_tables.push(methods);
        }

        let export = Box::new(ModuleExport {
            abi_version: PLUME_ABI_VERSION,
            name,
            version,
            types: types.as_ptr(),
            type_count: types.len(),
            aggregates: aggregates.as_ptr(),
            aggregate_count: aggregates.len(),
        });

        ModuleDefinition {
            _strings: strings,
            _field_tables: field_tables,
            _param_tables: param_tables,
            _method_tables: method_tables,
            _aggregates: aggregates,
            _types: types,
            export,
        }
    }
}

/// Owner of a built registration table.
///
/// The heap buffers behind every `Vec` and `CString` never move once built,
/// so the pointers inside `export` stay valid for the definition's lifetime.
pub struct ModuleDefinition {
    _strings: Vec<CString>,
    _field_tables: Vec<Vec<u32>>,
    _param_tables: Vec<Vec<*const c_char>>,
    _method_tables: Vec<Vec<MethodExport>>,
    _aggregates: Vec<AggregateExport>,
    _types: Vec<TypeExport>,
    export: Box<ModuleExport>,
}

// Safety: the definition is immutable after build and owns all pointees
unsafe impl Send for ModuleDefinition {}
unsafe impl Sync for ModuleDefinition {}

impl ModuleDefinition {
    /// Pointer suitable for returning from `plume_module_entry`
    pub fn export(&self) -> *const ModuleExport {
        &*self.export
    }

    pub fn export_ref(&self) -> &ModuleExport {
        &self.export
    }

    /// Leak the definition, for tables that live as long as the process
    pub fn leak(self) -> &'static ModuleExport {
        let leaked: &'static ModuleDefinition = Box::leak(Box::new(self));
        leaked.export_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScriptValue;
    use std::ffi::CStr;

    #[derive(Default)]
    struct Counter {
        value: i32,
    }

    unsafe extern "C" fn counter_get(
        this: *mut c_void,
        _args: *const ScriptValue,
        _arg_count: usize,
        ret: *mut ScriptValue,
    ) -> i32 {
        match receiver::<Counter>(this) {
            Some(counter) => {
                *ret = ScriptValue::int32(counter.value);
                CALL_OK
            }
            None => 1,
        }
    }

    #[test]
    fn test_build_table() {
        let def = ModuleBuilder::new("test", "1.2.3")
            .aggregate("Test.Pair", &[ScalarKind::Int32, ScalarKind::Int32])
            .with_type(TypeBuilder::of::<Counter>("Test.Counter").method("Get", "int", &[], counter_get))
            .with_type(TypeBuilder::new("Test.Statics").static_method("Get", "int", &["int", "float"], counter_get))
            .build();

        let export = def.export_ref();
        assert_eq!(export.abi_version, PLUME_ABI_VERSION);
        assert_eq!(unsafe { CStr::from_ptr(export.name) }.to_str(), Ok("test"));
        assert_eq!(export.type_count, 2);
        assert_eq!(export.aggregate_count, 1);

        let types = unsafe { table_slice(export.types, export.type_count) };
        assert!(types[0].construct.is_some());
        assert!(types[1].construct.is_none());

        let methods = unsafe { table_slice(types[1].methods, types[1].method_count) };
        assert!(methods[0].is_static());
        let params = unsafe { table_slice(methods[0].params, methods[0].param_count) };
        assert_eq!(unsafe { CStr::from_ptr(params[1]) }.to_str(), Ok("float"));

        let aggs = unsafe { table_slice(export.aggregates, export.aggregate_count) };
        let fields = unsafe { table_slice(aggs[0].fields, aggs[0].field_count) };
        assert_eq!(fields, &[ScalarKind::Int32 as u32, ScalarKind::Int32 as u32]);
    }

    #[test]
    fn test_constructed_object_round_trip() {
        let def = ModuleBuilder::new("test", "1.0.0")
            .with_type(TypeBuilder::of::<Counter>("Test.Counter").method("Get", "int", &[], counter_get))
            .build();
        let ty = unsafe { &table_slice(def.export_ref().types, 1)[0] };
        let methods = unsafe { table_slice(ty.methods, ty.method_count) };

        unsafe {
            let object = (ty.construct.unwrap())();
            (object as *mut Counter).as_mut().unwrap().value = 41;

            let mut ret = ScriptValue::void();
            let status = (methods[0].invoke.unwrap())(object, std::ptr::null(), 0, &mut ret);
            assert_eq!(status, CALL_OK);
            assert_eq!(ret.as_int32(), Some(41));

            (ty.release.unwrap())(object);
        }
    }
}
