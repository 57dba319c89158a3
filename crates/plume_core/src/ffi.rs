//! C ABI of a plugin module
//!
//! A plugin is a dynamic library exporting [`MODULE_ENTRY_SYMBOL`], a function
//! returning a pointer to a [`ModuleExport`] registration table. The table
//! lists the module's types, their constructors and disposal callbacks, any
//! aggregate layouts the module declares, and every callable method together
//! with its declared parameter and return type names. The host resolves and
//! binds methods by looking them up in this table; there is no reflection.
//!
//! All tables, strings and function pointers must stay valid for as long as
//! the library stays loaded.

use crate::value::ScriptValue;
use std::ffi::{c_char, c_void};

/// ABI version for compatibility checking
pub const PLUME_ABI_VERSION: u32 = 1;

/// Symbol every plugin module exports
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"plume_module_entry\0";

/// Method flag: the method takes no receiver
pub const METHOD_FLAG_STATIC: u32 = 1;

/// Status returned by a method that completed normally
pub const CALL_OK: i32 = 0;

/// Entry point returning the module's registration table
pub type ModuleEntryFn = unsafe extern "C" fn() -> *const ModuleExport;

/// Zero-argument constructor. Returns an owned object pointer or null.
pub type ConstructFn = unsafe extern "C" fn() -> *mut c_void;

/// Explicit disposal, run before the host drops an instance on request
pub type DisposeFn = unsafe extern "C" fn(*mut c_void);

/// Frees an object produced by the matching [`ConstructFn`]
pub type ReleaseFn = unsafe extern "C" fn(*mut c_void);

/// Uniform calling convention for every exported method.
///
/// `this` is null for static methods. `args` points at `arg_count` decoded
/// values. The method writes its result to `ret` (left untouched for void) and
/// returns [`CALL_OK`], or any other value to report a failure.
pub type MethodFn = unsafe extern "C" fn(
    this: *mut c_void,
    args: *const ScriptValue,
    arg_count: usize,
    ret: *mut ScriptValue,
) -> i32;

/// Registration table returned by [`ModuleEntryFn`]
#[repr(C)]
pub struct ModuleExport {
    /// Must equal [`PLUME_ABI_VERSION`]
    pub abi_version: u32,
    /// Module name (null-terminated)
    pub name: *const c_char,
    /// Module version string (null-terminated, may be null)
    pub version: *const c_char,
    pub types: *const TypeExport,
    pub type_count: usize,
    pub aggregates: *const AggregateExport,
    pub aggregate_count: usize,
}

/// Fixed-layout aggregate declared by a module
#[repr(C)]
pub struct AggregateExport {
    /// Fully qualified name (null-terminated)
    pub name: *const c_char,
    /// Raw [`crate::ScalarKind`] discriminants, one per field
    pub fields: *const u32,
    pub field_count: usize,
}

/// A script type exported by a module
#[repr(C)]
pub struct TypeExport {
    /// Fully qualified name (null-terminated)
    pub name: *const c_char,
    pub construct: Option<ConstructFn>,
    pub dispose: Option<DisposeFn>,
    pub release: Option<ReleaseFn>,
    pub methods: *const MethodExport,
    pub method_count: usize,
}

/// A method exported by a script type
#[repr(C)]
pub struct MethodExport {
    /// Method name (null-terminated)
    pub name: *const c_char,
    /// Bit set of `METHOD_FLAG_*`
    pub flags: u32,
    /// Declared return type name (null-terminated)
    pub return_type: *const c_char,
    /// Declared parameter type names
    pub params: *const *const c_char,
    pub param_count: usize,
    pub invoke: Option<MethodFn>,
}

impl MethodExport {
    pub fn is_static(&self) -> bool {
        self.flags & METHOD_FLAG_STATIC != 0
    }
}

/// View `count` elements at `ptr`, treating a null pointer as empty.
///
/// # Safety
/// A non-null `ptr` must point at `count` initialized values that outlive `'a`.
pub unsafe fn table_slice<'a, T>(ptr: *const T, count: usize) -> &'a [T] {
    if ptr.is_null() || count == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, count)
    }
}

/// Borrow the receiver of an instance method.
///
/// # Safety
/// `this` must be a live object created by the type's [`ConstructFn`] as a
/// `Box<T>`, with no other live mutable borrow.
pub unsafe fn receiver<'a, T>(this: *mut c_void) -> Option<&'a mut T> {
    (this as *mut T).as_mut()
}

/// View the decoded argument array of a method call.
///
/// # Safety
/// Same contract as [`table_slice`].
pub unsafe fn arguments<'a>(args: *const ScriptValue, arg_count: usize) -> &'a [ScriptValue] {
    table_slice(args, arg_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_slice_null_is_empty() {
        let empty: &[u32] = unsafe { table_slice(std::ptr::null(), 4) };
        assert!(empty.is_empty());

        let data = [1u32, 2, 3];
        let view = unsafe { table_slice(data.as_ptr(), data.len()) };
        assert_eq!(view, &data);
    }

    #[test]
    fn test_static_flag() {
        let method = MethodExport {
            name: std::ptr::null(),
            flags: METHOD_FLAG_STATIC,
            return_type: std::ptr::null(),
            params: std::ptr::null(),
            param_count: 0,
            invoke: None,
        };
        assert!(method.is_static());
    }
}
