//! C ABI entry points for native hosts
//!
//! Every entry point takes the runtime created by [`plume_runtime_create`].
//! Strings are null-terminated UTF-8. Status convention: `0` is failure, any
//! other value is success or a positive handle. Failures are logged through
//! `log` and the host's sink; no panic crosses the boundary.

use crate::config::RuntimeConfig;
use crate::context::ScriptContext;
use crate::error::{Result, ScriptError};
use crate::handle::{InstanceId, MethodId};
use crate::hook::{HostHook, LogSinkFn};
use plume_core::{Transform, Vector3};
use std::ffi::{c_char, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use uuid::Uuid;

/// Status returned by entry points that have no handle to return
const STATUS_OK: i32 = 1;
const STATUS_FAILED: i32 = 0;

/// Runtime state owned by the native host
pub struct ScriptRuntime {
    pub context: ScriptContext,
    hook: HostHook,
}

impl ScriptRuntime {
    pub fn new(config: RuntimeConfig, hook: HostHook) -> Self {
        Self {
            context: ScriptContext::with_hook(config, hook),
            hook,
        }
    }

    fn report(&self, operation: &str, message: &str) {
        log::error!("{} failed: {}", operation, message);
        self.hook.log(&format!("{} failed: {}", operation, message));
    }
}

/// Run an entry point body with null and panic protection
unsafe fn guard<F>(runtime: *mut ScriptRuntime, operation: &str, body: F) -> i32
where
    F: FnOnce(&mut ScriptRuntime) -> Result<i32>,
{
    guard_with(runtime, operation, true, body)
}

/// Like [`guard`], for bodies whose errors the context has already reported
unsafe fn guard_reported<F>(runtime: *mut ScriptRuntime, operation: &str, body: F) -> i32
where
    F: FnOnce(&mut ScriptRuntime) -> Result<i32>,
{
    guard_with(runtime, operation, false, body)
}

unsafe fn guard_with<F>(runtime: *mut ScriptRuntime, operation: &str, report_errors: bool, body: F) -> i32
where
    F: FnOnce(&mut ScriptRuntime) -> Result<i32>,
{
    let Some(runtime) = runtime.as_mut() else {
        log::error!("{} failed: null runtime", operation);
        return STATUS_FAILED;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| body(&mut *runtime))) {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            if report_errors {
                runtime.report(operation, &e.to_string());
            }
            STATUS_FAILED
        }
        Err(_) => {
            runtime.report(operation, "panicked");
            STATUS_FAILED
        }
    }
}

unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(ScriptError::InvalidArgument(format!("{} is null", what)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| ScriptError::InvalidArgument(format!("{} is not valid UTF-8", what)))
}

unsafe fn guid(ptr: *const u8) -> Result<Uuid> {
    if ptr.is_null() {
        return Err(ScriptError::InvalidArgument("guid is null".into()));
    }
    let bytes = (ptr as *const [u8; 16]).read_unaligned();
    Ok(Uuid::from_bytes(bytes))
}

unsafe fn read_arg<T: Copy>(ptr: *const T, what: &str) -> Result<T> {
    if ptr.is_null() {
        return Err(ScriptError::InvalidArgument(format!("{} is null", what)));
    }
    Ok(ptr.read_unaligned())
}

unsafe fn write_out<T>(ptr: *mut T, value: T, what: &str) -> Result<()> {
    if ptr.is_null() {
        return Err(ScriptError::NullReturnBuffer(what.to_string()));
    }
    ptr.write_unaligned(value);
    Ok(())
}

// ========== Lifecycle ==========

/// Create a runtime configured from `PLUME_*` environment variables.
/// Returns null on failure.
#[no_mangle]
pub extern "C" fn plume_runtime_create(log_sink: Option<LogSinkFn>) -> *mut ScriptRuntime {
    let created = panic::catch_unwind(|| {
        let runtime = ScriptRuntime::new(RuntimeConfig::from_env(), HostHook::new(log_sink));
        Box::into_raw(Box::new(runtime))
    });
    created.unwrap_or_else(|_| {
        log::error!("plume_runtime_create panicked");
        std::ptr::null_mut()
    })
}

/// Destroy a runtime, unloading any module
///
/// # Safety
/// `runtime` must come from [`plume_runtime_create`] and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn plume_runtime_destroy(runtime: *mut ScriptRuntime) {
    if runtime.is_null() {
        return;
    }
    let runtime = Box::from_raw(runtime);
    if panic::catch_unwind(AssertUnwindSafe(|| drop(runtime))).is_err() {
        log::error!("plume_runtime_destroy panicked");
    }
}

/// # Safety
/// `runtime` must be live; `path` must be a C string.
#[no_mangle]
pub unsafe extern "C" fn plume_load_module(runtime: *mut ScriptRuntime, path: *const c_char) -> i32 {
    guard_reported(runtime, "load_module", |rt| {
        let path = c_str(path, "path").inspect_err(|e| rt.report("load_module", &e.to_string()))?;
        rt.context.load_module(path)?;
        Ok(STATUS_OK)
    })
}

/// # Safety
/// `runtime` must be live.
#[no_mangle]
pub unsafe extern "C" fn plume_unload_module(runtime: *mut ScriptRuntime) -> i32 {
    guard(runtime, "unload_module", |rt| {
        rt.context.unload();
        Ok(STATUS_OK)
    })
}

/// # Safety
/// `runtime` must be live.
#[no_mangle]
pub unsafe extern "C" fn plume_reload_module(runtime: *mut ScriptRuntime) -> i32 {
    guard_reported(runtime, "reload_module", |rt| {
        rt.context.reload_module()?;
        Ok(STATUS_OK)
    })
}

// ========== Signatures ==========

/// # Safety
/// `runtime` must be live; `param_names` must point at `param_count` C strings.
#[no_mangle]
pub unsafe extern "C" fn plume_register_signature(
    runtime: *mut ScriptRuntime,
    id: i32,
    return_type: *const c_char,
    param_names: *const *const c_char,
    param_count: i32,
) -> i32 {
    guard(runtime, "register_signature", |rt| {
        let return_type = c_str(return_type, "return type")?;
        if param_count < 0 {
            return Err(ScriptError::InvalidArgument("negative parameter count".into()));
        }
        if param_count > 0 && param_names.is_null() {
            return Err(ScriptError::InvalidArgument("parameter names are null".into()));
        }

        let mut params = Vec::with_capacity(param_count as usize);
        for i in 0..param_count as usize {
            params.push(c_str(param_names.add(i).read_unaligned(), "parameter name")?);
        }
        rt.context.register_signature(id, return_type, &params)?;
        Ok(STATUS_OK)
    })
}

// ========== Instances ==========

/// Returns the new instance handle, or 0.
///
/// # Safety
/// `runtime` must be live; `type_name` must be a C string.
#[no_mangle]
pub unsafe extern "C" fn plume_create_instance(runtime: *mut ScriptRuntime, type_name: *const c_char) -> i32 {
    guard(runtime, "create_instance", |rt| {
        let type_name = c_str(type_name, "type name")?;
        Ok(rt.context.create_instance(type_name)?.0)
    })
}

/// # Safety
/// `runtime` must be live; `guid` must point at 16 bytes.
#[no_mangle]
pub unsafe extern "C" fn plume_create_instance_guid(
    runtime: *mut ScriptRuntime,
    guid_bytes: *const u8,
    type_name: *const c_char,
) -> i32 {
    guard(runtime, "create_instance_guid", |rt| {
        let guid = guid(guid_bytes)?;
        let type_name = c_str(type_name, "type name")?;
        rt.context.create_instance_with_guid(guid, type_name)?;
        Ok(STATUS_OK)
    })
}

/// # Safety
/// `runtime` must be live.
#[no_mangle]
pub unsafe extern "C" fn plume_destroy_instance(runtime: *mut ScriptRuntime, instance: i32) -> i32 {
    guard(runtime, "destroy_instance", |rt| {
        rt.context.destroy_instance(InstanceId(instance))?;
        Ok(STATUS_OK)
    })
}

/// # Safety
/// `runtime` must be live; `guid` must point at 16 bytes.
#[no_mangle]
pub unsafe extern "C" fn plume_destroy_instance_guid(runtime: *mut ScriptRuntime, guid_bytes: *const u8) -> i32 {
    guard(runtime, "destroy_instance_guid", |rt| {
        rt.context.destroy_instance_by_guid(guid(guid_bytes)?)?;
        Ok(STATUS_OK)
    })
}

// ========== Binding ==========

/// Returns the new method handle, or 0.
///
/// # Safety
/// `runtime` must be live; `method` must be a C string.
#[no_mangle]
pub unsafe extern "C" fn plume_bind_instance_method(
    runtime: *mut ScriptRuntime,
    instance: i32,
    method: *const c_char,
    signature_id: i32,
) -> i32 {
    guard(runtime, "bind_instance_method", |rt| {
        let method = c_str(method, "method name")?;
        Ok(rt.context.bind_instance_method(InstanceId(instance), method, signature_id)?.0)
    })
}

/// # Safety
/// `runtime` must be live; `guid` must point at 16 bytes; `method` must be a C string.
#[no_mangle]
pub unsafe extern "C" fn plume_bind_instance_method_guid(
    runtime: *mut ScriptRuntime,
    guid_bytes: *const u8,
    method: *const c_char,
    signature_id: i32,
) -> i32 {
    guard(runtime, "bind_instance_method_guid", |rt| {
        let guid = guid(guid_bytes)?;
        let method = c_str(method, "method name")?;
        Ok(rt.context.bind_instance_method_by_guid(guid, method, signature_id)?.0)
    })
}

/// # Safety
/// `runtime` must be live; `type_name` and `method` must be C strings.
#[no_mangle]
pub unsafe extern "C" fn plume_bind_static_method(
    runtime: *mut ScriptRuntime,
    type_name: *const c_char,
    method: *const c_char,
    signature_id: i32,
) -> i32 {
    guard(runtime, "bind_static_method", |rt| {
        let type_name = c_str(type_name, "type name")?;
        let method = c_str(method, "method name")?;
        Ok(rt.context.bind_static_method(type_name, method, signature_id)?.0)
    })
}

/// # Safety
/// `runtime` must be live.
#[no_mangle]
pub unsafe extern "C" fn plume_unbind_method(runtime: *mut ScriptRuntime, method: i32) -> i32 {
    guard(runtime, "unbind_method", |rt| {
        rt.context.unbind_method(MethodId(method))?;
        Ok(STATUS_OK)
    })
}

// ========== Invocation ==========

/// # Safety
/// `runtime` must be live; `args` must point at `arg_count` argument slots
/// and `ret` at a buffer large enough for the return type (or be null for void).
#[no_mangle]
pub unsafe extern "C" fn plume_invoke(
    runtime: *mut ScriptRuntime,
    method: i32,
    args: *const *const c_void,
    arg_count: i32,
    ret: *mut c_void,
) -> i32 {
    guard(runtime, "invoke", |rt| {
        rt.context.invoke(MethodId(method), args, arg_count, ret)?;
        Ok(STATUS_OK)
    })
}

/// # Safety
/// `runtime` must be live.
#[no_mangle]
pub unsafe extern "C" fn plume_invoke_void(runtime: *mut ScriptRuntime, method: i32) -> i32 {
    guard(runtime, "invoke_void", |rt| {
        rt.context.invoke_void(MethodId(method))?;
        Ok(STATUS_OK)
    })
}

/// # Safety
/// `runtime` must be live.
#[no_mangle]
pub unsafe extern "C" fn plume_invoke_float(runtime: *mut ScriptRuntime, method: i32, value: f32) -> i32 {
    guard(runtime, "invoke_float", |rt| {
        rt.context.invoke_float(MethodId(method), value)?;
        Ok(STATUS_OK)
    })
}

/// # Safety
/// `runtime` must be live; `out` must be writable.
#[no_mangle]
pub unsafe extern "C" fn plume_invoke_int2(
    runtime: *mut ScriptRuntime,
    method: i32,
    a: i32,
    b: i32,
    out: *mut i32,
) -> i32 {
    guard(runtime, "invoke_int2", |rt| {
        if out.is_null() {
            return Err(ScriptError::NullReturnBuffer("int32".into()));
        }
        let result = rt.context.invoke_int2(MethodId(method), a, b)?;
        write_out(out, result, "int32")?;
        Ok(STATUS_OK)
    })
}

/// # Safety
/// `runtime` must be live; `a` and `b` must be readable; `out` must be writable.
#[no_mangle]
pub unsafe extern "C" fn plume_invoke_vector3(
    runtime: *mut ScriptRuntime,
    method: i32,
    a: *const Vector3,
    b: *const Vector3,
    out: *mut Vector3,
) -> i32 {
    guard(runtime, "invoke_vector3", |rt| {
        let a = read_arg(a, "first vector")?;
        let b = read_arg(b, "second vector")?;
        if out.is_null() {
            return Err(ScriptError::NullReturnBuffer(plume_core::VECTOR3_TYPE_NAME.into()));
        }
        let result = rt.context.invoke_vector3(MethodId(method), a, b)?;
        write_out(out, result, plume_core::VECTOR3_TYPE_NAME)?;
        Ok(STATUS_OK)
    })
}

/// # Safety
/// `runtime` must be live; `transform` must be readable.
#[no_mangle]
pub unsafe extern "C" fn plume_invoke_transform_in(
    runtime: *mut ScriptRuntime,
    method: i32,
    transform: *const Transform,
) -> i32 {
    guard(runtime, "invoke_transform_in", |rt| {
        let transform = read_arg(transform, "transform")?;
        rt.context.invoke_transform_in(MethodId(method), &transform)?;
        Ok(STATUS_OK)
    })
}

/// # Safety
/// `runtime` must be live; `out` must be writable.
#[no_mangle]
pub unsafe extern "C" fn plume_invoke_transform_out(
    runtime: *mut ScriptRuntime,
    method: i32,
    out: *mut Transform,
) -> i32 {
    guard(runtime, "invoke_transform_out", |rt| {
        if out.is_null() {
            return Err(ScriptError::NullReturnBuffer(plume_core::TRANSFORM_TYPE_NAME.into()));
        }
        let result = rt.context.invoke_transform_out(MethodId(method))?;
        write_out(out, result, plume_core::TRANSFORM_TYPE_NAME)?;
        Ok(STATUS_OK)
    })
}
