//! Integration tests for the script context against the sample module

use plume_core::{Transform, Vector3};
use plume_host::*;
use std::ffi::c_void;
use uuid::Uuid;

const SIG_INT2: i32 = 0;
const SIG_VEC2: i32 = 1;
const SIG_VOID: i32 = 2;
const SIG_FLOAT: i32 = 3;

fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        reclaim_interval_ms: 1,
        ..RuntimeConfig::default()
    }
}

fn load_sample(ctx: &mut ScriptContext) {
    ctx.load_static_module(plume_sample::module_export(), None)
        .unwrap();
    ctx.register_signature(SIG_INT2, "int", &["int", "int"]).unwrap();
    ctx.register_signature(SIG_VEC2, "Plume.Core.Vector3", &["Plume.Core.Vector3", "Plume.Core.Vector3"])
        .unwrap();
    ctx.register_signature(SIG_VOID, "void", &[]).unwrap();
    ctx.register_signature(SIG_FLOAT, "void", &["float"]).unwrap();
}

fn loaded() -> ScriptContext {
    let mut ctx = ScriptContext::new(test_config());
    load_sample(&mut ctx);
    ctx
}

fn int_slot(value: &i32) -> *const c_void {
    value as *const i32 as *const c_void
}

#[test]
fn test_handles_are_never_reused() {
    let mut ctx = loaded();

    let first = ctx.create_instance("Sample.Calculator").unwrap();
    ctx.destroy_instance(first).unwrap();
    let second = ctx.create_instance("Sample.Calculator").unwrap();

    assert_ne!(first, second);
    assert!(second > first);
}

#[test]
fn test_int_arithmetic() {
    let mut ctx = loaded();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    let add = ctx.bind_instance_method(calc, "Add", SIG_INT2).unwrap();
    let mul = ctx.bind_instance_method(calc, "Multiply", SIG_INT2).unwrap();

    assert_eq!(ctx.invoke_int2(add, 2, 3).unwrap(), 5);
    assert_eq!(ctx.invoke_int2(mul, 2, 3).unwrap(), 6);
    assert_eq!(ctx.invoke_int2(add, -4, 7).unwrap(), 3);
    assert_eq!(ctx.invoke_int2(mul, -4, 7).unwrap(), -28);
}

#[test]
fn test_raw_invoke() {
    let mut ctx = loaded();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    let add = ctx.bind_instance_method(calc, "Add", SIG_INT2).unwrap();

    let (a, b) = (2i32, 3i32);
    let args = [int_slot(&a), int_slot(&b)];
    let mut out = 0i32;
    unsafe {
        ctx.invoke(add, args.as_ptr(), 2, &mut out as *mut i32 as *mut c_void)
            .unwrap();
    }
    assert_eq!(out, 5);
}

#[test]
fn test_vector_arithmetic() {
    let mut ctx = loaded();
    let math = ctx.create_instance("Sample.VectorMath").unwrap();
    let add = ctx.bind_instance_method(math, "Add", SIG_VEC2).unwrap();
    let mul = ctx.bind_instance_method(math, "Multiply", SIG_VEC2).unwrap();

    let a = Vector3::new(1.0, 2.0, 3.0);
    let b = Vector3::new(4.0, 5.0, 6.0);
    assert_eq!(ctx.invoke_vector3(add, a, b).unwrap(), Vector3::new(5.0, 7.0, 9.0));
    assert_eq!(ctx.invoke_vector3(mul, a, b).unwrap(), Vector3::new(4.0, 10.0, 18.0));
}

#[test]
fn test_signature_mismatch_on_return_type() {
    let mut ctx = loaded();
    ctx.register_signature(10, "float", &["int", "int"]).unwrap();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();

    let err = ctx.bind_instance_method(calc, "Add", 10).unwrap_err();
    assert!(matches!(err, ScriptError::SignatureMismatch { .. }));

    // Same parameters, matching return type
    assert!(ctx.bind_instance_method(calc, "Add", SIG_INT2).is_ok());
}

#[test]
fn test_overload_resolution() {
    let mut ctx = loaded();
    ctx.register_signature(11, "float", &["float", "float"]).unwrap();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    let add = ctx.bind_instance_method(calc, "Add", 11).unwrap();

    let ret = ctx
        .invoke_values(add, &[plume_core::ScriptValue::float32(1.5), plume_core::ScriptValue::float32(2.0)])
        .unwrap();
    assert_eq!(ret.as_float32(), Some(3.5));
}

#[test]
fn test_destroy_twice_is_not_an_error() {
    let mut ctx = loaded();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();

    ctx.destroy_instance(calc).unwrap();
    ctx.destroy_instance(calc).unwrap();
    ctx.destroy_instance(InstanceId(9999)).unwrap();
    assert_eq!(ctx.instance_count(), 0);
}

#[test]
fn test_reload_invalidates_handles() {
    let mut ctx = loaded();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    let add = ctx.bind_instance_method(calc, "Add", SIG_INT2).unwrap();
    assert_eq!(ctx.generation(), Some(1));

    load_sample(&mut ctx);
    assert_eq!(ctx.generation(), Some(2));
    assert_eq!(ctx.instance_count(), 0);
    assert_eq!(ctx.method_count(), 0);

    assert!(matches!(
        ctx.bind_instance_method(calc, "Add", SIG_INT2),
        Err(ScriptError::InstanceNotFound(_))
    ));
    assert!(matches!(ctx.invoke_int2(add, 1, 1), Err(ScriptError::MethodNotFound(_))));

    // New handles never take the value of a stale one
    let calc2 = ctx.create_instance("Sample.Calculator").unwrap();
    let add2 = ctx.bind_instance_method(calc2, "Add", SIG_INT2).unwrap();
    assert!(calc2 > calc);
    assert!(add2 > add);
    assert!(matches!(ctx.invoke_int2(add, 1, 1), Err(ScriptError::MethodNotFound(_))));
    assert_eq!(ctx.invoke_int2(add2, 1, 1).unwrap(), 2);

    // Handles from the previous generation are rejected, not ignored
    assert!(matches!(
        ctx.destroy_instance(calc),
        Err(ScriptError::InstanceNotFound(InstanceKey::Id(id))) if id == calc
    ));
    assert!(matches!(ctx.unbind_method(add), Err(ScriptError::MethodNotFound(_))));
    assert!(ctx.has_instance(calc2));

    // Destroying a handle of this generation twice is still fine
    ctx.destroy_instance(calc2).unwrap();
    ctx.destroy_instance(calc2).unwrap();
    ctx.unbind_method(add2).unwrap();
    ctx.unbind_method(add2).unwrap();
}

#[test]
fn test_wrong_arg_count_is_arity_mismatch() {
    let mut ctx = loaded();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    let add = ctx.bind_instance_method(calc, "Add", SIG_INT2).unwrap();

    let mut out = 0i32;
    let ret = &mut out as *mut i32 as *mut c_void;
    for count in [0, 1, 3, -1] {
        // The argument array is never read when the count is wrong
        let err = unsafe { ctx.invoke(add, std::ptr::null(), count, ret) }.unwrap_err();
        assert!(
            matches!(err, ScriptError::ArityMismatch { expected: 2, actual } if actual == count),
            "count {} gave {}",
            count,
            err
        );
    }
}

#[test]
fn test_null_argument_pointers() {
    let mut ctx = loaded();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    let add = ctx.bind_instance_method(calc, "Add", SIG_INT2).unwrap();

    let mut out = 0i32;
    let ret = &mut out as *mut i32 as *mut c_void;
    let err = unsafe { ctx.invoke(add, std::ptr::null(), 2, ret) }.unwrap_err();
    assert!(matches!(err, ScriptError::InvalidArgument(_)));

    let a = 1i32;
    let args = [int_slot(&a), std::ptr::null()];
    let err = unsafe { ctx.invoke(add, args.as_ptr(), 2, ret) }.unwrap_err();
    assert!(matches!(err, ScriptError::InvalidArgument(_)));
}

#[test]
fn test_null_return_buffer_skips_call() {
    let mut ctx = loaded();
    ctx.register_signature(12, "int", &[]).unwrap();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    let add = ctx.bind_instance_method(calc, "Add", SIG_INT2).unwrap();
    let calls = ctx.bind_instance_method(calc, "Calls", 12).unwrap();

    let (a, b) = (1i32, 2i32);
    let args = [int_slot(&a), int_slot(&b)];
    let err = unsafe { ctx.invoke(add, args.as_ptr(), 2, std::ptr::null_mut()) }.unwrap_err();
    assert!(matches!(err, ScriptError::NullReturnBuffer(_)));

    let count = ctx.invoke_values(calls, &[]).unwrap();
    assert_eq!(count.as_int32(), Some(0));
}

#[test]
fn test_void_tolerates_null_return_buffer() {
    let mut ctx = loaded();
    let player = ctx.create_instance("Sample.Player").unwrap();
    let start = ctx.bind_instance_method(player, "OnStart", SIG_VOID).unwrap();

    unsafe { ctx.invoke(start, std::ptr::null(), 0, std::ptr::null_mut()) }.unwrap();
}

#[test]
fn test_operations_require_loaded_module() {
    let mut ctx = loaded();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    ctx.unload();

    assert!(!ctx.is_loaded());
    assert_eq!(ctx.module_name(), None);
    assert!(matches!(ctx.create_instance("Sample.Calculator"), Err(ScriptError::NoModuleLoaded)));
    assert!(matches!(ctx.destroy_instance(calc), Err(ScriptError::NoModuleLoaded)));
    assert!(matches!(
        ctx.bind_instance_method(calc, "Add", SIG_INT2),
        Err(ScriptError::NoModuleLoaded)
    ));
    assert!(matches!(ctx.register_signature(0, "int", &[]), Err(ScriptError::NoModuleLoaded)));
}

#[test]
fn test_construction_errors() {
    let mut ctx = loaded();
    assert!(matches!(
        ctx.create_instance("Sample.Missing"),
        Err(ScriptError::TypeNotFound(_))
    ));
    assert!(matches!(
        ctx.create_instance("Sample.Broken"),
        Err(ScriptError::ConstructionError { .. })
    ));
    assert!(matches!(
        ctx.create_instance("Sample.Faulty"),
        Err(ScriptError::ConstructionError { .. })
    ));
    assert_eq!(ctx.instance_count(), 0);
}

#[test]
fn test_static_binding() {
    let mut ctx = loaded();

    let max = ctx.bind_static_method("Sample.Calculator", "Max", SIG_INT2).unwrap();
    assert_eq!(ctx.invoke_int2(max, 4, 7).unwrap(), 7);

    let err = ctx.bind_static_method("Sample.Calculator", "Add", SIG_INT2).unwrap_err();
    assert!(matches!(err, ScriptError::NotStatic { .. }));

    let err = ctx.bind_static_method("Sample.Nowhere", "Max", SIG_INT2).unwrap_err();
    assert!(matches!(err, ScriptError::TypeNotFound(_)));

    // Instance binds do not see static methods
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    let err = ctx.bind_instance_method(calc, "Max", SIG_INT2).unwrap_err();
    assert!(matches!(err, ScriptError::MethodNotFound(_)));

    // Static methods of a type without a constructor
    ctx.register_signature(13, "int", &[]).unwrap();
    let ping = ctx.bind_static_method("Sample.Broken", "Ping", 13).unwrap();
    assert_eq!(ctx.invoke_values(ping, &[]).unwrap().as_int32(), Some(1));
}

#[test]
fn test_bind_errors() {
    let mut ctx = loaded();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();

    assert!(matches!(
        ctx.bind_instance_method(calc, "Add", 99),
        Err(ScriptError::SignatureNotRegistered(99))
    ));
    assert!(matches!(
        ctx.bind_instance_method(InstanceId(4242), "Add", SIG_INT2),
        Err(ScriptError::InstanceNotFound(_))
    ));
    assert!(matches!(
        ctx.bind_instance_method(calc, "Subtract", SIG_INT2),
        Err(ScriptError::MethodNotFound(_))
    ));
    assert_eq!(ctx.method_count(), 0);
}

#[test]
fn test_signature_registration() {
    let mut ctx = loaded();

    assert!(matches!(
        ctx.register_signature(SIG_INT2, "int", &["int", "int"]),
        Err(ScriptError::SignatureAlreadyRegistered(SIG_INT2))
    ));
    assert!(matches!(
        ctx.register_signature(20, "double", &[]),
        Err(ScriptError::UnknownType(_))
    ));
    assert!(matches!(
        ctx.register_signature(21, "void", &["Sample.Unknown"]),
        Err(ScriptError::UnknownType(_))
    ));
    assert!(matches!(
        ctx.register_signature(-1, "void", &[]),
        Err(ScriptError::InvalidArgument(_))
    ));

    // Case-insensitive primitives and assembly-qualified aggregates
    ctx.register_signature(22, "BOOL", &["Int32"]).unwrap();
    ctx.register_signature(23, "void", &["Plume.Core.Transform, plume_core"]).unwrap();
    assert_eq!(ctx.signature(22).unwrap().to_string(), "(int32) -> bool");
}

#[test]
fn test_bool_and_float_marshaling() {
    let mut ctx = loaded();
    ctx.register_signature(30, "bool", &["int"]).unwrap();
    ctx.register_signature(31, "float", &["float"]).unwrap();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    let positive = ctx.bind_instance_method(calc, "IsPositive", 30).unwrap();
    let half = ctx.bind_instance_method(calc, "Half", 31).unwrap();

    let value = 5i32;
    let args = [int_slot(&value)];
    let mut out = [0xAAu8; 4];
    unsafe { ctx.invoke(positive, args.as_ptr(), 1, out.as_mut_ptr() as *mut c_void) }.unwrap();
    assert_eq!(u32::from_le_bytes(out), 1);

    let value = -5i32;
    let args = [int_slot(&value)];
    unsafe { ctx.invoke(positive, args.as_ptr(), 1, out.as_mut_ptr() as *mut c_void) }.unwrap();
    assert_eq!(u32::from_le_bytes(out), 0);

    let value = 3.0f32.to_le_bytes();
    let args = [value.as_ptr() as *const c_void];
    unsafe { ctx.invoke(half, args.as_ptr(), 1, out.as_mut_ptr() as *mut c_void) }.unwrap();
    assert_eq!(f32::from_le_bytes(out), 1.5);
}

#[test]
fn test_plugin_failures() {
    let mut ctx = loaded();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    let divide = ctx.bind_instance_method(calc, "Divide", SIG_INT2).unwrap();

    assert_eq!(ctx.invoke_int2(divide, 9, 3).unwrap(), 3);
    assert!(matches!(
        ctx.invoke_int2(divide, 1, 0),
        Err(ScriptError::InvocationFailed { .. })
    ));

    // Declared int, returns float
    ctx.register_signature(40, "int", &[]).unwrap();
    let liar = ctx.bind_static_method("Sample.Broken", "Liar", 40).unwrap();
    let mut out = 0i32;
    let err = unsafe { ctx.invoke(liar, std::ptr::null(), 0, &mut out as *mut i32 as *mut c_void) }
        .unwrap_err();
    assert!(matches!(err, ScriptError::InvocationFailed { .. }));
}

#[test]
fn test_narrow_entry_points_check_shape() {
    let mut ctx = loaded();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    let add = ctx.bind_instance_method(calc, "Add", SIG_INT2).unwrap();

    assert!(matches!(ctx.invoke_void(add), Err(ScriptError::SignatureMismatch { .. })));
    assert!(matches!(ctx.invoke_float(add, 1.0), Err(ScriptError::SignatureMismatch { .. })));
    assert!(matches!(
        ctx.invoke_transform_out(add),
        Err(ScriptError::SignatureMismatch { .. })
    ));
}

#[test]
fn test_player_lifecycle() {
    let mut ctx = loaded();
    ctx.register_signature(50, "void", &["Plume.Core.Transform"]).unwrap();
    ctx.register_signature(51, "Plume.Core.Transform", &[]).unwrap();
    ctx.register_signature(52, "int", &[]).unwrap();
    ctx.register_signature(53, "bool", &[]).unwrap();

    let player = ctx.create_instance("Sample.Player").unwrap();
    let start = ctx.bind_instance_method(player, "OnStart", SIG_VOID).unwrap();
    let update = ctx.bind_instance_method(player, "OnUpdate", SIG_FLOAT).unwrap();
    let set = ctx.bind_instance_method(player, "SetTransform", 50).unwrap();
    let get = ctx.bind_instance_method(player, "GetTransform", 51).unwrap();
    let frames = ctx.bind_instance_method(player, "FrameCount", 52).unwrap();
    let started = ctx.bind_instance_method(player, "HasStarted", 53).unwrap();

    assert_eq!(ctx.invoke_transform_out(get).unwrap(), Transform::identity());

    ctx.invoke_void(start).unwrap();
    for _ in 0..3 {
        ctx.invoke_float(update, 1.0 / 60.0).unwrap();
    }
    assert_eq!(ctx.invoke_values(frames, &[]).unwrap().as_int32(), Some(3));
    assert_eq!(ctx.invoke_values(started, &[]).unwrap().as_bool(), Some(true));

    let moved = Transform::new(
        Vector3::new(1.0, 2.0, 3.0),
        Vector3::new(0.0, 90.0, 0.0),
        Vector3::new(2.0, 2.0, 2.0),
    );
    ctx.invoke_transform_in(set, &moved).unwrap();
    assert_eq!(ctx.invoke_transform_out(get).unwrap(), moved);
}

#[test]
fn test_dispose_runs_on_destroy_only() {
    let mut ctx = loaded();

    let before = plume_sample::disposed_count();
    let player = ctx.create_instance("Sample.Player").unwrap();
    ctx.destroy_instance(player).unwrap();
    assert!(plume_sample::disposed_count() >= before + 1);

    ctx.register_signature(60, "int", &[]).unwrap();
    let count = ctx.bind_static_method("Sample.Player", "DisposedCount", 60).unwrap();
    let reported = ctx.invoke_values(count, &[]).unwrap().as_int32().unwrap();
    assert!(reported >= before + 1);
}

#[test]
fn test_guid_instances() {
    let mut ctx = loaded();
    let guid = Uuid::new_v4();

    ctx.create_instance_with_guid(guid, "Sample.Player").unwrap();
    assert!(ctx.has_instance(guid));
    assert!(matches!(
        ctx.create_instance_with_guid(guid, "Sample.Player"),
        Err(ScriptError::DuplicateInstance(g)) if g == guid
    ));

    let update = ctx.bind_instance_method_by_guid(guid, "OnUpdate", SIG_FLOAT).unwrap();
    ctx.invoke_float(update, 0.5).unwrap();

    ctx.destroy_instance_by_guid(guid).unwrap();
    ctx.destroy_instance_by_guid(guid).unwrap();
    assert!(!ctx.has_instance(guid));
    assert!(matches!(
        ctx.bind_instance_method_by_guid(guid, "OnUpdate", SIG_FLOAT),
        Err(ScriptError::InstanceNotFound(InstanceKey::Guid(g))) if g == guid
    ));

    // The bound method keeps its object alive after destruction
    ctx.invoke_float(update, 0.5).unwrap();
}

#[test]
fn test_module_aggregate() {
    let mut ctx = loaded();
    ctx.register_signature(70, "Sample.Color", &["Sample.Color", "float"]).unwrap();
    let brighten = ctx.bind_static_method("Sample.Palette", "Brighten", 70).unwrap();

    let mut color = [0u8; 16];
    for (i, channel) in [0.25f32, 0.5, 0.75, 0.5].iter().enumerate() {
        color[i * 4..i * 4 + 4].copy_from_slice(&channel.to_le_bytes());
    }
    let factor = 2.0f32.to_le_bytes();
    let args = [color.as_ptr() as *const c_void, factor.as_ptr() as *const c_void];

    let mut out = [0u8; 16];
    unsafe { ctx.invoke(brighten, args.as_ptr(), 2, out.as_mut_ptr() as *mut c_void) }.unwrap();

    let channels: Vec<f32> = out
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(channels, vec![0.5, 1.0, 1.0, 0.5]);
}

#[test]
fn test_unbind_method() {
    let mut ctx = loaded();
    let calc = ctx.create_instance("Sample.Calculator").unwrap();
    let add = ctx.bind_instance_method(calc, "Add", SIG_INT2).unwrap();
    assert_eq!(ctx.method_count(), 1);

    ctx.unbind_method(add).unwrap();
    ctx.unbind_method(add).unwrap();
    assert_eq!(ctx.method_count(), 0);
    assert!(matches!(ctx.invoke_int2(add, 1, 2), Err(ScriptError::MethodNotFound(_))));
}

#[test]
fn test_introspection() {
    let ctx = loaded();
    assert!(ctx.is_loaded());
    assert_eq!(ctx.module_name(), Some("plume_sample"));
    assert_eq!(ctx.signature_count(), 4);

    let types = ctx.type_names();
    assert!(types.contains(&"Sample.Calculator".to_string()));
    assert!(types.contains(&"Sample.Player".to_string()));
}
