//! # plume_sample - Example Plugin Module
//!
//! Builds as a `cdylib` the script host can load from disk, and as an `rlib`
//! so tests can load its registration table without a build step.
//!
//! ## Types
//!
//! - `Sample.Calculator`: integer and float arithmetic, including overloads
//! - `Sample.VectorMath`: component-wise vector operations
//! - `Sample.Player`: per-frame script with a transform and disposal
//! - `Sample.Palette`: static helpers over the module's own `Sample.Color`
//! - `Sample.Broken`: no constructor, static methods only
//! - `Sample.Faulty`: a constructor that always fails

use plume_core::prelude::*;
use std::ffi::c_void;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::OnceLock;

/// Status a sample method returns on bad input
const CALL_FAILED: i32 = 1;

pub const COLOR_TYPE_NAME: &str = "Sample.Color";

static MODULE: OnceLock<ModuleDefinition> = OnceLock::new();
static DISPOSED: AtomicI32 = AtomicI32::new(0);

/// The module's registration table, built on first use
pub fn module_definition() -> &'static ModuleDefinition {
    MODULE.get_or_init(build_module)
}

pub fn module_export() -> &'static ModuleExport {
    module_definition().export_ref()
}

/// Number of players destroyed explicitly in this process
pub fn disposed_count() -> i32 {
    DISPOSED.load(Ordering::SeqCst)
}

#[no_mangle]
pub extern "C" fn plume_module_entry() -> *const ModuleExport {
    module_definition().export()
}

fn build_module() -> ModuleDefinition {
    ModuleBuilder::new("plume_sample", env!("CARGO_PKG_VERSION"))
        .aggregate(
            COLOR_TYPE_NAME,
            &[ScalarKind::Float32, ScalarKind::Float32, ScalarKind::Float32, ScalarKind::Float32],
        )
        .with_type(
            TypeBuilder::of::<Calculator>("Sample.Calculator")
                .method("Add", "int", &["int", "int"], calculator_add)
                .method("Multiply", "int", &["int", "int"], calculator_multiply)
                .method("Divide", "int", &["int", "int"], calculator_divide)
                .method("IsPositive", "bool", &["int"], calculator_is_positive)
                .method("Half", "float", &["float"], calculator_half)
                .method("Add", "float", &["float", "float"], calculator_add_float)
                .method("Calls", "int", &[], calculator_calls)
                .static_method("Max", "int", &["int", "int"], calculator_max),
        )
        .with_type(
            TypeBuilder::of::<VectorMath>("Sample.VectorMath")
                .method("Add", "Plume.Core.Vector3", &["Plume.Core.Vector3", "Plume.Core.Vector3"], vector_add)
                .method("Multiply", "Plume.Core.Vector3", &["Plume.Core.Vector3", "Plume.Core.Vector3"], vector_multiply)
                .static_method("Dot", "float", &["Plume.Core.Vector3", "Plume.Core.Vector3"], vector_dot),
        )
        .with_type(
            TypeBuilder::of::<Player>("Sample.Player")
                .disposable::<Player>()
                .method("OnStart", "void", &[], player_start)
                .method("OnUpdate", "void", &["float"], player_update)
                .method("HasStarted", "bool", &[], player_has_started)
                .method("SetTransform", "void", &["Plume.Core.Transform"], player_set_transform)
                .method("GetTransform", "Plume.Core.Transform", &[], player_get_transform)
                .method("FrameCount", "int", &[], player_frame_count)
                .method("Elapsed", "float", &[], player_elapsed)
                .static_method("DisposedCount", "int", &[], player_disposed_count),
        )
        .with_type(
            TypeBuilder::new("Sample.Palette")
                .static_method("Brighten", COLOR_TYPE_NAME, &[COLOR_TYPE_NAME, "float"], palette_brighten),
        )
        .with_type(
            TypeBuilder::new("Sample.Broken")
                .static_method("Ping", "int", &[], broken_ping)
                .static_method("Liar", "int", &[], broken_liar),
        )
        .with_type(TypeBuilder::new("Sample.Faulty").with_lifecycle(Some(faulty_construct), None))
        .build()
}

// ========== Argument helpers ==========

unsafe fn reply(ret: *mut ScriptValue, value: ScriptValue) -> i32 {
    match ret.as_mut() {
        Some(slot) => {
            *slot = value;
            CALL_OK
        }
        None => CALL_FAILED,
    }
}

fn int_pair(args: &[ScriptValue]) -> Option<(i32, i32)> {
    Some((args.first()?.as_int32()?, args.get(1)?.as_int32()?))
}

fn vector_pair(args: &[ScriptValue]) -> Option<(Vector3, Vector3)> {
    Some((args.first()?.as_vector3()?, args.get(1)?.as_vector3()?))
}

// ========== Sample.Calculator ==========

#[derive(Default)]
pub struct Calculator {
    calls: i32,
}

unsafe fn calculator_binary(
    this: *mut c_void,
    args: *const ScriptValue,
    count: usize,
    ret: *mut ScriptValue,
    op: fn(i32, i32) -> Option<i32>,
) -> i32 {
    let Some(calculator) = receiver::<Calculator>(this) else {
        return CALL_FAILED;
    };
    calculator.calls += 1;

    match int_pair(arguments(args, count)).and_then(|(a, b)| op(a, b)) {
        Some(result) => reply(ret, ScriptValue::int32(result)),
        None => CALL_FAILED,
    }
}

unsafe extern "C" fn calculator_add(this: *mut c_void, args: *const ScriptValue, count: usize, ret: *mut ScriptValue) -> i32 {
    calculator_binary(this, args, count, ret, |a, b| Some(a.wrapping_add(b)))
}

unsafe extern "C" fn calculator_multiply(this: *mut c_void, args: *const ScriptValue, count: usize, ret: *mut ScriptValue) -> i32 {
    calculator_binary(this, args, count, ret, |a, b| Some(a.wrapping_mul(b)))
}

unsafe extern "C" fn calculator_divide(this: *mut c_void, args: *const ScriptValue, count: usize, ret: *mut ScriptValue) -> i32 {
    calculator_binary(this, args, count, ret, |a, b| a.checked_div(b))
}

unsafe extern "C" fn calculator_is_positive(_this: *mut c_void, args: *const ScriptValue, count: usize, ret: *mut ScriptValue) -> i32 {
    match arguments(args, count).first().and_then(ScriptValue::as_int32) {
        Some(v) => reply(ret, ScriptValue::bool(v > 0)),
        None => CALL_FAILED,
    }
}

unsafe extern "C" fn calculator_half(_this: *mut c_void, args: *const ScriptValue, count: usize, ret: *mut ScriptValue) -> i32 {
    match arguments(args, count).first().and_then(ScriptValue::as_float32) {
        Some(v) => reply(ret, ScriptValue::float32(v * 0.5)),
        None => CALL_FAILED,
    }
}

unsafe extern "C" fn calculator_add_float(_this: *mut c_void, args: *const ScriptValue, count: usize, ret: *mut ScriptValue) -> i32 {
    let args = arguments(args, count);
    match (
        args.first().and_then(ScriptValue::as_float32),
        args.get(1).and_then(ScriptValue::as_float32),
    ) {
        (Some(a), Some(b)) => reply(ret, ScriptValue::float32(a + b)),
        _ => CALL_FAILED,
    }
}

unsafe extern "C" fn calculator_calls(this: *mut c_void, _args: *const ScriptValue, _count: usize, ret: *mut ScriptValue) -> i32 {
    match receiver::<Calculator>(this) {
        Some(calculator) => reply(ret, ScriptValue::int32(calculator.calls)),
        None => CALL_FAILED,
    }
}

unsafe extern "C" fn calculator_max(_this: *mut c_void, args: *const ScriptValue, count: usize, ret: *mut ScriptValue) -> i32 {
    match int_pair(arguments(args, count)) {
        Some((a, b)) => reply(ret, ScriptValue::int32(a.max(b))),
        None => CALL_FAILED,
    }
}

// ========== Sample.VectorMath ==========

#[derive(Default)]
pub struct VectorMath;

unsafe extern "C" fn vector_add(_this: *mut c_void, args: *const ScriptValue, count: usize, ret: *mut ScriptValue) -> i32 {
    match vector_pair(arguments(args, count)) {
        Some((a, b)) => reply(ret, ScriptValue::vector3(a.add(b))),
        None => CALL_FAILED,
    }
}

unsafe extern "C" fn vector_multiply(_this: *mut c_void, args: *const ScriptValue, count: usize, ret: *mut ScriptValue) -> i32 {
    match vector_pair(arguments(args, count)) {
        Some((a, b)) => reply(ret, ScriptValue::vector3(a.mul(b))),
        None => CALL_FAILED,
    }
}

unsafe extern "C" fn vector_dot(_this: *mut c_void, args: *const ScriptValue, count: usize, ret: *mut ScriptValue) -> i32 {
    match vector_pair(arguments(args, count)) {
        Some((a, b)) => reply(ret, ScriptValue::float32(a.dot(b))),
        None => CALL_FAILED,
    }
}

// ========== Sample.Player ==========

pub struct Player {
    transform: Transform,
    started: bool,
    frames: i32,
    elapsed: f32,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            transform: Transform::identity(),
            started: false,
            frames: 0,
            elapsed: 0.0,
        }
    }
}

impl Disposable for Player {
    fn dispose(&mut self) {
        DISPOSED.fetch_add(1, Ordering::SeqCst);
    }
}

unsafe extern "C" fn player_start(this: *mut c_void, _args: *const ScriptValue, _count: usize, _ret: *mut ScriptValue) -> i32 {
    match receiver::<Player>(this) {
        Some(player) => {
            player.started = true;
            CALL_OK
        }
        None => CALL_FAILED,
    }
}

unsafe extern "C" fn player_has_started(this: *mut c_void, _args: *const ScriptValue, _count: usize, ret: *mut ScriptValue) -> i32 {
    match receiver::<Player>(this) {
        Some(player) => reply(ret, ScriptValue::bool(player.started)),
        None => CALL_FAILED,
    }
}

unsafe extern "C" fn player_update(this: *mut c_void, args: *const ScriptValue, count: usize, _ret: *mut ScriptValue) -> i32 {
    let dt = arguments(args, count).first().and_then(ScriptValue::as_float32);
    match (receiver::<Player>(this), dt) {
        (Some(player), Some(dt)) => {
            player.frames += 1;
            player.elapsed += dt;
            CALL_OK
        }
        _ => CALL_FAILED,
    }
}

unsafe extern "C" fn player_set_transform(this: *mut c_void, args: *const ScriptValue, count: usize, _ret: *mut ScriptValue) -> i32 {
    let transform = arguments(args, count).first().and_then(ScriptValue::as_transform);
    match (receiver::<Player>(this), transform) {
        (Some(player), Some(transform)) => {
            player.transform = transform;
            CALL_OK
        }
        _ => CALL_FAILED,
    }
}

unsafe extern "C" fn player_get_transform(this: *mut c_void, _args: *const ScriptValue, _count: usize, ret: *mut ScriptValue) -> i32 {
    match receiver::<Player>(this) {
        Some(player) => reply(ret, ScriptValue::transform(player.transform)),
        None => CALL_FAILED,
    }
}

unsafe extern "C" fn player_frame_count(this: *mut c_void, _args: *const ScriptValue, _count: usize, ret: *mut ScriptValue) -> i32 {
    match receiver::<Player>(this) {
        Some(player) => reply(ret, ScriptValue::int32(player.frames)),
        None => CALL_FAILED,
    }
}

unsafe extern "C" fn player_elapsed(this: *mut c_void, _args: *const ScriptValue, _count: usize, ret: *mut ScriptValue) -> i32 {
    match receiver::<Player>(this) {
        Some(player) => reply(ret, ScriptValue::float32(player.elapsed)),
        None => CALL_FAILED,
    }
}

unsafe extern "C" fn player_disposed_count(_this: *mut c_void, _args: *const ScriptValue, _count: usize, ret: *mut ScriptValue) -> i32 {
    reply(ret, ScriptValue::int32(disposed_count()))
}

// ========== Sample.Palette ==========

unsafe extern "C" fn palette_brighten(_this: *mut c_void, args: *const ScriptValue, count: usize, ret: *mut ScriptValue) -> i32 {
    let args = arguments(args, count);
    let color = args.first().and_then(ScriptValue::as_aggregate);
    let factor = args.get(1).and_then(ScriptValue::as_float32);

    let (Some(color), Some(factor)) = (color, factor) else {
        return CALL_FAILED;
    };
    if color.len() != 4 {
        return CALL_FAILED;
    }

    let mut words = [0u32; 4];
    for (i, word) in words.iter_mut().enumerate() {
        let channel = f32::from_bits(color[i]);
        // Alpha is left alone
        let scaled = if i == 3 { channel } else { (channel * factor).min(1.0) };
        *word = scaled.to_bits();
    }

    match ScriptValue::aggregate(&words) {
        Some(value) => reply(ret, value),
        None => CALL_FAILED,
    }
}

// ========== Sample.Broken / Sample.Faulty ==========

unsafe extern "C" fn broken_ping(_this: *mut c_void, _args: *const ScriptValue, _count: usize, ret: *mut ScriptValue) -> i32 {
    reply(ret, ScriptValue::int32(1))
}

/// Declared as returning int, answers with a float
unsafe extern "C" fn broken_liar(_this: *mut c_void, _args: *const ScriptValue, _count: usize, ret: *mut ScriptValue) -> i32 {
    reply(ret, ScriptValue::float32(1.0))
}

unsafe extern "C" fn faulty_construct() -> *mut c_void {
    std::ptr::null_mut()
}
