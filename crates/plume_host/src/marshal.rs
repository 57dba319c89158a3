//! Invocation marshaling
//!
//! Native callers pass an array of argument slot pointers and a return buffer.
//! Each slot is decoded per the bound signature's declared type only:
//!
//! | Type        | Wire form                                         |
//! |-------------|---------------------------------------------------|
//! | `int32`     | 4 bytes, little-endian two's complement           |
//! | `float32`   | 4 bytes, little-endian IEEE-754                   |
//! | `bool`      | 4-byte integer, nonzero is true                   |
//! | aggregates  | packed fields, 4 bytes each, no padding           |
//!
//! Slots are read as bytes, so they need no particular alignment.

use crate::error::{Result, ScriptError};
use crate::method::BoundMethod;
use crate::signature::FixedSignature;
use crate::types::{AggregateLayout, CoreAggregate, TypeTag};
use plume_core::{ScalarKind, ScriptValue, Transform, ValueKind, Vector3};
use std::ffi::c_void;

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}

fn read_f32s<const N: usize>(bytes: &[u8]) -> [f32; N] {
    let mut out = [0.0f32; N];
    for (i, v) in out.iter_mut().enumerate() {
        *v = f32::from_bits(read_u32(bytes, i * 4));
    }
    out
}

fn write_f32s(values: &[f32], out: &mut [u8]) {
    for (i, v) in values.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
    }
}

fn normalize_field(kind: ScalarKind, word: u32) -> u32 {
    match kind {
        ScalarKind::Bool => (word != 0) as u32,
        ScalarKind::Int32 | ScalarKind::Float32 => word,
    }
}

fn ensure_len(tag: &TypeTag, len: usize) -> Result<()> {
    if len < tag.size() {
        return Err(ScriptError::InvalidArgument(format!(
            "{} needs {} bytes, buffer has {}",
            tag,
            tag.size(),
            len
        )));
    }
    Ok(())
}

/// Decode one wire value
pub fn decode_value(tag: &TypeTag, bytes: &[u8]) -> Result<ScriptValue> {
    ensure_len(tag, bytes.len())?;
    let value = match tag {
        TypeTag::Void => {
            return Err(ScriptError::InvalidArgument("void has no value".into()));
        }
        TypeTag::Int32 => ScriptValue::int32(read_u32(bytes, 0) as i32),
        TypeTag::Float32 => ScriptValue::float32(f32::from_bits(read_u32(bytes, 0))),
        TypeTag::Bool => ScriptValue::bool(read_u32(bytes, 0) != 0),
        TypeTag::Aggregate(layout) => match layout.core {
            Some(CoreAggregate::Vector3) => ScriptValue::vector3(Vector3::from_array(read_f32s(bytes))),
            Some(CoreAggregate::Transform) => {
                ScriptValue::transform(Transform::from_array(read_f32s(bytes)))
            }
            None => decode_aggregate(layout, bytes)?,
        },
    };
    Ok(value)
}

fn decode_aggregate(layout: &AggregateLayout, bytes: &[u8]) -> Result<ScriptValue> {
    let words: Vec<u32> = layout
        .fields
        .iter()
        .enumerate()
        .map(|(i, kind)| normalize_field(*kind, read_u32(bytes, i * 4)))
        .collect();
    ScriptValue::aggregate(&words)
        .ok_or_else(|| ScriptError::InvalidArgument(format!("{} has too many fields", layout.name)))
}

/// Whether a value has the kind a type tag expects
pub fn value_matches(tag: &TypeTag, value: &ScriptValue) -> bool {
    match (tag, value.kind()) {
        (TypeTag::Void, _) => true,
        (TypeTag::Int32, Some(ValueKind::Int32)) => true,
        (TypeTag::Float32, Some(ValueKind::Float32)) => true,
        (TypeTag::Bool, Some(ValueKind::Bool)) => true,
        (TypeTag::Aggregate(layout), Some(kind)) => match layout.core {
            Some(CoreAggregate::Vector3) => kind == ValueKind::Vector3,
            Some(CoreAggregate::Transform) => kind == ValueKind::Transform,
            None => value
                .as_aggregate()
                .map(|words| words.len() == layout.fields.len())
                .unwrap_or(false),
        },
        _ => false,
    }
}

/// Encode one value into its wire form. `value` must match `tag`.
pub fn encode_value(tag: &TypeTag, value: &ScriptValue, out: &mut [u8]) -> Result<()> {
    ensure_len(tag, out.len())?;
    if !value_matches(tag, value) {
        return Err(ScriptError::InvalidArgument(format!(
            "cannot encode {:?} as {}",
            value, tag
        )));
    }

    match tag {
        TypeTag::Void => {}
        TypeTag::Int32 => {
            let v = value.as_int32().unwrap_or_default();
            out[..4].copy_from_slice(&v.to_le_bytes());
        }
        TypeTag::Float32 => {
            let v = value.as_float32().unwrap_or_default();
            out[..4].copy_from_slice(&v.to_le_bytes());
        }
        TypeTag::Bool => {
            let v = value.as_bool().unwrap_or_default() as u32;
            out[..4].copy_from_slice(&v.to_le_bytes());
        }
        TypeTag::Aggregate(layout) => match layout.core {
            Some(CoreAggregate::Vector3) => {
                let v = value.as_vector3().unwrap_or_default();
                write_f32s(&v.to_array(), out);
            }
            Some(CoreAggregate::Transform) => {
                let t = value.as_transform().unwrap_or_default();
                write_f32s(&t.to_array(), out);
            }
            None => {
                let words = value.as_aggregate().unwrap_or_default();
                for (i, (kind, word)) in layout.fields.iter().zip(words).enumerate() {
                    let word = normalize_field(*kind, *word);
                    out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
                }
            }
        },
    }
    Ok(())
}

/// Call a bound method with values already in canonical form
pub fn invoke_values(method: &BoundMethod, args: &[ScriptValue]) -> Result<ScriptValue> {
    let signature = method.signature();
    if args.len() != signature.arity() {
        return Err(ScriptError::ArityMismatch {
            expected: signature.arity(),
            actual: args.len().min(i32::MAX as usize) as i32,
        });
    }

    for (i, (tag, arg)) in signature.params.iter().zip(args).enumerate() {
        if !value_matches(tag, arg) {
            return Err(ScriptError::InvalidArgument(format!(
                "argument {} of {} must be {}, got {:?}",
                i,
                method.name(),
                tag,
                arg
            )));
        }
    }

    let ret = method.call(args)?;
    check_return(method, &ret)?;
    if signature.return_type.is_void() {
        Ok(ScriptValue::void())
    } else {
        Ok(ret)
    }
}

fn check_return(method: &BoundMethod, ret: &ScriptValue) -> Result<()> {
    let expected = &method.signature().return_type;
    if value_matches(expected, ret) {
        Ok(())
    } else {
        Err(ScriptError::invocation_failed(
            method.name(),
            format!("returned {:?} for a {} return", ret, expected),
        ))
    }
}

/// Decode raw argument slots, call, and encode the result into `ret`.
///
/// Checks run in order: arity, argument pointers, return buffer. Nothing is
/// read from `args` when the count is wrong, and the method is not run when
/// the return buffer is missing.
///
/// # Safety
/// `args` must point at `arg_count` slot pointers, each addressing at least
/// the wire size of its declared type. A non-null `ret` must address at least
/// the wire size of the return type.
pub unsafe fn invoke_raw(
    method: &BoundMethod,
    args: *const *const c_void,
    arg_count: i32,
    ret: *mut c_void,
) -> Result<()> {
    let signature = method.signature();
    if arg_count < 0 || arg_count as usize != signature.arity() {
        return Err(ScriptError::ArityMismatch {
            expected: signature.arity(),
            actual: arg_count,
        });
    }

    if signature.arity() > 0 && args.is_null() {
        return Err(ScriptError::InvalidArgument("argument array is null".into()));
    }

    let mut values = Vec::with_capacity(signature.arity());
    for (i, tag) in signature.params.iter().enumerate() {
        let slot = args.add(i).read_unaligned();
        if slot.is_null() {
            return Err(ScriptError::InvalidArgument(format!("argument {} is null", i)));
        }
        let bytes = std::slice::from_raw_parts(slot as *const u8, tag.size());
        values.push(decode_value(tag, bytes)?);
    }

    let return_type = &signature.return_type;
    if !return_type.is_void() && ret.is_null() {
        return Err(ScriptError::NullReturnBuffer(return_type.to_string()));
    }

    let result = method.call(&values)?;
    if return_type.is_void() {
        return Ok(());
    }

    check_return(method, &result)?;
    let out = std::slice::from_raw_parts_mut(ret as *mut u8, return_type.size());
    encode_value(return_type, &result, out)
}

fn ensure_fixed(method: &BoundMethod, fixed: FixedSignature) -> Result<()> {
    if fixed.matches(method.signature()) {
        Ok(())
    } else {
        Err(ScriptError::SignatureMismatch {
            method: method.name().to_string(),
            expected: fixed.signature().to_string(),
            found: method.signature().to_string(),
        })
    }
}

fn slot(bytes: &[u8]) -> *const c_void {
    bytes.as_ptr() as *const c_void
}

fn vector_bytes(v: Vector3) -> [u8; Vector3::SIZE] {
    let mut out = [0u8; Vector3::SIZE];
    write_f32s(&v.to_array(), &mut out);
    out
}

/// `() -> void`
pub fn invoke_void(method: &BoundMethod) -> Result<()> {
    ensure_fixed(method, FixedSignature::Void)?;
    unsafe { invoke_raw(method, std::ptr::null(), 0, std::ptr::null_mut()) }
}

/// `(float32) -> void`
pub fn invoke_float(method: &BoundMethod, value: f32) -> Result<()> {
    ensure_fixed(method, FixedSignature::Float)?;
    let arg = value.to_le_bytes();
    let slots = [slot(&arg)];
    unsafe { invoke_raw(method, slots.as_ptr(), 1, std::ptr::null_mut()) }
}

/// `(int32, int32) -> int32`
pub fn invoke_int2(method: &BoundMethod, a: i32, b: i32) -> Result<i32> {
    ensure_fixed(method, FixedSignature::Int2)?;
    let (a, b) = (a.to_le_bytes(), b.to_le_bytes());
    let slots = [slot(&a), slot(&b)];
    let mut out = [0u8; 4];
    unsafe { invoke_raw(method, slots.as_ptr(), 2, out.as_mut_ptr() as *mut c_void)? };
    Ok(i32::from_le_bytes(out))
}

/// `(Vector3, Vector3) -> Vector3`
pub fn invoke_vector3(method: &BoundMethod, a: Vector3, b: Vector3) -> Result<Vector3> {
    ensure_fixed(method, FixedSignature::Vector3Pair)?;
    let (a, b) = (vector_bytes(a), vector_bytes(b));
    let slots = [slot(&a), slot(&b)];
    let mut out = [0u8; Vector3::SIZE];
    unsafe { invoke_raw(method, slots.as_ptr(), 2, out.as_mut_ptr() as *mut c_void)? };
    Ok(Vector3::from_array(read_f32s(&out)))
}

/// `(Transform) -> void`
pub fn invoke_transform_in(method: &BoundMethod, transform: &Transform) -> Result<()> {
    ensure_fixed(method, FixedSignature::TransformIn)?;
    let mut arg = [0u8; Transform::SIZE];
    write_f32s(&transform.to_array(), &mut arg);
    let slots = [slot(&arg)];
    unsafe { invoke_raw(method, slots.as_ptr(), 1, std::ptr::null_mut()) }
}

/// `() -> Transform`
pub fn invoke_transform_out(method: &BoundMethod) -> Result<Transform> {
    ensure_fixed(method, FixedSignature::TransformOut)?;
    let mut out = [0u8; Transform::SIZE];
    unsafe { invoke_raw(method, std::ptr::null(), 0, out.as_mut_ptr() as *mut c_void)? };
    Ok(Transform::from_array(read_f32s(&out)))
}
