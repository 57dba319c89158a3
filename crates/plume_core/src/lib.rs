//! # plume_core - Shared Core Types
//!
//! The types in this crate are shared by the host and every plugin module.
//! They are never loaded a second time inside an isolation domain: a plugin
//! that depends on `plume_core` always binds to the host's copy, so the
//! aggregate types crossing the boundary keep a single identity.
//!
//! ## Contents
//!
//! - [`interop`]: the fixed wire layouts of [`Vector3`] and [`Transform`]
//! - [`value`]: [`ScriptValue`], the canonical value passed to plugin methods
//! - [`ffi`]: the registration table a plugin exports
//! - [`builder`]: safe construction of that table for Rust plugins

pub mod builder;
pub mod ffi;
pub mod interop;
pub mod value;

pub use builder::{Disposable, ModuleBuilder, ModuleDefinition, TypeBuilder};
pub use ffi::*;
pub use interop::{Transform, Vector3, CORE_NAMESPACE, TRANSFORM_TYPE_NAME, VECTOR3_TYPE_NAME};
pub use value::{ScalarKind, ScriptValue, ValueKind, ValuePayload, MAX_AGGREGATE_FIELDS};

/// Name under which plugin manifests refer to this crate
pub const SHARED_CORE_MODULE: &str = "plume_core";

/// Re-export commonly used types
pub mod prelude {
    pub use crate::builder::{Disposable, ModuleBuilder, ModuleDefinition, TypeBuilder};
    pub use crate::ffi::{
        arguments, receiver, ModuleExport, CALL_OK, MODULE_ENTRY_SYMBOL, PLUME_ABI_VERSION,
    };
    pub use crate::interop::{Transform, Vector3};
    pub use crate::value::{ScalarKind, ScriptValue, ValueKind};
}
