//! # plume_host - Script Host Runtime
//!
//! Lets a native host load, call into, hot-swap and unload plugin modules
//! without restarting the process.
//!
//! ## Overview
//!
//! A plugin is a dynamic library exporting a registration table (see
//! [`plume_core::ffi`]). The [`ScriptContext`] loads it into an
//! [`IsolationDomain`], creates script objects from its types, binds their
//! methods against registered signatures and marshals raw native buffers in
//! and out of each call.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │   Native host   │────▶│    boundary     │  plume_* C entry points
//! └─────────────────┘     └────────┬────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ SignatureTable  │◀────│  ScriptContext  │  one generation at a time
//! │ InstanceRegistry│     │                 │
//! │ MethodRegistry  │     └────────┬────────┘
//! └─────────────────┘              │
//!                                  ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │   libloading    │◀────│ IsolationDomain │  module + dependencies
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use plume_host::prelude::*;
//!
//! let mut context = ScriptContext::new(RuntimeConfig::load(None)?);
//! context.load_module("target/debug/libgame.so")?;
//!
//! context.register_signature(0, "void", &["float"])?;
//! let player = context.create_instance("Game.Player")?;
//! let update = context.bind_instance_method(player, "OnUpdate", 0)?;
//!
//! context.invoke_float(update, 1.0 / 60.0)?;
//!
//! // Rebuild the plugin, then:
//! context.reload_module()?; // every earlier handle is now invalid
//! ```

pub mod boundary;
mod config;
mod context;
mod domain;
mod error;
mod handle;
mod hook;
mod instance;
pub mod marshal;
mod method;
mod signature;
mod types;
#[cfg(feature = "hot-reload")]
mod watcher;

pub use boundary::ScriptRuntime;
pub use config::{HotReloadConfig, RuntimeConfig};
pub use context::ScriptContext;
pub use domain::{
    library_file_names, module_name_from_path, DependencyManifest, DependencySpec, DomainWitness,
    HostLoadSpace, IsolationDomain, LoadedModule, MethodEntry, ModuleImage, ScriptType,
};
pub use error::{Result, ScriptError};
pub use handle::{HandleCounter, InstanceId, InstanceKey, MethodId};
pub use hook::{HostHook, LogSinkFn};
pub use instance::{InstanceRegistry, ScriptObject};
pub use method::{find_method, BoundMethod, MethodRegistry};
pub use signature::{FixedSignature, Signature, SignatureTable};
pub use types::{AggregateId, AggregateLayout, CoreAggregate, TypeTag};
#[cfg(feature = "hot-reload")]
pub use watcher::{is_library_file, ModuleWatcher};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::RuntimeConfig;
    pub use crate::context::ScriptContext;
    pub use crate::error::{Result, ScriptError};
    pub use crate::handle::{InstanceId, MethodId};
    pub use plume_core::{Transform, Vector3};
    #[cfg(feature = "hot-reload")]
    pub use crate::watcher::ModuleWatcher;
}
