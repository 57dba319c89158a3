//! Host log sink
//!
//! The native host may hand the runtime a C callback at creation. Significant
//! events are forwarded to it as null-terminated UTF-8 in addition to the
//! `log` facade.

use std::ffi::{c_char, CString};

/// Log callback supplied by the native host
pub type LogSinkFn = unsafe extern "C" fn(message: *const c_char);

/// Optional host log sink
#[derive(Clone, Copy, Default)]
pub struct HostHook {
    sink: Option<LogSinkFn>,
}

impl HostHook {
    pub fn new(sink: Option<LogSinkFn>) -> Self {
        Self { sink }
    }

    /// A hook that forwards nothing
    pub fn none() -> Self {
        Self { sink: None }
    }

    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }

    /// Forward a message to the host. Interior NULs are dropped.
    pub fn log(&self, message: &str) {
        let Some(sink) = self.sink else {
            return;
        };

        let text = if message.contains('\0') {
            message.replace('\0', "")
        } else {
            message.to_string()
        };

        if let Ok(c_message) = CString::new(text) {
            // SAFETY: the host promised a callable sink; the string outlives the call
            unsafe { sink(c_message.as_ptr()) };
        }
    }
}

impl std::fmt::Debug for HostHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHook")
            .field("attached", &self.is_attached())
            .finish()
    }
}
