//! Opaque handles handed across the native boundary
//!
//! Handles are positive `i32`s so they fit the boundary's status convention
//! (`0` means failure). Counters are owned by the script context rather than
//! by a generation, so a handle value is never issued twice for the lifetime
//! of the context, even across reloads.

use crate::error::{Result, ScriptError};
use std::fmt;
use uuid::Uuid;

/// Integer handle of a script instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub i32);

/// Integer handle of a bound method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub i32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Either addressing form of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceKey {
    Id(InstanceId),
    Guid(Uuid),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::Id(id) => write!(f, "{}", id),
            InstanceKey::Guid(guid) => write!(f, "{{{}}}", guid),
        }
    }
}

impl From<InstanceId> for InstanceKey {
    fn from(id: InstanceId) -> Self {
        InstanceKey::Id(id)
    }
}

impl From<Uuid> for InstanceKey {
    fn from(guid: Uuid) -> Self {
        InstanceKey::Guid(guid)
    }
}

/// Monotonic allocator of positive handle values
#[derive(Debug)]
pub struct HandleCounter {
    next: i32,
}

impl HandleCounter {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocate the next value. Values are never reused.
    pub fn allocate(&mut self) -> Result<i32> {
        let value = self.next;
        self.next = self
            .next
            .checked_add(1)
            .ok_or_else(|| ScriptError::InvalidArgument("handle space exhausted".into()))?;
        Ok(value)
    }

    /// The value the next allocation will return
    pub fn peek(&self) -> i32 {
        self.next
    }
}

impl Default for HandleCounter {
    fn default() -> Self {
        Self::new()
    }
}
