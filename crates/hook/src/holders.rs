//! Post-activation propagation.
//!
//! Some subsystems captured the handle by value before the hook was installed.
//! Holders either overwrite that captured field, or drop a memoized copy so it
//! is re-resolved through the hooked path on next access.

use bridge::{AccessError, ContextImpl, HostObject, HostValue, RuntimeAccess, TargetKind};
use common::RemoteHandle;
use std::sync::Arc;

/// A live reference outside the caches that must follow the active handle.
pub trait Holder: Send + Sync {
    fn name(&self) -> &str;

    /// Failing essential holders abort activation; others are skipped.
    fn essential(&self) -> bool {
        true
    }

    /// Makes the holder follow `handle`.
    fn propagate(&self, handle: &RemoteHandle) -> Result<(), AccessError>;
}

/// Overwrites a handle field on a known long-lived object.
pub struct FieldHolder {
    runtime: Arc<dyn RuntimeAccess>,
    object: HostObject,
    member: &'static str,
    name: String,
    essential: bool,
}

impl FieldHolder {
    pub fn new(runtime: Arc<dyn RuntimeAccess>, object: HostObject, member: &'static str) -> Self {
        let name = format!("{}.{}", object.kind(), member);
        Self {
            runtime,
            object,
            member,
            name,
            essential: true,
        }
    }

    /// Marks the field as best-effort.
    pub fn optional(mut self) -> Self {
        self.essential = false;
        self
    }
}

impl Holder for FieldHolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn essential(&self) -> bool {
        self.essential
    }

    fn propagate(&self, handle: &RemoteHandle) -> Result<(), AccessError> {
        let target: TargetKind = self.object.kind();
        self.runtime.write_field(
            target,
            &self.object,
            self.member,
            HostValue::Handle(Arc::clone(handle)),
        )
    }
}

/// Invalidates the base context's memoized package manager.
///
/// The context re-resolves it from the main thread on next access, which by
/// then points at whatever handle is active.
pub struct ContextPackageManager {
    runtime: Arc<dyn RuntimeAccess>,
    context: HostObject,
}

impl ContextPackageManager {
    pub fn new(runtime: Arc<dyn RuntimeAccess>, context: HostObject) -> Self {
        Self { runtime, context }
    }
}

impl Holder for ContextPackageManager {
    fn name(&self) -> &str {
        "ContextImpl.mPackageManager"
    }

    fn propagate(&self, _handle: &RemoteHandle) -> Result<(), AccessError> {
        ContextImpl::new(self.runtime.as_ref()).clear_package_manager(&self.context)
    }
}
