//! # Bridge: Runtime Access to Host Internals
//!
//! **Role**: Reaches process-internal state that is not otherwise exposed (the
//! service registry, the main-thread singleton, the context's memoized package
//! manager) through a narrow, name-based capability.
//!
//! **Core Types**:
//! - `RuntimeAccess`: read/write/invoke a named member of a `TargetKind`.
//! - `HostValue` / `HostObject`: what a member can hold.
//! - `accessors`: one typed accessor per member the hook needs; callers never
//!   pass member names around themselves.
//! - `host::InProcessHost`: an in-memory host whose member set is described by
//!   a `HostProfile`, so missing members on older hosts can be reproduced.
//!
//! The bridge is not a general hooking tool. It only ever touches the members
//! listed in [`accessors::members`].

pub mod accessors;
pub mod host;
pub mod service;

pub use accessors::{
    ActivityThread, ApplicationInfoAccess, BridgedRegistry, ContextImpl, ServiceManager,
};
pub use host::{HostProfile, InProcessHost};
pub use service::{InstalledPackage, LocalPackageService};

use common::{RemoteHandle, ServiceCache};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Host-internal classes the bridge knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKind {
    ServiceManager,
    ActivityThread,
    ContextImpl,
    ContextWrapper,
    ApplicationInfo,
}

impl TargetKind {
    pub fn class_name(self) -> &'static str {
        match self {
            TargetKind::ServiceManager => "android.os.ServiceManager",
            TargetKind::ActivityThread => "android.app.ActivityThread",
            TargetKind::ContextImpl => "android.app.ContextImpl",
            TargetKind::ContextWrapper => "android.content.ContextWrapper",
            TargetKind::ApplicationInfo => "android.content.pm.ApplicationInfo",
        }
    }
}

impl std::str::FromStr for TargetKind {
    type Err = String;

    /// Accepts the simple class name or the fully qualified one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            TargetKind::ServiceManager,
            TargetKind::ActivityThread,
            TargetKind::ContextImpl,
            TargetKind::ContextWrapper,
            TargetKind::ApplicationInfo,
        ]
        .into_iter()
        .find(|kind| {
            let class = kind.class_name();
            s == class || class.rsplit('.').next() == Some(s)
        })
        .ok_or_else(|| format!("Unknown host class: {}", s))
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

/// Errors from runtime access.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Member {target}.{member} does not exist on this host")]
    MissingMember { target: TargetKind, member: String },
    #[error("Member {target}.{member} holds {found}, expected {expected}")]
    TypeMismatch {
        target: TargetKind,
        member: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Receiver is a {found}, expected {expected}")]
    WrongReceiver {
        expected: TargetKind,
        found: TargetKind,
    },
    #[error("Context wrapper chain deeper than {0} levels")]
    ChainTooDeep(usize),
    #[error("Invocation of {target}.{member} failed: {reason}")]
    InvocationFailed {
        target: TargetKind,
        member: String,
        reason: String,
    },
}

/// Value stored in, or returned by, a host member.
#[derive(Debug, Clone)]
pub enum HostValue {
    Null,
    Str(String),
    Handle(RemoteHandle),
    Cache(ServiceCache),
    Object(HostObject),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Str(_) => "string",
            HostValue::Handle(_) => "handle",
            HostValue::Cache(_) => "service cache",
            HostValue::Object(_) => "object",
        }
    }

    pub(crate) fn from_handle(handle: Option<RemoteHandle>) -> Self {
        handle.map_or(HostValue::Null, HostValue::Handle)
    }
}

/// An instance living in the host process, addressed by reference.
///
/// Clones alias the same instance.
#[derive(Debug, Clone)]
pub struct HostObject(Arc<ObjectCell>);

#[derive(Debug)]
struct ObjectCell {
    kind: TargetKind,
    fields: DashMap<String, HostValue>,
}

impl HostObject {
    pub fn new(kind: TargetKind) -> Self {
        Self(Arc::new(ObjectCell {
            kind,
            fields: DashMap::new(),
        }))
    }

    /// Seeds a field while building host state.
    pub fn with_field(self, member: &str, value: HostValue) -> Self {
        self.0.fields.insert(member.to_owned(), value);
        self
    }

    pub fn kind(&self) -> TargetKind {
        self.0.kind
    }

    /// Returns `true` if both references denote the same instance.
    pub fn same_object(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn field(&self, member: &str) -> HostValue {
        self.0
            .fields
            .get(member)
            .map(|v| v.value().clone())
            .unwrap_or(HostValue::Null)
    }

    pub(crate) fn set_field(&self, member: &str, value: HostValue) {
        self.0.fields.insert(member.to_owned(), value);
    }
}

/// Name-based access to host internals.
///
/// Every operation fails with `AccessError::MissingMember` when `member` does
/// not exist on `target` in the running host version. Nothing is touched
/// beyond the member named.
pub trait RuntimeAccess: Send + Sync {
    /// Checks that `target.member` exists without reading it.
    fn resolve_member(&self, target: TargetKind, member: &str) -> Result<(), AccessError>;

    fn read_static(&self, target: TargetKind, member: &str) -> Result<HostValue, AccessError>;

    fn write_static(
        &self,
        target: TargetKind,
        member: &str,
        value: HostValue,
    ) -> Result<(), AccessError>;

    fn read_field(
        &self,
        target: TargetKind,
        object: &HostObject,
        member: &str,
    ) -> Result<HostValue, AccessError>;

    fn write_field(
        &self,
        target: TargetKind,
        object: &HostObject,
        member: &str,
        value: HostValue,
    ) -> Result<(), AccessError>;

    /// Invokes a named static method.
    fn invoke_named(
        &self,
        target: TargetKind,
        member: &str,
        args: &[HostValue],
    ) -> Result<HostValue, AccessError>;
}
