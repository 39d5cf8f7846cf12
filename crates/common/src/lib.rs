//! # Common: The Call Surface
//!
//! **Role**: Shared vocabulary for every crate in the workspace.
//!
//! **Core Types**:
//! - `ServiceIdentity`: registry key of a remote service (e.g. `"package"`).
//! - `RemoteService` / `RemoteHandle`: the call surface of a remote service and
//!   the shared, immutable handle to it.
//! - `MethodSig` / `Call` / `Value`: one remote operation, its overload-exact
//!   signature and its arguments.
//! - `RemoteError`: every failure a remote call can surface to its caller.
//!
//! **Design**:
//! - Handles are compared by pointer identity (`same_handle`), never by value.
//!   Two slots hold "the same handle" only if they hold the same allocation.
//! - Overloads are distinct signatures. A `Call` carries its signature
//!   explicitly so dispatch never has to guess from argument values.

pub mod package;
pub mod registry;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

pub use package::{ApplicationInfo, ComponentName, EnabledState, PackageFlags, PackageInfo};
pub use registry::{ServiceCache, ServiceRegistry};

/// Key under which a remote service is registered with the process registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceIdentity(String);

impl ServiceIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceIdentity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Errors surfaced by a remote call.
///
/// Errors produced by the original service travel back through a proxy
/// unchanged; only `NoTarget` and `Policy` originate locally.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote object is dead")]
    DeadObject,
    #[error("Call rejected by remote: {0}")]
    Rejected(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(MethodSig),
    #[error("Bad arguments for {sig}: {reason}")]
    BadArguments { sig: MethodSig, reason: String },
    #[error("No target bound for {0}")]
    NoTarget(MethodSig),
    #[error("Interception policy failed for {sig}: {source}")]
    Policy {
        sig: MethodSig,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Declared kind of a remote operation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Bool,
    Int,
    Long,
    Str,
    Component,
    Package,
    Binder,
}

impl ParamKind {
    /// Reference-typed parameters accept `Value::Null`.
    pub fn is_nullable(self) -> bool {
        matches!(
            self,
            ParamKind::Str | ParamKind::Component | ParamKind::Package | ParamKind::Binder
        )
    }
}

/// Overload-exact signature of a remote operation.
///
/// ```
/// # use common::{MethodSig, ParamKind};
/// const SIG: MethodSig = MethodSig::new("getPackageInfo", &[ParamKind::Str, ParamKind::Int]);
/// assert_eq!(SIG.to_string(), "getPackageInfo(Str, Int)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    name: Cow<'static, str>,
    params: Cow<'static, [ParamKind]>,
}

impl MethodSig {
    pub const fn new(name: &'static str, params: &'static [ParamKind]) -> Self {
        Self {
            name: Cow::Borrowed(name),
            params: Cow::Borrowed(params),
        }
    }

    /// Builds a signature known only at runtime.
    pub fn owned(name: impl Into<String>, params: Vec<ParamKind>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            params: Cow::Owned(params),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{:?}", p)?;
        }
        f.write_str(")")
    }
}

/// The call surface of a remote service.
///
/// Implemented both by real service channels and by locally built proxies,
/// which is what lets a proxy stand in for the handle in any cache.
pub trait RemoteService: Send + Sync {
    /// Interface descriptor (e.g. `"android.content.pm.IPackageManager"`).
    fn descriptor(&self) -> &str;

    /// Performs one synchronous call.
    fn transact(&self, call: &Call) -> Result<Value, RemoteError>;
}

impl fmt::Debug for dyn RemoteService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteService")
            .field("descriptor", &self.descriptor())
            .finish()
    }
}

/// Shared handle to a remote service (or a proxy standing in for one).
pub type RemoteHandle = Arc<dyn RemoteService>;

/// Pointer identity of two handles.
///
/// Compares data pointers only; vtable pointers for the same type may differ
/// across codegen units.
pub fn same_handle(a: &RemoteHandle, b: &RemoteHandle) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Argument or result value of a remote call.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Str(String),
    Component(ComponentName),
    Package(Box<PackageInfo>),
    Binder(RemoteHandle),
}

impl Value {
    /// Kind of a non-null value.
    pub fn kind(&self) -> Option<ParamKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ParamKind::Bool),
            Value::Int(_) => Some(ParamKind::Int),
            Value::Long(_) => Some(ParamKind::Long),
            Value::Str(_) => Some(ParamKind::Str),
            Value::Component(_) => Some(ParamKind::Component),
            Value::Package(_) => Some(ParamKind::Package),
            Value::Binder(_) => Some(ParamKind::Binder),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_package(&self) -> Option<&PackageInfo> {
        match self {
            Value::Package(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binder(&self) -> Option<&RemoteHandle> {
        match self {
            Value::Binder(h) => Some(h),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Component(a), Value::Component(b)) => a == b,
            (Value::Package(a), Value::Package(b)) => a == b,
            (Value::Binder(a), Value::Binder(b)) => same_handle(a, b),
            _ => false,
        }
    }
}

/// One in-flight remote call: an exact signature plus its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    sig: MethodSig,
    args: Vec<Value>,
}

impl Call {
    /// Builds a call, checking arity and argument kinds against `sig`.
    ///
    /// `Value::Null` is accepted for reference-typed parameters only.
    pub fn new(sig: MethodSig, args: Vec<Value>) -> Result<Self, RemoteError> {
        if args.len() != sig.params().len() {
            return Err(RemoteError::BadArguments {
                reason: format!("expected {} arguments, got {}", sig.params().len(), args.len()),
                sig,
            });
        }
        let mismatch = sig
            .params()
            .iter()
            .zip(&args)
            .position(|(param, arg)| match arg.kind() {
                None => !param.is_nullable(),
                Some(kind) => kind != *param,
            });
        if let Some(i) = mismatch {
            let param = sig.params()[i];
            return Err(RemoteError::BadArguments {
                reason: format!("argument {} is not {:?}", i, param),
                sig,
            });
        }
        Ok(Self { sig, args })
    }

    pub fn sig(&self) -> &MethodSig {
        &self.sig
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn str_arg(&self, index: usize) -> Result<&str, RemoteError> {
        match self.args.get(index) {
            Some(Value::Str(s)) => Ok(s),
            _ => Err(self.bad_arg(index, ParamKind::Str)),
        }
    }

    pub fn int_arg(&self, index: usize) -> Result<i32, RemoteError> {
        match self.args.get(index) {
            Some(Value::Int(v)) => Ok(*v),
            _ => Err(self.bad_arg(index, ParamKind::Int)),
        }
    }

    pub fn long_arg(&self, index: usize) -> Result<i64, RemoteError> {
        match self.args.get(index) {
            Some(Value::Long(v)) => Ok(*v),
            _ => Err(self.bad_arg(index, ParamKind::Long)),
        }
    }

    pub fn component_arg(&self, index: usize) -> Result<&ComponentName, RemoteError> {
        match self.args.get(index) {
            Some(Value::Component(c)) => Ok(c),
            _ => Err(self.bad_arg(index, ParamKind::Component)),
        }
    }

    fn bad_arg(&self, index: usize, expected: ParamKind) -> RemoteError {
        RemoteError::BadArguments {
            sig: self.sig.clone(),
            reason: format!("argument {} is not a non-null {:?}", index, expected),
        }
    }
}
