//! Typed accessors over [`RuntimeAccess`].
//!
//! Each accessor wraps exactly the members it needs and converts the untyped
//! `HostValue` into the type the caller expects, failing with
//! `AccessError::TypeMismatch` rather than guessing.

use crate::{AccessError, HostObject, HostValue, RuntimeAccess, TargetKind};
use common::{ApplicationInfo, RemoteHandle, ServiceCache, ServiceIdentity, ServiceRegistry};
use std::sync::Arc;

/// Member names the bridge is allowed to touch.
pub mod members {
    /// `ServiceManager.sCache`: identity → handle map.
    pub const SERVICE_CACHE: &str = "sCache";
    /// `ServiceManager.getService(String)`.
    pub const GET_SERVICE: &str = "getService";
    /// `ActivityThread.sPackageManager`: the main thread's package manager.
    pub const MAIN_PACKAGE_MANAGER: &str = "sPackageManager";
    /// `ContextImpl.mPackageManager`: memoized per-context package manager.
    pub const CONTEXT_PACKAGE_MANAGER: &str = "mPackageManager";
    /// `ContextWrapper.mBase`: the wrapped context.
    pub const WRAPPER_BASE: &str = "mBase";
    /// `ApplicationInfo.primaryCpuAbi`.
    pub const PRIMARY_CPU_ABI: &str = "primaryCpuAbi";
}

/// Maximum number of `ContextWrapper` levels walked before giving up.
pub const MAX_WRAPPER_DEPTH: usize = 16;

fn expect_handle(
    value: HostValue,
    target: TargetKind,
    member: &str,
) -> Result<Option<RemoteHandle>, AccessError> {
    match value {
        HostValue::Null => Ok(None),
        HostValue::Handle(handle) => Ok(Some(handle)),
        other => Err(AccessError::TypeMismatch {
            target,
            member: member.to_owned(),
            expected: "handle",
            found: other.type_name(),
        }),
    }
}

/// `android.os.ServiceManager` statics.
pub struct ServiceManager<'a> {
    runtime: &'a dyn RuntimeAccess,
}

impl<'a> ServiceManager<'a> {
    pub fn new(runtime: &'a dyn RuntimeAccess) -> Self {
        Self { runtime }
    }

    /// Looks a service up the way application code does (cache first).
    pub fn get_service(&self, identity: &ServiceIdentity) -> Result<Option<RemoteHandle>, AccessError> {
        let value = self.runtime.invoke_named(
            TargetKind::ServiceManager,
            members::GET_SERVICE,
            &[HostValue::Str(identity.as_str().to_owned())],
        )?;
        expect_handle(value, TargetKind::ServiceManager, members::GET_SERVICE)
    }

    /// Returns the live service cache (writes through to the host).
    pub fn service_cache(&self) -> Result<ServiceCache, AccessError> {
        match self
            .runtime
            .read_static(TargetKind::ServiceManager, members::SERVICE_CACHE)?
        {
            HostValue::Cache(cache) => Ok(cache),
            other => Err(AccessError::TypeMismatch {
                target: TargetKind::ServiceManager,
                member: members::SERVICE_CACHE.to_owned(),
                expected: "service cache",
                found: other.type_name(),
            }),
        }
    }
}

/// `android.app.ActivityThread` statics.
pub struct ActivityThread<'a> {
    runtime: &'a dyn RuntimeAccess,
}

impl<'a> ActivityThread<'a> {
    pub fn new(runtime: &'a dyn RuntimeAccess) -> Self {
        Self { runtime }
    }

    pub fn package_manager(&self) -> Result<Option<RemoteHandle>, AccessError> {
        let value = self
            .runtime
            .read_static(TargetKind::ActivityThread, members::MAIN_PACKAGE_MANAGER)?;
        expect_handle(value, TargetKind::ActivityThread, members::MAIN_PACKAGE_MANAGER)
    }

    pub fn set_package_manager(&self, handle: Option<RemoteHandle>) -> Result<(), AccessError> {
        self.runtime.write_static(
            TargetKind::ActivityThread,
            members::MAIN_PACKAGE_MANAGER,
            HostValue::from_handle(handle),
        )
    }
}

/// `android.app.ContextImpl` fields, reached through any wrapper chain.
pub struct ContextImpl<'a> {
    runtime: &'a dyn RuntimeAccess,
}

impl<'a> ContextImpl<'a> {
    pub fn new(runtime: &'a dyn RuntimeAccess) -> Self {
        Self { runtime }
    }

    /// Unwraps `ContextWrapper.mBase` until the implementation object.
    pub fn base_context(&self, context: &HostObject) -> Result<HostObject, AccessError> {
        let mut current = context.clone();
        for _ in 0..MAX_WRAPPER_DEPTH {
            match current.kind() {
                TargetKind::ContextImpl => return Ok(current),
                TargetKind::ContextWrapper => {
                    let base = self.runtime.read_field(
                        TargetKind::ContextWrapper,
                        &current,
                        members::WRAPPER_BASE,
                    )?;
                    current = match base {
                        HostValue::Object(next) => next,
                        other => {
                            return Err(AccessError::TypeMismatch {
                                target: TargetKind::ContextWrapper,
                                member: members::WRAPPER_BASE.to_owned(),
                                expected: "object",
                                found: other.type_name(),
                            })
                        }
                    };
                }
                found => {
                    return Err(AccessError::WrongReceiver {
                        expected: TargetKind::ContextImpl,
                        found,
                    })
                }
            }
        }
        Err(AccessError::ChainTooDeep(MAX_WRAPPER_DEPTH))
    }

    /// Memoized package manager of the base context.
    pub fn package_manager(&self, context: &HostObject) -> Result<Option<RemoteHandle>, AccessError> {
        let base = self.base_context(context)?;
        let value = self.runtime.read_field(
            TargetKind::ContextImpl,
            &base,
            members::CONTEXT_PACKAGE_MANAGER,
        )?;
        expect_handle(value, TargetKind::ContextImpl, members::CONTEXT_PACKAGE_MANAGER)
    }

    /// Drops the memoized package manager so the next access re-resolves it.
    pub fn clear_package_manager(&self, context: &HostObject) -> Result<(), AccessError> {
        let base = self.base_context(context)?;
        self.runtime.write_field(
            TargetKind::ContextImpl,
            &base,
            members::CONTEXT_PACKAGE_MANAGER,
            HostValue::Null,
        )
    }
}

/// Hidden `ApplicationInfo` attributes.
pub struct ApplicationInfoAccess<'a> {
    runtime: &'a dyn RuntimeAccess,
}

impl<'a> ApplicationInfoAccess<'a> {
    pub fn new(runtime: &'a dyn RuntimeAccess) -> Self {
        Self { runtime }
    }

    /// Sets `primaryCpuAbi` if the host version has it.
    pub fn set_primary_cpu_abi(&self, info: &mut ApplicationInfo, abi: &str) -> Result<(), AccessError> {
        self.runtime
            .resolve_member(TargetKind::ApplicationInfo, members::PRIMARY_CPU_ABI)?;
        info.primary_cpu_abi = Some(abi.to_owned());
        Ok(())
    }
}

/// [`ServiceRegistry`] backed by the host's `ServiceManager`.
pub struct BridgedRegistry {
    runtime: Arc<dyn RuntimeAccess>,
}

impl BridgedRegistry {
    pub fn new(runtime: Arc<dyn RuntimeAccess>) -> Self {
        Self { runtime }
    }
}

impl ServiceRegistry for BridgedRegistry {
    fn get_handle(&self, identity: &ServiceIdentity) -> Option<RemoteHandle> {
        match ServiceManager::new(self.runtime.as_ref()).get_service(identity) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(service = %identity, error = %e, "service lookup failed");
                None
            }
        }
    }

    fn cache(&self) -> Option<ServiceCache> {
        match ServiceManager::new(self.runtime.as_ref()).service_cache() {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(error = %e, "service cache unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostProfile, InProcessHost, LocalPackageService};
    use common::package::methods;
    use common::same_handle;

    fn host() -> InProcessHost {
        InProcessHost::new(HostProfile::full())
    }

    #[test]
    fn test_get_service_prefers_cache() {
        let host = host();
        let id = ServiceIdentity::new(methods::SERVICE);
        let real: RemoteHandle = LocalPackageService::new();
        host.register_service(&id, real.clone());

        let replacement: RemoteHandle = LocalPackageService::new();
        let sm = ServiceManager::new(&host);
        sm.service_cache().unwrap().put(&id, replacement.clone());

        let found = sm.get_service(&id).unwrap().unwrap();
        assert!(same_handle(&found, &replacement));
    }

    #[test]
    fn test_get_service_unknown_is_none() {
        let host = host();
        let sm = ServiceManager::new(&host);
        assert!(sm.get_service(&ServiceIdentity::new("nope")).unwrap().is_none());
    }

    #[test]
    fn test_activity_thread_roundtrip() {
        let host = host();
        let at = ActivityThread::new(&host);
        assert!(at.package_manager().unwrap().is_none());

        let pm: RemoteHandle = LocalPackageService::new();
        at.set_package_manager(Some(pm.clone())).unwrap();
        assert!(same_handle(&at.package_manager().unwrap().unwrap(), &pm));
    }

    #[test]
    fn test_missing_member_is_typed_failure() {
        let host = InProcessHost::new(
            HostProfile::full().without(TargetKind::ActivityThread, members::MAIN_PACKAGE_MANAGER),
        );
        let err = ActivityThread::new(&host).package_manager().unwrap_err();
        assert!(matches!(err, AccessError::MissingMember { target: TargetKind::ActivityThread, .. }));
    }

    #[test]
    fn test_context_chain_is_unwrapped() {
        let host = host();
        let inner = HostObject::new(TargetKind::ContextImpl);
        let middle = HostObject::new(TargetKind::ContextWrapper)
            .with_field(members::WRAPPER_BASE, HostValue::Object(inner.clone()));
        let outer = HostObject::new(TargetKind::ContextWrapper)
            .with_field(members::WRAPPER_BASE, HostValue::Object(middle));

        let base = ContextImpl::new(&host).base_context(&outer).unwrap();
        assert!(base.same_object(&inner));
    }

    #[test]
    fn test_context_cycle_is_bounded() {
        let host = host();
        let a = HostObject::new(TargetKind::ContextWrapper);
        let b = HostObject::new(TargetKind::ContextWrapper)
            .with_field(members::WRAPPER_BASE, HostValue::Object(a.clone()));
        a.set_field(members::WRAPPER_BASE, HostValue::Object(b));

        let err = ContextImpl::new(&host).base_context(&a).unwrap_err();
        assert!(matches!(err, AccessError::ChainTooDeep(MAX_WRAPPER_DEPTH)));
    }

    #[test]
    fn test_clear_package_manager() {
        let host = host();
        let ctx = host.application_context();
        let access = ContextImpl::new(&host);
        let pm: RemoteHandle = LocalPackageService::new();

        let base = access.base_context(&ctx).unwrap();
        base.set_field(members::CONTEXT_PACKAGE_MANAGER, HostValue::Handle(pm));
        assert!(access.package_manager(&ctx).unwrap().is_some());

        access.clear_package_manager(&ctx).unwrap();
        assert!(access.package_manager(&ctx).unwrap().is_none());
    }

    #[test]
    fn test_primary_abi_is_advisory_on_old_hosts() {
        let host = InProcessHost::new(
            HostProfile::full().without(TargetKind::ApplicationInfo, members::PRIMARY_CPU_ABI),
        );
        let mut info = ApplicationInfo::default();
        let err = ApplicationInfoAccess::new(&host)
            .set_primary_cpu_abi(&mut info, "arm64-v8a")
            .unwrap_err();
        assert!(matches!(err, AccessError::MissingMember { .. }));
        assert!(info.primary_cpu_abi.is_none());
    }

    #[test]
    fn test_bridged_registry_degrades_to_none() {
        let host: Arc<dyn RuntimeAccess> = Arc::new(InProcessHost::new(
            HostProfile::full().without(TargetKind::ServiceManager, members::SERVICE_CACHE),
        ));
        let registry = BridgedRegistry::new(host);
        assert!(registry.cache().is_none());
    }
}
