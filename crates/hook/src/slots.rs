//! Cache slots: the places a process keeps a reference to a service handle.
//!
//! A slot write is a single reference replacement, so a concurrent reader sees
//! either the old handle or the new one.

use bridge::accessors::members;
use bridge::{AccessError, ActivityThread, RuntimeAccess, TargetKind};
use common::{RemoteHandle, ServiceCache, ServiceIdentity, ServiceRegistry};
use std::sync::Arc;

/// A named location holding a handle for one service identity.
pub trait CacheSlot: Send + Sync {
    /// Name used in logs and error reports.
    fn name(&self) -> &str;

    /// Current contents; `None` if the slot is empty.
    fn read(&self) -> Result<Option<RemoteHandle>, AccessError>;

    /// Replaces the contents with `handle`.
    fn write(&self, handle: &RemoteHandle) -> Result<(), AccessError>;
}

/// The registry's own cache entry for one identity (`ServiceManager.sCache`).
pub struct RegistryCacheSlot {
    registry: Box<dyn ServiceRegistry + Send + Sync>,
    identity: ServiceIdentity,
    name: String,
}

impl RegistryCacheSlot {
    pub fn new(registry: impl ServiceRegistry + Send + Sync + 'static, identity: ServiceIdentity) -> Self {
        let name = format!("ServiceManager.sCache[{}]", identity);
        Self {
            registry: Box::new(registry),
            identity,
            name,
        }
    }

    fn cache(&self) -> Result<ServiceCache, AccessError> {
        self.registry.cache().ok_or_else(|| AccessError::MissingMember {
            target: TargetKind::ServiceManager,
            member: members::SERVICE_CACHE.to_owned(),
        })
    }
}

impl CacheSlot for RegistryCacheSlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> Result<Option<RemoteHandle>, AccessError> {
        Ok(self.cache()?.get(&self.identity))
    }

    fn write(&self, handle: &RemoteHandle) -> Result<(), AccessError> {
        self.cache()?.put(&self.identity, Arc::clone(handle));
        Ok(())
    }
}

/// The main thread's package-manager reference (`ActivityThread.sPackageManager`).
pub struct MainThreadSlot {
    runtime: Arc<dyn RuntimeAccess>,
}

impl MainThreadSlot {
    pub fn new(runtime: Arc<dyn RuntimeAccess>) -> Self {
        Self { runtime }
    }
}

impl CacheSlot for MainThreadSlot {
    fn name(&self) -> &str {
        "ActivityThread.sPackageManager"
    }

    fn read(&self) -> Result<Option<RemoteHandle>, AccessError> {
        ActivityThread::new(self.runtime.as_ref()).package_manager()
    }

    fn write(&self, handle: &RemoteHandle) -> Result<(), AccessError> {
        ActivityThread::new(self.runtime.as_ref()).set_package_manager(Some(Arc::clone(handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge::{BridgedRegistry, HostProfile, InProcessHost, LocalPackageService};
    use common::same_handle;

    fn runtime(profile: HostProfile) -> Arc<dyn RuntimeAccess> {
        Arc::new(InProcessHost::new(profile))
    }

    #[test]
    fn test_registry_slot_roundtrip() {
        let rt = runtime(HostProfile::full());
        let slot = RegistryCacheSlot::new(BridgedRegistry::new(rt), ServiceIdentity::new("package"));
        assert!(slot.read().unwrap().is_none());

        let pm: RemoteHandle = LocalPackageService::new();
        slot.write(&pm).unwrap();
        assert!(same_handle(&slot.read().unwrap().unwrap(), &pm));
        assert_eq!(slot.name(), "ServiceManager.sCache[package]");
    }

    #[test]
    fn test_registry_slot_without_cache() {
        let rt = runtime(
            HostProfile::full().without(TargetKind::ServiceManager, members::SERVICE_CACHE),
        );
        let slot = RegistryCacheSlot::new(BridgedRegistry::new(rt), ServiceIdentity::new("package"));
        let pm: RemoteHandle = LocalPackageService::new();
        assert!(matches!(
            slot.write(&pm),
            Err(AccessError::MissingMember { target: TargetKind::ServiceManager, .. })
        ));
        assert!(slot.read().is_err());
    }

    #[test]
    fn test_main_thread_slot_missing_member() {
        let rt = runtime(
            HostProfile::full().without(TargetKind::ActivityThread, members::MAIN_PACKAGE_MANAGER),
        );
        let slot = MainThreadSlot::new(rt);
        let pm: RemoteHandle = LocalPackageService::new();
        assert!(matches!(
            slot.write(&pm),
            Err(AccessError::MissingMember { .. })
        ));
    }
}
