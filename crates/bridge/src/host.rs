//! In-process host: an in-memory implementation of [`RuntimeAccess`].
//!
//! Statics live in one map keyed by `(TargetKind, member)`. Which members
//! exist is decided by a [`HostProfile`], so a test can model a host version
//! that lacks a field and observe the resulting `AccessError`.

use crate::accessors::members;
use crate::{AccessError, HostObject, HostValue, RuntimeAccess, TargetKind};
use common::{RemoteHandle, ServiceCache, ServiceIdentity};
use dashmap::DashMap;
use std::collections::HashSet;

/// The set of members present on a host version.
#[derive(Debug, Clone)]
pub struct HostProfile {
    members: HashSet<(TargetKind, &'static str)>,
}

impl HostProfile {
    /// Every member the bridge knows about.
    pub fn full() -> Self {
        let members = [
            (TargetKind::ServiceManager, members::SERVICE_CACHE),
            (TargetKind::ServiceManager, members::GET_SERVICE),
            (TargetKind::ActivityThread, members::MAIN_PACKAGE_MANAGER),
            (TargetKind::ContextImpl, members::CONTEXT_PACKAGE_MANAGER),
            (TargetKind::ContextWrapper, members::WRAPPER_BASE),
            (TargetKind::ApplicationInfo, members::PRIMARY_CPU_ABI),
        ]
        .into_iter()
        .collect();
        Self { members }
    }

    /// Removes one member, modelling a host version that lacks it.
    pub fn without(mut self, target: TargetKind, member: &str) -> Self {
        self.members.retain(|(t, m)| !(*t == target && *m == member));
        self
    }

    pub fn has(&self, target: TargetKind, member: &str) -> bool {
        self.members
            .iter()
            .any(|(t, m)| *t == target && *m == member)
    }
}

impl Default for HostProfile {
    fn default() -> Self {
        Self::full()
    }
}

/// In-memory host process.
///
/// Holds the service table the platform would answer lookups from, the
/// `ServiceManager` cache in front of it, the main-thread statics and one
/// application context (`ContextWrapper` around a `ContextImpl`).
pub struct InProcessHost {
    profile: HostProfile,
    statics: DashMap<(TargetKind, String), HostValue>,
    services: DashMap<String, RemoteHandle>,
    application_context: HostObject,
}

impl InProcessHost {
    pub fn new(profile: HostProfile) -> Self {
        let statics = DashMap::new();
        statics.insert(
            (TargetKind::ServiceManager, members::SERVICE_CACHE.to_owned()),
            HostValue::Cache(ServiceCache::new()),
        );
        statics.insert(
            (TargetKind::ActivityThread, members::MAIN_PACKAGE_MANAGER.to_owned()),
            HostValue::Null,
        );

        let base = HostObject::new(TargetKind::ContextImpl)
            .with_field(members::CONTEXT_PACKAGE_MANAGER, HostValue::Null);
        let application_context = HostObject::new(TargetKind::ContextWrapper)
            .with_field(members::WRAPPER_BASE, HostValue::Object(base));

        Self {
            profile,
            statics,
            services: DashMap::new(),
            application_context,
        }
    }

    /// Publishes a system service.
    ///
    /// Also seeds the `ServiceManager` cache, as the platform does for core
    /// services when the application is bound.
    pub fn register_service(&self, identity: &ServiceIdentity, handle: RemoteHandle) {
        self.services
            .insert(identity.as_str().to_owned(), handle.clone());
        if let Some(cache) = self.raw_cache() {
            cache.put(identity, handle);
        }
    }

    /// The application context (outermost wrapper).
    pub fn application_context(&self) -> HostObject {
        self.application_context.clone()
    }

    fn raw_cache(&self) -> Option<ServiceCache> {
        let key = (TargetKind::ServiceManager, members::SERVICE_CACHE.to_owned());
        match self.statics.get(&key).map(|v| v.value().clone()) {
            Some(HostValue::Cache(cache)) => Some(cache),
            _ => None,
        }
    }

    fn check(&self, target: TargetKind, member: &str) -> Result<(), AccessError> {
        if self.profile.has(target, member) {
            Ok(())
        } else {
            Err(AccessError::MissingMember {
                target,
                member: member.to_owned(),
            })
        }
    }

    fn check_receiver(target: TargetKind, object: &HostObject) -> Result<(), AccessError> {
        if object.kind() == target {
            Ok(())
        } else {
            Err(AccessError::WrongReceiver {
                expected: target,
                found: object.kind(),
            })
        }
    }

    fn get_service(&self, args: &[HostValue]) -> Result<HostValue, AccessError> {
        let name = match args {
            [HostValue::Str(name)] => name,
            _ => {
                return Err(AccessError::InvocationFailed {
                    target: TargetKind::ServiceManager,
                    member: members::GET_SERVICE.to_owned(),
                    reason: "expected a single service name".to_owned(),
                })
            }
        };
        let identity = ServiceIdentity::new(name.as_str());

        if self.profile.has(TargetKind::ServiceManager, members::SERVICE_CACHE) {
            if let Some(handle) = self.raw_cache().and_then(|cache| cache.get(&identity)) {
                return Ok(HostValue::Handle(handle));
            }
        }
        Ok(self
            .services
            .get(name.as_str())
            .map(|h| HostValue::Handle(h.value().clone()))
            .unwrap_or(HostValue::Null))
    }
}

impl RuntimeAccess for InProcessHost {
    fn resolve_member(&self, target: TargetKind, member: &str) -> Result<(), AccessError> {
        self.check(target, member)
    }

    fn read_static(&self, target: TargetKind, member: &str) -> Result<HostValue, AccessError> {
        self.check(target, member)?;
        Ok(self
            .statics
            .get(&(target, member.to_owned()))
            .map(|v| v.value().clone())
            .unwrap_or(HostValue::Null))
    }

    fn write_static(
        &self,
        target: TargetKind,
        member: &str,
        value: HostValue,
    ) -> Result<(), AccessError> {
        self.check(target, member)?;
        tracing::trace!(%target, member, value = value.type_name(), "write static");
        self.statics.insert((target, member.to_owned()), value);
        Ok(())
    }

    fn read_field(
        &self,
        target: TargetKind,
        object: &HostObject,
        member: &str,
    ) -> Result<HostValue, AccessError> {
        self.check(target, member)?;
        Self::check_receiver(target, object)?;
        Ok(object.field(member))
    }

    fn write_field(
        &self,
        target: TargetKind,
        object: &HostObject,
        member: &str,
        value: HostValue,
    ) -> Result<(), AccessError> {
        self.check(target, member)?;
        Self::check_receiver(target, object)?;
        tracing::trace!(%target, member, value = value.type_name(), "write field");
        object.set_field(member, value);
        Ok(())
    }

    fn invoke_named(
        &self,
        target: TargetKind,
        member: &str,
        args: &[HostValue],
    ) -> Result<HostValue, AccessError> {
        self.check(target, member)?;
        match (target, member) {
            (TargetKind::ServiceManager, members::GET_SERVICE) => self.get_service(args),
            _ => Err(AccessError::InvocationFailed {
                target,
                member: member.to_owned(),
                reason: "member is not invocable".to_owned(),
            }),
        }
    }
}
