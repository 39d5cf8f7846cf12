//! Table-backed package-manager service for the in-process host.

use common::package::methods;
use common::{
    Call, ComponentName, EnabledState, PackageFlags, PackageInfo, RemoteError, RemoteHandle,
    RemoteService, Value,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// One installed package as the system service knows it.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub info: PackageInfo,
    pub installer: Option<String>,
    /// Explicit component states by class name; unlisted classes are `Default`.
    pub components: HashMap<String, EnabledState>,
}

impl InstalledPackage {
    pub fn new(info: PackageInfo) -> Self {
        Self {
            info,
            installer: None,
            components: HashMap::new(),
        }
    }

    pub fn with_installer(mut self, installer: impl Into<String>) -> Self {
        self.installer = Some(installer.into());
        self
    }

    pub fn with_component(mut self, class: impl Into<String>, state: EnabledState) -> Self {
        self.components.insert(class.into(), state);
        self
    }
}

/// The "real" package-manager service in an in-process host.
///
/// Answers the package-manager surface from an installed-package table and
/// counts every call it receives.
pub struct LocalPackageService {
    packages: DashMap<String, InstalledPackage>,
    calls: AtomicUsize,
    this: Weak<LocalPackageService>,
}

impl LocalPackageService {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            packages: DashMap::new(),
            calls: AtomicUsize::new(0),
            this: this.clone(),
        })
    }

    pub fn install(&self, package: InstalledPackage) {
        self.packages
            .insert(package.info.package_name.clone(), package);
    }

    /// Number of calls this service has answered (including failures).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn package_info(&self, name: &str, flags: PackageFlags) -> Value {
        match self.packages.get(name) {
            Some(entry) => {
                let mut info = entry.info.clone();
                if !flags.contains(PackageFlags::GET_SIGNATURES) {
                    info.signatures.clear();
                }
                Value::Package(Box::new(info))
            }
            None => Value::Null,
        }
    }

    fn component_state(&self, component: &ComponentName) -> Result<Value, RemoteError> {
        let entry = self.packages.get(&component.package).ok_or_else(|| {
            RemoteError::Rejected(format!("Unknown component: {}", component.package))
        })?;
        let state = entry
            .components
            .get(&component.class)
            .copied()
            .unwrap_or(EnabledState::Default);
        Ok(Value::Int(state.to_wire()))
    }

    fn installer(&self, name: &str) -> Result<Value, RemoteError> {
        let entry = self
            .packages
            .get(name)
            .ok_or_else(|| RemoteError::Rejected(format!("Unknown package: {}", name)))?;
        Ok(entry
            .installer
            .clone()
            .map(Value::Str)
            .unwrap_or(Value::Null))
    }

    fn application_state(&self, name: &str) -> Result<Value, RemoteError> {
        let entry = self
            .packages
            .get(name)
            .ok_or_else(|| RemoteError::Rejected(format!("Unknown package: {}", name)))?;
        let state = if entry.info.application_info.enabled {
            EnabledState::Default
        } else {
            EnabledState::Disabled
        };
        Ok(Value::Int(state.to_wire()))
    }
}

impl RemoteService for LocalPackageService {
    fn descriptor(&self) -> &str {
        methods::DESCRIPTOR
    }

    fn transact(&self, call: &Call) -> Result<Value, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let sig = call.sig();
        if *sig == methods::GET_PACKAGE_INFO || *sig == methods::GET_PACKAGE_INFO_USER {
            let flags = PackageFlags::from_wire(call.int_arg(1)?);
            Ok(self.package_info(call.str_arg(0)?, flags))
        } else if *sig == methods::GET_PACKAGE_INFO_LONG_USER {
            let flags = PackageFlags::from_wire(call.long_arg(1)? as i32);
            Ok(self.package_info(call.str_arg(0)?, flags))
        } else if *sig == methods::GET_COMPONENT_ENABLED_SETTING
            || *sig == methods::GET_COMPONENT_ENABLED_SETTING_USER
        {
            self.component_state(call.component_arg(0)?)
        } else if *sig == methods::GET_INSTALLER_PACKAGE_NAME {
            self.installer(call.str_arg(0)?)
        } else if *sig == methods::GET_APPLICATION_ENABLED_SETTING {
            self.application_state(call.str_arg(0)?)
        } else if *sig == methods::AS_BINDER {
            let this: Option<RemoteHandle> = self.this.upgrade().map(|s| s as RemoteHandle);
            Ok(this.map(Value::Binder).unwrap_or(Value::Null))
        } else {
            Err(RemoteError::Unsupported(sig.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{MethodSig, ParamKind};

    fn service() -> Arc<LocalPackageService> {
        let svc = LocalPackageService::new();
        let mut info = PackageInfo::new("com.android.chrome");
        info.signatures = vec![vec![1, 2, 3]];
        svc.install(
            InstalledPackage::new(info)
                .with_installer("com.android.vending")
                .with_component("Main", EnabledState::Enabled),
        );
        svc
    }

    #[test]
    fn test_package_info_respects_signature_flag() {
        let svc = service();
        let call = Call::new(
            methods::GET_PACKAGE_INFO,
            vec![Value::Str("com.android.chrome".into()), Value::Int(0)],
        )
        .unwrap();
        let info = svc.transact(&call).unwrap();
        assert!(info.as_package().unwrap().signatures.is_empty());

        let call = Call::new(
            methods::GET_PACKAGE_INFO,
            vec![
                Value::Str("com.android.chrome".into()),
                Value::Int(PackageFlags::GET_SIGNATURES.to_wire()),
            ],
        )
        .unwrap();
        let info = svc.transact(&call).unwrap();
        assert_eq!(info.as_package().unwrap().signatures.len(), 1);
    }

    #[test]
    fn test_unknown_package_is_null() {
        let svc = service();
        let call = Call::new(
            methods::GET_PACKAGE_INFO_USER,
            vec![Value::Str("missing".into()), Value::Int(0), Value::Int(0)],
        )
        .unwrap();
        assert!(svc.transact(&call).unwrap().is_null());
        assert_eq!(svc.calls(), 1);
    }

    #[test]
    fn test_component_state() {
        let svc = service();
        let call = Call::new(
            methods::GET_COMPONENT_ENABLED_SETTING,
            vec![Value::Component(ComponentName::new("com.android.chrome", "Main"))],
        )
        .unwrap();
        assert_eq!(svc.transact(&call).unwrap(), Value::Int(1));

        let call = Call::new(
            methods::GET_COMPONENT_ENABLED_SETTING,
            vec![Value::Component(ComponentName::new("com.other", "Main"))],
        )
        .unwrap();
        assert!(matches!(svc.transact(&call), Err(RemoteError::Rejected(_))));
    }

    #[test]
    fn test_as_binder_returns_self() {
        let svc = service();
        let handle: RemoteHandle = svc.clone();
        let call = Call::new(methods::AS_BINDER, vec![]).unwrap();
        let binder = svc.transact(&call).unwrap();
        assert_eq!(binder, Value::Binder(handle));
    }

    #[test]
    fn test_unknown_operation_unsupported() {
        let svc = service();
        let sig = MethodSig::new("getPermissionInfo", &[ParamKind::Str]);
        let call = Call::new(sig, vec![Value::Str("x".into())]).unwrap();
        assert!(matches!(svc.transact(&call), Err(RemoteError::Unsupported(_))));
    }
}
