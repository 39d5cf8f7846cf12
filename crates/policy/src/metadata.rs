//! The package-metadata interception policy.

use crate::abi::{scan_archive, AbiPreference};
use crate::parser::ArchiveParser;
use crate::PolicyError;
use bridge::{ApplicationInfoAccess, RuntimeAccess};
use common::package::methods;
use common::{Call, EnabledState, PackageFlags, PackageInfo, RemoteError, Value};
use dispatch::{DispatchError, InterceptionPolicy, Invocation, RuleSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Installer identity reported for the target package.
pub const DEFAULT_INSTALLER: &str = "com.android.vending";

/// Makes `target` appear installed from a local archive.
///
/// # Rules
/// - `getPackageInfo` (all overloads): metadata parsed from the archive, with
///   the native-library directory pointing inside it.
/// - `getComponentEnabledSetting` (both overloads): `Disabled`.
/// - `getInstallerPackageName`: the configured installer.
/// - `asBinder`: the proxy itself.
///
/// Calls about any other package are delegated unchanged.
pub struct PackageMetadataPolicy {
    target: String,
    archive: PathBuf,
    abi: AbiPreference,
    installer: String,
    parser: Arc<dyn ArchiveParser>,
    runtime: Arc<dyn RuntimeAccess>,
}

impl PackageMetadataPolicy {
    pub fn new(
        target: impl Into<String>,
        archive: impl Into<PathBuf>,
        parser: Arc<dyn ArchiveParser>,
        runtime: Arc<dyn RuntimeAccess>,
    ) -> Self {
        Self {
            target: target.into(),
            archive: archive.into(),
            abi: AbiPreference::host(),
            installer: DEFAULT_INSTALLER.to_owned(),
            parser,
            runtime,
        }
    }

    pub fn with_abi_preference(mut self, abi: AbiPreference) -> Self {
        self.abi = abi;
        self
    }

    pub fn with_installer(mut self, installer: impl Into<String>) -> Self {
        self.installer = installer.into();
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Builds the target's `PackageInfo` from the archive.
    ///
    /// A parse that fails with `flags` is retried once without
    /// `GET_SIGNATURES`; if that fails too the result is `Ok(None)` and the
    /// archive is not scanned.
    ///
    /// # Errors
    /// - `PolicyError::AbiNotFound` if the archive has no library for this host.
    /// - `PolicyError::Archive` if the archive cannot be read for the scan.
    pub fn archive_package_info(&self, flags: PackageFlags) -> Result<Option<PackageInfo>, PolicyError> {
        let parsed = self.parser.parse(&self.archive, flags).or_else(|| {
            tracing::warn!(archive = %self.archive.display(), ?flags, "archive parse failed; retrying without signatures");
            self.parser
                .parse(&self.archive, flags.difference(PackageFlags::GET_SIGNATURES))
        });
        let Some(mut info) = parsed else {
            tracing::warn!(archive = %self.archive.display(), "archive parse failed after retry");
            return Ok(None);
        };

        let abi = scan_archive(&self.archive, &self.abi)?;
        let app = &mut info.application_info;
        if let Err(e) = ApplicationInfoAccess::new(self.runtime.as_ref()).set_primary_cpu_abi(app, &abi) {
            tracing::warn!(error = %e, %abi, "primary ABI not recorded");
        }
        app.native_library_dir = Some(format!("{}!/lib/{}", self.archive.display(), abi));
        if app.source_dir.as_deref().map_or(true, str::is_empty) {
            app.source_dir = Some(self.archive.to_string_lossy().into_owned());
        }
        Ok(Some(info))
    }

    /// A null or foreign package name is a miss, never an error.
    fn names_target(&self, call: &Call) -> bool {
        matches!(call.args().first(), Some(Value::Str(name)) if *name == self.target)
    }

    fn package_info(&self, inv: &Invocation<'_>) -> Result<Value, RemoteError> {
        let call = inv.call();
        if !self.names_target(call) {
            return inv.invoke_original();
        }
        // The long overload's flags are narrowed to 32 bits.
        let flags = if *call.sig() == methods::GET_PACKAGE_INFO_LONG_USER {
            call.long_arg(1)? as i32
        } else {
            call.int_arg(1)?
        };
        match self.archive_package_info(PackageFlags::from_wire(flags)) {
            Ok(Some(info)) => Ok(Value::Package(Box::new(info))),
            Ok(None) => Ok(Value::Null),
            Err(e) => Err(RemoteError::Policy {
                sig: call.sig().clone(),
                source: Box::new(e),
            }),
        }
    }

    fn component_enabled(&self, inv: &Invocation<'_>) -> Result<Value, RemoteError> {
        let ours = matches!(
            inv.call().args().first(),
            Some(Value::Component(component)) if component.package == self.target
        );
        if ours {
            Ok(Value::Int(EnabledState::Disabled.to_wire()))
        } else {
            inv.invoke_original()
        }
    }

    fn installer(&self, inv: &Invocation<'_>) -> Result<Value, RemoteError> {
        if self.names_target(inv.call()) {
            Ok(Value::Str(self.installer.clone()))
        } else {
            inv.invoke_original()
        }
    }
}

impl InterceptionPolicy for PackageMetadataPolicy {
    fn name(&self) -> &str {
        "package-metadata"
    }

    fn install(self: Arc<Self>, rules: &mut RuleSet) -> Result<(), DispatchError> {
        for sig in [
            methods::GET_PACKAGE_INFO,
            methods::GET_PACKAGE_INFO_USER,
            methods::GET_PACKAGE_INFO_LONG_USER,
        ] {
            let this = Arc::clone(&self);
            rules.on(sig, move |inv| this.package_info(inv))?;
        }
        for sig in [
            methods::GET_COMPONENT_ENABLED_SETTING,
            methods::GET_COMPONENT_ENABLED_SETTING_USER,
        ] {
            let this = Arc::clone(&self);
            rules.on(sig, move |inv| this.component_enabled(inv))?;
        }
        let this = Arc::clone(&self);
        rules.on(methods::GET_INSTALLER_PACKAGE_NAME, move |inv| this.installer(inv))?;
        rules.on(methods::AS_BINDER, |inv| match inv.proxy_handle() {
            Some(proxy) => Ok(Value::Binder(Arc::clone(proxy))),
            None => inv.invoke_original(),
        })?;
        Ok(())
    }
}
