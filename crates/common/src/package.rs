//! Package metadata types and the package-manager call surface.

use crate::{MethodSig, ParamKind};
use bitflags::bitflags;

bitflags! {
    /// Query flags accepted by `getPackageInfo`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PackageFlags: u32 {
        const GET_ACTIVITIES = 0x0000_0001;
        const GET_RECEIVERS = 0x0000_0002;
        const GET_SERVICES = 0x0000_0004;
        const GET_PROVIDERS = 0x0000_0008;
        const GET_INSTRUMENTATION = 0x0000_0010;
        const GET_INTENT_FILTERS = 0x0000_0020;
        const GET_SIGNATURES = 0x0000_0040;
        const GET_META_DATA = 0x0000_0080;
        const GET_GIDS = 0x0000_0100;
        const GET_DISABLED_COMPONENTS = 0x0000_0200;
        const GET_SHARED_LIBRARY_FILES = 0x0000_0400;
        const GET_URI_PERMISSION_PATTERNS = 0x0000_0800;
        const GET_PERMISSIONS = 0x0000_1000;
        const GET_SIGNING_CERTIFICATES = 0x0800_0000;
    }
}

impl PackageFlags {
    /// Reinterprets the wire `int` without dropping unknown bits.
    pub fn from_wire(flags: i32) -> Self {
        Self::from_bits_retain(flags as u32)
    }

    pub fn to_wire(self) -> i32 {
        self.bits() as i32
    }
}

/// Fully qualified component: owning package plus class name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentName {
    pub package: String,
    pub class: String,
}

impl ComponentName {
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
        }
    }
}

/// Enabled state reported by `getComponentEnabledSetting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EnabledState {
    Default = 0,
    Enabled = 1,
    Disabled = 2,
    DisabledUser = 3,
    DisabledUntilUsed = 4,
}

impl EnabledState {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Default),
            1 => Some(Self::Enabled),
            2 => Some(Self::Disabled),
            3 => Some(Self::DisabledUser),
            4 => Some(Self::DisabledUntilUsed),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i32 {
        self as i32
    }
}

/// Application-level attributes of a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationInfo {
    pub package_name: String,
    /// Path of the package file the application is loaded from.
    pub source_dir: Option<String>,
    /// Directory native libraries are loaded from. For archive-backed
    /// packages this is an in-archive path (`<archive>!/lib/<abi>`).
    pub native_library_dir: Option<String>,
    /// Hidden attribute; written only through the runtime bridge.
    pub primary_cpu_abi: Option<String>,
    pub enabled: bool,
}

/// Package metadata returned by `getPackageInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    pub package_name: String,
    pub version_name: Option<String>,
    pub version_code: i64,
    /// Raw signing certificates; populated only when requested.
    pub signatures: Vec<Vec<u8>>,
    pub application_info: ApplicationInfo,
}

impl PackageInfo {
    pub fn new(package_name: impl Into<String>) -> Self {
        let package_name = package_name.into();
        Self {
            application_info: ApplicationInfo {
                package_name: package_name.clone(),
                enabled: true,
                ..ApplicationInfo::default()
            },
            package_name,
            ..Self::default()
        }
    }
}

/// The package-manager call surface.
pub mod methods {
    use super::*;

    /// Registry key of the package-manager service.
    pub const SERVICE: &str = "package";
    pub const DESCRIPTOR: &str = "android.content.pm.IPackageManager";

    pub const GET_PACKAGE_INFO: MethodSig =
        MethodSig::new("getPackageInfo", &[ParamKind::Str, ParamKind::Int]);
    pub const GET_PACKAGE_INFO_USER: MethodSig = MethodSig::new(
        "getPackageInfo",
        &[ParamKind::Str, ParamKind::Int, ParamKind::Int],
    );
    pub const GET_PACKAGE_INFO_LONG_USER: MethodSig = MethodSig::new(
        "getPackageInfo",
        &[ParamKind::Str, ParamKind::Long, ParamKind::Int],
    );
    pub const GET_COMPONENT_ENABLED_SETTING: MethodSig =
        MethodSig::new("getComponentEnabledSetting", &[ParamKind::Component]);
    pub const GET_COMPONENT_ENABLED_SETTING_USER: MethodSig = MethodSig::new(
        "getComponentEnabledSetting",
        &[ParamKind::Component, ParamKind::Int],
    );
    pub const GET_INSTALLER_PACKAGE_NAME: MethodSig =
        MethodSig::new("getInstallerPackageName", &[ParamKind::Str]);
    pub const AS_BINDER: MethodSig = MethodSig::new("asBinder", &[]);
    pub const GET_APPLICATION_ENABLED_SETTING: MethodSig = MethodSig::new(
        "getApplicationEnabledSetting",
        &[ParamKind::Str, ParamKind::Int],
    );
}
