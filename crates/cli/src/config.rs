//! `hook.toml`: the simulated host, the hook target and the queries to run.

use anyhow::{anyhow, bail, Context};
use bridge::{HostProfile, InstalledPackage, TargetKind};
use common::package::methods;
use common::{Call, ComponentName, EnabledState, PackageInfo, Value};
use policy::{AbiPreference, DEFAULT_INSTALLER};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookConfig {
    pub hook: HookSection,
    #[serde(default)]
    pub host: HostSection,
    #[serde(default, rename = "query")]
    pub queries: Vec<Query>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookSection {
    /// Package made to appear installed from `archive`.
    pub target: String,
    /// Relative paths resolve against the config file's directory.
    pub archive: PathBuf,
    #[serde(default = "default_installer")]
    pub installer: String,
    #[serde(default)]
    pub version_name: Option<String>,
    #[serde(default)]
    pub version_code: i64,
}

fn default_installer() -> String {
    DEFAULT_INSTALLER.to_owned()
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSection {
    /// Defaults to this process's pointer width.
    #[serde(default)]
    pub is_64bit: Option<bool>,
    #[serde(default)]
    pub supported_64_bit: Option<Vec<String>>,
    #[serde(default)]
    pub supported_32_bit: Option<Vec<String>>,
    /// `Class.member` entries absent on the simulated host version.
    #[serde(default)]
    pub missing_members: Vec<String>,
    #[serde(default)]
    pub installed: Vec<InstalledSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstalledSection {
    pub package: String,
    #[serde(default)]
    pub installer: Option<String>,
    #[serde(default)]
    pub version_name: Option<String>,
    #[serde(default)]
    pub version_code: i64,
    /// Component class → `default` | `enabled` | `disabled`.
    #[serde(default)]
    pub components: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Query {
    pub method: String,
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub flags: i64,
    /// Selects the per-user overload when present.
    #[serde(default)]
    pub user: Option<i32>,
    /// Passes `flags` as a 64-bit value (requires `user`).
    #[serde(default)]
    pub long_flags: bool,
}

impl HookConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config = Self::parse(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        if config.hook.archive.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.hook.archive = base.join(&config.hook.archive);
        }
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

impl HostSection {
    pub fn abi_preference(&self) -> AbiPreference {
        let host = AbiPreference::host();
        AbiPreference::new(
            self.is_64bit.unwrap_or(host.is_64bit),
            self.supported_64_bit.clone().unwrap_or(host.supported_64_bit),
            self.supported_32_bit.clone().unwrap_or(host.supported_32_bit),
        )
    }

    pub fn profile(&self) -> anyhow::Result<HostProfile> {
        let mut profile = HostProfile::full();
        for entry in &self.missing_members {
            let (class, member) = entry
                .rsplit_once('.')
                .ok_or_else(|| anyhow!("expected Class.member, got {:?}", entry))?;
            let target: TargetKind = class.parse().map_err(|e: String| anyhow!(e))?;
            if !profile.has(target, member) {
                bail!("{} has no known member {:?}", target, member);
            }
            profile = profile.without(target, member);
        }
        Ok(profile)
    }
}

impl InstalledSection {
    pub fn to_package(&self) -> anyhow::Result<InstalledPackage> {
        let mut info = PackageInfo::new(self.package.as_str());
        info.version_name = self.version_name.clone();
        info.version_code = self.version_code;
        let mut package = InstalledPackage::new(info);
        if let Some(installer) = &self.installer {
            package = package.with_installer(installer.as_str());
        }
        for (class, state) in &self.components {
            package = package.with_component(class.as_str(), parse_state(state)?);
        }
        Ok(package)
    }
}

fn parse_state(state: &str) -> anyhow::Result<EnabledState> {
    Ok(match state {
        "default" => EnabledState::Default,
        "enabled" => EnabledState::Enabled,
        "disabled" => EnabledState::Disabled,
        "disabled-user" => EnabledState::DisabledUser,
        "disabled-until-used" => EnabledState::DisabledUntilUsed,
        other => bail!("unknown component state {:?}", other),
    })
}

impl Query {
    fn package(&self) -> anyhow::Result<Value> {
        self.package
            .clone()
            .map(Value::Str)
            .ok_or_else(|| anyhow!("{} needs `package`", self.method))
    }

    fn component(&self) -> anyhow::Result<Value> {
        let package = self.package.as_deref();
        let class = self.class.as_deref();
        match (package, class) {
            (Some(p), Some(c)) => Ok(Value::Component(ComponentName::new(p, c))),
            _ => bail!("{} needs `package` and `class`", self.method),
        }
    }

    /// The call this query issues against the package manager.
    pub fn to_call(&self) -> anyhow::Result<Call> {
        let (sig, args) = match (self.method.as_str(), self.user) {
            ("getPackageInfo", None) => (
                methods::GET_PACKAGE_INFO,
                vec![self.package()?, Value::Int(self.flags as i32)],
            ),
            ("getPackageInfo", Some(user)) if self.long_flags => (
                methods::GET_PACKAGE_INFO_LONG_USER,
                vec![self.package()?, Value::Long(self.flags), Value::Int(user)],
            ),
            ("getPackageInfo", Some(user)) => (
                methods::GET_PACKAGE_INFO_USER,
                vec![self.package()?, Value::Int(self.flags as i32), Value::Int(user)],
            ),
            ("getComponentEnabledSetting", None) => {
                (methods::GET_COMPONENT_ENABLED_SETTING, vec![self.component()?])
            }
            ("getComponentEnabledSetting", Some(user)) => (
                methods::GET_COMPONENT_ENABLED_SETTING_USER,
                vec![self.component()?, Value::Int(user)],
            ),
            ("getInstallerPackageName", _) => {
                (methods::GET_INSTALLER_PACKAGE_NAME, vec![self.package()?])
            }
            ("getApplicationEnabledSetting", user) => (
                methods::GET_APPLICATION_ENABLED_SETTING,
                vec![self.package()?, Value::Int(user.unwrap_or(0))],
            ),
            ("asBinder", _) => (methods::AS_BINDER, Vec::new()),
            (other, _) => bail!("unknown method {:?}", other),
        };
        Ok(Call::new(sig, args)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[hook]
target = "com.google.android.webview"
archive = "webview.apk"

[host]
is_64bit = true
supported_64_bit = ["arm64-v8a"]
missing_members = ["ApplicationInfo.primaryCpuAbi"]

[[host.installed]]
package = "com.example.app"
installer = "com.example.store"
components = { "com.example.app.Main" = "disabled" }

[[query]]
method = "getPackageInfo"
package = "com.google.android.webview"
flags = 64

[[query]]
method = "getComponentEnabledSetting"
package = "com.example.app"
class = "com.example.app.Main"
user = 0
"#;

    #[test]
    fn test_parse_sample() {
        let config = HookConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.hook.installer, DEFAULT_INSTALLER);
        assert_eq!(config.hook.archive, PathBuf::from("webview.apk"));
        assert_eq!(config.host.installed.len(), 1);
        assert_eq!(config.queries.len(), 2);

        let abi = config.host.abi_preference();
        assert!(abi.is_64bit);
        assert_eq!(abi.candidates(), vec!["arm64-v8a"]);

        let profile = config.host.profile().unwrap();
        assert!(!profile.has(TargetKind::ApplicationInfo, "primaryCpuAbi"));
        assert!(profile.has(TargetKind::ContextImpl, "mPackageManager"));
    }

    #[test]
    fn test_queries_map_to_overloads() {
        let config = HookConfig::parse(SAMPLE).unwrap();
        let first = config.queries[0].to_call().unwrap();
        assert_eq!(*first.sig(), methods::GET_PACKAGE_INFO);
        assert_eq!(first.int_arg(1).unwrap(), 64);

        let second = config.queries[1].to_call().unwrap();
        assert_eq!(*second.sig(), methods::GET_COMPONENT_ENABLED_SETTING_USER);

        let long = Query {
            method: "getPackageInfo".into(),
            package: Some("p".into()),
            class: None,
            flags: 0x1_0000_0040,
            user: Some(0),
            long_flags: true,
        };
        assert_eq!(*long.to_call().unwrap().sig(), methods::GET_PACKAGE_INFO_LONG_USER);
    }

    #[test]
    fn test_query_argument_errors() {
        let missing_class = Query {
            method: "getComponentEnabledSetting".into(),
            package: Some("p".into()),
            class: None,
            flags: 0,
            user: None,
            long_flags: false,
        };
        assert!(missing_class.to_call().is_err());

        let unknown = Query {
            method: "getPackagesForUid".into(),
            ..missing_class
        };
        assert!(unknown.to_call().unwrap_err().to_string().contains("getPackagesForUid"));
    }

    #[test]
    fn test_installed_components() {
        let config = HookConfig::parse(SAMPLE).unwrap();
        let package = config.host.installed[0].to_package().unwrap();
        assert_eq!(package.installer.as_deref(), Some("com.example.store"));
        assert_eq!(
            package.components.get("com.example.app.Main"),
            Some(&EnabledState::Disabled)
        );
    }

    #[test]
    fn test_bad_member_rejected() {
        let host = HostSection {
            missing_members: vec!["ActivityThread.sNothing".into()],
            ..HostSection::default()
        };
        assert!(host.profile().is_err());

        let host = HostSection {
            missing_members: vec!["nodot".into()],
            ..HostSection::default()
        };
        assert!(host.profile().is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let text = "[hook]\ntarget = \"a\"\narchive = \"b\"\nbogus = 1\n";
        assert!(HookConfig::parse(text).is_err());
    }

    #[test]
    fn test_load_resolves_archive_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hook.toml");
        std::fs::write(&path, "[hook]\ntarget = \"a\"\narchive = \"apks/b.apk\"\n").unwrap();

        let config = HookConfig::load(&path).unwrap();
        assert_eq!(config.hook.archive, dir.path().join("apks/b.apk"));
        assert!(config.queries.is_empty());
    }
}
