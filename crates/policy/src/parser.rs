//! Archive metadata parsing.

use crate::archive::with_archive;
use common::{PackageFlags, PackageInfo};
use std::io::Read;
use std::path::Path;

/// Name of the manifest every package archive carries.
pub const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

/// Parses package metadata out of a local archive.
///
/// Returns `None` when the archive cannot satisfy `flags`; callers decide
/// whether to retry with fewer flags.
pub trait ArchiveParser: Send + Sync {
    fn parse(&self, archive: &Path, flags: PackageFlags) -> Option<PackageInfo>;
}

/// Parser that trusts a declared identity and checks the archive's shape.
///
/// The archive must be a readable zip with a manifest entry. When signatures
/// are requested, the first `META-INF/*.RSA`, `*.DSA` or `*.EC` block is
/// returned as the package's only signature; without one the parse fails.
#[derive(Debug, Clone)]
pub struct DeclaredArchiveParser {
    package_name: String,
    version_name: Option<String>,
    version_code: i64,
}

impl DeclaredArchiveParser {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            version_name: None,
            version_code: 0,
        }
    }

    pub fn with_version(mut self, name: impl Into<String>, code: i64) -> Self {
        self.version_name = Some(name.into());
        self.version_code = code;
        self
    }
}

fn is_signature_block(name: &str) -> bool {
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    !file.contains('/')
        && [".RSA", ".DSA", ".EC"]
            .iter()
            .any(|ext| file.len() > ext.len() && file.ends_with(ext))
}

impl ArchiveParser for DeclaredArchiveParser {
    fn parse(&self, archive: &Path, flags: PackageFlags) -> Option<PackageInfo> {
        let want_signatures = flags.contains(PackageFlags::GET_SIGNATURES);
        let parsed = with_archive(archive, |zip| {
            if zip.index_for_name(MANIFEST_ENTRY).is_none() {
                return Ok(None);
            }
            let mut info = PackageInfo::new(self.package_name.as_str());
            info.version_name = self.version_name.clone();
            info.version_code = self.version_code;

            if want_signatures {
                let Some(block) = zip.file_names().find(|n| is_signature_block(n)).map(str::to_owned) else {
                    return Ok(None);
                };
                let mut entry = zip.by_name(&block)?;
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes)?;
                info.signatures.push(bytes);
            }
            Ok(Some(info))
        });

        match parsed {
            Ok(Some(info)) => Some(info),
            Ok(None) => {
                tracing::debug!(archive = %archive.display(), ?flags, "archive does not satisfy requested flags");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "archive parse failed");
                None
            }
        }
    }
}
