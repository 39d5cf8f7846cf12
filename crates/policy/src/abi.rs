//! Native-library ABI detection.
//!
//! The candidate ABIs are the host's supported set for its own bitness only,
//! sorted in reverse lexical order. The archive is walked in entry order and
//! the first library entry whose ABI is a candidate wins, so the archive's own
//! layout (not the preference order) decides between two supported ABIs.

use crate::archive::{library_abi, with_archive};
use crate::PolicyError;
use std::path::Path;

/// Supported ABIs of the host, split by bitness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiPreference {
    pub is_64bit: bool,
    pub supported_64_bit: Vec<String>,
    pub supported_32_bit: Vec<String>,
}

impl AbiPreference {
    pub fn new(is_64bit: bool, supported_64_bit: Vec<String>, supported_32_bit: Vec<String>) -> Self {
        Self {
            is_64bit,
            supported_64_bit,
            supported_32_bit,
        }
    }

    /// Preference for the architecture this process was built for.
    pub fn host() -> Self {
        fn owned(abis: &[&str]) -> Vec<String> {
            abis.iter().map(|s| s.to_string()).collect()
        }
        let (abi64, abi32) = match std::env::consts::ARCH {
            "aarch64" => (owned(&["arm64-v8a"]), owned(&["armeabi-v7a", "armeabi"])),
            "arm" => (Vec::new(), owned(&["armeabi-v7a", "armeabi"])),
            "x86_64" => (owned(&["x86_64"]), owned(&["x86"])),
            "x86" => (Vec::new(), owned(&["x86"])),
            "riscv64" => (owned(&["riscv64"]), Vec::new()),
            _ => (Vec::new(), Vec::new()),
        };
        Self::new(cfg!(target_pointer_width = "64"), abi64, abi32)
    }

    /// The bitness-matching set, sorted in reverse lexical order.
    pub fn candidates(&self) -> Vec<String> {
        let mut abis = if self.is_64bit {
            self.supported_64_bit.clone()
        } else {
            self.supported_32_bit.clone()
        };
        abis.sort_by(|a, b| b.cmp(a));
        abis
    }
}

/// Membership test on a reverse-sorted candidate list.
fn is_candidate(candidates: &[String], abi: &str) -> bool {
    candidates
        .binary_search_by(|probe| abi.cmp(probe.as_str()))
        .is_ok()
}

/// First entry name in `names` that is a library for one of `candidates`.
pub fn select_abi<'a>(
    names: impl IntoIterator<Item = &'a str>,
    candidates: &[String],
) -> Option<String> {
    names
        .into_iter()
        .filter_map(library_abi)
        .find(|abi| is_candidate(candidates, abi))
        .map(str::to_owned)
}

/// Finds the ABI whose native libraries the archive provides for this host.
///
/// # Errors
/// - `PolicyError::Archive` if the archive cannot be opened or read.
/// - `PolicyError::AbiNotFound` if no `lib/<abi>/*.so` entry matches.
pub fn scan_archive(path: &Path, preference: &AbiPreference) -> Result<String, PolicyError> {
    let candidates = preference.candidates();
    let found = with_archive(path, |zip| Ok(select_abi(zip.file_names(), &candidates)))?;
    match found {
        Some(abi) => {
            tracing::debug!(archive = %path.display(), %abi, "native library ABI selected");
            Ok(abi)
        }
        None => Err(PolicyError::AbiNotFound {
            supported: candidates,
            archive: path.to_path_buf(),
        }),
    }
}
