//! # Policy: Package Metadata Substitution
//!
//! **Role**: Makes one target package appear installed from a local archive.
//! Package-info queries for the target are answered by parsing the archive,
//! its components report as disabled, and its installer is reported as a fixed
//! store identity. Every other package goes to the real service.
//!
//! **Core Types**:
//! - `PackageMetadataPolicy`: the `InterceptionPolicy` holding target, archive,
//!   ABI preference, installer identity and parser.
//! - `AbiPreference` / `scan_archive`: native-library ABI detection over the
//!   archive's `lib/<abi>/*.so` entries.
//! - `ArchiveParser` / `DeclaredArchiveParser`: archive → `PackageInfo`.

pub mod abi;
pub mod archive;
pub mod metadata;
pub mod parser;

pub use abi::{scan_archive, AbiPreference};
pub use archive::{library_abi, normalize_archive_path};
pub use metadata::{PackageMetadataPolicy, DEFAULT_INSTALLER};
pub use parser::{ArchiveParser, DeclaredArchiveParser};

use std::path::PathBuf;

/// Errors raised while answering for the target package.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Unable to find supported ABIs [{}] in archive {}", supported.join(", "), archive.display())]
    AbiNotFound {
        supported: Vec<String>,
        archive: PathBuf,
    },
    #[error("Cannot read archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Cannot resolve archive path {}: {source}", path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
