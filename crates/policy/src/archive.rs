//! Read-only access to package archives.

use crate::PolicyError;
use memmap2::Mmap;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::ZipArchive;

/// A zip archive over a read-only memory map of the file.
pub(crate) type MappedArchive<'m> = ZipArchive<Cursor<&'m [u8]>>;

/// Maps `path` and hands the opened archive to `f`.
pub(crate) fn with_archive<T>(
    path: &Path,
    f: impl FnOnce(&mut MappedArchive<'_>) -> Result<T, ZipError>,
) -> Result<T, PolicyError> {
    let wrap = |source: ZipError| PolicyError::Archive {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|e| wrap(ZipError::Io(e)))?;
    // SAFETY: mmap is read-only; the file handle outlives the mmap.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| wrap(ZipError::Io(e)))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..])).map_err(wrap)?;
    f(&mut archive).map_err(wrap)
}

/// ABI directory of a native library entry, if `name` is one.
///
/// Only `lib/<abi>/<file>.so` qualifies. Directory entries and names with a
/// `../` segment are never library entries.
pub fn library_abi(name: &str) -> Option<&str> {
    if name.contains("../") || name.ends_with('/') {
        return None;
    }
    let rest = name.strip_prefix("lib/")?;
    let (abi, file) = rest.split_once('/')?;
    if abi.is_empty() || file.contains('/') || !file.ends_with(".so") {
        return None;
    }
    Some(abi)
}

/// Canonical form of an archive path (no `\\?\` prefix on Windows).
pub fn normalize_archive_path(path: &Path) -> Result<PathBuf, PolicyError> {
    dunce::canonicalize(path).map_err(|source| PolicyError::Path {
        path: path.to_path_buf(),
        source,
    })
}
