//! Directory archive creation and extraction.
//!
//! Directory payloads travel as a single gzip-compressed tar archive. The
//! archive already carries its own compression layer, so the generic
//! payload compressor never touches it.

use crate::error::{Result, WireError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::{Component, Path, PathBuf};

/// Compress a directory tree into a gzip-tar archive held in memory.
///
/// # Errors
/// Returns `WireError::Archive` if the directory cannot be read or the
/// archive cannot be written
pub fn pack_tree<P: AsRef<Path>>(dir: P) -> Result<Vec<u8>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(WireError::Archive(format!(
            "not a directory: {}",
            dir.display()
        )));
    }

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(".", dir)
        .map_err(|e| WireError::Archive(format!("failed to archive {}: {e}", dir.display())))?;

    let encoder = builder
        .into_inner()
        .map_err(|e| WireError::Archive(format!("failed to finish archive: {e}")))?;
    encoder
        .finish()
        .map_err(|e| WireError::Archive(format!("failed to finish gzip stream: {e}")))
}

/// Extract a gzip-tar archive into `dest`, creating it if needed.
///
/// Entries that would escape the destination (absolute paths or `..`
/// traversal) are rejected.
///
/// # Errors
/// Returns `WireError::Archive` on corrupt archives or traversal attempts
pub fn unpack_tree<P: AsRef<Path>>(archive: &[u8], dest: P) -> Result<PathBuf> {
    let dest = dest.as_ref();
    std::fs::create_dir_all(dest)
        .map_err(|e| WireError::Archive(format!("cannot create {}: {e}", dest.display())))?;

    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    let entries = tar
        .entries()
        .map_err(|e| WireError::Archive(format!("corrupt archive: {e}")))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| WireError::Archive(format!("corrupt entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| WireError::Archive(format!("bad entry path: {e}")))?
            .into_owned();

        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(WireError::Archive(format!(
                "entry escapes destination: {}",
                path.display()
            )));
        }

        entry
            .unpack_in(dest)
            .map_err(|e| WireError::Archive(format!("failed to unpack {}: {e}", path.display())))?;
    }

    Ok(dest.to_path_buf())
}
