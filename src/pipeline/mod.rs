//! Pipeline stages for label splitting.
//!
//! ```text
//! input ──▶ split ──▶ analyze ──▶ classify ──▶ concat + report
//!           (lopdf)   (render → barcode, text, hash)
//! ```
//!
//! 1. [`input`]    discover and validate source PDFs
//! 2. [`split`]    one single-page PDF per source page
//! 3. [`analyze`]  per-page signals via the [`render`], [`barcode`] and
//!    [`text`] capabilities, each bounded by a timeout in `spawn_blocking`
//! 4. [`classify`] carrier policy → thermal / paper (/ ignored)
//! 5. [`concat`]   reassemble each stream in page order
//! 6. [`report`]   optional JSON summary
//!
//! [`pdf`] holds the page-cloning helper that [`split`] and [`concat`] share.

pub mod analyze;
pub mod barcode;
pub mod classify;
pub mod concat;
pub mod input;
pub(crate) mod pdf;
pub mod render;
pub mod report;
pub mod split;
pub mod text;

use crate::error::SplitterError;
use std::io::Write;
use std::path::Path;

/// Write `bytes` to `path` through a temp file in the same directory, so a
/// reader never sees a half-written file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SplitterError> {
    let write_err = |source: std::io::Error| SplitterError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/out.json");
        write_atomic(&target, b"{}").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"{}");

        // only the target remains, no temp leftovers
        let entries = std::fs::read_dir(dir.path().join("a/b")).unwrap().count();
        assert_eq!(entries, 1);
    }
}
