//! Input discovery and validation.
//!
//! A batch input is a directory; every regular file whose extension is
//! `pdf` (any case) is a candidate. Each candidate is checked for read
//! permission and the `%PDF` magic bytes before its pipeline splits it, so
//! a mislabelled file fails with a clear error instead of a parser crash.

use crate::error::SplitterError;
use crate::output::SourceDocument;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// List the PDFs in `dir`, sorted lexicographically by path.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>, SplitterError> {
    if !dir.is_dir() {
        return Err(SplitterError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{base}/*.pdf");
    let options = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let mut files: Vec<PathBuf> = glob::glob_with(&pattern, options)
        .map_err(|e| SplitterError::InvalidConfig(format!("input pattern '{pattern}': {e}")))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file() && is_pdf_name(p))
        .collect();
    files.sort();

    debug!("Discovered {} PDF(s) in {}", files.len(), dir.display());
    Ok(files)
}

/// Inputs whose outputs would overwrite those of an earlier input, mapped to
/// that earlier input.
///
/// `files` must be sorted; the first file for each output key keeps it.
/// `box.pdf` and `box.PDF` collide, as do `Box.pdf` and `box.pdf`.
pub fn output_collisions(files: &[PathBuf]) -> HashMap<PathBuf, PathBuf> {
    let mut owners: HashMap<String, &PathBuf> = HashMap::new();
    let mut collisions = HashMap::new();
    for file in files {
        let key = SourceDocument::new(file.as_path()).output_key();
        match owners.get(&key) {
            Some(owner) => {
                collisions.insert(file.clone(), (*owner).clone());
            }
            None => {
                owners.insert(key, file);
            }
        }
    }
    collisions
}

fn is_pdf_name(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Check that `path` exists, is readable and starts with `%PDF`.
pub fn validate_pdf(path: &Path) -> Result<(), SplitterError> {
    if !path.exists() {
        return Err(SplitterError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == b"%PDF" => Ok(()),
                Ok(()) => Err(SplitterError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                }),
                Err(_) => Err(SplitterError::CorruptPdf {
                    path: path.to_path_buf(),
                    detail: "file is shorter than a PDF header".into(),
                }),
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(SplitterError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(SplitterError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}
