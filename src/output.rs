//! Files produced by pipe segments and how they land in an output tree.

use std::borrow::Cow;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::StepError;

/// A single file to be written into a dist directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Output {
    /// Destination relative to the dist directory.
    pub path: Utf8PathBuf,
    pub data: Vec<u8>,
}

impl Output {
    pub fn new(path: impl Into<Utf8PathBuf>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension()
    }
}

/// Inserts the `.min` marker before the extension: `a/app.css` becomes
/// `a/app.min.css`.
pub fn min_suffix(path: &Utf8Path) -> Utf8PathBuf {
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => path.with_file_name(format!("{stem}.min.{ext}")),
        (Some(stem), None) => path.with_file_name(format!("{stem}.min")),
        _ => path.to_path_buf(),
    }
}

/// Joins files the way a concatenating stream does: newline separated, in
/// the given order.
pub fn concat<'a>(outputs: impl IntoIterator<Item = &'a Output>) -> String {
    outputs
        .into_iter()
        .map(|output| output.text())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Writes outputs under `dist`, returning how many files actually changed.
///
/// Files whose content hash matches what is already on disk are left
/// untouched, so rebuilding unchanged inputs keeps the tree byte-identical
/// and does not bump modification times.
pub fn save(dist: &Utf8Path, outputs: &[Output]) -> Result<usize, StepError> {
    let mut changed = 0;

    for output in outputs {
        let path = dist.join(&output.path);

        if let Ok(existing) = fs::read(&path)
            && blake3::hash(&existing) == blake3::hash(&output.data)
        {
            continue;
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| StepError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        fs::write(&path, &output.data).map_err(|source| StepError::Write {
            path: path.clone(),
            source,
        })?;

        tracing::debug!("wrote {path}");
        changed += 1;
    }

    Ok(changed)
}
