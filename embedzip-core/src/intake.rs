//! Upload intake
//!
//! Copies caller-supplied files into a run's scratch directory under their
//! base names. Every file is attempted; if any copy fails the whole batch
//! is rejected with the complete list of failures.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where the content of an uploaded file comes from
#[derive(Debug, Clone)]
pub enum UploadSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A file handed to the pipeline by its caller
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name as given by the caller; may include directory components
    pub name: String,
    pub source: UploadSource,
}

impl UploadedFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.to_string_lossy().into_owned(),
            source: UploadSource::Path(path),
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            source: UploadSource::Bytes(bytes.into()),
        }
    }

    /// File name with any directory components stripped.
    ///
    /// Both `/` and `\` count as separators. Returns `None` when nothing
    /// usable is left (empty names, `.` or `..`).
    pub fn base_name(&self) -> Option<&str> {
        let base = self.name.rsplit(['/', '\\']).next()?;
        match base {
            "" | "." | ".." => None,
            name => Some(name),
        }
    }
}

/// A single file that could not be copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyFailure {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for CopyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.reason)
    }
}

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("{} of {total} file(s) failed: {}", .failures.len(), join_failures(.failures))]
    CopyFailed {
        total: usize,
        failures: Vec<CopyFailure>,
    },
}

fn join_failures(failures: &[CopyFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Copy every upload into `dir`, returning the paths written.
pub fn stage_uploads(files: &[UploadedFile], dir: &Path) -> Result<Vec<PathBuf>, IntakeError> {
    let mut staged = Vec::with_capacity(files.len());
    let mut failures = Vec::new();

    for file in files {
        match stage_one(file, dir) {
            Ok(path) => {
                tracing::debug!("Copied {} to {:?}", file.name, path);
                staged.push(path);
            }
            Err(reason) => {
                tracing::error!("Error copying file {}: {}", file.name, reason);
                failures.push(CopyFailure {
                    name: file.name.clone(),
                    reason,
                });
            }
        }
    }

    if !failures.is_empty() {
        return Err(IntakeError::CopyFailed {
            total: files.len(),
            failures,
        });
    }

    tracing::info!("Staged {} uploaded file(s)", staged.len());
    Ok(staged)
}

fn stage_one(file: &UploadedFile, dir: &Path) -> Result<PathBuf, String> {
    let base = file
        .base_name()
        .ok_or_else(|| "no usable file name".to_string())?;
    let target = dir.join(base);

    match &file.source {
        UploadSource::Path(source) => fs::copy(source, &target).map(|_| ()),
        UploadSource::Bytes(bytes) => fs::write(&target, bytes),
    }
    .map_err(|e| e.to_string())?;

    Ok(target)
}
