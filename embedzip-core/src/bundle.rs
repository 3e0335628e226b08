//! Zip packaging of a saved index
//!
//! A bundle is a zip archive whose root holds exactly the two index
//! artifacts. Archives are written to a temporary file next to the target
//! and moved into place only once complete, so a failed write never leaves
//! a partial archive at the final path.

use crate::index::{self, artifact_paths, FlatIndex, DOCSTORE_FILE, INDEX_FILE};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Default archive file name
pub const ARCHIVE_NAME: &str = "faiss_index_google.zip";

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Index artifact missing: {0}")]
    MissingArtifact(PathBuf),

    #[error("Archive must contain exactly index.faiss and index.pkl, found {0:?}")]
    UnexpectedEntries(Vec<String>),
}

pub type Result<T> = std::result::Result<T, BundleError>;

/// Zip the artifacts in `index_dir` into `archive_path`, replacing any
/// previous archive there. Returns the archive size in bytes.
pub fn write_bundle(index_dir: &Path, archive_path: &Path) -> Result<u64> {
    let artifacts = artifact_paths(index_dir);
    for artifact in &artifacts {
        if !artifact.is_file() {
            return Err(BundleError::MissingArtifact(artifact.clone()));
        }
    }

    let parent = match archive_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    // Dropped (and deleted) on any early return below
    let mut partial = tempfile::Builder::new()
        .prefix(".embedzip-")
        .suffix(".zip.partial")
        .tempfile_in(parent)?;

    {
        let mut zip = ZipWriter::new(partial.as_file_mut());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for artifact in &artifacts {
            let name = artifact
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            zip.start_file(name, options)?;
            let mut source = File::open(artifact)?;
            io::copy(&mut source, &mut zip)?;
        }

        zip.finish()?;
    }

    let size = partial.as_file().metadata()?.len();
    partial
        .persist(archive_path)
        .map_err(|e| BundleError::Io(e.error))?;

    tracing::info!("Wrote {} ({} bytes)", archive_path.display(), size);
    Ok(size)
}

/// Names of the entries in an archive, in archive order
pub fn list_entries(archive_path: &Path) -> Result<Vec<String>> {
    let archive = ZipArchive::new(File::open(archive_path)?)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// An archive extracted into a private temporary directory
///
/// The directory is removed when this value is dropped.
#[derive(Debug)]
pub struct OpenedBundle {
    dir: TempDir,
    entries: Vec<String>,
}

impl OpenedBundle {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn load_index(&self) -> index::Result<FlatIndex> {
        index::load_index(self.path())
    }
}

/// Validate and extract a bundle
pub fn open_bundle(archive_path: &Path) -> Result<OpenedBundle> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;

    let mut entries: Vec<String> = archive.file_names().map(str::to_string).collect();
    entries.sort();

    let mut expected = vec![INDEX_FILE.to_string(), DOCSTORE_FILE.to_string()];
    expected.sort();
    if entries != expected {
        return Err(BundleError::UnexpectedEntries(entries));
    }

    let dir = tempfile::Builder::new().prefix("embedzip-open-").tempdir()?;
    archive.extract(dir.path())?;
    tracing::debug!("Extracted {} to {:?}", archive_path.display(), dir.path());

    Ok(OpenedBundle { dir, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_fake_artifacts(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(INDEX_FILE), b"vectors").unwrap();
        fs::write(dir.join(DOCSTORE_FILE), b"docstore").unwrap();
    }

    fn leftover_partials(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".zip.partial"))
            .count()
    }

    #[test]
    fn test_bundle_contains_exactly_two_entries() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("faiss_index");
        write_fake_artifacts(&index_dir);
        let archive = dir.path().join(ARCHIVE_NAME);

        let size = write_bundle(&index_dir, &archive).unwrap();

        assert!(size > 0);
        let mut entries = list_entries(&archive).unwrap();
        entries.sort();
        assert_eq!(entries, vec!["index.faiss", "index.pkl"]);
        assert_eq!(leftover_partials(dir.path()), 0);
    }

    #[test]
    fn test_bundle_replaces_previous_archive() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("faiss_index");
        write_fake_artifacts(&index_dir);
        let archive = dir.path().join(ARCHIVE_NAME);
        fs::write(&archive, b"stale content").unwrap();

        write_bundle(&index_dir, &archive).unwrap();

        assert_eq!(list_entries(&archive).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_artifact_keeps_previous_archive() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("faiss_index");
        fs::create_dir_all(&index_dir).unwrap();
        fs::write(index_dir.join(INDEX_FILE), b"vectors").unwrap();
        let archive = dir.path().join(ARCHIVE_NAME);
        fs::write(&archive, b"previous").unwrap();

        let result = write_bundle(&index_dir, &archive);

        assert!(matches!(result, Err(BundleError::MissingArtifact(_))));
        assert_eq!(fs::read(&archive).unwrap(), b"previous");
        assert_eq!(leftover_partials(dir.path()), 0);
    }

    #[test]
    fn test_failed_persist_removes_partial_archive() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("faiss_index");
        write_fake_artifacts(&index_dir);
        let out = dir.path().join("out");
        // A non-empty directory sits where the archive should go
        let archive = out.join(ARCHIVE_NAME);
        fs::create_dir_all(archive.join("occupied")).unwrap();

        let result = write_bundle(&index_dir, &archive);

        assert!(matches!(result, Err(BundleError::Io(_))));
        assert!(archive.is_dir());
        assert_eq!(leftover_partials(&out), 0);
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
    }

    #[test]
    fn test_open_bundle_extracts_artifacts() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("faiss_index");
        write_fake_artifacts(&index_dir);
        let archive = dir.path().join(ARCHIVE_NAME);
        write_bundle(&index_dir, &archive).unwrap();

        let opened = open_bundle(&archive).unwrap();
        let extracted = opened.path().to_path_buf();

        assert_eq!(fs::read(extracted.join(INDEX_FILE)).unwrap(), b"vectors");
        assert_eq!(fs::read(extracted.join(DOCSTORE_FILE)).unwrap(), b"docstore");
        assert_eq!(opened.entries().len(), 2);

        drop(opened);
        assert!(!extracted.exists());
    }

    #[test]
    fn test_open_bundle_rejects_extra_entries() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("odd.zip");
        {
            let mut zip = ZipWriter::new(File::create(&archive).unwrap());
            let options = SimpleFileOptions::default();
            for name in [INDEX_FILE, DOCSTORE_FILE, "extra.txt"] {
                zip.start_file(name, options).unwrap();
                zip.write_all(b"x").unwrap();
            }
            zip.finish().unwrap();
        }

        let result = open_bundle(&archive);

        match result {
            Err(BundleError::UnexpectedEntries(entries)) => assert_eq!(entries.len(), 3),
            other => panic!("expected UnexpectedEntries, got {:?}", other),
        }
    }

    #[test]
    fn test_archive_in_new_directory() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("faiss_index");
        write_fake_artifacts(&index_dir);
        let archive = dir.path().join("out").join("nested").join(ARCHIVE_NAME);

        write_bundle(&index_dir, &archive).unwrap();

        assert!(archive.is_file());
    }
}
