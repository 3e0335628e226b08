//! Transcript loading
//!
//! Reads every `.txt` file below a directory into a [`Document`] using a
//! small worker pool connected by crossbeam channels. Files that cannot be
//! read or are not valid UTF-8 are skipped and reported, never fatal.
//! Hidden files and directories (names starting with `.`) are not loaded.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

const TEXT_EXTENSION: &str = "txt";

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Loader worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, LoadError>;

/// The text content of one transcript file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name relative to the loaded directory
    pub source: String,
    pub text: String,
}

/// A file that was found but could not be turned into a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Documents that loaded plus the files that were skipped
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

/// Messages sent from read workers back to the collector
enum LoadMessage {
    Loaded(Document),
    Skipped(SkippedFile),
}

/// Loads transcript files from a directory tree
#[derive(Debug, Clone)]
pub struct TranscriptLoader {
    workers: usize,
}

impl TranscriptLoader {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Load all `.txt` files under `root`.
    ///
    /// Documents are returned sorted by source name so that downstream
    /// chunk order does not depend on worker scheduling.
    pub fn load(&self, root: &Path) -> Result<LoadReport> {
        if !root.is_dir() {
            return Err(LoadError::NotADirectory(root.to_path_buf()));
        }

        let mut report = LoadReport::default();
        let files = collect_text_files(root, &mut report.skipped);
        tracing::debug!("Found {} text files under {:?}", files.len(), root);

        if files.is_empty() {
            return Ok(report);
        }

        let (path_tx, path_rx) = unbounded::<PathBuf>();
        let (result_tx, result_rx) = unbounded::<LoadMessage>();

        let file_count = files.len();
        for path in files {
            // Receiver is alive until the workers are spawned below
            let _ = path_tx.send(path);
        }
        drop(path_tx);

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        for _ in 0..self.workers.min(file_count) {
            let rx = path_rx.clone();
            let tx = result_tx.clone();
            let root = root.to_path_buf();
            handles.push(thread::spawn(move || read_worker(rx, tx, root)));
        }
        // Drop our copies - workers have their own clones
        drop(path_rx);
        drop(result_tx);

        for msg in result_rx {
            match msg {
                LoadMessage::Loaded(document) => {
                    tracing::debug!("Loaded {} ({} chars)", document.source, document.text.len());
                    report.documents.push(document);
                }
                LoadMessage::Skipped(skipped) => {
                    tracing::warn!("Skipping {:?}: {}", skipped.path, skipped.reason);
                    report.skipped.push(skipped);
                }
            }
        }

        for handle in handles {
            handle.join().map_err(|_| LoadError::WorkerPanicked)?;
        }

        report.documents.sort_by(|a, b| a.source.cmp(&b.source));
        report.skipped.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!(
            "Loaded {} documents ({} skipped)",
            report.documents.len(),
            report.skipped.len()
        );

        Ok(report)
    }
}

impl Default for TranscriptLoader {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

fn collect_text_files(root: &Path, skipped: &mut Vec<SkippedFile>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let path = entry.path();
        let is_text = path
            .extension()
            .map(|ext| ext == TEXT_EXTENSION)
            .unwrap_or(false);

        if entry.file_type().is_file() && is_text {
            files.push(path.to_path_buf());
        } else if entry.file_type().is_file() {
            tracing::debug!("Ignoring non-text file {:?}", path);
        }
    }

    files
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn read_worker(rx: Receiver<PathBuf>, tx: Sender<LoadMessage>, root: PathBuf) {
    for path in rx {
        let msg = match read_document(&root, &path) {
            Ok(document) => LoadMessage::Loaded(document),
            Err(reason) => LoadMessage::Skipped(SkippedFile { path, reason }),
        };

        if tx.send(msg).is_err() {
            break; // Collector dropped, stop processing
        }
    }
}

fn read_document(root: &Path, path: &Path) -> std::result::Result<Document, String> {
    let bytes = fs::read(path).map_err(|e| format!("read failed: {}", e))?;
    let text = String::from_utf8(bytes).map_err(|e| format!("not valid UTF-8: {}", e))?;

    let source = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned();

    Ok(Document { source, text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_dir_with_files(files: &[(&str, &str)]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        for (path, content) in files {
            write_bytes(&temp_dir, path, content.as_bytes());
        }
        temp_dir
    }

    fn write_bytes(dir: &TempDir, path: &str, content: &[u8]) {
        let full_path = dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full_path, content).unwrap();
    }

    #[test]
    fn test_load_text_files() {
        let dir = create_test_dir_with_files(&[
            ("b.txt", "Second transcript"),
            ("a.txt", "First transcript"),
        ]);

        let report = TranscriptLoader::new(4).load(dir.path()).unwrap();

        assert_eq!(report.documents.len(), 2);
        assert!(report.skipped.is_empty());
        assert_eq!(report.documents[0].source, "a.txt");
        assert_eq!(report.documents[0].text, "First transcript");
        assert_eq!(report.documents[1].source, "b.txt");
    }

    #[test]
    fn test_ignores_other_extensions() {
        let dir = create_test_dir_with_files(&[
            ("notes.txt", "keep me"),
            ("readme.md", "# not a transcript"),
        ]);
        write_bytes(&dir, "audio.mp3", &[0x00, 0x01, 0xff]);

        let report = TranscriptLoader::new(2).load(dir.path()).unwrap();

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].source, "notes.txt");
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_skips_invalid_utf8() {
        let dir = create_test_dir_with_files(&[("good.txt", "hello")]);
        write_bytes(&dir, "bad.txt", &[0xff, 0xfe, 0xfd, 0x00]);

        let report = TranscriptLoader::new(2).load(dir.path()).unwrap();

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].source, "good.txt");
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.ends_with("bad.txt"));
        assert!(report.skipped[0].reason.contains("UTF-8"));
    }

    #[test]
    fn test_all_files_undecodable_yields_empty_report() {
        let dir = TempDir::new().unwrap();
        write_bytes(&dir, "a.txt", &[0xc3, 0x28]);
        write_bytes(&dir, "b.txt", &[0xa0, 0xa1]);

        let report = TranscriptLoader::new(2).load(dir.path()).unwrap();

        assert!(report.documents.is_empty());
        assert_eq!(report.skipped.len(), 2);
    }

    #[test]
    fn test_empty_file_is_still_a_document() {
        let dir = create_test_dir_with_files(&[("empty.txt", "")]);

        let report = TranscriptLoader::default().load(dir.path()).unwrap();

        assert_eq!(report.documents.len(), 1);
        assert!(report.documents[0].text.is_empty());
    }

    #[test]
    fn test_nested_directories() {
        let dir = create_test_dir_with_files(&[
            ("top.txt", "top"),
            ("nested/deeper/inner.txt", "inner"),
        ]);

        let report = TranscriptLoader::new(1).load(dir.path()).unwrap();

        assert_eq!(report.documents.len(), 2);
        assert!(report
            .documents
            .iter()
            .any(|d| d.source.ends_with("inner.txt") && d.text == "inner"));
    }

    #[test]
    fn test_many_files_with_few_workers() {
        let dir = TempDir::new().unwrap();
        for i in 0..50 {
            write_bytes(&dir, &format!("file-{:02}.txt", i), format!("content {}", i).as_bytes());
        }

        let report = TranscriptLoader::new(3).load(dir.path()).unwrap();

        assert_eq!(report.documents.len(), 50);
        assert_eq!(report.documents[0].source, "file-00.txt");
        assert_eq!(report.documents[49].source, "file-49.txt");
    }

    #[test]
    fn test_skips_hidden_files_and_directories() {
        let dir = create_test_dir_with_files(&[
            ("visible.txt", "keep me"),
            (".hidden.txt", "dotfile transcript"),
            (".cache/inner.txt", "inside a hidden directory"),
        ]);

        let report = TranscriptLoader::new(2).load(dir.path()).unwrap();

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].source, "visible.txt");
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");

        let result = TranscriptLoader::new(1).load(&missing);

        assert!(matches!(result, Err(LoadError::NotADirectory(_))));
    }

    #[test]
    fn test_worker_count_is_at_least_one() {
        let loader = TranscriptLoader::new(0);
        assert_eq!(loader.workers, 1);
    }
}
