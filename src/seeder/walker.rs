//! Staging-tree enumeration and best-effort bulk upload.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use super::github::HostingApi;
use super::upload::{RetryPolicy, UploadTarget, upload_with_retry};
use crate::errors::SetupError;

/// Version-control metadata directories never pushed to the remote.
const SKIPPED_DIRS: &[&str] = &[".git", ".svn", ".hg"];

/// Packaged archives never pushed to the remote.
const SKIPPED_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".tar", ".zip"];

/// A leaf file found under the walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Path relative to the root, `/`-separated on every platform.
    pub relative_path: String,
    pub content: Vec<u8>,
}

/// A single entry that could not be listed or read.
#[derive(Debug)]
pub struct WalkError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        SKIPPED_DIRS.contains(&name.as_ref())
    } else {
        SKIPPED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Lazily enumerate every uploadable file under `root`, depth-first with
/// siblings in file-name order. Each call starts a fresh walk.
pub fn walk(root: &Path) -> impl Iterator<Item = Result<WalkedFile, WalkError>> + use<> {
    let root = root.to_path_buf();
    WalkDir::new(&root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry))
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
                    return Some(Err(WalkError { path, source }));
                }
            };
            // Symlinked directories are not followed; their targets are
            // either already in the tree or outside it.
            if entry.file_type().is_dir() || (entry.path_is_symlink() && entry.path().is_dir()) {
                return None;
            }
            let relative_path = relative_path(&root, entry.path());
            Some(
                std::fs::read(entry.path())
                    .map(|content| WalkedFile {
                        relative_path,
                        content,
                    })
                    .map_err(|source| WalkError {
                        path: entry.path().to_path_buf(),
                        source,
                    }),
            )
        })
}

/// Aggregate outcome of a tree upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub failed_paths: Vec<String>,
}

impl UploadSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn record(&mut self, path: &str, ok: bool) {
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            self.failed_paths.push(path.to_string());
        }
    }

    pub fn merge(&mut self, other: UploadSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.failed_paths.extend(other.failed_paths);
    }

    /// Fail the tree as a whole if any single file failed.
    pub fn into_result(self) -> Result<UploadSummary, SetupError> {
        if self.failed > 0 {
            Err(SetupError::IncompleteUpload {
                failed: self.failed,
                total: self.total(),
            })
        } else {
            Ok(self)
        }
    }
}

/// Upload every file under `root`, continuing past individual failures.
///
/// `skip` names root-relative paths that were already pushed by the caller.
/// Only a missing or unreadable root aborts the walk.
pub async fn upload_tree(
    api: &dyn HostingApi,
    target: UploadTarget<'_>,
    root: &Path,
    policy: RetryPolicy,
    skip: &[&str],
) -> Result<UploadSummary, SetupError> {
    if let Err(source) = std::fs::read_dir(root) {
        return Err(SetupError::Walk {
            path: root.to_path_buf(),
            source,
        });
    }

    let mut summary = UploadSummary::default();
    for entry in walk(root) {
        match entry {
            Ok(file) => {
                if skip.contains(&file.relative_path.as_str()) {
                    continue;
                }
                let ok = match upload_with_retry(
                    api,
                    target,
                    &file.relative_path,
                    &file.content,
                    policy,
                )
                .await
                {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::error!(path = %file.relative_path, error = %err, "Giving up on file");
                        false
                    }
                };
                summary.record(&file.relative_path, ok);
            }
            Err(err) => {
                let path = relative_path(root, &err.path);
                tracing::error!(path = %path, error = %err.source, "Failed to read staged file");
                summary.record(&path, false);
            }
        }
    }

    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Finished uploading staging tree"
    );
    Ok(summary)
}
