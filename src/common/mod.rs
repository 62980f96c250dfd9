//! Common utilities and types module.
// Shared structs and constants used by every stage of the pipeline.

use std::path::{Path, PathBuf};

/// File extension of every container this crate produces or accepts.
pub const CONTAINER_EXTENSION: &str = ".tar.lz4";

/// Reserved suffix of per-slice artifacts. Never used for caller-visible files.
pub const SLICE_SUFFIX: &str = ".tmp";

/// Default copy buffer, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Global position of a regular file in the canonical traversal.
pub type FileIndex = u64;

/// What kind of filesystem object a [`TreeEntry`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One filesystem object produced by the canonical walk.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Where the object lives on disk.
    pub absolute_path: PathBuf,
    /// Name inside the archive: `<root name>/<relative path>`.
    pub archive_path: PathBuf,
    pub kind: EntryKind,
    /// Size in bytes for files; always 0 for directories. `None` when the
    /// metadata could not be read.
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Final container path for `base_name` inside `destination_dir`.
pub fn container_path(destination_dir: &Path, base_name: &str) -> PathBuf {
    destination_dir.join(format!("{base_name}{CONTAINER_EXTENSION}"))
}

/// Artifact path for slice `slice` of the container at `destination`.
///
/// Example: `out/backup.tar.lz4` → `out/backup.tar.lz4.slice-3.tmp`.
pub fn slice_artifact_path(destination: &Path, slice: usize) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".slice-{slice}{SLICE_SUFFIX}"));
    destination.with_file_name(name)
}

/// Strips [`CONTAINER_EXTENSION`] from a container file name.
pub fn strip_container_extension(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(CONTAINER_EXTENSION)
        .filter(|base| !base.is_empty())
}
