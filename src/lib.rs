//! # tarlz4 Core Library
//!
//! Parallel, byte-balanced archiving of a directory tree into one `.tar.lz4`
//! container, and the sequential inverse.
//!
//! Compression splits the tree's files into slices of roughly equal byte size.
//! Each slice is written by its own worker as an independent LZ4 frame holding
//! a partial tar stream, and the frames are then merged with positional writes
//! into a container that any sequential tar+LZ4 reader can decode.
//!
//! ## Key Modules
//!
//! - [`walk`]: the canonical, sorted traversal both passes share.
//! - [`inventory`]: sizes the tree and plans the slices.
//! - [`archive`]: writes one slice.
//! - [`merge`]: concatenates slice artifacts into the container.
//! - [`extract`]: decodes a container back into a tree.
//! - [`workers`]: the injectable task pool.
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::Path;
//! use tarlz4::{CompressOptions, DecompressOptions};
//!
//! let opts = CompressOptions::new().threads(4).exclude(".DS_Store");
//! let container = tarlz4::compress(Path::new("photos"), Path::new("/backup"), "photos", &opts)?;
//! tarlz4::decompress(&container, Path::new("/restore"), &DecompressOptions::default())?;
//! # Ok::<(), tarlz4::ArchiverError>(())
//! ```

use std::path::{Path, PathBuf};

pub mod archive;
pub mod cli;
pub mod cli_runner;
pub mod common;
pub mod compress;
pub mod error;
pub mod extract;
pub mod inventory;
pub mod logging;
pub mod merge;
pub mod options;
pub mod progress;
pub mod walk;
pub mod workers;

// Cross-platform filesystem wrapper
pub mod fsx;

pub use compress::Compressor;
pub use error::{ArchiverError, Result};
pub use extract::{Decompressor, ListedEntry};
pub use logging::Verbosity;
pub use options::{CompressOptions, DecompressOptions};
pub use walk::ExclusionSet;
pub use workers::TaskPool;

/// Compresses `source_dir` into `<destination_dir>/<base_name>.tar.lz4`.
pub fn compress(
    source_dir: &Path,
    destination_dir: &Path,
    base_name: &str,
    options: &CompressOptions,
) -> Result<PathBuf> {
    Compressor::new(options.clone()).compress(source_dir, destination_dir, base_name)
}

/// Extracts `source_file` into `<destination_dir>/<base name>` and returns that directory.
pub fn decompress(source_file: &Path, destination_dir: &Path, options: &DecompressOptions) -> Result<PathBuf> {
    Decompressor::new(options.clone()).decompress(source_file, destination_dir)
}

/// Lists the entries of `source_file` without extracting it.
pub fn list(source_file: &Path) -> Result<Vec<ListedEntry>> {
    Decompressor::default().list(source_file)
}
