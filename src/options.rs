//! Tunables for compression and extraction.
//!
//! Both option structs deserialize with `#[serde(default)]`, so a JSON config
//! file only needs the keys it wants to change.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::DEFAULT_BUFFER_SIZE;
use crate::error::{IoContext, Result};
use crate::logging::Verbosity;
use crate::walk::ExclusionSet;

/// Default percentage step between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressOptions {
    /// Worker count. Anything below 2 archives directly into the destination.
    pub threads: usize,
    pub buffer_size: usize,
    pub excludes: ExclusionSet,
    pub progress: bool,
    /// Percentage step between progress log lines.
    pub progress_interval: u32,
    pub verbosity: Verbosity,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            buffer_size: DEFAULT_BUFFER_SIZE,
            excludes: ExclusionSet::new(),
            progress: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            verbosity: Verbosity::default(),
        }
    }
}

impl CompressOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Zero is treated as the default buffer size.
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.excludes.insert(name);
        self
    }

    pub fn excludes(mut self, excludes: ExclusionSet) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn progress_interval(mut self, percent: u32) -> Self {
        self.progress_interval = percent;
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn effective_buffer_size(&self) -> usize {
        effective_buffer(self.buffer_size)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).at(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompressOptions {
    pub buffer_size: usize,
    pub progress: bool,
    pub progress_interval: u32,
    pub verbosity: Verbosity,
}

impl Default for DecompressOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            progress: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            verbosity: Verbosity::default(),
        }
    }
}

impl DecompressOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    pub fn progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn progress_interval(mut self, percent: u32) -> Self {
        self.progress_interval = percent;
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn effective_buffer_size(&self) -> usize {
        effective_buffer(self.buffer_size)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).at(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn effective_buffer(bytes: usize) -> usize {
    if bytes == 0 {
        DEFAULT_BUFFER_SIZE
    } else {
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults() {
        let opts = CompressOptions::default();
        assert_eq!(opts.threads, 1);
        assert_eq!(opts.buffer_size, 8192);
        assert!(!opts.progress);
        assert_eq!(opts.progress_interval, 10);
        assert_eq!(opts.verbosity, Verbosity::Info);
        assert!(opts.excludes.is_empty());
    }

    #[test]
    fn builder_setters_chain() {
        let opts = CompressOptions::new()
            .threads(6)
            .buffer_size(4096)
            .exclude(".DS_Store")
            .progress(true)
            .progress_interval(25)
            .verbosity(Verbosity::Debug);
        assert_eq!(opts.threads, 6);
        assert_eq!(opts.effective_buffer_size(), 4096);
        assert_eq!(opts.excludes.len(), 1);
        assert_eq!(opts.progress_interval, 25);
    }

    #[test]
    fn zero_buffer_falls_back() {
        assert_eq!(DecompressOptions::new().buffer_size(0).effective_buffer_size(), 8192);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("opts.json");
        std::fs::write(&path, r#"{"threads": 4, "excludes": ["node_modules"], "verbosity": "debug"}"#).unwrap();
        let opts = CompressOptions::from_json_file(&path).unwrap();
        assert_eq!(opts.threads, 4);
        assert_eq!(opts.buffer_size, 8192);
        assert!(opts.excludes.contains(std::ffi::OsStr::new("node_modules")));
        assert_eq!(opts.verbosity, Verbosity::Debug);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{threads:").unwrap();
        let err = DecompressOptions::from_json_file(&path).unwrap_err();
        assert!(matches!(err, crate::error::ArchiverError::Config(_)));
    }
}
