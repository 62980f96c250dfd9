//! Canonical traversal shared by partition planning and slice archiving.
//!
//! Both passes must agree on which global [`FileIndex`] every file occupies, so
//! there is exactly one way to walk a tree: depth-first, every directory
//! listing sorted by file name, excluded names pruned (with their subtrees)
//! before any index is handed out. Indices are assigned by the iterator itself,
//! so callers never thread a counter through their own control flow.
//!
//! Only regular files and directories are yielded. A symlink to a regular
//! file is followed and yields the target's content under the link's name.
//! Directory symlinks, dangling links and special files are skipped
//! identically in every pass.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::common::{EntryKind, FileIndex, TreeEntry};
use crate::error::{ArchiverError, Result};

/// Base names opted out of archiving entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionSet {
    names: BTreeSet<String>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if `name` (a single path component) is excluded. Names that are
    /// not valid UTF-8 never match.
    pub fn contains(&self, name: &OsStr) -> bool {
        name.to_str().is_some_and(|n| self.names.contains(n))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self { names: iter.into_iter().map(Into::into).collect() }
    }
}

/// One step of the walk: the entry plus its file index (files only).
#[derive(Debug, Clone)]
pub struct WalkItem {
    pub index: Option<FileIndex>,
    pub entry: TreeEntry,
}

/// A reusable description of the traversal. Every call to [`iter`](Self::iter)
/// regenerates the same sequence for an unchanged tree.
#[derive(Debug, Clone)]
pub struct CanonicalWalk {
    root: PathBuf,
    root_name: PathBuf,
    excludes: ExclusionSet,
}

impl CanonicalWalk {
    /// `root_name` becomes the first component of every archive path.
    pub fn new(root: impl Into<PathBuf>, root_name: impl Into<PathBuf>, excludes: ExclusionSet) -> Self {
        Self {
            root: root.into(),
            root_name: root_name.into(),
            excludes,
        }
    }

    /// Walk rooted at `root`, naming archive entries after the root's own
    /// file name.
    pub fn rooted_at(root: &Path, excludes: ExclusionSet) -> Self {
        Self::new(root, root_name_of(root), excludes)
    }

    pub fn iter(&self) -> Walk<'_> {
        self.walk(false)
    }

    /// Like [`iter`](Self::iter), but skipped entries are logged at WARN.
    /// Meant for the one pass that should tell the user about them.
    pub fn iter_reporting(&self) -> Walk<'_> {
        self.walk(true)
    }

    fn walk(&self, report_skips: bool) -> Walk<'_> {
        let excludes = &self.excludes;
        let inner = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| e.depth() == 0 || !excludes.contains(e.file_name()));
        Walk {
            walk: self,
            inner: Box::new(inner),
            next_index: 0,
            report_skips,
        }
    }
}

/// Iterator returned by [`CanonicalWalk::iter`].
pub struct Walk<'a> {
    walk: &'a CanonicalWalk,
    inner: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + 'a>,
    next_index: FileIndex,
    report_skips: bool,
}

impl Walk<'_> {
    fn skip(&self, path: &Path, reason: &str) {
        if self.report_skips {
            tracing::warn!(path = %path.display(), "skipping {reason}");
        } else {
            tracing::debug!(path = %path.display(), "skipping {reason}");
        }
    }

    fn classify(&mut self, dent: DirEntry) -> Result<Option<WalkItem>> {
        let ft = dent.file_type();
        let (kind, linked_size) = if ft.is_dir() {
            (EntryKind::Directory, None)
        } else if ft.is_file() {
            (EntryKind::File, None)
        } else if ft.is_symlink() {
            match crate::fsx::metadata(dent.path()) {
                Ok(target) if target.is_file() => (EntryKind::File, Some(target.len())),
                Ok(target) if target.is_dir() => {
                    Walk::skip(self, dent.path(), "symlink to a directory");
                    return Ok(None);
                }
                Ok(_) => {
                    Walk::skip(self, dent.path(), "symlink to a non-regular file");
                    return Ok(None);
                }
                Err(_) => {
                    Walk::skip(self, dent.path(), "dangling symlink");
                    return Ok(None);
                }
            }
        } else {
            Walk::skip(self, dent.path(), "non-regular entry");
            return Ok(None);
        };

        let rel = dent.path().strip_prefix(&self.walk.root).map_err(|_| {
            ArchiverError::StripPrefix {
                prefix: self.walk.root.clone(),
                path: dent.path().to_path_buf(),
            }
        })?;
        let archive_path = if rel.as_os_str().is_empty() {
            self.walk.root_name.clone()
        } else {
            self.walk.root_name.join(rel)
        };

        let (index, size) = match kind {
            EntryKind::Directory => (None, Some(0)),
            EntryKind::File => {
                let idx = self.next_index;
                self.next_index += 1;
                let size = linked_size.or_else(|| dent.metadata().ok().map(|m| m.len()));
                (Some(idx), size)
            }
        };

        Ok(Some(WalkItem {
            index,
            entry: TreeEntry {
                absolute_path: dent.into_path(),
                archive_path,
                kind,
                size,
            },
        }))
    }
}

impl Iterator for Walk<'_> {
    type Item = Result<WalkItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let dent = match self.inner.next()? {
                Ok(d) => d,
                Err(e) => return Some(Err(e.into())),
            };
            match self.classify(dent) {
                Ok(Some(item)) => return Some(Ok(item)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Name used for the top-level archive entry of `root`.
pub fn root_name_of(root: &Path) -> PathBuf {
    root.file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("root"))
}
