#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Builds a deterministic pseudo-random tree under `root`: nested
/// directories, an empty directory, empty files and a few large files.
pub fn random_tree(root: &Path, seed: u64, files: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    fs::create_dir_all(root.join("empty_dir")).unwrap();
    let dirs = ["", "alpha", "alpha/deep", "beta", "beta/x/y/z", "gamma"];
    for d in dirs {
        fs::create_dir_all(root.join(d)).unwrap();
    }
    for i in 0..files {
        let dir = dirs[rng.gen_range(0..dirs.len())];
        let size = match rng.gen_range(0..10) {
            0 => 0,
            1 => rng.gen_range(100_000..400_000),
            _ => rng.gen_range(1..5_000),
        };
        let mut body = vec![0u8; size];
        // half random, half repetitive so LZ4 has something to do
        rng.fill(&mut body[..size / 2]);
        fs::write(root.join(dir).join(format!("file_{i:03}.bin")), body).unwrap();
    }
}

/// Files of the concrete three-file scenario: 3, 9000 and 1 bytes.
pub fn scenario_tree(root: &Path) {
    fs::create_dir_all(root.join("a")).unwrap();
    fs::create_dir_all(root.join("b")).unwrap();
    fs::write(root.join("a/1.txt"), b"one").unwrap();
    fs::write(root.join("a/2.txt"), vec![b'2'; 9000]).unwrap();
    fs::write(root.join("b/3.txt"), b"3").unwrap();
}

/// Relative path -> contents (`None` for directories), sorted.
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Option<Vec<u8>>)> {
    WalkDir::new(root)
        .sort_by_file_name()
        .min_depth(1)
        .into_iter()
        .map(|e| {
            let e = e.unwrap();
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            let body = if e.file_type().is_file() { Some(fs::read(e.path()).unwrap()) } else { None };
            (rel, body)
        })
        .collect()
}

/// Panics with the first difference between two trees.
pub fn assert_dirs_equal(expected: &Path, actual: &Path) {
    let a = snapshot(expected);
    let b = snapshot(actual);
    let a_paths: Vec<_> = a.iter().map(|(p, _)| p.clone()).collect();
    let b_paths: Vec<_> = b.iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(a_paths, b_paths, "tree shape differs");
    for ((path, x), (_, y)) in a.iter().zip(b.iter()) {
        assert!(x == y, "contents differ at {}", path.display());
    }
}

/// Names of the entries directly inside `dir`, sorted.
pub fn dir_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
