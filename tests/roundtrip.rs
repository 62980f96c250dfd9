mod common;

use std::fs;
use std::path::Path;

use tarlz4::{compress, decompress, list, CompressOptions, DecompressOptions, ListedEntry};
use tarlz4::common::EntryKind;
use tempfile::tempdir;

fn round_trip(threads: usize, buffer_size: usize) {
    let work = tempdir().unwrap();
    let src = work.path().join("tree");
    common::random_tree(&src, 42 + threads as u64, 40);
    let out = work.path().join("out");
    let restore = work.path().join("restore");
    fs::create_dir_all(&out).unwrap();
    fs::create_dir_all(&restore).unwrap();

    let opts = CompressOptions::new().threads(threads).buffer_size(buffer_size);
    let container = compress(&src, &out, "snapshot", &opts).unwrap();
    assert_eq!(container, out.join("snapshot.tar.lz4"));
    assert_eq!(common::dir_listing(&out), vec!["snapshot.tar.lz4"]);

    let root = decompress(&container, &restore, &DecompressOptions::new().buffer_size(buffer_size)).unwrap();
    assert_eq!(root, restore.join("snapshot"));
    common::assert_dirs_equal(&src, &root.join("tree"));
}

#[test]
fn round_trip_single_thread() {
    round_trip(1, 4096);
    round_trip(1, 8192);
}

#[test]
fn round_trip_two_threads() {
    round_trip(2, 4096);
    round_trip(2, 8192);
}

#[test]
fn round_trip_six_threads() {
    round_trip(6, 4096);
    round_trip(6, 8192);
}

#[test]
fn more_threads_than_files() {
    let work = tempdir().unwrap();
    let src = work.path().join("tiny");
    fs::create_dir_all(src.join("only")).unwrap();
    fs::write(src.join("only/one.txt"), b"single").unwrap();
    fs::write(src.join("two.txt"), b"double").unwrap();

    let container = compress(&src, work.path(), "tiny", &CompressOptions::new().threads(8)).unwrap();
    let root = decompress(&container, &work.path().join("r"), &DecompressOptions::default()).unwrap();
    common::assert_dirs_equal(&src, &root.join("tiny"));
}

#[test]
fn empty_source_directory() {
    let work = tempdir().unwrap();
    let src = work.path().join("void");
    fs::create_dir_all(&src).unwrap();
    let out = work.path().join("out");
    fs::create_dir_all(&out).unwrap();

    let container = compress(&src, &out, "void", &CompressOptions::new().threads(4)).unwrap();
    let root = decompress(&container, &out, &DecompressOptions::default()).unwrap();
    assert!(root.join("void").is_dir());
    assert!(common::snapshot(&root.join("void")).is_empty());
}

#[test]
fn concrete_scenario_lists_every_file_once() {
    let work = tempdir().unwrap();
    let src = work.path().join("data");
    common::scenario_tree(&src);

    let container = compress(&src, work.path(), "data", &CompressOptions::new().threads(3)).unwrap();
    let files: Vec<ListedEntry> = list(&container)
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == EntryKind::File)
        .collect();
    let names: Vec<(String, u64)> = files
        .iter()
        .map(|e| (e.path.to_string_lossy().replace('\\', "/"), e.size))
        .collect();
    assert_eq!(
        names,
        vec![
            ("data/a/1.txt".to_string(), 3),
            ("data/a/2.txt".to_string(), 9000),
            ("data/b/3.txt".to_string(), 1),
        ]
    );
}

#[test]
fn repeated_runs_with_different_names_are_independent() {
    let work = tempdir().unwrap();
    let src = work.path().join("tree");
    common::random_tree(&src, 7, 25);
    let out = work.path().join("out");
    fs::create_dir_all(&out).unwrap();

    let opts = CompressOptions::new().threads(4);
    let first = compress(&src, &out, "first", &opts).unwrap();
    let second = compress(&src, &out, "second", &opts).unwrap();
    assert_eq!(common::dir_listing(&out), vec!["first.tar.lz4", "second.tar.lz4"]);

    for (container, base) in [(&first, "first"), (&second, "second")] {
        let root = decompress(container, &work.path().join("restore"), &DecompressOptions::default()).unwrap();
        assert_eq!(root, work.path().join("restore").join(base));
        common::assert_dirs_equal(&src, &root.join("tree"));
    }
}

#[test]
fn sliced_container_decodes_like_single_threaded_one() {
    let work = tempdir().unwrap();
    let src = work.path().join("tree");
    common::random_tree(&src, 99, 30);

    let single = compress(&src, work.path(), "single", &CompressOptions::new().threads(1)).unwrap();
    let sliced = compress(&src, work.path(), "sliced", &CompressOptions::new().threads(5)).unwrap();

    let files = |p: &Path| -> Vec<ListedEntry> {
        list(p).unwrap().into_iter().filter(|e| e.kind == EntryKind::File).collect()
    };
    assert_eq!(files(&single), files(&sliced));
}

#[cfg(unix)]
#[test]
fn symlinked_files_are_archived_as_their_content() {
    use std::os::unix::fs::symlink;

    let work = tempdir().unwrap();
    let src = work.path().join("src");
    fs::create_dir_all(src.join("sub")).unwrap();
    fs::write(src.join("real.txt"), b"linked content").unwrap();
    fs::write(src.join("sub/inner.txt"), vec![b'i'; 5000]).unwrap();
    symlink("real.txt", src.join("link.txt")).unwrap();
    symlink("sub", src.join("sublink")).unwrap();

    let container = compress(&src, work.path(), "links", &CompressOptions::new().threads(2)).unwrap();
    let root = decompress(&container, &work.path().join("r"), &DecompressOptions::default()).unwrap();

    let restored = root.join("src");
    let link = restored.join("link.txt");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_file());
    assert_eq!(fs::read(&link).unwrap(), b"linked content");
    assert_eq!(fs::read(restored.join("real.txt")).unwrap(), b"linked content");
    assert!(!restored.join("sublink").exists());
    assert_eq!(fs::read(restored.join("sub/inner.txt")).unwrap().len(), 5000);
}
