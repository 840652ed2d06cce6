//! Tests for latest-file selection.

use std::path::{Path, PathBuf};

use filetime::FileTime;
use tailpack::watch::{select_latest, WatchError};

const BASE_MTIME: i64 = 1_700_000_000;

fn touch(path: &Path, offset_secs: i64) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(path, "line\n").expect("write file");
    filetime::set_file_mtime(path, FileTime::from_unix_time(BASE_MTIME + offset_secs, 0))
        .expect("set mtime");
}

#[test]
fn keeps_ten_most_recent_in_ascending_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut expected = Vec::new();

    // Written out of mtime order and spread over nested directories.
    for i in [7_i64, 0, 11, 3, 9, 1, 5, 10, 2, 8, 4, 6] {
        let path = if i % 2 == 0 {
            dir.path().join(format!("app_{i:02}.log"))
        } else {
            dir.path().join("nested").join(format!("svc_{i:02}.log"))
        };
        touch(&path, i * 10);
        if i >= 2 {
            expected.push((i, path));
        }
    }
    expected.sort_by_key(|(i, _)| *i);
    let expected: Vec<PathBuf> = expected.into_iter().map(|(_, p)| p).collect();

    let selected = select_latest(dir.path(), 10).expect("select");

    assert_eq!(selected.len(), 10);
    let paths: Vec<PathBuf> = selected.iter().map(|f| f.path.clone()).collect();
    assert_eq!(paths, expected);
    assert!(selected.windows(2).all(|w| w[0].modified <= w[1].modified));
}

#[test]
fn returns_every_file_when_fewer_than_limit() {
    let dir = tempfile::tempdir().expect("tempdir");
    for i in 0..5_i64 {
        touch(&dir.path().join(format!("f{i}.log")), i);
    }

    let selected = select_latest(dir.path(), 10).expect("select");
    assert_eq!(selected.len(), 5);
}

#[test]
fn exactly_limit_files_are_all_returned() {
    let dir = tempfile::tempdir().expect("tempdir");
    for i in 0..10_i64 {
        touch(&dir.path().join(format!("f{i}.log")), i);
    }

    let selected = select_latest(dir.path(), 10).expect("select");
    assert_eq!(selected.len(), 10);
}

#[test]
fn directories_are_not_selected() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("empty_sub")).expect("mkdir");
    touch(&dir.path().join("only.log"), 0);

    let selected = select_latest(dir.path(), 10).expect("select");
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].path, dir.path().join("only.log"));
}

#[test]
fn empty_directory_selects_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");

    let selected = select_latest(dir.path(), 10).expect("select");
    assert!(selected.is_empty());
}

#[test]
fn missing_directory_is_unreadable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("logs");

    let result = select_latest(&missing, 10);
    assert!(matches!(result, Err(WatchError::DirectoryUnreadable { .. })));
}
