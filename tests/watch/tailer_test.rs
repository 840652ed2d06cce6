//! Tests for incremental tailing and the backscan window.

use std::io::Write;
use std::path::Path;

use tailpack::watch::{BackscanWindow, MemoryAlerts, Tailer, WatchError, MAX_LINE_LEN};

fn keywords() -> Vec<String> {
    vec!["error".to_owned(), "fail".to_owned(), "exception".to_owned()]
}

fn append(path: &Path, text: &str) {
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open for append");
    f.write_all(text.as_bytes()).expect("append");
}

#[test]
fn window_evicts_oldest_offset() {
    let mut window = BackscanWindow::new(3);
    assert!(window.is_empty());
    assert_eq!(window.oldest(), None);

    for offset in [0, 10, 20, 30, 40] {
        window.push(offset);
    }
    assert_eq!(window.len(), 3);
    assert_eq!(window.oldest(), Some(20));

    window.clear();
    assert!(window.is_empty());
}

#[test]
fn keywords_match_case_insensitively() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    append(
        &path,
        "all good\nERROR disk full\nrequest Fail for user\nnull EXCEPTION thrown\nstill fine\n",
    );

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path.clone(), 100, &keywords());
    let report = tailer.on_change(&alerts).expect("tail");

    assert_eq!(report.matched, 3);
    let shown = path.display().to_string();
    assert_eq!(
        alerts.lines(),
        vec![
            format!("{shown}: ERROR disk full"),
            format!("{shown}: request Fail for user"),
            format!("{shown}: null EXCEPTION thrown"),
        ]
    );
}

#[test]
fn second_event_without_growth_emits_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    append(&path, "error one\nerror two\n");

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path, 100, &keywords());

    let first = tailer.on_change(&alerts).expect("first");
    assert_eq!(first.matched, 2);

    let second = tailer.on_change(&alerts).expect("second");
    assert_eq!(second.matched, 0);
    assert_eq!(second.end_offset, first.end_offset);
    assert_eq!(alerts.lines().len(), 2);
}

#[test]
fn only_new_lines_are_emitted_after_growth() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    append(&path, "error old\n");

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path.clone(), 100, &keywords());
    tailer.on_change(&alerts).expect("first");

    append(&path, "info fine\nerror new\n");
    let report = tailer.on_change(&alerts).expect("second");

    assert_eq!(report.matched, 1);
    let lines = alerts.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], format!("{}: error new", path.display()));
    assert_eq!(
        tailer.last_read_offset(),
        std::fs::metadata(&path).expect("meta").len()
    );
}

#[test]
fn keyword_split_across_writes_is_matched_once_complete() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path.clone(), 100, &keywords());

    append(&path, "2024-01-01 db ERR");
    let partial = tailer.on_change(&alerts).expect("partial");
    assert_eq!(partial.matched, 0);
    assert_eq!(tailer.last_read_offset(), 0);

    append(&path, "OR connection refused\n");
    let complete = tailer.on_change(&alerts).expect("complete");

    assert_eq!(complete.matched, 1);
    assert_eq!(
        alerts.lines(),
        vec![format!("{}: 2024-01-01 db ERROR connection refused", path.display())]
    );
    assert_eq!(tailer.last_read_offset(), std::fs::metadata(&path).expect("meta").len());
}

#[test]
fn split_line_is_reported_whole() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    append(&path, "boot ok\n");

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path.clone(), 100, &keywords());
    tailer.on_change(&alerts).expect("boot");

    append(&path, "req=42 ");
    tailer.on_change(&alerts).expect("first half");
    append(&path, "error: timeout\n");
    tailer.on_change(&alerts).expect("second half");

    assert_eq!(
        alerts.lines(),
        vec![format!("{}: req=42 error: timeout", path.display())]
    );
}

#[test]
fn unterminated_tail_without_growth_is_not_rescanned() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    append(&path, "error done\nerror pend");

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path.clone(), 100, &keywords());

    let first = tailer.on_change(&alerts).expect("first");
    assert_eq!(first.matched, 1);
    assert_eq!(first.end_offset, 11);

    let second = tailer.on_change(&alerts).expect("second");
    assert_eq!(second.matched, 0);
    assert_eq!(second.start_offset, 11);
    assert_eq!(second.end_offset, 11);
    assert_eq!(alerts.lines().len(), 1);
}

#[test]
fn oversized_line_is_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("huge.log");
    let mut huge = "error ".repeat(MAX_LINE_LEN / 6 + 10);
    huge.push('\n');
    append(&path, &huge);
    append(&path, "error after huge line\n");

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path.clone(), 100, &keywords());
    let report = tailer.on_change(&alerts).expect("tail");

    assert_eq!(report.matched, 1);
    assert_eq!(
        alerts.lines(),
        vec![format!("{}: error after huge line", path.display())]
    );
    assert_eq!(report.end_offset, std::fs::metadata(&path).expect("meta").len());
}

#[test]
fn first_read_is_bounded_to_window() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("big.log");
    // Each line is exactly 16 bytes.
    let body: String = (0..500).map(|i| format!("error line {i:04}\n")).collect();
    append(&path, &body);

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path.clone(), 100, &keywords());
    let report = tailer.on_change(&alerts).expect("tail");

    assert_eq!(report.start_offset, 400 * 16);
    assert_eq!(report.end_offset, 500 * 16);
    assert_eq!(report.matched, 100);
    let lines = alerts.lines();
    assert_eq!(lines[0], format!("{}: error line 0400", path.display()));
    assert_eq!(lines[99], format!("{}: error line 0499", path.display()));
}

#[test]
fn whitespace_growth_rescans_at_most_window() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("big.log");
    let body: String = (0..500).map(|i| format!("error line {i:04}\n")).collect();
    append(&path, &body);

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path.clone(), 100, &keywords());
    let first = tailer.on_change(&alerts).expect("first");

    // 150 whitespace-only lines of 4 bytes each.
    append(&path, &"   \n".repeat(150));
    let second = tailer.on_change(&alerts).expect("second");

    assert!(second.start_offset >= first.end_offset);
    assert_eq!(second.end_offset, first.end_offset + 150 * 4);
    assert_eq!(second.end_offset - second.start_offset, 100 * 4);
    assert_eq!(second.matched, 0);
    assert_eq!(alerts.lines().len(), 100);
}

#[test]
fn burst_larger_than_window_keeps_latest_lines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("burst.log");
    append(&path, "boot\n");

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path.clone(), 10, &keywords());
    tailer.on_change(&alerts).expect("first");

    let burst: String = (0..25).map(|i| format!("error burst {i:02}\n")).collect();
    append(&path, &burst);
    let report = tailer.on_change(&alerts).expect("burst");

    assert_eq!(report.matched, 10);
    let lines = alerts.lines();
    assert_eq!(lines[0], format!("{}: error burst 15", path.display()));
    assert_eq!(lines[9], format!("{}: error burst 24", path.display()));
}

#[test]
fn truncated_file_is_reread_from_start() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("rotating.log");
    append(&path, "a fairly long line that is not interesting at all\nmore filler\n");

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path.clone(), 100, &keywords());
    tailer.on_change(&alerts).expect("first");
    assert!(alerts.lines().is_empty());

    std::fs::write(&path, "fail fast\n").expect("truncate");
    let report = tailer.on_change(&alerts).expect("after truncate");

    assert_eq!(report.start_offset, 0);
    assert_eq!(report.matched, 1);
    assert_eq!(tailer.last_read_offset(), 10);
}

#[test]
fn crlf_line_endings_are_trimmed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("win.log");
    append(&path, "Exception in thread main\r\nok\r\n");

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path.clone(), 100, &keywords());
    tailer.on_change(&alerts).expect("tail");

    assert_eq!(
        alerts.lines(),
        vec![format!("{}: Exception in thread main", path.display())]
    );
}

#[test]
fn missing_file_is_a_read_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gone.log");

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path, 100, &keywords());
    let result = tailer.on_change(&alerts);

    assert!(matches!(result, Err(WatchError::FileReadFailed { .. })));
    assert_eq!(tailer.last_read_offset(), 0);
    assert!(alerts.lines().is_empty());
}

#[test]
fn read_failure_does_not_end_tailing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("late.log");

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path.clone(), 100, &keywords());
    assert!(tailer.on_change(&alerts).is_err());

    append(&path, "error after recovery\n");
    let report = tailer.on_change(&alerts).expect("recovered");
    assert_eq!(report.matched, 1);
}

#[test]
fn custom_keywords_replace_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    append(&path, "error ignored\nPANIC here\n");

    let alerts = MemoryAlerts::default();
    let mut tailer = Tailer::new(path, 100, &["panic".to_owned()]);
    let report = tailer.on_change(&alerts).expect("tail");

    assert_eq!(report.matched, 1);
    assert!(tailer.is_alert("kernel Panic"));
    assert!(!tailer.is_alert("error"));
}
