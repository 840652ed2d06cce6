//! Incremental tailing of a single log file.
//!
//! Each change event re-reads at most the last `backscan_lines` lines written
//! since the previous read. When more lines than that land between two
//! events, the older ones are skipped: work per event stays bounded no matter
//! how fast the file grows.
//!
//! A line is classified only once its terminating newline is on disk. The
//! cursor never moves past a partially written line, so a line flushed in two
//! writes is matched whole on the event that completes it.
//!
//! Uses synchronous `std::fs` reads since these are quick local operations.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{AlertSink, WatchError};

/// Lines longer than this many bytes are skipped without being buffered.
pub const MAX_LINE_LEN: usize = 1_048_576;

/// Sliding window over the start offsets of the most recent lines.
#[derive(Debug, Clone)]
pub struct BackscanWindow {
    capacity: usize,
    offsets: VecDeque<u64>,
}

impl BackscanWindow {
    /// Create an empty window holding at most `capacity` offsets.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            offsets: VecDeque::with_capacity(capacity),
        }
    }

    /// Record the start offset of a line, evicting the oldest when full.
    pub fn push(&mut self, offset: u64) {
        if self.capacity == 0 {
            return;
        }
        if self.offsets.len() == self.capacity {
            self.offsets.pop_front();
        }
        self.offsets.push_back(offset);
    }

    /// The oldest retained line start, i.e. the safe re-read point.
    pub fn oldest(&self) -> Option<u64> {
        self.offsets.front().copied()
    }

    /// Number of retained offsets.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether no offsets are retained.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Drop every retained offset.
    pub fn clear(&mut self) {
        self.offsets.clear();
    }
}

/// Outcome of one processed change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailReport {
    /// Offset the read started from.
    pub start_offset: u64,
    /// End of the last complete line read; the new cursor.
    pub end_offset: u64,
    /// Number of alert lines emitted.
    pub matched: usize,
}

/// Read cursor and keyword filter for one watched file.
#[derive(Debug)]
pub struct Tailer {
    path: PathBuf,
    last_read_offset: u64,
    /// File length last seen with an unterminated tail after the cursor.
    pending_end: Option<u64>,
    window: BackscanWindow,
    keywords: Vec<String>,
}

impl Tailer {
    /// Create a tailer starting at the beginning of `path`.
    ///
    /// Keywords are matched case-insensitively.
    pub fn new(path: PathBuf, backscan_lines: usize, keywords: &[String]) -> Self {
        Self {
            path,
            last_read_offset: 0,
            pending_end: None,
            window: BackscanWindow::new(backscan_lines),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// The watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset up to which the file has been consumed.
    pub fn last_read_offset(&self) -> u64 {
        self.last_read_offset
    }

    /// Whether `line` contains any of the configured keywords.
    pub fn is_alert(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    /// Process one change notification for the watched file.
    ///
    /// Emits `<path>: <line>` to `alerts` for every new complete line that
    /// matches a keyword, then advances the cursor to the end of the last
    /// complete line. If nothing was appended since the previous event,
    /// nothing is read and nothing is emitted. If the file shrank below the
    /// cursor (truncation or rotation), reading restarts at the beginning.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::FileReadFailed`] if the file cannot be opened or
    /// read. The cursor is left unchanged in that case.
    pub fn on_change(&mut self, alerts: &dyn AlertSink) -> Result<TailReport, WatchError> {
        let file = File::open(&self.path).map_err(|e| self.read_failed(e))?;
        let len = file.metadata().map_err(|e| self.read_failed(e))?.len();

        let mut cursor = self.last_read_offset;
        if len < cursor {
            debug!(
                path = %self.path.display(),
                len,
                cursor,
                "file shrank, rereading from start"
            );
            cursor = 0;
            self.pending_end = None;
        }
        if len == cursor || self.pending_end == Some(len) {
            self.last_read_offset = cursor;
            return Ok(TailReport {
                start_offset: cursor,
                end_offset: cursor,
                matched: 0,
            });
        }

        let mut reader = BufReader::new(file);
        let scan = self
            .rebuild_window(&mut reader, cursor)
            .map_err(|e| self.read_failed(e))?;
        let start = self.window.oldest().unwrap_or(scan.complete_end);

        let matched = self
            .classify(&mut reader, start, scan.complete_end, alerts)
            .map_err(|e| self.read_failed(e))?;

        self.last_read_offset = scan.complete_end;
        self.pending_end = (scan.eof > scan.complete_end).then_some(scan.eof);
        debug!(
            path = %self.path.display(),
            start,
            end = scan.complete_end,
            pending = scan.eof - scan.complete_end,
            matched,
            "processed change event"
        );
        Ok(TailReport {
            start_offset: start,
            end_offset: scan.complete_end,
            matched,
        })
    }

    /// Scan line boundaries from `from` to end of file, keeping the starts of
    /// the most recent complete lines in the window.
    fn rebuild_window<R: BufRead + Seek>(
        &mut self,
        reader: &mut R,
        from: u64,
    ) -> std::io::Result<Scan> {
        self.window.clear();
        reader.seek(SeekFrom::Start(from))?;

        let mut pos = from;
        let mut complete_end = from;
        let mut buf = Vec::new();
        loop {
            match read_segment(reader, &mut buf)? {
                Segment::Eof => break,
                Segment::Line(n) => {
                    self.window.push(pos);
                    pos = pos.saturating_add(n);
                    complete_end = pos;
                }
                Segment::Oversized(n) => {
                    warn!(
                        path = %self.path.display(),
                        offset = pos,
                        bytes = n,
                        "skipping oversized line"
                    );
                    pos = pos.saturating_add(n);
                    complete_end = pos;
                }
                Segment::Partial(n) => {
                    pos = pos.saturating_add(n);
                    break;
                }
            }
        }
        Ok(Scan {
            complete_end,
            eof: pos,
        })
    }

    /// Match every complete line in `start..end` and emit the alerts.
    fn classify<R: BufRead + Seek>(
        &self,
        reader: &mut R,
        start: u64,
        end: u64,
        alerts: &dyn AlertSink,
    ) -> std::io::Result<usize> {
        reader.seek(SeekFrom::Start(start))?;

        let mut pos = start;
        let mut matched = 0;
        let mut buf = Vec::new();
        while pos < end {
            match read_segment(reader, &mut buf)? {
                Segment::Line(n) => {
                    pos = pos.saturating_add(n);
                    let text = String::from_utf8_lossy(&buf);
                    let line = text.strip_suffix('\n').unwrap_or(&*text);
                    let line = line.strip_suffix('\r').unwrap_or(line);
                    if self.is_alert(line) {
                        alerts.emit(&format!("{}: {}", self.path.display(), line));
                        matched += 1;
                    }
                }
                Segment::Oversized(n) => pos = pos.saturating_add(n),
                Segment::Partial(_) | Segment::Eof => break,
            }
        }
        Ok(matched)
    }

    fn read_failed(&self, source: std::io::Error) -> WatchError {
        WatchError::FileReadFailed {
            path: self.path.clone(),
            source,
        }
    }
}

/// Offsets found by one boundary scan.
struct Scan {
    /// End of the last newline-terminated line.
    complete_end: u64,
    /// End of file, including any unterminated tail.
    eof: u64,
}

/// One unit read from the current position.
enum Segment {
    /// A newline-terminated line of this many bytes, held in the buffer.
    Line(u64),
    /// A newline-terminated line longer than [`MAX_LINE_LEN`], not buffered.
    Oversized(u64),
    /// Bytes before end of file with no newline yet.
    Partial(u64),
    /// Nothing left to read.
    Eof,
}

/// Read the next line into `buf`, never buffering more than
/// [`MAX_LINE_LEN`] + 1 bytes.
fn read_segment<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Segment> {
    let limit = MAX_LINE_LEN as u64 + 1;

    buf.clear();
    let n = reader.by_ref().take(limit).read_until(b'\n', buf)?;
    if n == 0 {
        return Ok(Segment::Eof);
    }
    if buf.last() == Some(&b'\n') {
        return Ok(Segment::Line(n as u64));
    }
    if n <= MAX_LINE_LEN {
        return Ok(Segment::Partial(n as u64));
    }

    let mut consumed = n as u64;
    loop {
        buf.clear();
        let m = reader.by_ref().take(limit).read_until(b'\n', buf)?;
        if m == 0 {
            return Ok(Segment::Partial(consumed));
        }
        consumed = consumed.saturating_add(m as u64);
        if buf.last() == Some(&b'\n') {
            buf.clear();
            return Ok(Segment::Oversized(consumed));
        }
    }
}
