/// Line-level reading and parsing for the event log and the monitor counts log.
///
/// NOTE:
///
/// - Both logs are appended to by other processes while we read them, and appending is not atomic
///   wrt reading, so we will from time to time see a partly-written line.  A line that does not
///   parse is therefore never fatal: it is recorded as `Skipped`, logged, and the scan moves on.
///
/// - Only failing to open or read the file ends a scan early.  The caller gets the error back
///   *after* every line that could be read has been handed to the line handler, and decides what
///   to do with the partial state.
///
/// - A line with bytes that are not UTF8 is skipped like any other corrupted line.
use crate::{CountsEntry, EventEntry};

use anyhow::Result;
use rustutils::parse_timestamp;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use ustr::Ustr;

/// Number of whitespace-separated fields in an event record: `timestamp course student notebook
/// action port`.

pub const EVENT_FIELDS: usize = 6;

/// Why a line was skipped.

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LineError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("bad timestamp '{0}'")]
    Timestamp(String),

    #[error("bad integer value '{0}'")]
    Integer(String),

    #[error("counts line has too many fields - {found} > {max}")]
    TooManyCounts { found: usize, max: usize },

    #[error("timestamp '{0}' belongs to a day that has already been closed")]
    OutOfOrder(String),

    #[error("line is not valid UTF8")]
    Encoding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub lineno: usize,
    pub error: LineError,
}

/// Accumulates the skipped lines of one scan, logging each as it is recorded.

pub struct Diagnostics {
    source: String,
    skipped: Vec<Skipped>,
}

impl Diagnostics {
    pub fn new(source: &Path) -> Diagnostics {
        Diagnostics {
            source: source.display().to_string(),
            skipped: vec![],
        }
    }

    pub fn record(&mut self, lineno: usize, error: LineError) {
        match error {
            LineError::TooManyCounts { .. } => {
                log::error!("{}:{}: {} - line dropped", self.source, lineno, error)
            }
            _ => log::warn!("{}:{}: skipped misformed line - {}", self.source, lineno, error),
        }
        self.skipped.push(Skipped { lineno, error });
    }

    pub fn into_skipped(self) -> Vec<Skipped> {
        self.skipped
    }
}

/// Run `handle_line` on every line of the file, in order, recording each line it rejects.  Line
/// numbers are 1-based.  The line passed to the handler includes any trailing newline.

pub fn fold_lines<F>(path: &Path, diagnostics: &mut Diagnostics, handle_line: F) -> Result<()>
where
    F: FnMut(&str) -> std::result::Result<(), LineError>,
{
    let file = File::open(path)?;
    fold_reader(BufReader::new(file), diagnostics, handle_line)
}

/// As `fold_lines`, over an already open reader.  A read error ends the fold, but every line read
/// before it has been handled.

pub fn fold_reader<R, F>(
    mut reader: R,
    diagnostics: &mut Diagnostics,
    mut handle_line: F,
) -> Result<()>
where
    R: BufRead,
    F: FnMut(&str) -> std::result::Result<(), LineError>,
{
    let mut buf = Vec::new();
    let mut lineno = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        lineno += 1;
        let outcome = match std::str::from_utf8(&buf) {
            Ok(line) => handle_line(line),
            Err(_) => Err(LineError::Encoding),
        };
        if let Err(e) = outcome {
            diagnostics.record(lineno, e);
        }
    }
    Ok(())
}

/// Parse one event record.  The line must split into exactly EVENT_FIELDS fields.

pub fn parse_event_line(line: &str) -> std::result::Result<EventEntry, LineError> {
    let mut fields = [""; EVENT_FIELDS];
    let mut found = 0;
    for f in line.split_whitespace() {
        if found < EVENT_FIELDS {
            fields[found] = f;
        }
        found += 1;
    }
    if found != EVENT_FIELDS {
        return Err(LineError::FieldCount {
            expected: EVENT_FIELDS,
            found,
        });
    }
    let timestamp =
        parse_timestamp(fields[0]).map_err(|_| LineError::Timestamp(fields[0].to_string()))?;
    Ok(EventEntry {
        timestamp,
        course: Ustr::from(fields[1]),
        student: Ustr::from(fields[2]),
        notebook: Ustr::from(fields[3]),
        action: Ustr::from(fields[4]),
        port: Ustr::from(fields[5]),
    })
}

/// Parse one counts record, `timestamp v1 ... vk`, with `k <= max_counts`.  The field count is
/// checked before anything else so that a line from a newer schema is always reported as such.

pub fn parse_counts_line(
    line: &str,
    max_counts: usize,
) -> std::result::Result<CountsEntry, LineError> {
    let mut fields = line.split_whitespace();
    let ts = match fields.next() {
        Some(ts) => ts,
        None => {
            return Err(LineError::FieldCount {
                expected: 1,
                found: 0,
            })
        }
    };
    let raw = fields.collect::<Vec<&str>>();
    if raw.len() > max_counts {
        return Err(LineError::TooManyCounts {
            found: raw.len(),
            max: max_counts,
        });
    }
    let timestamp = parse_timestamp(ts).map_err(|_| LineError::Timestamp(ts.to_string()))?;
    let values = raw
        .iter()
        .map(|v| v.parse::<i64>().map_err(|_| LineError::Integer(v.to_string())))
        .collect::<std::result::Result<Vec<i64>, LineError>>()?;
    Ok(CountsEntry { timestamp, values })
}

#[cfg(test)]
use rustutils::format_log_time;

// Yields its text and then fails every read, like a file on a device that went away.

#[cfg(test)]
pub(crate) struct BrokenTail(pub std::io::Cursor<Vec<u8>>);

#[cfg(test)]
impl std::io::Read for BrokenTail {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match std::io::Read::read(&mut self.0, buf)? {
            0 => Err(std::io::Error::new(std::io::ErrorKind::Other, "device went away")),
            n => Ok(n),
        }
    }
}

#[cfg(test)]
pub(crate) fn broken_tail(text: &str) -> BufReader<BrokenTail> {
    BufReader::new(BrokenTail(std::io::Cursor::new(text.as_bytes().to_vec())))
}

#[test]
fn test_parse_event_line() {
    let e = parse_event_line(
        "2024-03-01T09:00:00 python aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa w1/nb1 running 8001\n",
    )
    .unwrap();
    assert!(format_log_time(e.timestamp) == "2024-03-01T09:00:00");
    assert!(e.course.as_str() == "python");
    assert!(e.student.as_str() == "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    assert!(e.notebook.as_str() == "w1/nb1");
    assert!(e.port.as_str() == "8001");
    assert!(!e.is_kill());

    let k = parse_event_line("2024-03-01T09:05:00 python student - killing -").unwrap();
    assert!(k.is_kill());
    assert!(k.notebook.as_str() == "-");
}

#[test]
fn test_parse_event_line_errors() {
    assert_eq!(
        parse_event_line("this line is garbage"),
        Err(LineError::FieldCount {
            expected: 6,
            found: 4
        })
    );
    assert_eq!(
        parse_event_line("2024-03-01T09:00:00 python s w1/nb1 running 8001 extra"),
        Err(LineError::FieldCount {
            expected: 6,
            found: 7
        })
    );
    assert_eq!(
        parse_event_line(""),
        Err(LineError::FieldCount {
            expected: 6,
            found: 0
        })
    );
    assert_eq!(
        parse_event_line("2024-03-01T09:0 python s w1/nb1 running 8001"),
        Err(LineError::Timestamp("2024-03-01T09:0".to_string()))
    );
}

#[test]
fn test_parse_counts_line() {
    let c = parse_counts_line("2024-03-01T09:00:00 3 10 -5\n", 4).unwrap();
    assert!(c.values == vec![3, 10, -5]);

    let c = parse_counts_line("2024-03-01T09:00:00", 4).unwrap();
    assert!(c.values.is_empty());

    assert_eq!(
        parse_counts_line("2024-03-01T09:00:00 1 2 3 4 5", 4),
        Err(LineError::TooManyCounts { found: 5, max: 4 })
    );
    // Overflow wins over other problems on the line
    assert_eq!(
        parse_counts_line("garbage 1 2 x 4 5", 4),
        Err(LineError::TooManyCounts { found: 5, max: 4 })
    );
    assert_eq!(
        parse_counts_line("2024-03-01T09:00:00 1 x", 4),
        Err(LineError::Integer("x".to_string()))
    );
    assert_eq!(
        parse_counts_line("   \n", 4),
        Err(LineError::FieldCount {
            expected: 1,
            found: 0
        })
    );
}

#[test]
fn test_fold_lines_missing_file() {
    let path = Path::new("../../tests/nblog/no-such-file.raw");
    let mut diagnostics = Diagnostics::new(path);
    let mut n = 0;
    assert!(fold_lines(path, &mut diagnostics, |_| {
        n += 1;
        Ok(())
    })
    .is_err());
    assert!(n == 0);
    assert!(diagnostics.into_skipped().is_empty());
}

#[test]
fn test_fold_lines_records_rejections() {
    let path = Path::new("../../tests/nblog/events.raw");
    let mut diagnostics = Diagnostics::new(path);
    let mut kills = 0;
    fold_lines(path, &mut diagnostics, |line| {
        if parse_event_line(line)?.is_kill() {
            kills += 1;
        }
        Ok(())
    })
    .unwrap();
    assert!(kills == 1);
    let skipped = diagnostics.into_skipped();
    assert!(skipped.len() == 1);
    assert!(skipped[0].lineno == 5);
}

#[test]
fn test_fold_reader_read_failure() {
    let mut diagnostics = Diagnostics::new(Path::new("broken"));
    let mut seen = vec![];
    let outcome = fold_reader(
        broken_tail("first line\nsecond line\n"),
        &mut diagnostics,
        |line| {
            seen.push(line.trim_end().to_string());
            Ok(())
        },
    );
    assert!(outcome.is_err());
    assert!(seen == vec!["first line", "second line"]);
    assert!(diagnostics.into_skipped().is_empty());
}
