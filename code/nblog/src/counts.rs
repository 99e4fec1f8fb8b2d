/// Aggregate the monitor counts log into one column per counter.
///
/// The monitor appends a snapshot line `timestamp v1 ... vk` at regular intervals, where the values
/// are positional wrt KNOWN_COUNTS.  Lines written before a counter was added are simply shorter;
/// their missing trailing values come out as None.  A line with more values than we know names for
/// was written by a newer monitor and is dropped whole.
use crate::logfile::{fold_lines, parse_counts_line, Diagnostics, LineError, Skipped};

use rustutils::{format_log_time, Timestamp};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::path::Path;

/// The counter names, in log order.  This list is append-only: a name is never removed or moved,
/// so that old logs remain readable.

pub const KNOWN_COUNTS: [&str; 13] = [
    "running_container",
    "frozen_container",
    "running_kernel",
    "student_home",
    "load1",
    "load5",
    "load15",
    "docker_ds_percent",
    "docker_ds_free",
    "nbhosting_ds_percent",
    "nbhosting_ds_free",
    "system_ds_percent",
    "system_ds_free",
];

/// Prefix of the header lines, which list the monitor's own schema and are not otherwise looked at.

pub const COMMENT_MARKER: &str = "#";

/// `counts[i]` is the column for `names[i]`; every column has one entry per timestamp.

#[derive(Debug, Default)]
pub struct CountsReport {
    pub names: Vec<String>,
    pub timestamps: Vec<Timestamp>,
    pub counts: Vec<Vec<Option<i64>>>,
    pub skipped: Vec<Skipped>,
}

impl CountsReport {
    fn new(names: &[&str]) -> CountsReport {
        CountsReport {
            names: names.iter().map(|s| s.to_string()).collect(),
            timestamps: vec![],
            counts: vec![vec![]; names.len()],
            skipped: vec![],
        }
    }

    /// The column for a counter, if the name is known.

    pub fn series(&self, name: &str) -> Option<&[Option<i64>]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.counts[i].as_slice())
    }

    fn ingest(&mut self, line: &str) -> std::result::Result<(), LineError> {
        if line.starts_with(COMMENT_MARKER) {
            return Ok(());
        }
        let entry = parse_counts_line(line, self.names.len())?;
        self.timestamps.push(entry.timestamp);
        let mut values = entry.values.into_iter();
        for column in self.counts.iter_mut() {
            column.push(values.next());
        }
        Ok(())
    }
}

// The presentation keys are the plural counter names, `running_containers` and so on, followed by
// `timestamps`.

impl Serialize for CountsReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.names.len() + 1))?;
        for (name, column) in self.names.iter().zip(self.counts.iter()) {
            map.serialize_entry(&format!("{name}s"), column)?;
        }
        let times = self
            .timestamps
            .iter()
            .map(|t| format_log_time(*t))
            .collect::<Vec<String>>();
        map.serialize_entry("timestamps", &times)?;
        map.end()
    }
}

/// Read the counts log against KNOWN_COUNTS.  Never fails; see `daily_metrics` for how bad lines and
/// I/O problems are handled.

pub fn monitor_counts(counts_path: &Path) -> CountsReport {
    monitor_counts_with(counts_path, &KNOWN_COUNTS)
}

/// Read the counts log against an explicit schema.

pub fn monitor_counts_with(counts_path: &Path, names: &[&str]) -> CountsReport {
    let mut diagnostics = Diagnostics::new(counts_path);
    let mut report = CountsReport::new(names);
    if let Err(e) = fold_lines(counts_path, &mut diagnostics, |line| report.ingest(line)) {
        log::error!("{}: unexpected failure in monitor counts - {e}", counts_path.display());
    }
    report.skipped = diagnostics.into_skipped();
    report
}

#[test]
fn test_monitor_counts() {
    let r = monitor_counts(Path::new("../../tests/nblog/counts.raw"));
    let times = r
        .timestamps
        .iter()
        .map(|t| format_log_time(*t))
        .collect::<Vec<String>>();
    assert!(
        times
            == vec![
                "2024-03-01T09:00:00",
                "2024-03-01T09:15:00",
                "2024-03-01T10:00:00"
            ]
    );
    for c in &r.counts {
        assert!(c.len() == 3);
    }
    // Full-width rows have a value in every column
    assert!(r.counts.len() == KNOWN_COUNTS.len());
    assert!(r.counts.iter().all(|c| c[0].is_some() && c[2].is_some()));
    assert!(r.series("running_container") == Some(&[Some(3), Some(4), Some(5)][..]));
    assert!(r.series("load15") == Some(&[Some(3), Some(2), Some(2)][..]));
    assert!(r.series("docker_ds_free") == Some(&[Some(5000), Some(5000), Some(4900)][..]));

    // The 09:15 line has two values short of the full schema
    assert!(r.series("system_ds_free") == Some(&[Some(7000), None, Some(6900)][..]));
    assert!(r.series("system_ds_percent") == Some(&[Some(60), None, Some(61)][..]));
    assert!(r.series("nbhosting_ds_free") == Some(&[Some(6000), Some(6000), Some(5900)][..]));
    assert!(r.series("no_such_count").is_none());

    let linenos = r.skipped.iter().map(|s| s.lineno).collect::<Vec<usize>>();
    assert!(linenos == vec![4, 5, 6]);
    assert!(matches!(r.skipped[0].error, LineError::TooManyCounts { found: 14, max: 13 }));
    assert!(matches!(r.skipped[1].error, LineError::Integer(_)));
    assert!(matches!(r.skipped[2].error, LineError::Timestamp(_)));
}

#[test]
fn test_monitor_counts_old_schema() {
    let r = monitor_counts(Path::new("../../tests/nblog/counts-old.raw"));
    assert!(r.timestamps.len() == 2);
    assert!(r.skipped.is_empty());
    assert!(r.series("student_home") == Some(&[Some(4), Some(4)][..]));
    assert!(r.series("load15") == Some(&[None, Some(1)][..]));
    assert!(r.series("system_ds_free") == Some(&[None, None][..]));

    // Against the schema as it was, the newer line is too long
    let r = monitor_counts_with(
        Path::new("../../tests/nblog/counts-old.raw"),
        &KNOWN_COUNTS[..4],
    );
    assert!(r.timestamps.len() == 1);
    assert!(r.skipped.len() == 1 && r.skipped[0].lineno == 4);
}

#[test]
fn test_monitor_counts_missing_file() {
    let r = monitor_counts(Path::new("../../tests/nblog/no-such-file.raw"));
    assert!(r.timestamps.is_empty());
    assert!(r.counts.len() == KNOWN_COUNTS.len());
    assert!(r.counts.iter().all(|c| c.is_empty()));
}

#[test]
fn test_counts_serialization() {
    let r = monitor_counts(Path::new("../../tests/nblog/counts.raw"));
    let v = serde_json::to_value(&r).unwrap();
    let m = v.as_object().unwrap();
    assert!(m.len() == KNOWN_COUNTS.len() + 1);
    assert!(m["running_containers"] == serde_json::json!([3, 4, 5]));
    assert!(m["system_ds_frees"] == serde_json::json!([7000, null, 6900]));
    assert!(m["timestamps"][2] == "2024-03-01T10:00:00");
    assert!(!m.contains_key("skipped"));
}
