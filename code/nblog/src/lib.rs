/// The nbhosting logs are append-only text logs written per course by the notebook server: the
/// *event log* records every notebook that a student opens and every kill of a student's jupyter
/// server, and the *counts log* records periodic snapshots of a set of named system counters.  Both
/// live in a per-course directory in the data tree.
///
/// This library computes the statistics that the course dashboards show from those logs:
///
/// - Daily activity: for each calendar day, the number of distinct students and notebooks seen and
///   how many of them were new, plus a compact series of running totals.
///
/// - Material usage: per-notebook popularity, animated over time at a fixed grain; the
///   distribution of students by number of notebooks read; a student x notebook heatmap.
///
/// - Monitor counts: one time series per known counter.
///
/// Every report is a single forward pass over one file.  There are two important invariants on the
/// event log, both guaranteed by the writer:
///
/// - records are appended in real time, so timestamps are non-decreasing
///
/// - a record is one line with six fields, though a reader may see a partly written last line
///
/// Genuine learners are told apart from staff and test accounts by a `StudentFilter`, which the
/// caller builds from the course's staff list.
///
/// Reports never fail.  Lines that cannot be used are recorded in the report's `skipped` list, and
/// a file that cannot be read gives an empty (or partial) report.
mod counts;
mod daily;
mod logentry;
mod logfile;
mod logtree;
mod usage;

// One record of the event log, and one of the counts log.

pub use logentry::CountsEntry;
pub use logentry::EventEntry;

// The action that marks the kill of a student's server.

pub use logentry::KILL_ACTION;

// Why a line was skipped, and where.

pub use logfile::LineError;
pub use logfile::Skipped;

// Per-scan accumulator of skipped lines.

pub use logfile::Diagnostics;

// Run a fallible handler over every line of a log file, recording the lines it rejects.

pub use logfile::fold_lines;
pub use logfile::fold_reader;

// Parse single records.

pub use logfile::parse_counts_line;
pub use logfile::parse_event_line;

// Compute the path of a course's log directory and of the logs within it, given the root of the
// data tree.

pub use logtree::counts_path;
pub use logtree::course_dir;
pub use logtree::events_path;

// Incremental per-day accounting with cumulative sets carried from day to day.

pub use daily::Cumulative;
pub use daily::DailyFigures;
pub use daily::DayCounts;

// Compaction of a running-totals series to its change points.

pub use daily::TotalsAccumulator;

// Read an event log and compute the daily figures and the running totals.

pub use daily::daily_metrics; // -> DailyMetrics
pub use daily::daily_metrics_from;
pub use daily::DailyMetrics;
pub use daily::DailyReport;
pub use daily::EventsReport;

// Read an event log and compute the material usage.

pub use usage::default_grain;
pub use usage::material_usage; // -> UsageReport
pub use usage::Heatmap;
pub use usage::Popularity;
pub use usage::UsageReport;

// The counter names of the counts log, in log order.

pub use counts::KNOWN_COUNTS;

// Read a counts log into one column per counter.

pub use counts::monitor_counts; // -> CountsReport
pub use counts::monitor_counts_with;
pub use counts::CountsReport;
