/// Daily and cumulative activity figures for a course, computed in one forward pass over the event
/// log.
///
/// The log is append-only and written in real time, so the order of records is chronological and
/// the first record of a new day closes the previous one.  For each day we want the number of
/// distinct students and notebooks seen that day, and how many of those had never been seen
/// before.  We also want a series of running totals (distinct students and notebooks seen so far)
/// for every event, compacted so that only changes are kept.
///
/// The running totals are queried once per event, so they are maintained as counters alongside the
/// cumulative sets rather than recomputed as set unions.  There is exactly one pair of cumulative
/// sets per pass, and it is moved from each day to the next when the day is wrapped, never copied.
use crate::logfile::{fold_reader, parse_event_line, Diagnostics, LineError, Skipped};

use rustutils::{
    end_of_day, format_log_time, serialize_day_times, serialize_log_times, StudentFilter,
    Timestamp,
};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use ustr::Ustr;

/// Everything seen up to (not including) the day that currently holds these sets.

#[derive(Debug, Default)]
pub struct Cumulative {
    students: HashSet<Ustr>,
    notebooks: HashSet<Ustr>,
}

/// The figures for a day once it has been wrapped.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayCounts {
    pub unique_students: usize,
    pub unique_notebooks: usize,
    pub new_students: usize,
    pub new_notebooks: usize,
}

/// Activity during one day, relative to everything seen before it.  Wrapping consumes the day,
/// which is how we know it happens exactly once.

#[derive(Debug, Default)]
pub struct DailyFigures {
    students: HashSet<Ustr>,
    notebooks: HashSet<Ustr>,
    cumul: Cumulative,
    nb_total_students: usize,
    nb_total_notebooks: usize,
}

impl DailyFigures {
    /// Start a new day on top of the cumulative sets released by the previous day's `wrap`.

    pub fn new(cumul: Cumulative) -> DailyFigures {
        DailyFigures {
            students: HashSet::new(),
            notebooks: HashSet::new(),
            nb_total_students: cumul.students.len(),
            nb_total_notebooks: cumul.notebooks.len(),
            cumul,
        }
    }

    pub fn add_student(&mut self, student: Ustr) {
        if self.students.insert(student) && !self.cumul.students.contains(&student) {
            self.nb_total_students += 1;
        }
    }

    pub fn add_notebook(&mut self, notebook: Ustr) {
        if self.notebooks.insert(notebook) && !self.cumul.notebooks.contains(&notebook) {
            self.nb_total_notebooks += 1;
        }
    }

    pub fn nb_total_students(&self) -> usize {
        self.nb_total_students
    }

    pub fn nb_total_notebooks(&self) -> usize {
        self.nb_total_notebooks
    }

    /// Close the day: compute its figures and fold today's sets into the cumulative ones, which
    /// are handed back for the next day.

    pub fn wrap(self) -> (DayCounts, Cumulative) {
        let DailyFigures {
            students,
            notebooks,
            mut cumul,
            ..
        } = self;
        let counts = DayCounts {
            unique_students: students.len(),
            unique_notebooks: notebooks.len(),
            new_students: students.difference(&cumul.students).count(),
            new_notebooks: notebooks.difference(&cumul.notebooks).count(),
        };
        cumul.students.extend(students);
        cumul.notebooks.extend(notebooks);
        (counts, cumul)
    }
}

/// Compacts the per-event running totals so that only changes are kept.  For example:
///
///   timestamps = [14:00 14:05 14:08 15:00]
///   students =   [12    13    14    15]    number of students known at that time
///   notebooks =  [20    20    21    22]    number of notebooks opened at least once at that time
///
/// An event that leaves both totals as they were is not recorded, but it is remembered so that
/// `wrap` can end the series on the true final state.

#[derive(Debug, Default)]
pub struct TotalsAccumulator {
    timestamps: Vec<Timestamp>,
    students: Vec<usize>,
    notebooks: Vec<usize>,
    last: Option<(Timestamp, usize, usize)>,
}

impl TotalsAccumulator {
    pub fn new() -> TotalsAccumulator {
        Default::default()
    }

    fn record(&mut self, timestamp: Timestamp, nb_students: usize, nb_notebooks: usize) {
        self.timestamps.push(timestamp);
        self.students.push(nb_students);
        self.notebooks.push(nb_notebooks);
    }

    fn last_recorded(&self) -> Option<(Timestamp, usize, usize)> {
        match (self.timestamps.last(), self.students.last(), self.notebooks.last()) {
            (Some(&t), Some(&s), Some(&n)) => Some((t, s, n)),
            _ => None,
        }
    }

    pub fn insert(&mut self, timestamp: Timestamp, nb_students: usize, nb_notebooks: usize) {
        self.last = Some((timestamp, nb_students, nb_notebooks));
        match self.last_recorded() {
            Some((_, s, n)) if s == nb_students && n == nb_notebooks => {}
            _ => self.record(timestamp, nb_students, nb_notebooks),
        }
    }

    pub fn wrap(mut self) -> EventsReport {
        if let Some((t, s, n)) = self.last {
            if self.last_recorded() != self.last {
                self.record(t, s, n);
            }
        }
        EventsReport {
            timestamps: self.timestamps,
            total_students: self.students,
            total_notebooks: self.notebooks,
        }
    }
}

/// One entry per calendar day that had learner activity, keyed by the last second of the day.

#[derive(Debug, Default, Serialize)]
pub struct DailyReport {
    #[serde(serialize_with = "serialize_day_times")]
    pub timestamps: Vec<Timestamp>,
    pub unique_students: Vec<usize>,
    pub unique_notebooks: Vec<usize>,
    pub new_students: Vec<usize>,
    pub new_notebooks: Vec<usize>,
}

/// The change-only running totals.

#[derive(Debug, Default, Serialize)]
pub struct EventsReport {
    #[serde(serialize_with = "serialize_log_times")]
    pub timestamps: Vec<Timestamp>,
    pub total_students: Vec<usize>,
    pub total_notebooks: Vec<usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct DailyMetrics {
    pub daily: DailyReport,
    pub events: EventsReport,
    #[serde(skip)]
    pub skipped: Vec<Skipped>,
}

struct DailyPass<'a> {
    filter: &'a StudentFilter,
    days: Vec<(Timestamp, DayCounts)>,
    current: Option<(Timestamp, DailyFigures)>,
    accumulator: TotalsAccumulator,
}

impl<'a> DailyPass<'a> {
    fn new(filter: &'a StudentFilter) -> DailyPass<'a> {
        DailyPass {
            filter,
            days: vec![],
            current: None,
            accumulator: TotalsAccumulator::new(),
        }
    }

    fn close_day(&mut self) -> Cumulative {
        match self.current.take() {
            Some((day, figures)) => {
                let (counts, cumul) = figures.wrap();
                self.days.push((day, counts));
                cumul
            }
            None => Cumulative::default(),
        }
    }

    fn ingest(&mut self, line: &str) -> std::result::Result<(), LineError> {
        let entry = parse_event_line(line)?;
        // The notebook of a kill is `-`, which must not be counted as a notebook.
        if entry.is_kill() {
            return Ok(());
        }
        if !self.filter.is_learner(&entry.student) {
            log::debug!("ignoring staff or artefact student {}", entry.student);
            return Ok(());
        }
        let day = end_of_day(entry.timestamp);
        match self.current.as_ref().map(|(current_day, _)| *current_day) {
            Some(current_day) if day < current_day => {
                return Err(LineError::OutOfOrder(format_log_time(entry.timestamp)));
            }
            Some(current_day) if day == current_day => {}
            _ => {
                let cumul = self.close_day();
                self.current = Some((day, DailyFigures::new(cumul)));
            }
        }
        if let Some((_, ref mut figures)) = self.current {
            figures.add_notebook(entry.notebook);
            figures.add_student(entry.student);
            self.accumulator.insert(
                entry.timestamp,
                figures.nb_total_students(),
                figures.nb_total_notebooks(),
            );
        }
        Ok(())
    }

    fn finish(mut self, skipped: Vec<Skipped>) -> DailyMetrics {
        self.close_day();
        let mut daily = DailyReport::default();
        for (day, counts) in self.days {
            daily.timestamps.push(day);
            daily.unique_students.push(counts.unique_students);
            daily.unique_notebooks.push(counts.unique_notebooks);
            daily.new_students.push(counts.new_students);
            daily.new_notebooks.push(counts.new_notebooks);
        }
        DailyMetrics {
            daily,
            events: self.accumulator.wrap(),
            skipped,
        }
    }
}

/// Read the event log for a course and compute the daily figures and the running totals.
///
/// This never fails.  Bad lines are skipped (see `DailyMetrics::skipped`), and if the file cannot
/// be opened or read the result covers whatever was read before the failure, which for a missing
/// file is nothing at all.  In every case the last day and the totals are wrapped exactly once.

pub fn daily_metrics(events_path: &Path, filter: &StudentFilter) -> DailyMetrics {
    match File::open(events_path) {
        Ok(file) => daily_metrics_from(BufReader::new(file), events_path, filter),
        Err(e) => {
            log::error!("{}: cannot open event log - {e}", events_path.display());
            DailyPass::new(filter).finish(vec![])
        }
    }
}

/// As `daily_metrics`, reading the log from `reader`.  `source` names the log in diagnostics.

pub fn daily_metrics_from<R: BufRead>(
    reader: R,
    source: &Path,
    filter: &StudentFilter,
) -> DailyMetrics {
    let mut diagnostics = Diagnostics::new(source);
    let mut pass = DailyPass::new(filter);
    if let Err(e) = fold_reader(reader, &mut diagnostics, |line| pass.ingest(line)) {
        log::error!("{}: unexpected failure in daily metrics - {e}", source.display());
    }
    pass.finish(diagnostics.into_skipped())
}

#[cfg(test)]
use rustutils::{format_day_time, parse_timestamp};

#[cfg(test)]
fn test_filter() -> StudentFilter {
    let mut staff = HashSet::new();
    staff.insert("dddddddddddddddddddddddddddddddd".to_string());
    StudentFilter::new(staff).unwrap()
}

#[test]
fn test_daily_figures_chain() {
    let (a, b, c) = (Ustr::from("a"), Ustr::from("b"), Ustr::from("c"));
    let (nb1, nb2) = (Ustr::from("nb1"), Ustr::from("nb2"));

    let mut d1 = DailyFigures::default();
    d1.add_student(a);
    d1.add_student(a);
    d1.add_notebook(nb1);
    assert!(d1.nb_total_students() == 1);
    assert!(d1.nb_total_notebooks() == 1);
    let (c1, cumul) = d1.wrap();
    assert_eq!(
        c1,
        DayCounts {
            unique_students: 1,
            unique_notebooks: 1,
            new_students: 1,
            new_notebooks: 1
        }
    );

    let mut d2 = DailyFigures::new(cumul);
    assert!(d2.nb_total_students() == 1);
    d2.add_student(a);
    d2.add_student(b);
    d2.add_student(c);
    d2.add_notebook(nb1);
    d2.add_notebook(nb2);
    assert!(d2.nb_total_students() == 3);
    assert!(d2.nb_total_notebooks() == 2);
    let (c2, cumul) = d2.wrap();
    assert_eq!(
        c2,
        DayCounts {
            unique_students: 3,
            unique_notebooks: 2,
            new_students: 2,
            new_notebooks: 1
        }
    );

    // A day with no activity at all
    let d3 = DailyFigures::new(cumul);
    assert!(d3.nb_total_students() == 3);
    let (c3, cumul) = d3.wrap();
    assert_eq!(c3, DayCounts::default());
    assert!(cumul.students.len() == 3 && cumul.notebooks.len() == 2);
}

#[test]
fn test_totals_accumulator() {
    let t = |s: &str| parse_timestamp(s).unwrap();

    let acc = TotalsAccumulator::new();
    let r = acc.wrap();
    assert!(r.timestamps.is_empty() && r.total_students.is_empty());

    let mut acc = TotalsAccumulator::new();
    acc.insert(t("2024-03-01T14:00:00"), 12, 20);
    acc.insert(t("2024-03-01T14:05:00"), 13, 20);
    acc.insert(t("2024-03-01T14:06:00"), 13, 20);
    acc.insert(t("2024-03-01T14:08:00"), 14, 21);
    acc.insert(t("2024-03-01T15:00:00"), 15, 22);
    let r = acc.wrap();
    assert!(r.total_students == vec![12, 13, 14, 15]);
    assert!(r.total_notebooks == vec![20, 20, 21, 22]);
    assert!(format_log_time(r.timestamps[1]) == "2024-03-01T14:05:00");

    // A flat tail is closed by its last point
    let mut acc = TotalsAccumulator::new();
    acc.insert(t("2024-03-01T14:00:00"), 1, 1);
    acc.insert(t("2024-03-01T14:05:00"), 1, 1);
    acc.insert(t("2024-03-01T14:10:00"), 1, 1);
    let r = acc.wrap();
    assert!(r.total_students == vec![1, 1]);
    assert!(format_log_time(r.timestamps[1]) == "2024-03-01T14:10:00");

    // A single point is not duplicated
    let mut acc = TotalsAccumulator::new();
    acc.insert(t("2024-03-01T14:00:00"), 1, 1);
    let r = acc.wrap();
    assert!(r.timestamps.len() == 1);
}

#[test]
fn test_daily_metrics() {
    let m = daily_metrics(Path::new("../../tests/nblog/events.raw"), &test_filter());
    let days = m
        .daily
        .timestamps
        .iter()
        .map(|t| format_day_time(*t))
        .collect::<Vec<String>>();
    assert!(
        days == vec![
            "2024-03-01 23:59:59",
            "2024-03-02 23:59:59",
            "2024-03-04 23:59:59"
        ]
    );
    assert!(m.daily.unique_students == vec![1, 2, 1]);
    assert!(m.daily.new_students == vec![1, 1, 1]);
    assert!(m.daily.unique_notebooks == vec![1, 2, 2]);
    assert!(m.daily.new_notebooks == vec![1, 1, 0]);

    let times = m
        .events
        .timestamps
        .iter()
        .map(|t| format_log_time(*t))
        .collect::<Vec<String>>();
    assert!(
        times
            == vec![
                "2024-03-01T09:00:00",
                "2024-03-02T08:00:00",
                "2024-03-04T14:00:00",
                "2024-03-04T16:00:00"
            ]
    );
    assert!(m.events.total_students == vec![1, 2, 3, 3]);
    assert!(m.events.total_notebooks == vec![1, 2, 2, 2]);

    assert!(m.skipped.len() == 1);
    assert!(m.skipped[0].lineno == 5);
}

#[test]
fn test_daily_metrics_invariants() {
    let m = daily_metrics(Path::new("../../tests/nblog/events.raw"), &test_filter());
    for i in 0..m.daily.timestamps.len() {
        assert!(m.daily.unique_students[i] >= m.daily.new_students[i]);
        assert!(m.daily.unique_notebooks[i] >= m.daily.new_notebooks[i]);
    }
    for w in m.events.total_students.windows(2) {
        assert!(w[0] <= w[1]);
    }
    for w in m.events.total_notebooks.windows(2) {
        assert!(w[0] <= w[1]);
    }
    let total_new = m.daily.new_students.iter().sum::<usize>();
    assert!(Some(&total_new) == m.events.total_students.last());
}

#[test]
fn test_daily_metrics_two_students() {
    // a opens nb1 on day 1, then a and b both open nb2 on day 2
    let m = daily_metrics(Path::new("../../tests/nblog/events-two-days.raw"), &test_filter());
    assert!(m.daily.unique_students == vec![1, 2]);
    assert!(m.daily.new_students == vec![1, 1]);
    assert!(m.daily.unique_notebooks == vec![1, 1]);
    assert!(m.daily.new_notebooks == vec![1, 1]);
}

#[test]
fn test_daily_metrics_out_of_order() {
    let m = daily_metrics(Path::new("../../tests/nblog/events-disorder.raw"), &test_filter());
    assert!(m.daily.timestamps.len() == 1);
    assert!(m.daily.unique_students == vec![2]);
    assert!(m.daily.new_notebooks == vec![2]);
    assert!(m.events.total_students == vec![1, 2]);
    assert!(m.skipped.len() == 1);
    assert!(m.skipped[0].lineno == 2);
    assert!(matches!(m.skipped[0].error, LineError::OutOfOrder(_)));
}

#[test]
fn test_daily_metrics_degenerate() {
    let m = daily_metrics(Path::new("../../tests/nblog/events-staff-only.raw"), &test_filter());
    assert!(m.daily.timestamps.is_empty());
    assert!(m.events.timestamps.is_empty());
    assert!(m.skipped.is_empty());

    let m = daily_metrics(Path::new("../../tests/nblog/no-such-file.raw"), &test_filter());
    assert!(m.daily.timestamps.is_empty());
    assert!(m.daily.unique_students.is_empty());
    assert!(m.events.total_notebooks.is_empty());
}

#[test]
fn test_daily_metrics_read_failure() {
    // The read fails after two good lines; what was read is still wrapped into a day and a
    // terminal totals point.
    let log = "2024-03-01T09:00:00 python aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa w1/nb1 running 8001\n\
               2024-03-01T10:30:00 python bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb w1/nb2 running 8002\n";
    let m = daily_metrics_from(
        crate::logfile::broken_tail(log),
        Path::new("broken"),
        &test_filter(),
    );
    assert!(m.daily.timestamps.len() == 1);
    assert!(format_day_time(m.daily.timestamps[0]) == "2024-03-01 23:59:59");
    assert!(m.daily.unique_students == vec![2]);
    assert!(m.daily.new_notebooks == vec![2]);
    assert!(m.events.timestamps.len() == 2);
    assert!(format_log_time(*m.events.timestamps.last().unwrap()) == "2024-03-01T10:30:00");
    assert!(m.events.total_students == vec![1, 2]);
    assert!(m.events.total_notebooks == vec![1, 2]);
    assert!(m.skipped.is_empty());
}
