/// Material usage: which notebooks were read, by how many students, and how that evolved.
///
/// One forward pass over the event log builds the notebook->students and student->notebooks
/// relations and the visit count of every (notebook, student) pair.  While doing so the per-notebook
/// popularity table is snapshotted at every grain boundary to give an animation.  From the
/// relations we then derive the popularity table, the distribution of students by number of
/// notebooks read, and the heatmap.
///
/// All orderings are by the string content of the ids, so the output is reproducible.
use crate::logfile::{fold_lines, parse_event_line, Diagnostics, LineError, Skipped};

use chrono::Duration;
use itertools::Itertools;
use rustutils::{Frame, StudentFilter, TimeBuckets};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use ustr::Ustr;

/// Grain of the animated popularity table unless the course config says otherwise.

pub fn default_grain() -> Duration {
    Duration::hours(6)
}

/// (notebook, number of distinct students), sorted by notebook.

pub type Popularity = Vec<(Ustr, usize)>;

/// A student x notebook matrix of visit counts.  `y` labels the rows and `x` the columns.  A cell
/// is None when the student never opened the notebook.  Rows are ordered by ascending total
/// visits, ties broken by student id.  `zmin` and `zmax` range over the cells that are present and
/// are None if there are none.

#[derive(Debug, Default, Serialize)]
pub struct Heatmap {
    pub x: Vec<Ustr>,
    pub y: Vec<Ustr>,
    pub z: Vec<Vec<Option<u32>>>,
    pub zmin: Option<u32>,
    pub zmax: Option<u32>,
}

#[derive(Debug, Default, Serialize)]
pub struct UsageReport {
    pub nbnotebooks: usize,
    pub nbstudents: usize,
    pub nbstudents_per_notebook: Popularity,
    pub nbstudents_per_notebook_animated: Vec<Frame<Popularity>>,

    /// (number of notebooks read, number of students who read exactly that many), ascending.
    pub nbstudents_per_nbnotebooks: Vec<(usize, usize)>,

    pub heatmap: Heatmap,

    #[serde(skip)]
    pub skipped: Vec<Skipped>,
}

fn by_name(a: &Ustr, b: &Ustr) -> std::cmp::Ordering {
    a.as_str().cmp(b.as_str())
}

struct UsagePass<'a> {
    filter: &'a StudentFilter,
    notebook_students: HashMap<Ustr, HashSet<Ustr>>,
    student_notebooks: HashMap<Ustr, HashSet<Ustr>>,
    visits: HashMap<(Ustr, Ustr), u32>,
    buckets: TimeBuckets<Popularity>,
}

impl<'a> UsagePass<'a> {
    fn new(filter: &'a StudentFilter, grain: Duration) -> UsagePass<'a> {
        UsagePass {
            filter,
            notebook_students: HashMap::new(),
            student_notebooks: HashMap::new(),
            visits: HashMap::new(),
            buckets: TimeBuckets::new(grain),
        }
    }

    fn popularity(&self) -> Popularity {
        self.notebook_students
            .iter()
            .map(|(notebook, students)| (*notebook, students.len()))
            .sorted_by(|a, b| by_name(&a.0, &b.0))
            .collect()
    }

    fn ingest(&mut self, line: &str) -> std::result::Result<(), LineError> {
        let entry = parse_event_line(line)?;
        if entry.is_kill() {
            return Ok(());
        }
        if !self.filter.is_learner(&entry.student) {
            log::debug!("ignoring staff or artefact student {}", entry.student);
            return Ok(());
        }
        if let Some(crossing) = self.buckets.prepare(entry.timestamp) {
            let snapshot = self.popularity();
            self.buckets.record_data(snapshot, crossing);
        }
        self.notebook_students
            .entry(entry.notebook)
            .or_default()
            .insert(entry.student);
        self.student_notebooks
            .entry(entry.student)
            .or_default()
            .insert(entry.notebook);
        *self.visits.entry((entry.notebook, entry.student)).or_insert(0) += 1;
        Ok(())
    }

    fn heatmap(&self) -> Heatmap {
        let x = self
            .notebook_students
            .keys()
            .copied()
            .sorted_by(by_name)
            .collect::<Vec<Ustr>>();
        let rows = self
            .student_notebooks
            .keys()
            .copied()
            .sorted_by(by_name)
            .map(|student| {
                let row = x
                    .iter()
                    .map(|notebook| self.visits.get(&(*notebook, student)).copied())
                    .collect::<Vec<Option<u32>>>();
                (student, row)
            })
            // sorted_by_key is stable so equal totals stay in student order
            .sorted_by_key(|(_, row)| row.iter().flatten().sum::<u32>())
            .collect::<Vec<(Ustr, Vec<Option<u32>>)>>();
        let cells = rows.iter().flat_map(|(_, row)| row.iter().flatten());
        let zmin = cells.clone().min().copied();
        let zmax = cells.max().copied();
        let (y, z) = rows.into_iter().unzip();
        Heatmap {
            x,
            y,
            z,
            zmin,
            zmax,
        }
    }

    fn finish(self, skipped: Vec<Skipped>) -> UsageReport {
        let nbstudents_per_notebook = self.popularity();
        let nbstudents_per_nbnotebooks = self
            .student_notebooks
            .values()
            .map(|notebooks| notebooks.len())
            .sorted()
            .dedup_with_count()
            .map(|(students, nbnotebooks)| (nbnotebooks, students))
            .collect();
        let heatmap = self.heatmap();
        let nbstudents_per_notebook_animated = self.buckets.wrap(nbstudents_per_notebook.clone());
        UsageReport {
            nbnotebooks: self.notebook_students.len(),
            nbstudents: self.student_notebooks.len(),
            nbstudents_per_notebook,
            nbstudents_per_notebook_animated,
            nbstudents_per_nbnotebooks,
            heatmap,
            skipped,
        }
    }
}

/// Read the event log for a course and compute the material usage, animating the popularity table
/// at the given grain.  Never fails; bad lines are skipped and an I/O problem yields whatever was
/// read up to that point.
///
/// Unlike `daily_metrics` this does not reject events that are earlier than their predecessor:
/// they are counted, and simply do not advance the animation.

pub fn material_usage(events_path: &Path, filter: &StudentFilter, grain: Duration) -> UsageReport {
    let mut diagnostics = Diagnostics::new(events_path);
    let mut pass = UsagePass::new(filter, grain);
    if let Err(e) = fold_lines(events_path, &mut diagnostics, |line| pass.ingest(line)) {
        log::error!("{}: unexpected failure in material usage - {e}", events_path.display());
    }
    pass.finish(diagnostics.into_skipped())
}

#[cfg(test)]
use rustutils::format_log_time;

#[cfg(test)]
fn test_filter() -> StudentFilter {
    let mut staff = HashSet::new();
    staff.insert("dddddddddddddddddddddddddddddddd".to_string());
    StudentFilter::new(staff).unwrap()
}

#[cfg(test)]
fn names(xs: &[Ustr]) -> Vec<&str> {
    xs.iter().map(|x| &x.as_str()[..1]).collect()
}

#[test]
fn test_material_usage() {
    let r = material_usage(
        Path::new("../../tests/nblog/events.raw"),
        &test_filter(),
        Duration::days(1),
    );
    assert!(r.nbnotebooks == 2);
    assert!(r.nbstudents == 3);
    assert!(
        r.nbstudents_per_notebook
            == vec![(Ustr::from("w1/nb1"), 2), (Ustr::from("w1/nb2"), 2)]
    );
    assert!(r.nbstudents_per_nbnotebooks == vec![(1, 2), (2, 1)]);

    // No `-` notebook from the kill, nothing from `student` or the staff member
    assert!(r
        .nbstudents_per_notebook
        .iter()
        .all(|(nb, _)| nb.as_str() != "-"));
    assert!(r.skipped.len() == 1 && r.skipped[0].lineno == 5);
}

#[test]
fn test_heatmap() {
    let r = material_usage(
        Path::new("../../tests/nblog/events.raw"),
        &test_filter(),
        Duration::days(1),
    );
    let h = &r.heatmap;
    assert!(h.x.iter().map(|x| x.as_str()).collect::<Vec<&str>>() == vec!["w1/nb1", "w1/nb2"]);
    // a and c both have 3 visits, b has 2
    assert!(names(&h.y) == vec!["b", "a", "c"]);
    assert!(h.z == vec![vec![None, Some(2)], vec![Some(3), None], vec![Some(1), Some(2)]]);
    assert!(h.zmin == Some(1));
    assert!(h.zmax == Some(3));
    assert!(h.z.iter().all(|row| row.len() == h.x.len()));
    assert!(h.z.len() == h.y.len());
}

#[test]
fn test_animation() {
    let r = material_usage(
        Path::new("../../tests/nblog/events.raw"),
        &test_filter(),
        Duration::days(1),
    );
    let frames = &r.nbstudents_per_notebook_animated;
    let times = frames
        .iter()
        .map(|f| format_log_time(f.timestamp))
        .collect::<Vec<String>>();
    assert!(
        times
            == vec![
                "2024-03-02T00:00:00",
                "2024-03-03T00:00:00",
                "2024-03-04T00:00:00",
                "2024-03-05T00:00:00"
            ]
    );
    let nb1 = Ustr::from("w1/nb1");
    let nb2 = Ustr::from("w1/nb2");
    assert!(frames[0].data == vec![(nb1, 1)]);
    assert!(frames[1].data == vec![(nb1, 1), (nb2, 1)]);
    assert!(frames[2].data == frames[1].data);
    assert!(frames[3].data == r.nbstudents_per_notebook);
}

#[test]
fn test_material_usage_tolerates_disorder() {
    let r = material_usage(
        Path::new("../../tests/nblog/events-disorder.raw"),
        &test_filter(),
        default_grain(),
    );
    assert!(r.skipped.is_empty());
    assert!(r.nbstudents == 2);
    assert!(r.nbstudents_per_nbnotebooks == vec![(1, 1), (2, 1)]);
}

#[test]
fn test_material_usage_degenerate() {
    for path in [
        "../../tests/nblog/events-staff-only.raw",
        "../../tests/nblog/no-such-file.raw",
    ] {
        let r = material_usage(Path::new(path), &test_filter(), default_grain());
        assert!(r.nbnotebooks == 0 && r.nbstudents == 0);
        assert!(r.nbstudents_per_notebook.is_empty());
        assert!(r.nbstudents_per_notebook_animated.is_empty());
        assert!(r.nbstudents_per_nbnotebooks.is_empty());
        assert!(r.heatmap.x.is_empty() && r.heatmap.y.is_empty() && r.heatmap.z.is_empty());
        assert!(r.heatmap.zmin.is_none() && r.heatmap.zmax.is_none());
    }
}

#[test]
fn test_usage_serialization() {
    let r = material_usage(
        Path::new("../../tests/nblog/events.raw"),
        &test_filter(),
        Duration::days(1),
    );
    let v = serde_json::to_value(&r).unwrap();
    assert!(v["nbstudents_per_notebook"][0] == serde_json::json!(["w1/nb1", 2]));
    assert!(v["heatmap"]["z"][0] == serde_json::json!([null, 2]));
    assert!(v["nbstudents_per_notebook_animated"][0]["timestamp"] == "2024-03-02T00:00:00");
    assert!(v.get("skipped").is_none());

    let empty = material_usage(
        Path::new("../../tests/nblog/no-such-file.raw"),
        &test_filter(),
        default_grain(),
    );
    let v = serde_json::to_value(&empty).unwrap();
    assert!(v["heatmap"]["zmin"].is_null());
}
