/// Locate a course's log files within the nbhosting data tree.
///
/// The expected layout is this:
///
///    <data_path>/raw/<course>/events.raw
///    <data_path>/raw/<course>/counts.raw
///
/// Whether the files exist is not checked here; a missing log is handled by the reports, which
/// come out empty.
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

pub const EVENTS_FILE: &str = "events.raw";
pub const COUNTS_FILE: &str = "counts.raw";

/// The directory holding a course's logs.  This returns an error if `data_path` does not name a
/// directory or the course name could escape the tree.

pub fn course_dir(data_path: &Path, course: &str) -> Result<PathBuf> {
    if !data_path.is_dir() {
        // Path redacted so as not to reveal secrets
        bail!("Not a viable data directory");
    }
    if course.is_empty() || course.contains('/') || course == "." || course == ".." {
        bail!("Not a valid course name: '{course}'");
    }
    Ok(data_path.join("raw").join(course))
}

pub fn events_path(data_path: &Path, course: &str) -> Result<PathBuf> {
    Ok(course_dir(data_path, course)?.join(EVENTS_FILE))
}

pub fn counts_path(data_path: &Path, course: &str) -> Result<PathBuf> {
    Ok(course_dir(data_path, course)?.join(COUNTS_FILE))
}

#[test]
fn test_log_paths() {
    let root = Path::new("../../tests");
    assert!(events_path(root, "python").unwrap() == Path::new("../../tests/raw/python/events.raw"));
    assert!(counts_path(root, "python").unwrap() == Path::new("../../tests/raw/python/counts.raw"));

    assert!(course_dir(root, "").is_err());
    assert!(course_dir(root, "..").is_err());
    assert!(course_dir(root, "a/b").is_err());
    assert!(course_dir(Path::new("../../tests/no-such-dir"), "python").is_err());
    assert!(course_dir(Path::new("../../tests/nblog/events.raw"), "python").is_err());
}
