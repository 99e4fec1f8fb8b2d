use rustutils::Timestamp;
use ustr::Ustr;

/// The action logged when a student's jupyter server is killed.  Such a record carries `-` in the
/// notebook and port fields.

pub const KILL_ACTION: &str = "killing";

/// The EventEntry holds one record from a course's event log.
///
/// We allocate one of these per line, and the same student and notebook ids recur on very many
/// lines, so all the strings are Ustr.

#[derive(Debug, Clone, PartialEq)]
pub struct EventEntry {
    /// Wall-clock UTC time at which the writer appended the record; second resolution.
    pub timestamp: Timestamp,

    /// The course name, which is redundant with the file the record lives in.
    pub course: Ustr,

    /// Student id, normally an anonymized hash but can be a staff or test login.
    pub student: Ustr,

    /// Notebook path within the course, or `-` for a kill.
    pub notebook: Ustr,

    /// One of the open actions (`running`, `created`, ...) or `killing`.
    pub action: Ustr,

    /// The jupyter port, or `-` for a kill.
    pub port: Ustr,
}

impl EventEntry {
    pub fn is_kill(&self) -> bool {
        self.action.as_str() == KILL_ACTION
    }
}

/// One snapshot from the monitor counts log.  `values` is positional wrt the known counter names
/// and may be shorter than that list (but never longer).

#[derive(Debug, Clone, PartialEq)]
pub struct CountsEntry {
    pub timestamp: Timestamp,
    pub values: Vec<i64>,
}
