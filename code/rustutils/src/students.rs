/// Decide whether a student id belongs to a genuine learner.
///
/// Learners reach the platform through the course's LMS, which hands us an anonymized id: a 32-digit
/// lowercase hex hash.  Anything else (`student`, `instructor`, test logins) is an artefact account,
/// and ids listed as staff for the course are excluded even when they have the hash shape.
use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;

pub struct StudentFilter {
    staff: HashSet<String>,
    hash: Regex,
}

impl StudentFilter {
    pub fn new(staff: HashSet<String>) -> Result<StudentFilter> {
        Ok(StudentFilter {
            staff,
            hash: Regex::new(r"^[0-9a-f]{32}$")?,
        })
    }

    pub fn is_learner(&self, student: &str) -> bool {
        !self.staff.contains(student) && self.hash.is_match(student)
    }
}

#[test]
fn test_student_filter() {
    let mut staff = HashSet::new();
    staff.insert("dddddddddddddddddddddddddddddddd".to_string());
    staff.insert("instructor".to_string());
    let filter = StudentFilter::new(staff).unwrap();

    assert!(filter.is_learner("0123456789abcdef0123456789abcdef"));
    assert!(filter.is_learner("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"));

    // Staff, even with a hash shape
    assert!(!filter.is_learner("dddddddddddddddddddddddddddddddd"));
    assert!(!filter.is_learner("instructor"));

    // Artefacts
    assert!(!filter.is_learner("student"));
    assert!(!filter.is_learner(""));
    assert!(!filter.is_learner("0123456789ABCDEF0123456789ABCDEF"));
    assert!(!filter.is_learner("0123456789abcdef0123456789abcde"));
    assert!(!filter.is_learner("0123456789abcdef0123456789abcdef0"));
    assert!(!filter.is_learner("0123456789abcdef0123456789abcdeg"));
}
