/// Read configuration data for a course from a json file.
///
/// File format:
///
/// An object { ... } with the following named fields and value types:
///
///   name - string, the canonical name of the course
///   description - string, optional, arbitrary text describing the course
///   staff - array of strings, optional, student ids of staff, test and artefact accounts whose
///      events should be excluded from all statistics
///   animation-grain - string, optional, a WwDdHhMm duration used as the frame width for
///      animated reports
///
/// Any field name starting with '#' is reserved for arbitrary comments.
///
/// The staff list is the same thing the hosting platform keeps per course; we only need a copy of it
/// here because the hash-shape check alone will not catch staff that log in through the regular
/// learner path.
use crate::dates::parse_duration;

use anyhow::{bail, Result};
use chrono::Duration;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path;

#[derive(Debug, Default, Clone)]
pub struct CourseConfig {
    pub name: String,
    pub description: String,
    pub staff: Vec<String>,
    pub animation_grain: Option<Duration>,
}

impl CourseConfig {
    pub fn staff_set(&self) -> HashSet<String> {
        self.staff.iter().cloned().collect::<HashSet<String>>()
    }
}

/// Since the input is human-generated and has optional fields, use the generic JSON parser followed
/// by explicit decoding of the fields, rather than a (derived) strongly-typed parser.

pub fn read_course_config(filename: &str) -> Result<CourseConfig> {
    let file = File::open(path::Path::new(filename))?;
    let reader = BufReader::new(file);
    let v = serde_json::from_reader(reader)?;
    let mut cfg: CourseConfig = Default::default();
    if let Value::Object(fields) = v {
        cfg.name = grab_string(&fields, "name")?;
        cfg.description = grab_string_opt(&fields, "description")?;
        cfg.staff = grab_strings_opt(&fields, "staff")?;
        let grain = grab_string_opt(&fields, "animation-grain")?;
        if !grain.is_empty() {
            match parse_duration(&grain) {
                Ok(d) if d.num_seconds() > 0 => cfg.animation_grain = Some(d),
                _ => bail!("Field 'animation-grain' must be a nonzero duration on the form WwDdHhMm"),
            }
        }
    } else {
        bail!("Expected an object value")
    }
    Ok(cfg)
}

fn grab_string(fields: &serde_json::Map<String, Value>, name: &str) -> Result<String> {
    if let Some(Value::String(s)) = fields.get(name) {
        Ok(s.to_string())
    } else {
        bail!("Field '{name}' must be present and have a string value");
    }
}

fn grab_string_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<String> {
    match fields.get(name) {
        Some(Value::String(s)) => Ok(s.to_string()),
        Some(_) => bail!("Field '{name}' must have a string value"),
        None => Ok("".to_string()),
    }
}

fn grab_strings_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Vec<String>> {
    let mut result = vec![];
    match fields.get(name) {
        Some(Value::Array(vals)) => {
            for v in vals {
                if let Value::String(s) = v {
                    result.push(s.to_string());
                } else {
                    bail!("Field '{name}' must have string values");
                }
            }
        }
        Some(_) => bail!("Field '{name}' must be an array"),
        None => {}
    }
    Ok(result)
}

// Basic whitebox tests that config reading works.

#[test]
fn test_config() {
    let conf = read_course_config("../../tests/rustutils/course.json").unwrap();
    assert!(conf.name == "python-mooc");
    assert!(conf.description == "Python for data science, spring edition");
    assert!(conf.staff.len() == 2);
    assert!(conf.staff_set().contains("dddddddddddddddddddddddddddddddd"));
    assert!(conf.staff_set().contains("instructor"));
    assert!(conf.animation_grain == Some(Duration::days(1)));
}

#[test]
fn test_config_minimal() {
    let conf = read_course_config("../../tests/rustutils/course-minimal.json").unwrap();
    assert!(conf.name == "bash");
    assert!(conf.description == "");
    assert!(conf.staff.is_empty());
    assert!(conf.animation_grain.is_none());
}

#[test]
fn test_config_errors() {
    assert!(read_course_config("../../tests/rustutils/course-bad-staff.json").is_err());
    assert!(read_course_config("../../tests/rustutils/no-such-course.json").is_err());
}
