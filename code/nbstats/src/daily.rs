/// Print the daily figures and the running totals of a course.
use crate::format;
use crate::PrintArgs;

use anyhow::Result;
use nblog::{DailyReport, EventsReport};
use rustutils::format_log_time;
use std::collections::HashMap;
use std::io;

pub fn print_daily(
    output: &mut dyn io::Write,
    print_args: &PrintArgs,
    report: &DailyReport,
) -> Result<()> {
    let (formatters, aliases) = daily_formatters();
    let spec = print_args.fmt.as_deref().unwrap_or(DAILY_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    let rows = (0..report.timestamps.len()).collect::<Vec<usize>>();
    format::format_data(output, &fields, &formatters, &opts, rows, report)
}

pub fn daily_help() -> format::Help {
    let (formatters, aliases) = daily_formatters();
    format::make_help(&formatters, &aliases, DAILY_DEFAULTS)
}

const DAILY_DEFAULTS: &str = "date,unique_students,new_students,unique_notebooks,new_notebooks";

type DailyFormatter = &'static dyn Fn(&usize, &DailyReport) -> String;

fn daily_formatters() -> (HashMap<String, DailyFormatter>, HashMap<String, Vec<String>>) {
    let mut formatters: HashMap<String, DailyFormatter> = HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("date".to_string(), &format_date);
    formatters.insert("daykey".to_string(), &format_daykey);
    formatters.insert("unique_students".to_string(), &format_unique_students);
    formatters.insert("new_students".to_string(), &format_new_students);
    formatters.insert("unique_notebooks".to_string(), &format_unique_notebooks);
    formatters.insert("new_notebooks".to_string(), &format_new_notebooks);
    aliases.insert(
        "students".to_string(),
        vec!["unique_students".to_string(), "new_students".to_string()],
    );
    aliases.insert(
        "notebooks".to_string(),
        vec!["unique_notebooks".to_string(), "new_notebooks".to_string()],
    );
    (formatters, aliases)
}

fn format_date(i: &usize, r: &DailyReport) -> String {
    r.timestamps[*i].format("%Y-%m-%d").to_string()
}

// The day as it is keyed in the JSON report.
fn format_daykey(i: &usize, r: &DailyReport) -> String {
    rustutils::format_day_time(r.timestamps[*i])
}

fn format_unique_students(i: &usize, r: &DailyReport) -> String {
    r.unique_students[*i].to_string()
}

fn format_new_students(i: &usize, r: &DailyReport) -> String {
    r.new_students[*i].to_string()
}

fn format_unique_notebooks(i: &usize, r: &DailyReport) -> String {
    r.unique_notebooks[*i].to_string()
}

fn format_new_notebooks(i: &usize, r: &DailyReport) -> String {
    r.new_notebooks[*i].to_string()
}

pub fn print_events(
    output: &mut dyn io::Write,
    print_args: &PrintArgs,
    report: &EventsReport,
) -> Result<()> {
    let (formatters, aliases) = events_formatters();
    let spec = print_args.fmt.as_deref().unwrap_or(EVENTS_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    let rows = (0..report.timestamps.len()).collect::<Vec<usize>>();
    format::format_data(output, &fields, &formatters, &opts, rows, report)
}

pub fn events_help() -> format::Help {
    let (formatters, aliases) = events_formatters();
    format::make_help(&formatters, &aliases, EVENTS_DEFAULTS)
}

const EVENTS_DEFAULTS: &str = "time,students,notebooks";

type EventsFormatter = &'static dyn Fn(&usize, &EventsReport) -> String;

fn events_formatters() -> (HashMap<String, EventsFormatter>, HashMap<String, Vec<String>>) {
    let mut formatters: HashMap<String, EventsFormatter> = HashMap::new();
    let aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("time".to_string(), &format_event_time);
    formatters.insert("students".to_string(), &format_total_students);
    formatters.insert("notebooks".to_string(), &format_total_notebooks);
    (formatters, aliases)
}

fn format_event_time(i: &usize, r: &EventsReport) -> String {
    format_log_time(r.timestamps[*i])
}

fn format_total_students(i: &usize, r: &EventsReport) -> String {
    r.total_students[*i].to_string()
}

fn format_total_notebooks(i: &usize, r: &EventsReport) -> String {
    r.total_notebooks[*i].to_string()
}

#[cfg(test)]
use rustutils::StudentFilter;

#[cfg(test)]
fn print_to_string(f: impl FnOnce(&mut dyn io::Write) -> Result<()>) -> String {
    let mut out = Vec::new();
    f(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_print_daily() {
    let m = nblog::daily_metrics(
        std::path::Path::new("../../tests/nblog/events.raw"),
        &StudentFilter::new(["dddddddddddddddddddddddddddddddd".to_string()].into()).unwrap(),
    );
    let args = PrintArgs {
        fmt: Some("date,students,csv,header".to_string()),
        json: false,
    };
    let s = print_to_string(|out| print_daily(out, &args, &m.daily));
    assert!(
        s == "date,unique_students,new_students\n\
              2024-03-01,1,1\n\
              2024-03-02,2,1\n\
              2024-03-04,1,1\n"
    );

    let args = PrintArgs {
        fmt: None,
        json: false,
    };
    let s = print_to_string(|out| print_events(out, &args, &m.events));
    let lines = s.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 5);
    assert!(lines[0] == "time                 students  notebooks");
    assert!(lines[4] == "2024-03-04T16:00:00  3         2");
}
