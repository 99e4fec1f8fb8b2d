/// Print the monitor counts of a course, one row per snapshot and one column per counter.
///
/// The counter columns come from the report's own schema, so the formatters are made at run time.
use crate::format;
use crate::PrintArgs;

use anyhow::Result;
use nblog::{CountsReport, KNOWN_COUNTS};
use rustutils::format_log_time;
use std::collections::HashMap;
use std::io;

pub fn print_counts(
    output: &mut dyn io::Write,
    print_args: &PrintArgs,
    report: &CountsReport,
) -> Result<()> {
    let names = report.names.iter().map(|s| s.as_str()).collect::<Vec<&str>>();
    let (formatters, aliases) = counts_formatters(&names);
    let spec = print_args.fmt.as_deref().unwrap_or(COUNTS_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    let rows = (0..report.timestamps.len()).collect::<Vec<usize>>();
    format::format_data(output, &fields, &formatters, &opts, rows, report)
}

pub fn counts_help() -> format::Help {
    let (formatters, aliases) = counts_formatters(&KNOWN_COUNTS);
    format::make_help(&formatters, &aliases, COUNTS_DEFAULTS)
}

const COUNTS_DEFAULTS: &str = "time,all";

type CountsFormatter = Box<dyn Fn(&usize, &CountsReport) -> String>;

// Aliases group related counters; names the schema does not have are dropped by parse_fields.
fn counts_formatters(
    names: &[&str],
) -> (HashMap<String, CountsFormatter>, HashMap<String, Vec<String>>) {
    let mut formatters: HashMap<String, CountsFormatter> = HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("time".to_string(), Box::new(format_time));
    for (col, name) in names.iter().enumerate() {
        formatters.insert(
            name.to_string(),
            Box::new(move |i: &usize, r: &CountsReport| match r.counts[col][*i] {
                Some(v) => v.to_string(),
                None => format::NO_VALUE.to_string(),
            }),
        );
    }
    aliases.insert("all".to_string(), select(names, |_| true));
    aliases.insert("containers".to_string(), select(names, |n| n.ends_with("_container")));
    aliases.insert("load".to_string(), select(names, |n| n.starts_with("load")));
    aliases.insert("disk".to_string(), select(names, |n| n.contains("_ds_")));
    (formatters, aliases)
}

fn select(names: &[&str], pred: impl Fn(&str) -> bool) -> Vec<String> {
    names
        .iter()
        .filter(|n| pred(n))
        .map(|n| n.to_string())
        .collect::<Vec<String>>()
}

fn format_time(i: &usize, r: &CountsReport) -> String {
    format_log_time(r.timestamps[*i])
}

#[test]
fn test_print_counts() {
    let r = nblog::monitor_counts(std::path::Path::new("../../tests/nblog/counts.raw"));
    let args = PrintArgs {
        fmt: Some("time,load,system_ds_free,csv".to_string()),
        json: false,
    };
    let mut out = Vec::new();
    print_counts(&mut out, &args, &r).unwrap();
    assert!(
        String::from_utf8(out).unwrap()
            == "2024-03-01T09:00:00,1,2,3,7000\n\
                2024-03-01T09:15:00,1,1,2,-\n\
                2024-03-01T10:00:00,2,2,2,6900\n"
    );

    let args = PrintArgs {
        fmt: Some("time,containers,awk,nodefaults".to_string()),
        json: false,
    };
    let mut out = Vec::new();
    print_counts(&mut out, &args, &r).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(s.lines().next() == Some("2024-03-01T09:00:00 3 10"));
}

#[test]
fn test_counts_help() {
    let help = counts_help();
    assert!(help.fields.len() == KNOWN_COUNTS.len() + 1);
    let (_, load) = help.aliases.iter().find(|(k, _)| k == "load").unwrap();
    assert!(*load == vec!["load1", "load5", "load15"]);
}
