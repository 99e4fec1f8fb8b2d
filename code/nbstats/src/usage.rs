/// Print material usage: notebook popularity (plain, by number of notebooks read, or animated) and
/// the student x notebook heatmap.
use crate::format;
use crate::{PrintArgs, UsagePrintArgs};

use anyhow::Result;
use nblog::{Heatmap, Popularity, UsageReport};
use rustutils::{format_log_time, Frame};
use std::collections::HashMap;
use std::io;

pub fn print_usage(
    output: &mut dyn io::Write,
    print_args: &PrintArgs,
    usage_args: &UsagePrintArgs,
    report: &UsageReport,
) -> Result<()> {
    if usage_args.by_count {
        let (formatters, aliases) = by_count_formatters();
        let spec = print_args.fmt.as_deref().unwrap_or(BY_COUNT_DEFAULTS);
        let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
        let opts = format::standard_options(&others);
        let data = &report.nbstudents_per_nbnotebooks;
        let rows = (0..data.len()).collect::<Vec<usize>>();
        format::format_data(output, &fields, &formatters, &opts, rows, data)
    } else if usage_args.animated {
        let (formatters, aliases) = animated_formatters();
        let spec = print_args.fmt.as_deref().unwrap_or(ANIMATED_DEFAULTS);
        let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
        let opts = format::standard_options(&others);
        let frames = &report.nbstudents_per_notebook_animated;
        if opts.is_table() {
            // One block per frame
            for (f, frame) in frames.iter().enumerate() {
                let _ = output.write_all(
                    format!("FRAME: {}\n", format_log_time(frame.timestamp)).as_bytes(),
                );
                let rows = (0..frame.data.len()).map(|r| (f, r)).collect::<Vec<(usize, usize)>>();
                format::format_data(output, &fields, &formatters, &opts, rows, frames)?;
            }
            Ok(())
        } else {
            let rows = frames
                .iter()
                .enumerate()
                .flat_map(|(f, frame)| (0..frame.data.len()).map(move |r| (f, r)))
                .collect::<Vec<(usize, usize)>>();
            format::format_data(output, &fields, &formatters, &opts, rows, frames)
        }
    } else {
        let (formatters, aliases) = popularity_formatters();
        let spec = print_args.fmt.as_deref().unwrap_or(POPULARITY_DEFAULTS);
        let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
        let opts = format::standard_options(&others);
        let data = &report.nbstudents_per_notebook;
        let rows = (0..data.len()).collect::<Vec<usize>>();
        format::format_data(output, &fields, &formatters, &opts, rows, data)
    }
}

pub fn usage_help(usage_args: &UsagePrintArgs) -> format::Help {
    if usage_args.by_count {
        let (formatters, aliases) = by_count_formatters();
        format::make_help(&formatters, &aliases, BY_COUNT_DEFAULTS)
    } else if usage_args.animated {
        let (formatters, aliases) = animated_formatters();
        format::make_help(&formatters, &aliases, ANIMATED_DEFAULTS)
    } else {
        let (formatters, aliases) = popularity_formatters();
        format::make_help(&formatters, &aliases, POPULARITY_DEFAULTS)
    }
}

const POPULARITY_DEFAULTS: &str = "notebook,students";

type PopularityFormatter = &'static dyn Fn(&usize, &Popularity) -> String;

fn popularity_formatters() -> (
    HashMap<String, PopularityFormatter>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, PopularityFormatter> = HashMap::new();
    let aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("notebook".to_string(), &format_notebook);
    formatters.insert("students".to_string(), &format_students);
    (formatters, aliases)
}

fn format_notebook(i: &usize, p: &Popularity) -> String {
    p[*i].0.to_string()
}

fn format_students(i: &usize, p: &Popularity) -> String {
    p[*i].1.to_string()
}

const BY_COUNT_DEFAULTS: &str = "notebooks,students";

type ByCountFormatter = &'static dyn Fn(&usize, &Vec<(usize, usize)>) -> String;

fn by_count_formatters() -> (HashMap<String, ByCountFormatter>, HashMap<String, Vec<String>>) {
    let mut formatters: HashMap<String, ByCountFormatter> = HashMap::new();
    let aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("notebooks".to_string(), &format_nbnotebooks);
    formatters.insert("students".to_string(), &format_nbstudents);
    (formatters, aliases)
}

fn format_nbnotebooks(i: &usize, d: &Vec<(usize, usize)>) -> String {
    d[*i].0.to_string()
}

fn format_nbstudents(i: &usize, d: &Vec<(usize, usize)>) -> String {
    d[*i].1.to_string()
}

const ANIMATED_DEFAULTS: &str = "time,notebook,students";

type AnimatedFormatter = &'static dyn Fn(&(usize, usize), &Vec<Frame<Popularity>>) -> String;

fn animated_formatters() -> (HashMap<String, AnimatedFormatter>, HashMap<String, Vec<String>>) {
    let mut formatters: HashMap<String, AnimatedFormatter> = HashMap::new();
    let aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("time".to_string(), &format_frame_time);
    formatters.insert("notebook".to_string(), &format_frame_notebook);
    formatters.insert("students".to_string(), &format_frame_students);
    (formatters, aliases)
}

fn format_frame_time(d: &(usize, usize), frames: &Vec<Frame<Popularity>>) -> String {
    format_log_time(frames[d.0].timestamp)
}

fn format_frame_notebook(d: &(usize, usize), frames: &Vec<Frame<Popularity>>) -> String {
    frames[d.0].data[d.1].0.to_string()
}

fn format_frame_students(d: &(usize, usize), frames: &Vec<Frame<Popularity>>) -> String {
    frames[d.0].data[d.1].1.to_string()
}

/// The heatmap has a column per notebook.  Notebook paths are free text and could clash with field
/// names or control words, so the notebook fields are `nb0`, `nb1`, ... in column order, titled by
/// the notebook path, and the alias `notebooks` selects them all.  Absent cells print as `-`.

pub fn print_heatmap(
    output: &mut dyn io::Write,
    print_args: &PrintArgs,
    heatmap: &Heatmap,
) -> Result<()> {
    let (formatters, aliases) = heatmap_formatters(heatmap);
    let spec = print_args.fmt.as_deref().unwrap_or(HEATMAP_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let mut opts = format::standard_options(&others);
    opts.labels = notebook_labels(heatmap);
    let rows = (0..heatmap.y.len()).collect::<Vec<usize>>();
    format::format_data(output, &fields, &formatters, &opts, rows, heatmap)
}

pub fn heatmap_help(heatmap: &Heatmap) -> format::Help {
    let (formatters, aliases) = heatmap_formatters(heatmap);
    let mut help = format::make_help(&formatters, &aliases, HEATMAP_DEFAULTS);
    let labels = notebook_labels(heatmap);
    help.fields = help
        .fields
        .into_iter()
        .map(|f| match labels.get(&f) {
            Some(path) => format!("{f} ({path})"),
            None => f,
        })
        .collect::<Vec<String>>();
    help
}

const HEATMAP_DEFAULTS: &str = "student,total,notebooks";

type HeatmapFormatter = Box<dyn Fn(&usize, &Heatmap) -> String>;

fn notebook_field(col: usize) -> String {
    format!("nb{col}")
}

fn notebook_labels(heatmap: &Heatmap) -> HashMap<String, String> {
    heatmap
        .x
        .iter()
        .enumerate()
        .map(|(col, notebook)| (notebook_field(col), notebook.to_string()))
        .collect::<HashMap<String, String>>()
}

fn heatmap_formatters(
    heatmap: &Heatmap,
) -> (HashMap<String, HeatmapFormatter>, HashMap<String, Vec<String>>) {
    let mut formatters: HashMap<String, HeatmapFormatter> = HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("student".to_string(), Box::new(format_student));
    formatters.insert("total".to_string(), Box::new(format_total));
    for col in 0..heatmap.x.len() {
        formatters.insert(
            notebook_field(col),
            Box::new(move |i: &usize, h: &Heatmap| match h.z[*i][col] {
                Some(v) => v.to_string(),
                None => format::NO_VALUE.to_string(),
            }),
        );
    }
    aliases.insert(
        "notebooks".to_string(),
        (0..heatmap.x.len()).map(notebook_field).collect::<Vec<String>>(),
    );
    (formatters, aliases)
}

fn format_student(i: &usize, h: &Heatmap) -> String {
    h.y[*i].to_string()
}

fn format_total(i: &usize, h: &Heatmap) -> String {
    h.z[*i].iter().flatten().sum::<u32>().to_string()
}

#[cfg(test)]
fn test_usage() -> UsageReport {
    nblog::material_usage(
        std::path::Path::new("../../tests/nblog/events.raw"),
        &rustutils::StudentFilter::new(["dddddddddddddddddddddddddddddddd".to_string()].into())
            .unwrap(),
        chrono::Duration::days(1),
    )
}

#[cfg(test)]
fn run_usage(fmt: &str, by_count: bool, animated: bool) -> String {
    let print_args = PrintArgs {
        fmt: Some(fmt.to_string()),
        json: false,
    };
    let usage_args = UsagePrintArgs {
        grain: None,
        by_count,
        animated,
    };
    let mut out = Vec::new();
    print_usage(&mut out, &print_args, &usage_args, &test_usage()).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_print_usage() {
    assert!(run_usage("notebook,students,csv", false, false) == "w1/nb1,2\nw1/nb2,2\n");
    assert!(run_usage("notebooks,students,csv", true, false) == "1,2\n2,1\n");

    let s = run_usage("time,notebook,students,csv", false, true);
    let lines = s.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 7);
    assert!(lines[0] == "2024-03-02T00:00:00,w1/nb1,1");
    assert!(lines[6] == "2024-03-05T00:00:00,w1/nb2,2");

    let s = run_usage("notebook,students,noheader", false, true);
    assert!(s.starts_with("FRAME: 2024-03-02T00:00:00\nw1/nb1  1\nFRAME: 2024-03-03T00:00:00\n"));
}

#[test]
fn test_print_heatmap() {
    let r = test_usage();
    let print_args = PrintArgs {
        fmt: Some("total,notebooks,csv,header".to_string()),
        json: false,
    };
    let mut out = Vec::new();
    print_heatmap(&mut out, &print_args, &r.heatmap).unwrap();
    assert!(
        String::from_utf8(out).unwrap()
            == "total,w1/nb1,w1/nb2\n\
                2,-,2\n\
                3,3,-\n\
                3,1,2\n"
    );
    let help = heatmap_help(&r.heatmap);
    assert!(help.fields.len() == 4);
    assert!(help.fields.iter().any(|f| f == "nb1 (w1/nb2)"));

    let print_args = PrintArgs {
        fmt: Some("student,nb1,csv".to_string()),
        json: false,
    };
    let mut out = Vec::new();
    print_heatmap(&mut out, &print_args, &r.heatmap).unwrap();
    let s = String::from_utf8(out).unwrap();
    let nb1 = s
        .lines()
        .map(|l| l.split(',').nth(1))
        .collect::<Vec<Option<&str>>>();
    assert!(nb1 == [Some("2"), Some("-"), Some("2")]);
}

#[test]
fn test_print_heatmap_awkward_notebook_names() {
    // Notebooks named like a field and like a control word are still just columns.
    let heatmap = Heatmap {
        x: vec!["total".into(), "csv".into(), "a,b".into()],
        y: vec!["s1".into(), "s2".into()],
        z: vec![vec![Some(1), None, None], vec![None, Some(1), Some(2)]],
        zmin: Some(1),
        zmax: Some(2),
    };
    let print_args = PrintArgs {
        fmt: None,
        json: false,
    };
    let mut out = Vec::new();
    print_heatmap(&mut out, &print_args, &heatmap).unwrap();
    assert!(
        String::from_utf8(out).unwrap()
            == "student  total  total  csv  a,b\n\
                s1       1      1      -    -\n\
                s2       3      -      1    2\n"
    );

    let print_args = PrintArgs {
        fmt: Some("nb2,total,json".to_string()),
        json: false,
    };
    let mut out = Vec::new();
    print_heatmap(&mut out, &print_args, &heatmap).unwrap();
    assert!(
        String::from_utf8(out).unwrap()
            == "[{\"a,b\":\"-\",\"total\":\"1\"},{\"a,b\":\"2\",\"total\":\"3\"}]\n"
    );
}
