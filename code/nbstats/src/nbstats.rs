/// `nbstats` -- Compute statistics from the logs of a notebook-hosting course
///
/// Run with --help for brief help, or --fmt=help on any report command for the output fields.
///
/// Quirks
///
/// The data path, the course and the staff list together determine what is read and who is counted.
/// Without a config file and without --staff, only the hash-shape check separates learners from
/// staff, so staff who log in through the learner path will be counted.
///
/// --verbose prints a summary of the report sizes to stderr *instead of* the report, and turns on
/// informational logging.  Diagnostics about skipped lines are always logged at warning level.
mod counts;
mod daily;
mod format;
mod usage;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use nblog::UsageReport;
use rustutils::{parse_duration, read_course_config, CourseConfig, StudentFilter};
use serde::Serialize;
use std::collections::HashSet;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print information about the program
    Version,

    /// Print per-day unique and new students and notebooks
    Daily(EventsCmdArgs),

    /// Print the running totals of students and notebooks, at every change
    Events(EventsCmdArgs),

    /// Print the monitor counters
    Counts(CountsCmdArgs),

    /// Print notebook popularity
    Usage(UsageCmdArgs),

    /// Print the student x notebook visit counts
    Heatmap(EventsCmdArgs),
}

#[derive(Args, Debug)]
pub struct EventsCmdArgs {
    #[command(flatten)]
    source_args: EventSourceArgs,

    #[command(flatten)]
    learner_args: LearnerArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct UsageCmdArgs {
    #[command(flatten)]
    source_args: EventSourceArgs,

    #[command(flatten)]
    learner_args: LearnerArgs,

    #[command(flatten)]
    usage_args: UsagePrintArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct CountsCmdArgs {
    #[command(flatten)]
    source_args: CountsSourceArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct EventSourceArgs {
    /// Select the root directory of the nbhosting data [default: $NBHOSTING_ROOT or $HOME/nbhosting]
    #[arg(long)]
    data_path: Option<String>,

    /// The course whose logs to read [default: the name in the config file]
    #[arg(long)]
    course: Option<String>,

    /// Event log file name (overrides --data-path and --course)
    #[arg(long)]
    events_file: Option<String>,
}

#[derive(Args, Debug)]
pub struct CountsSourceArgs {
    /// Select the root directory of the nbhosting data [default: $NBHOSTING_ROOT or $HOME/nbhosting]
    #[arg(long)]
    data_path: Option<String>,

    /// The course whose logs to read
    #[arg(long)]
    course: Option<String>,

    /// Counts log file name (overrides --data-path and --course)
    #[arg(long)]
    counts_file: Option<String>,
}

#[derive(Args, Debug)]
pub struct LearnerArgs {
    /// File containing JSON data with the course configuration [default: none]
    #[arg(long)]
    config_file: Option<String>,

    /// Exclude this student id from all statistics (repeatable) [default: the config's staff]
    #[arg(long)]
    staff: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct UsagePrintArgs {
    /// Frame width of the animation, on the form WwDdHhMm [default: config, or 6h]
    #[arg(long, value_parser = parse_duration)]
    grain: Option<chrono::Duration>,

    /// Print the number of students by number of notebooks read
    #[arg(long, default_value_t = false)]
    by_count: bool,

    /// Print the popularity table once per frame of the animation
    #[arg(long, default_value_t = false)]
    animated: bool,
}

#[derive(Args, Debug, Default)]
pub struct PrintArgs {
    /// Select fields and format for the output [default: see --fmt=help]
    #[arg(long)]
    fmt: Option<String>,

    /// Dump the entire report as JSON, ignoring --fmt
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug, Default)]
pub struct MetaArgs {
    /// Print the size of every part of the report to stderr, then terminate
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() {
    match nbstats() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn nbstats() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        // Syntax:
        //  - components of the version string are space-separated but there are spaces nowhere else
        //  - the keyword "nbstats" is always the first component
        //  - every component is keyword(value)
        //  - "version" carries a semver
        println!("nbstats version(0.1.0)");
        return Ok(());
    }

    // Help for the heatmap depends on the data, so it is handled with the report below.
    if match cli.command {
        Commands::Daily(ref args) => format::maybe_help(&args.print_args.fmt, daily::daily_help),
        Commands::Events(ref args) => format::maybe_help(&args.print_args.fmt, daily::events_help),
        Commands::Counts(ref args) => {
            format::maybe_help(&args.print_args.fmt, counts::counts_help)
        }
        Commands::Usage(ref args) => {
            format::maybe_help(&args.print_args.fmt, || usage::usage_help(&args.usage_args))
        }
        Commands::Heatmap(_) | Commands::Version => false,
    } {
        return Ok(());
    }

    let meta_args = match cli.command {
        Commands::Daily(ref args) | Commands::Events(ref args) | Commands::Heatmap(ref args) => {
            &args.meta_args
        }
        Commands::Counts(ref args) => &args.meta_args,
        Commands::Usage(ref args) => &args.meta_args,
        Commands::Version => bail!("Unexpected command"),
    };

    let level = if meta_args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).try_init()?;

    let print_args = match cli.command {
        Commands::Daily(ref args) | Commands::Events(ref args) | Commands::Heatmap(ref args) => {
            &args.print_args
        }
        Commands::Counts(ref args) => &args.print_args,
        Commands::Usage(ref args) => &args.print_args,
        Commands::Version => bail!("Unexpected command"),
    };

    if let Commands::Counts(ref args) = cli.command {
        let source_args = &args.source_args;
        let path = match source_args.counts_file {
            Some(ref f) => PathBuf::from(f),
            None => {
                let course = match source_args.course {
                    Some(ref c) => c,
                    None => bail!("No course"),
                };
                nblog::counts_path(&data_path(&source_args.data_path)?, course)?
            }
        };
        log::info!("Counts log: {}", path.display());
        let report = nblog::monitor_counts(&path);
        return print_report(meta_args, print_args, &report, |out| {
            counts::print_counts(out, print_args, &report)
        });
    }

    let (source_args, learner_args) = match cli.command {
        Commands::Daily(ref args) | Commands::Events(ref args) | Commands::Heatmap(ref args) => {
            (&args.source_args, &args.learner_args)
        }
        Commands::Usage(ref args) => (&args.source_args, &args.learner_args),
        Commands::Counts(_) | Commands::Version => bail!("Unexpected command"),
    };

    // Course configuration, if specified.

    let config = if let Some(ref config_filename) = learner_args.config_file {
        Some(read_course_config(config_filename)?)
    } else {
        None
    };

    // Staff from the config and from the command line are all excluded.

    let filter = {
        let mut staff = HashSet::<String>::new();
        if let Some(ref c) = config {
            staff = c.staff_set();
        }
        for s in &learner_args.staff {
            staff.insert(s.to_string());
        }
        log::info!("Number of staff ids: {}", staff.len());
        StudentFilter::new(staff)?
    };

    let events_path = match source_args.events_file {
        Some(ref f) => PathBuf::from(f),
        None => {
            let course = match (&source_args.course, &config) {
                (Some(c), _) => c.as_str(),
                (None, Some(CourseConfig { name, .. })) => name.as_str(),
                (None, None) => bail!("No course"),
            };
            nblog::events_path(&data_path(&source_args.data_path)?, course)?
        }
    };
    log::info!("Event log: {}", events_path.display());

    match cli.command {
        Commands::Daily(_) => {
            let metrics = nblog::daily_metrics(&events_path, &filter);
            print_report(meta_args, print_args, &metrics, |out| {
                daily::print_daily(out, print_args, &metrics.daily)
            })
        }
        Commands::Events(_) => {
            let metrics = nblog::daily_metrics(&events_path, &filter);
            print_report(meta_args, print_args, &metrics, |out| {
                daily::print_events(out, print_args, &metrics.events)
            })
        }
        Commands::Usage(ref args) => {
            let grain = args
                .usage_args
                .grain
                .or(config.as_ref().and_then(|c| c.animation_grain))
                .unwrap_or_else(nblog::default_grain);
            log::info!("Animation grain: {} seconds", grain.num_seconds());
            let report = nblog::material_usage(&events_path, &filter, grain);
            print_report(meta_args, print_args, &report, |out| {
                usage::print_usage(out, print_args, &args.usage_args, &report)
            })
        }
        Commands::Heatmap(_) => {
            let report: UsageReport =
                nblog::material_usage(&events_path, &filter, nblog::default_grain());
            if format::maybe_help(&print_args.fmt, || usage::heatmap_help(&report.heatmap)) {
                return Ok(());
            }
            print_report(meta_args, print_args, &report, |out| {
                usage::print_heatmap(out, print_args, &report.heatmap)
            })
        }
        Commands::Counts(_) | Commands::Version => bail!("Unexpected command"),
    }
}

// --data-path, else $NBHOSTING_ROOT, else $HOME/nbhosting.
fn data_path(arg: &Option<String>) -> Result<PathBuf> {
    let p = if let Some(ref p) = arg {
        PathBuf::from(p)
    } else if let Ok(val) = env::var("NBHOSTING_ROOT") {
        PathBuf::from(val)
    } else if let Ok(val) = env::var("HOME") {
        Path::new(&val).join("nbhosting")
    } else {
        bail!("No data path");
    };
    log::info!("Data path: {}", p.display());
    Ok(p)
}

// Every report goes out one of three ways: as a size summary (--verbose), as a JSON dump of the
// whole report (--json), or as a table.
fn print_report<R, F>(
    meta_args: &MetaArgs,
    print_args: &PrintArgs,
    report: &R,
    table: F,
) -> Result<()>
where
    R: Serialize,
    F: FnOnce(&mut dyn io::Write) -> Result<()>,
{
    if meta_args.verbose {
        summarize(&mut io::stderr(), &serde_json::to_value(report)?, "")?;
        Ok(())
    } else if print_args.json {
        let mut out = io::stdout();
        serde_json::to_writer(&mut out, report)?;
        println!();
        Ok(())
    } else {
        table(&mut io::stdout())
    }
}

// `key -> N items` for every array in the report, recursively through objects.
fn summarize(out: &mut dyn io::Write, v: &serde_json::Value, indent: &str) -> Result<()> {
    if let serde_json::Value::Object(fields) = v {
        for (k, v) in fields {
            match v {
                serde_json::Value::Array(xs) => writeln!(out, "{indent}{k} -> {} items", xs.len())?,
                serde_json::Value::Object(_) => {
                    writeln!(out, "{indent}{k}:")?;
                    summarize(out, v, &format!("{indent}  "))?;
                }
                _ => writeln!(out, "{indent}{k} -> {v}")?,
            }
        }
    }
    Ok(())
}

#[test]
fn test_summarize() {
    let m = nblog::daily_metrics(
        Path::new("../../tests/nblog/events.raw"),
        &StudentFilter::new(HashSet::new()).unwrap(),
    );
    let mut out = Vec::new();
    summarize(&mut out, &serde_json::to_value(&m).unwrap(), "").unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(s.starts_with("daily:\n"));
    assert!(s.contains("\n  timestamps -> 3 items\n"));
    assert!(s.contains("events:\n"));
    assert!(s.contains("\n  total_students -> "));
    assert!(!s.contains("skipped"));
}
