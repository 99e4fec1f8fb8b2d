/// Generic formatting code for a set of rows extracted from a report, to be presented columnar, as
/// csv, as awk input, or as json, and (except for json and awk) with or without a header and with
/// or without named fields.
///
/// The rows are whatever the caller wants them to be (usually an index into the report's parallel
/// columns), and the formatters are looked up by field name and applied to each row with a shared
/// context.  Some reports have columns that are only known at run time (one per notebook, say), so
/// formatters may be boxed closures as well as plain functions.
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::io;

pub struct Help {
    pub fields: Vec<String>,
    pub aliases: Vec<(String, Vec<String>)>,
    pub defaults: String,
}

/// The string a formatter returns for a value that is absent.  With `nodefaults`, csv, awk and json
/// output omit the field altogether.

pub const NO_VALUE: &str = "-";

pub fn maybe_help<F>(fmt: &Option<String>, f: F) -> bool
where
    F: Fn() -> Help,
{
    if let Some(ref s) = fmt {
        if s.starts_with("help") {
            let mut help = f();
            println!("Syntax:\n  --fmt=(field|alias|control),...");
            println!("\nFields:");
            help.fields.sort();
            for f in help.fields {
                println!("  {f}");
            }
            if !help.aliases.is_empty() {
                println!("\nAliases:");
                help.aliases.sort();
                for (name, fields) in help.aliases {
                    let explication = fields.join(",");
                    println!("  {name} --> {explication}");
                }
            }
            println!("\nDefaults:\n  {}", help.defaults);
            println!("\nControl:\n  awk\n  csv\n  csvnamed\n  fixed\n  json\n  header\n  nodefaults\n  noheader\n  tag:<tagvalue>");
            return true;
        }
    }
    false
}

/// Build the help text from a formatter table.  Alias expansions are listed in the order they
/// expand, which for the report-defined aliases is column order.

pub fn make_help<FmtT>(
    formatters: &HashMap<String, FmtT>,
    aliases: &HashMap<String, Vec<String>>,
    defaults: &str,
) -> Help {
    Help {
        fields: formatters.keys().cloned().collect::<Vec<String>>(),
        aliases: aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<(String, Vec<String>)>>(),
        defaults: defaults.to_string(),
    }
}

/// Return a vector of the known fields in `spec` wrt the formatters, and a HashSet of any other
/// strings found in `spec`.  It returns an error if zero output fields were selected.

pub fn parse_fields<'a, DataT, FmtT, CtxT>(
    spec: &'a str,
    formatters: &HashMap<String, FmtT>,
    aliases: &'a HashMap<String, Vec<String>>,
) -> Result<(Vec<&'a str>, HashSet<&'a str>)>
where
    FmtT: Fn(&DataT, CtxT) -> String,
    CtxT: Copy,
{
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if formatters.contains_key(x) {
            fields.push(x);
        } else if let Some(aliases) = aliases.get(x) {
            for alias in aliases {
                if formatters.contains_key(alias) {
                    fields.push(alias.as_ref());
                } else {
                    others.insert(alias.as_ref());
                }
            }
        } else {
            others.insert(x);
        }
    }
    if fields.is_empty() {
        bail!("No output fields were selected")
    }
    Ok((fields, others))
}

pub struct FormatOptions {
    pub tag: Option<String>,
    pub json: bool,       // json explicitly requested
    pub csv: bool,        // csv or csvnamed explicitly requested
    pub awk: bool,        // awk explicitly requested
    pub named: bool,      // csvnamed explicitly requested
    pub header: bool,     // true if nothing requested b/c fixed+header is default
    pub nodefaults: bool, // if true and the string returned is NO_VALUE and the
                          //   mode is not fixed then print nothing
    // Column titles for fields whose name is not what should be printed.
    pub labels: HashMap<String, String>,
}

impl FormatOptions {
    /// True if the output is the default columnar table.

    pub fn is_table(&self) -> bool {
        !self.csv && !self.json && !self.awk
    }
}

// `fixed` is accepted but needs no flag, it is what you get when nothing else is requested.

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let csvnamed = others.contains("csvnamed");
    let csv = others.contains("csv") || csvnamed;
    let json = others.contains("json") && !csv;
    let awk = others.contains("awk") && !csv && !json;
    let nodefaults = others.contains("nodefaults");
    // json and awk get no header, even if one is requested
    let header = (!csv && !json && !awk && !others.contains("noheader"))
        || (csv && others.contains("header"));
    let tag = others
        .iter()
        .find_map(|x| x.strip_prefix("tag:"))
        .map(|t| t.to_string());
    FormatOptions {
        csv,
        json,
        awk,
        header,
        tag,
        named: csvnamed,
        nodefaults,
        labels: HashMap::new(),
    }
}

// One output column: its title and a formatted value per row.  The tag, if any, is just another
// column at the end.

struct Column {
    label: String,
    values: Vec<String>,
    omissible: bool,
}

impl Column {
    fn shows(&self, row: usize, opts: &FormatOptions) -> bool {
        !(opts.nodefaults && self.omissible && self.values[row] == NO_VALUE)
    }
}

/// The `fields` are the names of formatting functions to get from the `formatters`, these are
/// applied to the `data`.  Set `opts.header` to true to print a first row with field names (or
/// their `opts.labels`) as a header (independent of csv).  Set `opts.csv` to true to get CSV output
/// instead of fixed-format.  Set `opts.tag` to Some(s) to print a tag=s field in the output.
///
/// Write errors on the fixed-format output are ignored, they are common for broken pipelines.

pub fn format_data<'a, DataT, FmtT, CtxT>(
    output: &mut dyn io::Write,
    fields: &[&'a str],
    formatters: &HashMap<String, FmtT>,
    opts: &FormatOptions,
    data: Vec<DataT>,
    ctx: CtxT,
) -> Result<()>
where
    FmtT: Fn(&DataT, CtxT) -> String,
    CtxT: Copy,
{
    let mut columns = Vec::with_capacity(fields.len() + 1);
    for kwd in fields {
        let f = match formatters.get(*kwd) {
            Some(f) => f,
            None => bail!("Unknown field '{kwd}'"),
        };
        columns.push(Column {
            label: opts.labels.get(*kwd).cloned().unwrap_or_else(|| kwd.to_string()),
            values: data.iter().map(|x| f(x, ctx)).collect(),
            omissible: true,
        });
    }
    if let Some(ref tag) = opts.tag {
        columns.push(Column {
            label: "tag".to_string(),
            values: vec![tag.clone(); data.len()],
            omissible: false,
        });
    }

    let nrows = data.len();
    if opts.csv {
        format_csv(output, opts, &columns, nrows)
    } else if opts.json {
        format_json(output, opts, &columns, nrows)
    } else if opts.awk {
        format_awk(output, opts, &columns, nrows)
    } else {
        format_fixed_width(output, opts, &columns, nrows);
        Ok(())
    }
}

// Each column is as wide as its widest entry, header included if there is one.

fn format_fixed_width(
    output: &mut dyn io::Write,
    opts: &FormatOptions,
    columns: &[Column],
    nrows: usize,
) {
    let widths = columns
        .iter()
        .map(|c| {
            let w = c.values.iter().map(|v| v.len()).max().unwrap_or(0);
            if opts.header {
                usize::max(w, c.label.len())
            } else {
                w
            }
        })
        .collect::<Vec<usize>>();

    if opts.header {
        let line = padded(columns.iter().map(|c| c.label.as_str()), &widths);
        let _ = writeln!(output, "{line}");
    }
    for row in 0..nrows {
        let line = padded(columns.iter().map(|c| c.values[row].as_str()), &widths);
        let _ = writeln!(output, "{line}");
    }
}

fn padded<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let mut s = String::new();
    for (cell, w) in cells.zip(widths) {
        let w = *w;
        s += format!("{cell:w$}  ").as_str();
    }
    s.trim_end().to_string()
}

fn format_csv(
    output: &mut dyn io::Write,
    opts: &FormatOptions,
    columns: &[Column],
    nrows: usize,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);

    if opts.header {
        writer.write_record(columns.iter().map(|c| c.label.as_str()))?;
    }
    for row in 0..nrows {
        let record = columns
            .iter()
            .filter(|c| c.shows(row, opts))
            .map(|c| {
                if opts.named {
                    format!("{}={}", c.label, c.values[row])
                } else {
                    c.values[row].clone()
                }
            })
            .collect::<Vec<String>>();
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

fn format_json(
    output: &mut dyn io::Write,
    opts: &FormatOptions,
    columns: &[Column],
    nrows: usize,
) -> Result<()> {
    let mut objects = vec![];
    for row in 0..nrows {
        let mut obj = json::JsonValue::new_object();
        for c in columns.iter().filter(|c| c.shows(row, opts)) {
            obj[c.label.as_str()] = c.values[row].clone().into();
        }
        objects.push(obj);
    }
    writeln!(output, "{}", json::stringify(objects))?;
    Ok(())
}

// awk output: fields are space-separated and spaces are not allowed within fields, they
// are replaced by `_`.

fn format_awk(
    output: &mut dyn io::Write,
    opts: &FormatOptions,
    columns: &[Column],
    nrows: usize,
) -> Result<()> {
    for row in 0..nrows {
        let line = columns
            .iter()
            .filter(|c| c.shows(row, opts))
            .map(|c| c.values[row].replace(' ', "_"))
            .collect::<Vec<String>>()
            .join(" ");
        writeln!(output, "{line}")?;
    }
    Ok(())
}

#[cfg(test)]
type TestCtx<'a> = &'a [(&'a str, i64)];

#[cfg(test)]
fn format_test_name(i: &usize, ctx: TestCtx) -> String {
    ctx[*i].0.to_string()
}

#[cfg(test)]
fn format_test_value(i: &usize, ctx: TestCtx) -> String {
    if ctx[*i].1 < 0 {
        NO_VALUE.to_string()
    } else {
        ctx[*i].1.to_string()
    }
}

#[cfg(test)]
fn test_formatters() -> (
    HashMap<String, &'static dyn Fn(&usize, TestCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(&usize, TestCtx) -> String> =
        HashMap::new();
    formatters.insert("name".to_string(), &format_test_name);
    formatters.insert("value".to_string(), &format_test_value);
    let mut aliases = HashMap::new();
    aliases.insert(
        "all".to_string(),
        vec!["name".to_string(), "value".to_string()],
    );
    (formatters, aliases)
}

#[cfg(test)]
fn run_format(spec: &str) -> String {
    let rows: TestCtx = &[("a b", 1), ("c", -1), ("long name", 300)];
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields(spec, &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::new();
    format_data(&mut out, &fields, &formatters, &opts, vec![0, 1, 2], rows).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_parse_fields() {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields("all,csv,tag:x", &formatters, &aliases).unwrap();
    assert!(fields == vec!["name", "value"]);
    assert!(others.contains("csv") && others.contains("tag:x"));
    assert!(parse_fields("csv,header", &formatters, &aliases).is_err());
}

#[test]
fn test_format_fixed() {
    assert!(run_format("name,value") == "name       value\na b        1\nc          -\nlong name  300\n");
    assert!(run_format("value,noheader") == "1\n-\n300\n");
}

#[test]
fn test_format_csv() {
    assert!(run_format("name,value,csv") == "a b,1\nc,-\nlong name,300\n");
    assert!(run_format("value,csvnamed,nodefaults,tag:t") == "value=1,tag=t\ntag=t\nvalue=300,tag=t\n");
    assert!(run_format("value,csv,header") == "value\n1\n-\n300\n");
}

#[test]
fn test_format_awk_json() {
    assert!(run_format("name,value,awk") == "a_b 1\nc -\nlong_name 300\n");
    assert!(
        run_format("value,json,nodefaults")
            == "[{\"value\":\"1\"},{},{\"value\":\"300\"}]\n"
    );
}

#[test]
fn test_format_labels() {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields("name,value,csv,header", &formatters, &aliases).unwrap();
    let mut opts = standard_options(&others);
    opts.labels.insert("value".to_string(), "the value".to_string());
    let rows: TestCtx = &[("x", 2)];
    let mut out = Vec::new();
    format_data(&mut out, &fields, &formatters, &opts, vec![0], rows).unwrap();
    assert!(String::from_utf8(out).unwrap() == "name,the value\nx,2\n");
}

#[test]
fn test_format_tag() {
    assert!(run_format("value,tag:t") == "value  tag\n1      t\n-      t\n300    t\n");
    assert!(run_format("value,awk,nodefaults,tag:t") == "1 t\nt\n300 t\n");
}
