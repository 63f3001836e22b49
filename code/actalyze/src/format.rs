/// Generic formatting code for a table of rows extracted from the analysis results, to be presented
/// columnar, as csv, as json, or for awk, and (except for json and awk) with or without a header.
///
/// A report defines a table of named *formatters*, each of which turns one row into one string,
/// plus *aliases* that expand to lists of formatter names.  The user's `--fmt` spec is a
/// comma-separated list of formatter names, aliases, and *controls* that select the output form.
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::io;

pub type Formatters<DataT, CtxT> = HashMap<&'static str, &'static dyn Fn(&DataT, CtxT) -> String>;
pub type Aliases = HashMap<&'static str, Vec<&'static str>>;

pub struct Help {
    pub fields: Vec<&'static str>,
    pub aliases: Vec<(&'static str, Vec<&'static str>)>,
    pub defaults: &'static str,
}

impl Help {
    pub fn new<DataT, CtxT>(
        formatters: &Formatters<DataT, CtxT>,
        aliases: &Aliases,
        defaults: &'static str,
    ) -> Help {
        Help {
            fields: formatters.keys().copied().collect(),
            aliases: aliases.iter().map(|(k, v)| (*k, v.clone())).collect(),
            defaults,
        }
    }
}

/// If the spec asks for help, print it and return true.
pub fn maybe_help<F>(fmt: &Option<String>, f: F) -> bool
where
    F: Fn() -> Help,
{
    match fmt {
        Some(s) if s.starts_with("help") => {
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
                for (name, mut fields) in help.aliases {
                    fields.sort();
                    println!("  {name} --> {}", fields.join(","));
                }
            }
            println!("\nDefaults:\n  {}", help.defaults);
            println!("\nControl:\n  awk\n  csv\n  csvnamed\n  fixed\n  json\n  header\n  noheader\n  tag:<tagvalue>");
            true
        }
        _ => false,
    }
}

/// Return the known fields in `spec` wrt the formatters, in order, and the set of other words in
/// `spec`.  It is an error if no output fields were selected.
pub fn parse_fields<'a, DataT, CtxT>(
    spec: &'a str,
    formatters: &Formatters<DataT, CtxT>,
    aliases: &Aliases,
) -> Result<(Vec<&'static str>, HashSet<&'a str>)> {
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if let Some((name, _)) = formatters.get_key_value(x) {
            fields.push(*name);
        } else if let Some(expansion) = aliases.get(x) {
            for name in expansion {
                if formatters.contains_key(name) {
                    fields.push(*name);
                }
            }
        } else if !x.is_empty() {
            others.insert(x);
        }
    }
    if fields.is_empty() {
        bail!("No output fields were selected")
    }
    Ok((fields, others))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatOptions {
    pub tag: Option<String>,
    pub json: bool,   // json explicitly requested
    pub csv: bool,    // csv or csvnamed explicitly requested
    pub awk: bool,    // awk explicitly requested
    pub fixed: bool,  // fixed output explicitly requested
    pub named: bool,  // csvnamed explicitly requested
    pub header: bool, // true if nothing requested b/c fixed+header is default
}

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let named = others.contains("csvnamed");
    let csv = others.contains("csv") || named;
    let json = others.contains("json") && !csv;
    let awk = others.contains("awk") && !csv && !json;
    let fixed = others.contains("fixed") && !csv && !json && !awk;
    // json and awk get no header, even if one is requested
    let header =
        (!csv && !json && !awk && !others.contains("noheader")) || (csv && others.contains("header"));
    let tag = others
        .iter()
        .find_map(|x| x.strip_prefix("tag:"))
        .map(|t| t.to_string());
    FormatOptions {
        tag,
        json,
        csv,
        awk,
        fixed,
        named,
        header,
    }
}

/// Apply the formatters named by `fields` to each row of `data` and print the result in the form
/// selected by `opts`.
pub fn format_data<DataT, CtxT>(
    output: &mut dyn io::Write,
    fields: &[&str],
    formatters: &Formatters<DataT, CtxT>,
    opts: &FormatOptions,
    data: &[DataT],
    ctx: CtxT,
) -> Result<()>
where
    CtxT: Copy,
{
    let fmts = fields
        .iter()
        .map(|kwd| match formatters.get(*kwd) {
            Some(f) => Ok(*f),
            None => bail!("Unknown field '{kwd}'"),
        })
        .collect::<Result<Vec<_>>>()?;
    let rows = data
        .iter()
        .map(|x| fmts.iter().map(|f| f(x, ctx)).collect::<Vec<String>>())
        .collect::<Vec<_>>();

    if opts.csv {
        format_csv(output, fields, opts, rows)
    } else if opts.json {
        format_json(output, fields, opts, rows)
    } else if opts.awk {
        format_awk(output, opts, rows);
        Ok(())
    } else {
        format_fixed_width(output, fields, opts, rows);
        Ok(())
    }
}

fn format_fixed_width(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: Vec<Vec<String>>,
) {
    // The column width is the max across all the entries in the column (including header, if
    // present).  If there's a tag, it is printed in the last column.
    let mut widths = vec![0; fields.len()];
    if opts.header {
        for (w, kwd) in widths.iter_mut().zip(fields) {
            *w = kwd.len();
        }
    }
    for row in &rows {
        for (w, val) in widths.iter_mut().zip(row) {
            *w = usize::max(*w, val.len());
        }
    }

    let mut emit = |vals: Vec<&str>, tag: Option<&str>| {
        let mut s = String::new();
        for (val, w) in vals.into_iter().zip(widths.iter().copied()) {
            s += &format!("{val:w$}  ");
        }
        if let Some(tag) = tag {
            s += tag;
        }
        // Ignore errors here, they are common for broken pipelines
        let _ = output.write_all(s.trim_end().as_bytes());
        let _ = output.write_all(b"\n");
    };

    if opts.header {
        emit(fields.to_vec(), opts.tag.as_ref().map(|_| "tag"));
    }
    for row in &rows {
        emit(row.iter().map(String::as_str).collect(), opts.tag.as_deref());
    }
}

fn format_csv(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: Vec<Vec<String>>,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);

    if opts.header {
        let mut out_fields = fields.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        if opts.tag.is_some() {
            out_fields.push("tag".to_string());
        }
        writer.write_record(out_fields)?;
    }

    for row in rows {
        let mut out_fields = if opts.named {
            fields
                .iter()
                .zip(row)
                .map(|(kwd, val)| format!("{kwd}={val}"))
                .collect::<Vec<_>>()
        } else {
            row
        };
        if let Some(ref tag) = opts.tag {
            if opts.named {
                out_fields.push(format!("tag={tag}"));
            } else {
                out_fields.push(tag.clone());
            }
        }
        writer.write_record(out_fields)?;
    }

    writer.flush()?;
    Ok(())
}

fn format_json(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: Vec<Vec<String>>,
) -> Result<()> {
    let mut objects = vec![];
    for row in rows {
        let mut obj = json::JsonValue::new_object();
        for (kwd, val) in fields.iter().zip(row) {
            obj[*kwd] = val.into();
        }
        if let Some(ref tag) = opts.tag {
            obj["tag"] = tag.as_str().into();
        }
        objects.push(obj);
    }
    output.write_all(json::stringify(objects).as_bytes())?;
    Ok(())
}

// awk output: fields are space-separated and spaces are not allowed within fields, they are
// replaced by `_`.

fn format_awk(output: &mut dyn io::Write, opts: &FormatOptions, rows: Vec<Vec<String>>) {
    for row in rows {
        let mut line = row
            .iter()
            .map(|val| val.replace(' ', "_"))
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(ref tag) = opts.tag {
            if !line.is_empty() {
                line += " ";
            }
            line += tag;
        }
        line += "\n";
        let _ = output.write_all(line.as_bytes());
    }
}

#[cfg(test)]
type TestRow = (u32, &'static str);

#[cfg(test)]
fn format_n(d: &TestRow, _: ()) -> String {
    d.0.to_string()
}

#[cfg(test)]
fn format_name(d: &TestRow, _: ()) -> String {
    d.1.to_string()
}

#[cfg(test)]
fn test_table() -> (Formatters<TestRow, ()>, Aliases) {
    let mut formatters: Formatters<TestRow, ()> = HashMap::new();
    formatters.insert("n", &format_n);
    formatters.insert("name", &format_name);
    let mut aliases: Aliases = HashMap::new();
    aliases.insert("all", vec!["n", "name"]);
    (formatters, aliases)
}

#[cfg(test)]
fn render(spec: &str) -> String {
    let (formatters, aliases) = test_table();
    let (fields, others) = parse_fields(spec, &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = vec![];
    let data = [(1, "one thing"), (22, "two")];
    format_data(&mut out, &fields, &formatters, &opts, &data, ()).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_format_fixed() {
    assert_eq!(render("all"), "n   name\n1   one thing\n22  two\n");
    assert_eq!(render("name,noheader,tag:x"), "one thing  x\ntwo        x\n");
}

#[test]
fn test_format_other() {
    assert_eq!(render("n,name,csv"), "1,one thing\n22,two\n");
    assert_eq!(render("n,csvnamed,header"), "n\nn=1\nn=22\n");
    assert_eq!(render("all,awk"), "1 one_thing\n22 two\n");
    assert_eq!(
        render("name,json"),
        r#"[{"name":"one thing"},{"name":"two"}]"#
    );
}

#[test]
fn test_format_errors() {
    let (formatters, aliases) = test_table();
    assert!(parse_fields("csv,noheader", &formatters, &aliases).is_err());
    assert!(!maybe_help(&Some("n".to_string()), || Help::new(
        &formatters,
        &aliases,
        "n"
    )));
}
