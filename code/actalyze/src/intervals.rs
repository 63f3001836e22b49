/// Intervals printer.  One row per interval per machine, machines in order (real machines, then
/// the meta-machines), intervals in time order.
use crate::format;
use crate::IntervalArgs;

use actlog::{AnalysisConfig, Label, Reconstruction, Ticks};
use anyhow::Result;
use std::collections::HashMap;
use std::io;

struct IntervalRow {
    machine: String,
    index: usize,
    start: Ticks,
    duration: Ticks,
    label: Label,
}

pub fn print_intervals(
    output: &mut dyn io::Write,
    config: &AnalysisConfig,
    args: &IntervalArgs,
    rec: &Reconstruction,
) -> Result<()> {
    let (formatters, aliases) = my_formatters();
    let spec = args.print_args.fmt.as_deref().unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);

    let mut rows = vec![];
    for (seq, name) in rec.sequences().zip(rec.names()) {
        let intervals = if args.padding {
            seq.intervals()
        } else {
            seq.significant()
        };
        let mut start = 0;
        for (index, iv) in intervals.iter().enumerate() {
            rows.push(IntervalRow {
                machine: name.clone(),
                index,
                start,
                duration: iv.duration,
                label: iv.label,
            });
            start += iv.duration;
        }
    }

    format::format_data(
        output,
        &fields,
        &formatters,
        &opts,
        &rows,
        config.ticks_per_second,
    )
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help::new(&formatters, &aliases, FMT_DEFAULTS)
}

const FMT_DEFAULTS: &str = "machine,start,duration,label";

type Ctx = f64;

fn my_formatters() -> (format::Formatters<IntervalRow, Ctx>, format::Aliases) {
    let mut formatters: format::Formatters<IntervalRow, Ctx> = HashMap::new();
    let mut aliases: format::Aliases = HashMap::new();
    formatters.insert("machine", &format_machine);
    formatters.insert("index", &format_index);
    formatters.insert("start", &format_start);
    formatters.insert("end", &format_end);
    formatters.insert("duration", &format_duration);
    formatters.insert("label", &format_label);
    formatters.insert("seconds", &format_seconds);

    aliases.insert(
        "all",
        vec!["machine", "index", "start", "end", "duration", "seconds", "label"],
    );

    (formatters, aliases)
}

fn format_machine(d: &IntervalRow, _: Ctx) -> String {
    d.machine.clone()
}

fn format_index(d: &IntervalRow, _: Ctx) -> String {
    d.index.to_string()
}

fn format_start(d: &IntervalRow, _: Ctx) -> String {
    d.start.to_string()
}

fn format_end(d: &IntervalRow, _: Ctx) -> String {
    (d.start + d.duration).to_string()
}

fn format_duration(d: &IntervalRow, _: Ctx) -> String {
    d.duration.to_string()
}

fn format_label(d: &IntervalRow, _: Ctx) -> String {
    d.label.to_string()
}

fn format_seconds(d: &IntervalRow, ticks_per_second: Ctx) -> String {
    format!("{:.9}", d.duration as f64 / ticks_per_second)
}
