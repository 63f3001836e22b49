/// Occupancy printer.  One row per (machine, label) with the fraction of the region of interest the
/// machine spent with that label, machines in order and labels in label order.
use crate::format;
use crate::PrintArgs;

use actlog::{active_percent, occupancy_ratios, AnalysisConfig, Label, Reconstruction, Ticks};
use anyhow::Result;
use std::collections::HashMap;
use std::io;

struct OccupancyRow {
    machine: String,
    label: Label,
    time: Ticks,
    ratio: f64,
    active_pct: u32,
}

pub fn print_occupancy(
    output: &mut dyn io::Write,
    config: &AnalysisConfig,
    print_args: &PrintArgs,
    rec: &Reconstruction,
) -> Result<()> {
    let (formatters, aliases) = my_formatters();
    let spec = print_args.fmt.as_deref().unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);

    let mut rows = vec![];
    for (seq, name) in rec.sequences().zip(rec.names()) {
        let times = seq.durations_by_label();
        let active_pct = active_percent(seq);
        for (label, ratio) in occupancy_ratios(seq, rec.duration) {
            rows.push(OccupancyRow {
                machine: name.clone(),
                label,
                time: times.get(&label).copied().unwrap_or(0),
                ratio,
                active_pct,
            });
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

const FMT_DEFAULTS: &str = "machine,label,ratio";

type Ctx = f64;

fn my_formatters() -> (format::Formatters<OccupancyRow, Ctx>, format::Aliases) {
    let mut formatters: format::Formatters<OccupancyRow, Ctx> = HashMap::new();
    let mut aliases: format::Aliases = HashMap::new();
    formatters.insert("machine", &format_machine);
    formatters.insert("label", &format_label);
    formatters.insert("time", &format_time);
    formatters.insert("seconds", &format_seconds);
    formatters.insert("ratio", &format_ratio);
    formatters.insert("pct", &format_pct);
    formatters.insert("active_pct", &format_active_pct);

    aliases.insert(
        "all",
        vec!["machine", "label", "time", "seconds", "ratio", "active_pct"],
    );

    (formatters, aliases)
}

fn format_machine(d: &OccupancyRow, _: Ctx) -> String {
    d.machine.clone()
}

fn format_label(d: &OccupancyRow, _: Ctx) -> String {
    d.label.to_string()
}

fn format_time(d: &OccupancyRow, _: Ctx) -> String {
    d.time.to_string()
}

fn format_seconds(d: &OccupancyRow, ticks_per_second: Ctx) -> String {
    format!("{:.9}", d.time as f64 / ticks_per_second)
}

fn format_ratio(d: &OccupancyRow, _: Ctx) -> String {
    format!("{:.4}", d.ratio)
}

fn format_pct(d: &OccupancyRow, _: Ctx) -> String {
    format!("{:.1}", d.ratio * 100.0)
}

// Per machine, not per label.

fn format_active_pct(d: &OccupancyRow, _: Ctx) -> String {
    d.active_pct.to_string()
}
