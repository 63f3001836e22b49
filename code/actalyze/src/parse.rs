use crate::format;
use crate::PrintArgs;

use actlog::{Event, EventKind, EventStream};
use anyhow::Result;
use std::collections::HashMap;
use std::io;

/// Print the region of interest, start and end markers included, one event per row.  The default
/// form is headerless csv, which is also the form other tools consume.
pub fn print_events(
    output: &mut dyn io::Write,
    print_args: &PrintArgs,
    stream: &EventStream,
) -> Result<()> {
    let (formatters, aliases) = my_formatters();
    let spec = print_args.fmt.as_deref().unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let mut opts = format::standard_options(&others);
    if !opts.fixed && !opts.csv && !opts.json && !opts.awk {
        opts.csv = true;
        opts.header = others.contains("header");
    }

    let events = std::iter::once(&stream.start)
        .chain(stream.events.iter())
        .chain(std::iter::once(&stream.end))
        .cloned()
        .collect::<Vec<Event>>();
    format::format_data(output, &fields, &formatters, &opts, &events, ())
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help::new(&formatters, &aliases, FMT_DEFAULTS)
}

const FMT_DEFAULTS: &str = "time,kind,cpu,state";

fn my_formatters() -> (format::Formatters<Event, ()>, format::Aliases) {
    let mut formatters: format::Formatters<Event, ()> = HashMap::new();
    let mut aliases: format::Aliases = HashMap::new();
    formatters.insert("line", &format_line);
    formatters.insert("time", &format_time);
    formatters.insert("kind", &format_kind);
    formatters.insert("cpu", &format_cpu);
    formatters.insert("state", &format_state);
    formatters.insert("active", &format_active);
    formatters.insert("oldmode", &format_oldmode);
    formatters.insert("newmode", &format_newmode);
    formatters.insert("cpus", &format_cpus);

    aliases.insert(
        "all",
        vec![
            "line", "time", "kind", "cpu", "cpus", "active", "oldmode", "newmode",
        ],
    );
    aliases.insert("dvfs", vec!["time", "cpu", "oldmode", "newmode"]);

    (formatters, aliases)
}

fn format_line(d: &Event, _: ()) -> String {
    d.line.to_string()
}

fn format_time(d: &Event, _: ()) -> String {
    d.timestamp.to_string()
}

fn format_kind(d: &Event, _: ()) -> String {
    match d.kind {
        EventKind::StreamStart { .. } => "start",
        EventKind::StreamEnd => "end",
        EventKind::StateChange { .. } => "state",
        EventKind::ModeChange { .. } => "mode",
    }
    .to_string()
}

fn format_cpu(d: &Event, _: ()) -> String {
    d.machine().map(|m| m.to_string()).unwrap_or_default()
}

// The new state in whatever form the event has: ACTIVE/INACTIVE or the raw new mode.

fn format_state(d: &Event, _: ()) -> String {
    match d.kind {
        EventKind::StateChange { active, .. } => {
            if active { "ACTIVE" } else { "INACTIVE" }.to_string()
        }
        EventKind::ModeChange { new_mode, .. } => new_mode.to_string(),
        _ => "".to_string(),
    }
}

fn format_active(d: &Event, _: ()) -> String {
    match d.kind {
        EventKind::StateChange { active, .. } => (active as u8).to_string(),
        _ => "".to_string(),
    }
}

fn format_oldmode(d: &Event, _: ()) -> String {
    match d.kind {
        EventKind::ModeChange { old_mode, .. } => old_mode.to_string(),
        _ => "".to_string(),
    }
}

fn format_newmode(d: &Event, _: ()) -> String {
    match d.kind {
        EventKind::ModeChange { new_mode, .. } => new_mode.to_string(),
        _ => "".to_string(),
    }
}

fn format_cpus(d: &Event, _: ()) -> String {
    match d.kind {
        EventKind::StreamStart { machine_count } => machine_count.to_string(),
        _ => "".to_string(),
    }
}
