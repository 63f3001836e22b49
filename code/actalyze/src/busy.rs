/// Busy printer: the k-active histogram.  One row per bucket: k=0..=N cores active, then the two
/// composite buckets BI>=LA and BI<LA for time when big cores sat idle while little cores worked.
///
/// The histogram is computed from the real machines' timelines and is checked against the
/// meta-machines built during reconstruction; a disagreement is reported as an error.
use crate::format;
use crate::BusyArgs;

use actlog::{read_time_stats_file, AnalysisConfig, BucketKey, Reconstruction, Ticks};
use anyhow::{bail, Result};
use log::info;
use std::collections::HashMap;
use std::io;

struct BucketRow {
    key: BucketKey,
    ticks: Ticks,
    fraction: Option<f64>,
}

pub fn print_busy(
    output: &mut dyn io::Write,
    config: &AnalysisConfig,
    args: &BusyArgs,
    rec: &Reconstruction,
) -> Result<()> {
    let (formatters, aliases) = my_formatters();
    let spec = match (&args.print_args.fmt, &args.time_stats) {
        (Some(fmt), _) => fmt.as_str(),
        (None, Some(_)) => FMT_DEFAULTS_NORMALIZED,
        (None, None) => FMT_DEFAULTS,
    };
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    if fields.contains(&"fraction") && args.time_stats.is_none() {
        bail!("The fraction field requires --time-stats")
    }

    let histogram = rec.active_histogram(config.big_machines);
    let mismatches = histogram.boost_mismatches(rec);
    if !mismatches.is_empty() {
        let (k, swept, boosted) = mismatches[0];
        bail!(
            "Internal error: {} buckets disagree with the meta-machines, first k={k}: {swept} vs {boosted}",
            mismatches.len()
        )
    }

    let fractions = if let Some(ref filename) = args.time_stats {
        let stats = read_time_stats_file(filename)?;
        info!(
            "Execution time {:.6}s, parallel {} ticks, serial {} ticks",
            stats.execution_seconds(),
            stats.parallel,
            stats.serial
        );
        Some(histogram.parallel_fractions(config.ticks_per_second, &stats))
    } else {
        None
    };

    let rows = histogram
        .entries()
        .into_iter()
        .enumerate()
        .map(|(i, (key, ticks))| BucketRow {
            key,
            ticks,
            fraction: fractions.as_ref().map(|f| f[i].1),
        })
        .collect::<Vec<_>>();

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

const FMT_DEFAULTS: &str = "bucket,seconds";
const FMT_DEFAULTS_NORMALIZED: &str = "bucket,seconds,fraction";

type Ctx = f64;

fn my_formatters() -> (format::Formatters<BucketRow, Ctx>, format::Aliases) {
    let mut formatters: format::Formatters<BucketRow, Ctx> = HashMap::new();
    let mut aliases: format::Aliases = HashMap::new();
    formatters.insert("bucket", &format_bucket);
    formatters.insert("k", &format_bucket);
    formatters.insert("ticks", &format_ticks);
    formatters.insert("seconds", &format_seconds);
    formatters.insert("fraction", &format_fraction);

    aliases.insert("all", vec!["bucket", "ticks", "seconds", "fraction"]);

    (formatters, aliases)
}

fn format_bucket(d: &BucketRow, _: Ctx) -> String {
    d.key.to_string()
}

fn format_ticks(d: &BucketRow, _: Ctx) -> String {
    d.ticks.to_string()
}

fn format_seconds(d: &BucketRow, ticks_per_second: Ctx) -> String {
    format!("{:.9}", d.ticks as f64 / ticks_per_second)
}

fn format_fraction(d: &BucketRow, _: Ctx) -> String {
    d.fraction.map(|f| format!("{f:.4}")).unwrap_or_default()
}

#[cfg(test)]
fn busy_args(fmt: &str) -> BusyArgs {
    BusyArgs {
        source_args: Default::default(),
        big: None,
        time_stats: None,
        print_args: crate::PrintArgs {
            fmt: Some(fmt.to_string()),
        },
        meta_args: Default::default(),
    }
}

#[test]
fn test_fraction_needs_time_stats() {
    use actlog::{reconstruct, ActivityPalette, Event, EventKind, EventStream};

    let s = EventStream {
        start: Event::new(0, EventKind::StreamStart { machine_count: 2 }),
        events: vec![Event::new(
            10,
            EventKind::StateChange {
                machine: 1,
                active: true,
            },
        )],
        end: Event::new(20, EventKind::StreamEnd),
        big_machines: None,
    };
    let rec = reconstruct(&s, &ActivityPalette::conventional(), 2).unwrap();
    let config = AnalysisConfig::default();

    let mut out: Vec<u8> = vec![];
    print_busy(&mut out, &config, &busy_args("bucket,ticks,csv"), &rec).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "0,0\n1,10\n2,10\nBI>=LA,0\nBI<LA,0\n"
    );

    // "all" includes the fraction field.
    assert!(print_busy(&mut io::sink(), &config, &busy_args("all"), &rec).is_err());
    assert!(print_busy(&mut io::sink(), &config, &busy_args("fraction"), &rec).is_err());
}
