/// `actalyze` -- Analyze gem5 core activity logs
///
/// Run with --help for brief help.
///
/// Every command reads one log file (or, for the analysis commands, a dataset cache produced by an
/// earlier `intervals --dump`), reconstructs what it needs, and prints a report whose fields and
/// form are selected by --fmt.  Use --fmt=help with any command to list the fields.
///
/// Settings are taken from the analysis configuration file (--config-file) if there is one, and
/// command line switches override those settings.
mod busy;
mod format;
mod intervals;
mod occupancy;
mod parse;

use actlog::{
    parse_logfile, read_analysis_config, reconstruct, ActivityPalette, AnalysisConfig, Dataset,
    DvfsPalette, EventStream, Hook, HookKind, ModePalette, ParseOptions, Reconstruction, TimeBase,
};
use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use std::io;
use std::path;
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the events decoded from the region of interest
    Parse(ParseArgs),

    /// Print the reconstructed per-core timelines, and optionally dump them to a dataset cache
    Intervals(IntervalArgs),

    /// Print the fraction of time each core spent in each state
    Occupancy(OccupancyArgs),

    /// Print how long exactly k cores were active, for all k
    Busy(BusyArgs),

    /// Print information about the program
    Version,
}

#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// Log file to read (the simulator's stdout)
    pub logfile: Option<String>,

    /// Read timelines from this dataset cache instead of from a log
    #[arg(long, value_name = "FILENAME", conflicts_with = "logfile")]
    pub load: Option<String>,

    /// Application name in the dataset cache [default: log file name without extension]
    #[arg(long)]
    pub app: Option<String>,

    /// Track DVFS modes rather than core activity
    #[arg(long, default_value_t = false)]
    pub dvfs: bool,

    /// Tag of the records to track [default: ACTIVITY_STAT, or DVFS_STAT with --dvfs]
    #[arg(long)]
    pub hook: Option<String>,

    /// Read cycle timestamps rather than tick timestamps
    #[arg(long, default_value_t = false)]
    pub cycles: bool,

    /// Analysis configuration file, see actlog/src/configs.rs for the format
    #[arg(long, value_name = "FILENAME")]
    pub config_file: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct PrintArgs {
    /// Select fields and format for the output [use --fmt=help for more information]
    #[arg(long)]
    pub fmt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct MetaArgs {
    /// Print diagnostics about the input to stderr (RUST_LOG overrides)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    #[command(flatten)]
    pub source_args: SourceArgs,

    #[command(flatten)]
    pub print_args: PrintArgs,

    #[command(flatten)]
    pub meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct IntervalArgs {
    #[command(flatten)]
    pub source_args: SourceArgs,

    /// Also build this many "exactly k cores active" meta-machines
    #[arg(long, conflicts_with = "load")]
    pub boost: Option<usize>,

    /// Add the timelines to this dataset cache, creating it if necessary
    #[arg(long, value_name = "FILENAME")]
    pub dump: Option<String>,

    /// Include the zero-length padding at the end of each timeline
    #[arg(long, default_value_t = false)]
    pub padding: bool,

    #[command(flatten)]
    pub print_args: PrintArgs,

    #[command(flatten)]
    pub meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct OccupancyArgs {
    #[command(flatten)]
    pub source_args: SourceArgs,

    #[command(flatten)]
    pub print_args: PrintArgs,

    #[command(flatten)]
    pub meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct BusyArgs {
    #[command(flatten)]
    pub source_args: SourceArgs,

    /// Number of big cores, which are numbered first [default: from the log, or 1]
    #[arg(long)]
    pub big: Option<usize>,

    /// Time statistics for the run, for normalizing to parallel time
    #[arg(long, value_name = "FILENAME")]
    pub time_stats: Option<String>,

    #[command(flatten)]
    pub print_args: PrintArgs,

    #[command(flatten)]
    pub meta_args: MetaArgs,
}

fn main() {
    match actalyze() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {msg}");
            process::exit(1);
        }
    }
}

fn actalyze() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        // Syntax:
        //  - components of the version string are space-separated but there are spaces nowhere else
        //  - the keyword "actalyze" is always the first component
        //  - every component is keyword(value)
        //  - "version" carries a semver
        //  - "features" carries a comma-separated list of supported analyses
        println!(
            "actalyze version({}) features(dvfs,boost,dataset,time_stats)",
            env!("CARGO_PKG_VERSION")
        );
        return Ok(());
    }

    if match cli.command {
        Commands::Parse(ref args) => format::maybe_help(&args.print_args.fmt, &parse::fmt_help),
        Commands::Intervals(ref args) => {
            format::maybe_help(&args.print_args.fmt, &intervals::fmt_help)
        }
        Commands::Occupancy(ref args) => {
            format::maybe_help(&args.print_args.fmt, &occupancy::fmt_help)
        }
        Commands::Busy(ref args) => format::maybe_help(&args.print_args.fmt, &busy::fmt_help),
        Commands::Version => false,
    } {
        return Ok(());
    }

    let meta_args = match cli.command {
        Commands::Parse(ref args) => &args.meta_args,
        Commands::Intervals(ref args) => &args.meta_args,
        Commands::Occupancy(ref args) => &args.meta_args,
        Commands::Busy(ref args) => &args.meta_args,
        Commands::Version => return Ok(()),
    };
    let default_level = if meta_args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    let mut stdout = io::stdout();
    let output: &mut dyn io::Write = &mut stdout;

    match cli.command {
        Commands::Version => Ok(()),

        Commands::Parse(ref args) => {
            if args.source_args.load.is_some() {
                bail!("The parse command needs a log file, not a dataset cache")
            }
            let config = analysis_config(&args.source_args)?;
            let stream = read_stream(&args.source_args, &config)?;
            parse::print_events(output, &args.print_args, &stream)
        }

        Commands::Intervals(ref args) => {
            let mut config = analysis_config(&args.source_args)?;
            if let Some(boost) = args.boost {
                config.boost = boost;
            }
            let (app, rec, _) = obtain_reconstruction(&args.source_args, &config, config.boost)?;
            if let Some(ref dump) = args.dump {
                dump_dataset(dump, &app, &rec)?;
            }
            intervals::print_intervals(output, &config, args, &rec)
        }

        Commands::Occupancy(ref args) => {
            let config = analysis_config(&args.source_args)?;
            let (_, rec, _) = obtain_reconstruction(&args.source_args, &config, config.boost)?;
            occupancy::print_occupancy(output, &config, &args.print_args, &rec)
        }

        Commands::Busy(ref args) => {
            if args.source_args.dvfs {
                bail!("The busy command needs activity data, not DVFS data")
            }
            let mut config = analysis_config(&args.source_args)?;
            // Build every meta-machine, they are the cross-check for the histogram.
            let (_, rec, big_from_log) =
                obtain_reconstruction(&args.source_args, &config, usize::MAX)?;
            config.big_machines = args.big.or(big_from_log).unwrap_or(config.big_machines);
            busy::print_busy(output, &config, args, &rec)
        }
    }
}

// The configuration file, if any, with the command line switches applied.

fn analysis_config(source_args: &SourceArgs) -> Result<AnalysisConfig> {
    let mut config = if let Some(ref filename) = source_args.config_file {
        read_analysis_config(filename)?
    } else {
        AnalysisConfig::default()
    };
    if source_args.cycles {
        config.time_base = TimeBase::Cycle;
    }
    debug!("Configuration: {config:?}");
    Ok(config)
}

fn read_stream(source_args: &SourceArgs, config: &AnalysisConfig) -> Result<EventStream> {
    let Some(ref logfile) = source_args.logfile else {
        bail!("A log file is required")
    };
    let kind = if source_args.dvfs {
        HookKind::Dvfs
    } else {
        HookKind::Activity
    };
    let hook = match (&source_args.hook, kind) {
        (Some(tag), kind) => Hook::new(tag, kind),
        (None, HookKind::Activity) => Hook::activity(),
        (None, HookKind::Dvfs) => Hook::dvfs(),
    };
    let opts = ParseOptions {
        hook,
        time_base: config.time_base,
    };
    let stream = parse_logfile(logfile, &opts)?;
    info!(
        "{}: {} machines, {} events, {} ticks",
        logfile,
        stream.machine_count(),
        stream.events.len(),
        stream.duration()
    );
    Ok(stream)
}

// Returns the application name, the timelines, and the number of big cores announced by the log,
// if any.  `boost` is capped at the number of machines.

fn obtain_reconstruction(
    source_args: &SourceArgs,
    config: &AnalysisConfig,
    boost: usize,
) -> Result<(String, Reconstruction, Option<usize>)> {
    if let Some(ref cache) = source_args.load {
        let dataset = Dataset::load(cache)?;
        let app = if let Some(ref app) = source_args.app {
            app.clone()
        } else {
            let mut apps = dataset.apps();
            match (apps.next(), apps.next()) {
                (Some(app), None) => app.clone(),
                (None, _) => bail!("The dataset cache {cache} is empty"),
                (Some(_), Some(_)) => {
                    bail!("The dataset cache {cache} has several applications, use --app")
                }
            }
        };
        let rec = dataset.reconstruction(&app)?;
        return Ok((app, rec, None));
    }

    let stream = read_stream(source_args, config)?;
    let boost = boost.min(stream.machine_count());
    let rec = if source_args.dvfs {
        let Some(modes) = ModePalette::new(config.dvfs_base_modes) else {
            bail!("Bad number of DVFS base modes {}", config.dvfs_base_modes)
        };
        let palette = DvfsPalette {
            modes,
            initial_mode: config.nominal_mode,
        };
        reconstruct(&stream, &palette, boost)?
    } else {
        reconstruct(&stream, &ActivityPalette::conventional(), boost)?
    };
    Ok((app_name(source_args), rec, stream.big_machines))
}

fn app_name(source_args: &SourceArgs) -> String {
    if let Some(ref app) = source_args.app {
        return app.clone();
    }
    source_args
        .logfile
        .as_ref()
        .and_then(|f| path::Path::new(f).file_stem())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "app".to_string())
}

fn dump_dataset(filename: &str, app: &str, rec: &Reconstruction) -> Result<()> {
    let mut dataset = if path::Path::new(filename).exists() {
        Dataset::load(filename)?
    } else {
        Dataset::new()
    };
    dataset.insert(app, rec)?;
    dataset.dump(filename)?;
    info!("Wrote application {app} to {filename}");
    Ok(())
}

#[test]
fn test_boost_needs_log() {
    let cli = Cli::try_parse_from(["actalyze", "intervals", "--boost", "2", "x.log"]).unwrap();
    assert!(matches!(cli.command, Commands::Intervals(ref a) if a.boost == Some(2)));
    assert!(
        Cli::try_parse_from(["actalyze", "intervals", "--boost", "2", "--load", "c.json"]).is_err()
    );
    assert!(Cli::try_parse_from(["actalyze", "intervals", "--load", "c.json"]).is_ok());
}
