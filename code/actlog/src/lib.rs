/// An activity log is the text output of a gem5 simulation run with instrumented cores.  Among a
/// lot of free-form text there are *records*, lines of the form `<TAG> <json-object>`.  Two records
/// delimit the *region of interest*: `STATS: ON`, which also announces the number of cores, and
/// `STATS: OFF`.  Between them, *hook records* with a caller-chosen tag report per-core
/// transitions: a core going active or inactive (`ACTIVITY_STAT`), or a core changing DVFS mode
/// (`DVFS_STAT`).  Anything outside the region of interest is ignored.
///
/// Records carry simulator timestamps, and within the region of interest they must appear in
/// nondecreasing time order.
///
/// This library has as its fundamental task to reconstruct, for each core (*machine*), the timeline
/// of states the core was in across the region of interest, and to provide statistics over those
/// timelines.  This task breaks down into a number of subtasks:
///
/// - Parse the log into an event stream, handling both hook kinds, the tick and cycle time bases,
///   and the slightly irregular JSON the simulator prints.
///
/// - Replay the event stream into one interval sequence per machine, optionally with synthetic
///   "exactly k machines active" meta-machines.
///
/// - Compute occupancy ratios and the k-active histogram, and normalize them against the run's time
///   statistics.
///
/// - Dump the timelines to a dataset cache for plotting, and load them back.
mod configs;
mod dataset;
mod error;
mod event;
mod intervals;
mod labels;
mod logfile;
mod occupancy;
mod reconstruct;
mod timestats;

// Everything that can go wrong, and the Result type of the library.

pub use error::Error;
pub use error::Result;

// Simulator time.

pub use event::Ticks;

// A decoded record, its kind, and the whole region of interest as a stream of events.

pub use event::Event;
pub use event::EventKind;
pub use event::EventStream;

// Labels for intervals, and the palette that folds raw DVFS modes to labels.

pub use labels::Label;
pub use labels::ModePalette;
pub use labels::DEFAULT_BASE_MODES;
pub use labels::NOMINAL_MODE;

// Parse a log file (or any reader) into an EventStream, given the hook to look for and the time
// base to read.

pub use logfile::parse_log;
pub use logfile::parse_logfile;
pub use logfile::Hook;
pub use logfile::HookKind;
pub use logfile::ParseOptions;
pub use logfile::TimeBase;

// Record tags.

pub use logfile::ACTIVITY_HOOK;
pub use logfile::DVFS_HOOK;
pub use logfile::STATS_OFF;
pub use logfile::STATS_ON;

// A machine's timeline: (duration, label) blocks with no adjacent duplicates.

pub use intervals::Interval;
pub use intervals::IntervalSequence;

// Replay an EventStream into per-machine timelines.  The palette decides the labels.

pub use reconstruct::reconstruct;
pub use reconstruct::ActivityPalette;
pub use reconstruct::DvfsPalette;
pub use reconstruct::Palette;
pub use reconstruct::Reconstruction;

// Statistics over timelines.

pub use occupancy::active_percent;
pub use occupancy::occupancy_ratios;
pub use occupancy::ActiveHistogram;
pub use occupancy::BucketKey;
pub use occupancy::Ratios;

// Time statistics for a run, for normalization.

pub use timestats::read_time_stats;
pub use timestats::read_time_stats_file;
pub use timestats::TimeStats;
pub use timestats::GEM5_TICKS_PER_SECOND;

// The dataset cache.

pub use dataset::Dataset;
pub use dataset::MachineMap;

// Read the analysis configuration file.

pub use configs::read_analysis_config;
pub use configs::AnalysisConfig;
