/// Read analysis configuration from a json file.
///
/// The file holds a single object { ... } with the following optional named fields and value
/// types:
///
///   ticks_per_second - number, the rate of the simulator's tick clock; gem5 ticks are picoseconds
///   big_machines - integer, the number of "big" cores, which are numbered first
///   dvfs_base_modes - integer, the number of base DVFS modes in the controller
///   nominal_mode - integer, the raw DVFS mode every core starts out in
///   boost - integer, the number of synthetic "exactly k active" meta-machines to build
///   time_base - string, "tick" or "cycle", the timestamp field to read from records
///
/// Field names starting with "#" are comments and are ignored.  Any other unknown field is an
/// error.  See ../tests/actlog/whitebox-config.json for an example.
use crate::{TimeBase, DEFAULT_BASE_MODES, GEM5_TICKS_PER_SECOND, NOMINAL_MODE};

use anyhow::{bail, Result};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path;

// See above comment block for field documentation.

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub ticks_per_second: f64,
    pub big_machines: usize,
    pub dvfs_base_modes: u32,
    pub nominal_mode: u32,
    pub boost: usize,
    pub time_base: TimeBase,
}

impl Default for AnalysisConfig {
    fn default() -> AnalysisConfig {
        AnalysisConfig {
            ticks_per_second: GEM5_TICKS_PER_SECOND,
            big_machines: 1,
            dvfs_base_modes: DEFAULT_BASE_MODES,
            nominal_mode: NOMINAL_MODE,
            boost: 0,
            time_base: TimeBase::Tick,
        }
    }
}

/// Returns the configuration, or an error message.
///
/// The input is human-generated and every field is optional, so this uses the generic JSON parser
/// followed by explicit decoding of the fields, rather than a derived parser.
pub fn read_analysis_config(filename: &str) -> Result<AnalysisConfig> {
    let file = File::open(path::Path::new(filename))?;
    let reader = BufReader::new(file);
    let v: Value = serde_json::from_reader(reader)?;
    let Value::Object(fields) = v else {
        bail!("Expected an object value")
    };

    for name in fields.keys() {
        if !name.starts_with('#') && !KNOWN_FIELDS.contains(&name.as_str()) {
            bail!("Unknown field '{name}'")
        }
    }

    let mut conf = AnalysisConfig::default();
    if let Some(tps) = grab_f64_opt(&fields, "ticks_per_second")? {
        if tps.is_nan() || tps <= 0.0 {
            bail!("Field 'ticks_per_second' must be positive")
        }
        conf.ticks_per_second = tps;
    }
    if let Some(n) = grab_usize_opt(&fields, "big_machines")? {
        conf.big_machines = n;
    }
    if let Some(n) = grab_usize_opt(&fields, "dvfs_base_modes")? {
        if n == 0 || n > 254 {
            bail!("Field 'dvfs_base_modes' must be in the range 1..254")
        }
        conf.dvfs_base_modes = n as u32;
    }
    if let Some(n) = grab_usize_opt(&fields, "nominal_mode")? {
        match u32::try_from(n) {
            Ok(n) => conf.nominal_mode = n,
            Err(_) => bail!("Field 'nominal_mode' is out of range"),
        }
    }
    if let Some(n) = grab_usize_opt(&fields, "boost")? {
        conf.boost = n;
    }
    if let Some(d) = fields.get("time_base") {
        conf.time_base = match d {
            Value::String(s) if s == "tick" => TimeBase::Tick,
            Value::String(s) if s == "cycle" => TimeBase::Cycle,
            _ => bail!("Field 'time_base' must be \"tick\" or \"cycle\""),
        }
    }
    Ok(conf)
}

const KNOWN_FIELDS: [&str; 6] = [
    "ticks_per_second",
    "big_machines",
    "dvfs_base_modes",
    "nominal_mode",
    "boost",
    "time_base",
];

fn grab_usize_opt(fields: &Map<String, Value>, name: &str) -> Result<Option<usize>> {
    if let Some(Value::Number(n)) = fields.get(name) {
        if let Some(n) = n.as_u64() {
            match usize::try_from(n) {
                Ok(n) => Ok(Some(n)),
                Err(_e) => {
                    bail!("Field '{name}' must have unsigned integer value")
                }
            }
        } else {
            bail!("Field '{name}' must have unsigned integer value")
        }
    } else if fields.contains_key(name) {
        bail!("Field '{name}' must have unsigned integer value")
    } else {
        Ok(None)
    }
}

fn grab_f64_opt(fields: &Map<String, Value>, name: &str) -> Result<Option<f64>> {
    match fields.get(name) {
        Some(Value::Number(n)) => match n.as_f64() {
            Some(x) => Ok(Some(x)),
            None => bail!("Field '{name}' must have a numeric value"),
        },
        Some(_) => bail!("Field '{name}' must have a numeric value"),
        None => Ok(None),
    }
}

// Basic whitebox test that the reading works.

#[test]
fn test_config() {
    let conf = read_analysis_config("../tests/actlog/whitebox-config.json").unwrap();
    assert!(conf.ticks_per_second == 1.0e9);
    assert!(conf.big_machines == 4);
    assert!(conf.dvfs_base_modes == 9);
    assert!(conf.nominal_mode == 1);
    assert!(conf.boost == 8);
    assert!(conf.time_base == TimeBase::Cycle);
}

#[test]
fn test_config_errors() {
    assert!(read_analysis_config("../tests/actlog/no-such-config.json").is_err());
    assert!(read_analysis_config("../tests/actlog/whitebox-config-bad.json").is_err());
}
