/// The JSON time-stat dump written next to each simulation's stdout:
///
/// {
///   "total": 113162049,     # Total execution time in gem5 ticks (ps)
///   "parallel": 87327240,   # Total parallel  time in gem5 ticks (ps)
///   "serial": 25834809,     # Total serial    time in gem5 ticks (ps)
///   "parallel_fraction": 1, # parallel_time / total_time
///   "serial_fraction": 0,   # serial_time / total_time
///   "n_cores_active": {     # Total time spent with N cores active
///     "0": 645645,
///     "1": 26243217,
///     ...
///   }
/// }
///
/// Only `total`, `parallel` and `serial` are required.  This is the reference for normalizing a
/// k-active histogram to parallel time.
use crate::error::Result;
use crate::Ticks;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path;

/// gem5 ticks are picoseconds.
pub const GEM5_TICKS_PER_SECOND: f64 = 1.0e12;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeStats {
    pub total: Ticks,
    pub parallel: Ticks,
    pub serial: Ticks,
    #[serde(default)]
    pub parallel_fraction: f64,
    #[serde(default)]
    pub serial_fraction: f64,
    #[serde(default)]
    pub n_cores_active: BTreeMap<String, Ticks>,
}

impl TimeStats {
    /// The time stats are always in gem5 ticks, whatever the time base of the log.
    pub fn execution_seconds(&self) -> f64 {
        self.total as f64 / GEM5_TICKS_PER_SECOND
    }
}

pub fn read_time_stats<R: Read>(reader: R) -> Result<TimeStats> {
    Ok(serde_json::from_reader(reader)?)
}

pub fn read_time_stats_file(file_name: &str) -> Result<TimeStats> {
    let file = File::open(path::Path::new(file_name))?;
    read_time_stats(BufReader::new(file))
}

#[test]
fn test_time_stats() {
    let text = r#"{
  "total": 113162049,
  "parallel": 87327240,
  "serial": 25834809,
  "parallel_fraction": 0.77,
  "serial_fraction": 0.23,
  "n_cores_active": { "0": 645645, "1": 26243217 }
}"#;
    let ts = read_time_stats(text.as_bytes()).unwrap();
    assert_eq!(ts.total, 113162049);
    assert_eq!(ts.serial, 25834809);
    assert_eq!(ts.n_cores_active.get("1"), Some(&26243217));
    assert!((ts.execution_seconds() - 113.162049e-6).abs() < 1e-12);

    let minimal = read_time_stats(r#"{"total": 3, "parallel": 2, "serial": 1}"#.as_bytes()).unwrap();
    assert_eq!(minimal.parallel_fraction, 0.0);
    assert!(minimal.n_cores_active.is_empty());

    assert!(read_time_stats(r#"{"total": 3}"#.as_bytes()).is_err());
}
