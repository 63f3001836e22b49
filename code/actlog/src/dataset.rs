/// The dataset cache: reconstructed timelines for a set of applications, in the JSON shape the
/// plotting scripts consume.
///
///   {
///     "activity": { "<app>": { "0": [21, 2, 6], "1": [22, 3, 4], ... } },
///     "state":    { "<app>": { "0": ["ACTIVE", "INACTIVE", "ACTIVE"], ... } },
///     "labels":   { "0": "C0", "1": "C1", ..., "4": "B1", ... },
///     "ratios":   { "<app>": { "0": 75, "1": 25, ... } }
///   }
///
/// Machine keys are the decimal index into the combined list of sequences, real machines first and
/// then the meta-machines.  `labels` is shared by all applications, so all applications in one
/// cache must have the same shape.  `ratios` is the integer active percentage per machine.
///
/// A cache can be loaded back into a `Reconstruction`, which is validated on the way: the
/// activity and state arrays for a machine must have the same length, every state must be a
/// valid label, every sequence must have the same total, and the label table must say which
/// entries are meta-machines.
use crate::error::{Error, Result};
use crate::{active_percent, Interval, IntervalSequence, Label, Reconstruction, Ticks};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path;

pub type MachineMap<T> = BTreeMap<String, T>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub activity: BTreeMap<String, MachineMap<Vec<Ticks>>>,
    pub state: BTreeMap<String, MachineMap<Vec<String>>>,
    pub labels: MachineMap<String>,
    pub ratios: BTreeMap<String, MachineMap<u32>>,
}

impl Dataset {
    pub fn new() -> Dataset {
        Default::default()
    }

    pub fn apps(&self) -> impl Iterator<Item = &String> {
        self.activity.keys()
    }

    /// Add (or replace) the timelines for `app`.  The label table is shared, so if the cache holds
    /// other applications then `rec` must have the same real and meta-machines as they do.
    pub fn insert(&mut self, app: &str, rec: &Reconstruction) -> Result<()> {
        let labels = rec
            .names()
            .into_iter()
            .enumerate()
            .map(|(i, name)| (i.to_string(), name))
            .collect::<MachineMap<String>>();
        if self.apps().any(|a| a != app) && labels != self.labels {
            return Err(invalid(format!(
                "Application '{app}' has {} real and {} meta-machines, unlike the rest of the cache",
                rec.machines.len(),
                rec.boost.len()
            )));
        }

        let mut activity = MachineMap::new();
        let mut state = MachineMap::new();
        let mut ratios = MachineMap::new();
        for (i, seq) in rec.sequences().enumerate() {
            let key = i.to_string();
            activity.insert(
                key.clone(),
                seq.intervals().iter().map(|iv| iv.duration).collect(),
            );
            state.insert(
                key.clone(),
                seq.intervals().iter().map(|iv| iv.label.to_string()).collect(),
            );
            ratios.insert(key, active_percent(seq));
        }
        self.labels = labels;
        self.activity.insert(app.to_string(), activity);
        self.state.insert(app.to_string(), state);
        self.ratios.insert(app.to_string(), ratios);
        Ok(())
    }

    /// Rebuild the timelines for `app`.
    pub fn reconstruction(&self, app: &str) -> Result<Reconstruction> {
        let (Some(activity), Some(state)) = (self.activity.get(app), self.state.get(app)) else {
            return Err(invalid(format!("No data for application '{app}'")));
        };
        if activity.len() != state.len() {
            return Err(invalid(format!(
                "Application '{app}': {} activity rows but {} state rows",
                activity.len(),
                state.len()
            )));
        }

        let mut rows = Vec::with_capacity(activity.len());
        for (key, durations) in activity {
            let index = key
                .parse::<usize>()
                .map_err(|_| invalid(format!("Bad machine key '{key}'")))?;
            let Some(states) = state.get(key) else {
                return Err(invalid(format!("Machine {key}: no state row")));
            };
            if durations.len() != states.len() {
                return Err(invalid(format!(
                    "Machine {key}: {} durations but {} states",
                    durations.len(),
                    states.len()
                )));
            }
            let mut intervals = Vec::with_capacity(durations.len());
            for (d, s) in durations.iter().zip(states) {
                let label = s
                    .parse::<Label>()
                    .map_err(|e| invalid(format!("Machine {key}: {e}")))?;
                intervals.push(Interval::new(*d, label));
            }
            rows.push((index, IntervalSequence::from_intervals(intervals)));
        }

        // BTreeMap order is lexical, "10" < "2".
        rows.sort_by_key(|(index, _)| *index);
        if rows.iter().enumerate().any(|(i, (index, _))| i != *index) {
            return Err(invalid(format!("Application '{app}': machine keys are not 0..N")));
        }

        let mut machines = vec![];
        let mut boost = vec![];
        for (index, seq) in rows {
            let Some(label) = self.labels.get(&index.to_string()) else {
                return Err(invalid(format!("Machine {index}: no label")));
            };
            if label.starts_with('B') {
                boost.push(seq);
            } else if !boost.is_empty() {
                return Err(invalid(format!(
                    "Machine {index}: real machine after meta-machines"
                )));
            } else {
                machines.push(seq);
            }
        }

        let duration = machines
            .iter()
            .chain(boost.iter())
            .next()
            .map(|s| s.total())
            .unwrap_or(0);
        if let Some(bad) = machines
            .iter()
            .chain(boost.iter())
            .position(|s| s.total() != duration)
        {
            return Err(invalid(format!(
                "Machine {bad}: total time differs from machine 0"
            )));
        }

        Ok(Reconstruction {
            machines,
            boost,
            duration,
        })
    }

    pub fn read<R: Read>(reader: R) -> Result<Dataset> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        Ok(serde_json::to_writer_pretty(writer, self)?)
    }

    pub fn load(file_name: &str) -> Result<Dataset> {
        let file = File::open(path::Path::new(file_name))?;
        Dataset::read(BufReader::new(file))
    }

    pub fn dump(&self, file_name: &str) -> Result<()> {
        let file = File::create(path::Path::new(file_name))?;
        let mut writer = BufWriter::new(file);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn invalid(msg: String) -> Error {
    Error::InvalidDataset(msg)
}

#[cfg(test)]
use crate::{reconstruct, ActivityPalette, Event, EventKind, EventStream};

#[cfg(test)]
fn scenario() -> Reconstruction {
    let s = EventStream {
        start: Event::new(0, EventKind::StreamStart { machine_count: 2 }),
        events: [(10, 1, true), (15, 0, false), (15, 1, false)]
            .iter()
            .map(|&(t, machine, active)| Event::new(t, EventKind::StateChange { machine, active }))
            .collect(),
        end: Event::new(20, EventKind::StreamEnd),
        big_machines: None,
    };
    reconstruct(&s, &ActivityPalette::conventional(), 2).unwrap()
}

#[test]
fn test_dataset_insert() {
    let rec = scenario();
    let mut ds = Dataset::new();
    ds.insert("fib", &rec).unwrap();

    assert_eq!(ds.labels.get("0").unwrap(), "C0");
    assert_eq!(ds.labels.get("1").unwrap(), "C1");
    assert_eq!(ds.labels.get("2").unwrap(), "B1");
    assert_eq!(ds.labels.get("3").unwrap(), "B2");
    let activity = ds.activity.get("fib").unwrap();
    let state = ds.state.get("fib").unwrap();
    assert_eq!(activity.get("1").unwrap(), &vec![10, 5, 5]);
    assert_eq!(
        state.get("1").unwrap(),
        &vec!["INACTIVE".to_string(), "ACTIVE".to_string(), "INACTIVE".to_string()]
    );
    // Machine 0 is padded to the width of machine 1.
    assert_eq!(state.get("0").unwrap().last().unwrap(), "EMPTY");
    assert_eq!(ds.ratios.get("fib").unwrap().get("0"), Some(&75));
    assert_eq!(ds.apps().collect::<Vec<_>>(), vec!["fib"]);
}

#[test]
fn test_dataset_reload() {
    let rec = scenario();
    let mut ds = Dataset::new();
    ds.insert("fib", &rec).unwrap();

    let mut buf = vec![];
    ds.write(&mut buf).unwrap();
    let back = Dataset::read(buf.as_slice()).unwrap();
    assert_eq!(back, ds);
    assert_eq!(back.reconstruction("fib").unwrap(), rec);
}

#[test]
fn test_dataset_many_machines() {
    // Twelve machines: key order in the JSON object is lexical but machine order must be numeric.
    let evs = (1..12)
        .map(|m| Event::new(m as Ticks, EventKind::StateChange { machine: m, active: true }))
        .collect();
    let s = EventStream {
        start: Event::new(0, EventKind::StreamStart { machine_count: 12 }),
        events: evs,
        end: Event::new(100, EventKind::StreamEnd),
        big_machines: None,
    };
    let rec = reconstruct(&s, &ActivityPalette::conventional(), 0).unwrap();
    let mut ds = Dataset::new();
    ds.insert("par", &rec).unwrap();
    assert_eq!(ds.reconstruction("par").unwrap(), rec);
}

#[test]
fn test_dataset_validation() {
    let mut ds = Dataset::new();
    ds.insert("fib", &scenario()).unwrap();

    assert!(matches!(ds.reconstruction("nope"), Err(Error::InvalidDataset(_))));

    let mut short = ds.clone();
    short
        .activity
        .get_mut("fib")
        .unwrap()
        .get_mut("1")
        .unwrap()
        .pop();
    assert!(matches!(short.reconstruction("fib"), Err(Error::InvalidDataset(_))));

    let mut badlabel = ds.clone();
    badlabel.state.get_mut("fib").unwrap().get_mut("0").unwrap()[0] = "BUSY".to_string();
    assert!(matches!(badlabel.reconstruction("fib"), Err(Error::InvalidDataset(_))));

    let mut badsum = ds.clone();
    badsum.activity.get_mut("fib").unwrap().get_mut("1").unwrap()[0] = 11;
    assert!(matches!(badsum.reconstruction("fib"), Err(Error::InvalidDataset(_))));

    assert!(Dataset::read(r#"{"activity": {}}"#.as_bytes()).is_err());
}

#[test]
fn test_dataset_several_apps() {
    let mut ds = Dataset::new();
    ds.insert("fib", &scenario()).unwrap();

    // Same shape: shares the label table.
    let other = scenario();
    ds.insert("fib2", &other).unwrap();
    assert_eq!(ds.apps().count(), 2);
    assert_eq!(ds.reconstruction("fib").unwrap().boost.len(), 2);

    // Two real machines and no meta-machines does not fit.
    let mut plain = scenario();
    plain.boost.clear();
    assert!(matches!(ds.insert("plain", &plain), Err(Error::InvalidDataset(_))));
    assert_eq!(ds.apps().count(), 2);
    let rec = ds.reconstruction("fib").unwrap();
    assert_eq!(rec.machines.len(), 2);
    assert_eq!(rec.boost.len(), 2);

    // Replacing the only application may change the shape.
    let mut single = Dataset::new();
    single.insert("fib", &scenario()).unwrap();
    single.insert("fib", &plain).unwrap();
    assert_eq!(single.labels.len(), 2);
    assert_eq!(single.reconstruction("fib").unwrap(), plain);
}

#[test]
fn test_dataset_missing_label() {
    let mut ds = Dataset::new();
    ds.insert("fib", &scenario()).unwrap();
    ds.labels.remove("3");
    assert!(matches!(ds.reconstruction("fib"), Err(Error::InvalidDataset(_))));
}

// Whitebox test: DVFS timelines from a complete log, through the cache and back.

#[test]
fn test_dataset_from_dvfs_log() {
    use crate::{parse_logfile, DvfsPalette, Hook, ParseOptions, TimeBase};

    let opts = ParseOptions {
        hook: Hook::dvfs(),
        time_base: TimeBase::Tick,
    };
    let s = parse_logfile("../tests/actlog/whitebox-dvfs.log", &opts).unwrap();
    assert!(s.events.len() == 4);
    let rec = reconstruct(&s, &DvfsPalette::default(), 0).unwrap();

    let mut ds = Dataset::new();
    ds.insert("dvfs", &rec).unwrap();
    let activity = ds.activity.get("dvfs").unwrap();
    let state = ds.state.get("dvfs").unwrap();
    assert_eq!(activity.get("0").unwrap(), &vec![10, 10, 30]);
    assert_eq!(state.get("0").unwrap(), &vec!["0", "r", "2"]);
    assert_eq!(activity.get("1").unwrap(), &vec![20, 30, 0]);
    assert_eq!(state.get("1").unwrap(), &vec!["0", "r", "EMPTY"]);
    assert_eq!(ds.ratios.get("dvfs").unwrap().get("0"), Some(&0));

    assert_eq!(ds.reconstruction("dvfs").unwrap(), rec);
}
