/// Statistics derived from reconstructed timelines.  Nothing here mutates its input.
///
/// The k-active histogram answers "for how long were exactly k cores active", for k=0..=N, plus
/// two composite buckets for heterogeneous systems with B "big" cores (machines 0..B) followed by
/// "little" cores.  The composite buckets hold the time when at least one big core is idle while at
/// least one little core is busy, which is when work could have been migrated:
///
///   BI>=LA  - at least as many big cores idle as little cores busy
///   BI<LA   - fewer big cores idle than little cores busy
///
/// The histogram is computed by sweeping across the real machines' timelines and replaying the
/// vector of active flags.  This is independent of the meta-machines created during
/// reconstruction, and the two must agree: the ACTIVE time of meta-machine Bk is exactly bucket k.
use crate::{IntervalSequence, Label, Reconstruction, Ticks, TimeStats, GEM5_TICKS_PER_SECOND};

use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt;

/// Label -> fraction of the stream's duration.  Sums to 1 for a nonempty stream.
pub type Ratios = BTreeMap<Label, f64>;

/// Fraction of `total` spent in each label.  When `total` is zero every label present gets zero,
/// there is no error.
pub fn occupancy_ratios(seq: &IntervalSequence, total: Ticks) -> Ratios {
    seq.durations_by_label()
        .into_iter()
        .map(|(label, t)| {
            let r = if total == 0 {
                0.0
            } else {
                t as f64 / total as f64
            };
            (label, r)
        })
        .collect()
}

/// Integer percentage of ACTIVE time out of ACTIVE+INACTIVE time, truncated, as stored in the
/// dataset cache.  Zero if the machine has neither.
pub fn active_percent(seq: &IntervalSequence) -> u32 {
    let active = seq.time_in(Label::Active);
    let inactive = seq.time_in(Label::Inactive);
    if active + inactive == 0 {
        0
    } else {
        (active as u128 * 100 / (active + inactive) as u128) as u32
    }
}

impl Reconstruction {
    /// Occupancy ratios for the real machines, in machine order.
    pub fn occupancy(&self) -> Vec<Ratios> {
        self.machines
            .iter()
            .map(|s| occupancy_ratios(s, self.duration))
            .collect()
    }

    /// ACTIVE time of each meta-machine: element i-1 is the time with exactly i machines active.
    pub fn boost_active_times(&self) -> Vec<Ticks> {
        self.boost.iter().map(|s| s.time_in(Label::Active)).collect()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketKey {
    Active(usize),
    BigIdleGeLittleBusy,
    BigIdleLtLittleBusy,
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Active(k) => write!(f, "{k}"),
            BucketKey::BigIdleGeLittleBusy => f.write_str("BI>=LA"),
            BucketKey::BigIdleLtLittleBusy => f.write_str("BI<LA"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveHistogram {
    /// counts[k] is the time with exactly k machines active, k=0..=machine_count.
    counts: Vec<Ticks>,
    big_idle_ge_little_busy: Ticks,
    big_idle_lt_little_busy: Ticks,
    big_machines: usize,
    total: Ticks,
}

impl ActiveHistogram {
    /// Sweep the real machines' timelines.  `big_machines` is clamped to the number of machines.
    pub fn from_sequences(
        machines: &[IntervalSequence],
        total: Ticks,
        big_machines: usize,
    ) -> ActiveHistogram {
        let n = machines.len();
        let big = big_machines.min(n);
        let mut h = ActiveHistogram {
            counts: vec![0; n + 1],
            big_idle_ge_little_busy: 0,
            big_idle_lt_little_busy: 0,
            big_machines: big,
            total,
        };

        // Change points (offset, machine, active), in time order.  The sort is stable, and all
        // points at one offset are applied before the next block is charged, so the order among
        // simultaneous changes does not matter.
        let points = machines
            .iter()
            .enumerate()
            .flat_map(|(m, seq)| {
                seq.significant()
                    .iter()
                    .scan(0, |offset: &mut Ticks, iv| {
                        let at = *offset;
                        *offset += iv.duration;
                        Some((at, m, iv.label.is_active()))
                    })
                    .collect::<Vec<_>>()
            })
            .sorted_by_key(|&(at, _, _)| at)
            .collect::<Vec<_>>();

        let mut active = vec![false; n];
        let mut prev = 0;
        for (at, m, is_active) in points {
            if at > prev {
                h.charge(&active, at - prev);
                prev = at;
            }
            active[m] = is_active;
        }
        if total > prev {
            h.charge(&active, total - prev);
        }
        h
    }

    fn charge(&mut self, active: &[bool], block: Ticks) {
        let busy_big = active[..self.big_machines].iter().filter(|a| **a).count();
        let busy_little = active[self.big_machines..].iter().filter(|a| **a).count();
        self.counts[busy_big + busy_little] += block;
        let idle_big = self.big_machines - busy_big;
        if idle_big > 0 && busy_little > 0 {
            if idle_big >= busy_little {
                self.big_idle_ge_little_busy += block;
            } else {
                self.big_idle_lt_little_busy += block;
            }
        }
    }

    pub fn counts(&self) -> &[Ticks] {
        &self.counts
    }

    /// Time with exactly `k` machines active; zero for k out of range.
    pub fn exactly(&self, k: usize) -> Ticks {
        self.counts.get(k).copied().unwrap_or(0)
    }

    pub fn total(&self) -> Ticks {
        self.total
    }

    pub fn big_machines(&self) -> usize {
        self.big_machines
    }

    /// All buckets in presentation order: 0..=N, then BI>=LA, then BI<LA.
    pub fn entries(&self) -> Vec<(BucketKey, Ticks)> {
        self.counts
            .iter()
            .enumerate()
            .map(|(k, t)| (BucketKey::Active(k), *t))
            .chain([
                (BucketKey::BigIdleGeLittleBusy, self.big_idle_ge_little_busy),
                (BucketKey::BigIdleLtLittleBusy, self.big_idle_lt_little_busy),
            ])
            .collect()
    }

    /// Buckets in seconds.
    pub fn seconds(&self, ticks_per_second: f64) -> Vec<(BucketKey, f64)> {
        self.entries()
            .into_iter()
            .map(|(k, t)| (k, t as f64 / ticks_per_second))
            .collect()
    }

    /// Buckets as fractions of the parallel section of the run.  The histogram is in units of
    /// `ticks_per_second` (ticks or cycles) while the time stats are in gem5 ticks, so the buckets
    /// are brought to gem5 ticks first.  The serial section shows up as one active core, so it is
    /// subtracted from bucket 1.  With no parallel time every fraction is zero.
    pub fn parallel_fractions(
        &self,
        ticks_per_second: f64,
        stats: &TimeStats,
    ) -> Vec<(BucketKey, f64)> {
        let scale = GEM5_TICKS_PER_SECOND / ticks_per_second;
        let parallel = stats.parallel as f64;
        self.entries()
            .into_iter()
            .map(|(k, t)| {
                let mut t = t as f64 * scale;
                if k == BucketKey::Active(1) {
                    t -= stats.serial as f64;
                }
                (k, if parallel == 0.0 { 0.0 } else { t / parallel })
            })
            .collect()
    }

    /// Compare against the meta-machines' ACTIVE times and return (k, histogram, meta-machine)
    /// for every bucket where they differ.
    pub fn boost_mismatches(&self, rec: &Reconstruction) -> Vec<(usize, Ticks, Ticks)> {
        rec.boost_active_times()
            .into_iter()
            .enumerate()
            .map(|(i, t)| (i + 1, self.exactly(i + 1), t))
            .filter(|(_, h, t)| h != t)
            .collect()
    }
}

impl Reconstruction {
    pub fn active_histogram(&self, big_machines: usize) -> ActiveHistogram {
        ActiveHistogram::from_sequences(&self.machines, self.duration, big_machines)
    }
}

#[cfg(test)]
use crate::{reconstruct, ActivityPalette, Event, EventKind, EventStream};

#[cfg(test)]
fn activity(machine_count: usize, end: Ticks, evs: &[(Ticks, usize, bool)]) -> Reconstruction {
    let s = EventStream {
        start: Event::new(0, EventKind::StreamStart { machine_count }),
        events: evs
            .iter()
            .map(|&(t, machine, active)| {
                Event::new(t, EventKind::StateChange { machine, active })
            })
            .collect(),
        end: Event::new(end, EventKind::StreamEnd),
        big_machines: None,
    };
    reconstruct(&s, &ActivityPalette::conventional(), machine_count).unwrap()
}

#[test]
fn test_ratios() {
    let r = activity(2, 20, &[(10, 1, true), (15, 0, false), (15, 1, false)]);
    let occ = r.occupancy();
    assert_eq!(occ[0].get(&Label::Active), Some(&0.75));
    assert_eq!(occ[0].get(&Label::Inactive), Some(&0.25));
    assert_eq!(occ[1].get(&Label::Active), Some(&0.25));
    assert_eq!(occ[1].get(&Label::Inactive), Some(&0.75));
    assert_eq!(occ[0].get(&Label::Empty), None);
    // No hidden state.
    assert_eq!(r.occupancy(), occ);
    assert_eq!(active_percent(&r.machines[0]), 75);
    assert_eq!(active_percent(&r.machines[1]), 25);

    let z = activity(1, 0, &[]);
    assert_eq!(z.occupancy()[0].get(&Label::Active), Some(&0.0));
    assert_eq!(active_percent(&z.machines[0]), 0);
}

#[test]
fn test_histogram_scenario() {
    // 0..10: C0 only; 10..15: C0 and C1; 15..20: nobody.
    let r = activity(2, 20, &[(10, 1, true), (15, 0, false), (15, 1, false)]);
    let h = r.active_histogram(1);
    assert_eq!(h.counts(), &[5, 10, 5]);
    assert_eq!(h.counts().iter().sum::<Ticks>(), 20);
    assert!(h.boost_mismatches(&r).is_empty());
    assert_eq!(r.boost_active_times(), vec![10, 5]);
    // Big core C0 is never idle while C1 is busy.
    assert_eq!(
        h.entries()[3..],
        [
            (BucketKey::BigIdleGeLittleBusy, 0),
            (BucketKey::BigIdleLtLittleBusy, 0)
        ]
    );
}

#[test]
fn test_composite_buckets() {
    // Two big cores, two little ones.  The master starts active.
    //  0..10  C0         1 idle big, no busy little: neither
    //  10..20 C0 C2 C3   1 idle big < 2 busy little: BI<LA
    //  20..30 C2         2 idle big >= 1 busy little: BI>=LA
    //  30..40 C2 C3      2 idle big >= 2 busy little: BI>=LA
    let r = activity(
        4,
        40,
        &[
            (10, 2, true),
            (10, 3, true),
            (20, 0, false),
            (20, 3, false),
            (30, 3, true),
        ],
    );
    let h = r.active_histogram(2);
    assert_eq!(h.counts(), &[0, 20, 10, 10, 0]);
    let e = h.entries();
    assert_eq!(e[5], (BucketKey::BigIdleGeLittleBusy, 20));
    assert_eq!(e[6], (BucketKey::BigIdleLtLittleBusy, 10));
    assert!(h.boost_mismatches(&r).is_empty());
    assert_eq!(e[5].0.to_string(), "BI>=LA");
    assert_eq!(e[6].0.to_string(), "BI<LA");
}

#[test]
fn test_histogram_zero_machines() {
    let r = activity(0, 33, &[]);
    let h = r.active_histogram(1);
    assert_eq!(h.counts(), &[33]);
    assert_eq!(h.big_machines(), 0);
    assert_eq!(h.entries().len(), 3);
}

#[test]
fn test_normalization() {
    let r = activity(2, 20, &[(10, 1, true), (15, 0, false), (15, 1, false)]);
    let h = r.active_histogram(1);
    let s = h.seconds(10.0);
    assert_eq!(s[0], (BucketKey::Active(0), 0.5));
    assert_eq!(s[1], (BucketKey::Active(1), 1.0));
    assert_eq!(s[2], (BucketKey::Active(2), 0.5));

    let stats = TimeStats {
        total: 20,
        parallel: 16,
        serial: 4,
        ..Default::default()
    };
    let p = h.parallel_fractions(GEM5_TICKS_PER_SECOND, &stats);
    assert_eq!(p[0], (BucketKey::Active(0), 5.0 / 16.0));
    assert_eq!(p[1], (BucketKey::Active(1), 6.0 / 16.0));
    assert_eq!(p[2], (BucketKey::Active(2), 5.0 / 16.0));

    let none = TimeStats::default();
    assert!(h
        .parallel_fractions(GEM5_TICKS_PER_SECOND, &none)
        .iter()
        .all(|(_, f)| *f == 0.0));
}

// Whitebox test on a complete log with two big and two little cores.

#[test]
fn test_whitebox_log() {
    let s = crate::parse_logfile(
        "../tests/actlog/whitebox-activity.log",
        &crate::ParseOptions::default(),
    )
    .unwrap();
    assert!(s.duration() == 100);
    let big = s.big_machines.unwrap_or(1);
    assert!(big == 2);

    let r = reconstruct(&s, &ActivityPalette::conventional(), s.machine_count()).unwrap();
    assert!(r.sequences().all(|seq| seq.total() == 100 && seq.is_minimal()));
    // B1 and B3 change the most, five intervals each.
    assert!(r.sequences().all(|seq| seq.len() == 5));

    let h = r.active_histogram(big);
    assert_eq!(h.counts(), &[0, 60, 10, 20, 10]);
    let e = h.entries();
    assert_eq!(e[5], (BucketKey::BigIdleGeLittleBusy, 0));
    assert_eq!(e[6], (BucketKey::BigIdleLtLittleBusy, 10));
    assert!(h.boost_mismatches(&r).is_empty());
    assert_eq!(r.boost_active_times(), vec![60, 10, 20, 10]);

    let occ = r.occupancy();
    assert_eq!(occ[0].get(&Label::Active), Some(&0.8));
    assert_eq!(occ[1].get(&Label::Active), Some(&0.5));
    assert_eq!(active_percent(&r.machines[3]), 20);

    let stats = crate::read_time_stats_file("../tests/actlog/whitebox-time-stats.json").unwrap();
    let p = h.parallel_fractions(GEM5_TICKS_PER_SECOND, &stats);
    assert_eq!(p[1], (BucketKey::Active(1), 0.5));
    assert_eq!(p[4], (BucketKey::Active(4), 0.125));
}

#[test]
fn test_whitebox_log_cycles() {
    // One cycle is ten ticks in this log, so the histogram is in cycles while the time stats are
    // still in ticks.
    let opts = crate::ParseOptions {
        time_base: crate::TimeBase::Cycle,
        ..Default::default()
    };
    let s = crate::parse_logfile("../tests/actlog/whitebox-activity.log", &opts).unwrap();
    let r = reconstruct(&s, &ActivityPalette::conventional(), 0).unwrap();
    let h = r.active_histogram(2);
    assert_eq!(h.counts(), &[0, 6, 1, 2, 1]);

    let stats = crate::read_time_stats_file("../tests/actlog/whitebox-time-stats.json").unwrap();
    let p = h.parallel_fractions(1.0e11, &stats);
    assert_eq!(p[1], (BucketKey::Active(1), 0.5));
    assert_eq!(p[4], (BucketKey::Active(4), 0.125));
    assert!(p.iter().all(|(_, f)| *f >= 0.0));
}
