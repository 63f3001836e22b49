/// Reconstruct per-machine timelines from the transitions in an event stream.
///
/// Every machine is a little state machine with a current label and the time it took on that
/// label.  A transition for the machine closes the block since that time *with the old label* and
/// installs the new label.  At the end of the stream every machine's open block is closed at the
/// end time.  The result is one `IntervalSequence` per machine, each covering the stream exactly.
///
/// What a transition means is up to the `Palette`: for activity hooks it is the new ACTIVE /
/// INACTIVE state, for DVFS hooks it is the new (base) mode.  The palette also decides what label
/// each machine starts with.
///
/// In addition there can be `boost` synthetic meta-machines B1..Bk.  Meta-machine Bi is ACTIVE
/// exactly while i real machines are ACTIVE.  Meta-machines only move on activity transitions and
/// have no clock of their own: their blocks run from the most recent activity transition of any
/// real machine.
///
/// Finally all sequences, real and synthetic, are padded to the same number of entries.
use crate::error::{Error, Result};
use crate::{Event, EventKind, EventStream, IntervalSequence, Label, ModePalette, Ticks};

use log::{debug, warn};

pub trait Palette {
    /// The label machine `machine` holds at the start of the stream.
    fn initial_label(&self, machine: usize) -> Label;

    /// The label the event's machine holds after `event`, given that it holds `current` before
    /// it.  None if the palette does not track this kind of event, in which case the event is
    /// ignored.
    fn next_label(&self, event: &Event, current: Label) -> Option<Label>;
}

/// ACTIVE / INACTIVE from activity hooks.  The starting state of each machine is given by a
/// policy function; conventionally only the master core (machine 0) is running at the start of
/// the stats region.
pub struct ActivityPalette<F = fn(usize) -> bool> {
    starts_active: F,
}

fn master_starts_active(machine: usize) -> bool {
    machine == 0
}

impl ActivityPalette {
    pub fn conventional() -> ActivityPalette {
        ActivityPalette {
            starts_active: master_starts_active,
        }
    }
}

impl<F> ActivityPalette<F>
where
    F: Fn(usize) -> bool,
{
    pub fn with_policy(starts_active: F) -> ActivityPalette<F> {
        ActivityPalette { starts_active }
    }
}

impl<F> Palette for ActivityPalette<F>
where
    F: Fn(usize) -> bool,
{
    fn initial_label(&self, machine: usize) -> Label {
        Label::from_active((self.starts_active)(machine))
    }

    fn next_label(&self, event: &Event, _current: Label) -> Option<Label> {
        match event.kind {
            EventKind::StateChange { active, .. } => Some(Label::from_active(active)),
            _ => None,
        }
    }
}

/// Base DVFS modes from DVFS hooks.  Every machine starts in the same mode.
pub struct DvfsPalette {
    pub modes: ModePalette,
    pub initial_mode: u32,
}

impl Default for DvfsPalette {
    fn default() -> DvfsPalette {
        DvfsPalette {
            modes: ModePalette::default(),
            initial_mode: crate::NOMINAL_MODE,
        }
    }
}

impl Palette for DvfsPalette {
    fn initial_label(&self, _machine: usize) -> Label {
        self.modes.label(self.initial_mode)
    }

    fn next_label(&self, event: &Event, current: Label) -> Option<Label> {
        match event.kind {
            EventKind::ModeChange {
                machine,
                old_mode,
                new_mode,
            } => {
                let claimed = self.modes.label(old_mode);
                if claimed != current {
                    warn!(
                        "Line {}: machine {machine} leaves mode {claimed} but was in mode {current}",
                        event.line
                    );
                }
                Some(self.modes.label(new_mode))
            }
            _ => None,
        }
    }
}

/// The reconstructed timelines.  `boost[i-1]` is meta-machine Bi.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub machines: Vec<IntervalSequence>,
    pub boost: Vec<IntervalSequence>,
    pub duration: Ticks,
}

impl Reconstruction {
    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    /// Real machines first, then the meta-machines in order.
    pub fn sequences(&self) -> impl Iterator<Item = &IntervalSequence> {
        self.machines.iter().chain(self.boost.iter())
    }

    /// Display names in the order of `sequences()`: C0, C1, ..., then B1, B2, ...
    pub fn names(&self) -> Vec<String> {
        (0..self.machines.len())
            .map(|i| format!("C{i}"))
            .chain((1..=self.boost.len()).map(|i| format!("B{i}")))
            .collect()
    }
}

struct Track {
    last_timestamp: Ticks,
    last_label: Label,
    seq: IntervalSequence,
}

impl Track {
    fn new(t: Ticks, label: Label) -> Track {
        Track {
            last_timestamp: t,
            last_label: label,
            seq: IntervalSequence::new(),
        }
    }

    // The caller has checked that `now` is not before `last_timestamp`.
    fn close(&mut self, now: Ticks, next: Label) {
        self.seq.append(now - self.last_timestamp, self.last_label);
        self.last_label = next;
        self.last_timestamp = now;
    }

    fn finish(mut self, end: Ticks) -> IntervalSequence {
        self.seq.finish(end - self.last_timestamp, self.last_label);
        self.seq
    }
}

/// Build the timelines for all machines in `stream`, plus `boost` meta-machines.  Fails on a
/// machine number out of range or on time going backwards (including an end marker before the
/// last event).
pub fn reconstruct<P>(stream: &EventStream, palette: &P, boost: usize) -> Result<Reconstruction>
where
    P: Palette + ?Sized,
{
    let machine_count = stream.machine_count();
    let t0 = stream.start_time();

    let mut tracks = (0..machine_count)
        .map(|m| Track::new(t0, palette.initial_label(m)))
        .collect::<Vec<Track>>();
    let mut num_active = tracks.iter().filter(|t| t.last_label.is_active()).count();
    let mut meta = (1..=boost)
        .map(|i| Track::new(t0, Label::from_active(num_active == i)))
        .collect::<Vec<Track>>();

    // `clock` is the time of the latest event of any kind, `activity_clock` the time of the latest
    // activity transition, ie the max of the real machines' timestamps as far as activity goes.
    let mut clock = t0;
    let mut activity_clock = t0;

    for event in &stream.events {
        let Some(machine) = event.machine() else {
            continue;
        };
        if machine >= machine_count {
            return Err(Error::MachineIndexOutOfRange {
                line: event.line,
                machine,
                machine_count,
            });
        }
        if event.timestamp < clock {
            return Err(Error::NonMonotonicTimestamp {
                line: event.line,
                timestamp: event.timestamp,
                previous: clock,
            });
        }
        clock = event.timestamp;

        let track = &mut tracks[machine];
        let Some(next) = palette.next_label(event, track.last_label) else {
            continue;
        };

        if let EventKind::StateChange { .. } = event.kind {
            let after = num_active - usize::from(track.last_label.is_active())
                + usize::from(next.is_active());
            for (i, m) in meta.iter_mut().enumerate() {
                m.last_timestamp = activity_clock;
                m.close(event.timestamp, Label::from_active(after == i + 1));
            }
            num_active = after;
            activity_clock = event.timestamp;
        }

        track.close(event.timestamp, next);
    }

    let end = stream.end_time();
    if end < clock {
        return Err(Error::NonMonotonicTimestamp {
            line: stream.end.line,
            timestamp: end,
            previous: clock,
        });
    }

    let mut machines = tracks
        .into_iter()
        .map(|t| t.finish(end))
        .collect::<Vec<IntervalSequence>>();
    let mut boost = meta
        .into_iter()
        .map(|mut m| {
            m.last_timestamp = activity_clock;
            m.finish(end)
        })
        .collect::<Vec<IntervalSequence>>();

    let width = machines
        .iter()
        .chain(boost.iter())
        .map(|s| s.len())
        .max()
        .unwrap_or(0);
    for s in machines.iter_mut().chain(boost.iter_mut()) {
        s.pad_to(width);
    }

    debug!(
        "Reconstructed {} machines and {} meta-machines over {} ticks, {width} intervals each",
        machines.len(),
        boost.len(),
        stream.duration()
    );

    Ok(Reconstruction {
        machines,
        boost,
        duration: stream.duration(),
    })
}

#[cfg(test)]
fn activity_stream(machine_count: usize, end: Ticks, evs: &[(Ticks, usize, bool)]) -> EventStream {
    EventStream {
        start: Event::new(0, EventKind::StreamStart { machine_count }),
        events: evs
            .iter()
            .enumerate()
            .map(|(i, &(t, machine, active))| Event {
                timestamp: t,
                line: i + 2,
                kind: EventKind::StateChange { machine, active },
            })
            .collect(),
        end: Event::new(end, EventKind::StreamEnd),
        big_machines: None,
    }
}

#[cfg(test)]
use crate::Interval;

#[test]
fn test_two_machines() {
    let s = activity_stream(2, 20, &[(10, 1, true), (15, 0, false), (15, 1, false)]);
    let r = reconstruct(&s, &ActivityPalette::conventional(), 0).unwrap();
    assert_eq!(r.duration, 20);
    assert_eq!(
        r.machines[0].significant(),
        &[
            Interval::new(15, Label::Active),
            Interval::new(5, Label::Inactive)
        ]
    );
    assert_eq!(
        r.machines[1].intervals(),
        &[
            Interval::new(10, Label::Inactive),
            Interval::new(5, Label::Active),
            Interval::new(5, Label::Inactive)
        ]
    );
    // Machine 0 is padded to the width of machine 1.
    assert_eq!(r.machines[0].len(), 3);
    assert!(r.machines[0].intervals()[2].is_padding());
    for m in r.sequences() {
        assert_eq!(m.total(), 20);
        assert!(m.is_minimal());
    }
}

#[test]
fn test_boost_machines() {
    let s = activity_stream(2, 20, &[(10, 1, true), (15, 0, false), (15, 1, false)]);
    let r = reconstruct(&s, &ActivityPalette::conventional(), 2).unwrap();
    assert_eq!(r.boost.len(), 2);
    assert_eq!(r.names(), vec!["C0", "C1", "B1", "B2"]);

    // One machine active on 0..10, two on 10..15, one on 15..15, zero on 15..20.
    assert_eq!(
        r.boost[0].significant(),
        &[
            Interval::new(10, Label::Active),
            Interval::new(10, Label::Inactive)
        ]
    );
    assert_eq!(
        r.boost[1].significant(),
        &[
            Interval::new(10, Label::Inactive),
            Interval::new(5, Label::Active),
            Interval::new(5, Label::Inactive)
        ]
    );
    let width = r.machines[0].len();
    for m in r.sequences() {
        assert_eq!(m.len(), width);
        assert_eq!(m.total(), 20);
        assert!(m.is_minimal());
    }
}

#[test]
fn test_custom_policy() {
    let s = activity_stream(3, 10, &[(4, 2, false)]);
    let r = reconstruct(&s, &ActivityPalette::with_policy(|_| true), 3).unwrap();
    assert_eq!(r.machines[0].intervals()[0], Interval::new(10, Label::Active));
    assert_eq!(
        r.machines[2].intervals(),
        &[
            Interval::new(4, Label::Active),
            Interval::new(6, Label::Inactive)
        ]
    );
    assert_eq!(r.boost[2].time_in(Label::Active), 4);
    assert_eq!(r.boost[1].time_in(Label::Active), 6);
    assert_eq!(r.boost[0].time_in(Label::Active), 0);
}

#[test]
fn test_simultaneous_flips() {
    // Machine 1 goes active and back at t=5: a zero-length active block that must vanish.
    let s = activity_stream(2, 10, &[(5, 1, true), (5, 1, false)]);
    let r = reconstruct(&s, &ActivityPalette::conventional(), 2).unwrap();
    assert_eq!(r.machines[1].significant(), &[Interval::new(10, Label::Inactive)]);
    assert_eq!(r.boost[0].significant(), &[Interval::new(10, Label::Active)]);
    assert_eq!(r.boost[1].significant(), &[Interval::new(10, Label::Inactive)]);
}

#[test]
fn test_zero_machines() {
    let s = activity_stream(0, 7, &[]);
    let r = reconstruct(&s, &ActivityPalette::conventional(), 0).unwrap();
    assert!(r.machines.is_empty());
    assert!(r.boost.is_empty());
    assert_eq!(r.duration, 7);
}

#[test]
fn test_empty_window() {
    let s = activity_stream(2, 0, &[(0, 1, true)]);
    let r = reconstruct(&s, &ActivityPalette::conventional(), 1).unwrap();
    assert_eq!(r.machines[0].intervals(), &[Interval::new(0, Label::Active)]);
    assert_eq!(r.machines[1].intervals(), &[Interval::new(0, Label::Active)]);
    assert_eq!(r.boost[0].intervals(), &[Interval::new(0, Label::Inactive)]);
}

#[test]
fn test_dvfs() {
    let mk = |t, machine, old_mode, new_mode| Event {
        timestamp: t,
        line: 0,
        kind: EventKind::ModeChange {
            machine,
            old_mode,
            new_mode,
        },
    };
    let s = EventStream {
        start: Event::new(100, EventKind::StreamStart { machine_count: 2 }),
        events: vec![mk(110, 0, 1, 17), mk(110, 1, 1, 14), mk(110, 1, 14, 3), mk(150, 0, 17, 1)],
        end: Event::new(200, EventKind::StreamEnd),
        big_machines: None,
    };
    let r = reconstruct(&s, &DvfsPalette::default(), 0).unwrap();
    assert_eq!(
        r.machines[0].significant(),
        &[
            Interval::new(10, Label::Mode(1)),
            Interval::new(40, Label::Mode(0)),
            Interval::new(50, Label::Mode(1))
        ]
    );
    assert_eq!(
        r.machines[1].significant(),
        &[
            Interval::new(10, Label::Mode(1)),
            Interval::new(90, Label::Mode(3))
        ]
    );
    assert_eq!(r.machines[1].len(), 3);
}

#[test]
fn test_reconstruct_errors() {
    let pal = ActivityPalette::conventional();

    let s = activity_stream(2, 20, &[(10, 2, true)]);
    assert!(matches!(
        reconstruct(&s, &pal, 0),
        Err(Error::MachineIndexOutOfRange {
            line: 2,
            machine: 2,
            machine_count: 2
        })
    ));

    let s = activity_stream(2, 20, &[(10, 1, true), (9, 0, false)]);
    assert!(matches!(
        reconstruct(&s, &pal, 0),
        Err(Error::NonMonotonicTimestamp {
            line: 3,
            timestamp: 9,
            previous: 10
        })
    ));

    let s = activity_stream(2, 5, &[(10, 1, true)]);
    assert!(matches!(
        reconstruct(&s, &pal, 0),
        Err(Error::NonMonotonicTimestamp {
            timestamp: 5,
            previous: 10,
            ..
        })
    ));

    let mut s = activity_stream(1, 20, &[(10, 0, true)]);
    s.start.timestamp = 12;
    assert!(matches!(
        reconstruct(&s, &pal, 0),
        Err(Error::NonMonotonicTimestamp { .. })
    ));
}
