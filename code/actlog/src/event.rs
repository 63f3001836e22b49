/// Decoded log records.
///
/// Timestamps are simulator ticks (or cycles, see `TimeBase`), not wall-clock times.  There is no
/// calendar anywhere in this library; conversion to seconds happens only at the very end, in the
/// aggregation layer, with a caller-supplied rate.
pub type Ticks = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `STATS: ON`: the start of the region of interest.
    StreamStart { machine_count: usize },

    /// `STATS: OFF`: the end of the region of interest.
    StreamEnd,

    /// Core activity hook.  `active` is the state the core is in *after* the event.
    StateChange { machine: usize, active: bool },

    /// DVFS hook.  Modes are raw controller modes, possibly transition modes; see `ModePalette`.
    ModeChange {
        machine: usize,
        old_mode: u32,
        new_mode: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub timestamp: Ticks,

    /// 1-based line in the log, for error messages.  Zero for synthesized events.
    pub line: usize,

    pub kind: EventKind,
}

impl Event {
    pub fn new(timestamp: Ticks, kind: EventKind) -> Event {
        Event {
            timestamp,
            line: 0,
            kind,
        }
    }

    /// The machine a body event pertains to, None for the stream markers.
    pub fn machine(&self) -> Option<usize> {
        match self.kind {
            EventKind::StateChange { machine, .. } | EventKind::ModeChange { machine, .. } => {
                Some(machine)
            }
            EventKind::StreamStart { .. } | EventKind::StreamEnd => None,
        }
    }
}

/// The parsed region of interest: start marker, body events in log order, end marker.  The body
/// has not been validated against the machine count or for monotonic time; reconstruction does
/// that.
#[derive(Debug, Clone)]
pub struct EventStream {
    pub start: Event,
    pub events: Vec<Event>,
    pub end: Event,

    /// The number of "big" cores announced by a `--heterogeneous B;L` line ahead of the stats
    /// region, if there was one.
    pub big_machines: Option<usize>,
}

impl EventStream {
    pub fn machine_count(&self) -> usize {
        match self.start.kind {
            EventKind::StreamStart { machine_count } => machine_count,
            _ => 0,
        }
    }

    pub fn start_time(&self) -> Ticks {
        self.start.timestamp
    }

    pub fn end_time(&self) -> Ticks {
        self.end.timestamp
    }

    /// Length of the region of interest.  Zero if the end marker is (erroneously) before the start.
    pub fn duration(&self) -> Ticks {
        self.end.timestamp.saturating_sub(self.start.timestamp)
    }
}
