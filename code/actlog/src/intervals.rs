/// Interval sequences: the per-machine timeline as a list of (duration, label) blocks.
///
/// A sequence is built left to right by `append`.  The builder maintains two invariants:
///
/// - no two adjacent intervals have the same label (appending a label equal to the last one
///   extends the last interval instead)
/// - no interval has zero duration, except that a sequence covering a zero-length window consists
///   of a single zero-length interval
///
/// Zero-length blocks arise when a machine has two transitions at the same timestamp; dropping
/// them lets the blocks on either side merge.
///
/// After reconstruction every sequence is padded with (0, EMPTY) intervals so that all sequences
/// for a stream have the same number of entries.  Padding is kept apart from the significant
/// intervals so that it never takes part in merging.
use crate::{Label, Ticks};

use std::collections::BTreeMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Interval {
    pub duration: Ticks,
    pub label: Label,
}

impl Interval {
    pub fn new(duration: Ticks, label: Label) -> Interval {
        Interval { duration, label }
    }

    pub fn is_padding(&self) -> bool {
        self.duration == 0 && self.label == Label::Empty
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSequence {
    intervals: Vec<Interval>,
    padding: usize,
}

impl IntervalSequence {
    pub fn new() -> IntervalSequence {
        Default::default()
    }

    /// Rebuild a sequence from stored intervals, eg from a dataset cache.  Trailing (0, EMPTY)
    /// entries are taken to be padding.  Nothing is merged.
    pub fn from_intervals(intervals: Vec<Interval>) -> IntervalSequence {
        let padding = intervals.iter().rev().take_while(|iv| iv.is_padding()).count();
        IntervalSequence { intervals, padding }
    }

    /// Add a block at the end of the timeline.
    pub fn append(&mut self, duration: Ticks, label: Label) {
        debug_assert!(self.padding == 0, "Appending to a padded sequence");
        if duration == 0 {
            return;
        }
        self.intervals.push(Interval::new(duration, label));
        self.coalesce_tail();
    }

    /// Add the last block of the timeline.  Unlike `append`, this guarantees that the sequence is
    /// not empty afterwards.
    pub fn finish(&mut self, duration: Ticks, label: Label) {
        self.append(duration, label);
        if self.intervals.is_empty() {
            self.intervals.push(Interval::new(0, label));
        }
    }

    // Merging the last two can only create a new duplicate if the sequence was not minimal to begin
    // with, but loop anyway so that the invariant holds even then.
    fn coalesce_tail(&mut self) {
        while self.intervals.len() > 1 {
            let n = self.intervals.len();
            if self.intervals[n - 1].label != self.intervals[n - 2].label {
                break;
            }
            if let Some(last) = self.intervals.pop() {
                self.intervals[n - 2].duration += last.duration;
            }
        }
    }

    /// Append (0, EMPTY) until the sequence has `len` entries.
    pub fn pad_to(&mut self, len: usize) {
        while self.intervals.len() < len {
            self.intervals.push(Interval::new(0, Label::Empty));
            self.padding += 1;
        }
    }

    /// All entries, including padding.
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Entries without the padding.
    pub fn significant(&self) -> &[Interval] {
        &self.intervals[..self.intervals.len() - self.padding]
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn total(&self) -> Ticks {
        self.intervals.iter().map(|iv| iv.duration).sum()
    }

    pub fn time_in(&self, label: Label) -> Ticks {
        self.intervals
            .iter()
            .filter(|iv| iv.label == label)
            .map(|iv| iv.duration)
            .sum()
    }

    /// Total time per label, padding excluded.
    pub fn durations_by_label(&self) -> BTreeMap<Label, Ticks> {
        let mut m = BTreeMap::new();
        for iv in self.significant() {
            *m.entry(iv.label).or_insert(0) += iv.duration;
        }
        m
    }

    /// True if no two adjacent significant intervals share a label.
    pub fn is_minimal(&self) -> bool {
        self.significant()
            .windows(2)
            .all(|w| w[0].label != w[1].label)
    }
}

#[test]
fn test_append_merges() {
    let mut s = IntervalSequence::new();
    s.append(10, Label::Inactive);
    s.append(5, Label::Inactive);
    s.append(3, Label::Active);
    s.finish(2, Label::Active);
    assert_eq!(
        s.intervals(),
        &[
            Interval::new(15, Label::Inactive),
            Interval::new(5, Label::Active)
        ]
    );
    assert_eq!(s.total(), 20);
    assert!(s.is_minimal());
}

#[test]
fn test_zero_blocks_do_not_split() {
    // Active for zero time between two inactive blocks: the inactive blocks must still merge.
    let mut s = IntervalSequence::new();
    s.append(10, Label::Inactive);
    s.append(0, Label::Active);
    s.finish(10, Label::Inactive);
    assert_eq!(s.intervals(), &[Interval::new(20, Label::Inactive)]);

    let mut z = IntervalSequence::new();
    z.append(0, Label::Active);
    z.finish(0, Label::Inactive);
    assert_eq!(z.intervals(), &[Interval::new(0, Label::Inactive)]);
}

#[test]
fn test_padding() {
    let mut s = IntervalSequence::new();
    s.append(4, Label::Mode(1));
    s.finish(6, Label::Mode(0));
    s.pad_to(5);
    assert_eq!(s.len(), 5);
    assert_eq!(s.significant().len(), 2);
    assert!(s.intervals()[2..].iter().all(|iv| iv.is_padding()));
    assert_eq!(s.total(), 10);
    assert!(s.is_minimal());
    assert_eq!(s.durations_by_label().get(&Label::Empty), None);

    let t = IntervalSequence::from_intervals(s.intervals().to_vec());
    assert_eq!(t, s);
}
