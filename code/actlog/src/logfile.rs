/// Parser for the stats region of a gem5 stdout dump.
///
/// The dump is mostly free-form diagnostic text.  Interleaved with it are structured records, one
/// per line, on the form `<TAG> <json-object>`:
///
///   STATS: CPU 0 reached stats region
///   STATS: ON {"num_cpus": 4, "tick_timestamp": 466456000, "cycle_timestamp": 0}
///   ACTIVITY_STAT {"cpu": 1, "active": 1, "stat_val": 1, "stat_code": 0, "tick_timestamp": 485524000, "cycle_timestamp": 9534}
///   ACTIVITY_STAT {"cpu": 1, "active": 0, "stat_val": 0, "stat_code": 0, "tick_timestamp": 491878000, "cycle_timestamp": 12711}
///   STATS: CPU 0 finished stats region
///   STATS: OFF {"tick_timestamp": 586360000, "cycle_timestamp": 59952}
///
/// or, for DVFS,
///
///   DVFS_STAT {"cpu": 0, "oldmode": 1, "newmode": 17, "tick_timestamp": 322867545}
///
/// NOTE:
///
/// - In contrast to a sample log, a corrupted record is *not* dropped.  Every hook record is a
///   state transition and losing one shifts all subsequent time for that core into the wrong
///   state, so a tagged line that does not decode is an error.
///
/// - The hook printers in some gem5 builds leave a comma before the closing brace.  One such comma
///   is tolerated.
///
/// - Nothing before the first `STATS: ON` and nothing after the first `STATS: OFF` is examined,
///   except that a `--heterogeneous B;L` option echoed in the preamble is remembered.
use crate::error::{malformed, Error, Result};
use crate::{Event, EventKind, EventStream, Ticks};

use log::{debug, warn};
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path;

pub const STATS_ON: &str = "STATS: ON";
pub const STATS_OFF: &str = "STATS: OFF";
pub const ACTIVITY_HOOK: &str = "ACTIVITY_STAT";
pub const DVFS_HOOK: &str = "DVFS_STAT";

/// How to decode the records carrying the hook tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HookKind {
    Activity,
    Dvfs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub tag: String,
    pub kind: HookKind,
}

impl Hook {
    pub fn new(tag: &str, kind: HookKind) -> Hook {
        Hook {
            tag: tag.to_string(),
            kind,
        }
    }

    pub fn activity() -> Hook {
        Hook::new(ACTIVITY_HOOK, HookKind::Activity)
    }

    pub fn dvfs() -> Hook {
        Hook::new(DVFS_HOOK, HookKind::Dvfs)
    }
}

/// Which of the two timestamps in every record to use.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum TimeBase {
    #[default]
    Tick,
    Cycle,
}

impl TimeBase {
    pub fn field_name(&self) -> &'static str {
        match self {
            TimeBase::Tick => "tick_timestamp",
            TimeBase::Cycle => "cycle_timestamp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub hook: Hook,
    pub time_base: TimeBase,
}

impl Default for ParseOptions {
    fn default() -> ParseOptions {
        ParseOptions {
            hook: Hook::activity(),
            time_base: TimeBase::Tick,
        }
    }
}

/// Parse a log file.  See `parse_log`.
pub fn parse_logfile(file_name: &str, opts: &ParseOptions) -> Result<EventStream> {
    let file = File::open(path::Path::new(file_name))?;
    parse_log(BufReader::new(file), opts)
}

/// Read the log to the first `STATS: OFF` and return the stats region.  I/O errors, missing
/// markers, and undecodable tagged records are errors; untagged lines are skipped silently.
pub fn parse_log<R: BufRead>(reader: R, opts: &ParseOptions) -> Result<EventStream> {
    let heterogeneous = Regex::new(r"--heterogeneous (\d+);(\d+)").expect("Constant regex");
    let tbase = opts.time_base.field_name();
    let mut lines = RawLines::new(reader);

    // Preamble: look for the start marker only.

    let mut start: Option<Event> = None;
    let mut big_machines: Option<usize> = None;
    let mut skipped = 0usize;
    while let Some(raw) = lines.next_line()? {
        let lineno = raw.number;
        let line = raw.text.trim_end();
        if let Some(caps) = heterogeneous.captures(line) {
            big_machines = caps[1].parse::<usize>().ok();
        }
        if let Some(payload) = tagged(line, STATS_ON) {
            let fields = decode(&raw, payload)?;
            let machine_count = grab_usize(lineno, &fields, "num_cpus")?;
            let timestamp = grab_u64(lineno, &fields, tbase)?;
            start = Some(Event {
                timestamp,
                line: lineno,
                kind: EventKind::StreamStart { machine_count },
            });
            break;
        }
        if tagged(line, &opts.hook.tag).is_some() {
            skipped += 1;
        }
    }
    let Some(start) = start else {
        return Err(Error::MissingStreamStart);
    };
    if skipped > 0 {
        debug!("Ignored {skipped} hook records before '{STATS_ON}'");
    }

    // Body: hook records up to the end marker.

    let mut events = vec![];
    while let Some(raw) = lines.next_line()? {
        let lineno = raw.number;
        let line = raw.text.trim_end();
        if let Some(payload) = tagged(line, STATS_OFF) {
            let fields = decode(&raw, payload)?;
            let end = Event {
                timestamp: grab_u64(lineno, &fields, tbase)?,
                line: lineno,
                kind: EventKind::StreamEnd,
            };
            debug!(
                "Stats region on lines {}..={lineno}: {} '{}' records",
                start.line,
                events.len(),
                opts.hook.tag
            );
            return Ok(EventStream {
                start,
                events,
                end,
                big_machines,
            });
        }
        if let Some(payload) = tagged(line, &opts.hook.tag) {
            let fields = decode(&raw, payload)?;
            events.push(decode_hook(lineno, &fields, opts.hook.kind, tbase)?);
        } else if tagged(line, STATS_ON).is_some() {
            warn!("Line {lineno}: ignoring repeated '{STATS_ON}'");
        }
    }

    Err(Error::MissingStreamEnd)
}

/// If `line` starts with `tag` as a whole word, return the rest of the line, trimmed.
fn tagged<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(tag)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

// Lines are read as bytes.  Diagnostic text may be in any encoding, so only the records that are
// actually decoded need to be UTF-8.

struct RawLine {
    number: usize,
    text: String,
    utf8: bool,
}

struct RawLines<R> {
    reader: R,
    buf: Vec<u8>,
    number: usize,
}

impl<R: BufRead> RawLines<R> {
    fn new(reader: R) -> RawLines<R> {
        RawLines {
            reader,
            buf: vec![],
            number: 0,
        }
    }

    fn next_line(&mut self) -> Result<Option<RawLine>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        self.number += 1;
        let (text, utf8) = match String::from_utf8_lossy(&self.buf) {
            Cow::Borrowed(s) => (s.to_string(), true),
            Cow::Owned(s) => (s, false),
        };
        Ok(Some(RawLine {
            number: self.number,
            text,
            utf8,
        }))
    }
}

fn decode(raw: &RawLine, payload: &str) -> Result<Map<String, Value>> {
    let line = raw.number;
    if !raw.utf8 {
        return Err(malformed(line, "record is not valid UTF-8"));
    }
    match serde_json::from_str::<Value>(&without_trailing_comma(payload)) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(malformed(line, "payload is not a JSON object")),
        Err(e) => Err(malformed(line, e.to_string())),
    }
}

fn without_trailing_comma(payload: &str) -> Cow<'_, str> {
    if let Some(inner) = payload.strip_suffix('}') {
        if let Some(head) = inner.trim_end().strip_suffix(',') {
            return Cow::Owned(format!("{head}}}"));
        }
    }
    Cow::Borrowed(payload)
}

fn decode_hook(
    line: usize,
    fields: &Map<String, Value>,
    kind: HookKind,
    tbase: &str,
) -> Result<Event> {
    let machine = grab_usize(line, fields, "cpu")?;
    let timestamp = grab_u64(line, fields, tbase)?;
    let kind = match kind {
        HookKind::Activity => EventKind::StateChange {
            machine,
            active: grab_flag(line, fields, "active")?,
        },
        HookKind::Dvfs => EventKind::ModeChange {
            machine,
            old_mode: grab_u32(line, fields, "oldmode")?,
            new_mode: grab_u32(line, fields, "newmode")?,
        },
    };
    Ok(Event {
        timestamp,
        line,
        kind,
    })
}

fn grab_u64(line: usize, fields: &Map<String, Value>, name: &str) -> Result<Ticks> {
    match fields.get(name) {
        Some(Value::Number(n)) => match n.as_u64() {
            Some(n) => Ok(n),
            None => Err(malformed(
                line,
                format!("field '{name}' must have an unsigned integer value"),
            )),
        },
        Some(_) => Err(malformed(
            line,
            format!("field '{name}' must have an unsigned integer value"),
        )),
        None => Err(malformed(line, format!("field '{name}' must be present"))),
    }
}

fn grab_usize(line: usize, fields: &Map<String, Value>, name: &str) -> Result<usize> {
    let n = grab_u64(line, fields, name)?;
    usize::try_from(n).map_err(|_| malformed(line, format!("field '{name}' is too large")))
}

fn grab_u32(line: usize, fields: &Map<String, Value>, name: &str) -> Result<u32> {
    let n = grab_u64(line, fields, name)?;
    u32::try_from(n).map_err(|_| malformed(line, format!("field '{name}' is too large")))
}

// The simulator prints `active` as 0/1 but a boolean is accepted too.

fn grab_flag(line: usize, fields: &Map<String, Value>, name: &str) -> Result<bool> {
    match fields.get(name) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Number(n)) if n.as_u64().is_some() => Ok(n.as_u64() != Some(0)),
        Some(_) => Err(malformed(
            line,
            format!("field '{name}' must have a boolean or 0/1 value"),
        )),
        None => Err(malformed(line, format!("field '{name}' must be present"))),
    }
}

#[cfg(test)]
fn parse_str(text: &str, opts: &ParseOptions) -> Result<EventStream> {
    parse_log(text.as_bytes(), opts)
}

#[test]
fn test_parse_activity() {
    let text = r#"gem5 Simulator System.  http://gem5.org
command line: gem5.opt brg_se.py --heterogeneous 2;6 --num-cpus 4
STATS: CPU 0 reached stats region
ACTIVITY_STAT {"cpu": 1, "active": 1, "stat_val": 1, "stat_code": 0, "tick_timestamp": 5}
STATS: ON {"num_cpus": 4, "tick_timestamp": 100, "cycle_timestamp": 0, }
ACTIVITY_STAT {"cpu": 1, "active": 1, "stat_val": 1, "stat_code": 0, "tick_timestamp": 110, "cycle_timestamp": 5}
some random simulator chatter
ACTIVITY_STAT {"cpu": 1, "active": 0, "stat_val": 0, "stat_code": 0, "tick_timestamp": 130, "cycle_timestamp": 15}
ACTIVITY_STATX this is not a record
STATS: CPU 0 finished stats region
STATS: OFF {"tick_timestamp": 200, "cycle_timestamp": 50}
ACTIVITY_STAT this line is never looked at
"#;
    let s = parse_str(text, &ParseOptions::default()).unwrap();
    assert_eq!(s.machine_count(), 4);
    assert_eq!(s.start_time(), 100);
    assert_eq!(s.end_time(), 200);
    assert_eq!(s.duration(), 100);
    assert_eq!(s.big_machines, Some(2));
    assert_eq!(s.start.line, 5);
    assert_eq!(s.end.line, 11);
    assert_eq!(s.events.len(), 2);
    assert_eq!(s.events[0].timestamp, 110);
    assert_eq!(s.events[0].line, 6);
    assert_eq!(
        s.events[0].kind,
        EventKind::StateChange {
            machine: 1,
            active: true
        }
    );
    assert_eq!(
        s.events[1].kind,
        EventKind::StateChange {
            machine: 1,
            active: false
        }
    );

    let cycles = parse_str(
        text,
        &ParseOptions {
            hook: Hook::activity(),
            time_base: TimeBase::Cycle,
        },
    )
    .unwrap();
    assert_eq!(cycles.start_time(), 0);
    assert_eq!(cycles.events[1].timestamp, 15);
    assert_eq!(cycles.end_time(), 50);
}

#[test]
fn test_parse_dvfs() {
    let text = r#"STATS: ON {"num_cpus": 2, "tick_timestamp": 0}
ACTIVITY_STAT {"cpu": 0, "active": 1, "stat_val": 0, "stat_code": 1, "tick_timestamp": 3}
DVFS_STAT { "cpu": 0, "oldmode": 1, "newmode": 17, "tick_timestamp": 4 }
DVFS_STAT { "cpu": 1, "oldmode": 1, "newmode": 14, "tick_timestamp": 4 }
STATS: OFF {"tick_timestamp": 9}
"#;
    let s = parse_str(
        text,
        &ParseOptions {
            hook: Hook::dvfs(),
            time_base: TimeBase::Tick,
        },
    )
    .unwrap();
    assert_eq!(s.events.len(), 2);
    assert_eq!(s.big_machines, None);
    assert_eq!(
        s.events[0].kind,
        EventKind::ModeChange {
            machine: 0,
            old_mode: 1,
            new_mode: 17
        }
    );
    assert_eq!(s.events[1].machine(), Some(1));
}

#[test]
fn test_parse_custom_hook() {
    let text = r#"STATS: ON {"num_cpus": 1, "tick_timestamp": 0}
ACTIVITY_STAT {"cpu": 0, "active": 0, "tick_timestamp": 1}
AWSTEAL_STAT {"cpu": 0, "active": true, "tick_timestamp": 2}
STATS: OFF {"tick_timestamp": 3}
"#;
    let s = parse_str(
        text,
        &ParseOptions {
            hook: Hook::new("AWSTEAL_STAT", HookKind::Activity),
            time_base: TimeBase::Tick,
        },
    )
    .unwrap();
    assert_eq!(s.events.len(), 1);
    assert_eq!(s.events[0].timestamp, 2);
}

#[test]
fn test_parse_errors() {
    let opts = ParseOptions::default();

    let no_start = r#"ACTIVITY_STAT {"cpu": 0, "active": 1, "tick_timestamp": 1}
STATS: OFF {"tick_timestamp": 3}
"#;
    assert!(matches!(
        parse_str(no_start, &opts),
        Err(Error::MissingStreamStart)
    ));

    let no_end = r#"STATS: ON {"num_cpus": 1, "tick_timestamp": 0}
ACTIVITY_STAT {"cpu": 0, "active": 1, "tick_timestamp": 1}
"#;
    assert!(matches!(
        parse_str(no_end, &opts),
        Err(Error::MissingStreamEnd)
    ));

    let bad_cpus = r#"STATS: ON {"num_cpus": "four", "tick_timestamp": 0}
STATS: OFF {"tick_timestamp": 3}
"#;
    assert!(matches!(
        parse_str(bad_cpus, &opts),
        Err(Error::MalformedRecord { line: 1, .. })
    ));

    let bad_json = r#"STATS: ON {"num_cpus": 1, "tick_timestamp": 0}
hello
ACTIVITY_STAT {"cpu": 0, "active": 1, "tick_timestamp": 1
STATS: OFF {"tick_timestamp": 3}
"#;
    assert!(matches!(
        parse_str(bad_json, &opts),
        Err(Error::MalformedRecord { line: 3, .. })
    ));

    let missing_field = r#"STATS: ON {"num_cpus": 1, "tick_timestamp": 0}
ACTIVITY_STAT {"cpu": 0, "tick_timestamp": 1}
STATS: OFF {"tick_timestamp": 3}
"#;
    assert!(matches!(
        parse_str(missing_field, &opts),
        Err(Error::MalformedRecord { line: 2, .. })
    ));

    let bare_tag = "STATS: ON\nSTATS: OFF {\"tick_timestamp\": 3}\n";
    assert!(matches!(
        parse_str(bare_tag, &opts),
        Err(Error::MalformedRecord { line: 1, .. })
    ));
}

#[test]
fn test_trailing_comma() {
    assert_eq!(without_trailing_comma(r#"{"a": 1, }"#), r#"{"a": 1}"#);
    assert_eq!(without_trailing_comma(r#"{"a": 1}"#), r#"{"a": 1}"#);
    assert_eq!(without_trailing_comma("{}"), "{}");
}

#[test]
fn test_non_utf8_text() {
    let opts = ParseOptions::default();
    let mut log = b"gem5 Simulator System \xff\xfe\n".to_vec();
    log.extend_from_slice(b"STATS: ON {\"num_cpus\": 1, \"tick_timestamp\": 0}\n");
    log.extend_from_slice(b"cpu0 says \xc3\n");
    log.extend_from_slice(b"ACTIVITY_STAT {\"cpu\": 0, \"active\": 0, \"tick_timestamp\": 5}\n");
    log.extend_from_slice(b"STATS: OFF {\"tick_timestamp\": 9}\n");
    let s = parse_log(log.as_slice(), &opts).unwrap();
    assert_eq!(s.events.len(), 1);
    assert_eq!(s.events[0].line, 4);
    assert_eq!(s.end.timestamp, 9);

    // A record that is not UTF-8 is still an error.
    let mut bad = b"STATS: ON {\"num_cpus\": 1, \"tick_timestamp\": 0}\n".to_vec();
    bad.extend_from_slice(b"ACTIVITY_STAT {\"cpu\": 0, \"active\": 0, \"tick_timestamp\": 5} \xff\n");
    bad.extend_from_slice(b"STATS: OFF {\"tick_timestamp\": 9}\n");
    assert!(matches!(
        parse_log(bad.as_slice(), &opts),
        Err(Error::MalformedRecord { line: 2, .. })
    ));
}
