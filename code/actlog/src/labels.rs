/// State labels carried by intervals, and the DVFS mode palette.
///
/// The textual forms are part of the dataset cache format and are read by the plotting scripts
/// downstream, so they must not change:
///
///   ACTIVE, INACTIVE  - core activity
///   r, 0, 1, ..., N   - DVFS base modes; base mode 0 is "r", base mode n>0 is "n-1"
///   EMPTY             - zero-length padding at the end of a sequence
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    Active,
    Inactive,
    /// A DVFS *base* mode, never a transition mode.
    Mode(u8),
    Empty,
}

impl Label {
    pub fn from_active(active: bool) -> Label {
        if active {
            Label::Active
        } else {
            Label::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        *self == Label::Active
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Active => f.write_str("ACTIVE"),
            Label::Inactive => f.write_str("INACTIVE"),
            Label::Mode(0) => f.write_str("r"),
            Label::Mode(n) => write!(f, "{}", n - 1),
            Label::Empty => f.write_str("EMPTY"),
        }
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Label, String> {
        match s {
            "ACTIVE" => Ok(Label::Active),
            "INACTIVE" => Ok(Label::Inactive),
            "EMPTY" => Ok(Label::Empty),
            "r" => Ok(Label::Mode(0)),
            _ => match s.parse::<u8>() {
                Ok(n) if n < u8::MAX => Ok(Label::Mode(n + 1)),
                _ => Err(format!("Unknown state label '{s}'")),
            },
        }
    }
}

/// The DVFS controller numbers its modes so that the first `base_modes` values are the base
/// (steady-state) modes and everything at or above that is a transition mode between two base
/// modes.  While scaling voltage up the core runs at the frequency of the mode it came from, and
/// scaling down is instantaneous, so time in a transition mode is attributed to a base mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ModePalette {
    base_modes: u32,
}

pub const DEFAULT_BASE_MODES: u32 = 9;

/// The mode every core is in when the stats region starts.
pub const NOMINAL_MODE: u32 = 1;

impl Default for ModePalette {
    fn default() -> ModePalette {
        ModePalette {
            base_modes: DEFAULT_BASE_MODES,
        }
    }
}

impl ModePalette {
    /// `base_modes` must be in 1..=255.
    pub fn new(base_modes: u32) -> Option<ModePalette> {
        if base_modes == 0 || base_modes >= u8::MAX as u32 {
            None
        } else {
            Some(ModePalette { base_modes })
        }
    }

    pub fn base_modes(&self) -> u32 {
        self.base_modes
    }

    pub fn base_mode(&self, raw: u32) -> u8 {
        let base = if raw >= self.base_modes {
            raw / self.base_modes - 1
        } else {
            raw
        };
        // Clamp rather than wrap for absurd transition-mode numbers.
        u8::try_from(base).unwrap_or(u8::MAX - 1)
    }

    pub fn label(&self, raw: u32) -> Label {
        Label::Mode(self.base_mode(raw))
    }
}

#[test]
fn test_label_text() {
    for l in [
        Label::Active,
        Label::Inactive,
        Label::Empty,
        Label::Mode(0),
        Label::Mode(1),
        Label::Mode(8),
    ] {
        assert_eq!(l.to_string().parse::<Label>().unwrap(), l);
    }
    assert_eq!(Label::Mode(0).to_string(), "r");
    assert_eq!(Label::Mode(1).to_string(), "0");
    assert_eq!(Label::Mode(8).to_string(), "7");
    assert!("BOGUS".parse::<Label>().is_err());
    assert!("-1".parse::<Label>().is_err());
}

#[test]
fn test_mode_palette() {
    let p = ModePalette::default();
    assert_eq!(p.base_mode(0), 0);
    assert_eq!(p.base_mode(1), 1);
    assert_eq!(p.base_mode(8), 8);
    // Transition modes 9..17 fold to 0, 18..26 fold to 1, and so on.
    assert_eq!(p.base_mode(14), 0);
    assert_eq!(p.base_mode(17), 0);
    assert_eq!(p.base_mode(18), 1);
    assert_eq!(p.label(NOMINAL_MODE), Label::Mode(1));
    assert!(ModePalette::new(0).is_none());
    assert!(ModePalette::new(255).is_none());
}
