//! The three choices that define an unlock/lock run: which MCU, which signal
//! pin the bootloader listens on, and whether to unlock or lock the flash.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Microcontroller families supported by the AM32 bootloaders.
#[derive(
    Debug,
    docsplay::Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[clap(rename_all = "UPPER")]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Mcu {
    /// F051
    #[default]
    F051,
    /// G071
    G071,
    /// L431
    L431,
    /// E230
    E230,
    /// F415
    F415,
    /// F421
    F421,
}

impl Mcu {
    /// All MCUs in the order they are offered to the user.
    pub const ALL: [Mcu; 6] = [
        Mcu::F051,
        Mcu::G071,
        Mcu::L431,
        Mcu::E230,
        Mcu::F415,
        Mcu::F421,
    ];
}

/// The pin the ESC receives its throttle signal on. The bootloader image
/// differs per pin.
#[derive(
    Debug,
    docsplay::Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[clap(rename_all = "UPPER")]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum SignalPin {
    /// PA2
    #[default]
    PA2,
    /// PB4
    PB4,
    /// PA15
    PA15,
}

impl SignalPin {
    pub const ALL: [SignalPin; 3] = [SignalPin::PA2, SignalPin::PB4, SignalPin::PA15];
}

/// What to do with the flash protection of the target.
#[derive(
    Debug,
    docsplay::Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Mode {
    /// Unlock
    #[default]
    Unlock,
    /// Lock
    Lock,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Unlock, Mode::Lock];

    /// The operation name used in OpenOCD script file names.
    pub fn operation(self) -> &'static str {
        match self {
            Mode::Unlock => "unlock",
            Mode::Lock => "lock",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("'{value}' is not a known {kind}. Expected one of: {expected}.")]
pub struct ParseSelectionError {
    kind: &'static str,
    value: String,
    expected: String,
}

fn parse_from<T: Copy + std::fmt::Display>(
    kind: &'static str,
    all: &[T],
    s: &str,
) -> Result<T, ParseSelectionError> {
    all.iter()
        .copied()
        .find(|candidate| candidate.to_string().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| ParseSelectionError {
            kind,
            value: s.to_string(),
            expected: all
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

// Configuration files go through `FromStr` as well, so `g071` or `Unlock`
// are accepted there just like on the command line.
macro_rules! parse_selection {
    ($ty:ty, $kind:literal) => {
        impl FromStr for $ty {
            type Err = ParseSelectionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_from($kind, &Self::ALL, s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = ParseSelectionError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

parse_selection!(Mcu, "MCU");
parse_selection!(SignalPin, "signal pin");
parse_selection!(Mode, "mode");

/// A complete set of user choices for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub mcu: Mcu,
    pub pin: SignalPin,
    pub mode: Mode,
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MCU {} PIN {} op {}",
            self.mcu,
            self.pin,
            self.mode.operation()
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    #[test_case("F051", Mcu::F051; "exact")]
    #[test_case("g071", Mcu::G071; "lower case")]
    #[test_case(" F421 ", Mcu::F421; "surrounding whitespace")]
    fn parses_mcu(input: &str, expected: Mcu) {
        assert_eq!(input.parse::<Mcu>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_mcu() {
        let error = "F103".parse::<Mcu>().unwrap_err();

        assert_eq!(
            error.to_string(),
            "'F103' is not a known MCU. Expected one of: F051, G071, L431, E230, F415, F421."
        );
    }

    #[test_case("pa15", SignalPin::PA15)]
    #[test_case("PB4", SignalPin::PB4)]
    fn parses_pin(input: &str, expected: SignalPin) {
        assert_eq!(input.parse::<SignalPin>().unwrap(), expected);
    }

    #[test_case("unlock", Mode::Unlock)]
    #[test_case("Lock", Mode::Lock)]
    fn parses_mode(input: &str, expected: Mode) {
        assert_eq!(input.parse::<Mode>().unwrap(), expected);
    }

    #[test]
    fn mcu_list_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        assert!(Mcu::ALL.iter().all(|mcu| seen.insert(*mcu)));
    }

    #[test]
    fn default_selection_matches_first_entries() {
        let selection = Selection::default();

        assert_eq!(selection.mcu, Mcu::ALL[0]);
        assert_eq!(selection.pin, SignalPin::ALL[0]);
        assert_eq!(selection.mode, Mode::Unlock);
        assert_eq!(selection.to_string(), "MCU F051 PIN PA2 op unlock");
    }
}
