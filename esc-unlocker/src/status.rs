use std::time::Duration;

use colored::Color;

/// The state shown on the status indicator while a run is in progress.
#[derive(Debug, docsplay::Display, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// idle
    Idle,
    /// searching for target
    Searching,
    /// target found
    Found,
    /// succeeded
    Succeeded,
}

/// A beep of a given pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration: Duration,
}

impl Tone {
    const fn short(frequency_hz: u32) -> Self {
        Self {
            frequency_hz,
            duration: Duration::from_millis(100),
        }
    }
}

const SEARCHING: [Tone; 1] = [Tone::short(300)];
const FOUND: [Tone; 1] = [Tone::short(880)];
const SUCCEEDED: [Tone; 3] = [Tone::short(600), Tone::short(800), Tone::short(1000)];

impl Status {
    /// Color of the status LED.
    pub fn color(self) -> Color {
        match self {
            Status::Idle => Color::BrightBlack,
            Status::Searching => Color::Red,
            Status::Found => Color::TrueColor {
                r: 255,
                g: 165,
                b: 0,
            },
            Status::Succeeded => Color::Green,
        }
    }

    /// The tones announcing a transition into this status, in playback order.
    pub fn tones(self) -> &'static [Tone] {
        match self {
            Status::Idle => &[],
            Status::Searching => &SEARCHING,
            Status::Found => &FOUND,
            Status::Succeeded => &SUCCEEDED,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    #[test_case(Status::Idle, &[]; "idle is silent")]
    #[test_case(Status::Searching, &[300]; "searching")]
    #[test_case(Status::Found, &[880]; "found")]
    #[test_case(Status::Succeeded, &[600, 800, 1000]; "success is a rising triad")]
    fn tones_per_status(status: Status, expected: &[u32]) {
        let frequencies: Vec<u32> = status.tones().iter().map(|t| t.frequency_hz).collect();

        assert_eq!(frequencies, expected);
    }

    #[test]
    fn tones_are_short() {
        for status in [Status::Searching, Status::Found, Status::Succeeded] {
            assert!(status
                .tones()
                .iter()
                .all(|tone| tone.duration == Duration::from_millis(100)));
        }
    }
}
