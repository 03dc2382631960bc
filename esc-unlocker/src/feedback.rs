//! What the user sees and hears while a run is in progress.

use std::{
    io::{self, Write},
    sync::mpsc::{channel, Sender},
    thread::{self, JoinHandle},
};

use colored::Colorize;

use crate::{
    runner::{Observer, Outcome, RunnerError, Stream},
    selection::Mode,
    status::{Status, Tone},
};

/// Something that can make a sound.
pub trait Beeper: Send + 'static {
    /// Plays `tone`, returning once it is over.
    fn beep(&mut self, tone: Tone);
}

/// Rings the terminal bell. Terminals have no notion of pitch, so only the
/// rhythm of the tones survives.
pub struct TerminalBell;

impl Beeper for TerminalBell {
    fn beep(&mut self, tone: Tone) {
        let mut stderr = io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
        thread::sleep(tone.duration);
    }
}

/// Plays queued tones one after another on a background thread, so the
/// caller is never held up by playback.
pub struct TonePlayer {
    queue: Option<Sender<Tone>>,
    thread: Option<JoinHandle<()>>,
}

impl TonePlayer {
    pub fn spawn(mut beeper: impl Beeper) -> Self {
        let (tx, rx) = channel::<Tone>();

        let thread = thread::spawn(move || {
            for tone in rx {
                tracing::trace!("Playing {} Hz for {:?}", tone.frequency_hz, tone.duration);
                beeper.beep(tone);
            }
        });

        Self {
            queue: Some(tx),
            thread: Some(thread),
        }
    }

    pub fn play(&self, tones: &[Tone]) {
        let Some(queue) = &self.queue else {
            return;
        };
        for tone in tones {
            if queue.send(*tone).is_err() {
                tracing::debug!("Tone player is gone, dropping tone");
                return;
            }
        }
    }
}

impl Drop for TonePlayer {
    /// Lets queued tones finish.
    fn drop(&mut self) {
        drop(self.queue.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Prints the tool output and a colored status indicator, and plays the
/// status tones.
pub struct TerminalFeedback {
    mode: Mode,
    player: Option<TonePlayer>,
}

impl TerminalFeedback {
    pub fn new(mode: Mode, player: Option<TonePlayer>) -> Self {
        Self { mode, player }
    }

    pub fn show(&self, status: Status) {
        eprintln!(
            "{} {}",
            "●".color(status.color()).bold(),
            status.to_string().color(status.color())
        );
    }
}

impl Observer for TerminalFeedback {
    fn status(&mut self, status: Status) {
        self.show(status);
        if let Some(player) = &self.player {
            player.play(status.tones());
        }
    }

    fn output(&mut self, _stream: Stream, text: &str) {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        if !text.ends_with('\n') {
            let _ = stdout.write_all(b"\n");
        }
        let _ = stdout.flush();
    }

    fn launch_failed(&mut self, error: &RunnerError) {
        let message = match std::error::Error::source(error) {
            Some(source) => format!("Error running OpenOCD: {error} {source}"),
            None => format!("Error running OpenOCD: {error}"),
        };
        eprintln!("{}", message.red());
    }

    fn finished(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Succeeded { attempts } => eprintln!(
                "{}",
                format!("{} successful after {attempts} attempt(s).", self.mode).green()
            ),
            Outcome::Stopped { attempts } => eprintln!(
                "{}",
                format!("Stopped after {attempts} attempt(s).").yellow()
            ),
        }
    }
}
