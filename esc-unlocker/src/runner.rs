//! The retry loop around the external tool.
//!
//! A single worker thread launches the tool, waits for it while watching a
//! shared run flag, inspects what it printed and tries again until the tool
//! exits with code 0 or the flag is cleared from another thread.

use std::{
    ffi::OsString,
    io::{self, Read},
    process::{Child, ExitStatus},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{invocation::Invocation, status::Status};

/// Printed by OpenOCD once it has identified the core of the target.
pub const TARGET_MARKER: &str = "Cortex-M";

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Failed to launch '{}'.", .program.to_string_lossy())]
    Spawn {
        program: OsString,
        #[source]
        source: io::Error,
    },
    #[error("Failed to query the state of the running tool.")]
    Io(#[source] io::Error),
    #[error("A run is already in progress.")]
    AlreadyRunning,
    #[error("The worker thread panicked.")]
    WorkerPanicked,
}

/// Which output stream of the child a block of text came from.
#[derive(Debug, docsplay::Display, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// stdout
    Stdout,
    /// stderr
    Stderr,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded { attempts: u32 },
    Stopped { attempts: u32 },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }
}

/// Receives everything that happens during a run.
///
/// Called from the worker thread.
pub trait Observer: Send {
    fn status(&mut self, status: Status);

    fn output(&mut self, stream: Stream, text: &str);

    fn launch_failed(&mut self, error: &RunnerError);

    fn finished(&mut self, _outcome: &Outcome) {}
}

impl<A: Observer, B: Observer> Observer for (A, B) {
    fn status(&mut self, status: Status) {
        self.0.status(status);
        self.1.status(status);
    }

    fn output(&mut self, stream: Stream, text: &str) {
        self.0.output(stream, text);
        self.1.output(stream, text);
    }

    fn launch_failed(&mut self, error: &RunnerError) {
        self.0.launch_failed(error);
        self.1.launch_failed(error);
    }

    fn finished(&mut self, outcome: &Outcome) {
        self.0.finished(outcome);
        self.1.finished(outcome);
    }
}

/// The shared run state. Set while a run is active, cleared to ask the
/// worker to stop.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Marks the flag as running. Fails if it already was.
    fn arm(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    /// How often the running child is checked for exit and the flag for a
    /// stop request.
    pub poll_interval: Duration,
    /// Pause after the tool could not be launched at all.
    pub retry_delay: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            retry_delay: Duration::from_millis(250),
        }
    }
}

enum Attempt {
    Exited { success: bool },
    Interrupted,
}

pub struct Runner<O> {
    invocation: Invocation,
    observer: O,
    settings: RunnerSettings,
    running: StopFlag,
}

impl<O: Observer + 'static> Runner<O> {
    pub fn new(invocation: Invocation, observer: O) -> Self {
        Self {
            invocation,
            observer,
            settings: RunnerSettings::default(),
            running: StopFlag::new(),
        }
    }

    pub fn with_settings(mut self, settings: RunnerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Shares the run state with other runners, so only one of them can be
    /// active at a time.
    pub fn with_flag(mut self, flag: StopFlag) -> Self {
        self.running = flag;
        self
    }

    /// Starts the loop on a worker thread.
    pub fn start(self) -> Result<RunHandle, RunnerError> {
        if !self.running.arm() {
            return Err(RunnerError::AlreadyRunning);
        }

        let running = self.running.clone();
        let thread = thread::Builder::new()
            .name("openocd-runner".into())
            .spawn(move || self.run_loop())
            .map_err(|error| {
                running.stop();
                RunnerError::Io(error)
            })?;

        Ok(RunHandle { running, thread })
    }

    fn run_loop(mut self) -> Outcome {
        tracing::info!("Running {}", self.invocation);

        let mut attempts = 0;
        let outcome = loop {
            if !self.running.is_running() {
                break Outcome::Stopped { attempts };
            }

            attempts += 1;
            tracing::debug!("Attempt {attempts}");

            match self.attempt() {
                Ok(Attempt::Exited { success: true }) => {
                    self.running.stop();
                    break Outcome::Succeeded { attempts };
                }
                Ok(Attempt::Exited { success: false }) => {}
                Ok(Attempt::Interrupted) => break Outcome::Stopped { attempts },
                Err(error) => {
                    tracing::warn!(?error, "Launching the tool failed");
                    self.observer.launch_failed(&error);
                    self.pause(self.settings.retry_delay);
                }
            }
        };

        tracing::info!("Run finished: {outcome:?}");
        self.observer.finished(&outcome);
        outcome
    }

    fn attempt(&mut self) -> Result<Attempt, RunnerError> {
        let mut child =
            self.invocation
                .command()
                .spawn()
                .map_err(|source| RunnerError::Spawn {
                    program: self.invocation.program().to_os_string(),
                    source,
                })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        tracing::debug!("Spawned child {}", child.id());
        let exit = supervise(&mut child, &self.running, self.settings.poll_interval);

        // The child is gone in every case, so the readers see EOF.
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        for (stream, text) in [(Stream::Stdout, &stdout), (Stream::Stderr, &stderr)] {
            if !text.is_empty() {
                self.observer.output(stream, text);
            }
        }

        let Some(exit) = exit? else {
            return Ok(Attempt::Interrupted);
        };

        tracing::debug!("Child exited with {exit}");

        if stdout.contains(TARGET_MARKER) || stderr.contains(TARGET_MARKER) {
            self.observer.status(Status::Found);
        } else {
            self.observer.status(Status::Searching);
        }

        let success = exit.code() == Some(0);
        if success {
            self.observer.status(Status::Succeeded);
        }

        Ok(Attempt::Exited { success })
    }

    /// Sleeps for `duration`, waking early if a stop is requested.
    fn pause(&self, duration: Duration) {
        let step = self.settings.poll_interval.max(Duration::from_millis(1));
        let mut remaining = duration;
        while !remaining.is_zero() && self.running.is_running() {
            let nap = remaining.min(step);
            thread::sleep(nap);
            remaining -= nap;
        }
    }
}

/// The parts of a child process the runner needs.
trait Supervised {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;
    fn kill(&mut self) -> io::Result<()>;
    fn wait(&mut self) -> io::Result<ExitStatus>;
}

impl Supervised for Child {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Child::try_wait(self)
    }

    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        Child::wait(self)
    }
}

/// Waits for `child` to exit, polling `running` in between.
///
/// Returns `None` if a stop was requested. Unless it exited on its own, the
/// child is killed and reaped before this returns, also on errors.
fn supervise(
    child: &mut impl Supervised,
    running: &StopFlag,
    poll_interval: Duration,
) -> Result<Option<ExitStatus>, RunnerError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {}
            Err(error) => {
                reap(child);
                return Err(RunnerError::Io(error));
            }
        }
        if !running.is_running() {
            tracing::debug!("Stop requested, killing child");
            reap(child);
            return Ok(None);
        }
        thread::sleep(poll_interval);
    }
}

fn reap(child: &mut impl Supervised) {
    if let Err(error) = child.kill() {
        tracing::warn!("Failed to kill child: {error}");
    }
    if let Err(error) = child.wait() {
        tracing::warn!("Failed to wait for child: {error}");
    }
}

fn drain(mut pipe: impl Read + Send + 'static) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn collect(reader: Option<JoinHandle<io::Result<String>>>) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    match reader.join() {
        Ok(Ok(text)) => text,
        Ok(Err(error)) => {
            tracing::warn!("Failed to read output of child: {error}");
            String::new()
        }
        Err(_) => {
            tracing::warn!("Output reader thread panicked");
            String::new()
        }
    }
}

/// Handle to a run on its worker thread.
pub struct RunHandle {
    running: StopFlag,
    thread: JoinHandle<Outcome>,
}

impl RunHandle {
    /// Asks the worker to stop. A running child is killed.
    pub fn stop(&self) {
        self.running.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> Result<Outcome, RunnerError> {
        let outcome = self.thread.join().map_err(|_| RunnerError::WorkerPanicked);
        self.running.stop();
        outcome
    }
}
