use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::Context;
use colored::Colorize;
use signal_hook::consts::SIGINT;
use time::UtcOffset;

use esc_unlocker::{
    config::Config,
    feedback::{TerminalBell, TerminalFeedback, TonePlayer},
    invocation::Invocation,
    resources::Resources,
    runner::Runner,
    selection::{Mcu, Mode, Selection, SignalPin},
    session_log::SessionLog,
    status::Status,
};

#[derive(clap::Parser)]
pub struct Cmd {
    /// The MCU on the ESC
    #[arg(long, value_enum, ignore_case = true, help_heading = "TARGET")]
    mcu: Option<Mcu>,
    /// The signal pin the bootloader is built for
    #[arg(long, value_enum, ignore_case = true, help_heading = "TARGET")]
    pin: Option<SignalPin>,
    /// Whether to unlock or lock the flash
    #[arg(long, value_enum, ignore_case = true, help_heading = "TARGET")]
    mode: Option<Mode>,

    /// Directory containing `tools/`, `MCU/` and `bootloaders/`
    #[arg(long, value_name = "DIR", help_heading = "RESOURCES")]
    resource_dir: Option<PathBuf>,
    /// Use this OpenOCD binary instead of the bundled one
    #[arg(long, value_name = "PATH", help_heading = "RESOURCES")]
    openocd: Option<PathBuf>,
    /// Launch even if some of the required files are missing
    #[arg(long, help_heading = "RESOURCES")]
    no_check: bool,

    /// File the session is appended to
    #[arg(long, value_name = "PATH")]
    session_log: Option<PathBuf>,
    /// Do not ring the terminal bell on status changes
    #[arg(long, short)]
    quiet: bool,
    /// Print the OpenOCD command line and exit
    #[arg(long)]
    dry_run: bool,
}

impl Cmd {
    fn selection(&self, config: &Config) -> Selection {
        let defaults = config.selection();
        Selection {
            mcu: self.mcu.unwrap_or(defaults.mcu),
            pin: self.pin.unwrap_or(defaults.pin),
            mode: self.mode.unwrap_or(defaults.mode),
        }
    }

    fn sound(&self, config: &Config) -> bool {
        config.sound && !self.quiet
    }

    pub fn run(self, config: &Config, utc_offset: UtcOffset) -> anyhow::Result<bool> {
        let selection = self.selection(config);

        let resources = Resources::locate(
            self.resource_dir
                .as_deref()
                .or(config.resource_dir.as_deref()),
        )?
        .with_openocd(self.openocd.clone().or_else(|| config.openocd.clone()));

        let files = if self.no_check {
            resources.resolve(&selection)
        } else {
            resources
                .check(&selection)
                .with_context(|| format!("Cannot {} {}.", selection.mode.operation(), selection.mcu))?
        };

        let invocation = Invocation::openocd(&files);

        if self.dry_run {
            println!("{invocation}");
            return Ok(true);
        }

        let session_log = SessionLog::new(
            self.session_log
                .clone()
                .unwrap_or_else(|| config.session_log.clone()),
            utc_offset,
        );
        session_log.append(&format!("Starting {selection}"));

        eprintln!("Using config file '{}'", files.config_file.display());

        let player = self.sound(config).then(|| TonePlayer::spawn(TerminalBell));
        let feedback = TerminalFeedback::new(selection.mode, player);
        feedback.show(Status::Idle);

        let interrupted = Arc::new(AtomicBool::new(false));
        // A second Ctrl-C quits right away.
        let shutdown_id =
            signal_hook::flag::register_conditional_shutdown(SIGINT, 1, interrupted.clone())?;
        let flag_id = signal_hook::flag::register(SIGINT, interrupted.clone())?;

        let handle = Runner::new(invocation, (feedback, session_log.observer()))
            .with_settings(config.runner_settings())
            .start()?;

        let mut stop_requested = false;
        while !handle.is_finished() {
            if !stop_requested && interrupted.load(Ordering::Relaxed) {
                eprintln!("{}", "Stopping, press Ctrl-C again to quit.".yellow());
                handle.stop();
                stop_requested = true;
            }
            thread::sleep(Duration::from_millis(50));
        }

        let outcome = handle.join()?;

        signal_hook::low_level::unregister(flag_id);
        signal_hook::low_level::unregister(shutdown_id);

        tracing::info!(
            "Session log written to {}",
            session_log.path().display()
        );

        Ok(outcome.is_success())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(clap::Parser)]
    struct Wrapper {
        #[clap(flatten)]
        cmd: Cmd,
    }

    fn parse(args: &[&str]) -> Cmd {
        Wrapper::parse_from(std::iter::once("run").chain(args.iter().copied())).cmd
    }

    #[test]
    fn command_line_overrides_configuration() {
        let config = Config {
            mcu: Mcu::G071,
            pin: SignalPin::PA15,
            mode: Mode::Lock,
            ..Config::default()
        };

        let cmd = parse(&["--mcu", "f421", "--mode", "unlock"]);

        assert_eq!(
            cmd.selection(&config),
            Selection {
                mcu: Mcu::F421,
                pin: SignalPin::PA15,
                mode: Mode::Unlock,
            }
        );
    }

    #[test]
    fn falls_back_to_configuration() {
        let config = Config::default();

        let cmd = parse(&[]);

        assert_eq!(cmd.selection(&config), Selection::default());
    }

    #[test]
    fn quiet_flag_and_configuration_silence_the_bell() {
        let loud = Config::default();
        let silent = Config {
            sound: false,
            ..Config::default()
        };

        assert!(parse(&[]).sound(&loud));
        assert!(!parse(&["--quiet"]).sound(&loud));
        assert!(!parse(&["-q"]).sound(&loud));
        assert!(!parse(&[]).sound(&silent));
    }
}
