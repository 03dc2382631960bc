use std::{io::Write, path::PathBuf};

use colored::Colorize;

use esc_unlocker::{
    config::Config,
    resources::Resources,
    selection::{Mcu, Mode, SignalPin},
};

#[derive(clap::Parser)]
pub struct Cmd {
    /// Directory containing `tools/`, `MCU/` and `bootloaders/`
    #[arg(long, value_name = "DIR")]
    resource_dir: Option<PathBuf>,
}

impl Cmd {
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let resources = Resources::locate(
            self.resource_dir
                .as_deref()
                .or(config.resource_dir.as_deref()),
        )?
        .with_openocd(config.openocd.clone());

        print_table(&mut std::io::stdout().lock(), &resources)?;

        Ok(())
    }
}

fn mark(present: bool) -> String {
    if present {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    }
}

fn print_table(out: &mut impl Write, resources: &Resources) -> std::io::Result<()> {
    let openocd = resources.openocd();
    writeln!(out, "Resources: {}", resources.root().display())?;
    writeln!(
        out,
        "OpenOCD:   {} ({})",
        openocd.display(),
        if openocd.is_file() { "found" } else { "missing" }
    )?;
    writeln!(
        out,
        "Modes:     {}",
        Mode::ALL.map(|m| m.operation()).join(", ")
    )?;
    writeln!(out)?;

    write!(out, "{:<6}", "MCU")?;
    for mode in Mode::ALL {
        write!(out, " {:<7}", mode.operation())?;
    }
    for pin in SignalPin::ALL {
        write!(out, " {:<5}", pin.to_string())?;
    }
    writeln!(out)?;

    for mcu in Mcu::ALL {
        write!(out, "{:<6}", mcu.to_string())?;
        for mode in Mode::ALL {
            let present = resources.config_file(mcu, mode).is_file();
            // Pad before coloring, escape codes would count towards the width.
            write!(out, " {}{}", mark(present), pad(present, 7))?;
        }
        for pin in SignalPin::ALL {
            let present = resources.bootloader(mcu, pin).is_file();
            write!(out, " {}{}", mark(present), pad(present, 5))?;
        }
        writeln!(out)?;
    }

    Ok(())
}

fn pad(present: bool, width: usize) -> String {
    let len = if present { 3 } else { 2 };
    " ".repeat(width.saturating_sub(len))
}
