//! Persistent defaults, read from `.esc-unlocker.{toml,json,yaml,yml}` files
//! and `ESC_UNLOCKER_*` environment variables.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{
    logging::LevelFilter,
    runner::RunnerSettings,
    selection::{Mcu, Mode, Selection, SignalPin},
    session_log::DEFAULT_SESSION_LOG,
};

/// Configuration file name, without extension.
const CONFIG_FILE: &str = ".esc-unlocker";

const ENV_PREFIX: &str = "ESC_UNLOCKER_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse the configuration:\n{}", join_errors(.0))]
    Parse(figment::Error),
    #[error("The format of '{}' is not recognized from its extension (supported: .toml, .json, .yaml / .yml).", .0.display())]
    UnknownFormat(PathBuf),
    #[error("The configuration file '{}' does not exist.", .0.display())]
    NoSuchFile(PathBuf),
}

fn join_errors(error: &figment::Error) -> String {
    error
        .clone()
        .into_iter()
        .map(|e| e.to_string())
        .collect::<Vec<String>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub mcu: Mcu,
    pub pin: SignalPin,
    pub mode: Mode,
    /// Directory holding `tools/`, `MCU/` and `bootloaders/`.
    pub resource_dir: Option<PathBuf>,
    /// OpenOCD binary to use instead of the bundled one.
    pub openocd: Option<PathBuf>,
    pub session_log: PathBuf,
    pub sound: bool,
    pub log_level: Option<LevelFilter>,
    pub poll_interval_ms: u64,
    pub retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let runner = RunnerSettings::default();
        Self {
            mcu: Mcu::default(),
            pin: SignalPin::default(),
            mode: Mode::default(),
            resource_dir: None,
            openocd: None,
            session_log: PathBuf::from(DEFAULT_SESSION_LOG),
            sound: true,
            log_level: None,
            poll_interval_ms: runner.poll_interval.as_millis() as u64,
            retry_delay_ms: runner.retry_delay.as_millis() as u64,
        }
    }
}

impl Config {
    /// Loads the configuration from the user's home directory, the current
    /// directory, an optional explicit file and the environment, later
    /// sources overriding earlier ones.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let home = directories::UserDirs::new().map(|user| user.home_dir().to_path_buf());
        let mut dirs = Vec::new();
        dirs.extend(home);
        dirs.push(PathBuf::from("."));

        let mut figment = Self::figment(&dirs);
        if let Some(file) = explicit {
            figment = merge_file(figment, file)?;
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).only(&[
            "mcu",
            "pin",
            "mode",
            "resource_dir",
            "openocd",
            "session_log",
            "sound",
            "log_level",
            "poll_interval_ms",
            "retry_delay_ms",
        ]));

        figment.extract().map_err(ConfigError::Parse)
    }

    /// Defaults merged with the configuration files found in `dirs`, in
    /// order.
    fn figment(dirs: &[PathBuf]) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        for dir in dirs {
            figment = figment
                .merge(Toml::file(dir.join(format!("{CONFIG_FILE}.toml"))))
                .merge(Json::file(dir.join(format!("{CONFIG_FILE}.json"))))
                .merge(Yaml::file(dir.join(format!("{CONFIG_FILE}.yaml"))))
                .merge(Yaml::file(dir.join(format!("{CONFIG_FILE}.yml"))));
        }
        figment
    }

    pub fn selection(&self) -> Selection {
        Selection {
            mcu: self.mcu,
            pin: self.pin,
            mode: self.mode,
        }
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

fn merge_file(figment: Figment, file: &Path) -> Result<Figment, ConfigError> {
    if !file.is_file() {
        return Err(ConfigError::NoSuchFile(file.to_path_buf()));
    }
    Ok(match file.extension().and_then(|e| e.to_str()) {
        Some("toml") => figment.merge(Toml::file(file)),
        Some("json") => figment.merge(Json::file(file)),
        Some("yml" | "yaml") => figment.merge(Yaml::file(file)),
        _ => return Err(ConfigError::UnknownFormat(file.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    fn extract(dirs: &[PathBuf]) -> Result<Config, ConfigError> {
        Config::figment(dirs).extract().map_err(ConfigError::Parse)
    }

    #[test]
    fn defaults_without_files() {
        let dir = tempfile::tempdir().unwrap();

        let config = extract(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.selection(), Selection::default());
        assert_eq!(config.runner_settings(), RunnerSettings::default());
    }

    #[test]
    fn later_directories_override_earlier_ones() {
        let home = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        fs::write(
            home.path().join(".esc-unlocker.toml"),
            "mcu = \"G071\"\npin = \"PB4\"\nsound = false\n",
        )
        .unwrap();
        fs::write(
            project.path().join(".esc-unlocker.yaml"),
            "mcu: L431\nmode: lock\n",
        )
        .unwrap();

        let config = extract(&[home.path().to_path_buf(), project.path().to_path_buf()]).unwrap();

        assert_eq!(
            config.selection(),
            Selection {
                mcu: Mcu::L431,
                pin: SignalPin::PB4,
                mode: Mode::Lock,
            }
        );
        assert!(!config.sound);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".esc-unlocker.json"), r#"{ "chip": "F051" }"#).unwrap();

        let error = extract(&[dir.path().to_path_buf()]).unwrap_err();

        assert!(error.to_string().contains("chip"), "{error}");
    }

    #[test]
    fn explicit_file_needs_known_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.ini");
        fs::write(&file, "mcu=F051").unwrap();

        let result = merge_file(Figment::new(), &file);

        assert!(matches!(result, Err(ConfigError::UnknownFormat(path)) if path == file));
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bench.toml");
        fs::write(&file, "retry_delay_ms = 1000\nlog_level = \"DEBUG\"\n").unwrap();

        let config: Config = merge_file(Config::figment(&[]), &file)
            .unwrap()
            .extract()
            .unwrap();

        assert_eq!(config.runner_settings().retry_delay, Duration::from_secs(1));
        assert_eq!(config.log_level, Some(LevelFilter::Debug));
    }

    #[test]
    fn selection_values_ignore_case() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".esc-unlocker.toml"),
            "mcu = \"g071\"\npin = \"pa15\"\nmode = \"Unlock\"\nlog_level = \"debug\"\n",
        )
        .unwrap();

        let config = extract(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(
            config.selection(),
            Selection {
                mcu: Mcu::G071,
                pin: SignalPin::PA15,
                mode: Mode::Unlock,
            }
        );
        assert_eq!(config.log_level, Some(LevelFilter::Debug));
    }

    #[test]
    fn unknown_mcu_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".esc-unlocker.toml"), "mcu = \"F103\"\n").unwrap();

        let error = extract(&[dir.path().to_path_buf()]).unwrap_err();

        assert!(error.to_string().contains("'F103' is not a known MCU"), "{error}");
    }
}
