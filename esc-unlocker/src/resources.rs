//! Locating the OpenOCD binary, its per-MCU scripts and the AM32 bootloader
//! images that ship next to the tool.

use std::path::{Path, PathBuf};

use crate::selection::{Mcu, Mode, Selection, SignalPin};

/// Bootloader release bundled with the tool.
const BOOTLOADER_VERSION: &str = "V12";

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("The resource directory '{}' does not exist.", .0.display())]
    NoSuchDirectory(PathBuf),
    #[error("Required files are missing:\n{}", print_missing(.0))]
    Missing(Vec<PathBuf>),
    #[error("Failed to determine the current directory.")]
    CurrentDir(#[source] std::io::Error),
}

fn print_missing(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The bundled files needed for one selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFiles {
    pub openocd: PathBuf,
    pub config_file: PathBuf,
    pub bootloader: PathBuf,
}

impl ResolvedFiles {
    /// Returns the files that do not exist on disk.
    pub fn missing(&self) -> Vec<PathBuf> {
        [&self.openocd, &self.config_file, &self.bootloader]
            .into_iter()
            .filter(|path| !path.is_file())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Resources {
    root: PathBuf,
    openocd: Option<PathBuf>,
}

impl Resources {
    /// Uses `root` as the base directory for all bundled files.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            openocd: None,
        }
    }

    /// Picks the resource root.
    ///
    /// An explicit directory wins. Otherwise the directory of the running
    /// executable is used if it carries a `tools` folder, and the current
    /// directory as a last resort.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, ResourceError> {
        if let Some(dir) = explicit {
            if !dir.is_dir() {
                return Err(ResourceError::NoSuchDirectory(dir.to_path_buf()));
            }
            let dir = dunce::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
            return Ok(Self::new(dir));
        }

        if let Some(dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            if dir.join("tools").is_dir() {
                tracing::debug!("Using resources next to the executable in {}", dir.display());
                return Ok(Self::new(dir));
            }
        }

        let cwd = std::env::current_dir().map_err(ResourceError::CurrentDir)?;
        tracing::debug!("Using resources from {}", cwd.display());
        Ok(Self::new(cwd))
    }

    /// Overrides the OpenOCD binary instead of the bundled one.
    pub fn with_openocd(mut self, openocd: Option<PathBuf>) -> Self {
        self.openocd = openocd;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn openocd(&self) -> PathBuf {
        match &self.openocd {
            Some(path) => path.clone(),
            None => self.root.join(bundled_openocd()),
        }
    }

    pub fn config_file(&self, mcu: Mcu, mode: Mode) -> PathBuf {
        self.root
            .join("MCU")
            .join(mcu.to_string())
            .join(format!("openocd-{}.cfg", mode.operation()))
    }

    pub fn bootloader(&self, mcu: Mcu, pin: SignalPin) -> PathBuf {
        self.root.join("bootloaders").join(format!(
            "AM32_{mcu}_BOOTLOADER_{pin}_{BOOTLOADER_VERSION}.bin"
        ))
    }

    pub fn resolve(&self, selection: &Selection) -> ResolvedFiles {
        ResolvedFiles {
            openocd: self.openocd(),
            config_file: self.config_file(selection.mcu, selection.mode),
            bootloader: self.bootloader(selection.mcu, selection.pin),
        }
    }

    /// Resolves the files for `selection` and fails if any of them is absent.
    pub fn check(&self, selection: &Selection) -> Result<ResolvedFiles, ResourceError> {
        let files = self.resolve(selection);
        let missing = files.missing();
        if missing.is_empty() {
            Ok(files)
        } else {
            Err(ResourceError::Missing(missing))
        }
    }
}

fn bundled_openocd() -> &'static Path {
    if cfg!(windows) {
        Path::new("tools/windows/openocd/bin/openocd.exe")
    } else {
        Path::new("tools/linux/openocd/bin/openocd")
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn builds_paths_from_selection() {
        let resources = Resources::new("/opt/am32");

        assert_eq!(
            resources.config_file(Mcu::G071, Mode::Lock),
            Path::new("/opt/am32/MCU/G071/openocd-lock.cfg")
        );
        assert_eq!(
            resources.bootloader(Mcu::F421, SignalPin::PA15),
            Path::new("/opt/am32/bootloaders/AM32_F421_BOOTLOADER_PA15_V12.bin")
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn bundled_openocd_is_under_tools() {
        let resources = Resources::new("/opt/am32");

        assert_eq!(
            resources.openocd(),
            Path::new("/opt/am32/tools/linux/openocd/bin/openocd")
        );
    }

    #[test]
    fn openocd_override_wins() {
        let resources =
            Resources::new("/opt/am32").with_openocd(Some(PathBuf::from("/usr/bin/openocd")));

        assert_eq!(resources.openocd(), Path::new("/usr/bin/openocd"));
    }

    #[test]
    fn check_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let resources = Resources::new(dir.path());
        let selection = Selection::default();
        touch(&resources.openocd());
        touch(&resources.config_file(selection.mcu, selection.mode));

        let Err(ResourceError::Missing(missing)) = resources.check(&selection) else {
            panic!("expected the bootloader to be reported missing");
        };

        assert_eq!(
            missing,
            vec![resources.bootloader(selection.mcu, selection.pin)]
        );
    }

    #[test]
    fn check_passes_when_everything_is_present() {
        let dir = tempfile::tempdir().unwrap();
        let resources = Resources::new(dir.path());
        let selection = Selection::default();
        let files = resources.resolve(&selection);
        touch(&files.openocd);
        touch(&files.config_file);
        touch(&files.bootloader);

        assert_eq!(resources.check(&selection).unwrap(), files);
    }

    #[test]
    fn explicit_directory_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");

        assert!(matches!(
            Resources::locate(Some(&gone)),
            Err(ResourceError::NoSuchDirectory(path)) if path == gone
        ));
    }
}
