use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use crate::error::{HarnessError, HarnessResult};

/// Where Debian-family hosts keep versioned PostgreSQL installs.
pub const DEFAULT_BASE_DIR: &str = "/usr/lib/postgresql";

static SHARED: OnceCell<Installation> = OnceCell::new();

/// One installed PostgreSQL engine, located by scanning a base directory
/// for version-named subdirectories that contain `bin/pg_ctl`.
#[derive(Debug, Clone)]
pub struct Installation {
    version: u32,
    bin_dir: PathBuf,
}

impl Installation {
    /// Scan `base` and pick the numerically highest version whose control
    /// binary exists. An unreadable base directory or zero qualifying
    /// versions means there is no engine to drive, which is a distinguished
    /// initialization error rather than a process abort.
    pub fn discover(base: &Path) -> HarnessResult<Self> {
        let entries = std::fs::read_dir(base).map_err(|_| HarnessError::NoInstallation {
            base: base.to_path_buf(),
        })?;

        let mut newest: Option<Installation> = None;
        for entry in entries.flatten() {
            let Some(version) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };

            let bin_dir = entry.path().join("bin");
            if !bin_dir.join("pg_ctl").is_file() {
                continue;
            }

            if newest.as_ref().is_none_or(|best| version > best.version) {
                newest = Some(Installation { version, bin_dir });
            }
        }

        newest.ok_or_else(|| HarnessError::NoInstallation {
            base: base.to_path_buf(),
        })
    }

    /// Process-wide resolution: the first successful call fixes the result
    /// for the lifetime of the process.
    pub fn shared(base: &Path) -> HarnessResult<&'static Installation> {
        SHARED.get_or_try_init(|| Self::discover(base))
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Absolute path of a binary inside this installation.
    pub fn bin(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }
}
