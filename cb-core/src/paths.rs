//! Where CleanBiz keeps its files.
//!
//! `CLEANBIZ_HOME` puts everything (config, database, logs) under one
//! directory, which is how deployments and tests pin the layout. Without it
//! the OS data and config directories are used.

use std::path::PathBuf;

use crate::constants::APP_NAME;
use crate::error::{CbError, CbResult};

pub const HOME_ENV: &str = "CLEANBIZ_HOME";

fn home_override() -> Option<PathBuf> {
    std::env::var_os(HOME_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Directory for the database and logs.
///
/// `~/.local/share/CleanBiz` on Linux, `~/Library/Application Support/CleanBiz`
/// on macOS, `%APPDATA%/CleanBiz` on Windows.
pub fn data_dir() -> CbResult<PathBuf> {
    if let Some(home) = home_override() {
        return Ok(home);
    }
    dirs::data_dir()
        .map(|base| base.join(APP_NAME))
        .ok_or_else(|| CbError::Config("could not determine data directory".into()))
}

/// Directory holding `config.toml`.
pub fn config_dir() -> CbResult<PathBuf> {
    if let Some(home) = home_override() {
        return Ok(home);
    }
    dirs::config_dir()
        .map(|base| base.join(APP_NAME))
        .ok_or_else(|| CbError::Config("could not determine config directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_override_wins() {
        std::env::set_var(HOME_ENV, "/srv/cleanbiz");
        assert_eq!(data_dir().unwrap(), PathBuf::from("/srv/cleanbiz"));
        assert_eq!(config_dir().unwrap(), PathBuf::from("/srv/cleanbiz"));
        std::env::remove_var(HOME_ENV);

        if let Ok(dir) = data_dir() {
            assert!(dir.ends_with(APP_NAME));
        }
    }
}
