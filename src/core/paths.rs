use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base provost config directory (universal ~/.config/provost/ on all platforms)
pub fn provost() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected("APPDATA environment variable not set on Windows".to_string())
        })?;
        Ok(PathBuf::from(appdata).join("provost"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("provost"))
    }
}

/// Default target config file path
pub fn target_json() -> Result<PathBuf> {
    Ok(provost()?.join("target.json"))
}
