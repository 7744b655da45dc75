use directories::ProjectDirs;
use std::path::PathBuf;

use crate::error::{MailError, Result};

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "sealpost";
pub const APP_NAME: &str = "sealpost";

/// Overrides the platform data directory.
pub const HOME_ENV: &str = "SEALPOST_HOME";

pub const CONFIG_FILE: &str = "config.json";

pub fn data_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| MailError::Config("cannot determine data directory".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(CONFIG_FILE))
}
