use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "inkvault";
pub const APP_NAME: &str = "inkvault";

pub const SETTINGS_ENV: &str = "INKVAULT_SETTINGS";

fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))
}

pub fn data_dir() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

pub fn notes_dir() -> anyhow::Result<PathBuf> {
    Ok(data_dir()?.join("notes"))
}

pub fn settings_path() -> anyhow::Result<PathBuf> {
    if let Ok(override_path) = std::env::var(SETTINGS_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    Ok(project_dirs()?.config_dir().join("settings.json"))
}
