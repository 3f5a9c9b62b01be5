use directories::ProjectDirs;
use std::{
    env,
    path::PathBuf,
};

lazy_static::lazy_static! {
    static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase();
    static ref CONFIG_DIR_OVERRIDE: Option<PathBuf> = env::var_os(format!("{}_CONFIG", *PROJECT_NAME)).map(PathBuf::from);
}

/// Directory searched for `config.yaml` when no `--config` is given.
///
/// `MEDIAMTX_MONITOR_CONFIG_CONFIG` takes precedence over the platform config
/// directory. Without either, `./.config` is used.
pub(crate) fn get_config_dir() -> PathBuf {
    CONFIG_DIR_OVERRIDE
        .clone()
        .or_else(|| project_directory().map(|dirs| dirs.config_local_dir().to_path_buf()))
        .unwrap_or_else(|| PathBuf::from(".").join(".config"))
}

pub(crate) fn default_config_file() -> PathBuf {
    get_config_dir().join("config.yaml")
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "mediamtx", "mediamtx-monitor")
}
