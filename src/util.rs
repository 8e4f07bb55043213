use std::path::PathBuf;

const SPEEDWATCH_CONFIG: &str = "SPEEDWATCH_CONFIG";

const DEFAULT_CONFIG: &str = "./speedwatch.json";

pub fn get_default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG)
}

/// Config path from the environment, falling back to `./speedwatch.json`
pub fn get_config_path() -> PathBuf {
    std::env::var_os(SPEEDWATCH_CONFIG)
        .filter(|path| !path.is_empty())
        .map_or_else(get_default_config_path, PathBuf::from)
}
