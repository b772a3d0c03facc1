//! Read `$XDG_CONFIG_HOME/<app>/config.toml`: the `[env]` table and the `[bot]` table.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::settings::BotSettings;
use crate::LoadError;

/// `$XDG_CONFIG_HOME` when set (any platform), else the platform config dir.
fn config_home() -> Result<PathBuf, LoadError> {
    match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => dirs::config_dir()
            .ok_or_else(|| LoadError::XdgPath("no config directory for this platform".into())),
    }
}

fn xdg_config_path(app_name: &str) -> Result<Option<PathBuf>, LoadError> {
    let path = config_home()?.join(app_name).join("config.toml");
    if path.exists() {
        Ok(Some(path))
    } else {
        Ok(None)
    }
}

#[derive(serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    bot: BotSettings,
}

fn read_config(app_name: &str) -> Result<ConfigFile, LoadError> {
    let path = match xdg_config_path(app_name)? {
        Some(p) => p,
        None => return Ok(ConfigFile::default()),
    };
    let content = std::fs::read_to_string(&path).map_err(LoadError::XdgRead)?;
    Ok(toml::from_str(&content)?)
}

/// Returns env key-value pairs from `[env]` section. Missing file or empty section returns empty map.
pub fn load_env_map(app_name: &str) -> Result<HashMap<String, String>, LoadError> {
    Ok(read_config(app_name)?.env)
}

/// Returns the `[bot]` section; missing file or section yields defaults.
pub fn load_bot_settings(app_name: &str) -> Result<BotSettings, LoadError> {
    Ok(read_config(app_name)?.bot)
}
