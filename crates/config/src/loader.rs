use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::WagateConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["wagate.toml", "wagate.yaml", "wagate.yml", "wagate.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<WagateConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw).map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
    parse_config(&raw, path)
}

/// Load from an explicit path, or fall back to discovery.
///
/// An explicit path that fails to load is an error; a discovered file that
/// fails to load only logs a warning.
pub fn load_from(path: Option<&Path>) -> anyhow::Result<WagateConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(path)
        },
        None => Ok(discover_and_load()),
    }
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./wagate.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/wagate/wagate.{toml,yaml,yml,json}` (user-global)
///
/// Returns `WagateConfig::default()` if no config file is found.
pub fn discover_and_load() -> WagateConfig {
    let mut dirs = vec![PathBuf::from(".")];
    dirs.extend(config_dir());
    discover_in(&dirs)
}

/// Discovery over an explicit list of directories.
pub fn discover_in(dirs: &[PathBuf]) -> WagateConfig {
    let Some(path) = find_config_file(dirs) else {
        debug!("no config file found, using defaults");
        return WagateConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            WagateConfig::default()
        },
    }
}

fn find_config_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.exists())
}

/// Returns `~/.config/wagate/` on all platforms.
pub fn config_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".config").join("wagate"))
}

/// Returns the data directory: `~/.wagate/` on all platforms.
pub fn data_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join(".wagate"))
        .unwrap_or_else(|| PathBuf::from(".wagate"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Serialize the effective config for display.
pub fn to_toml(config: &WagateConfig) -> anyhow::Result<String> {
    toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<WagateConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
