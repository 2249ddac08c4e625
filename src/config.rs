use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::projection::DisplayMode;
use crate::viewport::DEFAULT_END_SLACK_PX;

const DEFAULT_ENV_PREFIX: &str = "WSIMPLE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Channel identity per view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelsConfig {
    #[serde(default = "default_dashboard_channel")]
    pub dashboard: String,
    #[serde(default = "default_activities_channel")]
    pub activities: String,
    #[serde(default = "default_stock_channel")]
    pub stock: String,
    #[serde(default = "default_search_channel")]
    pub search: String,
    #[serde(default = "default_settings_channel")]
    pub settings: String,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            dashboard: default_dashboard_channel(),
            activities: default_activities_channel(),
            stock: default_stock_channel(),
            search: default_search_channel(),
            settings: default_settings_channel(),
        }
    }
}

fn default_dashboard_channel() -> String {
    "dashboard".into()
}

fn default_activities_channel() -> String {
    "activities".into()
}

fn default_stock_channel() -> String {
    "stock".into()
}

fn default_search_channel() -> String {
    "search".into()
}

fn default_settings_channel() -> String {
    "settings".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    /// Pixels of remaining content still counted as "at the end".
    #[serde(default = "default_end_threshold_px")]
    pub end_threshold_px: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            end_threshold_px: default_end_threshold_px(),
        }
    }
}

fn default_end_threshold_px() -> f64 {
    DEFAULT_END_SLACK_PX
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ViewConfig {
    #[serde(default)]
    pub default_mode: DisplayMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReplayConfig {
    #[serde(default, with = "humantime_serde")]
    pub response_delay: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        anyhow::ensure!(
            path.exists(),
            "config: file {} does not exist",
            path.display()
        );
        let from_file = read_config_file(path)?;
        cfg = merge_config(cfg, from_file);
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix)?;

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    check_end_threshold(config.feed.end_threshold_px)
        .with_context(|| format!("config: invalid feed.end_threshold_px in {}", path.display()))?;
    Ok(config)
}

fn check_end_threshold(px: f64) -> Result<f64> {
    anyhow::ensure!(
        px.is_finite() && px >= 0.0,
        "end_threshold_px must be a finite, non-negative number of pixels (got {px})"
    );
    Ok(px)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    let channels = other.channels;
    for (slot, name) in [
        (&mut base.channels.dashboard, channels.dashboard),
        (&mut base.channels.activities, channels.activities),
        (&mut base.channels.stock, channels.stock),
        (&mut base.channels.search, channels.search),
        (&mut base.channels.settings, channels.settings),
    ] {
        if !name.trim().is_empty() {
            *slot = name;
        }
    }

    base.feed.end_threshold_px = other.feed.end_threshold_px;
    base.view.default_mode = other.view.default_mode;
    if !other.log.filter.trim().is_empty() {
        base.log.filter = other.log.filter;
    }
    base.replay.response_delay = other.replay.response_delay;

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) -> Result<()> {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value).with_context(|| {
            let var = key.to_uppercase().replace('.', "__");
            format!("config: invalid value for {upper_prefix}{var}")
        })?;
    }

    Ok(())
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) -> Result<()> {
    match key {
        "channels.dashboard" => cfg.channels.dashboard = value,
        "channels.activities" => cfg.channels.activities = value,
        "channels.stock" => cfg.channels.stock = value,
        "channels.search" => cfg.channels.search = value,
        "channels.settings" => cfg.channels.settings = value,
        "feed.end_threshold_px" => {
            cfg.feed.end_threshold_px = check_end_threshold(value.trim().parse::<f64>()?)?;
        }
        "view.default_mode" => cfg.view.default_mode = value.parse()?,
        "log.filter" => cfg.log.filter = value,
        "replay.response_delay" => {
            cfg.replay.response_delay = humantime::parse_duration(value.trim())?;
        }
        _ => {}
    }
    Ok(())
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wsimple-sync").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated(prefix: &str) -> (tempfile::TempDir, LoadOptions) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "{}\n").unwrap();
        let options = LoadOptions {
            config_file: Some(path),
            env_prefix: Some(prefix.to_string()),
        };
        (dir, options)
    }

    #[test]
    fn load_defaults_from_empty_file() {
        let (_dir, options) = isolated("WSIMPLE_TEST_DEFAULTS");
        let cfg = load(options).unwrap();
        assert_eq!(cfg.channels.activities, "activities");
        assert_eq!(cfg.feed.end_threshold_px, 1.0);
        assert_eq!(cfg.view.default_mode, DisplayMode::Price);
        assert_eq!(cfg.log.filter, "info");
        assert_eq!(cfg.replay.response_delay, Duration::ZERO);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "channels:\n  dashboard: home\nfeed:\n  end_threshold_px: 4.5\nview:\n  default_mode: shares\nreplay:\n  response_delay: 250ms\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("WSIMPLE_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.channels.dashboard, "home");
        assert_eq!(cfg.channels.search, "search");
        assert_eq!(cfg.feed.end_threshold_px, 4.5);
        assert_eq!(cfg.view.default_mode, DisplayMode::Shares);
        assert_eq!(cfg.replay.response_delay, Duration::from_millis(250));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = load(LoadOptions {
            config_file: Some(dir.path().join("absent.yaml")),
            env_prefix: Some("WSIMPLE_TEST_MISSING".into()),
        })
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn env_overrides() {
        env::set_var("WSIMPLE_TEST_ENV_VIEW__DEFAULT_MODE", "shares");
        env::set_var("WSIMPLE_TEST_ENV_LOG__FILTER", "debug");
        env::set_var("WSIMPLE_TEST_ENV_REPLAY__RESPONSE_DELAY", "1s");
        let (_dir, options) = isolated("WSIMPLE_TEST_ENV");
        let cfg = load(options).unwrap();
        assert_eq!(cfg.view.default_mode, DisplayMode::Shares);
        assert_eq!(cfg.log.filter, "debug");
        assert_eq!(cfg.replay.response_delay, Duration::from_secs(1));
        env::remove_var("WSIMPLE_TEST_ENV_VIEW__DEFAULT_MODE");
        env::remove_var("WSIMPLE_TEST_ENV_LOG__FILTER");
        env::remove_var("WSIMPLE_TEST_ENV_REPLAY__RESPONSE_DELAY");
    }

    #[test]
    fn bad_env_value_is_reported() {
        env::set_var("WSIMPLE_TEST_BAD_FEED__END_THRESHOLD_PX", "lots");
        let (_dir, options) = isolated("WSIMPLE_TEST_BAD");
        let err = load(options).unwrap_err();
        env::remove_var("WSIMPLE_TEST_BAD_FEED__END_THRESHOLD_PX");
        assert!(format!("{err:#}").contains("WSIMPLE_TEST_BAD_FEED__END_THRESHOLD_PX"));
    }

    #[test]
    fn non_finite_threshold_from_env_is_rejected() {
        for (prefix, value) in [("WSIMPLE_TEST_NAN", "NaN"), ("WSIMPLE_TEST_NEG", "-3")] {
            let var = format!("{prefix}_FEED__END_THRESHOLD_PX");
            env::set_var(&var, value);
            let (_dir, options) = isolated(prefix);
            let err = load(options).unwrap_err();
            env::remove_var(&var);
            let message = format!("{err:#}");
            assert!(message.contains(&var), "{message}");
            assert!(message.contains("non-negative"), "{message}");
        }
    }

    #[test]
    fn non_finite_threshold_in_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "feed:\n  end_threshold_px: .nan\n").unwrap();
        let err = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("WSIMPLE_TEST_NAN_FILE".into()),
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("end_threshold_px"));
    }
}
