use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::hackernews::HN_BASE_URL;

const DEFAULT_ENV_PREFIX: &str = "HNCLI";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub hn: HnConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HnConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HnConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    HN_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("hncli/{} (+https://github.com/hncli/hncli)", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiConfig {
    /// Stories shown by `ls` when no count is given.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    /// Share of the terminal width used for comment text.
    #[serde(default = "default_width_percent")]
    pub width_percent: u8,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            width_percent: default_width_percent(),
        }
    }
}

fn default_page_limit() -> usize {
    10
}

fn default_width_percent() -> u8 {
    95
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix));

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.hn.base_url.is_empty() {
        base.hn.base_url = other.hn.base_url;
    }
    if !other.hn.user_agent.is_empty() {
        base.hn.user_agent = other.hn.user_agent;
    }
    if other.hn.timeout != Duration::ZERO {
        base.hn.timeout = other.hn.timeout;
    }

    if other.ui.page_limit != 0 {
        base.ui.page_limit = other.ui.page_limit;
    }
    if other.ui.width_percent != 0 {
        base.ui.width_percent = other.ui.width_percent;
    }

    base
}

fn load_env(prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    // Start from a blank config so only keys actually present in the
    // environment survive the merge.
    let mut cfg = Config {
        hn: HnConfig {
            base_url: String::new(),
            user_agent: String::new(),
            timeout: Duration::ZERO,
        },
        ui: UiConfig {
            page_limit: 0,
            width_percent: 0,
        },
    };
    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }
    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "hn.base_url" => cfg.hn.base_url = value,
        "hn.user_agent" => cfg.hn.user_agent = value,
        "hn.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.hn.timeout = duration;
            }
        }
        "ui.page_limit" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.ui.page_limit = parsed;
            }
        }
        "ui.width_percent" => {
            if let Ok(parsed) = value.parse::<u8>() {
                cfg.ui.width_percent = parsed;
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hncli").join("config.yaml"))
}
