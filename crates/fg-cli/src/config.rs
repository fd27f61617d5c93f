//! Configuration loading and management.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Hosts file that receives the block region.
    pub hosts_path: PathBuf,
    /// Mode used by `fg start` when none is given.
    pub default_mode: String,
    /// Session length in minutes per mode.
    pub modes: BTreeMap<String, u64>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("hosts_path", &self.hosts_path)
            .field("default_mode", &self.default_mode)
            .field("modes", &self.modes.len())
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        let modes = [
            ("pomodoro", 25),
            ("short_break", 5),
            ("long_break", 15),
            ("deepwork", 90),
            ("quick", 15),
        ]
        .into_iter()
        .map(|(name, minutes)| (name.to_string(), minutes))
        .collect();
        Self {
            database_path: data_dir.join("focusguard.db"),
            hosts_path: default_hosts_path(),
            default_mode: "pomodoro".to_string(),
            modes,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // FG_DATABASE_PATH, FG_HOSTS_PATH, FG_DEFAULT_MODE
        figment = figment.merge(Env::prefixed("FG_"));

        figment.extract()
    }

    /// Configured length of `mode` in minutes.
    pub fn minutes_for(&self, mode: &str) -> Option<u64> {
        self.modes.get(mode).copied()
    }
}

#[cfg(windows)]
fn default_hosts_path() -> PathBuf {
    PathBuf::from(r"C:\Windows\System32\drivers\etc\hosts")
}

#[cfg(not(windows))]
fn default_hosts_path() -> PathBuf {
    PathBuf::from("/etc/hosts")
}

/// Returns the platform-specific config directory for FocusGuard.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("focusguard"))
}

/// Returns the platform-specific data directory for FocusGuard.
///
/// On Linux: `~/.local/share/focusguard`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("focusguard"))
}
