use std::{collections::HashMap, fs, path::Path, time::Duration};

use client_core::LaunchOptions;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "exam-client.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub server_url: String,
    pub preferences_database_url: String,
    pub poll_interval_ms: u64,
    pub no_terminal: bool,
    pub terminal_port: Option<u16>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:9090".into(),
            preferences_database_url: "sqlite://./data/exam-client.db".into(),
            poll_interval_ms: 1_000,
            no_terminal: false,
            terminal_port: None,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            no_terminal: self.no_terminal,
            terminal_port: self.terminal_port,
            ..LaunchOptions::default()
        }
    }

    /// Query-string options (`?no_terminal=1&terminal_port=7682`) win over
    /// everything else, the way the embedding page would pass them.
    pub fn apply_query(&mut self, query: &str) {
        let options = LaunchOptions::from_query(query);
        if options.no_terminal {
            self.no_terminal = true;
        }
        if options.terminal_port.is_some() {
            self.terminal_port = options.terminal_port;
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_with(Path::new(DEFAULT_CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the flat toml file, then environment overrides.
pub fn load_settings_with(
    config_path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("server_url") {
                    settings.server_url = v.clone();
                }
                if let Some(v) = file_cfg.get("preferences_database_url") {
                    settings.preferences_database_url = v.clone();
                }
                if let Some(v) = file_cfg.get("poll_interval_ms") {
                    set_poll_interval(&mut settings, v);
                }
                if let Some(v) = file_cfg.get("no_terminal") {
                    settings.no_terminal = parse_bool(v);
                }
                if let Some(v) = file_cfg.get("terminal_port") {
                    set_terminal_port(&mut settings, v);
                }
            }
            Err(err) => warn!(
                path = %config_path.display(),
                error = %err,
                "config: ignoring unreadable config file"
            ),
        }
    }

    if let Some(v) = env("EXAM_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = env("PREFERENCES_DATABASE_URL") {
        settings.preferences_database_url = v;
    }
    if let Some(v) = env("APP__PREFERENCES_DATABASE_URL") {
        settings.preferences_database_url = v;
    }

    if let Some(v) = env("APP__POLL_INTERVAL_MS") {
        set_poll_interval(&mut settings, &v);
    }

    if let Some(v) = env("NO_TERMINAL") {
        settings.no_terminal = parse_bool(&v);
    }
    if let Some(v) = env("TTYD_PORT") {
        set_terminal_port(&mut settings, &v);
    }

    settings
}

fn set_poll_interval(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => settings.poll_interval_ms = parsed,
        _ => warn!(value = raw, "config: ignoring invalid poll interval"),
    }
}

fn set_terminal_port(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<u16>() {
        Ok(port) if port > 0 => settings.terminal_port = Some(port),
        _ => warn!(value = raw, "config: ignoring invalid terminal port"),
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().preferences_database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
