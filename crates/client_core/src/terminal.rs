//! Embedded terminal panel resolution.

use shared::protocol::TerminalStatus;
use tracing::{debug, warn};

use crate::api::ExamApi;

pub const DEFAULT_TERMINAL_HOST: &str = "localhost";

/// Options handed over by whatever launched the client (the page's query
/// string in the browser build, CLI flags here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub no_terminal: bool,
    pub terminal_port: Option<u16>,
    pub terminal_host: String,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            no_terminal: false,
            terminal_port: None,
            terminal_host: DEFAULT_TERMINAL_HOST.to_string(),
        }
    }
}

impl LaunchOptions {
    /// Parses `no_terminal` and `terminal_port` out of a query string.
    /// A leading `?` is accepted; unknown keys are ignored.
    pub fn from_query(query: &str) -> Self {
        let mut options = Self::default();
        let query = query.trim().trim_start_matches('?');
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "no_terminal" => options.no_terminal = parse_flag(&value),
                "terminal_port" => match value.parse::<u16>() {
                    Ok(port) if port > 0 => options.terminal_port = Some(port),
                    _ => warn!(value = %value, "terminal: ignoring invalid terminal_port"),
                },
                _ => {}
            }
        }
        options
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "1" | "true" | "yes" | "on"
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TerminalPanel {
    #[default]
    Hidden,
    Visible { url: String },
}

impl TerminalPanel {
    pub fn from_status(status: &TerminalStatus, options: &LaunchOptions) -> Self {
        if options.no_terminal || !status.enabled || !status.running {
            return Self::Hidden;
        }
        let port = options.terminal_port.unwrap_or(status.port);
        if port == 0 {
            return Self::Hidden;
        }
        let url = match status.url.as_deref() {
            Some(url) if !url.is_empty() && options.terminal_port.is_none() => url.to_string(),
            _ => format!("http://{}:{port}", options.terminal_host),
        };
        Self::Visible { url }
    }

    pub fn is_visible(&self) -> bool {
        matches!(self, Self::Visible { .. })
    }
}

/// Any failure degrades to a hidden panel.
pub async fn resolve_terminal_panel(api: &dyn ExamApi, options: &LaunchOptions) -> TerminalPanel {
    if options.no_terminal {
        debug!("terminal: disabled by launch options");
        return TerminalPanel::Hidden;
    }
    match api.terminal_status().await {
        Ok(status) => TerminalPanel::from_status(&status, options),
        Err(err) => {
            warn!(error = %err, "terminal: status unavailable, hiding panel");
            TerminalPanel::Hidden
        }
    }
}
