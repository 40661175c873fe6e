use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, warn};

use shared::domain::{clamp_split_ratio, Theme, DEFAULT_SPLIT_RATIO};

const THEME_KEY: &str = "theme";
const SPLIT_RATIO_KEY: &str = "split_ratio";

/// Client preferences that survive a reload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preferences {
    pub theme: Theme,
    pub split_ratio: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            split_ratio: DEFAULT_SPLIT_RATIO,
        }
    }
}

/// Key/value preference store backed by sqlite.
#[derive(Clone)]
pub struct PreferenceStore {
    pool: Pool<Sqlite>,
}

impl PreferenceStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // A single connection keeps `sqlite::memory:` pointing at one database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open preferences database '{database_url}'"))?;
        let store = Self { pool };
        store.ensure_preferences_table().await?;
        Ok(store)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_preferences_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reads every preference, falling back to defaults for missing or
    /// unparseable values. The stored split ratio is clamped on the way out.
    pub async fn load(&self) -> Result<Preferences> {
        let mut preferences = Preferences::default();

        if let Some(raw) = self.get_value(THEME_KEY).await? {
            match Theme::parse(&raw) {
                Some(theme) => preferences.theme = theme,
                None => warn!(value = %raw, "preferences: ignoring unknown theme"),
            }
        }

        if let Some(raw) = self.get_value(SPLIT_RATIO_KEY).await? {
            match raw.parse::<f64>() {
                Ok(ratio) => preferences.split_ratio = clamp_split_ratio(ratio),
                Err(_) => warn!(value = %raw, "preferences: ignoring malformed split ratio"),
            }
        }

        Ok(preferences)
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<()> {
        self.put_value(THEME_KEY, theme.as_str()).await
    }

    pub async fn toggle_theme(&self) -> Result<Theme> {
        let current = self.load().await?.theme;
        let next = current.toggled();
        self.set_theme(next).await?;
        Ok(next)
    }

    /// Persists the clamped ratio and returns what was stored.
    pub async fn set_split_ratio(&self, ratio: f64) -> Result<f64> {
        let clamped = clamp_split_ratio(ratio);
        self.put_value(SPLIT_RATIO_KEY, &clamped.to_string()).await?;
        Ok(clamped)
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn put_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to persist preference '{key}'"))?;
        debug!(key, value, "preferences: stored");
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
