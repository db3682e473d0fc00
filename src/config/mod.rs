// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for audiotag

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Telegram bot connection
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Working directories and data files
    #[serde(default)]
    pub paths: PathConfig,

    /// Per-user usage limits
    #[serde(default)]
    pub limits: LimitConfig,

    /// Defaults for channel auto-processing (admin settings override these)
    #[serde(default)]
    pub auto_processing: AutoProcessingDefaults,

    /// Local inbox watcher
    #[serde(default)]
    pub inbox: InboxConfig,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Tracing filter used by the bot binary
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Users that are always treated as admins
    #[serde(default)]
    pub developer_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathConfig {
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
    #[serde(default = "default_admin_data")]
    pub admin_data: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LimitConfig {
    #[serde(default = "default_daily_limit")]
    pub daily_user_limit_mb: u64,
    #[serde(default = "default_max_audio")]
    pub max_audio_size_mb: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AutoProcessingDefaults {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub source_channel: String,
    #[serde(default = "default_true")]
    pub keep_caption: bool,
    #[serde(default = "default_true")]
    pub auto_publish: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InboxConfig {
    #[serde(default = "default_inbox_paths")]
    pub watch_paths: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

// Default value functions
fn default_log_level() -> String { "info".to_string() }
fn default_api_url() -> String { "https://api.telegram.org".to_string() }
fn default_timeout() -> u64 { 60 }
fn default_temp_dir() -> String { "temp_audio_files".to_string() }
fn default_templates_dir() -> String { "templates".to_string() }
fn default_export_dir() -> String { "templates_export".to_string() }
fn default_admin_data() -> String { "admin_data.json".to_string() }
fn default_daily_limit() -> u64 { 50 }
fn default_max_audio() -> u64 { 30 }
fn default_true() -> bool { true }
fn default_inbox_paths() -> Vec<String> { vec!["./inbox".to_string()] }
fn default_output_dir() -> String { "./outbox".to_string() }
fn default_db_path() -> String { "audiotag.db".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            paths: PathConfig::default(),
            limits: LimitConfig::default(),
            auto_processing: AutoProcessingDefaults::default(),
            inbox: InboxConfig::default(),
            database: DatabaseConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_api_url(),
            timeout_secs: default_timeout(),
            developer_ids: Vec::new(),
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            templates_dir: default_templates_dir(),
            export_dir: default_export_dir(),
            admin_data: default_admin_data(),
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            daily_user_limit_mb: default_daily_limit(),
            max_audio_size_mb: default_max_audio(),
        }
    }
}

impl Default for AutoProcessingDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            source_channel: String::new(),
            keep_caption: true,
            auto_publish: true,
        }
    }
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            watch_paths: default_inbox_paths(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::AudioTagError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) -> crate::Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_TOKEN").or_else(|| lookup("BOT_TOKEN")) {
            if !token.is_empty() {
                self.telegram.token = token;
            }
        }

        if let Some(ids) = lookup("DEVELOPER_IDS") {
            self.telegram.developer_ids = ids
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<i64>().map_err(|_| {
                        crate::AudioTagError::Config(format!("Invalid developer id: {}", s))
                    })
                })
                .collect::<crate::Result<Vec<_>>>()?;
        }

        if let Some(v) = lookup("DAILY_USER_LIMIT_MB") {
            self.limits.daily_user_limit_mb = parse_number("DAILY_USER_LIMIT_MB", &v)?;
        }
        if let Some(v) = lookup("MAX_AUDIO_SIZE_MB") {
            self.limits.max_audio_size_mb = parse_number("MAX_AUDIO_SIZE_MB", &v)?;
        }

        if let Some(v) = lookup("AUTO_PROCESSING_ENABLED") {
            self.auto_processing.enabled = parse_flag(&v);
        }
        if let Some(v) = lookup("SOURCE_CHANNEL") {
            self.auto_processing.source_channel = v;
        }
        if let Some(v) = lookup("KEEP_CAPTION") {
            self.auto_processing.keep_caption = parse_flag(&v);
        }
        if let Some(v) = lookup("AUTO_PUBLISH") {
            self.auto_processing.auto_publish = parse_flag(&v);
        }

        if let Some(v) = lookup("TEMP_DIR") {
            self.paths.temp_dir = v;
        }
        if let Some(v) = lookup("TEMPLATES_DIR") {
            self.paths.templates_dir = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v.to_lowercase();
        }

        Ok(())
    }

    /// Create the working directories if they are missing
    pub fn ensure_dirs(&self) -> crate::Result<()> {
        std::fs::create_dir_all(&self.paths.temp_dir)?;
        std::fs::create_dir_all(&self.paths.templates_dir)?;
        tracing::debug!(
            "Working directories ready: {}, {}",
            self.paths.temp_dir,
            self.paths.templates_dir
        );
        Ok(())
    }

    /// Copy suitable for printing, with the bot token masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.telegram.token.is_empty() {
            copy.telegram.token = "***************".to_string();
        }
        copy
    }

    pub fn temp_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.temp_dir)
    }

    pub fn templates_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.templates_dir)
    }

    pub fn is_developer(&self, user_id: i64) -> bool {
        self.telegram.developer_ids.contains(&user_id)
    }
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn parse_number(key: &str, value: &str) -> crate::Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| crate::AudioTagError::Config(format!("{} must be a number, got {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.limits.daily_user_limit_mb, 50);
        assert_eq!(config.limits.max_audio_size_mb, 30);
        assert_eq!(config.paths.temp_dir, "temp_audio_files");
        assert!(config.auto_processing.keep_caption);
        assert!(!config.auto_processing.enabled);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env_from(lookup(&[
                ("BOT_TOKEN", "123:abc"),
                ("DEVELOPER_IDS", "11, 22,,33"),
                ("AUTO_PROCESSING_ENABLED", "TRUE"),
                ("KEEP_CAPTION", "false"),
                ("SOURCE_CHANNEL", "@music"),
                ("DAILY_USER_LIMIT_MB", "10"),
                ("LOG_LEVEL", "DEBUG"),
            ]))
            .unwrap();

        assert_eq!(config.telegram.token, "123:abc");
        assert_eq!(config.telegram.developer_ids, vec![11, 22, 33]);
        assert!(config.auto_processing.enabled);
        assert!(!config.auto_processing.keep_caption);
        assert_eq!(config.auto_processing.source_channel, "@music");
        assert_eq!(config.limits.daily_user_limit_mb, 10);
        assert_eq!(config.log_level, "debug");
        assert!(config.is_developer(22));
    }

    #[test]
    fn test_telegram_token_wins_over_bot_token() {
        let mut config = AppConfig::default();
        config
            .apply_env_from(lookup(&[("TELEGRAM_TOKEN", "primary"), ("BOT_TOKEN", "fallback")]))
            .unwrap();
        assert_eq!(config.telegram.token, "primary");
    }

    #[test]
    fn test_bad_number_is_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env_from(lookup(&[("MAX_AUDIO_SIZE_MB", "lots")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.telegram.developer_ids = vec![7];
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.telegram.developer_ids, vec![7]);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"limits": {"daily_user_limit_mb": 5}}"#).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.limits.daily_user_limit_mb, 5);
        assert_eq!(loaded.limits.max_audio_size_mb, 30);
        assert_eq!(loaded.database.path, "audiotag.db");
    }

    #[test]
    fn test_redacted_masks_token() {
        let mut config = AppConfig::default();
        config.telegram.token = "secret".to_string();
        assert_ne!(config.redacted().telegram.token, "secret");
    }
}
