// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Admin data: admins, blocked users, usage statistics, action log and the
//! settings tree, persisted as a single JSON file.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::artwork::WatermarkSettings;
use crate::config::AppConfig;
use crate::pipeline::{Footer, TextRules};
use crate::{AudioTagError, Result};

/// Most log entries kept
pub const MAX_LOG_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub total_files_processed: u64,
    #[serde(default)]
    pub successful_edits: u64,
    #[serde(default)]
    pub failed_operations: u64,
    #[serde(default = "Utc::now")]
    pub bot_start_time: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_reset_time: DateTime<Utc>,
}

impl Default for Statistics {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            total_files_processed: 0,
            successful_edits: 0,
            failed_operations: 0,
            bot_start_time: now,
            last_reset_time: now,
        }
    }
}

/// Counters in [`Statistics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    FilesProcessed,
    SuccessfulEdits,
    FailedOperations,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub files_processed: u64,
    /// Megabytes used since `daily_reset`
    #[serde(default)]
    pub daily_usage: f64,
    pub daily_reset: DateTime<Utc>,
}

impl UserRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            username: String::new(),
            first_name: String::new(),
            first_seen: now,
            last_seen: now,
            files_processed: 0,
            daily_usage: 0.0,
            daily_reset: now,
        }
    }

    /// Zero the daily counter once 24 hours have passed; true if it was reset
    fn roll_daily(&mut self, now: DateTime<Utc>) -> bool {
        if now - self.daily_reset > Duration::hours(24) {
            self.daily_usage = 0.0;
            self.daily_reset = now;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub user_id: i64,
    pub action: String,
    pub status: LogStatus,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AdminData {
    #[serde(default)]
    admins: BTreeSet<i64>,
    #[serde(default)]
    blocked_users: BTreeSet<i64>,
    #[serde(default)]
    statistics: Statistics,
    #[serde(default)]
    users: BTreeMap<i64, UserRecord>,
    #[serde(default)]
    logs: Vec<LogEntry>,
    #[serde(default)]
    settings: Value,
}

fn default_settings(config: &AppConfig) -> Value {
    json!({
        "max_file_size_mb": config.limits.max_audio_size_mb,
        "daily_user_limit_mb": config.limits.daily_user_limit_mb,
        "features_enabled": {
            "templates": true,
            "lyrics": true,
            "album_art": true,
            "auto_processing": config.auto_processing.enabled,
        },
        "auto_processing": {
            "enabled": config.auto_processing.enabled,
            "source_channel": config.auto_processing.source_channel,
            "target_channel": "",
            "keep_caption": config.auto_processing.keep_caption,
            "auto_publish": config.auto_processing.auto_publish,
            "forward_to_target": false,
            "remove_links": false,
            "footer_enabled": false,
            "tag_footer": "",
            "footer_tag_settings": {},
            "tag_replacements": {},
            "enabled_tags": {
                "artist": true,
                "album_artist": true,
                "album": true,
                "genre": true,
                "year": true,
                "composer": true,
                "comment": true,
                "title": true,
                "lyrics": true,
            },
            "smart_templates": {},
        },
        "image_watermark": WatermarkSettings::default(),
    })
}

fn default_true() -> bool {
    true
}

/// Typed view of `settings.auto_processing`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoProcessingSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub source_channel: String,
    #[serde(default)]
    pub target_channel: String,
    #[serde(default = "default_true")]
    pub keep_caption: bool,
    #[serde(default = "default_true")]
    pub auto_publish: bool,
    #[serde(default)]
    pub forward_to_target: bool,
    #[serde(default)]
    pub remove_links: bool,
    #[serde(default)]
    pub footer_enabled: bool,
    #[serde(default)]
    pub tag_footer: String,
    #[serde(default)]
    pub footer_tag_settings: BTreeMap<String, bool>,
    #[serde(default)]
    pub tag_replacements: BTreeMap<String, String>,
    #[serde(default)]
    pub enabled_tags: BTreeMap<String, bool>,
    /// Artist name to template id
    #[serde(default)]
    pub smart_templates: BTreeMap<String, String>,
}

impl AutoProcessingSettings {
    pub fn text_rules(&self) -> TextRules {
        TextRules {
            replacements: self
                .tag_replacements
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            remove_links: self.remove_links,
            enabled_tags: self.enabled_tags.clone(),
        }
    }

    pub fn footer(&self) -> Option<Footer> {
        if !self.footer_enabled || self.tag_footer.is_empty() {
            return None;
        }
        Some(Footer {
            text: self.tag_footer.clone(),
            tag_settings: self.footer_tag_settings.clone(),
        })
    }
}

/// Shared handle to the admin data file
#[derive(Clone)]
pub struct AdminStore {
    path: Option<PathBuf>,
    developer_ids: Arc<Vec<i64>>,
    data: Arc<Mutex<AdminData>>,
}

impl AdminStore {
    /// Load the admin file, or start fresh with defaults from `config`
    pub fn open(path: &Path, config: &AppConfig) -> Result<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let mut data: AdminData = serde_json::from_str(&content)?;
            if !data.settings.is_object() {
                data.settings = default_settings(config);
            }
            info!("Loaded admin data from {:?}", path);
            data
        } else {
            info!("No admin data at {:?}, starting fresh", path);
            Self::fresh(config)
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            developer_ids: Arc::new(config.telegram.developer_ids.clone()),
            data: Arc::new(Mutex::new(data)),
        })
    }

    /// Store that never touches disk (for testing)
    pub fn in_memory(config: &AppConfig) -> Self {
        Self {
            path: None,
            developer_ids: Arc::new(config.telegram.developer_ids.clone()),
            data: Arc::new(Mutex::new(Self::fresh(config))),
        }
    }

    fn fresh(config: &AppConfig) -> AdminData {
        AdminData {
            admins: BTreeSet::new(),
            blocked_users: BTreeSet::new(),
            statistics: Statistics::default(),
            users: BTreeMap::new(),
            logs: Vec::new(),
            settings: default_settings(config),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, AdminData>> {
        self.data
            .lock()
            .map_err(|_| AudioTagError::Config("Admin data lock poisoned".to_string()))
    }

    fn persist(&self, data: &AdminData) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(data)?)?;
        debug!("Saved admin data to {:?}", path);
        Ok(())
    }

    /// Apply `f` to a copy under the lock; the copy replaces the live data
    /// only once it has been written
    fn mutate<T>(&self, f: impl FnOnce(&mut AdminData) -> T) -> Result<T> {
        let mut data = self.lock()?;
        let mut next = data.clone();
        let out = f(&mut next);
        self.persist(&next)?;
        *data = next;
        Ok(out)
    }

    // Admins and blocking

    pub fn is_admin(&self, user_id: i64) -> Result<bool> {
        if self.developer_ids.contains(&user_id) {
            return Ok(true);
        }
        Ok(self.lock()?.admins.contains(&user_id))
    }

    pub fn admins(&self) -> Result<Vec<i64>> {
        let data = self.lock()?;
        let mut all: BTreeSet<i64> = data.admins.clone();
        all.extend(self.developer_ids.iter().copied());
        Ok(all.into_iter().collect())
    }

    pub fn add_admin(&self, user_id: i64) -> Result<bool> {
        self.mutate(|d| d.admins.insert(user_id))
    }

    /// Developers cannot be removed
    pub fn remove_admin(&self, user_id: i64) -> Result<bool> {
        if self.developer_ids.contains(&user_id) {
            return Ok(false);
        }
        self.mutate(|d| d.admins.remove(&user_id))
    }

    pub fn block_user(&self, user_id: i64) -> Result<bool> {
        self.mutate(|d| d.blocked_users.insert(user_id))
    }

    pub fn unblock_user(&self, user_id: i64) -> Result<bool> {
        self.mutate(|d| d.blocked_users.remove(&user_id))
    }

    pub fn is_blocked(&self, user_id: i64) -> Result<bool> {
        Ok(self.lock()?.blocked_users.contains(&user_id))
    }

    pub fn blocked_users(&self) -> Result<Vec<i64>> {
        Ok(self.lock()?.blocked_users.iter().copied().collect())
    }

    // Logs and statistics

    pub fn log_action(&self, user_id: i64, action: &str, status: LogStatus, details: &str) -> Result<()> {
        self.mutate(|d| {
            d.logs.push(LogEntry {
                time: Utc::now(),
                user_id,
                action: action.to_string(),
                status,
                details: details.to_string(),
            });
            if d.logs.len() > MAX_LOG_ENTRIES {
                let excess = d.logs.len() - MAX_LOG_ENTRIES;
                d.logs.drain(..excess);
            }
        })
    }

    fn last_logs(&self, limit: usize, keep: impl Fn(&LogEntry) -> bool) -> Result<Vec<LogEntry>> {
        let data = self.lock()?;
        let matching: Vec<&LogEntry> = data.logs.iter().filter(|l| keep(l)).collect();
        let start = matching.len().saturating_sub(limit);
        Ok(matching[start..].iter().map(|l| (*l).clone()).collect())
    }

    pub fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.last_logs(limit, |_| true)
    }

    pub fn logs_by_user(&self, user_id: i64, limit: usize) -> Result<Vec<LogEntry>> {
        self.last_logs(limit, |l| l.user_id == user_id)
    }

    pub fn error_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.last_logs(limit, |l| l.status == LogStatus::Failed)
    }

    pub fn increment_statistic(&self, stat: Statistic, value: u64) -> Result<()> {
        self.mutate(|d| {
            let counter = match stat {
                Statistic::FilesProcessed => &mut d.statistics.total_files_processed,
                Statistic::SuccessfulEdits => &mut d.statistics.successful_edits,
                Statistic::FailedOperations => &mut d.statistics.failed_operations,
            };
            *counter += value;
        })
    }

    /// Zero the counters; the start time is kept
    pub fn reset_statistics(&self) -> Result<()> {
        self.mutate(|d| {
            d.statistics.total_files_processed = 0;
            d.statistics.successful_edits = 0;
            d.statistics.failed_operations = 0;
            d.statistics.last_reset_time = Utc::now();
        })
    }

    pub fn statistics(&self) -> Result<Statistics> {
        Ok(self.lock()?.statistics.clone())
    }

    // Users and limits

    /// Record activity for a user, creating the record on first sight
    pub fn update_user(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
        files_processed: u64,
        size_mb: f64,
    ) -> Result<UserRecord> {
        self.mutate(|d| {
            let now = Utc::now();
            let user = d.users.entry(user_id).or_insert_with(|| {
                info!("New user {}", user_id);
                UserRecord::new(now)
            });
            if let Some(name) = username.filter(|n| !n.is_empty()) {
                user.username = name.to_string();
            }
            if let Some(name) = first_name.filter(|n| !n.is_empty()) {
                user.first_name = name.to_string();
            }
            user.last_seen = now;
            user.files_processed += files_processed;
            user.roll_daily(now);
            user.daily_usage += size_mb;
            user.clone()
        })
    }

    pub fn user(&self, user_id: i64) -> Result<Option<UserRecord>> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    /// Users seen within `days`, most recent first
    pub fn active_users(&self, days: i64) -> Result<Vec<(i64, UserRecord)>> {
        let cutoff = Utc::now() - Duration::days(days);
        let data = self.lock()?;
        let mut users: Vec<(i64, UserRecord)> = data
            .users
            .iter()
            .filter(|(_, u)| u.last_seen >= cutoff)
            .map(|(id, u)| (*id, u.clone()))
            .collect();
        users.sort_by(|a, b| b.1.last_seen.cmp(&a.1.last_seen));
        Ok(users)
    }

    /// Users with the most processed files
    pub fn top_users(&self, limit: usize) -> Result<Vec<(i64, UserRecord)>> {
        let data = self.lock()?;
        let mut users: Vec<(i64, UserRecord)> =
            data.users.iter().map(|(id, u)| (*id, u.clone())).collect();
        users.sort_by(|a, b| b.1.files_processed.cmp(&a.1.files_processed));
        users.truncate(limit);
        Ok(users)
    }

    /// Daily limit in MB; 0 means unlimited
    pub fn daily_user_limit(&self) -> Result<f64> {
        Ok(self
            .get_setting("daily_user_limit_mb")?
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0))
    }

    pub fn set_daily_user_limit(&self, limit_mb: i64) -> Result<()> {
        self.update_setting("daily_user_limit_mb", json!(limit_mb.max(0)))
    }

    /// Whether `size_mb` more would keep the user within the daily limit
    pub fn check_user_limit(&self, user_id: i64, size_mb: f64) -> Result<bool> {
        let limit = self.daily_user_limit()?;
        if limit <= 0.0 {
            return Ok(true);
        }

        let mut data = self.lock()?;
        let Some(user) = data.users.get_mut(&user_id) else {
            return Ok(true);
        };
        let reset = user.roll_daily(Utc::now());
        let within = user.daily_usage + size_mb <= limit;
        if reset {
            self.persist(&data)?;
        }
        Ok(within)
    }

    // Settings tree

    pub fn settings(&self) -> Result<Value> {
        Ok(self.lock()?.settings.clone())
    }

    /// Value at a dotted path such as `auto_processing.source_channel`
    pub fn get_setting(&self, path: &str) -> Result<Option<Value>> {
        let data = self.lock()?;
        let mut current = &data.settings;
        for part in path.split('.') {
            match current.get(part) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current.clone()))
    }

    /// Set a dotted path, creating intermediate objects as needed
    pub fn update_setting(&self, path: &str, value: Value) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(AudioTagError::Config(format!("Invalid setting path: {:?}", path)));
        }
        self.mutate(|d| {
            let mut current = &mut d.settings;
            for part in &parts {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                current = match current.as_object_mut() {
                    Some(map) => map.entry(part.to_string()).or_insert(Value::Null),
                    None => return,
                };
            }
            *current = value;
        })?;
        info!("Setting {} updated", path);
        Ok(())
    }

    pub fn feature_enabled(&self, feature: &str) -> Result<Option<bool>> {
        Ok(self
            .get_setting(&format!("features_enabled.{}", feature))?
            .and_then(|v| v.as_bool()))
    }

    /// Auto-processing settings; `features_enabled.auto_processing` wins over `enabled`
    pub fn auto_processing(&self) -> Result<AutoProcessingSettings> {
        let raw = self
            .get_setting("auto_processing")?
            .unwrap_or_else(|| json!({}));
        let mut settings: AutoProcessingSettings = serde_json::from_value(raw)?;
        if let Some(enabled) = self.feature_enabled("auto_processing")? {
            settings.enabled = enabled;
        }
        Ok(settings)
    }

    pub fn set_auto_processing_enabled(&self, enabled: bool) -> Result<()> {
        self.update_setting("features_enabled.auto_processing", json!(enabled))?;
        self.update_setting("auto_processing.enabled", json!(enabled))
    }

    pub fn add_tag_replacement(&self, old_text: &str, new_text: &str) -> Result<()> {
        if old_text.is_empty() {
            return Err(AudioTagError::Config("Replacement source text is empty".to_string()));
        }
        self.insert_into("auto_processing.tag_replacements", old_text, json!(new_text))
    }

    pub fn remove_tag_replacement(&self, old_text: &str) -> Result<bool> {
        self.remove_from("auto_processing.tag_replacements", old_text)
    }

    pub fn add_smart_template(&self, artist: &str, template_id: &str) -> Result<()> {
        self.insert_into("auto_processing.smart_templates", artist, json!(template_id))
    }

    pub fn remove_smart_template(&self, artist: &str) -> Result<bool> {
        self.remove_from("auto_processing.smart_templates", artist)
    }

    pub fn set_source_channel(&self, channel: &str) -> Result<()> {
        self.update_setting("auto_processing.source_channel", json!(channel))
    }

    pub fn set_target_channel(&self, channel: &str) -> Result<()> {
        self.update_setting("auto_processing.target_channel", json!(channel))
    }

    pub fn set_forward_to_target(&self, enabled: bool) -> Result<()> {
        self.update_setting("auto_processing.forward_to_target", json!(enabled))
    }

    pub fn set_tag_footer(&self, text: &str, enabled: bool) -> Result<()> {
        self.update_setting("auto_processing.tag_footer", json!(text))?;
        self.update_setting("auto_processing.footer_enabled", json!(enabled))
    }

    pub fn watermark(&self) -> Result<WatermarkSettings> {
        match self.get_setting("image_watermark")? {
            Some(raw) => Ok(serde_json::from_value(raw)?),
            None => Ok(WatermarkSettings::default()),
        }
    }

    pub fn set_watermark(&self, settings: &WatermarkSettings) -> Result<()> {
        self.update_setting("image_watermark", serde_json::to_value(settings)?)
    }

    /// Insert `key` into the object at `path`; keys may contain dots
    fn insert_into(&self, path: &str, key: &str, value: Value) -> Result<()> {
        let mut object = match self.get_setting(path)? {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        object.insert(key.to_string(), value);
        self.update_setting(path, Value::Object(object))
    }

    fn remove_from(&self, path: &str, key: &str) -> Result<bool> {
        let Some(Value::Object(mut object)) = self.get_setting(path)? else {
            return Ok(false);
        };
        if object.remove(key).is_none() {
            return Ok(false);
        }
        self.update_setting(path, Value::Object(object))?;
        Ok(true)
    }
}
