// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! SQLite storage for users, smart rules and per-user templates

mod rules;
mod templates;

pub use rules::RuleStore;
pub use templates::{UserTemplate, UserTemplateStore};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::{AudioTagError, Result};

/// Database handle (thread-safe wrapper)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// A known Telegram user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Database statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStats {
    pub user_count: i64,
    pub rule_count: i64,
    pub active_rule_count: i64,
    pub template_count: i64,
    pub public_template_count: i64,
}

impl Database {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;
        Ok(db)
    }

    pub(crate) fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AudioTagError::Config("Database lock poisoned".to_string()))
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT,
                created_at TEXT NOT NULL,
                last_activity TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                template_name TEXT NOT NULL,
                artist_name TEXT NOT NULL,
                is_public INTEGER NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '{}',
                album_art BLOB,
                album_art_mime TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, template_name)
            );

            CREATE TABLE IF NOT EXISTS smart_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                condition_field TEXT NOT NULL,
                condition_operator TEXT NOT NULL,
                condition_value TEXT NOT NULL,
                action_type TEXT NOT NULL,
                action_field TEXT NOT NULL,
                action_value TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 10,
                is_active INTEGER NOT NULL DEFAULT 1,
                creator_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_templates_user ON user_templates(user_id);
            CREATE INDEX IF NOT EXISTS idx_templates_public ON user_templates(is_public);
            CREATE INDEX IF NOT EXISTS idx_rules_priority ON smart_rules(priority);
        "#,
        )?;
        Ok(())
    }

    pub fn rules(&self) -> RuleStore {
        RuleStore::new(self.clone())
    }

    pub fn user_templates(&self) -> UserTemplateStore {
        UserTemplateStore::new(self.clone())
    }

    /// Insert a user or refresh their names and activity time
    pub fn upsert_user(
        &self,
        id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"INSERT INTO users (id, username, first_name, created_at, last_activity)
               VALUES (?1, ?2, ?3, ?4, ?4)
               ON CONFLICT(id) DO UPDATE SET
                   username = COALESCE(excluded.username, users.username),
                   first_name = COALESCE(excluded.first_name, users.first_name),
                   last_activity = excluded.last_activity"#,
            params![id, username, first_name, now],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT id, username, first_name, created_at, last_activity FROM users WHERE id = ?1",
            params![id],
            |row| {
                let created: String = row.get(3)?;
                let active: String = row.get(4)?;
                Ok(UserRow {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    first_name: row.get(2)?,
                    created_at: parse_timestamp(&created),
                    last_activity: parse_timestamp(&active),
                })
            },
        );
        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.lock_conn()?;
        let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |row| row.get(0)) };
        Ok(DbStats {
            user_count: count("SELECT COUNT(*) FROM users")?,
            rule_count: count("SELECT COUNT(*) FROM smart_rules")?,
            active_rule_count: count("SELECT COUNT(*) FROM smart_rules WHERE is_active = 1")?,
            template_count: count("SELECT COUNT(*) FROM user_templates")?,
            public_template_count: count("SELECT COUNT(*) FROM user_templates WHERE is_public = 1")?,
        })
    }

    /// Vacuum database
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("VACUUM", [])?;
        Ok(())
    }
}

/// Stored RFC 3339 timestamp, or now if the column is malformed
pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_schema_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audiotag.db");
        {
            let db = Database::open(&path).unwrap();
            db.upsert_user(7, Some("seven"), None).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.stats().unwrap().user_count, 1);
    }

    #[test]
    fn test_upsert_user_keeps_known_names() {
        let db = Database::in_memory().unwrap();
        db.upsert_user(1, Some("alice"), Some("Alice")).unwrap();
        db.upsert_user(1, None, None).unwrap();

        let user = db.get_user(1).unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("alice"));
        assert_eq!(user.first_name.as_deref(), Some("Alice"));
        assert!(db.get_user(2).unwrap().is_none());
    }

    #[test]
    fn test_stats_and_vacuum_on_empty_db() {
        let db = Database::in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.rule_count, 0);
        assert_eq!(stats.template_count, 0);
        db.vacuum().unwrap();
    }
}
