// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Smart rule persistence

use chrono::Utc;
use rusqlite::{params, Row};
use tracing::{info, warn};

use super::{parse_timestamp, Database};
use crate::rules::{NewRule, SmartRule};
use crate::{AudioTagError, Result};

const RULE_COLUMNS: &str = "id, name, description, condition_field, condition_operator, \
     condition_value, action_type, action_field, action_value, priority, is_active, \
     creator_id, created_at, updated_at";

/// Raw row; operator and action are parsed after the query so a bad row can be skipped
struct RuleRow {
    id: i64,
    name: String,
    description: Option<String>,
    condition_field: String,
    condition_operator: String,
    condition_value: String,
    action_type: String,
    action_field: String,
    action_value: String,
    priority: i64,
    is_active: bool,
    creator_id: i64,
    created_at: String,
    updated_at: String,
}

impl RuleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            condition_field: row.get(3)?,
            condition_operator: row.get(4)?,
            condition_value: row.get(5)?,
            action_type: row.get(6)?,
            action_field: row.get(7)?,
            action_value: row.get(8)?,
            priority: row.get(9)?,
            is_active: row.get(10)?,
            creator_id: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_rule(self) -> Result<SmartRule> {
        Ok(SmartRule {
            id: self.id,
            name: self.name,
            description: self.description,
            condition_field: self.condition_field,
            condition_operator: self.condition_operator.parse()?,
            condition_value: self.condition_value,
            action_type: self.action_type.parse()?,
            action_field: self.action_field,
            action_value: self.action_value,
            priority: self.priority,
            is_active: self.is_active,
            creator_id: self.creator_id,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

/// CRUD over the `smart_rules` table
#[derive(Clone)]
pub struct RuleStore {
    db: Database,
}

impl RuleStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, rule: &NewRule, creator_id: i64) -> Result<SmartRule> {
        rule.validate()?;
        let id = {
            let conn = self.db.lock_conn()?;
            let now = Utc::now().to_rfc3339();
            conn.execute(
                r#"INSERT INTO smart_rules (name, description, condition_field, condition_operator,
                       condition_value, action_type, action_field, action_value, priority, is_active,
                       creator_id, created_at, updated_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)"#,
                params![
                    rule.name,
                    rule.description,
                    rule.condition_field,
                    rule.condition_operator.as_str(),
                    rule.condition_value,
                    rule.action_type.as_str(),
                    rule.action_field,
                    rule.action_value,
                    rule.priority,
                    rule.is_active,
                    creator_id,
                    now,
                ],
            )?;
            conn.last_insert_rowid()
        };
        info!("Created smart rule {} ({})", id, rule.name);
        self.require(id)
    }

    pub fn get(&self, id: i64) -> Result<Option<SmartRule>> {
        let raw = {
            let conn = self.db.lock_conn()?;
            let sql = format!("SELECT {} FROM smart_rules WHERE id = ?1", RULE_COLUMNS);
            match conn.query_row(&sql, params![id], RuleRow::from_row) {
                Ok(row) => row,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };
        raw.into_rule().map(Some)
    }

    fn require(&self, id: i64) -> Result<SmartRule> {
        self.get(id)?
            .ok_or_else(|| AudioTagError::NotFound(format!("smart rule {}", id)))
    }

    /// Replace a rule's contents, keeping its id and creator
    pub fn update(&self, id: i64, rule: &NewRule) -> Result<SmartRule> {
        rule.validate()?;
        let changed = {
            let conn = self.db.lock_conn()?;
            conn.execute(
                r#"UPDATE smart_rules SET name = ?1, description = ?2, condition_field = ?3,
                       condition_operator = ?4, condition_value = ?5, action_type = ?6,
                       action_field = ?7, action_value = ?8, priority = ?9, is_active = ?10,
                       updated_at = ?11
                   WHERE id = ?12"#,
                params![
                    rule.name,
                    rule.description,
                    rule.condition_field,
                    rule.condition_operator.as_str(),
                    rule.condition_value,
                    rule.action_type.as_str(),
                    rule.action_field,
                    rule.action_value,
                    rule.priority,
                    rule.is_active,
                    Utc::now().to_rfc3339(),
                    id,
                ],
            )?
        };
        if changed == 0 {
            return Err(AudioTagError::NotFound(format!("smart rule {}", id)));
        }
        self.require(id)
    }

    /// Returns false when no such rule existed
    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.db.lock_conn()?;
        let removed = conn.execute("DELETE FROM smart_rules WHERE id = ?1", params![id])?;
        if removed > 0 {
            info!("Deleted smart rule {}", id);
        }
        Ok(removed > 0)
    }

    /// Flip the active flag and return the new state
    pub fn toggle(&self, id: i64) -> Result<bool> {
        {
            let conn = self.db.lock_conn()?;
            let changed = conn.execute(
                "UPDATE smart_rules SET is_active = NOT is_active, updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )?;
            if changed == 0 {
                return Err(AudioTagError::NotFound(format!("smart rule {}", id)));
            }
        }
        Ok(self.require(id)?.is_active)
    }

    /// Rules ordered by priority, optionally limited to one creator or to active ones
    pub fn list(&self, creator_id: Option<i64>, active_only: bool) -> Result<Vec<SmartRule>> {
        let rows = {
            let conn = self.db.lock_conn()?;
            let sql = format!(
                r#"SELECT {} FROM smart_rules
                   WHERE (?1 IS NULL OR creator_id = ?1) AND (?2 = 0 OR is_active = 1)
                   ORDER BY priority ASC, id ASC"#,
                RULE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![creator_id, active_only], RuleRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                match row.into_rule() {
                    Ok(rule) => Some(rule),
                    Err(e) => {
                        warn!("Skipping malformed smart rule {}: {}", id, e);
                        None
                    }
                }
            })
            .collect())
    }

    /// Active rules in execution order
    pub fn active(&self) -> Result<Vec<SmartRule>> {
        self.list(None, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{ActionType, ConditionOperator};

    fn sample(name: &str, priority: i64) -> NewRule {
        NewRule {
            name: name.to_string(),
            condition_field: "artist".to_string(),
            condition_operator: ConditionOperator::Contains,
            condition_value: "x".to_string(),
            action_type: ActionType::Set,
            action_field: "genre".to_string(),
            action_value: "Y".to_string(),
            priority,
            ..NewRule::default()
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = Database::in_memory().unwrap().rules();
        let rule = store.create(&sample("r1", 5), 42).unwrap();
        assert_eq!(rule.name, "r1");
        assert_eq!(rule.creator_id, 42);
        assert!(rule.is_active);

        let fetched = store.get(rule.id).unwrap().unwrap();
        assert_eq!(fetched.condition_operator, ConditionOperator::Contains);
        assert!(store.get(999).unwrap().is_none());
    }

    #[test]
    fn test_create_rejects_invalid() {
        let store = Database::in_memory().unwrap().rules();
        let mut bad = sample("bad", 1);
        bad.action_value.clear();
        assert!(matches!(store.create(&bad, 1), Err(AudioTagError::Rule(_))));
    }

    #[test]
    fn test_list_orders_and_filters() {
        let store = Database::in_memory().unwrap().rules();
        let late = store.create(&sample("late", 50), 1).unwrap();
        store.create(&sample("early", 1), 2).unwrap();

        let names: Vec<String> = store.list(None, false).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["early", "late"]);

        assert!(!store.toggle(late.id).unwrap());
        assert_eq!(store.active().unwrap().len(), 1);
        assert_eq!(store.list(Some(1), false).unwrap().len(), 1);
        assert!(store.toggle(late.id).unwrap());
    }

    #[test]
    fn test_update_and_delete() {
        let store = Database::in_memory().unwrap().rules();
        let rule = store.create(&sample("r", 10), 1).unwrap();

        let mut changed = sample("renamed", 3);
        changed.action_type = ActionType::Add;
        let updated = store.update(rule.id, &changed).unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.action_type, ActionType::Add);

        assert!(store.delete(rule.id).unwrap());
        assert!(!store.delete(rule.id).unwrap());
        assert!(matches!(store.update(rule.id, &changed), Err(AudioTagError::NotFound(_))));
        assert!(matches!(store.toggle(rule.id), Err(AudioTagError::NotFound(_))));
    }

    #[test]
    fn test_malformed_row_is_skipped() {
        let db = Database::in_memory().unwrap();
        let store = db.rules();
        let rule = store.create(&sample("ok", 1), 1).unwrap();
        store.create(&sample("broken", 2), 1).unwrap();
        db.lock_conn()
            .unwrap()
            .execute("UPDATE smart_rules SET condition_operator = 'regex' WHERE name = 'broken'", [])
            .unwrap();

        let rules = store.list(None, false).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, rule.id);
    }
}
