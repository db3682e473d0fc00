// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Smart rules: stored condition/action pairs evaluated against tags

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::tags::{TagField, TagSet};
use crate::{AudioTagError, Result};

/// Action field meaning "every text field" (replace only)
pub const ALL_FIELDS: &str = "*";

/// Default rule priority; lower runs first
pub const DEFAULT_PRIORITY: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
}

impl ConditionOperator {
    pub const ALL: [ConditionOperator; 4] = [
        ConditionOperator::Contains,
        ConditionOperator::Equals,
        ConditionOperator::StartsWith,
        ConditionOperator::EndsWith,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Contains => "contains",
            ConditionOperator::Equals => "equals",
            ConditionOperator::StartsWith => "starts_with",
            ConditionOperator::EndsWith => "ends_with",
        }
    }

    /// Case-insensitive comparison of `value` against `needle`
    pub fn matches(&self, value: &str, needle: &str) -> bool {
        let value = value.to_lowercase();
        let needle = needle.to_lowercase();
        match self {
            ConditionOperator::Contains => value.contains(&needle),
            ConditionOperator::Equals => value == needle,
            ConditionOperator::StartsWith => value.starts_with(&needle),
            ConditionOperator::EndsWith => value.ends_with(&needle),
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionOperator {
    type Err = AudioTagError;

    fn from_str(s: &str) -> Result<Self> {
        ConditionOperator::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| AudioTagError::Rule(format!("Unknown condition operator: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Append to the field with ", " or set it when empty
    Add,
    /// Overwrite the field
    Set,
    /// Substitute the condition value inside the field
    Replace,
}

impl ActionType {
    pub const ALL: [ActionType; 3] = [ActionType::Add, ActionType::Set, ActionType::Replace];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Add => "add",
            ActionType::Set => "set",
            ActionType::Replace => "replace",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = AudioTagError;

    fn from_str(s: &str) -> Result<Self> {
        ActionType::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| AudioTagError::Rule(format!("Unknown action type: {}", s)))
    }
}

/// A stored smart rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartRule {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub condition_field: String,
    pub condition_operator: ConditionOperator,
    pub condition_value: String,
    pub action_type: ActionType,
    pub action_field: String,
    pub action_value: String,
    pub priority: i64,
    pub is_active: bool,
    pub creator_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rule contents before it has been stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub name: String,
    pub description: Option<String>,
    pub condition_field: String,
    pub condition_operator: ConditionOperator,
    pub condition_value: String,
    pub action_type: ActionType,
    pub action_field: String,
    pub action_value: String,
    pub priority: i64,
    pub is_active: bool,
}

impl Default for NewRule {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            condition_field: String::new(),
            condition_operator: ConditionOperator::Contains,
            condition_value: String::new(),
            action_type: ActionType::Set,
            action_field: String::new(),
            action_value: String::new(),
            priority: DEFAULT_PRIORITY,
            is_active: true,
        }
    }
}

impl NewRule {
    /// Reject incomplete rules and unknown field names
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("condition_field", &self.condition_field),
            ("condition_value", &self.condition_value),
            ("action_field", &self.action_field),
            ("action_value", &self.action_value),
        ];
        for (label, value) in required {
            if value.trim().is_empty() {
                return Err(AudioTagError::Rule(format!("Rule is missing {}", label)));
            }
        }

        self.condition_field.parse::<TagField>()?;

        if self.action_field == ALL_FIELDS {
            if self.action_type != ActionType::Replace {
                return Err(AudioTagError::Rule(
                    "Only replace actions may target every field".to_string(),
                ));
            }
        } else {
            self.action_field.parse::<TagField>()?;
        }

        Ok(())
    }
}

impl SmartRule {
    /// Whether the rule's condition holds for `tags`
    pub fn matches(&self, tags: &TagSet) -> bool {
        if !self.is_active {
            return false;
        }
        let value = tags.value(&self.condition_field);
        if value.is_empty() {
            return false;
        }
        self.condition_operator.matches(value, &self.condition_value)
    }

    /// Apply the rule in place; returns whether the condition matched
    pub fn apply(&self, tags: &mut TagSet) -> bool {
        if !self.matches(tags) {
            return false;
        }

        match self.action_type {
            ActionType::Add => {
                let current = tags.value(&self.action_field);
                let next = if current.is_empty() {
                    self.action_value.clone()
                } else {
                    format!("{}, {}", current, self.action_value)
                };
                tags.set(self.action_field.clone(), next);
            }
            ActionType::Set => {
                tags.set(self.action_field.clone(), self.action_value.clone());
            }
            ActionType::Replace => {
                if self.action_field == ALL_FIELDS {
                    for value in tags.values_mut() {
                        *value = value.replace(&self.condition_value, &self.action_value);
                    }
                } else if let Some(current) = tags.get(&self.action_field) {
                    let next = current.replace(&self.condition_value, &self.action_value);
                    tags.set(self.action_field.clone(), next);
                }
            }
        }

        debug!("Smart rule '{}' applied", self.name);
        true
    }

    pub fn condition_summary(&self) -> String {
        format!(
            "{} {} '{}'",
            self.condition_field, self.condition_operator, self.condition_value
        )
    }

    pub fn action_summary(&self) -> String {
        format!("{} {} '{}'", self.action_type, self.action_field, self.action_value)
    }
}

/// Active rules in execution order
fn ordered_active(rules: &[SmartRule]) -> Vec<&SmartRule> {
    let mut active: Vec<&SmartRule> = rules.iter().filter(|r| r.is_active).collect();
    active.sort_by_key(|r| r.priority);
    active
}

/// Apply every active rule by ascending priority; returns the names that matched
pub fn apply_all(rules: &[SmartRule], tags: &mut TagSet) -> Vec<String> {
    ordered_active(rules)
        .into_iter()
        .filter(|rule| rule.apply(tags))
        .map(|rule| rule.name.clone())
        .collect()
}

/// One rule's effect during a dry run
#[derive(Debug, Clone, Serialize)]
pub struct RuleTestStep {
    pub rule_id: i64,
    pub rule_name: String,
    pub description: Option<String>,
    pub before: String,
    pub after: String,
}

/// Outcome of running rules over a sample text
#[derive(Debug, Clone, Serialize)]
pub struct RuleTestReport {
    pub original_text: String,
    pub modified_text: String,
    pub applied_rules: Vec<RuleTestStep>,
    pub changed: bool,
}

/// Run `rules` over a single sample field and record each rule's effect
pub fn test_rules_on_text(rules: &[SmartRule], text: &str, field: &str) -> RuleTestReport {
    let mut tags: TagSet = [(field, text)].into_iter().collect();
    let mut steps = Vec::new();

    for rule in ordered_active(rules) {
        let before = tags.value(field).to_string();
        if rule.apply(&mut tags) {
            steps.push(RuleTestStep {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                description: rule.description.clone(),
                before,
                after: tags.value(field).to_string(),
            });
        }
    }

    RuleTestReport {
        original_text: text.to_string(),
        modified_text: tags.value(field).to_string(),
        changed: !steps.is_empty(),
        applied_rules: steps,
    }
}

/// Outcome of running one rule over a sample text
#[derive(Debug, Clone, Serialize)]
pub struct SingleRuleTest {
    pub original_text: String,
    pub modified_text: String,
    pub rule_applied: bool,
    pub condition: String,
    pub action: String,
}

pub fn test_rule(rule: &SmartRule, text: &str, field: &str) -> SingleRuleTest {
    let mut tags: TagSet = [(field, text)].into_iter().collect();
    let applied = rule.apply(&mut tags);
    SingleRuleTest {
        original_text: text.to_string(),
        modified_text: tags.get(field).unwrap_or(text).to_string(),
        rule_applied: applied,
        condition: rule.condition_summary(),
        action: rule.action_summary(),
    }
}

/// Propose a rule that would reproduce a manual edit
pub fn suggest_rule(old: &TagSet, new: &TagSet) -> Option<NewRule> {
    for (field, new_value) in new.iter() {
        let Some(old_value) = old.get(field) else { continue };
        if old_value == new_value {
            continue;
        }

        if field == TagField::Artist.as_str() && new.has_value(TagField::Genre.as_str()) {
            return Some(NewRule {
                name: format!("Suggested rule for {}", old_value),
                description: Some(format!("Set genre automatically for {}", old_value)),
                condition_field: TagField::Artist.as_str().to_string(),
                condition_operator: ConditionOperator::Contains,
                condition_value: old_value.to_string(),
                action_type: ActionType::Set,
                action_field: TagField::Genre.as_str().to_string(),
                action_value: new.value(TagField::Genre.as_str()).to_string(),
                ..NewRule::default()
            });
        }

        if !old_value.is_empty() && !new_value.is_empty() && lost_a_trigram(old_value, new_value) {
            return Some(NewRule {
                name: format!("Replace in {}", field),
                description: Some("Replace text automatically".to_string()),
                condition_field: field.to_string(),
                condition_operator: ConditionOperator::Contains,
                condition_value: old_value.to_string(),
                action_type: ActionType::Replace,
                action_field: field.to_string(),
                action_value: new_value.to_string(),
                ..NewRule::default()
            });
        }
    }
    None
}

/// True when one of the first ten 3-char windows of `old` is missing from `new`
fn lost_a_trigram(old: &str, new: &str) -> bool {
    let chars: Vec<char> = old.chars().collect();
    if chars.len() < 3 {
        return false;
    }
    (0..chars.len().min(10)).any(|i| {
        let end = (i + 3).min(chars.len());
        let window: String = chars[i..end].iter().collect();
        !new.contains(&window)
    })
}

#[cfg(test)]
pub(crate) fn rule(
    name: &str,
    condition: (&str, ConditionOperator, &str),
    action: (ActionType, &str, &str),
    priority: i64,
) -> SmartRule {
    SmartRule {
        id: 0,
        name: name.to_string(),
        description: None,
        condition_field: condition.0.to_string(),
        condition_operator: condition.1,
        condition_value: condition.2.to_string(),
        action_type: action.0,
        action_field: action.1.to_string(),
        action_value: action.2.to_string(),
        priority,
        is_active: true,
        creator_id: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
