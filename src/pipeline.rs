// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Tag merge pipeline
//!
//! Overlays are applied to a base [`TagSet`] in a fixed order: template,
//! manual edits, text rules, smart rules and finally the footer. Every stage
//! only writes non-empty values.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::rules::{self, SmartRule};
use crate::tags::{is_read_only, TagField, TagSet};

const LYRICS: &str = "lyrics";

/// Fields a smart template never overwrites
const IDENTITY_FIELDS: [TagField; 3] = [TagField::Title, TagField::Artist, TagField::Album];

fn link_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+|www\.\S+|t\.me/\S+").expect("static regex"))
}

fn handle_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@[a-zA-Z][a-zA-Z0-9_]{4,}").expect("static regex"))
}

fn blank_lines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("static regex"))
}

fn space_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" +").expect("static regex"))
}

/// Strip URLs and Telegram handles, then tidy the leftover whitespace
pub fn remove_links(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let result = link_pattern().replace_all(text, "");
    let result = handle_pattern().replace_all(&result, "");
    let result = blank_lines().replace_all(&result, "\n\n");
    let result = space_runs().replace_all(&result, " ");
    result.trim().to_string()
}

/// Plain substring replacement in order; empty keys are ignored
pub fn apply_replacements(text: &str, replacements: &[(String, String)]) -> String {
    replacements
        .iter()
        .filter(|(from, _)| !from.is_empty())
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
}

/// Link removal and text replacements over enabled tags
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextRules {
    #[serde(default)]
    pub replacements: Vec<(String, String)>,
    #[serde(default)]
    pub remove_links: bool,
    /// Per-tag switch; tags not listed are enabled
    #[serde(default)]
    pub enabled_tags: BTreeMap<String, bool>,
}

impl TextRules {
    pub fn is_enabled(&self, tag: &str) -> bool {
        self.enabled_tags.get(tag).copied().unwrap_or(true)
    }

    pub fn is_noop(&self) -> bool {
        self.replacements.is_empty() && !self.remove_links
    }

    /// Rewrite one value; lyrics are replaced line by line
    pub fn process(&self, tag: &str, value: &str) -> String {
        let mut out = if self.remove_links {
            remove_links(value)
        } else {
            value.to_string()
        };

        if !self.replacements.is_empty() {
            out = if tag == LYRICS {
                out.split('\n')
                    .map(|line| apply_replacements(line, &self.replacements))
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                apply_replacements(&out, &self.replacements)
            };
        }
        out
    }

    pub fn apply(&self, tags: &mut TagSet) {
        if self.is_noop() {
            return;
        }
        let keys: Vec<String> = tags.keys().map(String::from).collect();
        for key in keys {
            let value = tags.value(&key);
            if value.is_empty() || is_read_only(&key) || !self.is_enabled(&key) {
                continue;
            }
            let processed = self.process(&key, value);
            if processed != value {
                debug!("Text rules rewrote {}", key);
                tags.set(key, processed);
            }
        }
    }
}

/// Text appended to selected tags
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Footer {
    pub text: String,
    /// Per-tag switch; tags not listed get the footer
    #[serde(default)]
    pub tag_settings: BTreeMap<String, bool>,
}

impl Footer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tag_settings: BTreeMap::new(),
        }
    }

    pub fn applies_to(&self, tag: &str) -> bool {
        self.tag_settings.get(tag).copied().unwrap_or(true)
    }

    /// `value` with the footer attached using the separator for `tag`
    pub fn append(&self, tag: &str, value: &str) -> String {
        if value.trim().is_empty() {
            return self.text.clone();
        }

        let separator = if tag == LYRICS {
            if value.ends_with("\n\n") {
                ""
            } else if value.ends_with('\n') {
                "\n"
            } else {
                "\n\n"
            }
        } else if value.chars().count() > 50 || value.contains('\n') {
            if value.ends_with("\n\n") {
                ""
            } else if value.ends_with('\n') {
                "\n"
            } else {
                "\n\n"
            }
        } else if value.ends_with(' ') {
            "- "
        } else {
            " - "
        };

        format!("{}{}{}", value, separator, self.text)
    }

    /// Attach the footer to every non-empty tag accepted by `enabled`
    pub fn apply(&self, tags: &mut TagSet, enabled: impl Fn(&str) -> bool) {
        if self.text.is_empty() {
            return;
        }
        let keys: Vec<String> = tags.keys().map(String::from).collect();
        for key in keys {
            let value = tags.value(&key);
            if value.is_empty()
                || is_read_only(&key)
                || !enabled(&key)
                || !self.applies_to(&key)
            {
                continue;
            }
            let next = self.append(&key, value);
            tags.set(key, next);
        }
    }
}

/// Overlay template tags onto `tags`.
///
/// With `protect_identity` the title, artist and album are left alone.
/// Lyrics are set when missing and appended after a blank line when the
/// existing lyrics do not already contain them.
pub fn apply_template(tags: &mut TagSet, template: &TagSet, protect_identity: bool) {
    for (key, value) in template.iter() {
        if value.is_empty() || is_read_only(key) {
            continue;
        }
        if protect_identity && IDENTITY_FIELDS.iter().any(|f| f.as_str() == key) {
            continue;
        }

        if key == LYRICS {
            let current = tags.value(LYRICS);
            if current.trim().is_empty() {
                tags.set(LYRICS, value);
            } else if !current.contains(value) {
                let combined = format!("{}\n\n{}", current.trim_end(), value);
                tags.set(LYRICS, combined);
            } else {
                debug!("Template lyrics already present, skipping");
            }
            continue;
        }

        tags.set(key, value);
    }

    if let Some(picture) = template.picture() {
        tags.set_picture(Some(picture.clone()));
    }
}

/// Copy explicit user edits; non-empty values overwrite
pub fn apply_manual(tags: &mut TagSet, edits: &TagSet) {
    for (key, value) in edits.iter() {
        if !value.is_empty() {
            tags.set(key, value);
        }
    }
    if let Some(picture) = edits.picture() {
        tags.set_picture(Some(picture.clone()));
    }
}

/// Convert lyrics line endings to CRLF
pub fn normalize_lyrics(tags: &mut TagSet) {
    let lyrics = tags.value(LYRICS);
    if lyrics.is_empty() {
        return;
    }
    let normalized = lyrics.replace("\r\n", "\n").replace('\n', "\r\n");
    tags.set(LYRICS, normalized);
}

/// Template id whose artist key matches `artist` either way round, ignoring case
pub fn find_smart_template<'a>(
    artist: &str,
    templates: &'a BTreeMap<String, String>,
) -> Option<(&'a str, &'a str)> {
    let artist = artist.trim().to_lowercase();
    if artist.is_empty() {
        return None;
    }
    templates
        .iter()
        .filter(|(key, _)| !key.trim().is_empty())
        .find(|(key, _)| {
            let key = key.to_lowercase();
            artist.contains(&key) || key.contains(&artist)
        })
        .map(|(key, id)| (key.as_str(), id.as_str()))
}

/// A template to overlay and how
#[derive(Debug, Clone, Copy)]
pub struct TemplateOverlay<'a> {
    pub name: &'a str,
    pub tags: &'a TagSet,
    pub protect_identity: bool,
}

/// Everything that may be layered over the base tags
#[derive(Debug, Clone, Default)]
pub struct MergeRequest<'a> {
    pub template: Option<TemplateOverlay<'a>>,
    pub manual: Option<&'a TagSet>,
    pub text_rules: Option<&'a TextRules>,
    pub smart_rules: &'a [SmartRule],
    pub footer: Option<&'a Footer>,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub tags: TagSet,
    pub applied_rules: Vec<String>,
    pub template: Option<String>,
    pub changed_fields: Vec<String>,
}

/// Run all overlay stages over `base`
pub fn merge(base: &TagSet, request: &MergeRequest<'_>) -> MergeOutcome {
    let mut tags = base.clone();

    let template = request.template.map(|overlay| {
        apply_template(&mut tags, overlay.tags, overlay.protect_identity);
        info!("Applied template {}", overlay.name);
        overlay.name.to_string()
    });

    if let Some(edits) = request.manual {
        apply_manual(&mut tags, edits);
    }

    if let Some(text_rules) = request.text_rules {
        text_rules.apply(&mut tags);
    }

    let applied_rules = rules::apply_all(request.smart_rules, &mut tags);
    if !applied_rules.is_empty() {
        info!("Applied smart rules: {}", applied_rules.join(", "));
    }

    if let Some(footer) = request.footer {
        footer.apply(&mut tags, |tag| {
            request.text_rules.map_or(true, |r| r.is_enabled(tag))
        });
    }

    let changed_fields = base.diff_keys(&tags);
    MergeOutcome {
        tags,
        applied_rules,
        template,
        changed_fields,
    }
}
