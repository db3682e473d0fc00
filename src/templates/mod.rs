// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Artist templates stored as JSON files, with zip backup and restore

pub(crate) mod archive;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::tags::{CoverArt, TagField, TagSet};
use crate::{AudioTagError, Result};

/// Artist name for templates not tied to a performer
pub const GENERAL_ARTIST: &str = "عام";

fn general_artist() -> String {
    GENERAL_ARTIST.to_string()
}

/// A named set of tag values with optional cover art
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default = "general_artist")]
    pub artist: String,
    #[serde(default)]
    pub tags: TagSet,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "encode_art",
        deserialize_with = "decode_art"
    )]
    pub album_art: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_art_mime: Option<String>,
}

fn encode_art<S: Serializer>(
    art: &Option<Vec<u8>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match art {
        Some(bytes) => serializer.serialize_some(&general_purpose::STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

fn decode_art<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Vec<u8>>, D::Error> {
    let encoded: Option<String> = Option::deserialize(deserializer)?;
    encoded
        .map(|s| general_purpose::STANDARD.decode(s).map_err(serde::de::Error::custom))
        .transpose()
}

impl Template {
    /// Capture `tags` (and their picture) as a template
    pub fn from_tags(name: impl Into<String>, artist: impl Into<String>, tags: &TagSet) -> Self {
        let mut text: TagSet = tags
            .iter()
            .filter(|(key, _)| !crate::tags::is_read_only(key))
            .collect();
        text.set_picture(None);
        let picture = tags.picture();
        Self {
            name: name.into(),
            artist: artist.into(),
            tags: text,
            album_art: picture.map(|p| p.data.clone()),
            album_art_mime: picture.map(|p| p.mime_type.clone()),
        }
    }

    /// Tag values ready to overlay, with the cover attached
    pub fn tag_set(&self) -> TagSet {
        let mut tags = self.tags.clone();
        if let Some(data) = &self.album_art {
            let cover = match &self.album_art_mime {
                Some(mime) => CoverArt::new(data.clone(), mime.clone()),
                None => CoverArt::sniff(data.clone()),
            };
            tags.set_picture(Some(cover));
        }
        tags
    }

    pub fn id(&self) -> String {
        template_id(&self.artist, &self.name)
    }
}

fn slug(part: &str) -> String {
    part.replace([' ', '/'], "_").to_lowercase()
}

/// File stem a template is stored under
pub fn template_id(artist: &str, name: &str) -> String {
    format!("{}_{}", slug(artist), slug(name))
}

/// Artist a file's tags belong to, for template lookup
pub fn extract_artist(tags: &TagSet) -> String {
    [TagField::Artist, TagField::AlbumArtist]
        .iter()
        .map(|f| tags.value(f.as_str()))
        .find(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(general_artist)
}

/// Sort artists alphabetically with the general artist first
pub(crate) fn order_artists(mut artists: Vec<String>) -> Vec<String> {
    artists.sort();
    artists.dedup();
    if let Some(pos) = artists.iter().position(|a| a == GENERAL_ARTIST) {
        let general = artists.remove(pos);
        artists.insert(0, general);
    }
    artists
}

/// A template together with its id
#[derive(Debug, Clone, Serialize)]
pub struct TemplateEntry {
    pub id: String,
    #[serde(flatten)]
    pub template: Template,
}

/// Directory of `{artist}_{name}.json` template files
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(AudioTagError::Template(format!("Invalid template id: {}", id)));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    /// Write a template, replacing one with the same artist and name
    pub fn save(&self, template: &Template) -> Result<String> {
        if template.name.trim().is_empty() {
            return Err(AudioTagError::Template("Template name is empty".to_string()));
        }
        std::fs::create_dir_all(&self.dir)?;
        let id = template.id();
        let path = self.path_for(&id)?;
        std::fs::write(&path, serde_json::to_string_pretty(template)?)?;
        info!("Saved template {} for {}", template.name, template.artist);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Option<Template>> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn all(&self) -> Result<Vec<TemplateEntry>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            let parsed = std::fs::read_to_string(&path)
                .map_err(AudioTagError::from)
                .and_then(|c| serde_json::from_str::<Template>(&c).map_err(AudioTagError::from));
            match parsed {
                Ok(template) => entries.push(TemplateEntry { id, template }),
                Err(e) => warn!("Skipping unreadable template {:?}: {}", path, e),
            }
        }
        Ok(entries)
    }

    /// Templates sorted by artist then name, optionally for one artist
    pub fn list(&self, filter_artist: Option<&str>) -> Result<Vec<TemplateEntry>> {
        let mut entries: Vec<TemplateEntry> = self
            .all()?
            .into_iter()
            .filter(|e| filter_artist.map_or(true, |a| e.template.artist == a))
            .collect();
        entries.sort_by(|a, b| {
            (&a.template.artist, &a.template.name).cmp(&(&b.template.artist, &b.template.name))
        });
        Ok(entries)
    }

    pub fn artists(&self) -> Result<Vec<String>> {
        let artists = self.all()?.into_iter().map(|e| e.template.artist).collect();
        Ok(order_artists(artists))
    }

    /// Returns false when the template did not exist
    pub fn delete(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        info!("Deleted template {}", id);
        Ok(true)
    }

    /// Zip every template into `templates_backup_{unix_ts}.zip` under `export_dir`
    pub fn export_zip(&self, export_dir: &Path) -> Result<(PathBuf, usize)> {
        let mut entries = Vec::new();
        for entry in self.all()? {
            let body = serde_json::to_vec_pretty(&entry.template)?;
            entries.push((format!("{}.json", entry.id), body));
        }

        let name = format!("templates_backup_{}.zip", chrono::Utc::now().timestamp());
        let path = export_dir.join(name);
        archive::write_archive(&path, &entries)?;
        info!("Exported {} templates to {:?}", entries.len(), path);
        Ok((path, entries.len()))
    }

    /// Restore templates from a backup; returns how many were imported
    pub fn import_zip(&self, zip_path: &Path) -> Result<usize> {
        let mut imported = 0;
        for template in archive::read_templates(zip_path)? {
            self.save(&template)?;
            imported += 1;
        }
        debug!("Imported {} templates from {:?}", imported, zip_path);
        Ok(imported)
    }
}
