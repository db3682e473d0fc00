// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-user templates, optionally shared publicly

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{parse_timestamp, Database};
use crate::tags::TagSet;
use crate::templates::{archive, order_artists, template_id, Template};
use crate::{AudioTagError, Result};

const TEMPLATE_COLUMNS: &str = "id, user_id, template_name, artist_name, is_public, tags, \
     album_art, album_art_mime, created_at, updated_at";

#[derive(Debug, Clone, Serialize)]
pub struct UserTemplate {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub artist: String,
    pub is_public: bool,
    pub tags: TagSet,
    #[serde(skip)]
    pub album_art: Option<Vec<u8>>,
    pub album_art_mime: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserTemplate {
    /// `None` for a row whose tags column is not a JSON object of strings
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Option<Self>> {
        let id: i64 = row.get(0)?;
        let tags: String = row.get(5)?;
        let tags: TagSet = match serde_json::from_str(&tags) {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Skipping user template {} with malformed tags: {}", id, e);
                return Ok(None);
            }
        };
        let created: String = row.get(8)?;
        let updated: String = row.get(9)?;
        Ok(Some(Self {
            id,
            user_id: row.get(1)?,
            name: row.get(2)?,
            artist: row.get(3)?,
            is_public: row.get(4)?,
            tags,
            album_art: row.get(6)?,
            album_art_mime: row.get(7)?,
            created_at: parse_timestamp(&created),
            updated_at: parse_timestamp(&updated),
        }))
    }

    pub fn to_template(&self) -> Template {
        Template {
            name: self.name.clone(),
            artist: self.artist.clone(),
            tags: self.tags.clone(),
            album_art: self.album_art.clone(),
            album_art_mime: self.album_art_mime.clone(),
        }
    }
}

/// Template storage in the `user_templates` table
#[derive(Clone)]
pub struct UserTemplateStore {
    db: Database,
}

impl UserTemplateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn query(&self, sql_where: &str, params: impl rusqlite::Params) -> Result<Vec<UserTemplate>> {
        let conn = self.db.lock_conn()?;
        let sql = format!("SELECT {} FROM user_templates {}", TEMPLATE_COLUMNS, sql_where);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, UserTemplate::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().flatten().collect())
    }

    fn query_one(&self, sql_where: &str, params: impl rusqlite::Params) -> Result<Option<UserTemplate>> {
        Ok(self.query(sql_where, params)?.into_iter().next())
    }

    /// Insert or overwrite the user's template with the same name
    pub fn save(&self, user_id: i64, template: &Template) -> Result<i64> {
        if template.name.trim().is_empty() {
            return Err(AudioTagError::Template("Template name is empty".to_string()));
        }
        let tags = serde_json::to_string(&template.tags)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.db.lock_conn()?;
        conn.execute(
            r#"INSERT INTO user_templates (user_id, template_name, artist_name, is_public, tags,
                   album_art, album_art_mime, created_at, updated_at)
               VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?7)
               ON CONFLICT(user_id, template_name) DO UPDATE SET
                   artist_name = excluded.artist_name,
                   tags = excluded.tags,
                   album_art = excluded.album_art,
                   album_art_mime = excluded.album_art_mime,
                   updated_at = excluded.updated_at"#,
            params![
                user_id,
                template.name,
                template.artist,
                tags,
                template.album_art,
                template.album_art_mime,
                now,
            ],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM user_templates WHERE user_id = ?1 AND template_name = ?2",
            params![user_id, template.name],
            |row| row.get(0),
        )?;
        info!("Saved template {} for user {}", template.name, user_id);
        Ok(id)
    }

    pub fn get(&self, user_id: i64, id: i64) -> Result<Option<UserTemplate>> {
        self.query_one("WHERE user_id = ?1 AND id = ?2", params![user_id, id])
    }

    pub fn get_by_name(&self, user_id: i64, name: &str) -> Result<Option<UserTemplate>> {
        self.query_one("WHERE user_id = ?1 AND template_name = ?2", params![user_id, name])
    }

    pub fn list(&self, user_id: i64, artist: Option<&str>) -> Result<Vec<UserTemplate>> {
        self.query(
            "WHERE user_id = ?1 AND (?2 IS NULL OR artist_name = ?2) ORDER BY artist_name, template_name",
            params![user_id, artist],
        )
    }

    pub fn artists(&self, user_id: i64) -> Result<Vec<String>> {
        let artists = self.list(user_id, None)?.into_iter().map(|t| t.artist).collect();
        Ok(order_artists(artists))
    }

    pub fn delete(&self, user_id: i64, id: i64) -> Result<bool> {
        let conn = self.db.lock_conn()?;
        let removed = conn.execute(
            "DELETE FROM user_templates WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
        )?;
        Ok(removed > 0)
    }

    /// Publish or withdraw one of the user's templates
    pub fn share(&self, user_id: i64, id: i64, make_public: bool) -> Result<bool> {
        let conn = self.db.lock_conn()?;
        let changed = conn.execute(
            "UPDATE user_templates SET is_public = ?1, updated_at = ?2 WHERE user_id = ?3 AND id = ?4",
            params![make_public, Utc::now().to_rfc3339(), user_id, id],
        )?;
        Ok(changed > 0)
    }

    pub fn list_public(&self, artist: Option<&str>) -> Result<Vec<UserTemplate>> {
        self.query(
            "WHERE is_public = 1 AND (?1 IS NULL OR artist_name = ?1) ORDER BY artist_name, template_name",
            params![artist],
        )
    }

    /// Copy a public template into the user's own, private collection
    pub fn copy_public(&self, id: i64, user_id: i64, new_name: Option<&str>) -> Result<i64> {
        let source = self
            .query_one("WHERE id = ?1 AND is_public = 1", params![id])?
            .ok_or_else(|| AudioTagError::NotFound(format!("public template {}", id)))?;

        let mut template = source.to_template();
        if let Some(name) = new_name.filter(|n| !n.trim().is_empty()) {
            template.name = name.to_string();
        }
        let new_id = self.save(user_id, &template)?;
        info!("Copied public template {} to user {}", source.name, user_id);
        Ok(new_id)
    }

    /// Zip the user's templates into `user_{id}_templates_backup_{unix_ts}.zip`
    pub fn export_zip(&self, user_id: i64, export_dir: &Path) -> Result<(PathBuf, usize)> {
        let mut entries = Vec::new();
        for stored in self.list(user_id, None)? {
            let template = stored.to_template();
            let name = format!("{}.json", template_id(&template.artist, &template.name));
            entries.push((name, serde_json::to_vec_pretty(&template)?));
        }

        let file_name = format!(
            "user_{}_templates_backup_{}.zip",
            user_id,
            Utc::now().timestamp()
        );
        let path = export_dir.join(file_name);
        archive::write_archive(&path, &entries)?;
        info!("Exported {} templates for user {} to {:?}", entries.len(), user_id, path);
        Ok((path, entries.len()))
    }

    pub fn import_zip(&self, user_id: i64, zip_path: &Path) -> Result<usize> {
        let mut imported = 0;
        for template in archive::read_templates(zip_path)? {
            self.save(user_id, &template)?;
            imported += 1;
        }
        info!("Imported {} templates for user {}", imported, user_id);
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::CoverArt;
    use crate::templates::GENERAL_ARTIST;

    fn template(name: &str, artist: &str) -> Template {
        let mut tags: TagSet = [("genre", "Pop")].into_iter().collect();
        tags.set_picture(Some(CoverArt::new(vec![9, 9], "image/jpeg")));
        Template::from_tags(name, artist, &tags)
    }

    #[test]
    fn test_save_upserts_by_name() {
        let store = Database::in_memory().unwrap().user_templates();
        let first = store.save(1, &template("mine", "A")).unwrap();
        let second = store.save(1, &template("mine", "B")).unwrap();
        assert_eq!(first, second);

        let stored = store.get(1, first).unwrap().unwrap();
        assert_eq!(stored.artist, "B");
        assert_eq!(stored.album_art.as_deref(), Some(&[9u8, 9][..]));
        assert!(store.get(2, first).unwrap().is_none());
        assert!(store.get_by_name(1, "mine").unwrap().is_some());
    }

    #[test]
    fn test_malformed_tags_row_is_skipped() {
        let db = Database::in_memory().unwrap();
        let store = db.user_templates();
        let good = store.save(1, &template("good", "A")).unwrap();
        let bad = store.save(1, &template("bad", "A")).unwrap();
        db.lock_conn()
            .unwrap()
            .execute("UPDATE user_templates SET tags = '[1, 2]' WHERE id = ?1", [bad])
            .unwrap();

        assert!(store.get(1, bad).unwrap().is_none());
        let listed = store.list(1, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, good);
    }

    #[test]
    fn test_list_and_artists() {
        let store = Database::in_memory().unwrap().user_templates();
        store.save(1, &template("b", "Zed")).unwrap();
        store.save(1, &template("a", GENERAL_ARTIST)).unwrap();
        store.save(1, &template("c", "Amy")).unwrap();
        store.save(2, &template("other", "Amy")).unwrap();

        assert_eq!(store.list(1, None).unwrap().len(), 3);
        assert_eq!(store.list(1, Some("Amy")).unwrap().len(), 1);
        assert_eq!(store.artists(1).unwrap(), vec![GENERAL_ARTIST, "Amy", "Zed"]);
    }

    #[test]
    fn test_share_and_copy_public() {
        let store = Database::in_memory().unwrap().user_templates();
        let id = store.save(1, &template("shared", "A")).unwrap();

        assert!(matches!(store.copy_public(id, 2, None), Err(AudioTagError::NotFound(_))));
        assert!(store.share(1, id, true).unwrap());
        assert!(!store.share(2, id, true).unwrap());
        assert_eq!(store.list_public(None).unwrap().len(), 1);

        let copy = store.copy_public(id, 2, Some("my copy")).unwrap();
        let copied = store.get(2, copy).unwrap().unwrap();
        assert_eq!(copied.name, "my copy");
        assert!(!copied.is_public);
        assert_eq!(copied.tags.get("genre"), Some("Pop"));

        assert!(store.delete(1, id).unwrap());
        assert!(store.list_public(None).unwrap().is_empty());
    }

    #[test]
    fn test_export_import_between_users() {
        let dir = tempfile::tempdir().unwrap();
        let store = Database::in_memory().unwrap().user_templates();
        store.save(1, &template("x", "A")).unwrap();
        store.save(1, &template("y", "B")).unwrap();

        let (path, count) = store.export_zip(1, dir.path()).unwrap();
        assert_eq!(count, 2);
        assert!(path.to_string_lossy().contains("user_1_templates_backup_"));

        assert_eq!(store.import_zip(5, &path).unwrap(), 2);
        let imported = store.get_by_name(5, "x").unwrap().unwrap();
        assert_eq!(imported.album_art_mime.as_deref(), Some("image/jpeg"));
    }
}
