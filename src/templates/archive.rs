// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Zip backups of template JSON files

use std::io::{Read, Write};
use std::path::Path;
use tracing::warn;
use zip::write::SimpleFileOptions;

use super::Template;
use crate::Result;

/// Write `(name, bytes)` pairs into a new zip at `path`
pub(crate) fn write_archive(path: &Path, entries: &[(String, Vec<u8>)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for (name, data) in entries {
        writer.start_file(name.as_str(), options)?;
        writer.write_all(data)?;
    }
    writer.finish()?;
    Ok(())
}

/// Templates found in `.json` entries; entries without a name or tags are skipped
pub(crate) fn read_templates(path: &Path) -> Result<Vec<Template>> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut templates = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if !entry.is_file() || !name.ends_with(".json") {
            continue;
        }

        let mut content = String::new();
        if let Err(e) = entry.read_to_string(&mut content) {
            warn!("Cannot read {} from {:?}: {}", name, path, e);
            continue;
        }

        match serde_json::from_str::<Template>(&content) {
            Ok(t) if !t.name.trim().is_empty() && !t.tags.is_empty() => templates.push(t),
            Ok(_) => warn!("Skipping {}: missing name or tags", name),
            Err(e) => warn!("Skipping {}: {}", name, e),
        }
    }
    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_skips_incomplete_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.zip");
        let entries = vec![
            ("good.json".to_string(), br#"{"name":"g","artist":"a","tags":{"genre":"x"}}"#.to_vec()),
            ("noname.json".to_string(), br#"{"name":"","tags":{"genre":"x"}}"#.to_vec()),
            ("notags.json".to_string(), br#"{"name":"n","tags":{}}"#.to_vec()),
            ("broken.json".to_string(), b"{".to_vec()),
            ("readme.txt".to_string(), b"hello".to_vec()),
        ];
        write_archive(&path, &entries).unwrap();

        let templates = read_templates(&path).unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "g");
    }
}
