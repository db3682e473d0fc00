// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Vorbis comments, MP4 atoms, APE and RIFF tags through lofty

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::tag::{ItemKey, Tag, TagExt};
use std::path::Path;
use tracing::warn;

use super::{AudioFormat, CoverArt, TagField, TagSet};
use crate::{AudioTagError, Result};

fn item_key(field: TagField) -> Option<ItemKey> {
    match field {
        TagField::Title => Some(ItemKey::TrackTitle),
        TagField::Artist => Some(ItemKey::TrackArtist),
        TagField::Album => Some(ItemKey::AlbumTitle),
        TagField::AlbumArtist => Some(ItemKey::AlbumArtist),
        TagField::Year => Some(ItemKey::RecordingDate),
        TagField::Genre => Some(ItemKey::Genre),
        TagField::Composer => Some(ItemKey::Composer),
        TagField::Comment => Some(ItemKey::Comment),
        TagField::Track => Some(ItemKey::TrackNumber),
        TagField::Lyrics => Some(ItemKey::Lyrics),
        TagField::Length => None,
    }
}

pub(super) fn read(path: &Path, format: AudioFormat) -> Result<TagSet> {
    let tagged = lofty::read_from_path(path)?;
    let mut tags = TagSet::new();

    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return Ok(tags);
    };

    for field in TagField::ALL {
        let Some(key) = item_key(field) else { continue };
        if let Some(value) = tag.get_string(&key).filter(|v| !v.is_empty()) {
            tags.set(field.as_str(), value);
        }
    }

    if !tags.has_value(TagField::Year.as_str()) {
        if let Some(year) = tag.get_string(&ItemKey::Year).filter(|v| !v.is_empty()) {
            tags.set(TagField::Year.as_str(), year);
        }
    }

    if format.is_vorbis() && !tags.has_value(TagField::Lyrics.as_str()) {
        if let Some(lyrics) = vorbis_lyrics_fallback(tag) {
            tags.set(TagField::Lyrics.as_str(), lyrics);
        }
    }

    let cover = tag
        .pictures()
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| tag.pictures().first());
    if let Some(p) = cover {
        let mime = p
            .mime_type()
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "image/jpeg".to_string());
        tags.set_picture(Some(CoverArt::new(p.data().to_vec(), mime)));
    }

    Ok(tags)
}

/// Comment keys such as UNSYNCEDLYRICS or LYRIC that lofty leaves unmapped
fn vorbis_lyrics_fallback(tag: &Tag) -> Option<String> {
    tag.items()
        .filter(|item| match item.key() {
            ItemKey::Unknown(name) => name.to_uppercase().contains("LYR"),
            _ => false,
        })
        .filter_map(|item| item.value().text())
        .find(|text| !text.is_empty())
        .map(String::from)
}

/// Track length in whole seconds from the stream properties
pub(super) fn duration_secs(path: &Path) -> Result<u64> {
    let tagged = lofty::read_from_path(path)?;
    Ok(tagged.properties().duration().as_secs())
}

/// trkn is numeric; "3/12" keeps the leading number
fn mp4_track(value: &str) -> Option<u32> {
    value.split('/').next()?.trim().parse().ok()
}

pub(super) fn write(
    path: &Path,
    format: AudioFormat,
    tags: &TagSet,
    cover: Option<CoverArt>,
) -> Result<()> {
    let mut tagged = lofty::read_from_path(path)?;

    if tagged.primary_tag().is_none() {
        let tag_type = tagged.primary_tag_type();
        tagged.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged
        .primary_tag_mut()
        .ok_or_else(|| AudioTagError::Tag(format!("No writable tag in {:?}", path)))?;

    for field in format.writable_fields() {
        let value = tags.value(field.as_str());
        if value.is_empty() {
            continue;
        }
        let Some(key) = item_key(*field) else { continue };

        let value = if *field == TagField::Track && format == AudioFormat::Mp4 {
            match mp4_track(value) {
                Some(n) => n.to_string(),
                None => {
                    warn!("Skipping non-numeric track {:?} for {:?}", value, path);
                    continue;
                }
            }
        } else {
            value.to_string()
        };

        if !tag.insert_text(key, value.clone()) {
            if *field == TagField::Year && tag.insert_text(ItemKey::Year, value) {
                continue;
            }
            warn!("{} tag rejected field {}", format, field);
        }
    }

    if let Some(cover) = cover.filter(|_| format.supports_pictures()) {
        tag.remove_picture_type(PictureType::CoverFront);
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::from_str(&cover.mime_type)),
            None,
            cover.data,
        ));
    }

    tag.save_to_path(path, WriteOptions::default())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{read_tags, test_audio, write_tags, SaveOptions};
    use lofty::config::ParseOptions;
    use lofty::flac::FlacFile;
    use lofty::ogg::VorbisComments;

    fn full_tags() -> TagSet {
        [
            ("title", "Title"),
            ("artist", "Artist"),
            ("album_artist", "Band"),
            ("album", "Album"),
            ("year", "2021"),
            ("genre", "Pop"),
            ("composer", "Composer"),
            ("comment", "Nice"),
            ("track", "3"),
            ("lyrics", "line one\nline two"),
            ("length", "999"),
        ]
        .into_iter()
        .collect()
    }

    fn file_with(dir: &Path, name: &str, bytes: Vec<u8>) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_mp4_track() {
        assert_eq!(mp4_track("3"), Some(3));
        assert_eq!(mp4_track("3/12"), Some(3));
        assert_eq!(mp4_track(" 7 /9"), Some(7));
        assert_eq!(mp4_track("A1"), None);
        assert_eq!(mp4_track(""), None);
    }

    #[test]
    fn test_length_has_no_writable_key() {
        assert_eq!(item_key(TagField::Length), None);
        for format in [AudioFormat::Flac, AudioFormat::Ogg, AudioFormat::Mp4, AudioFormat::Mp3] {
            let fields = format.writable_fields();
            assert!(!fields.contains(&TagField::Length), "{}", format);
            assert!(fields.contains(&TagField::Lyrics), "{}", format);
        }
    }

    #[test]
    fn test_flac_roundtrip_uses_vorbis_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = file_with(dir.path(), "song.flac", test_audio::flac_bytes());

        let mut tags = full_tags();
        tags.set_picture(Some(CoverArt::sniff(test_audio::png_bytes(40, 40))));
        write_tags(&path, &tags, &SaveOptions::default()).unwrap();

        let read = read_tags(&path).unwrap();
        for key in ["title", "artist", "album_artist", "album", "year", "genre", "composer", "comment", "track", "lyrics"] {
            assert_eq!(read.get(key), tags.get(key), "{}", key);
        }
        assert_eq!(read.get("length"), Some("1"));
        assert_eq!(read.picture().map(|p| p.mime_type.as_str()), Some("image/jpeg"));

        let mut file = std::fs::File::open(&path).unwrap();
        let flac = FlacFile::read_from(&mut file, ParseOptions::new()).unwrap();
        let comments = flac.vorbis_comments().unwrap();
        assert_eq!(comments.get("TITLE"), Some("Title"));
        assert_eq!(comments.get("ALBUMARTIST"), Some("Band"));
        assert_eq!(comments.get("DATE"), Some("2021"));
        assert_eq!(comments.get("TRACKNUMBER"), Some("3"));
        assert_eq!(comments.get("LYRICS"), Some("line one\nline two"));
        assert_eq!(comments.get("LENGTH"), None);
    }

    #[test]
    fn test_vorbis_lyrics_fallback_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = file_with(dir.path(), "song.flac", test_audio::flac_bytes());

        let mut comments = VorbisComments::default();
        comments.insert("TITLE".to_string(), "T".to_string());
        comments.insert("UNSYNCEDLYRICS".to_string(), "la la".to_string());
        comments.save_to_path(&path, WriteOptions::default()).unwrap();

        let read = read_tags(&path).unwrap();
        assert_eq!(read.get("title"), Some("T"));
        assert_eq!(read.get("lyrics"), Some("la la"));
    }

    #[test]
    fn test_ogg_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = file_with(dir.path(), "song.ogg", test_audio::ogg_vorbis_bytes());

        let tags = full_tags();
        write_tags(&path, &tags, &SaveOptions::default()).unwrap();

        let read = read_tags(&path).unwrap();
        for key in ["title", "artist", "album", "year", "genre", "composer", "track", "lyrics"] {
            assert_eq!(read.get(key), tags.get(key), "{}", key);
        }
        assert_eq!(read.get("length"), Some("1"));
    }

    #[test]
    fn test_m4a_roundtrip_and_track_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = file_with(dir.path(), "song.m4a", test_audio::m4a_bytes());

        let mut tags = full_tags();
        tags.set("track", "3/12");
        write_tags(&path, &tags, &SaveOptions::default()).unwrap();

        let read = read_tags(&path).unwrap();
        for key in ["title", "artist", "album_artist", "album", "genre", "lyrics"] {
            assert_eq!(read.get(key), tags.get(key), "{}", key);
        }
        assert_eq!(read.get("track"), Some("3"));
        assert_eq!(read.get("length"), Some("1"));
    }

    #[test]
    fn test_m4a_skips_non_numeric_track() {
        let dir = tempfile::tempdir().unwrap();
        let path = file_with(dir.path(), "song.m4a", test_audio::m4a_bytes());

        let tags: TagSet = [("title", "Side A"), ("track", "A1")].into_iter().collect();
        write_tags(&path, &tags, &SaveOptions::default()).unwrap();

        let read = read_tags(&path).unwrap();
        assert_eq!(read.get("title"), Some("Side A"));
        assert_eq!(read.get("track"), None);
    }
}
