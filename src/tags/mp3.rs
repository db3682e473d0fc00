// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! ID3 frame mapping for MP3 files

use id3::frame::{Comment, Lyrics, Picture, PictureType};
use id3::{Tag, TagLike, Version};
use std::path::Path;

use super::{CoverArt, TagField, TagSet};
use crate::Result;

/// Plain text frames, one per writable field
const TEXT_FRAMES: [(TagField, &str); 8] = [
    (TagField::Title, "TIT2"),
    (TagField::Artist, "TPE1"),
    (TagField::AlbumArtist, "TPE2"),
    (TagField::Album, "TALB"),
    (TagField::Year, "TDRC"),
    (TagField::Genre, "TCON"),
    (TagField::Composer, "TCOM"),
    (TagField::Track, "TRCK"),
];

/// Text frames never mistaken for lyrics
const NON_LYRIC_FRAMES: [&str; 4] = ["TRCK", "TYER", "TDRC", "TXXX"];

fn load(path: &Path) -> Result<Option<Tag>> {
    match Tag::read_from_path(path) {
        Ok(tag) => Ok(Some(tag)),
        Err(e) if matches!(e.kind, id3::ErrorKind::NoTag) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(super) fn read(path: &Path) -> Result<TagSet> {
    Ok(load(path)?.map(|tag| from_id3(&tag)).unwrap_or_default())
}

fn frame_text<'a>(tag: &'a Tag, id: &str) -> Option<&'a str> {
    tag.get(id)
        .and_then(|f| f.content().text())
        .filter(|t| !t.is_empty())
}

fn from_id3(tag: &Tag) -> TagSet {
    let mut tags = TagSet::new();

    for (field, id) in TEXT_FRAMES {
        if let Some(text) = frame_text(tag, id) {
            tags.set(field.as_str(), text);
        }
    }

    if !tags.has_value(TagField::Year.as_str()) {
        if let Some(year) = frame_text(tag, "TYER") {
            tags.set(TagField::Year.as_str(), year);
        }
    }

    // TLEN is milliseconds; the tag model carries seconds
    let length_ms = frame_text(tag, "TLEN").and_then(|t| t.trim().parse::<u64>().ok());
    if let Some(ms) = length_ms.filter(|ms| *ms >= 1000) {
        tags.set(TagField::Length.as_str(), (ms / 1000).to_string());
    }

    let comment = tag
        .comments()
        .find(|c| c.description.is_empty())
        .or_else(|| tag.comments().next());
    if let Some(c) = comment.filter(|c| !c.text.is_empty()) {
        tags.set(TagField::Comment.as_str(), c.text.as_str());
    }

    if let Some(lyrics) = extract_lyrics(tag) {
        tags.set(TagField::Lyrics.as_str(), lyrics);
    }

    let cover = tag
        .pictures()
        .find(|p| p.picture_type == PictureType::CoverFront)
        .or_else(|| tag.pictures().next());
    if let Some(p) = cover {
        tags.set_picture(Some(CoverArt::new(p.data.clone(), p.mime_type.clone())));
    }

    tags
}

/// Find lyrics wherever taggers tend to leave them
fn extract_lyrics(tag: &Tag) -> Option<String> {
    if let Some(uslt) = tag.lyrics().find(|l| !l.text.trim().is_empty()) {
        return Some(uslt.text.clone());
    }

    if let Some(sylt) = tag.synchronised_lyrics().find(|s| !s.content.is_empty()) {
        let lines: Vec<&str> = sylt.content.iter().map(|(_, line)| line.as_str()).collect();
        return Some(lines.join("\n"));
    }

    if let Some(c) = tag.comments().find(|c| c.text.chars().count() > 100) {
        return Some(c.text.clone());
    }

    if let Some(txxx) = tag
        .extended_texts()
        .find(|t| t.description.to_uppercase().contains("LYRICS") && !t.value.is_empty())
    {
        return Some(txxx.value.clone());
    }

    tag.frames()
        .filter(|f| f.id().starts_with('T') && !NON_LYRIC_FRAMES.contains(&f.id()))
        .filter_map(|f| f.content().text())
        .find(|t| t.chars().count() > 200)
        .map(String::from)
}

pub(super) fn write(path: &Path, tags: &TagSet, cover: Option<CoverArt>) -> Result<()> {
    let mut tag = load(path)?.unwrap_or_else(Tag::new);

    for (field, id) in TEXT_FRAMES {
        let value = tags.value(field.as_str());
        if !value.is_empty() {
            tag.set_text(id, value);
        }
    }

    let comment = tags.value(TagField::Comment.as_str());
    if !comment.is_empty() {
        tag.remove_comment(Some(""), None);
        tag.add_frame(Comment {
            lang: "eng".to_string(),
            description: String::new(),
            text: comment.to_string(),
        });
    }

    let lyrics = tags.value(TagField::Lyrics.as_str());
    if !lyrics.is_empty() {
        tag.remove_all_lyrics();
        tag.add_frame(Lyrics {
            lang: "eng".to_string(),
            description: String::new(),
            text: lyrics.to_string(),
        });
        tag.add_frame(Lyrics {
            lang: "ara".to_string(),
            description: "Arabic".to_string(),
            text: lyrics.to_string(),
        });
    }

    if let Some(cover) = cover {
        tag.remove_all_pictures();
        tag.add_frame(Picture {
            mime_type: cover.mime_type.clone(),
            picture_type: PictureType::CoverFront,
            description: "Cover".to_string(),
            data: cover.data.clone(),
        });
        // Some players only show type 0 pictures
        tag.add_frame(Picture {
            mime_type: cover.mime_type,
            picture_type: PictureType::Other,
            description: "Thumbnail".to_string(),
            data: cover.data,
        });
    }

    tag.write_to_path(path, Version::Id3v23)?;
    Ok(())
}
