// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Tag model and multi-format tag reading/writing
//!
//! MP3 files go through the `id3` crate so frame-level details (dual USLT
//! lyrics frames, cover plus thumbnail APIC frames, ID3v2.3 output) can be
//! controlled exactly. Every other container goes through `lofty`.

mod generic;
mod mp3;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::{artwork, AudioTagError, Result};

/// Known text tag fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagField {
    Title,
    Artist,
    Album,
    AlbumArtist,
    Year,
    Genre,
    Composer,
    Comment,
    Track,
    Length,
    Lyrics,
}

impl TagField {
    pub const ALL: [TagField; 11] = [
        TagField::Title,
        TagField::Artist,
        TagField::Album,
        TagField::AlbumArtist,
        TagField::Year,
        TagField::Genre,
        TagField::Composer,
        TagField::Comment,
        TagField::Track,
        TagField::Length,
        TagField::Lyrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TagField::Title => "title",
            TagField::Artist => "artist",
            TagField::Album => "album",
            TagField::AlbumArtist => "album_artist",
            TagField::Year => "year",
            TagField::Genre => "genre",
            TagField::Composer => "composer",
            TagField::Comment => "comment",
            TagField::Track => "track",
            TagField::Length => "length",
            TagField::Lyrics => "lyrics",
        }
    }

    /// Derived from the stream, never written back
    pub fn is_read_only(&self) -> bool {
        matches!(self, TagField::Length)
    }
}

/// True for keys the writers ignore
pub fn is_read_only(key: &str) -> bool {
    key.parse::<TagField>().map_or(false, |f| f.is_read_only())
}

impl fmt::Display for TagField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagField {
    type Err = AudioTagError;

    fn from_str(s: &str) -> Result<Self> {
        TagField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| AudioTagError::Tag(format!("Unknown tag field: {}", s)))
    }
}

/// Embedded cover image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl CoverArt {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Guess the MIME type from the leading magic bytes
    pub fn sniff(data: Vec<u8>) -> Self {
        let mime = if data.starts_with(&[0x89, b'P', b'N', b'G']) {
            "image/png"
        } else if data.starts_with(b"GIF8") {
            "image/gif"
        } else if data.len() > 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            "image/webp"
        } else {
            "image/jpeg"
        };
        Self::new(data, mime)
    }
}

/// Text tags keyed by field name, plus an optional front cover.
///
/// Keys are plain strings so stored rules and templates may carry any field
/// name; [`TagField`] lists the ones the writers understand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet {
    fields: BTreeMap<String, String>,
    #[serde(skip)]
    picture: Option<CoverArt>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Value of a field, or the empty string when absent
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// True when the field is present with a non-empty value
    pub fn has_value(&self, key: &str) -> bool {
        !self.value(key).is_empty()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut String> {
        self.fields.values_mut()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.picture.is_none()
    }

    pub fn picture(&self) -> Option<&CoverArt> {
        self.picture.as_ref()
    }

    pub fn set_picture(&mut self, picture: Option<CoverArt>) {
        self.picture = picture;
    }

    pub fn has_album_art(&self) -> bool {
        self.picture.is_some()
    }

    /// Overlay `newer` on top of `self`; non-empty newer values win
    pub fn merged_with(&self, newer: &TagSet) -> TagSet {
        let mut merged = self.clone();
        for (key, value) in newer.iter() {
            if !value.is_empty() {
                merged.set(key, value);
            }
        }
        if newer.picture.is_some() {
            merged.picture = newer.picture.clone();
        }
        merged
    }

    /// Names of fields whose value differs from `other`
    pub fn diff_keys(&self, other: &TagSet) -> Vec<String> {
        let mut keys: Vec<String> = self
            .keys()
            .chain(other.keys())
            .filter(|k| self.get(k) != other.get(k))
            .map(String::from)
            .collect();
        keys.sort();
        keys.dedup();
        if self.picture != other.picture {
            keys.push("picture".to_string());
        }
        keys
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = TagSet::new();
        for (k, v) in iter {
            tags.set(k, v);
        }
        tags
    }
}

/// Audio container families, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Flac,
    Wav,
    Mp4,
    Ogg,
    Opus,
    Asf,
    Aiff,
    Ape,
    Mpc,
}

impl AudioFormat {
    /// Unknown extensions are treated as MP3
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "flac" => AudioFormat::Flac,
            "wav" => AudioFormat::Wav,
            "m4a" | "mp4" | "aac" => AudioFormat::Mp4,
            "ogg" => AudioFormat::Ogg,
            "opus" => AudioFormat::Opus,
            "wma" | "asf" => AudioFormat::Asf,
            "aiff" | "aif" => AudioFormat::Aiff,
            "ape" => AudioFormat::Ape,
            "mpc" => AudioFormat::Mpc,
            _ => AudioFormat::Mp3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Mp4 => "mp4",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Opus => "opus",
            AudioFormat::Asf => "asf",
            AudioFormat::Aiff => "aiff",
            AudioFormat::Ape => "ape",
            AudioFormat::Mpc => "mpc",
        }
    }

    /// Fields this container's writer will store
    pub fn writable_fields(&self) -> &'static [TagField] {
        use TagField::*;
        match self {
            AudioFormat::Mp3 => &[
                Title, Artist, Album, AlbumArtist, Year, Genre, Composer, Comment, Track, Lyrics,
            ],
            AudioFormat::Wav => &[Title, Artist, Album, Comment],
            AudioFormat::Asf => &[],
            _ => &[
                Title, Artist, Album, AlbumArtist, Year, Genre, Composer, Comment, Track, Lyrics,
            ],
        }
    }

    pub fn supports_pictures(&self) -> bool {
        !matches!(self, AudioFormat::Wav | AudioFormat::Asf)
    }

    /// Vorbis-comment based containers
    pub fn is_vorbis(&self) -> bool {
        matches!(self, AudioFormat::Flac | AudioFormat::Ogg | AudioFormat::Opus)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options controlling how tags are written
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Re-encode cover art to a 300px JPEG before embedding
    pub reencode_cover: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            reencode_cover: true,
        }
    }
}

/// Read all known tags and the front cover from a file
pub fn read_tags(path: &Path) -> Result<TagSet> {
    let format = AudioFormat::from_path(path);
    debug!("Reading {} tags from {:?}", format, path);

    let mut tags = match format {
        AudioFormat::Mp3 => mp3::read(path)?,
        AudioFormat::Asf => {
            return Err(AudioTagError::UnsupportedFormat(format!(
                "{} ({:?})",
                format, path
            )))
        }
        _ => generic::read(path, format)?,
    };

    if !tags.has_value(TagField::Length.as_str()) {
        match generic::duration_secs(path) {
            Ok(secs) if secs > 0 => tags.set(TagField::Length.as_str(), secs.to_string()),
            Ok(_) => {}
            Err(e) => debug!("No audio properties for {:?}: {}", path, e),
        }
    }

    Ok(tags)
}

/// Front cover of a file, if any
pub fn extract_cover(path: &Path) -> Result<Option<CoverArt>> {
    Ok(read_tags(path)?.picture().cloned())
}

/// Write tags into a file.
///
/// The write happens on a copy in the same directory which then replaces the
/// original, so a failed write leaves the file untouched. Empty values are
/// skipped and never clear an existing tag.
pub fn write_tags(path: &Path, tags: &TagSet, options: &SaveOptions) -> Result<()> {
    let format = AudioFormat::from_path(path);
    if format == AudioFormat::Asf {
        return Err(AudioTagError::UnsupportedFormat(format!("{} ({:?})", format, path)));
    }

    let cover = tags.picture().map(|p| cover_for_write(p, options));
    let staged = staging_path(path);
    std::fs::copy(path, &staged)?;

    let result = match format {
        AudioFormat::Mp3 => mp3::write(&staged, tags, cover),
        _ => generic::write(&staged, format, tags, cover),
    };

    match result {
        Ok(()) => {
            std::fs::rename(&staged, path)?;
            debug!("Wrote {} tags to {:?}", format, path);
            Ok(())
        }
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_file(&staged) {
                warn!("Failed to remove staging file {:?}: {}", staged, cleanup);
            }
            Err(e)
        }
    }
}

/// Merge `new_tags` over the file's current tags and write the result
pub fn update_tags(path: &Path, new_tags: &TagSet, options: &SaveOptions) -> Result<TagSet> {
    let current = read_tags(path)?;
    let merged = current.merged_with(new_tags);
    write_tags(path, &merged, options)?;
    Ok(merged)
}

fn cover_for_write(picture: &CoverArt, options: &SaveOptions) -> CoverArt {
    if !options.reencode_cover {
        return picture.clone();
    }
    match artwork::prepare_cover(&picture.data) {
        Ok(jpeg) => CoverArt::new(jpeg, "image/jpeg"),
        Err(e) => {
            warn!("Cover re-encode failed, embedding original bytes: {}", e);
            picture.clone()
        }
    }
}

/// Hidden sibling path that keeps the extension so format probing still works
fn staging_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("mp3");
    let name = format!(".{}.{}.{}", stem, uuid::Uuid::new_v4().simple(), ext);
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
pub(crate) mod test_audio {
    //! Minimal synthetic audio streams for tag round-trips

    /// One second of silent 8kHz mono 16-bit PCM
    pub fn wav_bytes() -> Vec<u8> {
        let sample_rate: u32 = 8000;
        let data_len: u32 = sample_rate * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(out.len() + data_len as usize, 0);
        out
    }

    /// A run of silent MPEG-1 Layer III frames (128 kbps, 44.1 kHz)
    pub fn mp3_bytes() -> Vec<u8> {
        let frame_len = 417;
        let mut out = Vec::new();
        for _ in 0..40 {
            let mut frame = vec![0u8; frame_len];
            frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
            out.extend_from_slice(&frame);
        }
        out
    }

    /// FLAC header with a one second STREAMINFO (8kHz mono 16-bit) and no frames
    pub fn flac_bytes() -> Vec<u8> {
        let mut out = b"fLaC".to_vec();
        out.push(0x80);
        out.extend_from_slice(&[0, 0, 34]);
        out.extend_from_slice(&4096u16.to_be_bytes());
        out.extend_from_slice(&4096u16.to_be_bytes());
        out.extend_from_slice(&[0; 6]);
        let packed: u64 = (8000 << 44) | (15 << 36) | 8000;
        out.extend_from_slice(&packed.to_be_bytes());
        out.extend_from_slice(&[0; 16]);
        out.extend_from_slice(&[0; 32]);
        out
    }

    fn ogg_crc(data: &[u8]) -> u32 {
        let mut crc = 0u32;
        for &byte in data {
            crc ^= (byte as u32) << 24;
            for _ in 0..8 {
                crc = if crc & 0x8000_0000 != 0 {
                    (crc << 1) ^ 0x04c1_1db7
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    fn ogg_page(header_type: u8, granule: u64, sequence: u32, packets: &[&[u8]]) -> Vec<u8> {
        let mut lacing = Vec::new();
        for packet in packets {
            let mut len = packet.len();
            while len >= 255 {
                lacing.push(255u8);
                len -= 255;
            }
            lacing.push(len as u8);
        }

        let mut page = b"OggS".to_vec();
        page.push(0);
        page.push(header_type);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&0x0A1Du32.to_le_bytes());
        page.extend_from_slice(&sequence.to_le_bytes());
        page.extend_from_slice(&[0; 4]);
        page.push(lacing.len() as u8);
        page.extend_from_slice(&lacing);
        for packet in packets {
            page.extend_from_slice(packet);
        }
        let crc = ogg_crc(&page);
        page[22..26].copy_from_slice(&crc.to_le_bytes());
        page
    }

    /// Ogg Vorbis headers plus one audio page ending at granule 8000 (one second)
    pub fn ogg_vorbis_bytes() -> Vec<u8> {
        let mut ident = b"\x01vorbis".to_vec();
        ident.extend_from_slice(&0u32.to_le_bytes());
        ident.push(1);
        ident.extend_from_slice(&8000u32.to_le_bytes());
        ident.extend_from_slice(&0i32.to_le_bytes());
        ident.extend_from_slice(&32000i32.to_le_bytes());
        ident.extend_from_slice(&0i32.to_le_bytes());
        ident.push(0xB8);
        ident.push(1);

        let vendor = b"audiotag";
        let mut comment = b"\x03vorbis".to_vec();
        comment.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        comment.extend_from_slice(vendor);
        comment.extend_from_slice(&0u32.to_le_bytes());
        comment.push(1);

        let setup = b"\x05vorbis\x00\x00\x00\x00\x01".to_vec();
        let audio = vec![0u8; 16];

        let mut out = ogg_page(0x02, 0, 0, &[&ident[..]]);
        out.extend(ogg_page(0x00, 0, 1, &[&comment[..], &setup[..]]));
        out.extend(ogg_page(0x04, 8000, 2, &[&audio[..]]));
        out
    }

    fn atom(name: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(name);
        out.extend_from_slice(payload);
        out
    }

    const IDENTITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

    fn matrix() -> Vec<u8> {
        IDENTITY_MATRIX.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    /// M4A with one AAC track of one second at 8kHz; mdat precedes moov
    pub fn m4a_bytes() -> Vec<u8> {
        let ftyp = atom(b"ftyp", &[&b"M4A "[..], &[0; 4][..], &b"M4A "[..], &b"mp42"[..], &b"isom"[..]].concat());
        let mdat = atom(b"mdat", &[0; 64]);

        let mut mvhd = vec![0u8; 12];
        mvhd.extend_from_slice(&8000u32.to_be_bytes());
        mvhd.extend_from_slice(&8000u32.to_be_bytes());
        mvhd.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        mvhd.extend_from_slice(&0x0100u16.to_be_bytes());
        mvhd.extend_from_slice(&[0; 10]);
        mvhd.extend(matrix());
        mvhd.extend_from_slice(&[0; 24]);
        mvhd.extend_from_slice(&2u32.to_be_bytes());

        let mut tkhd = vec![0, 0, 0, 7];
        tkhd.extend_from_slice(&[0; 8]);
        tkhd.extend_from_slice(&1u32.to_be_bytes());
        tkhd.extend_from_slice(&[0; 4]);
        tkhd.extend_from_slice(&8000u32.to_be_bytes());
        tkhd.extend_from_slice(&[0; 12]);
        tkhd.extend_from_slice(&0x0100u16.to_be_bytes());
        tkhd.extend_from_slice(&[0; 2]);
        tkhd.extend(matrix());
        tkhd.extend_from_slice(&[0; 8]);

        let mut mdhd = vec![0u8; 12];
        mdhd.extend_from_slice(&8000u32.to_be_bytes());
        mdhd.extend_from_slice(&8000u32.to_be_bytes());
        mdhd.extend_from_slice(&0x55C4u16.to_be_bytes());
        mdhd.extend_from_slice(&[0; 2]);

        let hdlr = [&[0u8; 8][..], &b"soun"[..], &[0; 12][..], &b"SoundHandler\0"[..]].concat();

        let esds = [
            &[0u8, 0, 0, 0][..],
            &[0x03, 25, 0, 1, 0][..],
            &[0x04, 17, 0x40, 0x15, 0, 0, 0][..],
            &32000u32.to_be_bytes()[..],
            &32000u32.to_be_bytes()[..],
            &[0x05, 2, 0x15, 0x88][..],
            &[0x06, 1, 0x02][..],
        ]
        .concat();

        let mut mp4a = vec![0u8; 6];
        mp4a.extend_from_slice(&1u16.to_be_bytes());
        mp4a.extend_from_slice(&[0; 8]);
        mp4a.extend_from_slice(&1u16.to_be_bytes());
        mp4a.extend_from_slice(&16u16.to_be_bytes());
        mp4a.extend_from_slice(&[0; 4]);
        mp4a.extend_from_slice(&(8000u32 << 16).to_be_bytes());
        mp4a.extend(atom(b"esds", &esds));

        let stsd = [&[0u8, 0, 0, 0, 0, 0, 0, 1][..], &atom(b"mp4a", &mp4a)[..]].concat();
        let empty_table = [0u8; 8];
        let stbl = [
            atom(b"stsd", &stsd),
            atom(b"stts", &empty_table),
            atom(b"stsc", &empty_table),
            atom(b"stsz", &[0u8; 12]),
            atom(b"stco", &empty_table),
        ]
        .concat();

        let dref = [&[0u8, 0, 0, 0, 0, 0, 0, 1][..], &atom(b"url ", &[0, 0, 0, 1])[..]].concat();
        let minf = [
            atom(b"smhd", &[0u8; 8]),
            atom(b"dinf", &atom(b"dref", &dref)),
            atom(b"stbl", &stbl),
        ]
        .concat();

        let mdia = [atom(b"mdhd", &mdhd), atom(b"hdlr", &hdlr), atom(b"minf", &minf)].concat();
        let trak = [atom(b"tkhd", &tkhd), atom(b"mdia", &mdia)].concat();
        let moov = [atom(b"mvhd", &mvhd), atom(b"trak", &trak)].concat();

        [ftyp, mdat, atom(b"moov", &moov)].concat()
    }

    /// A tiny PNG image
    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
        let mut buffer = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        let cases = [
            ("a.mp3", AudioFormat::Mp3),
            ("a.FLAC", AudioFormat::Flac),
            ("a.m4a", AudioFormat::Mp4),
            ("a.aac", AudioFormat::Mp4),
            ("a.opus", AudioFormat::Opus),
            ("a.wma", AudioFormat::Asf),
            ("a.aiff", AudioFormat::Aiff),
            ("a.mpc", AudioFormat::Mpc),
            ("a.unknown", AudioFormat::Mp3),
            ("noext", AudioFormat::Mp3),
        ];
        for (name, expected) in cases {
            assert_eq!(AudioFormat::from_path(Path::new(name)), expected, "{}", name);
        }
    }

    #[test]
    fn test_wav_writes_only_basic_fields() {
        let fields = AudioFormat::Wav.writable_fields();
        assert_eq!(fields.len(), 4);
        assert!(!fields.contains(&TagField::Lyrics));
    }

    #[test]
    fn test_tag_field_parse() {
        assert_eq!("album_artist".parse::<TagField>().unwrap(), TagField::AlbumArtist);
        assert!("albumartist".parse::<TagField>().is_err());
    }

    #[test]
    fn test_merge_keeps_existing_when_new_is_empty() {
        let base: TagSet = [("title", "Old"), ("artist", "A")].into_iter().collect();
        let newer: TagSet = [("title", "New"), ("artist", "")].into_iter().collect();
        let merged = base.merged_with(&newer);
        assert_eq!(merged.get("title"), Some("New"));
        assert_eq!(merged.get("artist"), Some("A"));
    }

    #[test]
    fn test_diff_keys() {
        let a: TagSet = [("title", "x"), ("genre", "pop")].into_iter().collect();
        let b: TagSet = [("title", "y"), ("genre", "pop"), ("year", "2020")].into_iter().collect();
        assert_eq!(a.diff_keys(&b), vec!["title".to_string(), "year".to_string()]);
    }

    #[test]
    fn test_tagset_serializes_as_plain_object() {
        let tags: TagSet = [("title", "T")].into_iter().collect();
        let json = serde_json::to_string(&tags).unwrap();
        assert_eq!(json, r#"{"title":"T"}"#);
        let back: TagSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tags);
    }

    #[test]
    fn test_sniff_mime() {
        assert_eq!(CoverArt::sniff(test_audio::png_bytes(2, 2)).mime_type, "image/png");
        assert_eq!(CoverArt::sniff(vec![0xFF, 0xD8, 0xFF]).mime_type, "image/jpeg");
    }

    #[test]
    fn test_asf_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wma");
        std::fs::write(&path, b"not really asf").unwrap();
        assert!(matches!(read_tags(&path), Err(AudioTagError::UnsupportedFormat(_))));
        assert!(matches!(
            write_tags(&path, &TagSet::new(), &SaveOptions::default()),
            Err(AudioTagError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_failed_write_leaves_original_and_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.flac");
        std::fs::write(&path, b"definitely not flac").unwrap();

        let tags: TagSet = [("title", "x")].into_iter().collect();
        assert!(write_tags(&path, &tags, &SaveOptions::default()).is_err());

        assert_eq!(std::fs::read(&path).unwrap(), b"definitely not flac");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_mp3_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, test_audio::mp3_bytes()).unwrap();

        let mut tags: TagSet = [
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
        ]
        .into_iter()
        .collect();
        tags.set_picture(Some(CoverArt::sniff(test_audio::png_bytes(600, 400))));

        write_tags(&path, &tags, &SaveOptions::default()).unwrap();
        let read = read_tags(&path).unwrap();

        for key in ["title", "artist", "album_artist", "album", "year", "genre", "composer", "comment", "track"] {
            assert_eq!(read.get(key), tags.get(key), "{}", key);
        }
        assert_eq!(read.get("lyrics"), Some("line one\nline two"));

        let cover = read.picture().unwrap();
        assert_eq!(cover.mime_type, "image/jpeg");
        let img = image::load_from_memory(&cover.data).unwrap();
        assert_eq!((img.width(), img.height()), (300, 200));
    }

    #[test]
    fn test_footer_flow_leaves_no_tlen() {
        use crate::pipeline::{merge, Footer, MergeRequest};
        use id3::TagLike;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, test_audio::mp3_bytes()).unwrap();

        let mut base = read_tags(&path).unwrap();
        assert_eq!(base.get("length"), Some("1"));
        base.set("title", "Song");

        let footer = Footer::new("@x");
        let request = MergeRequest {
            footer: Some(&footer),
            ..MergeRequest::default()
        };
        let outcome = merge(&base, &request);
        assert_eq!(outcome.tags.get("length"), Some("1"));
        write_tags(&path, &outcome.tags, &SaveOptions::default()).unwrap();

        let raw = id3::Tag::read_from_path(&path).unwrap();
        assert!(raw.get("TLEN").is_none());
        assert_eq!(raw.title(), Some("Song - @x"));
        assert_eq!(read_tags(&path).unwrap().get("length"), Some("1"));
    }

    #[test]
    fn test_update_tags_merges_over_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, test_audio::mp3_bytes()).unwrap();

        let first: TagSet = [("title", "One"), ("artist", "Someone")].into_iter().collect();
        write_tags(&path, &first, &SaveOptions::default()).unwrap();

        let second: TagSet = [("title", "Two")].into_iter().collect();
        let merged = update_tags(&path, &second, &SaveOptions::default()).unwrap();
        assert_eq!(merged.get("artist"), Some("Someone"));

        let read = read_tags(&path).unwrap();
        assert_eq!(read.get("title"), Some("Two"));
        assert_eq!(read.get("artist"), Some("Someone"));
    }

    #[test]
    fn test_wav_roundtrip_basic_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, test_audio::wav_bytes()).unwrap();

        let tags: TagSet = [("title", "Clip"), ("artist", "Me"), ("genre", "Ignored")]
            .into_iter()
            .collect();
        write_tags(&path, &tags, &SaveOptions::default()).unwrap();

        let read = read_tags(&path).unwrap();
        assert_eq!(read.get("title"), Some("Clip"));
        assert_eq!(read.get("artist"), Some("Me"));
        assert_eq!(read.get("genre"), None);
        assert_eq!(read.get("length"), Some("1"));
    }
}
