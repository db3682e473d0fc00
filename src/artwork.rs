// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Cover art re-encoding, thumbnails and watermarking

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Longest side of embedded covers
pub const COVER_SIZE: u32 = 300;
const COVER_QUALITY: u8 = 80;

/// Thumbnail size Telegram accepts for audio posts
pub const CHANNEL_THUMB_SIZE: u32 = 512;
/// Thumbnail size for previews
pub const PREVIEW_THUMB_SIZE: u32 = 90;

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut buffer = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder.encode_image(&rgb)?;
    }
    Ok(buffer)
}

/// Fit an image inside 300x300 keeping aspect ratio and encode as JPEG
pub fn prepare_cover(data: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data)?;
    let img = img.resize(COVER_SIZE, COVER_SIZE, FilterType::Lanczos3);
    encode_jpeg(&img, COVER_QUALITY)
}

/// Center-crop to a square and scale to `size`
pub fn square_thumbnail(data: &[u8], size: u32) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data)?;
    let (width, height) = img.dimensions();
    let side = width.min(height);
    let left = (width - side) / 2;
    let top = (height - side) / 2;

    let square = img.crop_imm(left, top, side, side);
    let thumb = square.resize_exact(size, size, FilterType::Lanczos3);
    encode_jpeg(&thumb, 95)
}

/// Corner or centre placement for a watermark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl std::str::FromStr for WatermarkPosition {
    type Err = crate::AudioTagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "top-left" => Ok(Self::TopLeft),
            "top-right" => Ok(Self::TopRight),
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom-right" => Ok(Self::BottomRight),
            "center" => Ok(Self::Center),
            other => Err(crate::AudioTagError::Config(format!(
                "Unknown watermark position: {}",
                other
            ))),
        }
    }
}

/// Image watermark settings as stored in the admin settings tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub image_path: String,
    #[serde(default)]
    pub position: WatermarkPosition,
    #[serde(default = "default_size_percent")]
    pub size_percent: u32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default = "default_padding")]
    pub padding: u32,
}

fn default_size_percent() -> u32 { 25 }
fn default_opacity() -> f32 { 0.5 }
fn default_padding() -> u32 { 10 }

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            image_path: String::new(),
            position: WatermarkPosition::default(),
            size_percent: default_size_percent(),
            opacity: default_opacity(),
            padding: default_padding(),
        }
    }
}

/// Overlay `mark` on `cover` and return the result as JPEG
pub fn apply_watermark(cover: &[u8], mark: &[u8], settings: &WatermarkSettings) -> Result<Vec<u8>> {
    let base = image::load_from_memory(cover)?;
    let mark = image::load_from_memory(mark)?;
    let mut canvas = base.to_rgba8();
    let overlay = scaled_mark(&mark, canvas.width(), settings);

    let (x, y) = placement(
        (canvas.width(), canvas.height()),
        (overlay.width(), overlay.height()),
        settings.position,
        settings.padding,
    );
    image::imageops::overlay(&mut canvas, &overlay, x, y);

    encode_jpeg(&DynamicImage::ImageRgba8(canvas), 95)
}

fn scaled_mark(mark: &DynamicImage, base_width: u32, settings: &WatermarkSettings) -> RgbaImage {
    let percent = settings.size_percent.clamp(1, 100);
    let target_width = (base_width * percent / 100).max(1);
    let ratio = target_width as f64 / mark.width().max(1) as f64;
    let target_height = ((mark.height() as f64 * ratio).round() as u32).max(1);

    let mut scaled = mark
        .resize_exact(target_width, target_height, FilterType::Triangle)
        .to_rgba8();

    let opacity = settings.opacity.clamp(0.0, 1.0);
    for pixel in scaled.pixels_mut() {
        pixel[3] = (pixel[3] as f32 * opacity).round() as u8;
    }
    scaled
}

fn placement(
    base: (u32, u32),
    mark: (u32, u32),
    position: WatermarkPosition,
    padding: u32,
) -> (i64, i64) {
    let (bw, bh) = (base.0 as i64, base.1 as i64);
    let (mw, mh) = (mark.0 as i64, mark.1 as i64);
    let pad = padding as i64;

    match position {
        WatermarkPosition::TopLeft => (pad, pad),
        WatermarkPosition::TopRight => (bw - mw - pad, pad),
        WatermarkPosition::BottomLeft => (pad, bh - mh - pad),
        WatermarkPosition::BottomRight => (bw - mw - pad, bh - mh - pad),
        WatermarkPosition::Center => ((bw - mw) / 2, (bh - mh) / 2),
    }
}
