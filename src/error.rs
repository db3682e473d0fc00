// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for audiotag

use thiserror::Error;

/// Result type alias for audiotag operations
pub type Result<T> = std::result::Result<T, AudioTagError>;

/// audiotag error types
#[derive(Error, Debug)]
pub enum AudioTagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ID3 error: {0}")]
    Id3(#[from] id3::Error),

    #[error("Tag library error: {0}")]
    Lofty(#[from] lofty::error::LoftyError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Telegram request failed: {0}")]
    TelegramRequest(#[from] teloxide::RequestError),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("Tag error: {0}")]
    Tag(String),

    #[error("Rule error: {0}")]
    Rule(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
