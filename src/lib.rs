// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! audiotag: audio tag editor and Telegram channel auto-processor
//!
//! Reads and writes tags across MP3, FLAC, OGG/Opus, MP4, WAV and AIFF,
//! layers templates, text rules, smart rules and footers over them, and
//! republishes re-tagged audio posted to a Telegram channel.

pub mod admin;
pub mod artwork;
pub mod autoproc;
pub mod config;
pub mod db;
pub mod error;
pub mod inbox;
pub mod naming;
pub mod pipeline;
pub mod rules;
pub mod tags;
pub mod telegram;
pub mod templates;

pub use config::AppConfig;
pub use error::{AudioTagError, Result};
