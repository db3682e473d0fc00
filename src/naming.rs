// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Filename helpers for downloaded and re-sent audio

use regex::Regex;
use std::sync::OnceLock;

const MAX_NAME_LEN: usize = 100;
const TRUNCATED_STEM_LEN: usize = 95;

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s.-]").expect("static regex"))
}

/// Make a filename safe to place on disk
pub fn sanitize_filename(name: &str) -> String {
    let mut clean = unsafe_chars().replace_all(name, "_").into_owned();

    if clean.starts_with('.') || clean.starts_with('-') {
        clean = format!("file{}", clean);
    }

    if clean.chars().count() > MAX_NAME_LEN {
        let (stem, ext) = match clean.rfind('.') {
            Some(idx) if idx > 0 => (&clean[..idx], &clean[idx..]),
            _ => (clean.as_str(), ""),
        };
        let stem: String = stem.chars().take(TRUNCATED_STEM_LEN).collect();
        clean = format!("{}{}", stem, ext);
    }

    clean
}

/// Short form of a filename for captions
pub fn short_caption(name: &str) -> String {
    if name.chars().count() > 30 {
        let head: String = name.chars().take(27).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}
