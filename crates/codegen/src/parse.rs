//! Extract files from model output written in the correction prompt's format:
//!
//! ````text
//! --- Sources/ContentView.swift ---
//! ```swift
//! import SwiftUI
//! ...
//! ```
//! ````

use std::sync::LazyLock;

use regex::Regex;
use shipyard_core::types::SourceFiles;

static FILE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^-{3}\s*(?P<path>[^\s].*?)\s*-{3}\s*\n```[A-Za-z]*\n(?P<body>.*?)\n```")
        .expect("valid regex")
});

/// Every `--- path ---` + fenced block pair in `text`. Later blocks for the
/// same path win.
pub fn files_from_markdown(text: &str) -> SourceFiles {
    FILE_BLOCK_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let path = caps.name("path")?.as_str().trim();
            let body = caps.name("body")?.as_str();
            (!path.is_empty()).then(|| (path.to_string(), format!("{body}\n")))
        })
        .collect()
}
