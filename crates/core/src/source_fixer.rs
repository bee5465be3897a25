//! Deterministic, rule-based cleanup of generated Swift sources.
//!
//! Runs on generator output before it is compiled: once when a project is
//! first generated and again on every auto-fix retry. Each rule is a plain
//! textual rewrite that leaves already-correct input untouched, so the whole
//! pass is idempotent.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::types::SourceFiles;

/// Extension of files the fixer rewrites. Everything else passes through.
pub const SOURCE_EXTENSION: &str = ".swift";

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static SWIFTUI_USAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        :\s*View\b
        | \bsome\s+View\b
        | @(State|Binding|StateObject|ObservedObject|EnvironmentObject|Environment)\b
        | @main\b[\s\S]*:\s*App\b
        | \b(VStack|HStack|ZStack|LazyVStack|LazyHStack|NavigationStack|NavigationView|Text|Button|Spacer)\s*[({]
        ",
    )
    .expect("valid regex")
});

static SWIFTUI_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*import\s+SwiftUI\b").expect("valid regex"));

static FOUNDATION_USAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(Date|UUID|DateFormatter|NumberFormatter|JSONEncoder|JSONDecoder|UserDefaults|Locale)\b|\bURL\(string:",
    )
    .expect("valid regex")
});

/// SwiftUI and UIKit both re-export Foundation.
static FOUNDATION_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*import\s+(Foundation|SwiftUI|UIKit|Combine)\b").expect("valid regex")
});

/// `\.$id` in a key path.
static KEY_PATH_SIGIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\.\$([A-Za-z_])").expect("valid regex"));

/// `code: \"USD\"` or `identifier: \"en_US\"` left over from JSON escaping.
static ESCAPED_SPECIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(code|currencyCode|identifier)\s*:\s*\\"([A-Za-z0-9_\-]+)\\""#)
        .expect("valid regex")
});

/// `width: "100"` where a number is required.
static QUOTED_NUMERIC_ARG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(width|height|size|spacing|cornerRadius|opacity|radius|lineWidth|minWidth|maxWidth|minHeight|maxHeight)\s*:\s*"(-?\d+(?:\.\d+)?)""#,
    )
    .expect("valid regex")
});

/// `.padding("16")` where a number is required.
static QUOTED_NUMERIC_MODIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.(padding|opacity|cornerRadius|blur|zIndex)\(\s*"(-?\d+(?:\.\d+)?)"\s*\)"#)
        .expect("valid regex")
});

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// One rewrite rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixRule {
    SwiftUiImport,
    FoundationImport,
    KeyPathSigil,
    EscapedSpecifierQuotes,
    QuotedNumericLiteral,
}

/// A rule that changed a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedFix {
    pub path: String,
    pub rule: FixRule,
}

/// Fixed sources plus a record of what changed.
#[derive(Debug, Clone, PartialEq)]
pub struct FixOutcome {
    pub files: SourceFiles,
    pub applied: Vec<AppliedFix>,
}

/// Whether `path` is a file the fixer rewrites.
pub fn is_source_file(path: &str) -> bool {
    path.ends_with(SOURCE_EXTENSION)
}

/// Run every rule over every Swift file in `files`.
pub fn fix_sources(files: &SourceFiles) -> FixOutcome {
    let mut fixed = SourceFiles::new();
    let mut applied = Vec::new();

    for (path, content) in files {
        if !is_source_file(path) {
            fixed.insert(path.clone(), content.clone());
            continue;
        }
        let (content, rules) = fix_source(content);
        applied.extend(rules.into_iter().map(|rule| AppliedFix {
            path: path.clone(),
            rule,
        }));
        fixed.insert(path.clone(), content);
    }

    FixOutcome {
        files: fixed,
        applied,
    }
}

/// Run every rule over one Swift file. Returns the new content and the rules
/// that changed it, in application order.
pub fn fix_source(content: &str) -> (String, Vec<FixRule>) {
    let mut rules = Vec::new();
    let mut current = content.to_string();

    let mut apply = |rule: FixRule, next: String, current: &mut String| {
        if next != *current {
            *current = next;
            rules.push(rule);
        }
    };

    let next = KEY_PATH_SIGIL_RE.replace_all(&current, r"\.$1").into_owned();
    apply(FixRule::KeyPathSigil, next, &mut current);

    let next = ESCAPED_SPECIFIER_RE
        .replace_all(&current, r#"${1}: "${2}""#)
        .into_owned();
    apply(FixRule::EscapedSpecifierQuotes, next, &mut current);

    let next = QUOTED_NUMERIC_ARG_RE
        .replace_all(&current, "${1}: ${2}")
        .into_owned();
    let next = QUOTED_NUMERIC_MODIFIER_RE
        .replace_all(&next, ".${1}(${2})")
        .into_owned();
    apply(FixRule::QuotedNumericLiteral, next, &mut current);

    if SWIFTUI_USAGE_RE.is_match(&current) && !SWIFTUI_IMPORT_RE.is_match(&current) {
        let next = insert_import(&current, "SwiftUI");
        apply(FixRule::SwiftUiImport, next, &mut current);
    }

    if FOUNDATION_USAGE_RE.is_match(&current) && !FOUNDATION_IMPORT_RE.is_match(&current) {
        let next = insert_import(&current, "Foundation");
        apply(FixRule::FoundationImport, next, &mut current);
    }

    (current, rules)
}

/// Insert `import <module>` next to the existing imports, or before the first
/// line of code when there are none. Leading `//` header comments stay on top.
fn insert_import(content: &str, module: &str) -> String {
    let offset = import_offset(content);
    let mut out = String::with_capacity(content.len() + module.len() + 9);
    out.push_str(&content[..offset]);
    if offset > 0 && !content[..offset].ends_with('\n') {
        out.push('\n');
    }
    out.push_str("import ");
    out.push_str(module);
    out.push('\n');
    out.push_str(&content[offset..]);
    out
}

fn import_offset(content: &str) -> usize {
    let mut offset = 0;
    let mut first_code = None;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with("import ") {
            return offset;
        }
        if first_code.is_none() && !trimmed.is_empty() && !trimmed.starts_with("//") {
            first_code = Some(offset);
        }
        offset += line.len();
    }
    first_code.unwrap_or(offset)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
