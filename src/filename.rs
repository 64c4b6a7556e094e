//! Filename derivation for downloaded books.
//!
//! The fetch client writes to `book_filename(..)` and the job state machine
//! records the same name on the book row, so this is the only place a
//! basename is computed.

/// Title stored on a book row when metadata lookup failed.
pub const PLACEHOLDER_TITLE: &str = "Unknown Title";

/// Longest stem (in bytes) kept before the extension is appended.
const MAX_STEM_BYTES: usize = 200;

/// Number of hash characters used when a book has no usable title.
const HASH_STEM_CHARS: usize = 8;

/// Device names Windows refuses as file stems regardless of extension.
const RESERVED_STEMS: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Builds the on-disk basename for a book: `<title>.<format>`.
///
/// A blank title or the [`PLACEHOLDER_TITLE`] falls back to the first eight
/// characters of `hash`. The extension is the lower-cased format with any
/// bracket or separator residue removed; no extension is added when the
/// format is empty.
#[must_use]
pub fn book_filename(title: &str, format: &str, hash: &str) -> String {
    let title = title.trim();
    let stem_source = if title.is_empty() || title == PLACEHOLDER_TITLE {
        hash.chars().take(HASH_STEM_CHARS).collect::<String>()
    } else {
        title.to_string()
    };
    let stem = sanitize_filename(&stem_source);

    match normalize_extension(format) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

/// Makes `value` safe to use as a file stem on Linux, macOS, and Windows.
///
/// Path separators and other reserved characters become `_`, control
/// characters are dropped, trailing dots/spaces are trimmed, reserved device
/// names are prefixed, and the result is capped at 200 bytes. Returns
/// `"untitled"` when nothing usable is left.
#[must_use]
pub fn sanitize_filename(value: &str) -> String {
    let mapped: String = value
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => ' ',
            c => c,
        })
        .collect();

    let mut stem = truncate_at_char_boundary(mapped.trim(), MAX_STEM_BYTES)
        .trim_end_matches(['.', ' '])
        .to_string();

    if stem.is_empty() {
        return "untitled".to_string();
    }

    let device = stem.split('.').next().unwrap_or_default();
    if RESERVED_STEMS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(device))
    {
        stem.insert(0, '_');
    }
    stem
}

fn normalize_extension(format: &str) -> Option<String> {
    let ext: String = format
        .trim()
        .trim_matches(|c: char| matches!(c, '[' | ']' | '(' | ')' | '·' | '.') || c.is_whitespace())
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();
    (!ext.is_empty()).then_some(ext)
}

fn truncate_at_char_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
