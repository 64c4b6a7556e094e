//! Composite "meta" line parsing.
//!
//! Result cards show language, format, and size on one line separated by a
//! middle dot, e.g. `English [en] · EPUB · 5.2MB · 2019`. Segment order is not
//! stable, so each segment is classified on its own.

/// Separator between fields of the meta line.
pub const META_DELIMITER: char = '·';

/// Formats recognised as the `format` field (upper-case).
const KNOWN_FORMATS: &[&str] = &["PDF", "EPUB", "ZIP", "MOBI", "AZW3", "TXT", "DOC", "DOCX"];

const SIZE_UNITS: &[&str] = &["MB", "KB", "GB"];

/// Markers after which card text is UI or script noise.
const LEAKAGE_MARKERS: &[&str] = &["Save", "(function"];

/// Minimum length of a cleaned meta line worth parsing.
const MIN_META_LEN: usize = 10;

/// Fields recovered from a meta line. Absent fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaFields {
    pub language: Option<String>,
    pub format: Option<String>,
    pub size: Option<String>,
}

/// Splits a meta line and classifies each segment.
///
/// A segment can satisfy more than one rule; each rule is applied
/// independently and the last matching segment wins for every field.
#[must_use]
pub fn extract_meta_information(meta: &str) -> MetaFields {
    let mut fields = MetaFields::default();

    for segment in meta.split(META_DELIMITER).map(str::trim) {
        if segment.is_empty() {
            continue;
        }
        if is_language(segment) {
            fields.language = Some(segment.to_string());
        }
        if is_format(segment) {
            fields.format = Some(segment.to_string());
        }
        if is_size(segment) {
            fields.size = Some(segment.to_string());
        }
    }

    fields
}

/// Strips bracket and separator residue from an extracted format.
#[must_use]
pub fn clean_format(format: &str) -> String {
    format
        .trim()
        .trim_matches(|c: char| matches!(c, '[' | ']' | '(' | ')' | META_DELIMITER))
        .trim()
        .to_string()
}

/// Returns true when a block of card text looks like the meta line.
///
/// It must contain the delimiter, a size unit, and either a bracketed
/// language or one of the common format names.
#[must_use]
pub fn is_meta_candidate(text: &str) -> bool {
    text.contains(META_DELIMITER)
        && SIZE_UNITS.iter().any(|unit| text.contains(unit))
        && (text.contains('[') || ["ZIP", "PDF", "EPUB"].iter().any(|f| text.contains(f)))
}

/// Cuts UI and script leakage from a meta candidate.
///
/// Returns `None` when what is left is too short or lost its delimiter.
#[must_use]
pub fn clean_meta_text(text: &str) -> Option<String> {
    let mut cleaned = text;
    for marker in LEAKAGE_MARKERS {
        if let Some(idx) = cleaned.find(marker) {
            cleaned = &cleaned[..idx];
        }
    }
    let cleaned = cleaned.trim();
    (cleaned.len() > MIN_META_LEN && cleaned.contains(META_DELIMITER))
        .then(|| cleaned.to_string())
}

fn is_language(segment: &str) -> bool {
    segment.contains('[') && segment.contains(']')
}

fn is_format(segment: &str) -> bool {
    let upper = segment.to_uppercase();
    KNOWN_FORMATS.contains(&upper.as_str())
}

fn is_size(segment: &str) -> bool {
    let upper = segment.to_uppercase();
    SIZE_UNITS.iter().any(|unit| upper.contains(unit))
}
