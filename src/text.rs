//! Text canonicalization and sanitization
//!
//! [`normalize_text`] produces comparison keys for deduplication;
//! [`sanitize_text`] cleans display text received from the news API.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)&(?:[a-z]+|#[0-9]+|#x[0-9a-f]+);").expect("valid regex"));

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid regex"));

static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("valid regex"));

/// Canonicalizes a string for equality comparison
///
/// Lowercases, strips diacritics, drops HTML entities and tags, and collapses
/// whitespace. `None` and empty input both yield an empty string.
pub fn normalize_text(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };
    if text.is_empty() {
        return String::new();
    }

    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    let without_entities = ENTITY_RE.replace_all(&folded, "");
    let without_tags = TAG_RE.replace_all(&without_entities, "");

    WHITESPACE_RE
        .replace_all(&without_tags, " ")
        .trim()
        .to_string()
}

/// Strips markup from display text and decodes HTML entities
pub fn sanitize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let without_scripts = SCRIPT_RE.replace_all(text, "");
    let without_styles = STYLE_RE.replace_all(&without_scripts, "");
    let without_tags = TAG_RE.replace_all(&without_styles, "");

    html_escape::decode_html_entities(without_tags.as_ref())
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_empty_and_none() {
        assert_eq!(normalize_text(None), "");
        assert_eq!(normalize_text(Some("")), "");
        assert_eq!(normalize_text(Some("   ")), "");
    }

    #[test]
    fn test_normalize_strips_accents_and_case() {
        assert_eq!(normalize_text(Some("Canción ÁRBOL Pingüino")), "cancion arbol pinguino");
    }

    #[test]
    fn test_normalize_removes_tags_and_entities() {
        assert_eq!(
            normalize_text(Some("<b>Hola</b>&nbsp;mundo &#39;x&#39;")),
            "holamundo x"
        );
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_text(Some("  a \n\t b   c ")), "a b c");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_text(Some("  Él   <i>dijo</i> ÑANDÚ "));
        assert_eq!(normalize_text(Some(&once)), once);
    }

    #[test]
    fn test_sanitize_removes_script_and_style_blocks() {
        let input = "Hola<script>alert('x')</script><style>p{}</style> <p>mundo</p>";
        assert_eq!(sanitize_text(input), "Hola mundo");
    }

    #[test]
    fn test_sanitize_decodes_entities() {
        assert_eq!(
            sanitize_text("Tom &amp; Jerry &quot;live&quot; &lt;3 &#39;ok&#39;"),
            "Tom & Jerry \"live\" <3 'ok'"
        );
    }
}
