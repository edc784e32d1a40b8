//! The rich-text lookup table.

use std::collections::BTreeMap;

use crate::coalesce::normalize_text;

/// Tags whose presence marks a field value as rich text.
const RICH_TAGS: &[&str] = &[
    "p", "div", "span", "strong", "b", "em", "i", "u", "a", "h1", "h2", "h3", "h4", "h5", "h6",
    "ul", "ol", "li", "table", "thead", "tbody", "tfoot", "tr", "td", "th", "br",
];

/// Maps the normalized text a fragment takes in the merged document to the
/// original HTML it came from.
///
/// Built once per document from the field values the merge engine
/// substituted, read-only while parts are rewritten. Keys iterate in sorted
/// order so matching is deterministic.
#[derive(Debug, Clone, Default)]
pub struct RichTextLookup {
    entries: BTreeMap<String, String>,
}

impl RichTextLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a lookup from field values, keeping only those that look like
    /// rich text.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lookup = Self::new();
        for value in values {
            let value = value.as_ref();
            if looks_like_rich_text(value) {
                lookup.insert(value);
            }
        }
        lookup
    }

    /// Register an HTML fragment.
    ///
    /// The key is the trimmed, whitespace-normalized HTML. When the merge
    /// engine may have decoded entities (`&amp;` written as `&`), the decoded
    /// spelling is registered as a second key for the same fragment. Returns
    /// `false` for blank input.
    pub fn insert(&mut self, html: &str) -> bool {
        let key = normalize_text(html).trim().to_string();
        if key.is_empty() {
            return false;
        }

        if let Some(decoded) = decode_entities(&key)
            && decoded != key
            && !decoded.trim().is_empty()
        {
            let decoded = normalize_text(&decoded).trim().to_string();
            self.entries
                .entry(decoded)
                .or_insert_with(|| html.to_string());
        }
        self.entries.insert(key, html.to_string());
        true
    }

    /// The fragment registered under an exact key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(key, fragment)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<S: AsRef<str>> FromIterator<S> for RichTextLookup {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut lookup = Self::new();
        for html in iter {
            lookup.insert(html.as_ref());
        }
        lookup
    }
}

/// Whether a field value contains at least one tag from the supported subset.
pub fn looks_like_rich_text(value: &str) -> bool {
    let bytes = value.as_bytes();
    memchr::memchr_iter(b'<', bytes).any(|lt| {
        let rest = &value[lt + 1..];
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        let name_len = rest
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric())
            .count();
        if name_len == 0 {
            return false;
        }
        let name = rest[..name_len].to_ascii_lowercase();
        let terminated = matches!(
            rest.as_bytes().get(name_len),
            Some(b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r')
        );
        terminated && RICH_TAGS.contains(&name.as_str())
    })
}

/// Decode the XML entities plus `&nbsp;`; `None` when an unknown entity
/// makes the decoded spelling ambiguous.
fn decode_entities(text: &str) -> Option<String> {
    if !text.contains('&') {
        return None;
    }
    quick_xml::escape::unescape_with(text, |entity| {
        quick_xml::escape::resolve_predefined_entity(entity).or(match entity {
            "nbsp" => Some("\u{a0}"),
            _ => None,
        })
    })
    .ok()
    .map(|decoded| decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_normalizes_key() {
        let mut lookup = RichTextLookup::new();
        assert!(lookup.insert("  <p>Hello\r\n    world</p>\n"));
        assert_eq!(
            lookup.get("<p>Hello world</p>"),
            Some("  <p>Hello\r\n    world</p>\n")
        );
        assert!(!lookup.insert("   \n"));
        assert_eq!(lookup.len(), 1);
    }

    #[test]
    fn test_entity_decoded_variant_is_registered() {
        let lookup: RichTextLookup = ["<p>Fish &amp; Chips&nbsp;!</p>"].into_iter().collect();
        assert_eq!(lookup.len(), 2);
        assert!(lookup.get("<p>Fish &amp; Chips&nbsp;!</p>").is_some());
        assert_eq!(
            lookup.get("<p>Fish & Chips\u{a0}!</p>"),
            Some("<p>Fish &amp; Chips&nbsp;!</p>")
        );
    }

    #[test]
    fn test_unknown_entity_keeps_only_raw_key() {
        let lookup: RichTextLookup = ["<p>&hellip;</p>"].into_iter().collect();
        assert_eq!(lookup.len(), 1);
    }

    #[test]
    fn test_looks_like_rich_text() {
        assert!(looks_like_rich_text("<p>x</p>"));
        assert!(looks_like_rich_text("plain then <br/>"));
        assert!(looks_like_rich_text("<TABLE border=1>"));
        assert!(looks_like_rich_text("text</strong>"));
        assert!(!looks_like_rich_text("a < b and c > d"));
        assert!(!looks_like_rich_text("<custom>x</custom>"));
        assert!(!looks_like_rich_text("<pre>x</pre>"));
        assert!(!looks_like_rich_text("no tags"));
    }

    #[test]
    fn test_from_values_filters_plain_text() {
        let lookup = RichTextLookup::from_values(["Plain name", "<strong>Bold</strong>"]);
        assert_eq!(lookup.len(), 1);
        assert!(lookup.get("<strong>Bold</strong>").is_some());
    }
}
