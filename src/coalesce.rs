//! Paragraph text coalescing and fragment matching.
//!
//! Word processors and template engines scatter one logical string over many
//! text-bearing nodes: runs split at revision marks, line breaks inserted by
//! the merge engine's wrapping, `text:s` space elements, and so on. A
//! [`CoalescedText`] concatenates those pieces in document order, normalizes
//! whitespace, and remembers for every byte of the normalized text which
//! piece (and which byte of that piece) it came from, so a match can be
//! mapped back to the nodes that must be replaced.

use memchr::memmem;

use crate::lookup::RichTextLookup;

/// Normalize text for matching.
///
/// CRLF and CR become LF, then every run of ASCII whitespace (spaces, tabs,
/// newlines) collapses to a single space. Non-breaking spaces are content
/// and are left alone.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// One text-bearing source node and the text it contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan<N> {
    pub node: N,
    /// Text as it appears in the source (`"\t"` for a tab element, etc.).
    pub raw: String,
    /// Range of this span's contribution in the normalized text.
    pub start: usize,
    pub end: usize,
}

/// A position inside one span's raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPoint {
    pub span: usize,
    pub offset: usize,
}

/// Normalized concatenation of a paragraph's text-bearing nodes.
#[derive(Debug, Clone)]
pub struct CoalescedText<N> {
    text: String,
    spans: Vec<TextSpan<N>>,
    /// For each byte of `text`: (span index, byte offset in that span's raw text).
    origins: Vec<(usize, usize)>,
}

impl<N> Default for CoalescedText<N> {
    fn default() -> Self {
        Self {
            text: String::new(),
            spans: Vec::new(),
            origins: Vec::new(),
        }
    }
}

impl<N: Copy> CoalescedText<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the text contributed by `node`.
    pub fn push(&mut self, node: N, raw: &str) {
        let index = self.spans.len();
        let start = self.text.len();
        for (offset, ch) in raw.char_indices() {
            if ch.is_ascii_whitespace() {
                if self.text.ends_with(' ') {
                    continue;
                }
                self.text.push(' ');
                self.origins.push((index, offset));
            } else {
                self.text.push(ch);
                for k in 0..ch.len_utf8() {
                    self.origins.push((index, offset + k));
                }
            }
        }
        self.spans.push(TextSpan {
            node,
            raw: raw.to_string(),
            start,
            end: self.text.len(),
        });
    }

    /// The normalized text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn spans(&self) -> &[TextSpan<N>] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Map a normalized byte range back to raw span positions.
    ///
    /// The start point is where the first matched byte sits. The end point is
    /// exclusive; whitespace collapsed into the last matched byte belongs to
    /// the match, so it ends either at the next emitted byte of the same span
    /// or at the end of that span's raw text.
    pub fn locate(&self, start: usize, end: usize) -> Option<(RawPoint, RawPoint)> {
        if start >= end || end > self.origins.len() {
            return None;
        }
        let (first_span, first_offset) = self.origins[start];
        let (last_span, _) = self.origins[end - 1];
        let end_offset = match self.origins.get(end) {
            Some(&(span, offset)) if span == last_span => offset,
            _ => self.spans[last_span].raw.len(),
        };
        Some((
            RawPoint {
                span: first_span,
                offset: first_offset,
            },
            RawPoint {
                span: last_span,
                offset: end_offset,
            },
        ))
    }
}

/// A lookup key found in coalesced text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    /// Byte offset of the match in the normalized text.
    pub position: usize,
    pub key: &'a str,
    pub fragment: &'a str,
}

impl Match<'_> {
    /// Exclusive end offset in the normalized text.
    pub fn end(&self) -> usize {
        self.position + self.key.len()
    }
}

/// Find the earliest lookup key occurring at or after `start`.
///
/// When two keys start at the same offset the longer one wins, so a short
/// fragment never matches inside a longer fragment that contains it.
pub fn find_next_match<'a>(
    text: &str,
    lookup: &'a RichTextLookup,
    start: usize,
) -> Option<Match<'a>> {
    let haystack = text.as_bytes().get(start..)?;
    let mut best: Option<Match<'a>> = None;

    for (key, fragment) in lookup.iter() {
        let Some(found) = memmem::find(haystack, key.as_bytes()) else {
            continue;
        };
        let position = start + found;
        let better = match &best {
            None => true,
            Some(current) => {
                position < current.position
                    || (position == current.position && key.len() > current.key.len())
            }
        };
        if better {
            best = Some(Match {
                position,
                key,
                fragment,
            });
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lookup(fragments: &[&str]) -> RichTextLookup {
        let mut lookup = RichTextLookup::new();
        for fragment in fragments {
            lookup.insert(fragment);
        }
        lookup
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("a\r\n   b\rc\n\td"), "a b c d");
        assert_eq!(normalize_text("x\u{a0}\u{a0}y"), "x\u{a0}\u{a0}y");
        assert_eq!(normalize_text("  lead"), " lead");
    }

    #[test]
    fn test_coalesce_across_spans() {
        let mut text = CoalescedText::new();
        text.push(1u32, "<p>Hel");
        text.push(2, "lo</p>\n");
        text.push(3, "   ");
        text.push(4, "tail");
        assert_eq!(text.text(), "<p>Hello</p> tail");
        assert_eq!(text.spans()[2].start, text.spans()[2].end);

        let (start, end) = text.locate(0, "<p>Hello</p>".len()).unwrap();
        assert_eq!(start, RawPoint { span: 0, offset: 0 });
        assert_eq!(end, RawPoint { span: 1, offset: 6 });
    }

    #[test]
    fn test_locate_swallows_collapsed_whitespace() {
        let mut text = CoalescedText::new();
        text.push(1u32, "ab   cd");
        // "ab " matched: the three raw spaces all belong to the match
        let (_, end) = text.locate(0, 3).unwrap();
        assert_eq!(end, RawPoint { span: 0, offset: 5 });
    }

    #[test]
    fn test_locate_multibyte_offsets() {
        let mut text = CoalescedText::new();
        text.push(1u32, "é<b>x</b>");
        let pos = text.text().find('<').unwrap();
        let (start, end) = text.locate(pos, text.text().len()).unwrap();
        assert_eq!(start.offset, 2);
        assert_eq!(end.offset, "é<b>x</b>".len());
    }

    #[test]
    fn test_earliest_match_wins() {
        let lookup = lookup(&["<b>two</b>", "<b>one</b>"]);
        let found = find_next_match("x <b>one</b> <b>two</b>", &lookup, 0).unwrap();
        assert_eq!(found.key, "<b>one</b>");
        assert_eq!(found.position, 2);
    }

    #[test]
    fn test_longer_key_wins_at_same_position() {
        let lookup = lookup(&["<p>A</p>", "<p>A</p><p>B</p>"]);
        let found = find_next_match("<p>A</p><p>B</p>", &lookup, 0).unwrap();
        assert_eq!(found.key, "<p>A</p><p>B</p>");
    }

    #[test]
    fn test_start_position_is_respected() {
        let lookup = lookup(&["<i>x</i>"]);
        let text = "<i>x</i> and <i>x</i>";
        let second = find_next_match(text, &lookup, 1).unwrap();
        assert_eq!(second.position, 13);
        assert!(find_next_match(text, &lookup, 14).is_none());
        assert!(find_next_match(text, &lookup, 500).is_none());
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(s in "[ a-z\\t\\r\\n<>/]{0,40}") {
            let once = normalize_text(&s);
            prop_assert_eq!(normalize_text(&once), once.clone());
            prop_assert!(!once.contains("  "));
        }

        #[test]
        fn prop_split_points_do_not_change_text(s in "[ a-z<>\\n]{0,40}", cut in 0usize..40) {
            let cut = cut.min(s.len());
            let mut text = CoalescedText::new();
            text.push(0u8, &s[..cut]);
            text.push(1u8, &s[cut..]);
            prop_assert_eq!(text.text(), normalize_text(&s));
        }

        #[test]
        fn prop_match_is_earliest_occurrence(prefix in "[a-z ]{0,20}", suffix in "[a-z ]{0,20}") {
            let lookup = lookup(&["<u>k</u>", "<u>k</u><u>k</u>"]);
            let text = format!("{prefix}<u>k</u><u>k</u>{suffix}");
            let found = find_next_match(&text, &lookup, 0).unwrap();
            prop_assert_eq!(found.position, prefix.len());
            prop_assert_eq!(found.key, "<u>k</u><u>k</u>");
        }
    }
}
