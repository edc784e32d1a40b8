//! HTML fragment parsing.
//!
//! Rich-text fields arrive as small HTML fragments produced by a web editor.
//! They are parsed with html5ever, which repairs unclosed and misnested tags
//! the way a browser would and decodes named and numeric entities, into an
//! immutable [`HtmlNode`] tree rooted at a synthetic [`ROOT_TAG`] element.

mod style;
mod tree_sink;

pub use style::{InlineStyle, TextAlign};

use html5ever::driver::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;

use tree_sink::FragmentSink;

/// Tag name of the synthetic element wrapping a parsed fragment.
pub const ROOT_TAG: &str = "#fragment";

/// A parsed HTML node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlNode {
    Text(String),
    Element(HtmlElement),
}

/// An HTML element with lowercase tag name and attributes in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlElement {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<HtmlNode>,
}

impl HtmlElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parsed `style` attribute.
    pub fn inline_style(&self) -> InlineStyle {
        self.attr("style")
            .map(InlineStyle::parse)
            .unwrap_or_default()
    }

    pub fn has_element_children(&self) -> bool {
        self.children
            .iter()
            .any(|c| matches!(c, HtmlNode::Element(_)))
    }
}

impl HtmlNode {
    pub fn as_element(&self) -> Option<&HtmlElement> {
        match self {
            HtmlNode::Element(e) => Some(e),
            HtmlNode::Text(_) => None,
        }
    }

    /// Tag name for elements, `None` for text.
    pub fn tag(&self) -> Option<&str> {
        self.as_element().map(|e| e.tag.as_str())
    }

    pub fn children(&self) -> &[HtmlNode] {
        match self {
            HtmlNode::Element(e) => &e.children,
            HtmlNode::Text(_) => &[],
        }
    }

    /// Concatenated descendant text.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Text node made only of ASCII whitespace (formatting between tags).
    pub fn is_whitespace_text(&self) -> bool {
        matches!(self, HtmlNode::Text(t) if t.bytes().all(|b| b.is_ascii_whitespace()))
    }
}

fn collect_text(node: &HtmlNode, out: &mut String) {
    match node {
        HtmlNode::Text(t) => out.push_str(t),
        HtmlNode::Element(e) => {
            for child in &e.children {
                collect_text(child, out);
            }
        }
    }
}

/// Why a fragment could not be turned into a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlParseError {
    /// The parser produced no `<body>` to read the fragment from.
    MissingBody,
    /// The input had visible text but the tree came back empty.
    ContentLost,
    /// A comment or a tag with attribute-like text runs to the end of the
    /// input; the parser would swallow that text.
    Unterminated,
}

impl std::fmt::Display for HtmlParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HtmlParseError::MissingBody => write!(f, "parsed document has no body"),
            HtmlParseError::ContentLost => write!(f, "fragment content was lost while parsing"),
            HtmlParseError::Unterminated => write!(f, "unterminated comment or tag"),
        }
    }
}

impl std::error::Error for HtmlParseError {}

/// Parse a fragment, reporting when the result cannot be trusted.
pub fn try_parse(html: &str) -> Result<HtmlNode, HtmlParseError> {
    if has_unterminated_markup(html) {
        return Err(HtmlParseError::Unterminated);
    }
    // The doctype keeps the parser out of quirks mode, where `<table>`
    // would not close an open `<p>`.
    let wrapped = format!("<!DOCTYPE html><html><head></head><body>{html}</body></html>");
    let children = parse_document(FragmentSink::new(), ParseOpts::default())
        .from_utf8()
        .one(wrapped.as_bytes())
        .into_body()
        .ok_or(HtmlParseError::MissingBody)?;

    let root = HtmlNode::Element(HtmlElement {
        tag: ROOT_TAG.to_string(),
        attrs: Vec::new(),
        children,
    });

    let input_has_text = html
        .split(['<', '>'])
        .any(|chunk| !chunk.trim().is_empty());
    let tree_is_empty = root.text_content().trim().is_empty()
        && !root.children().iter().any(|c| c.as_element().is_some());
    if input_has_text && tree_is_empty {
        return Err(HtmlParseError::ContentLost);
    }

    Ok(root)
}

/// Whether the input ends inside a comment, or inside a tag that carries more
/// than its name (`<b never closed`). A bare `</p` loses no text and passes.
fn has_unterminated_markup(html: &str) -> bool {
    if let Some(open) = html.rfind("<!--")
        && !html[open + 4..].contains("-->")
    {
        return true;
    }
    let Some(lt) = html.rfind('<') else {
        return false;
    };
    let rest = &html[lt + 1..];
    let opens_tag = rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '/' || c == '!');
    opens_tag && !rest.contains('>') && rest.trim().contains(|c: char| c.is_ascii_whitespace())
}

/// Parse a fragment; never fails.
///
/// When the parser cannot produce a trustworthy tree the whole input becomes
/// a single text node under the root, so user content is never dropped.
pub fn parse(html: &str) -> HtmlNode {
    match try_parse(html) {
        Ok(root) => root,
        Err(err) => {
            log::warn!("falling back to plain text for HTML fragment: {err}");
            HtmlNode::Element(HtmlElement {
                tag: ROOT_TAG.to_string(),
                attrs: Vec::new(),
                children: vec![HtmlNode::Text(html.to_string())],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(node: &HtmlNode) -> Vec<&str> {
        node.children().iter().filter_map(HtmlNode::tag).collect()
    }

    #[test]
    fn test_parse_wraps_top_level_nodes() {
        let root = parse("<p>One</p><p>Two</p>");
        assert_eq!(root.tag(), Some(ROOT_TAG));
        assert_eq!(tags(&root), vec!["p", "p"]);
    }

    #[test]
    fn test_entities_are_decoded() {
        let root = parse("<p>Fish &amp; Chips&nbsp;&#8364;&#x1F600;</p>");
        assert_eq!(root.text_content(), "Fish & Chips\u{a0}\u{20ac}\u{1F600}");
    }

    #[test]
    fn test_unclosed_tags_are_repaired() {
        let root = parse("<p>Unclosed<strong>");
        assert_eq!(root.text_content(), "Unclosed");
        assert_eq!(tags(&root), vec!["p"]);
        assert_eq!(tags(&root.children()[0]), vec!["strong"]);
    }

    #[test]
    fn test_literal_angle_bracket_is_text() {
        let root = parse("a < b");
        assert_eq!(root.children(), &[HtmlNode::Text("a < b".into())]);
    }

    #[test]
    fn test_table_closes_open_paragraph() {
        let root = parse("<p>Before<table><tr><td>Cell</td></tr></table>");
        assert_eq!(tags(&root), vec!["p", "table"]);
    }

    #[test]
    fn test_unterminated_comment_falls_back_to_text() {
        let html = "Visible <!-- never closed";
        assert_eq!(try_parse(html), Err(HtmlParseError::Unterminated));
        assert_eq!(parse(html).text_content(), html);
        assert_eq!(parse("<!-- hidden").text_content(), "<!-- hidden");
        assert_eq!(parse("<p>a</p><!-- note -->").text_content(), "a");
    }

    #[test]
    fn test_unterminated_tag_keeps_its_text() {
        let html = "<p>Dear <b never closed";
        assert_eq!(parse(html).text_content(), html);
        // A dangling end tag hides nothing.
        assert_eq!(parse("<p>x</p").text_content(), "x");
        assert_eq!(parse("a < b").text_content(), "a < b");
    }

    #[test]
    fn test_attributes_and_styles() {
        let root = parse(r#"<a HREF="https://example.com" style="font-weight:bold">x</a>"#);
        let a = root.children()[0].as_element().unwrap();
        assert_eq!(a.attr("href"), Some("https://example.com"));
        assert!(a.inline_style().bold);
    }
}
