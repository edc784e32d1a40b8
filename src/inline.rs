//! Inline formatting propagation.
//!
//! Walking an HTML subtree yields a flat list of [`InlineLeaf`]s, each text
//! leaf carrying the [`FormattingContext`] active at that point. Contexts are
//! values: a child context is derived by copy-and-set, so formatting set in
//! one branch can never leak into a sibling.

use crate::html::{HtmlElement, HtmlNode};

/// Character formatting active at a point in the HTML tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FormattingContext {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub link: Option<String>,
}

impl FormattingContext {
    pub fn bold(&self) -> Self {
        Self {
            bold: true,
            ..self.clone()
        }
    }

    pub fn italic(&self) -> Self {
        Self {
            italic: true,
            ..self.clone()
        }
    }

    pub fn underline(&self) -> Self {
        Self {
            underline: true,
            ..self.clone()
        }
    }

    pub fn with_link(&self, href: &str) -> Self {
        Self {
            link: Some(href.to_string()),
            ..self.clone()
        }
    }

    /// Derive the context for an element's content.
    pub fn for_element(&self, element: &HtmlElement) -> Self {
        let mut ctx = match element.tag.as_str() {
            "strong" | "b" | "th" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => self.bold(),
            "em" | "i" => self.italic(),
            "u" => self.underline(),
            "a" => match element.attr("href") {
                Some(href) if !href.trim().is_empty() => self.with_link(href.trim()),
                _ => self.clone(),
            },
            _ => self.clone(),
        };
        let style = element.inline_style();
        ctx.bold |= style.bold;
        ctx.italic |= style.italic;
        ctx.underline |= style.underline;
        ctx
    }

    /// Whether any character formatting (not counting links) is active.
    pub fn is_plain(&self) -> bool {
        !self.bold && !self.italic && !self.underline
    }
}

/// A leaf of inline content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineLeaf {
    Text {
        text: String,
        format: FormattingContext,
    },
    LineBreak,
}

impl InlineLeaf {
    pub fn text(text: impl Into<String>, format: FormattingContext) -> Self {
        InlineLeaf::Text {
            text: text.into(),
            format,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            InlineLeaf::Text { text, .. } => Some(text),
            InlineLeaf::LineBreak => None,
        }
    }
}

/// Tags treated as line-level containers when they show up in inline content.
fn is_block_tag(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "div"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "ul"
            | "ol"
            | "li"
            | "table"
            | "tr"
            | "blockquote"
            | "pre"
            | "section"
            | "article"
            | "header"
            | "footer"
    )
}

/// Flatten `node` into formatted leaves.
///
/// Text is whitespace-collapsed but not trimmed; call [`tidy`] on the result
/// of a whole line.
pub fn descend(node: &HtmlNode, context: &FormattingContext) -> Vec<InlineLeaf> {
    let mut out = Vec::new();
    descend_into(node, context, &mut out);
    out
}

/// Flatten a list of sibling nodes.
pub fn descend_all(nodes: &[HtmlNode], context: &FormattingContext) -> Vec<InlineLeaf> {
    let mut out = Vec::new();
    for node in nodes {
        descend_into(node, context, &mut out);
    }
    out
}

fn descend_into(node: &HtmlNode, context: &FormattingContext, out: &mut Vec<InlineLeaf>) {
    let element = match node {
        HtmlNode::Text(text) => {
            let text = collapse_whitespace(text);
            if !text.is_empty() {
                out.push(InlineLeaf::text(text, context.clone()));
            }
            return;
        }
        HtmlNode::Element(element) => element,
    };

    match element.tag.as_str() {
        "br" => out.push(InlineLeaf::LineBreak),
        "script" | "style" | "head" | "title" => {}
        "a" => {
            let ctx = context.for_element(element);
            let before = out.len();
            for child in &element.children {
                descend_into(child, &ctx, out);
            }
            let has_text = out[before..]
                .iter()
                .any(|leaf| leaf.as_text().is_some_and(|t| !t.trim().is_empty()));
            if !has_text && let Some(href) = ctx.link.clone() {
                out.truncate(before);
                out.push(InlineLeaf::text(href, ctx));
            }
        }
        tag if is_block_tag(tag) => {
            let ctx = context.for_element(element);
            if !ends_line(out) {
                out.push(InlineLeaf::LineBreak);
            }
            for child in &element.children {
                descend_into(child, &ctx, out);
            }
            out.push(InlineLeaf::LineBreak);
        }
        _ => {
            let ctx = context.for_element(element);
            for child in &element.children {
                descend_into(child, &ctx, out);
            }
        }
    }
}

fn ends_line(leaves: &[InlineLeaf]) -> bool {
    matches!(leaves.last(), None | Some(InlineLeaf::LineBreak))
}

/// Collapse runs of ASCII whitespace to one space (HTML rendering rules).
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// Finish a line of leaves.
///
/// Drops whitespace at the edges of the line and around line breaks,
/// collapses spaces that meet at leaf boundaries, removes leading and
/// trailing line breaks, and merges neighbours with equal formatting.
pub fn tidy(leaves: Vec<InlineLeaf>) -> Vec<InlineLeaf> {
    let mut out: Vec<InlineLeaf> = Vec::with_capacity(leaves.len());

    for leaf in leaves {
        match leaf {
            InlineLeaf::LineBreak => {
                trim_end_of_line(&mut out);
                out.push(InlineLeaf::LineBreak);
            }
            InlineLeaf::Text { mut text, format } => {
                let at_line_start = ends_line(&out);
                let after_space = out
                    .last()
                    .and_then(InlineLeaf::as_text)
                    .is_some_and(|t| t.ends_with(' '));
                if at_line_start || after_space {
                    text = text.trim_start_matches(' ').to_string();
                }
                if text.is_empty() {
                    continue;
                }
                if let Some(InlineLeaf::Text {
                    text: previous,
                    format: previous_format,
                }) = out.last_mut()
                    && *previous_format == format
                {
                    previous.push_str(&text);
                    continue;
                }
                out.push(InlineLeaf::Text { text, format });
            }
        }
    }

    trim_end_of_line(&mut out);
    while matches!(out.last(), Some(InlineLeaf::LineBreak)) {
        out.pop();
        trim_end_of_line(&mut out);
    }
    let leading = out
        .iter()
        .take_while(|l| matches!(l, InlineLeaf::LineBreak))
        .count();
    out.drain(..leading);
    out
}

fn trim_end_of_line(out: &mut Vec<InlineLeaf>) {
    while let Some(InlineLeaf::Text { text, .. }) = out.last_mut() {
        let trimmed = text.trim_end_matches(' ').len();
        text.truncate(trimmed);
        if !text.is_empty() {
            break;
        }
        out.pop();
    }
}

/// Visible text of a line, for blank checks and tests.
pub fn plain_text(leaves: &[InlineLeaf]) -> String {
    leaves
        .iter()
        .map(|leaf| leaf.as_text().unwrap_or("\n"))
        .collect()
}
