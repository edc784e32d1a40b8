//! OpenDocument text (ODT) part rewriting.
//!
//! Paragraphs (`text:p`, `text:h`) are coalesced through spans, links,
//! `text:s` spaces and line breaks. Inline fragments replace the matched text
//! nodes in place. Block fragments split the paragraph around the match and
//! are inserted between the two halves, since ODF allows neither tables nor
//! paragraphs inside `text:p`.

mod builder;
mod styles;

pub use builder::{OdtBuilder, trim_trailing_breaks};
pub use styles::{StyleKey, StyleRegistry};

use std::collections::VecDeque;

use log::debug;

use crate::blocks::Fragment;
use crate::coalesce::{CoalescedText, RawPoint, find_next_match};
use crate::error::{Error, Result};
use crate::lookup::RichTextLookup;
use crate::package::PartRewrite;
use crate::xml::{self, NodeId, XmlDom, ns};

const MAX_MATCHES_PER_PARAGRAPH: usize = 1024;

/// Rewrite the ODF part named `part` (`content.xml` or `styles.xml`).
///
/// The styles the part needs are declared in its own automatic styles; the
/// registry keeps accumulating so later parts can declare them too.
pub fn convert_part(
    part: &str,
    xml: &str,
    lookup: &RichTextLookup,
    styles: &mut StyleRegistry,
) -> Result<PartRewrite> {
    let mut dom = xml::parse(xml).map_err(|e| Error::xml(part, e))?;
    let fragments = convert_dom(&mut dom, lookup, styles);
    if fragments == 0 {
        return Ok(PartRewrite::unchanged(xml));
    }
    styles.inject(&mut dom);
    Ok(PartRewrite {
        changed: true,
        xml: xml::serialize(&dom),
        fragments,
    })
}

/// Rewrite a parsed part in place, returning the number of fragments converted.
///
/// Style declarations are not injected here; see [`StyleRegistry::inject`].
pub fn convert_dom(dom: &mut XmlDom, lookup: &RichTextLookup, styles: &mut StyleRegistry) -> usize {
    if lookup.is_empty() {
        return 0;
    }
    let mut queue: VecDeque<NodeId> = dom
        .descendants(dom.document())
        .into_iter()
        .filter(|&id| is_paragraph(dom, id))
        .collect();

    let mut converted = 0;
    while let Some(paragraph) = queue.pop_front() {
        if dom.is_attached(paragraph) {
            converted += convert_paragraph(dom, paragraph, lookup, styles, &mut queue);
        }
    }

    if converted > 0 {
        xml::ensure_namespace(dom, "text", ns::TEXT);
        if xml::uses_prefix(dom, "table") {
            xml::ensure_namespace(dom, "table", ns::TABLE);
        }
        if xml::uses_prefix(dom, "xlink") {
            xml::ensure_namespace(dom, "xlink", ns::XLINK);
        }
        if xml::uses_prefix(dom, "office") {
            xml::ensure_namespace(dom, "office", ns::OFFICE);
        }
    }
    converted
}

fn is_paragraph(dom: &XmlDom, id: NodeId) -> bool {
    matches!(dom.element_name(id), Some("text:p" | "text:h"))
}

fn convert_paragraph(
    dom: &mut XmlDom,
    paragraph: NodeId,
    lookup: &RichTextLookup,
    styles: &mut StyleRegistry,
    queue: &mut VecDeque<NodeId>,
) -> usize {
    let mut converted = 0;
    let mut resume_after: Option<NodeId> = None;

    while converted < MAX_MATCHES_PER_PARAGRAPH {
        let text = coalesce_paragraph(dom, paragraph, resume_after);
        let Some(found) = find_next_match(text.text(), lookup, 0) else {
            break;
        };
        let Some((start, end)) = text.locate(found.position, found.end()) else {
            break;
        };
        let fragment = Fragment::from_html(found.fragment);
        let matched = isolate(dom, &text, start, end);

        if fragment.produced_block && accepts_blocks(dom, paragraph) {
            debug!(
                "splitting paragraph around {}-byte fragment ({} block(s))",
                found.key.len(),
                fragment.blocks.len()
            );
            if let Some(tail) = insert_blocks(dom, paragraph, &matched, &fragment, styles) {
                queue.push_front(tail);
            }
            return converted + 1;
        }

        debug!("converting {}-byte fragment inline", found.key.len());
        resume_after = Some(replace_inline(dom, paragraph, &matched, &fragment, styles));
        converted += 1;
    }
    converted
}

/// Text-bearing nodes of a paragraph after `resume_after`.
fn coalesce_paragraph(
    dom: &XmlDom,
    paragraph: NodeId,
    resume_after: Option<NodeId>,
) -> CoalescedText<NodeId> {
    let mut text = CoalescedText::new();
    let mut collecting = resume_after.is_none();
    collect_text(dom, paragraph, resume_after, &mut collecting, &mut text);
    text
}

fn collect_text(
    dom: &XmlDom,
    node: NodeId,
    resume_after: Option<NodeId>,
    collecting: &mut bool,
    out: &mut CoalescedText<NodeId>,
) {
    for child in dom.children(node) {
        if Some(child) == resume_after {
            *collecting = true;
            continue;
        }
        let raw = match dom.element_name(child) {
            None => match dom.text(child) {
                Some(text) => text.to_string(),
                None => continue,
            },
            Some("text:s") => {
                let count = dom
                    .attr(child, "text:c")
                    .and_then(|c| c.parse::<usize>().ok())
                    .unwrap_or(1);
                " ".repeat(count.max(1))
            }
            Some("text:tab") => "\t".to_string(),
            Some("text:line-break") => "\n".to_string(),
            Some(
                "text:p" | "text:h" | "text:note" | "draw:frame" | "office:annotation"
                | "text:tracked-changes",
            ) => continue,
            Some(_) => {
                collect_text(dom, child, resume_after, collecting, out);
                continue;
            }
        };
        if *collecting {
            out.push(child, &raw);
        }
    }
}

/// Split the text nodes at the match edges and return the nodes that make up
/// the match, in document order.
fn isolate(
    dom: &mut XmlDom,
    text: &CoalescedText<NodeId>,
    start: RawPoint,
    end: RawPoint,
) -> Vec<NodeId> {
    let spans = text.spans();
    let mut matched: Vec<NodeId> = spans[start.span..=end.span].iter().map(|s| s.node).collect();

    let last = &spans[end.span];
    if dom.is_text(last.node) && end.offset < last.raw.len() {
        dom.set_text(last.node, &last.raw[..end.offset]);
        let rest = dom.create_text(&last.raw[end.offset..]);
        dom.insert_after(last.node, rest);
    }

    let first = &spans[start.span];
    if dom.is_text(first.node) && start.offset > 0 {
        let upto = if start.span == end.span {
            end.offset
        } else {
            first.raw.len()
        };
        dom.set_text(first.node, &first.raw[..start.offset]);
        let inner = dom.create_text(&first.raw[start.offset..upto]);
        dom.insert_after(first.node, inner);
        matched[0] = inner;
    }
    matched
}

/// Swap the matched nodes for inline markup; returns the last generated node.
fn replace_inline(
    dom: &mut XmlDom,
    paragraph: NodeId,
    matched: &[NodeId],
    fragment: &Fragment,
    styles: &mut StyleRegistry,
) -> NodeId {
    let mut generated = OdtBuilder::new(dom, styles).inline(fragment);
    if generated.is_empty() {
        generated.push(dom.create_text(""));
    }
    let marker = generated[generated.len() - 1];

    dom.insert_all_before(matched[0], &generated);
    for &node in matched {
        remove(dom, node, paragraph);
    }
    marker
}

/// Containers where a paragraph may be followed by sibling tables and paragraphs.
fn accepts_blocks(dom: &XmlDom, paragraph: NodeId) -> bool {
    let Some(parent) = dom.parent(paragraph) else {
        return false;
    };
    match dom.element_name(parent) {
        Some(
            "office:text" | "table:table-cell" | "text:section" | "text:note-body"
            | "draw:text-box",
        ) => true,
        Some(name) => name.starts_with("style:header") || name.starts_with("style:footer"),
        None => false,
    }
}

/// Split `paragraph` around the match and put the fragment's blocks in
/// between. Returns the trailing half when it still has content.
fn insert_blocks(
    dom: &mut XmlDom,
    paragraph: NodeId,
    matched: &[NodeId],
    fragment: &Fragment,
    styles: &mut StyleRegistry,
) -> Option<NodeId> {
    let last = *matched.last()?;
    let tail = split_after(dom, paragraph, last);
    for &node in matched {
        remove(dom, node, paragraph);
    }
    trim_edge(dom, paragraph, Edge::End);
    trim_edge(dom, tail, Edge::Start);

    let paragraph_style = dom
        .is_named(paragraph, "text:p")
        .then(|| dom.attr(paragraph, "text:style-name").map(str::to_string))
        .flatten();
    let blocks = OdtBuilder::new(dom, styles)
        .with_paragraph_style(paragraph_style)
        .blocks(&fragment.blocks);
    dom.insert_all_after(paragraph, &blocks);

    if is_blank_paragraph(dom, paragraph) {
        dom.detach(paragraph);
    }
    if is_blank_paragraph(dom, tail) {
        dom.detach(tail);
        return None;
    }
    Some(tail)
}

/// Move everything after `node` into a copy of `paragraph` placed right after
/// it, cloning the inline wrappers `node` sits in.
fn split_after(dom: &mut XmlDom, paragraph: NodeId, node: NodeId) -> NodeId {
    let tail = dom.shallow_clone(paragraph);
    dom.remove_attr(tail, "xml:id");
    dom.remove_attr(tail, "text:id");

    let mut carry: Option<NodeId> = None;
    let mut current = node;
    while let Some(parent) = dom.parent(current) {
        let holder = if parent == paragraph {
            tail
        } else {
            dom.shallow_clone(parent)
        };
        if let Some(inner) = carry.filter(|&c| dom.children(c).next().is_some()) {
            dom.append(holder, inner);
        }
        let mut sibling = dom.next_sibling(current);
        while let Some(s) = sibling {
            sibling = dom.next_sibling(s);
            dom.detach(s);
            dom.append(holder, s);
        }
        if parent == paragraph {
            break;
        }
        carry = Some(holder);
        current = parent;
    }
    dom.insert_after(paragraph, tail);
    tail
}

#[derive(Clone, Copy)]
enum Edge {
    Start,
    End,
}

/// Strip line breaks, spaces and whitespace-only text from one end.
fn trim_edge(dom: &mut XmlDom, paragraph: NodeId, edge: Edge) {
    while let Some(leaf) = edge_leaf(dom, paragraph, edge) {
        if let Some(text) = dom.text(leaf) {
            let trimmed = match edge {
                Edge::Start => text.trim_start_matches(|c: char| c.is_ascii_whitespace()),
                Edge::End => text.trim_end_matches(|c: char| c.is_ascii_whitespace()),
            };
            if trimmed.is_empty() {
                remove(dom, leaf, paragraph);
                continue;
            }
            if trimmed.len() != text.len() {
                let trimmed = trimmed.to_string();
                dom.set_text(leaf, &trimmed);
            }
            return;
        }
        match dom.element_name(leaf) {
            Some("text:line-break" | "text:s" | "text:span" | "text:a") => {
                remove(dom, leaf, paragraph)
            }
            _ => return,
        }
    }
}

/// Outermost leaf at one end, looking through non-empty spans and links.
fn edge_leaf(dom: &XmlDom, paragraph: NodeId, edge: Edge) -> Option<NodeId> {
    let mut node = paragraph;
    loop {
        let child = match edge {
            Edge::Start => dom.children(node).next(),
            Edge::End => dom.last_child(node),
        }?;
        let is_wrapper = dom.is_named(child, "text:span") || dom.is_named(child, "text:a");
        if is_wrapper && dom.children(child).next().is_some() {
            node = child;
            continue;
        }
        return Some(child);
    }
}

/// Detach `node` and any wrappers it leaves empty, stopping at `paragraph`.
fn remove(dom: &mut XmlDom, node: NodeId, paragraph: NodeId) {
    let mut parent = dom.parent(node);
    dom.detach(node);
    while let Some(id) = parent {
        if id == paragraph || dom.children(id).next().is_some() {
            break;
        }
        parent = dom.parent(id);
        dom.detach(id);
    }
}

fn is_blank_paragraph(dom: &XmlDom, paragraph: NodeId) -> bool {
    dom.descendants(paragraph)
        .into_iter()
        .all(|id| match dom.element_name(id) {
            Some(name) => matches!(
                name,
                "text:span" | "text:a" | "text:s" | "text:line-break" | "text:soft-page-break"
            ),
            None => dom
                .text(id)
                .is_none_or(|t| t.bytes().all(|b| b.is_ascii_whitespace())),
        })
}
