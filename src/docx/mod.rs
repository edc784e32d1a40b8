//! WordprocessingML (DOCX) part rewriting.
//!
//! Each `w:p` is coalesced into searchable text; every lookup key found in it
//! is replaced by native runs, or, when the fragment carries block markup and
//! fills the whole paragraph, the paragraph itself is replaced by the
//! generated paragraphs and tables.

mod builder;
mod relationships;

pub use builder::DocxBuilder;
pub use relationships::{HYPERLINK_TYPE, RelationshipRegistry, rels_path_for};

use log::debug;

use crate::blocks::Fragment;
use crate::coalesce::{CoalescedText, RawPoint, find_next_match};
use crate::error::{Error, Result};
use crate::lookup::RichTextLookup;
use crate::package::PartRewrite;
use crate::xml::{self, NodeId, XmlDom, ns};

/// Upper bound on conversions in one paragraph.
const MAX_MATCHES_PER_PARAGRAPH: usize = 1024;

/// Rewrite a DOCX part (`word/document.xml`, a header or a footer).
///
/// Hyperlink relationships are registered in `rels`, which must belong to
/// the same part.
pub fn convert_part(
    xml: &str,
    lookup: &RichTextLookup,
    rels: &mut RelationshipRegistry,
) -> Result<PartRewrite> {
    let mut dom = xml::parse(xml).map_err(|e| Error::xml(rels.part(), e))?;
    let fragments = convert_dom(&mut dom, lookup, rels);
    if fragments == 0 {
        return Ok(PartRewrite::unchanged(xml));
    }
    Ok(PartRewrite {
        changed: true,
        xml: xml::serialize(&dom),
        fragments,
    })
}

/// Rewrite a parsed part in place, returning the number of fragments converted.
pub fn convert_dom(dom: &mut XmlDom, lookup: &RichTextLookup, rels: &mut RelationshipRegistry) -> usize {
    if lookup.is_empty() {
        return 0;
    }
    rels.reserve_ids_in(dom);

    let mut converted = 0;
    for paragraph in dom.find_all(dom.document(), "w:p") {
        if dom.is_attached(paragraph) {
            converted += convert_paragraph(dom, paragraph, lookup, rels);
        }
    }

    if converted > 0 && rels.is_dirty() {
        xml::ensure_namespace(dom, "r", ns::R);
    }
    converted
}

fn convert_paragraph(
    dom: &mut XmlDom,
    paragraph: NodeId,
    lookup: &RichTextLookup,
    rels: &mut RelationshipRegistry,
) -> usize {
    let mut converted = 0;
    // Last generated node; text before it has already been consumed.
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

        let fills_paragraph = resume_after.is_none()
            && is_blank(&text.text()[..found.position])
            && is_blank(&text.text()[found.end()..]);
        if fragment.produced_block && fills_paragraph && is_plain_paragraph(dom, paragraph) {
            debug!(
                "promoting {}-byte fragment to {} block(s)",
                found.key.len(),
                fragment.blocks.len()
            );
            promote(dom, paragraph, &fragment, rels);
            return converted + 1;
        }

        debug!("converting {}-byte fragment inline", found.key.len());
        resume_after = Some(replace_inline(dom, &text, start, end, &fragment, rels));
        converted += 1;
    }
    converted
}

fn is_blank(text: &str) -> bool {
    text.bytes().all(|b| b == b' ')
}

/// Text-bearing nodes of a paragraph after `resume_after`.
///
/// Nested paragraphs (text boxes) and drawings are left to their own pass.
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
        let Some(name) = dom.element_name(child) else {
            continue;
        };
        let raw = match name {
            "w:t" => dom.text_content(child),
            "w:tab" | "w:ptab" => "\t".to_string(),
            "w:br" | "w:cr" => "\n".to_string(),
            "w:p" | "w:pPr" | "w:rPr" | "w:txbxContent" | "w:drawing" | "w:pict"
            | "w:object" | "mc:AlternateContent" => continue,
            _ => {
                collect_text(dom, child, resume_after, collecting, out);
                continue;
            }
        };
        if *collecting {
            out.push(child, &raw);
        }
    }
}

/// Whether the paragraph holds nothing but plain text runs, so replacing it
/// wholesale loses no content.
fn is_plain_paragraph(dom: &XmlDom, paragraph: NodeId) -> bool {
    dom.children(paragraph).all(|child| match dom.element_name(child) {
        Some("w:pPr" | "w:proofErr" | "w:bookmarkStart" | "w:bookmarkEnd" | "w:permStart" | "w:permEnd") => true,
        Some("w:r") => dom.children(child).all(|c| {
            matches!(
                dom.element_name(c),
                Some("w:rPr" | "w:t" | "w:tab" | "w:br" | "w:cr" | "w:lastRenderedPageBreak")
            )
        }),
        Some(_) => false,
        None => dom.text(child).is_some_and(|t| t.trim().is_empty()),
    })
}

/// The `w:r` owning a text-bearing node.
fn run_of(dom: &XmlDom, node: NodeId) -> NodeId {
    let mut current = Some(node);
    while let Some(id) = current {
        if dom.is_named(id, "w:r") {
            return id;
        }
        if dom.is_named(id, "w:p") {
            break;
        }
        current = dom.parent(id);
    }
    node
}

/// Replace the runs covering a match with prefix, fragment and suffix runs.
///
/// The boundary runs are split rather than rebuilt: every child outside the
/// matched range (footnote references, drawings, field characters) stays on
/// its side of the match, and non-text children inside the range move to the
/// suffix. Returns the last node generated for the fragment itself.
fn replace_inline(
    dom: &mut XmlDom,
    text: &CoalescedText<NodeId>,
    start: RawPoint,
    end: RawPoint,
    fragment: &Fragment,
    rels: &mut RelationshipRegistry,
) -> NodeId {
    let spans = text.spans();
    let start_node = spans[start.span].node;
    let end_node = spans[end.span].node;
    let first_run = run_of(dom, start_node);
    let last_run = run_of(dom, end_node);

    let mut runs: Vec<NodeId> = Vec::new();
    for span in &spans[start.span..=end.span] {
        let run = run_of(dom, span.node);
        if !runs.contains(&run) {
            runs.push(run);
        }
    }

    let before = spans[start.span].raw.get(..start.offset).unwrap_or_default();
    let after = spans[end.span].raw.get(end.offset..).unwrap_or_default();
    let carried = carried_children(dom, &runs, (first_run, start_node), (last_run, end_node));
    let prefix = split_run(dom, first_run, start_node, before, &[], Side::Before);
    let suffix = split_run(dom, last_run, end_node, after, &carried, Side::After);

    let template = dom
        .first_child_element(first_run, "w:rPr")
        .map(|rpr| dom.deep_clone(rpr));

    let mut nodes: Vec<NodeId> = prefix.into_iter().collect();
    let mut builder = DocxBuilder::new(dom, rels).with_run_template(template);
    let mut generated = builder.inline(fragment);
    if generated.is_empty() {
        generated.push(builder.blank_run());
    }
    let marker = generated[generated.len() - 1];
    nodes.extend(generated);
    nodes.extend(suffix);

    dom.insert_all_before(first_run, &nodes);
    for run in runs {
        let parent = dom.parent(run);
        dom.detach(run);
        if let Some(parent) = parent {
            prune_empty_wrappers(dom, parent);
        }
    }
    marker
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Before,
    After,
}

/// Run children the match consumes as text.
fn is_consumed(dom: &XmlDom, node: NodeId) -> bool {
    match dom.element_name(node) {
        Some(name) => matches!(
            name,
            "w:rPr"
                | "w:t"
                | "w:tab"
                | "w:ptab"
                | "w:br"
                | "w:cr"
                | "w:lastRenderedPageBreak"
        ),
        None => true,
    }
}

/// The child of `run` that is or contains `node`.
fn run_child(dom: &XmlDom, run: NodeId, node: NodeId) -> NodeId {
    let mut current = node;
    while let Some(parent) = dom.parent(current) {
        if parent == run {
            return current;
        }
        current = parent;
    }
    node
}

/// Non-text children of the matched runs that sit inside the match.
fn carried_children(
    dom: &XmlDom,
    runs: &[NodeId],
    (first_run, start_node): (NodeId, NodeId),
    (last_run, end_node): (NodeId, NodeId),
) -> Vec<NodeId> {
    let start_child = run_child(dom, first_run, start_node);
    let end_child = run_child(dom, last_run, end_node);
    let mut carried = Vec::new();
    for &run in runs {
        if !dom.is_named(run, "w:r") {
            continue;
        }
        let mut inside = run != first_run;
        for child in dom.children(run) {
            if run == last_run && child == end_child {
                break;
            }
            if run == first_run && child == start_child {
                inside = true;
                continue;
            }
            if inside && !is_consumed(dom, child) {
                carried.push(child);
            }
        }
    }
    carried
}

/// The part of `run` on one side of `boundary`, as a new run.
///
/// `piece` is the boundary node's own text on that side. `None` when the
/// side holds nothing but run properties.
fn split_run(
    dom: &mut XmlDom,
    run: NodeId,
    boundary: NodeId,
    piece: &str,
    carried: &[NodeId],
    side: Side,
) -> Option<NodeId> {
    let piece_node = if piece.is_empty() {
        None
    } else if dom.is_named(boundary, "w:t") || run == boundary {
        let t = dom.create_element_with("w:t", &[("xml:space", "preserve")]);
        let text = dom.create_text(piece);
        dom.append(t, text);
        Some(t)
    } else {
        Some(dom.deep_clone(boundary))
    };

    let copy = if dom.is_named(run, "w:r") {
        dom.shallow_clone(run)
    } else {
        dom.create_element("w:r")
    };
    if let Some(rpr) = dom.first_child_element(run, "w:rPr") {
        let rpr = dom.deep_clone(rpr);
        dom.append(copy, rpr);
    }

    let boundary_child = run_child(dom, run, boundary);
    let siblings: Vec<NodeId> = if run == boundary {
        Vec::new()
    } else {
        dom.children(run).collect()
    };
    let position = siblings
        .iter()
        .position(|&c| c == boundary_child)
        .unwrap_or(siblings.len());
    let outside: &[NodeId] = match side {
        Side::Before => &siblings[..position],
        Side::After => siblings.get(position + 1..).unwrap_or_default(),
    };

    let mut content: Vec<NodeId> = Vec::new();
    if side == Side::After {
        content.extend(carried.iter().copied());
        content.extend(piece_node);
    }
    content.extend(
        outside
            .iter()
            .copied()
            .filter(|&c| !dom.is_named(c, "w:rPr")),
    );
    if side == Side::Before {
        content.extend(piece_node);
    }
    if content.is_empty() {
        return None;
    }
    for node in content {
        let node = if Some(node) == piece_node {
            node
        } else {
            dom.deep_clone(node)
        };
        dom.append(copy, node);
    }
    Some(copy)
}

/// Drop wrappers (`w:hyperlink`, `w:ins`, `w:smartTag`) emptied by run removal.
fn prune_empty_wrappers(dom: &mut XmlDom, mut node: NodeId) {
    while !dom.is_named(node, "w:p")
        && dom.is_element(node)
        && dom.children(node).next().is_none()
    {
        let parent = dom.parent(node);
        dom.detach(node);
        match parent {
            Some(parent) => node = parent,
            None => break,
        }
    }
}

/// Replace a whole paragraph with the fragment's blocks.
fn promote(
    dom: &mut XmlDom,
    paragraph: NodeId,
    fragment: &Fragment,
    rels: &mut RelationshipRegistry,
) {
    let ppr = dom.first_child_element(paragraph, "w:pPr");
    let section = ppr.and_then(|ppr| dom.first_child_element(ppr, "w:sectPr"));
    let paragraph_template = ppr.map(|ppr| {
        let copy = dom.deep_clone(ppr);
        builder::remove_children(dom, copy, "w:sectPr");
        copy
    });
    let run_template = dom
        .find_all(paragraph, "w:r")
        .into_iter()
        .find_map(|run| dom.first_child_element(run, "w:rPr"))
        .map(|rpr| dom.deep_clone(rpr));
    let in_cell = dom
        .parent(paragraph)
        .is_some_and(|parent| dom.is_named(parent, "w:tc"));

    let mut builder = DocxBuilder::new(dom, rels)
        .with_run_template(run_template)
        .with_paragraph_template(paragraph_template);
    let mut nodes = builder.blocks(&fragment.blocks);
    let ends_with_table = nodes
        .last()
        .is_some_and(|&last| builder.is_table(last));
    if nodes.is_empty() || (in_cell && ends_with_table) {
        nodes.push(builder.empty_paragraph());
    }

    if let Some(section) = section {
        // The section break lives on the paragraph it ends; keep it on a carrier.
        let carrier = dom.create_element("w:p");
        let carrier_ppr = dom.create_element("w:pPr");
        let section_copy = dom.deep_clone(section);
        dom.append(carrier_ppr, section_copy);
        dom.append(carrier, carrier_ppr);
        nodes.push(carrier);
    }

    dom.insert_all_before(paragraph, &nodes);
    dom.detach(paragraph);
}
