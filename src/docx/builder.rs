//! WordprocessingML construction for converted fragments.

use crate::blocks::{Block, Fragment, Paragraph, Table};
use crate::html::TextAlign;
use crate::inline::{FormattingContext, InlineLeaf};
use crate::xml::{NodeId, XmlDom};

use super::relationships::RelationshipRegistry;

/// Text width available to generated tables, in twentieths of a point.
const TABLE_WIDTH_TWIPS: usize = 9000;

const LINK_COLOR: &str = "0563C1";

/// Schema order of `w:rPr` children.
const RPR_ORDER: &[&str] = &[
    "w:rStyle",
    "w:rFonts",
    "w:b",
    "w:bCs",
    "w:i",
    "w:iCs",
    "w:caps",
    "w:smallCaps",
    "w:strike",
    "w:dstrike",
    "w:outline",
    "w:shadow",
    "w:emboss",
    "w:imprint",
    "w:noProof",
    "w:snapToGrid",
    "w:vanish",
    "w:webHidden",
    "w:color",
    "w:spacing",
    "w:w",
    "w:kern",
    "w:position",
    "w:sz",
    "w:szCs",
    "w:highlight",
    "w:u",
    "w:effect",
    "w:bdr",
    "w:shd",
    "w:fitText",
    "w:vertAlign",
    "w:rtl",
    "w:cs",
    "w:em",
    "w:lang",
    "w:eastAsianLayout",
    "w:specVanish",
    "w:oMath",
    "w:rPrChange",
];

/// Schema order of `w:pPr` children.
const PPR_ORDER: &[&str] = &[
    "w:pStyle",
    "w:keepNext",
    "w:keepLines",
    "w:pageBreakBefore",
    "w:framePr",
    "w:widowControl",
    "w:numPr",
    "w:suppressLineNumbers",
    "w:pBdr",
    "w:shd",
    "w:tabs",
    "w:suppressAutoHyphens",
    "w:kinsoku",
    "w:wordWrap",
    "w:overflowPunct",
    "w:topLinePunct",
    "w:autoSpaceDE",
    "w:autoSpaceDN",
    "w:bidi",
    "w:adjustRightInd",
    "w:snapToGrid",
    "w:spacing",
    "w:ind",
    "w:contextualSpacing",
    "w:mirrorIndents",
    "w:suppressOverlap",
    "w:jc",
    "w:textDirection",
    "w:textAlignment",
    "w:textboxTightWrap",
    "w:outlineLvl",
    "w:divId",
    "w:cnfStyle",
    "w:rPr",
    "w:sectPr",
    "w:pPrChange",
];

/// Builds DOCX nodes inside a part's DOM.
///
/// `run_template` and `paragraph_template` are detached `w:rPr` / `w:pPr`
/// nodes copied from the paragraph being replaced; every generated run or
/// paragraph starts from a clone of them so converted text keeps the look of
/// the surrounding document.
pub struct DocxBuilder<'a> {
    dom: &'a mut XmlDom,
    rels: &'a mut RelationshipRegistry,
    run_template: Option<NodeId>,
    paragraph_template: Option<NodeId>,
}

impl<'a> DocxBuilder<'a> {
    pub fn new(dom: &'a mut XmlDom, rels: &'a mut RelationshipRegistry) -> Self {
        Self {
            dom,
            rels,
            run_template: None,
            paragraph_template: None,
        }
    }

    pub fn with_run_template(mut self, rpr: Option<NodeId>) -> Self {
        self.run_template = rpr;
        self
    }

    pub fn with_paragraph_template(mut self, ppr: Option<NodeId>) -> Self {
        self.paragraph_template = ppr;
        self
    }

    /// The fragment flattened to runs, for insertion inside a paragraph.
    pub fn inline(&mut self, fragment: &Fragment) -> Vec<NodeId> {
        self.runs(&fragment.inline_leaves())
    }

    /// The fragment as block-level nodes (paragraphs and tables).
    pub fn blocks(&mut self, blocks: &[Block]) -> Vec<NodeId> {
        self.blocks_in(blocks, false)
    }

    fn blocks_in(&mut self, blocks: &[Block], in_table: bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        for block in blocks {
            match block {
                Block::Paragraph(p) => out.push(self.paragraph(p, in_table)),
                Block::Table(t) => {
                    if let Some(table) = self.table(t) {
                        out.push(table);
                    }
                }
            }
        }
        out
    }

    /// Runs for a line of leaves; links are grouped into `w:hyperlink`.
    pub fn runs(&mut self, leaves: &[InlineLeaf]) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < leaves.len() {
            match &leaves[i] {
                InlineLeaf::Text {
                    format:
                        FormattingContext {
                            link: Some(href), ..
                        },
                    ..
                } => {
                    let mut end = i;
                    while end < leaves.len()
                        && matches!(&leaves[end], InlineLeaf::Text { format, .. } if format.link.as_deref() == Some(href.as_str()))
                    {
                        end += 1;
                    }
                    let link = self.hyperlink(href);
                    for leaf in &leaves[i..end] {
                        if let InlineLeaf::Text { text, format } = leaf {
                            let run = self.text_run(text, format);
                            self.dom.append(link, run);
                        }
                    }
                    out.push(link);
                    i = end;
                }
                InlineLeaf::Text { text, format } => {
                    out.push(self.text_run(text, format));
                    i += 1;
                }
                InlineLeaf::LineBreak => {
                    let run = self.new_run(&FormattingContext::default());
                    let br = self.dom.create_element("w:br");
                    self.dom.append(run, br);
                    out.push(run);
                    i += 1;
                }
            }
        }
        out
    }

    fn hyperlink(&mut self, href: &str) -> NodeId {
        if let Some(anchor) = href.strip_prefix('#') {
            return self
                .dom
                .create_element_with("w:hyperlink", &[("w:anchor", anchor), ("w:history", "1")]);
        }
        let id = self.rels.hyperlink_id(href);
        self.dom
            .create_element_with("w:hyperlink", &[("r:id", id.as_str()), ("w:history", "1")])
    }

    /// A run with the template formatting and `text`; tabs and newlines
    /// become `w:tab` and `w:br`.
    pub fn text_run(&mut self, text: &str, format: &FormattingContext) -> NodeId {
        let run = self.new_run(format);
        let mut buffer = String::new();
        for ch in text.chars() {
            let special = match ch {
                '\t' => "w:tab",
                '\n' => "w:br",
                _ => {
                    buffer.push(ch);
                    continue;
                }
            };
            self.flush_text(run, &mut buffer);
            let el = self.dom.create_element(special);
            self.dom.append(run, el);
        }
        self.flush_text(run, &mut buffer);
        if self.dom.children(run).all(|c| self.dom.is_named(c, "w:rPr")) {
            let t = self
                .dom
                .create_element_with("w:t", &[("xml:space", "preserve")]);
            self.dom.append(run, t);
        }
        run
    }

    /// A run holding one empty, whitespace-preserving text node.
    pub fn blank_run(&mut self) -> NodeId {
        self.text_run("", &FormattingContext::default())
    }

    fn flush_text(&mut self, run: NodeId, buffer: &mut String) {
        if buffer.is_empty() {
            return;
        }
        let t = self
            .dom
            .create_element_with("w:t", &[("xml:space", "preserve")]);
        let text = self.dom.create_text(std::mem::take(buffer));
        self.dom.append(t, text);
        self.dom.append(run, t);
    }

    fn new_run(&mut self, format: &FormattingContext) -> NodeId {
        let run = self.dom.create_element("w:r");
        if let Some(rpr) = self.run_properties(format) {
            self.dom.append(run, rpr);
        }
        run
    }

    fn run_properties(&mut self, format: &FormattingContext) -> Option<NodeId> {
        let template = self.run_template.map(|t| self.dom.deep_clone(t));
        if format.is_plain() && format.link.is_none() {
            return template;
        }
        let rpr = template.unwrap_or_else(|| self.dom.create_element("w:rPr"));
        if format.bold {
            set_property(self.dom, rpr, "w:b", &[], RPR_ORDER);
        }
        if format.italic {
            set_property(self.dom, rpr, "w:i", &[], RPR_ORDER);
        }
        if format.link.is_some() {
            set_property(self.dom, rpr, "w:color", &[("w:val", LINK_COLOR)], RPR_ORDER);
        }
        if format.underline || format.link.is_some() {
            set_property(self.dom, rpr, "w:u", &[("w:val", "single")], RPR_ORDER);
        }
        Some(rpr)
    }

    /// A generated paragraph; never empty.
    pub fn paragraph(&mut self, paragraph: &Paragraph, in_table: bool) -> NodeId {
        let p = self.dom.create_element("w:p");

        let mut ppr = if in_table {
            None
        } else {
            self.paragraph_template.map(|t| self.dom.deep_clone(t))
        };
        match paragraph.align {
            Some(TextAlign::Left) | None => {
                if let Some(ppr) = ppr {
                    remove_children(self.dom, ppr, "w:jc");
                }
            }
            Some(align) => {
                let value = match align {
                    TextAlign::Center => "center",
                    TextAlign::Right => "right",
                    _ => "both",
                };
                let target = *ppr.get_or_insert_with(|| self.dom.create_element("w:pPr"));
                set_property(self.dom, target, "w:jc", &[("w:val", value)], PPR_ORDER);
            }
        }
        if let Some(ppr) = ppr
            && self.dom.children(ppr).next().is_some()
        {
            self.dom.append(p, ppr);
        }

        let mut runs = self.runs(&paragraph.leaves);
        if runs.is_empty() {
            runs.push(self.blank_run());
        }
        for run in runs {
            self.dom.append(p, run);
        }
        p
    }

    pub fn is_table(&self, node: NodeId) -> bool {
        self.dom.is_named(node, "w:tbl")
    }

    /// An empty paragraph with one blank run.
    pub fn empty_paragraph(&mut self) -> NodeId {
        self.paragraph(&Paragraph::default(), true)
    }

    /// `w:tbl` with explicit single borders on every edge; `None` for a
    /// table without cells.
    pub fn table(&mut self, table: &Table) -> Option<NodeId> {
        let columns = table.column_count();
        if columns == 0 {
            return None;
        }
        let width = (TABLE_WIDTH_TWIPS / columns).to_string();

        let tbl = self.dom.create_element("w:tbl");
        let tbl_pr = self.dom.create_element("w:tblPr");
        let tbl_w = self
            .dom
            .create_element_with("w:tblW", &[("w:w", "0"), ("w:type", "auto")]);
        self.dom.append(tbl_pr, tbl_w);
        let borders = self.dom.create_element("w:tblBorders");
        for edge in ["top", "left", "bottom", "right", "insideH", "insideV"] {
            let border = self.dom.create_element_with(
                &format!("w:{edge}"),
                &[
                    ("w:val", "single"),
                    ("w:sz", "8"),
                    ("w:space", "0"),
                    ("w:color", "000000"),
                ],
            );
            self.dom.append(borders, border);
        }
        self.dom.append(tbl_pr, borders);
        self.dom.append(tbl, tbl_pr);

        let grid = self.dom.create_element("w:tblGrid");
        for _ in 0..columns {
            let col = self
                .dom
                .create_element_with("w:gridCol", &[("w:w", width.as_str())]);
            self.dom.append(grid, col);
        }
        self.dom.append(tbl, grid);

        for row in &table.rows {
            let tr = self.dom.create_element("w:tr");
            for index in 0..columns {
                let tc = self.dom.create_element("w:tc");
                let tc_pr = self.dom.create_element("w:tcPr");
                let tc_w = self
                    .dom
                    .create_element_with("w:tcW", &[("w:w", width.as_str()), ("w:type", "dxa")]);
                self.dom.append(tc_pr, tc_w);
                self.dom.append(tc, tc_pr);

                let mut content = row
                    .get(index)
                    .map(|cell| self.blocks_in(&cell.blocks, true))
                    .unwrap_or_default();
                // A cell needs a block child and must end with a paragraph.
                if content
                    .last()
                    .is_none_or(|&last| self.dom.is_named(last, "w:tbl"))
                {
                    content.push(self.empty_paragraph());
                }
                for node in content {
                    self.dom.append(tc, node);
                }
                self.dom.append(tr, tc);
            }
            self.dom.append(tbl, tr);
        }
        Some(tbl)
    }
}

/// Replace any `name` child of `parent` with a fresh element, placed at its
/// schema position.
pub(crate) fn set_property(
    dom: &mut XmlDom,
    parent: NodeId,
    name: &str,
    attrs: &[(&str, &str)],
    order: &[&str],
) {
    remove_children(dom, parent, name);
    let element = dom.create_element_with(name, attrs);
    let rank = |n: &str| order.iter().position(|o| *o == n).unwrap_or(order.len());
    let own_rank = rank(name);
    let successor = dom
        .children(parent)
        .find(|&c| dom.element_name(c).is_some_and(|n| rank(n) > own_rank));
    match successor {
        Some(next) => dom.insert_before(next, element),
        None => dom.append(parent, element),
    }
}

pub(crate) fn remove_children(dom: &mut XmlDom, parent: NodeId, name: &str) {
    let existing: Vec<_> = dom.child_elements(parent, name).collect();
    for child in existing {
        dom.detach(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{self, serialize_node};

    fn fixture() -> (XmlDom, RelationshipRegistry) {
        (XmlDom::new(), RelationshipRegistry::new("word/document.xml"))
    }

    #[test]
    fn test_formatting_merges_into_template_in_order() {
        let (mut dom, mut rels) = fixture();
        let template = xml::parse(r#"<w:rPr><w:rFonts w:ascii="Arial"/><w:sz w:val="20"/></w:rPr>"#)
            .unwrap();
        let rpr = template.root_element().unwrap();
        let rpr = copy_into(&mut dom, &template, rpr);

        let mut builder = DocxBuilder::new(&mut dom, &mut rels).with_run_template(Some(rpr));
        let run = builder.text_run("Hi", &FormattingContext::default().bold().underline());
        assert_eq!(
            serialize_node(&dom, run),
            r#"<w:r><w:rPr><w:rFonts w:ascii="Arial"/><w:b/><w:sz w:val="20"/><w:u w:val="single"/></w:rPr><w:t xml:space="preserve">Hi</w:t></w:r>"#
        );
    }

    #[test]
    fn test_tabs_and_newlines_become_elements() {
        let (mut dom, mut rels) = fixture();
        let mut builder = DocxBuilder::new(&mut dom, &mut rels);
        let run = builder.text_run("a\tb\nc", &FormattingContext::default());
        assert_eq!(
            serialize_node(&dom, run),
            r#"<w:r><w:t xml:space="preserve">a</w:t><w:tab/><w:t xml:space="preserve">b</w:t><w:br/><w:t xml:space="preserve">c</w:t></w:r>"#
        );
    }

    #[test]
    fn test_empty_paragraph_has_blank_run() {
        let (mut dom, mut rels) = fixture();
        let mut builder = DocxBuilder::new(&mut dom, &mut rels);
        let p = builder.empty_paragraph();
        assert_eq!(
            serialize_node(&dom, p),
            r#"<w:p><w:r><w:t xml:space="preserve"/></w:r></w:p>"#
        );
    }

    #[test]
    fn test_links_share_relationship() {
        let (mut dom, mut rels) = fixture();
        let link = FormattingContext::default().with_link("https://example.com");
        let leaves = vec![
            InlineLeaf::text("one", link.clone()),
            InlineLeaf::text(" two", link.bold()),
            InlineLeaf::LineBreak,
            InlineLeaf::text("again", link),
        ];
        let nodes = DocxBuilder::new(&mut dom, &mut rels).runs(&leaves);
        assert_eq!(nodes.len(), 3);
        assert_eq!(dom.attr(nodes[0], "r:id"), Some("rId1"));
        assert_eq!(dom.children(nodes[0]).count(), 2);
        assert_eq!(dom.attr(nodes[2], "r:id"), Some("rId1"));
        assert_eq!(rels.len(), 1);
    }

    #[test]
    fn test_table_borders_grid_and_padding() {
        let (mut dom, mut rels) = fixture();
        let fragment = Fragment::from_html("<table><tr><td>a</td><td>b</td></tr><tr><td>c</td></tr></table>");
        let nodes = DocxBuilder::new(&mut dom, &mut rels).blocks(&fragment.blocks);
        let out = serialize_node(&dom, nodes[0]);
        for edge in ["top", "left", "bottom", "right", "insideH", "insideV"] {
            assert!(out.contains(&format!(
                r#"<w:{edge} w:val="single" w:sz="8" w:space="0" w:color="000000"/>"#
            )));
        }
        assert_eq!(out.matches(r#"<w:gridCol w:w="4500"/>"#).count(), 2);
        assert_eq!(out.matches("<w:tc>").count(), 4);
        assert_eq!(out.matches("<w:p>").count(), 4);
    }

    fn copy_into(dom: &mut XmlDom, source: &XmlDom, node: NodeId) -> NodeId {
        let copy = match source.element_name(node) {
            Some(name) => {
                let attrs: Vec<(&str, &str)> = source
                    .attrs(node)
                    .iter()
                    .map(|a| (a.name.as_str(), a.value.as_str()))
                    .collect();
                dom.create_element_with(name, &attrs)
            }
            None => dom.create_text(source.text(node).unwrap_or_default()),
        };
        for child in source.children(node) {
            let child_copy = copy_into(dom, source, child);
            dom.append(copy, child_copy);
        }
        copy
    }
}
