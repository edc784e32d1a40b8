//! Format-neutral block model of a converted fragment.
//!
//! A [`Fragment`] is what both backends build from: a list of paragraphs and
//! tables with their inline content already resolved. Lists are flattened to
//! prefixed paragraphs and headings to bold paragraphs framed by blank ones,
//! so neither backend needs native numbering or heading styles.

use crate::html::{self, HtmlElement, HtmlNode, TextAlign};
use crate::inline::{self, FormattingContext, InlineLeaf};

/// Bullet used for unordered list items.
pub const BULLET: char = '\u{2022}';

/// A paragraph of inline content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    pub leaves: Vec<InlineLeaf>,
    pub align: Option<TextAlign>,
    /// Intentional vertical whitespace (`<p>&nbsp;</p>`, heading separators).
    pub spacing: bool,
}

impl Paragraph {
    fn blank() -> Self {
        Self {
            spacing: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCell {
    pub blocks: Vec<Block>,
    pub header: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub rows: Vec<Vec<TableCell>>,
}

impl Table {
    /// Widest row; shorter rows are padded to this by the builders.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

/// A converted HTML fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub blocks: Vec<Block>,
    /// The fragment had block-level markup and cannot live inside a run.
    pub produced_block: bool,
}

impl Fragment {
    /// Parse and convert an HTML fragment.
    pub fn from_html(fragment: &str) -> Self {
        Self::from_tree(&html::parse(fragment))
    }

    /// Convert a parsed fragment root.
    pub fn from_tree(root: &HtmlNode) -> Self {
        let produced_block = root
            .children()
            .iter()
            .any(|c| c.tag().is_some_and(is_block_element));
        let mut converter = Converter::default();
        let blocks = converter.container(root.children(), &FormattingContext::default(), None);
        Fragment {
            blocks,
            produced_block,
        }
    }

    pub fn has_table(&self) -> bool {
        self.blocks.iter().any(|b| matches!(b, Block::Table(_)))
    }

    /// Flatten to one line of inline content, for insertion inside a run.
    ///
    /// Paragraphs are separated by line breaks, table rows become lines and
    /// cells are separated by tabs.
    pub fn inline_leaves(&self) -> Vec<InlineLeaf> {
        let mut out = Vec::new();
        flatten_blocks(&self.blocks, &mut out);
        while matches!(out.last(), Some(InlineLeaf::LineBreak)) {
            out.pop();
        }
        out
    }
}

fn flatten_blocks(blocks: &[Block], out: &mut Vec<InlineLeaf>) {
    for block in blocks {
        match block {
            Block::Paragraph(p) => {
                if p.spacing && p.is_empty() && out.is_empty() {
                    continue;
                }
                out.extend(p.leaves.iter().cloned());
                out.push(InlineLeaf::LineBreak);
            }
            Block::Table(table) => {
                for row in &table.rows {
                    for (i, cell) in row.iter().enumerate() {
                        if i > 0 {
                            out.push(InlineLeaf::text("\t", FormattingContext::default()));
                        }
                        let mut cell_leaves = Vec::new();
                        flatten_blocks(&cell.blocks, &mut cell_leaves);
                        while matches!(cell_leaves.last(), Some(InlineLeaf::LineBreak)) {
                            cell_leaves.pop();
                        }
                        out.extend(cell_leaves);
                    }
                    out.push(InlineLeaf::LineBreak);
                }
            }
        }
    }
}

fn is_block_element(tag: &str) -> bool {
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
            | "table"
            | "blockquote"
            | "pre"
            | "section"
            | "article"
            | "header"
            | "footer"
    )
}

fn is_heading(tag: &str) -> bool {
    matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

#[derive(Default)]
struct Converter;

impl Converter {
    /// Convert a sequence of flow content, gathering loose inline nodes into
    /// paragraphs between block elements.
    fn container(
        &mut self,
        nodes: &[HtmlNode],
        ctx: &FormattingContext,
        align: Option<TextAlign>,
    ) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut pending: Vec<InlineLeaf> = Vec::new();

        for node in nodes {
            match node {
                HtmlNode::Element(element) if is_block_element(&element.tag) => {
                    flush(&mut pending, align, &mut blocks);
                    self.block(element, ctx, align, &mut blocks);
                }
                other => pending.extend(inline::descend(other, ctx)),
            }
        }
        flush(&mut pending, align, &mut blocks);
        blocks
    }

    fn block(
        &mut self,
        element: &HtmlElement,
        ctx: &FormattingContext,
        inherited: Option<TextAlign>,
        out: &mut Vec<Block>,
    ) {
        let align = element.inline_style().align.or(inherited);
        let tag = element.tag.as_str();
        match tag {
            "ul" | "ol" => self.list(element, ctx, align, 0, out),
            "table" => out.push(Block::Table(self.table(element, ctx, align))),
            _ if is_heading(tag) => {
                let leaves = inline::tidy(inline::descend_all(
                    &element.children,
                    &ctx.for_element(element),
                ));
                out.push(Block::Paragraph(Paragraph::blank()));
                out.push(Block::Paragraph(Paragraph {
                    leaves,
                    align,
                    spacing: false,
                }));
                out.push(Block::Paragraph(Paragraph::blank()));
            }
            _ => {
                let inner_ctx = ctx.for_element(element);
                if element
                    .children
                    .iter()
                    .any(|c| c.tag().is_some_and(is_block_element))
                {
                    out.extend(self.container(&element.children, &inner_ctx, align));
                    return;
                }
                let leaves = inline::tidy(inline::descend_all(&element.children, &inner_ctx));
                if !leaves.is_empty() {
                    let spacing = !element.has_element_children()
                        && inline::plain_text(&leaves)
                            .chars()
                            .all(|c| c == '\u{a0}' || c.is_whitespace());
                    out.push(Block::Paragraph(Paragraph {
                        leaves,
                        align,
                        spacing,
                    }));
                } else if tag == "p" && element.children.iter().any(|c| c.tag() == Some("br")) {
                    out.push(Block::Paragraph(Paragraph {
                        align,
                        ..Paragraph::blank()
                    }));
                }
            }
        }
    }

    /// Flatten a list into prefixed paragraphs. Numbering restarts in every
    /// `<ol>`, nested ones included.
    fn list(
        &mut self,
        list: &HtmlElement,
        ctx: &FormattingContext,
        align: Option<TextAlign>,
        level: usize,
        out: &mut Vec<Block>,
    ) {
        let ordered = list.tag == "ol";
        let mut number = list
            .attr("start")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(1);
        let ctx = ctx.for_element(list);
        let indent = "  ".repeat(level);

        for item in list.children.iter().filter_map(HtmlNode::as_element) {
            match item.tag.as_str() {
                "li" => {}
                "ul" | "ol" => {
                    self.list(item, &ctx, align, level + 1, out);
                    continue;
                }
                _ => continue,
            }

            let item_ctx = ctx.for_element(item);
            let item_align = item.inline_style().align.or(align);
            let mut leaves = Vec::new();
            let mut nested = Vec::new();
            for child in &item.children {
                match child.tag() {
                    Some("ul" | "ol") => nested.push(child),
                    _ => leaves.extend(inline::descend(child, &item_ctx)),
                }
            }

            let marker = if ordered {
                let marker = format!("{indent}{number}. ");
                number = number.saturating_add(1);
                marker
            } else {
                format!("{indent}{BULLET} ")
            };
            let mut line = vec![InlineLeaf::text(marker, without_link(&item_ctx))];
            line.extend(inline::tidy(leaves));
            out.push(Block::Paragraph(Paragraph {
                leaves: line,
                align: item_align,
                spacing: false,
            }));

            for child in nested {
                if let HtmlNode::Element(sub) = child {
                    self.list(sub, &item_ctx, item_align, level + 1, out);
                }
            }
        }
    }

    fn table(
        &mut self,
        table: &HtmlElement,
        ctx: &FormattingContext,
        align: Option<TextAlign>,
    ) -> Table {
        let mut rows = Vec::new();
        self.collect_rows(table, ctx, align, &mut rows);
        Table { rows }
    }

    fn collect_rows(
        &mut self,
        element: &HtmlElement,
        ctx: &FormattingContext,
        align: Option<TextAlign>,
        rows: &mut Vec<Vec<TableCell>>,
    ) {
        for child in element.children.iter().filter_map(HtmlNode::as_element) {
            let child_align = child.inline_style().align.or(align);
            match child.tag.as_str() {
                "thead" | "tbody" | "tfoot" => self.collect_rows(child, ctx, child_align, rows),
                "tr" => {
                    let cells = child
                        .children
                        .iter()
                        .filter_map(HtmlNode::as_element)
                        .filter(|c| c.tag == "td" || c.tag == "th")
                        .map(|cell| self.cell(cell, ctx, child_align))
                        .collect();
                    rows.push(cells);
                }
                _ => {}
            }
        }
    }

    fn cell(
        &mut self,
        cell: &HtmlElement,
        ctx: &FormattingContext,
        row_align: Option<TextAlign>,
    ) -> TableCell {
        let align = cell.inline_style().align.or(row_align);
        let cell_ctx = ctx.for_element(cell);
        TableCell {
            blocks: self.container(&cell.children, &cell_ctx, align),
            header: cell.tag == "th",
        }
    }
}

fn without_link(ctx: &FormattingContext) -> FormattingContext {
    FormattingContext {
        link: None,
        ..ctx.clone()
    }
}

fn flush(pending: &mut Vec<InlineLeaf>, align: Option<TextAlign>, blocks: &mut Vec<Block>) {
    let leaves = inline::tidy(std::mem::take(pending));
    if !leaves.is_empty() {
        blocks.push(Block::Paragraph(Paragraph {
            leaves,
            align,
            spacing: false,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph_texts(fragment: &Fragment) -> Vec<String> {
        fragment
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(p) => Some(inline::plain_text(&p.leaves)),
                Block::Table(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_inline_only_fragment() {
        let fragment = Fragment::from_html("<strong>Bold</strong> text");
        assert!(!fragment.produced_block);
        assert_eq!(paragraph_texts(&fragment), vec!["Bold text"]);
    }

    #[test]
    fn test_unordered_list_is_flattened() {
        let fragment = Fragment::from_html("<ul><li>A</li><li>B<ul><li>C</li></ul></li></ul>");
        assert!(fragment.produced_block);
        assert_eq!(
            paragraph_texts(&fragment),
            vec!["\u{2022} A", "\u{2022} B", "  \u{2022} C"]
        );
    }

    #[test]
    fn test_ordered_numbering_restarts_per_list() {
        let fragment = Fragment::from_html(
            "<ol><li>one<ol><li>inner</li><li>inner2</li></ol></li><li>two</li></ol><ol><li>again</li></ol>",
        );
        assert_eq!(
            paragraph_texts(&fragment),
            vec!["1. one", "  1. inner", "  2. inner2", "2. two", "1. again"]
        );
    }

    #[test]
    fn test_ordered_start_at_the_integer_limit() {
        let fragment = Fragment::from_html(&format!(
            r#"<ol start="{}"><li>a</li><li>b</li></ol><ol start="-3"><li>c</li></ol>"#,
            i64::MAX
        ));
        assert_eq!(
            paragraph_texts(&fragment),
            vec![
                format!("{}. a", i64::MAX),
                format!("{}. b", i64::MAX),
                "-3. c".to_string()
            ]
        );
    }

    #[test]
    fn test_heading_is_bold_and_framed() {
        let fragment = Fragment::from_html("<h2>Title</h2>");
        assert_eq!(paragraph_texts(&fragment), vec!["", "Title", ""]);
        let Block::Paragraph(title) = &fragment.blocks[1] else {
            panic!("expected paragraph");
        };
        let InlineLeaf::Text { format, .. } = &title.leaves[0] else {
            panic!("expected text");
        };
        assert!(format.bold);
    }

    #[test]
    fn test_table_cells_and_alignment() {
        let fragment = Fragment::from_html(
            r#"<table style="text-align:center"><tr><th>H</th><td style="text-align:right">R</td></tr><tr><td>x</td></tr></table>"#,
        );
        let Block::Table(table) = &fragment.blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(table.column_count(), 2);
        assert!(table.rows[0][0].header);
        let Block::Paragraph(h) = &table.rows[0][0].blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(h.align, Some(TextAlign::Center));
        assert!(matches!(&h.leaves[0], InlineLeaf::Text { format, .. } if format.bold));
        let Block::Paragraph(r) = &table.rows[0][1].blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(r.align, Some(TextAlign::Right));
    }

    #[test]
    fn test_spacing_paragraph_survives() {
        let fragment = Fragment::from_html("<table><tr><td>a</td></tr></table><p>&nbsp;</p><p>b</p>");
        let Block::Paragraph(spacer) = &fragment.blocks[1] else {
            panic!("expected paragraph");
        };
        assert!(spacer.spacing);
        assert_eq!(inline::plain_text(&spacer.leaves), "\u{a0}");
    }

    #[test]
    fn test_empty_paragraphs_are_dropped() {
        let fragment = Fragment::from_html("<p></p><p>  </p><p>x</p>");
        assert_eq!(paragraph_texts(&fragment), vec!["x"]);
    }

    #[test]
    fn test_inline_flattening() {
        let fragment =
            Fragment::from_html("<p>Before</p><table><tr><td>a</td><td>b</td></tr></table>");
        assert_eq!(inline::plain_text(&fragment.inline_leaves()), "Before\na\tb");
    }
}
