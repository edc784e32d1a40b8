//! ODF text and table construction for converted fragments.

use crate::blocks::{Block, Fragment, Paragraph, Table};
use crate::inline::{FormattingContext, InlineLeaf};
use crate::xml::{NodeId, XmlDom};

use super::styles::{StyleKey, StyleRegistry};

/// Builds ODF nodes inside a part's DOM, registering the automatic styles
/// they reference.
pub struct OdtBuilder<'a> {
    dom: &'a mut XmlDom,
    styles: &'a mut StyleRegistry,
    paragraph_style: Option<String>,
}

impl<'a> OdtBuilder<'a> {
    pub fn new(dom: &'a mut XmlDom, styles: &'a mut StyleRegistry) -> Self {
        Self {
            dom,
            styles,
            paragraph_style: None,
        }
    }

    /// Paragraph style generated paragraphs inherit when not aligned.
    pub fn with_paragraph_style(mut self, style: Option<String>) -> Self {
        self.paragraph_style = style;
        self
    }

    /// The fragment flattened to inline nodes, trailing breaks trimmed.
    pub fn inline(&mut self, fragment: &Fragment) -> Vec<NodeId> {
        let mut nodes = self.leaves(&fragment.inline_leaves());
        trim_trailing_breaks(self.dom, &mut nodes);
        nodes
    }

    /// The fragment as paragraphs and tables.
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

    /// Inline nodes for a line of leaves; links become `text:a`.
    pub fn leaves(&mut self, leaves: &[InlineLeaf]) -> Vec<NodeId> {
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
                    let anchor = self.dom.create_element_with(
                        "text:a",
                        &[("xlink:type", "simple"), ("xlink:href", href.as_str())],
                    );
                    let link_style = self.styles.require(StyleKey::Link);
                    let span = self
                        .dom
                        .create_element_with("text:span", &[("text:style-name", link_style)]);
                    for leaf in &leaves[i..end] {
                        if let InlineLeaf::Text { text, format } = leaf {
                            for node in self.styled_text(text, format) {
                                self.dom.append(span, node);
                            }
                        }
                    }
                    self.dom.append(anchor, span);
                    out.push(anchor);
                    i = end;
                }
                InlineLeaf::Text { text, format } => {
                    out.extend(self.styled_text(text, format));
                    i += 1;
                }
                InlineLeaf::LineBreak => {
                    out.push(self.dom.create_element("text:line-break"));
                    i += 1;
                }
            }
        }
        out
    }

    /// Text wrapped in one span per active flag, bold outermost.
    fn styled_text(&mut self, text: &str, format: &FormattingContext) -> Vec<NodeId> {
        let mut nodes = self.text_nodes(text);
        let wrappers = [
            (format.underline, StyleKey::Underline),
            (format.italic, StyleKey::Italic),
            (format.bold, StyleKey::Bold),
        ];
        for (active, key) in wrappers {
            if !active {
                continue;
            }
            let name = self.styles.require(key);
            let span = self
                .dom
                .create_element_with("text:span", &[("text:style-name", name)]);
            for node in nodes {
                self.dom.append(span, node);
            }
            nodes = vec![span];
        }
        nodes
    }

    /// Text nodes with tabs and newlines as `text:tab` / `text:line-break`.
    fn text_nodes(&mut self, text: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut buffer = String::new();
        for ch in text.chars() {
            let special = match ch {
                '\t' => "text:tab",
                '\n' => "text:line-break",
                _ => {
                    buffer.push(ch);
                    continue;
                }
            };
            if !buffer.is_empty() {
                out.push(self.dom.create_text(std::mem::take(&mut buffer)));
            }
            out.push(self.dom.create_element(special));
        }
        if !buffer.is_empty() {
            out.push(self.dom.create_text(buffer));
        }
        out
    }

    /// A `text:p`; empty paragraphs are kept as spacing.
    pub fn paragraph(&mut self, paragraph: &Paragraph, in_table: bool) -> NodeId {
        let style = match paragraph.align.and_then(StyleKey::for_align) {
            Some(key) => Some(self.styles.require(key).to_string()),
            None if in_table => None,
            None => self.paragraph_style.clone(),
        };
        let p = match &style {
            Some(name) => self
                .dom
                .create_element_with("text:p", &[("text:style-name", name.as_str())]),
            None => self.dom.create_element("text:p"),
        };
        let mut nodes = self.leaves(&paragraph.leaves);
        trim_trailing_breaks(self.dom, &mut nodes);
        for node in nodes {
            self.dom.append(p, node);
        }
        p
    }

    /// `table:table` with one column element per column and bordered,
    /// padded cells; `None` for a table without cells.
    pub fn table(&mut self, table: &Table) -> Option<NodeId> {
        let columns = table.column_count();
        if columns == 0 {
            return None;
        }
        let name = self.styles.next_table_name(self.dom);
        let table_style = self.styles.require(StyleKey::Table);
        let cell_style = self.styles.require(StyleKey::TableCell);

        let tbl = self.dom.create_element_with(
            "table:table",
            &[
                ("table:name", name.as_str()),
                ("table:style-name", table_style),
            ],
        );
        for _ in 0..columns {
            let column = self.dom.create_element("table:table-column");
            self.dom.append(tbl, column);
        }
        for row in &table.rows {
            let tr = self.dom.create_element("table:table-row");
            for index in 0..columns {
                let cell = self.dom.create_element_with(
                    "table:table-cell",
                    &[
                        ("table:style-name", cell_style),
                        ("office:value-type", "string"),
                    ],
                );
                let mut content = row
                    .get(index)
                    .map(|c| self.blocks_in(&c.blocks, true))
                    .unwrap_or_default();
                if content.is_empty() {
                    content.push(self.dom.create_element("text:p"));
                }
                for node in content {
                    self.dom.append(cell, node);
                }
                self.dom.append(tr, cell);
            }
            self.dom.append(tbl, tr);
        }
        Some(tbl)
    }
}

/// Drop trailing `text:line-break`s and newline-only text nodes.
pub fn trim_trailing_breaks(dom: &mut XmlDom, nodes: &mut Vec<NodeId>) {
    while let Some(&last) = nodes.last() {
        let is_break = dom.is_named(last, "text:line-break")
            || dom
                .text(last)
                .is_some_and(|t| t.chars().all(|c| c == '\n' || c == '\r'));
        if !is_break {
            break;
        }
        nodes.pop();
        dom.detach(last);
    }
}
