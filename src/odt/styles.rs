//! Automatic styles required by generated ODF markup.

use std::collections::BTreeSet;

use crate::html::TextAlign;
use crate::xml::{self, NodeId, XmlDom, ns};

/// A named automatic style the builders can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StyleKey {
    Bold,
    Italic,
    Underline,
    Link,
    Table,
    TableCell,
    AlignCenter,
    AlignRight,
    AlignJustify,
}

impl StyleKey {
    pub fn name(self) -> &'static str {
        match self {
            StyleKey::Bold => "DocumentateRichBold",
            StyleKey::Italic => "DocumentateRichItalic",
            StyleKey::Underline => "DocumentateRichUnderline",
            StyleKey::Link => "DocumentateRichLink",
            StyleKey::Table => "DocumentateRichTable",
            StyleKey::TableCell => "DocumentateRichTableCell",
            StyleKey::AlignCenter => "DocumentateAlignCenter",
            StyleKey::AlignRight => "DocumentateAlignRight",
            StyleKey::AlignJustify => "DocumentateAlignJustify",
        }
    }

    /// Paragraph style for an alignment; left alignment needs none.
    pub fn for_align(align: TextAlign) -> Option<Self> {
        match align {
            TextAlign::Left => None,
            TextAlign::Center => Some(StyleKey::AlignCenter),
            TextAlign::Right => Some(StyleKey::AlignRight),
            TextAlign::Justify => Some(StyleKey::AlignJustify),
        }
    }

    fn family(self) -> &'static str {
        match self {
            StyleKey::Bold | StyleKey::Italic | StyleKey::Underline | StyleKey::Link => "text",
            StyleKey::Table => "table",
            StyleKey::TableCell => "table-cell",
            StyleKey::AlignCenter | StyleKey::AlignRight | StyleKey::AlignJustify => "paragraph",
        }
    }

    fn properties_element(self) -> &'static str {
        match self {
            StyleKey::Bold | StyleKey::Italic | StyleKey::Underline | StyleKey::Link => {
                "style:text-properties"
            }
            StyleKey::Table => "style:table-properties",
            StyleKey::TableCell => "style:table-cell-properties",
            StyleKey::AlignCenter | StyleKey::AlignRight | StyleKey::AlignJustify => {
                "style:paragraph-properties"
            }
        }
    }

    fn properties(self) -> &'static [(&'static str, &'static str)] {
        match self {
            StyleKey::Bold => &[
                ("fo:font-weight", "bold"),
                ("style:font-weight-asian", "bold"),
                ("style:font-weight-complex", "bold"),
            ],
            StyleKey::Italic => &[
                ("fo:font-style", "italic"),
                ("style:font-style-asian", "italic"),
                ("style:font-style-complex", "italic"),
            ],
            StyleKey::Underline => &[
                ("style:text-underline-style", "solid"),
                ("style:text-underline-width", "auto"),
                ("style:text-underline-color", "font-color"),
            ],
            StyleKey::Link => &[
                ("fo:color", "#0563c1"),
                ("style:text-underline-style", "solid"),
                ("style:text-underline-width", "auto"),
                ("style:text-underline-color", "font-color"),
            ],
            StyleKey::Table => &[
                ("table:align", "margins"),
                ("table:border-model", "collapsing"),
                ("fo:border", "0.5pt solid #000000"),
            ],
            StyleKey::TableCell => &[("fo:border", "0.5pt solid #000000"), ("fo:padding", "0.1cm")],
            StyleKey::AlignCenter => &[("fo:text-align", "center")],
            StyleKey::AlignRight => &[("fo:text-align", "end")],
            StyleKey::AlignJustify => &[("fo:text-align", "justify")],
        }
    }
}

/// Styles required by one document, accumulated over all its parts.
#[derive(Debug, Clone, Default)]
pub struct StyleRegistry {
    required: BTreeSet<StyleKey>,
    tables: usize,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `key` is used and return its style name.
    pub fn require(&mut self, key: StyleKey) -> &'static str {
        self.required.insert(key);
        key.name()
    }

    pub fn contains(&self, key: StyleKey) -> bool {
        self.required.contains(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    pub fn len(&self) -> usize {
        self.required.len()
    }

    /// A `table:name` not yet used in `dom`.
    pub fn next_table_name(&mut self, dom: &XmlDom) -> String {
        let taken: BTreeSet<&str> = dom
            .find_all(dom.document(), "table:table")
            .into_iter()
            .filter_map(|t| dom.attr(t, "table:name"))
            .collect();
        loop {
            self.tables += 1;
            let name = format!("{}{}", StyleKey::Table.name(), self.tables);
            if !taken.contains(name.as_str()) {
                return name;
            }
        }
    }

    /// Declare every required style in the part's `office:automatic-styles`,
    /// creating that block when missing. Styles whose name already exists
    /// are left alone. Returns whether the part changed.
    pub fn inject(&self, dom: &mut XmlDom) -> bool {
        if self.required.is_empty() {
            return false;
        }
        let Some(root) = dom.root_element() else {
            return false;
        };
        let automatic = automatic_styles(dom, root);

        let existing: BTreeSet<String> = dom
            .children(automatic)
            .filter_map(|s| dom.attr(s, "style:name"))
            .map(str::to_string)
            .collect();

        let mut changed = false;
        for key in &self.required {
            if existing.contains(key.name()) {
                continue;
            }
            let style = dom.create_element_with(
                "style:style",
                &[("style:name", key.name()), ("style:family", key.family())],
            );
            let props = dom.create_element_with(key.properties_element(), key.properties());
            dom.append(style, props);
            dom.append(automatic, style);
            changed = true;
        }

        if changed {
            xml::ensure_namespace(dom, "style", ns::STYLE);
            xml::ensure_namespace(dom, "fo", ns::FO);
            xml::ensure_namespace(dom, "table", ns::TABLE);
        }
        changed
    }
}

/// Find or create `office:automatic-styles` directly under the root.
fn automatic_styles(dom: &mut XmlDom, root: NodeId) -> NodeId {
    if let Some(existing) = dom.first_child_element(root, "office:automatic-styles") {
        return existing;
    }
    let block = dom.create_element("office:automatic-styles");
    let anchor = dom.children(root).find(|&c| {
        matches!(
            dom.element_name(c),
            Some("office:master-styles" | "office:body")
        )
    });
    match anchor {
        Some(anchor) => dom.insert_before(anchor, block),
        None => dom.append(root, block),
    }
    xml::ensure_namespace(dom, "office", ns::OFFICE);
    block
}
