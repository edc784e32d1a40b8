//! html5ever TreeSink that collects a fragment into [`HtmlNode`]s.

use std::cell::RefCell;
use std::rc::Rc;

use html5ever::tendril::StrTendril;
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute as Html5Attribute, QualName};

use super::{HtmlElement, HtmlNode};

/// Handle used by TreeSink to reference nodes.
///
/// Element handles carry their name so `elem_name` can hand out a borrow
/// without reaching into the RefCell-guarded node list.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: usize,
    name: Option<Rc<QualName>>,
}

#[derive(Debug)]
enum SinkData {
    Document,
    Element {
        name: Rc<QualName>,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    /// Comments, doctypes and processing instructions: kept for tree
    /// bookkeeping, dropped on output.
    Ignored,
}

#[derive(Debug)]
struct SinkNode {
    data: SinkData,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// TreeSink implementation that records a flat node list.
///
/// Uses interior mutability (RefCell) because html5ever's TreeSink trait
/// requires methods to take `&self` but we need to mutate the tree.
pub struct FragmentSink {
    nodes: RefCell<Vec<SinkNode>>,
}

impl Default for FragmentSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentSink {
    pub fn new() -> Self {
        Self {
            nodes: RefCell::new(vec![SinkNode {
                data: SinkData::Document,
                parent: None,
                children: Vec::new(),
            }]),
        }
    }

    fn push(&self, data: SinkData) -> usize {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(SinkNode {
            data,
            parent: None,
            children: Vec::new(),
        });
        nodes.len() - 1
    }

    fn append_node(nodes: &mut [SinkNode], parent: usize, child: usize) {
        Self::unlink(nodes, child);
        nodes[child].parent = Some(parent);
        nodes[parent].children.push(child);
    }

    fn append_text(nodes: &mut Vec<SinkNode>, parent: usize, text: &str) {
        if let Some(&last) = nodes[parent].children.last()
            && let SinkData::Text(existing) = &mut nodes[last].data
        {
            existing.push_str(text);
            return;
        }
        nodes.push(SinkNode {
            data: SinkData::Text(text.to_string()),
            parent: Some(parent),
            children: Vec::new(),
        });
        let id = nodes.len() - 1;
        nodes[parent].children.push(id);
    }

    fn unlink(nodes: &mut [SinkNode], child: usize) {
        if let Some(parent) = nodes[child].parent.take() {
            nodes[parent].children.retain(|&c| c != child);
        }
    }

    /// Consume the sink and return the children of `<body>` as a tree.
    ///
    /// Returns `None` when the document has no body element.
    pub fn into_body(self) -> Option<Vec<HtmlNode>> {
        let nodes = self.nodes.into_inner();
        let body = find_element(&nodes, 0, "body")?;
        Some(
            nodes[body]
                .children
                .iter()
                .filter_map(|&c| build(&nodes, c))
                .collect(),
        )
    }
}

fn find_element(nodes: &[SinkNode], from: usize, local: &str) -> Option<usize> {
    let mut stack = vec![from];
    while let Some(id) = stack.pop() {
        if let SinkData::Element { name, .. } = &nodes[id].data
            && name.local.as_ref() == local
        {
            return Some(id);
        }
        stack.extend(nodes[id].children.iter().rev().copied());
    }
    None
}

fn build(nodes: &[SinkNode], id: usize) -> Option<HtmlNode> {
    match &nodes[id].data {
        SinkData::Text(text) => Some(HtmlNode::Text(text.clone())),
        SinkData::Element { name, attrs } => Some(HtmlNode::Element(HtmlElement {
            tag: name.local.as_ref().to_ascii_lowercase(),
            attrs: attrs.clone(),
            children: nodes[id]
                .children
                .iter()
                .filter_map(|&c| build(nodes, c))
                .collect(),
        })),
        SinkData::Document | SinkData::Ignored => None,
    }
}

impl TreeSink for FragmentSink {
    type Handle = NodeHandle;
    type Output = Self;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self
    }

    fn parse_error(&self, _msg: std::borrow::Cow<'static, str>) {
        // Editor output is often sloppy; recover like a browser does.
    }

    fn get_document(&self) -> Self::Handle {
        NodeHandle { id: 0, name: None }
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        static EMPTY: QualName = QualName {
            prefix: None,
            ns: html5ever::ns!(),
            local: html5ever::local_name!(""),
        };
        target.name.as_deref().unwrap_or(&EMPTY)
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<Html5Attribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        let name = Rc::new(name);
        let attrs = attrs
            .into_iter()
            .map(|a| (a.name.local.to_string(), a.value.to_string()))
            .collect();
        let id = self.push(SinkData::Element {
            name: name.clone(),
            attrs,
        });
        NodeHandle {
            id,
            name: Some(name),
        }
    }

    fn create_comment(&self, _text: StrTendril) -> Self::Handle {
        NodeHandle {
            id: self.push(SinkData::Ignored),
            name: None,
        }
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        NodeHandle {
            id: self.push(SinkData::Ignored),
            name: None,
        }
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let mut nodes = self.nodes.borrow_mut();
        match child {
            NodeOrText::AppendNode(node) => Self::append_node(&mut nodes, parent.id, node.id),
            NodeOrText::AppendText(text) => Self::append_text(&mut nodes, parent.id, &text),
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        let parent = self.nodes.borrow()[element.id].parent;
        match parent {
            Some(parent) => self.append(
                &NodeHandle {
                    id: parent,
                    name: None,
                },
                child,
            ),
            None => self.append(prev_element, child),
        }
    }

    fn append_doctype_to_document(
        &self,
        _name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        target.clone()
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        x.id == y.id
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let mut nodes = self.nodes.borrow_mut();
        let Some(parent) = nodes[sibling.id].parent else {
            return;
        };
        let child = match new_node {
            NodeOrText::AppendNode(node) => {
                Self::unlink(&mut nodes, node.id);
                node.id
            }
            NodeOrText::AppendText(text) => {
                nodes.push(SinkNode {
                    data: SinkData::Text(text.to_string()),
                    parent: None,
                    children: Vec::new(),
                });
                nodes.len() - 1
            }
        };
        let position = nodes[parent]
            .children
            .iter()
            .position(|&c| c == sibling.id)
            .unwrap_or(nodes[parent].children.len());
        nodes[child].parent = Some(parent);
        nodes[parent].children.insert(position, child);
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Html5Attribute>) {
        let mut nodes = self.nodes.borrow_mut();
        if let SinkData::Element {
            attrs: existing, ..
        } = &mut nodes[target.id].data
        {
            for attr in attrs {
                let key = attr.name.local.to_string();
                if !existing.iter().any(|(name, _)| *name == key) {
                    existing.push((key, attr.value.to_string()));
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        Self::unlink(&mut self.nodes.borrow_mut(), target.id);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        let mut nodes = self.nodes.borrow_mut();
        let children = std::mem::take(&mut nodes[node.id].children);
        for child in children {
            nodes[child].parent = Some(new_parent.id);
            nodes[new_parent.id].children.push(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use html5ever::driver::ParseOpts;
    use html5ever::parse_document;
    use html5ever::tendril::TendrilSink;

    use super::*;

    fn parse_body(html: &str) -> Vec<HtmlNode> {
        parse_document(FragmentSink::new(), ParseOpts::default())
            .from_utf8()
            .one(html.as_bytes())
            .into_body()
            .expect("body")
    }

    #[test]
    fn test_basic_parse() {
        let body = parse_body("<html><body><p>Hello</p></body></html>");
        assert_eq!(body.len(), 1);
        let HtmlNode::Element(p) = &body[0] else {
            panic!("expected element");
        };
        assert_eq!(p.tag, "p");
        assert_eq!(p.children, vec![HtmlNode::Text("Hello".into())]);
    }

    #[test]
    fn test_misnested_formatting_is_repaired() {
        // The adoption agency algorithm reparents and clones nodes here.
        let body = parse_body("<p><b>one<i>two</b>three</i></p>");
        let text: String = body.iter().map(HtmlNode::text_content).collect();
        assert_eq!(text, "onetwothree");
    }

    #[test]
    fn test_foster_parented_text_keeps_order() {
        let body = parse_body("<table>stray<tr><td>cell</td></tr></table>");
        let text: String = body.iter().map(HtmlNode::text_content).collect();
        assert_eq!(text, "straycell");
    }
}
