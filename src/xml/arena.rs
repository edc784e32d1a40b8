//! Arena-based DOM for office XML parts.
//!
//! Nodes live in one vector and link to each other by index, so the
//! rewriters can hold on to node ids while splicing runs and paragraphs
//! around them. Names are kept as qualified strings (`w:p`, `text:span`):
//! office parts always use fixed prefixes and the serializer writes them back
//! verbatim.

/// Unique identifier for a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel value for no node.
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Check if this is a valid node ID.
    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }

    /// Check if this is the sentinel value.
    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }
}

/// Node type in the XML DOM.
#[derive(Debug, Clone)]
pub enum XmlNodeData {
    /// Document root.
    Document,
    /// Element with qualified name and attributes in source order.
    Element { name: String, attrs: Vec<Attribute> },
    /// Character data (already unescaped).
    Text(String),
    /// Comment, kept so untouched parts of a tree round-trip.
    Comment(String),
}

/// XML attribute with its qualified name and unescaped value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// A node in the arena DOM.
#[derive(Debug)]
pub struct XmlNode {
    pub data: XmlNodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl XmlNode {
    fn new(data: XmlNodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// Arena-based XML tree.
///
/// Detached nodes stay allocated; the serializer only walks what is reachable
/// from the document root.
#[derive(Debug)]
pub struct XmlDom {
    nodes: Vec<XmlNode>,
    document: NodeId,
    /// Whether the source carried an `<?xml ...?>` declaration.
    pub(crate) has_declaration: bool,
}

impl XmlDom {
    /// Create a new empty DOM with a document root.
    pub fn new() -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            document: NodeId::NONE,
            has_declaration: false,
        };
        dom.document = dom.alloc(XmlNode::new(XmlNodeData::Document));
        dom
    }

    fn alloc(&mut self, node: XmlNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Get the document root ID.
    pub fn document(&self) -> NodeId {
        self.document
    }

    /// The single top-level element, if any.
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.document).find(|&id| self.is_element(id))
    }

    pub fn get(&self, id: NodeId) -> Option<&XmlNode> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut XmlNode> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    /// Create a detached element node.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.alloc(XmlNode::new(XmlNodeData::Element {
            name: name.to_string(),
            attrs: Vec::new(),
        }))
    }

    /// Create a detached element node with attributes.
    pub fn create_element_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let attrs = attrs
            .iter()
            .map(|(n, v)| Attribute {
                name: n.to_string(),
                value: v.to_string(),
            })
            .collect();
        self.alloc(XmlNode::new(XmlNodeData::Element {
            name: name.to_string(),
            attrs,
        }))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(XmlNode::new(XmlNodeData::Text(text.into())))
    }

    pub fn create_comment(&mut self, text: String) -> NodeId {
        self.alloc(XmlNode::new(XmlNodeData::Comment(text)))
    }

    /// Append a child to a parent node. The child must be detached.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        let last_child = self
            .get(parent)
            .map(|n| n.last_child)
            .unwrap_or(NodeId::NONE);

        if let Some(child_node) = self.get_mut(child) {
            child_node.parent = parent;
            child_node.prev_sibling = last_child;
            child_node.next_sibling = NodeId::NONE;
        }

        if let Some(last_node) = self.get_mut(last_child) {
            last_node.next_sibling = child;
        }

        if let Some(parent_node) = self.get_mut(parent) {
            if parent_node.first_child.is_none() {
                parent_node.first_child = child;
            }
            parent_node.last_child = child;
        }
    }

    /// Insert a detached node before a sibling.
    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        let (parent, prev) = match self.get(sibling) {
            Some(n) => (n.parent, n.prev_sibling),
            None => return,
        };

        if let Some(new) = self.get_mut(new_node) {
            new.parent = parent;
            new.prev_sibling = prev;
            new.next_sibling = sibling;
        }

        if let Some(sib) = self.get_mut(sibling) {
            sib.prev_sibling = new_node;
        }

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = new_node;
            }
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = new_node;
        }
    }

    /// Insert a detached node after a sibling.
    pub fn insert_after(&mut self, sibling: NodeId, new_node: NodeId) {
        let (parent, next) = match self.get(sibling) {
            Some(n) => (n.parent, n.next_sibling),
            None => return,
        };
        if next.is_some() {
            self.insert_before(next, new_node);
        } else if parent.is_some() {
            self.append(parent, new_node);
        }
    }

    /// Insert several detached nodes before a sibling, keeping their order.
    pub fn insert_all_before(&mut self, sibling: NodeId, nodes: &[NodeId]) {
        for &node in nodes {
            self.insert_before(sibling, node);
        }
    }

    /// Insert several detached nodes after a sibling, keeping their order.
    pub fn insert_all_after(&mut self, sibling: NodeId, nodes: &[NodeId]) {
        let mut anchor = sibling;
        for &node in nodes {
            self.insert_after(anchor, node);
            anchor = node;
        }
    }

    /// Unlink a node (and its subtree) from its parent.
    pub fn detach(&mut self, target: NodeId) {
        let (parent, prev, next) = match self.get(target) {
            Some(n) => (n.parent, n.prev_sibling, n.next_sibling),
            None => return,
        };

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = next;
            }
        } else if let Some(p) = self.get_mut(parent) {
            p.first_child = next;
        }

        if next.is_some() {
            if let Some(n) = self.get_mut(next) {
                n.prev_sibling = prev;
            }
        } else if let Some(p) = self.get_mut(parent) {
            p.last_child = prev;
        }

        if let Some(node) = self.get_mut(target) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    /// Deep-copy a subtree. The copy is detached.
    pub fn deep_clone(&mut self, source: NodeId) -> NodeId {
        let data = match self.get(source) {
            Some(n) => n.data.clone(),
            None => return NodeId::NONE,
        };
        let copy = self.alloc(XmlNode::new(data));
        let children: Vec<_> = self.children(source).collect();
        for child in children {
            let child_copy = self.deep_clone(child);
            self.append(copy, child_copy);
        }
        copy
    }

    /// Copy an element's name and attributes without its children.
    pub fn shallow_clone(&mut self, source: NodeId) -> NodeId {
        let data = match self.get(source) {
            Some(n) => n.data.clone(),
            None => return NodeId::NONE,
        };
        self.alloc(XmlNode::new(data))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.parent).filter(|p| p.is_some())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.next_sibling).filter(|s| s.is_some())
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.prev_sibling).filter(|s| s.is_some())
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.last_child).filter(|c| c.is_some())
    }

    /// Iterate over children of a node.
    pub fn children(&self, parent: NodeId) -> ChildrenIter<'_> {
        let first = self
            .get(parent)
            .map(|n| n.first_child)
            .unwrap_or(NodeId::NONE);
        ChildrenIter {
            dom: self,
            current: first,
        }
    }

    /// Element children with the given qualified name.
    pub fn child_elements<'a>(
        &'a self,
        parent: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(parent)
            .filter(move |&c| self.element_name(c) == Some(name))
    }

    pub fn first_child_element(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .find(|&c| self.element_name(c) == Some(name))
    }

    /// All descendants in document order (pre-order), excluding `root`.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).collect();
        stack.reverse();
        while let Some(id) = stack.pop() {
            out.push(id);
            let mut children: Vec<_> = self.children(id).collect();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// All descendant elements with the given qualified name, in document order.
    pub fn find_all(&self, root: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&id| self.element_name(id) == Some(name))
            .collect()
    }

    /// Whether `node` lies inside `ancestor`.
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Whether the node is still reachable from the document root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        node == self.document || self.is_descendant_of(node, self.document)
    }
}

impl Default for XmlDom {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over children of a node.
pub struct ChildrenIter<'a> {
    dom: &'a XmlDom,
    current: NodeId,
}

impl Iterator for ChildrenIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self
            .dom
            .get(id)
            .map(|n| n.next_sibling)
            .unwrap_or(NodeId::NONE);
        Some(id)
    }
}

/// Convenience methods for element and text nodes.
impl XmlDom {
    /// Get element's qualified name.
    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            XmlNodeData::Element { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|n| matches!(n.data, XmlNodeData::Element { .. }))
    }

    pub fn is_named(&self, id: NodeId, name: &str) -> bool {
        self.element_name(id) == Some(name)
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|n| matches!(n.data, XmlNodeData::Text(_)))
    }

    /// Get an attribute value by qualified name.
    pub fn attr(&self, id: NodeId, attr_name: &str) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            XmlNodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name == attr_name)
                .map(|a| a.value.as_str()),
            _ => None,
        })
    }

    /// Attributes of an element (empty for other nodes).
    pub fn attrs(&self, id: NodeId) -> &[Attribute] {
        match self.get(id).map(|n| &n.data) {
            Some(XmlNodeData::Element { attrs, .. }) => attrs,
            _ => &[],
        }
    }

    /// Set or replace an attribute.
    pub fn set_attr(&mut self, id: NodeId, attr_name: &str, value: &str) {
        if let Some(node) = self.get_mut(id)
            && let XmlNodeData::Element { attrs, .. } = &mut node.data
        {
            if let Some(existing) = attrs.iter_mut().find(|a| a.name == attr_name) {
                existing.value = value.to_string();
            } else {
                attrs.push(Attribute {
                    name: attr_name.to_string(),
                    value: value.to_string(),
                });
            }
        }
    }

    /// Remove an attribute if present.
    pub fn remove_attr(&mut self, id: NodeId, attr_name: &str) {
        if let Some(node) = self.get_mut(id)
            && let XmlNodeData::Element { attrs, .. } = &mut node.data
        {
            attrs.retain(|a| a.name != attr_name);
        }
    }

    /// Get text content of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            XmlNodeData::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Replace the content of a text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(node) = self.get_mut(id)
            && let XmlNodeData::Text(existing) = &mut node.data
        {
            existing.clear();
            existing.push_str(text);
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(text) = self.text(id) {
            return text.to_string();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|d| self.text(d))
            .collect()
    }

    /// Replace all children of an element with a single text node.
    pub fn replace_text_content(&mut self, id: NodeId, text: &str) {
        let children: Vec<_> = self.children(id).collect();
        for child in children {
            self.detach(child);
        }
        if !text.is_empty() {
            let node = self.create_text(text);
            self.append(id, node);
        }
    }
}
