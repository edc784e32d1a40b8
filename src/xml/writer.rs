//! Serialize an [`XmlDom`] back to text.

use std::borrow::Cow;

use super::arena::{NodeId, XmlDom, XmlNodeData};

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Serialize the whole document.
pub fn serialize(dom: &XmlDom) -> String {
    let mut out = String::with_capacity(dom.len() * 16);
    if dom.has_declaration {
        out.push_str(DECLARATION);
        out.push('\n');
    }
    for child in dom.children(dom.document()) {
        write_node(dom, child, &mut out);
    }
    out
}

/// Serialize a single subtree (used by tests and diagnostics).
pub fn serialize_node(dom: &XmlDom, id: NodeId) -> String {
    let mut out = String::new();
    write_node(dom, id, &mut out);
    out
}

fn write_node(dom: &XmlDom, id: NodeId, out: &mut String) {
    let Some(node) = dom.get(id) else {
        return;
    };
    match &node.data {
        XmlNodeData::Document => {
            for child in dom.children(id) {
                write_node(dom, child, out);
            }
        }
        XmlNodeData::Element { name, attrs } => {
            out.push('<');
            out.push_str(name);
            for attr in attrs {
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                out.push_str(&escape_attr(&attr.value));
                out.push('"');
            }
            if node.first_child.is_none() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in dom.children(id) {
                write_node(dom, child, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        XmlNodeData::Text(text) => out.push_str(&escape_text(text)),
        XmlNodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
    }
}

fn escape_text(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

fn escape_attr(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\n', '\r', '\t']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::reader::parse;

    #[test]
    fn test_roundtrip_preserves_structure() {
        let src = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t xml:space="preserve"> a &amp; b </w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;
        let dom = parse(src).unwrap();
        assert_eq!(serialize(&dom), src);
    }

    #[test]
    fn test_escaping() {
        let mut dom = XmlDom::new();
        let root = dom.create_element_with("a", &[("href", "x?a=\"1\"&b")]);
        dom.append(dom.document(), root);
        let text = dom.create_text("<p>&nbsp;</p>");
        dom.append(root, text);
        assert_eq!(
            serialize(&dom),
            r#"<a href="x?a=&quot;1&quot;&amp;b">&lt;p&gt;&amp;nbsp;&lt;/p&gt;</a>"#
        );
    }
}
