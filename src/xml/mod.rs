//! Namespace-aware XML tree used by the part rewriters.

mod arena;
mod reader;
mod writer;

pub use arena::{Attribute, ChildrenIter, NodeId, XmlDom, XmlNode, XmlNodeData};
pub use reader::parse;
pub use writer::{serialize, serialize_node};

use std::borrow::Cow;

use crate::error::{Error, Result};

/// Namespace URIs for the prefixes the builders emit.
pub mod ns {
    pub const W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
    pub const R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
    pub const PACKAGE_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
    pub const CP: &str =
        "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
    pub const DC: &str = "http://purl.org/dc/elements/1.1/";

    pub const OFFICE: &str = "urn:oasis:names:tc:opendocument:xmlns:office:1.0";
    pub const TEXT: &str = "urn:oasis:names:tc:opendocument:xmlns:text:1.0";
    pub const TABLE: &str = "urn:oasis:names:tc:opendocument:xmlns:table:1.0";
    pub const STYLE: &str = "urn:oasis:names:tc:opendocument:xmlns:style:1.0";
    pub const FO: &str = "urn:oasis:names:tc:opendocument:xmlns:xsl-fo-compatible:1.0";
    pub const XLINK: &str = "http://www.w3.org/1999/xlink";
    pub const META: &str = "urn:oasis:names:tc:opendocument:xmlns:meta:1.0";
}

/// Parse a part's raw bytes, mapping failures to a part-scoped XML error.
pub fn parse_part(part: &str, bytes: &[u8]) -> Result<XmlDom> {
    let text = decode_part(bytes);
    parse(&text).map_err(|e| Error::xml(part, e))
}

/// Decode part bytes to text.
///
/// Tries UTF-8 first (BOM handled by encoding_rs), then the encoding named
/// in the XML declaration, then Windows-1252.
pub fn decode_part(bytes: &[u8]) -> Cow<'_, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);
    if !malformed {
        return result;
    }

    if let Some(label) = declared_encoding(bytes)
        && let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Extract `encoding="..."` from an XML declaration.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(200)];
    let head = String::from_utf8_lossy(head);
    let decl_end = head.find("?>")?;
    let decl = &head[..decl_end];
    let start = decl.find("encoding=")? + "encoding=".len();
    let rest = &decl[start..];
    let quote = match rest.chars().next()? {
        quote @ ('"' | '\'') => quote,
        _ => return None,
    };
    let rest = rest.get(1..)?;
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

/// Declare `xmlns:{prefix}` on the root element unless already present.
pub fn ensure_namespace(dom: &mut XmlDom, prefix: &str, uri: &str) {
    let Some(root) = dom.root_element() else {
        return;
    };
    let attr = format!("xmlns:{prefix}");
    if dom.attr(root, &attr).is_none() {
        dom.set_attr(root, &attr, uri);
    }
}

/// Whether any element in the tree uses `prefix:`.
pub fn uses_prefix(dom: &XmlDom, prefix: &str) -> bool {
    let needle = format!("{prefix}:");
    dom.descendants(dom.document()).into_iter().any(|id| {
        dom.element_name(id).is_some_and(|n| n.starts_with(&needle))
            || dom
                .attrs(id)
                .iter()
                .any(|a| a.name.starts_with(&needle))
    })
}

/// Local part of a qualified name (`w:p` -> `p`).
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}
