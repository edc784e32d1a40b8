//! Parse an XML part into an [`XmlDom`] with quick-xml.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::arena::{Attribute, NodeId, XmlDom, XmlNodeData};

/// Parse XML text into a DOM.
///
/// Whitespace-only text is preserved: `xml:space="preserve"` runs and ODF
/// paragraphs depend on it. Comments are kept; processing instructions and
/// doctypes are dropped (office parts carry neither).
pub fn parse(xml: &str) -> Result<XmlDom, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut dom = XmlDom::new();
    let mut stack: Vec<NodeId> = vec![dom.document()];

    loop {
        let parent = *stack.last().unwrap_or(&dom.document());
        match reader.read_event() {
            Ok(Event::Decl(_)) => dom.has_declaration = true,
            Ok(Event::Start(e)) => {
                let id = create_element(&mut dom, &e)?;
                dom.append(parent, id);
                stack.push(id);
            }
            Ok(Event::Empty(e)) => {
                let id = create_element(&mut dom, &e)?;
                dom.append(parent, id);
            }
            Ok(Event::End(_)) => {
                if stack.len() <= 1 {
                    return Err("unexpected closing tag".to_string());
                }
                stack.pop();
            }
            Ok(Event::Text(e)) => {
                let raw = String::from_utf8_lossy(e.as_ref());
                let text = unescape_text(&raw)?;
                append_text(&mut dom, parent, &text);
            }
            Ok(Event::GeneralRef(e)) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                let resolved = resolve_entity(&entity)
                    .ok_or_else(|| format!("unknown entity &{entity};"))?;
                append_text(&mut dom, parent, &resolved);
            }
            Ok(Event::CData(e)) => {
                let raw = e.into_inner();
                append_text(&mut dom, parent, &String::from_utf8_lossy(&raw));
            }
            Ok(Event::Comment(e)) => {
                let comment = dom.create_comment(String::from_utf8_lossy(e.as_ref()).into_owned());
                dom.append(parent, comment);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "{} at position {}",
                    e,
                    reader.buffer_position()
                ));
            }
            _ => {}
        }
    }

    if stack.len() > 1 {
        return Err("unclosed element at end of document".to_string());
    }
    if dom.root_element().is_none() {
        return Err("document has no root element".to_string());
    }

    Ok(dom)
}

fn create_element(dom: &mut XmlDom, e: &BytesStart<'_>) -> Result<NodeId, String> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let id = dom.create_element(&name);

    let mut parsed = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| format!("bad attribute on <{name}>: {err}"))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = unescape_text(&raw)?.into_owned();
        parsed.push(Attribute { name: key, value });
    }

    if let Some(node) = dom.get_mut(id)
        && let XmlNodeData::Element { attrs, .. } = &mut node.data
    {
        *attrs = parsed;
    }
    Ok(id)
}

/// Merge with a preceding text sibling so one logical text run stays one node.
/// Text outside the root element is dropped.
fn append_text(dom: &mut XmlDom, parent: NodeId, text: &str) {
    if text.is_empty() || parent == dom.document() {
        return;
    }
    if let Some(last) = dom.last_child(parent)
        && let Some(node) = dom.get_mut(last)
        && let XmlNodeData::Text(existing) = &mut node.data
    {
        existing.push_str(text);
        return;
    }
    let node = dom.create_text(text);
    dom.append(parent, node);
}

fn unescape_text(raw: &str) -> Result<Cow<'_, str>, String> {
    if !raw.contains('&') {
        return Ok(Cow::Borrowed(raw));
    }
    quick_xml::escape::unescape(raw).map_err(|e| e.to_string())
}

/// Resolve an entity reference name (without `&` and `;`).
fn resolve_entity(entity: &str) -> Option<String> {
    let resolved = match entity {
        "apos" => "'",
        "quot" => "\"",
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            return char::from_u32(code).map(String::from);
        }
    };
    Some(resolved.to_string())
}
