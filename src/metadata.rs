//! Document properties written into `docProps/core.xml` and `meta.xml`.

use crate::error::{Error, Result};
use crate::xml::{self, NodeId, XmlDom, ns};

/// Archive path of the DOCX core properties part.
pub const DOCX_CORE_PART: &str = "docProps/core.xml";
/// Archive path of the ODF metadata part.
pub const ODT_META_PART: &str = "meta.xml";

/// Title, subject, author and keywords to stamp on a generated document.
///
/// Only the fields that are set are written; everything else already in the
/// part is left as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub author: Option<String>,
    pub keywords: Vec<String>,
}

impl Metadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.subject.is_none()
            && self.author.is_none()
            && self.keywords.is_empty()
    }
}

/// Write metadata into a DOCX `cp:coreProperties` part.
///
/// Keywords are stored as one comma-separated `cp:keywords` value.
pub fn apply_docx_metadata(part_xml: &str, metadata: &Metadata) -> Result<String> {
    let mut dom = xml::parse(part_xml).map_err(|e| Error::xml(DOCX_CORE_PART, e))?;
    let root = dom
        .root_element()
        .ok_or_else(|| Error::xml(DOCX_CORE_PART, "missing root element"))?;

    if let Some(title) = &metadata.title {
        set_property(&mut dom, root, "dc:title", title);
    }
    if let Some(subject) = &metadata.subject {
        set_property(&mut dom, root, "dc:subject", subject);
    }
    if let Some(author) = &metadata.author {
        set_property(&mut dom, root, "dc:creator", author);
    }
    if !metadata.keywords.is_empty() {
        set_property(&mut dom, root, "cp:keywords", &metadata.keywords.join(", "));
    }

    xml::ensure_namespace(&mut dom, "cp", ns::CP);
    xml::ensure_namespace(&mut dom, "dc", ns::DC);
    Ok(xml::serialize(&dom))
}

/// Write metadata into an ODF `meta.xml` part.
///
/// Existing `meta:keyword` elements are replaced, one element per keyword.
pub fn apply_odt_metadata(part_xml: &str, metadata: &Metadata) -> Result<String> {
    let mut dom = xml::parse(part_xml).map_err(|e| Error::xml(ODT_META_PART, e))?;
    let root = dom
        .root_element()
        .ok_or_else(|| Error::xml(ODT_META_PART, "missing root element"))?;
    let meta = match dom.first_child_element(root, "office:meta") {
        Some(meta) => meta,
        None => {
            let meta = dom.create_element("office:meta");
            dom.append(root, meta);
            meta
        }
    };

    if let Some(title) = &metadata.title {
        set_property(&mut dom, meta, "dc:title", title);
    }
    if let Some(subject) = &metadata.subject {
        set_property(&mut dom, meta, "dc:subject", subject);
    }
    if let Some(author) = &metadata.author {
        set_property(&mut dom, meta, "meta:initial-creator", author);
        set_property(&mut dom, meta, "dc:creator", author);
    }
    if !metadata.keywords.is_empty() {
        let existing: Vec<NodeId> = dom.child_elements(meta, "meta:keyword").collect();
        for keyword in existing {
            dom.detach(keyword);
        }
        for keyword in &metadata.keywords {
            let element = dom.create_element("meta:keyword");
            let text = dom.create_text(keyword.as_str());
            dom.append(element, text);
            dom.append(meta, element);
        }
    }

    xml::ensure_namespace(&mut dom, "office", ns::OFFICE);
    xml::ensure_namespace(&mut dom, "meta", ns::META);
    xml::ensure_namespace(&mut dom, "dc", ns::DC);
    Ok(xml::serialize(&dom))
}

/// Update the first `name` child of `parent` in place, or append one.
fn set_property(dom: &mut XmlDom, parent: NodeId, name: &str, value: &str) {
    let element = match dom.first_child_element(parent, name) {
        Some(element) => element,
        None => {
            let element = dom.create_element(name);
            dom.append(parent, element);
            element
        }
    };
    dom.replace_text_content(element, value);
}
