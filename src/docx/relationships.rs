//! Per-part relationship registry for hyperlink targets.

use std::collections::{HashMap, HashSet};

use crate::error::Error;
use crate::xml::{self, XmlDom, ns};

pub const HYPERLINK_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

/// Hyperlink relationships of one DOCX part.
///
/// Every part that can carry hyperlinks (document, headers, footers) has its
/// own `.rels` companion. The registry is loaded from that companion (or
/// starts as an empty skeleton), hands out one `rIdN` per distinct external
/// target, and is written back only when a relationship was added.
#[derive(Debug)]
pub struct RelationshipRegistry {
    part: String,
    dom: XmlDom,
    by_target: HashMap<String, String>,
    /// Numeric suffixes of every `rIdN` in use.
    taken: HashSet<u64>,
    next_index: u64,
    dirty: bool,
}

impl RelationshipRegistry {
    /// Empty registry for `part` (e.g. `word/document.xml`).
    pub fn new(part: &str) -> Self {
        let mut dom = XmlDom::new();
        dom.has_declaration = true;
        let root = dom.create_element_with("Relationships", &[("xmlns", ns::PACKAGE_RELS)]);
        let document = dom.document();
        dom.append(document, root);
        Self {
            part: part.to_string(),
            dom,
            by_target: HashMap::new(),
            taken: HashSet::new(),
            next_index: 1,
            dirty: false,
        }
    }

    /// Load the registry from the part's existing `.rels` bytes.
    ///
    /// A missing companion yields an empty registry. A malformed one is
    /// replaced by an empty skeleton and the error is returned alongside so
    /// the caller can report it.
    pub fn load(part: &str, rels: Option<&[u8]>) -> (Self, Option<Error>) {
        let Some(bytes) = rels else {
            return (Self::new(part), None);
        };
        let rels_part = rels_path_for(part);
        match xml::parse(&xml::decode_part(bytes)) {
            Ok(dom) => {
                let is_rels = dom
                    .root_element()
                    .is_some_and(|root| xml::local_name(dom.element_name(root).unwrap_or("")) == "Relationships");
                if !is_rels {
                    let err = Error::Relationships {
                        part: rels_part,
                        message: "root element is not Relationships".to_string(),
                    };
                    return (Self::new(part), Some(err));
                }
                (Self::from_dom(part, dom), None)
            }
            Err(message) => {
                let err = Error::Relationships {
                    part: rels_part,
                    message,
                };
                (Self::new(part), Some(err))
            }
        }
    }

    fn from_dom(part: &str, dom: XmlDom) -> Self {
        let mut by_target = HashMap::new();
        let mut taken = HashSet::new();
        let mut max_index = 0;
        if let Some(root) = dom.root_element() {
            for rel in dom.children(root) {
                let Some(id) = dom.attr(rel, "Id") else {
                    continue;
                };
                if let Some(index) = id_index(id) {
                    taken.insert(index);
                    max_index = max_index.max(index);
                }
                let is_external_link = dom.attr(rel, "Type") == Some(HYPERLINK_TYPE)
                    && dom.attr(rel, "TargetMode") == Some("External");
                if is_external_link && let Some(target) = dom.attr(rel, "Target") {
                    by_target
                        .entry(target.to_string())
                        .or_insert_with(|| id.to_string());
                }
            }
        }
        Self {
            part: part.to_string(),
            dom,
            by_target,
            taken,
            next_index: max_index.saturating_add(1),
            dirty: false,
        }
    }

    /// Never allocate an id the part already references.
    ///
    /// Guards against a malformed `.rels` that was replaced by a skeleton
    /// while the part still points at its old ids.
    pub fn reserve_ids_in(&mut self, part_dom: &XmlDom) {
        for id in part_dom.descendants(part_dom.document()) {
            for attr in part_dom.attrs(id) {
                if attr.name.starts_with("r:")
                    && let Some(index) = id_index(&attr.value)
                {
                    self.taken.insert(index);
                    self.next_index = self.next_index.max(index.saturating_add(1));
                }
            }
        }
    }

    /// Relationship id for an external hyperlink, allocating one if needed.
    pub fn hyperlink_id(&mut self, target: &str) -> String {
        if let Some(id) = self.by_target.get(target) {
            return id.clone();
        }
        let id = format!("rId{}", self.allocate_index());

        let rel = self.dom.create_element_with(
            "Relationship",
            &[
                ("Id", id.as_str()),
                ("Type", HYPERLINK_TYPE),
                ("Target", target),
                ("TargetMode", "External"),
            ],
        );
        if let Some(root) = self.dom.root_element() {
            self.dom.append(root, rel);
        }
        self.by_target.insert(target.to_string(), id.clone());
        self.dirty = true;
        id
    }

    /// Next free numeric suffix. Counting past the largest id only fails
    /// at the integer limit; from there the lowest unused suffix is taken.
    fn allocate_index(&mut self) -> u64 {
        let mut index = self.next_index;
        while self.taken.contains(&index) {
            index = index.checked_add(1).unwrap_or(1);
        }
        self.taken.insert(index);
        self.next_index = index.saturating_add(1);
        index
    }

    /// Target of a hyperlink relationship.
    pub fn target(&self, id: &str) -> Option<&str> {
        self.by_target
            .iter()
            .find(|(_, v)| v.as_str() == id)
            .map(|(k, _)| k.as_str())
    }

    /// Number of distinct hyperlink targets known.
    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    /// Whether a relationship was added since loading.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The part these relationships belong to.
    pub fn part(&self) -> &str {
        &self.part
    }

    /// Archive path of the companion `.rels` file.
    pub fn rels_path(&self) -> String {
        rels_path_for(&self.part)
    }

    pub fn to_xml(&self) -> String {
        xml::serialize(&self.dom)
    }
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`.
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

fn id_index(id: &str) -> Option<u64> {
    id.strip_prefix("rId")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://known.example" TargetMode="External"/></Relationships>"#;

    #[test]
    fn test_rels_path() {
        assert_eq!(rels_path_for("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_path_for("word/header2.xml"), "word/_rels/header2.xml.rels");
    }

    #[test]
    fn test_existing_targets_are_reused() {
        let (mut rels, err) = RelationshipRegistry::load("word/document.xml", Some(RELS.as_bytes()));
        assert!(err.is_none());
        assert_eq!(rels.hyperlink_id("https://known.example"), "rId7");
        assert!(!rels.is_dirty());
    }

    #[test]
    fn test_new_ids_follow_max_existing() {
        let (mut rels, _) = RelationshipRegistry::load("word/document.xml", Some(RELS.as_bytes()));
        let id = rels.hyperlink_id("https://new.example");
        assert_eq!(id, "rId8");
        assert_eq!(rels.hyperlink_id("https://new.example"), "rId8");
        assert!(rels.is_dirty());
        assert_eq!(rels.target("rId8"), Some("https://new.example"));
        let out = rels.to_xml();
        assert!(out.contains(r#"Id="rId8""#));
        assert!(out.contains(r#"Target="styles.xml""#));
        assert_eq!(out.matches("<Relationship ").count(), 3);
    }

    #[test]
    fn test_ids_at_the_integer_limit() {
        let rels = format!(
            r#"<Relationships xmlns="{}"><Relationship Id="rId4294967295" Type="t" Target="a.xml"/><Relationship Id="rId{}" Type="t" Target="b.xml"/><Relationship Id="rId1" Type="t" Target="c.xml"/></Relationships>"#,
            ns::PACKAGE_RELS,
            u64::MAX
        );
        let (mut rels, err) = RelationshipRegistry::load("word/document.xml", Some(rels.as_bytes()));
        assert!(err.is_none());
        assert_eq!(rels.hyperlink_id("https://a.example"), "rId2");
        assert_eq!(rels.hyperlink_id("https://b.example"), "rId3");
        assert_eq!(rels.hyperlink_id("https://a.example"), "rId2");
    }

    #[test]
    fn test_malformed_rels_is_replaced() {
        let (mut rels, err) =
            RelationshipRegistry::load("word/footer1.xml", Some(b"<Relationships><oops"));
        assert!(matches!(err, Some(Error::Relationships { .. })));
        assert_eq!(rels.hyperlink_id("https://a.example"), "rId1");
        assert!(rels.to_xml().starts_with("<?xml"));
    }

    #[test]
    fn test_reserve_ids_from_part() {
        let part = xml::parse(r#"<w:ftr xmlns:w="w" xmlns:r="r"><w:drawing r:embed="rId4"/></w:ftr>"#)
            .unwrap();
        let mut rels = RelationshipRegistry::new("word/footer1.xml");
        rels.reserve_ids_in(&part);
        assert_eq!(rels.hyperlink_id("https://a.example"), "rId5");
    }
}
