mod common;

use std::io::Cursor;

use richdoc::xml::{self, XmlDom};
use richdoc::{DocumentFormat, Error, Metadata, RewriteOptions, RichTextLookup};
use tempfile::NamedTempFile;

use common::{docx, docx_paragraph, docx_with, read_entry, W_NS};

fn rewrite(data: &[u8], fragments: &[&str]) -> (Vec<u8>, richdoc::RewriteReport) {
    let lookup: RichTextLookup = fragments.iter().copied().collect();
    richdoc::rewrite_bytes(data, &lookup, &RewriteOptions::default()).unwrap()
}

fn document(data: &[u8]) -> String {
    read_entry(data, "word/document.xml").unwrap()
}

fn body_children(dom: &XmlDom) -> Vec<String> {
    let body = dom.find_all(dom.document(), "w:body")[0];
    dom.children(body)
        .filter_map(|c| dom.element_name(c))
        .map(str::to_string)
        .collect()
}

#[test]
fn test_table_becomes_sibling_of_paragraph() {
    let fragment = "<p>Before</p><table><tr><td>Cell</td></tr></table>";
    let (out, report) = rewrite(&docx(&docx_paragraph(fragment)), &[fragment]);
    assert!(report.changed);
    assert_eq!(report.converted_parts, vec!["word/document.xml"]);

    let xml = document(&out);
    let dom = xml::parse(&xml).unwrap();
    assert_eq!(body_children(&dom), vec!["w:p", "w:tbl", "w:sectPr"]);
    let first = dom.find_all(dom.document(), "w:p")[0];
    assert_eq!(dom.text_content(first), "Before");
    assert_eq!(dom.find_all(dom.document(), "w:tbl").len(), 1);
    assert!(!xml.contains("<w:br/><w:tbl"));
}

#[test]
fn test_hyperlink_resolves_through_rels() {
    let fragment = r#"<a href="https://example.com">Link</a>"#;
    let (out, _) = rewrite(&docx(&docx_paragraph(fragment)), &[fragment]);

    let dom = xml::parse(&document(&out)).unwrap();
    let links = dom.find_all(dom.document(), "w:hyperlink");
    assert_eq!(links.len(), 1);
    let id = dom.attr(links[0], "r:id").unwrap().to_string();

    let rels = read_entry(&out, "word/_rels/document.xml.rels").unwrap();
    let rels = xml::parse(&rels).unwrap();
    let target = rels
        .find_all(rels.document(), "Relationship")
        .into_iter()
        .find(|&r| rels.attr(r, "Id") == Some(id.as_str()))
        .and_then(|r| rels.attr(r, "Target"));
    assert_eq!(target, Some("https://example.com"));
}

#[test]
fn test_repeated_link_target_shares_one_relationship() {
    let fragment = r#"<a href="https://example.com">Link</a>"#;
    let body = format!("{}{}", docx_paragraph(fragment), docx_paragraph(fragment));
    let (out, report) = rewrite(&docx(&body), &[fragment]);
    assert_eq!(report.fragments_converted, 2);

    let dom = xml::parse(&document(&out)).unwrap();
    let ids: Vec<_> = dom
        .find_all(dom.document(), "w:hyperlink")
        .into_iter()
        .filter_map(|l| dom.attr(l, "r:id"))
        .collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], ids[1]);

    let rels = read_entry(&out, "word/_rels/document.xml.rels").unwrap();
    assert_eq!(rels.matches(r#"Target="https://example.com""#).count(), 1);
    // The existing styles relationship keeps rId1.
    assert!(rels.contains(r#"Id="rId1""#));
    assert!(rels.contains(r#"Id="rId2""#));
}

#[test]
fn test_malformed_fragment_keeps_text() {
    let fragment = "<p>Unclosed<strong>";
    let (out, report) = rewrite(&docx(&docx_paragraph(fragment)), &[fragment]);
    assert!(report.changed);
    let xml = document(&out);
    assert!(xml.contains("Unclosed"));
    assert!(!xml.contains("&lt;strong"));
    assert!(xml::parse(&xml).is_ok());
}

#[test]
fn test_no_raw_html_survives() {
    let fragments = [
        "<strong>bold</strong>",
        "<table><tr><td>t</td></tr></table>",
        "<ul><li>item</li></ul>",
        r#"<a href="https://example.org">x</a>"#,
        "<h2>Title</h2>",
        r#"<p style="text-align:center">centered</p>"#,
    ];
    let body: String = fragments.iter().map(|f| docx_paragraph(f)).collect();
    let (out, report) = rewrite(&docx(&body), &fragments);
    assert_eq!(report.fragments_converted, fragments.len());

    let xml = document(&out);
    for raw in ["&lt;strong", "&lt;table", "&lt;ul", "&lt;a href", "&lt;h2", "&lt;p"] {
        assert!(!xml.contains(raw), "{raw} survived");
    }
    assert!(xml.contains(r#"<w:jc w:val="center"/>"#));
}

#[test]
fn test_text_is_preserved() {
    let fragment = "<p>\u{645}\u{631}\u{62d}\u{628}\u{627} \u{1F600} &amp; caf\u{e9}</p>";
    let (out, _) = rewrite(&docx(&docx_paragraph(fragment)), &[fragment]);
    let dom = xml::parse(&document(&out)).unwrap();
    let text = dom.text_content(dom.document());
    assert!(text.contains("\u{645}\u{631}\u{62d}\u{628}\u{627} \u{1F600} & caf\u{e9}"));
}

#[test]
fn test_second_pass_changes_nothing() {
    let fragments = [r#"<p><a href="https://example.com">a</a></p>"#, "<b>b</b>"];
    let body: String = fragments.iter().map(|f| docx_paragraph(f)).collect();
    let (once, _) = rewrite(&docx(&body), &fragments);
    let (twice, report) = rewrite(&once, &fragments);
    assert!(!report.changed);
    assert_eq!(once, twice);
}

#[test]
fn test_header_gets_its_own_relationships() {
    let fragment = r#"<a href="https://example.com/h">home</a>"#;
    let header = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:hdr xmlns:w="{W_NS}">{}</w:hdr>"#,
        docx_paragraph(fragment)
    );
    let data = docx_with("", &[("word/header1.xml", header)]);
    let (out, report) = rewrite(&data, &[fragment]);
    assert_eq!(report.converted_parts, vec!["word/header1.xml"]);

    let rels = read_entry(&out, "word/_rels/header1.xml.rels").unwrap();
    assert!(rels.contains(r#"Target="https://example.com/h""#));
    assert!(rels.contains(r#"Id="rId1""#));
    let header = read_entry(&out, "word/header1.xml").unwrap();
    assert!(header.contains(r#"<w:hyperlink r:id="rId1""#));
    // The document's relationships are untouched.
    assert_eq!(
        read_entry(&out, "word/_rels/document.xml.rels"),
        read_entry(&data, "word/_rels/document.xml.rels")
    );
}

#[test]
fn test_malformed_part_is_skipped() {
    let fragment = "<b>x</b>";
    let broken = format!(r#"<w:ftr xmlns:w="{W_NS}"><w:p>"#);
    let data = docx_with(&docx_paragraph(fragment), &[("word/footer1.xml", broken.clone())]);
    let (out, report) = rewrite(&data, &[fragment]);

    assert!(report.changed);
    assert_eq!(report.skipped_parts.len(), 1);
    assert_eq!(report.skipped_parts[0].part, "word/footer1.xml");
    assert_eq!(read_entry(&out, "word/footer1.xml").unwrap(), broken);
    assert!(document(&out).contains("<w:b/>"));
}

#[test]
fn test_metadata_is_written() {
    let options = RewriteOptions::default().with_metadata(
        Metadata::new("Report")
            .with_author("Ann")
            .with_keywords(["q3", "sales"]),
    );
    let (out, report) =
        richdoc::rewrite_bytes(&docx(""), &RichTextLookup::new(), &options).unwrap();
    assert!(report.changed);
    let core = read_entry(&out, "docProps/core.xml").unwrap();
    assert!(core.contains("<dc:title>Report</dc:title>"));
    assert!(core.contains("<dc:creator>Ann</dc:creator>"));
    assert!(core.contains("<cp:keywords>q3, sales</cp:keywords>"));
}

#[test]
fn test_rewrite_archive_streams_between_handles() {
    let fragment = "<i>it</i>";
    let data = docx(&docx_paragraph(fragment));
    let lookup: RichTextLookup = [fragment].into_iter().collect();
    let mut out = Cursor::new(Vec::new());
    let report = richdoc::rewrite_archive(
        Cursor::new(&data),
        &mut out,
        &lookup,
        &RewriteOptions::default().with_format(DocumentFormat::Docx),
    )
    .unwrap();
    assert!(report.changed);
    assert!(document(out.get_ref()).contains("<w:i/>"));
    assert_eq!(common::entry_names(out.get_ref()), common::entry_names(&data));
}

#[test]
fn test_rewrite_file_in_place() {
    let fragment = "<u>under</u>";
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), docx(&docx_paragraph(fragment))).unwrap();

    let lookup: RichTextLookup = [fragment].into_iter().collect();
    let report = richdoc::rewrite_file(file.path(), &lookup, &RewriteOptions::default()).unwrap();
    assert!(report.changed);
    let data = std::fs::read(file.path()).unwrap();
    assert!(document(&data).contains(r#"<w:u w:val="single"/>"#));

    // Nothing left to convert: the file is not rewritten.
    let report = richdoc::rewrite_file(file.path(), &lookup, &RewriteOptions::default()).unwrap();
    assert!(!report.changed);
    assert_eq!(std::fs::read(file.path()).unwrap(), data);
}

#[test]
fn test_unknown_archive_is_rejected() {
    let data = common::zip_entries(&[("notes.txt", "hello".to_string())]);
    let err = richdoc::rewrite_bytes(&data, &RichTextLookup::new(), &RewriteOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(_)));
}

#[test]
fn test_garbled_encoding_declaration_is_tolerated() {
    let fragment = "<b>bold</b>";
    let source = common::document_xml(&docx_paragraph(fragment));
    let (_, root) = source.split_once('\n').unwrap();
    let mut part = b"<?xml version=\"1.0\" encoding=\xff\"x\"?>\n".to_vec();
    part.extend_from_slice(root.as_bytes());
    let rels = format!(r#"<Relationships xmlns="{}"/>"#, xml::ns::PACKAGE_RELS);
    let data = common::docx_from_parts(&part, rels.as_bytes());

    let (out, report) = rewrite(&data, &[fragment]);
    assert!(report.skipped_parts.is_empty());
    assert_eq!(report.fragments_converted, 1);
    assert!(document(&out).contains("<w:b/>"));
}

#[test]
fn test_list_start_at_the_integer_limit() {
    let fragment = format!(r#"<ol start="{}"><li>a</li><li>b</li></ol>"#, i64::MAX);
    let (out, report) = rewrite(&docx(&docx_paragraph(&fragment)), &[fragment.as_str()]);
    assert_eq!(report.fragments_converted, 1);
    let xml = document(&out);
    assert!(xml.contains(&format!("{}. a", i64::MAX)));
    assert!(xml.contains(&format!("{}. b", i64::MAX)));
}

#[test]
fn test_hyperlink_after_largest_relationship_id() {
    let fragment = r#"<a href="https://example.com/big">big</a>"#;
    let rels = format!(
        r#"<Relationships xmlns="{}"><Relationship Id="rId4294967295" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#,
        xml::ns::PACKAGE_RELS
    );
    let body = common::document_xml(&docx_paragraph(fragment));
    let data = common::docx_from_parts(body.as_bytes(), rels.as_bytes());

    let (out, report) = rewrite(&data, &[fragment]);
    assert!(report.skipped_parts.is_empty());
    assert!(document(&out).contains(r#"<w:hyperlink r:id="rId4294967296""#));
    let rels = read_entry(&out, "word/_rels/document.xml.rels").unwrap();
    assert!(rels.contains(r#"Id="rId4294967296""#));
    assert!(rels.contains(r#"Target="https://example.com/big""#));
}

#[test]
fn test_footnote_reference_next_to_fragment_is_kept() {
    let fragment = "<b>x</b>";
    let paragraph = format!(
        r#"<w:p><w:r><w:footnoteReference w:id="1"/><w:t xml:space="preserve">Lead {}</w:t></w:r></w:p>"#,
        common::escape(fragment)
    );
    let (out, report) = rewrite(&docx(&paragraph), &[fragment]);
    assert!(report.changed);
    let xml = document(&out);
    assert!(xml.contains(r#"<w:footnoteReference w:id="1"/><w:t xml:space="preserve">Lead </w:t>"#));
    assert!(xml.contains("<w:b/>"));
    assert!(!xml.contains("&lt;b&gt;"));
}

#[test]
fn test_unterminated_comment_keeps_fragment_text() {
    let fragment = "<b>Visible</b> <!-- never closed";
    let (out, report) = rewrite(&docx(&docx_paragraph(fragment)), &[fragment]);
    assert_eq!(report.fragments_converted, 1);
    let dom = xml::parse(&document(&out)).unwrap();
    let text = dom.text_content(dom.document());
    assert!(text.contains("Visible"));
    assert!(text.contains("never closed"));
}
