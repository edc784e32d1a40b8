//! # richdoc
//!
//! Rewrites HTML rich-text fragments that a mail-merge engine left as literal
//! text inside DOCX and ODT documents into native word-processing markup.
//!
//! ## Features
//!
//! - Matches fragments even when the merge engine split them over several
//!   runs, spans or line breaks
//! - Bold, italic, underline, hyperlinks, lists, headings, tables and
//!   paragraph alignment in both WordprocessingML and ODF
//! - Only parts that changed are rewritten; everything else is copied as-is
//! - Optional title/subject/author/keywords metadata
//!
//! ## Quick Start
//!
//! ```no_run
//! use richdoc::{Metadata, RewriteOptions, RichTextLookup, rewrite_file};
//!
//! let lookup = RichTextLookup::from_values(["<p><strong>Hello</strong></p>"]);
//! let options = RewriteOptions::default().with_metadata(Metadata::new("Letter"));
//! let report = rewrite_file("merged.docx", &lookup, &options)?;
//! println!("{} fragment(s) converted", report.fragments_converted);
//! # Ok::<(), richdoc::Error>(())
//! ```
//!
//! ## Working with parts
//!
//! The part-level entry points are useful when the archive is handled
//! elsewhere:
//!
//! ```
//! use richdoc::RichTextLookup;
//! use richdoc::docx::{self, RelationshipRegistry};
//!
//! let lookup: RichTextLookup = ["<b>Ann</b>"].into_iter().collect();
//! let mut rels = RelationshipRegistry::new("word/document.xml");
//! let xml = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>&lt;b&gt;Ann&lt;/b&gt;</w:t></w:r></w:p></w:body></w:document>"#;
//! let out = docx::convert_part(xml, &lookup, &mut rels)?;
//! assert!(out.changed);
//! assert!(out.xml.contains("<w:b/>"));
//! # Ok::<(), richdoc::Error>(())
//! ```

pub mod blocks;
pub mod coalesce;
pub mod docx;
pub mod error;
pub mod html;
pub mod inline;
pub mod lookup;
pub mod metadata;
pub mod odt;
pub mod package;
pub mod xml;

pub use error::{Error, Result};
pub use lookup::RichTextLookup;
pub use metadata::Metadata;
pub use package::{
    DocumentFormat, PartRewrite, RewriteOptions, RewriteReport, SkippedPart, rewrite_archive,
    rewrite_bytes, rewrite_file,
};
