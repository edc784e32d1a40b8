//! Archive-level orchestration.
//!
//! Opens a merged DOCX or ODT package, rewrites the parts that can carry
//! merged fragments, flushes the relationship and style registries, applies
//! metadata, and repacks. Entries that did not change are raw-copied without
//! recompression. Failures scoped to one part are logged and reported; only
//! archive-level failures reach the caller.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use std::str::FromStr;

use log::{info, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::docx::{self, RelationshipRegistry};
use crate::error::{Error, Result};
use crate::lookup::RichTextLookup;
use crate::metadata::{self, Metadata};
use crate::odt::{self, StyleRegistry};
use crate::xml::{self, XmlDom};

const ODF_MIMETYPE_PREFIX: &[u8] = b"application/vnd.oasis.opendocument";
const DOCX_MAIN_PART: &str = "word/document.xml";
const ODT_PARTS: [&str; 2] = ["content.xml", "styles.xml"];

/// Outcome of rewriting one XML part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRewrite {
    pub changed: bool,
    pub xml: String,
    /// Number of fragments converted.
    pub fragments: usize,
}

impl PartRewrite {
    pub(crate) fn unchanged(xml: &str) -> Self {
        Self {
            changed: false,
            xml: xml.to_string(),
            fragments: 0,
        }
    }
}

/// Package flavour, selecting the markup backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Docx,
    Odt,
}

impl DocumentFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "docx" => Some(DocumentFormat::Docx),
            "odt" => Some(DocumentFormat::Odt),
            _ => None,
        }
    }

    /// Detect the format from an archive's entries.
    pub fn detect<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Self> {
        if let Some(mimetype) = read_entry(archive, "mimetype")?
            && mimetype.starts_with(ODF_MIMETYPE_PREFIX)
        {
            return Ok(DocumentFormat::Odt);
        }
        if archive.index_for_name(DOCX_MAIN_PART).is_some() {
            return Ok(DocumentFormat::Docx);
        }
        if archive.index_for_name("content.xml").is_some() {
            return Ok(DocumentFormat::Odt);
        }
        Err(Error::UnsupportedFormat(
            "archive has neither word/document.xml nor content.xml".to_string(),
        ))
    }

    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Docx => "docx",
            DocumentFormat::Odt => "odt",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DocumentFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "docx" => Ok(DocumentFormat::Docx),
            "odt" => Ok(DocumentFormat::Odt),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Settings for one rewrite.
#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    /// Force a backend instead of detecting it from the archive.
    pub format: Option<DocumentFormat>,
    /// Document properties to write, if any.
    pub metadata: Option<Metadata>,
    /// Deflate level for rewritten entries (default 6).
    pub compression_level: Option<i64>,
}

impl RewriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: DocumentFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_compression_level(mut self, level: i64) -> Self {
        self.compression_level = Some(level);
        self
    }
}

/// A part left untouched because of a recoverable error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPart {
    pub part: String,
    pub reason: String,
}

/// What a rewrite did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteReport {
    /// Whether any entry of the archive changed.
    pub changed: bool,
    pub format: DocumentFormat,
    /// Parts whose content was rewritten, in processing order.
    pub converted_parts: Vec<String>,
    pub skipped_parts: Vec<SkippedPart>,
    pub fragments_converted: usize,
}

impl RewriteReport {
    fn new(format: DocumentFormat) -> Self {
        Self {
            changed: false,
            format,
            converted_parts: Vec::new(),
            skipped_parts: Vec::new(),
            fragments_converted: 0,
        }
    }

    fn skip(&mut self, part: &str, error: &Error) {
        warn!("leaving {part} unchanged: {error}");
        self.skipped_parts.push(SkippedPart {
            part: part.to_string(),
            reason: error.to_string(),
        });
    }
}

/// New content for archive entries, keyed by entry name.
#[derive(Debug, Default)]
struct Staged {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Staged {
    fn put(&mut self, name: &str, xml: String) {
        self.entries.insert(name.to_string(), xml.into_bytes());
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rewrite a merged archive from `reader` into `writer`.
///
/// The output is always written, even when nothing changed; check
/// [`RewriteReport::changed`] to decide whether to keep it.
pub fn rewrite_archive<R, W>(
    reader: R,
    writer: W,
    lookup: &RichTextLookup,
    options: &RewriteOptions,
) -> Result<RewriteReport>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let mut archive = ZipArchive::new(reader)?;
    let (staged, report) = stage(&mut archive, lookup, options)?;
    repack(&mut archive, &staged, writer, options)?;
    Ok(report)
}

/// Rewrite an in-memory archive. Unchanged archives are returned as-is.
pub fn rewrite_bytes(
    data: &[u8],
    lookup: &RichTextLookup,
    options: &RewriteOptions,
) -> Result<(Vec<u8>, RewriteReport)> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let (staged, report) = stage(&mut archive, lookup, options)?;
    if !report.changed {
        return Ok((data.to_vec(), report));
    }
    let mut out = Cursor::new(Vec::with_capacity(data.len()));
    repack(&mut archive, &staged, &mut out, options)?;
    Ok((out.into_inner(), report))
}

/// Rewrite a document file in place.
///
/// The file is only written when something changed, and only after the new
/// archive has been built completely in memory.
pub fn rewrite_file(
    path: impl AsRef<Path>,
    lookup: &RichTextLookup,
    options: &RewriteOptions,
) -> Result<RewriteReport> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let (out, report) = rewrite_bytes(&data, lookup, options)?;
    if report.changed {
        std::fs::write(path, out)?;
        info!("rewrote {}", path.display());
    }
    Ok(report)
}

fn stage<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    lookup: &RichTextLookup,
    options: &RewriteOptions,
) -> Result<(Staged, RewriteReport)> {
    let format = match options.format {
        Some(format) => format,
        None => DocumentFormat::detect(archive)?,
    };
    let mut report = RewriteReport::new(format);
    let mut staged = Staged::default();

    match format {
        DocumentFormat::Docx => stage_docx(archive, lookup, &mut staged, &mut report)?,
        DocumentFormat::Odt => stage_odt(archive, lookup, &mut staged, &mut report)?,
    }
    if let Some(metadata) = options.metadata.as_ref().filter(|m| !m.is_empty()) {
        stage_metadata(archive, format, metadata, &mut staged, &mut report)?;
    }

    report.changed = !staged.is_empty();
    info!(
        "{}: {} fragment(s) converted in {} part(s), {} part(s) skipped",
        format,
        report.fragments_converted,
        report.converted_parts.len(),
        report.skipped_parts.len()
    );
    Ok((staged, report))
}

/// Entry names in archive order.
fn entry_names<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index_raw(i)?.name().to_string());
    }
    Ok(names)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<Vec<u8>>> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            Ok(Some(contents))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Document body, headers and footers.
fn is_docx_story(name: &str) -> bool {
    let Some(file) = name.strip_prefix("word/") else {
        return false;
    };
    if file.contains('/') || !file.ends_with(".xml") {
        return false;
    }
    file == "document.xml" || file.starts_with("header") || file.starts_with("footer")
}

fn stage_docx<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    lookup: &RichTextLookup,
    staged: &mut Staged,
    report: &mut RewriteReport,
) -> Result<()> {
    let parts: Vec<String> = entry_names(archive)?
        .into_iter()
        .filter(|name| is_docx_story(name))
        .collect();
    if !parts.iter().any(|p| p == DOCX_MAIN_PART) {
        report.skip(DOCX_MAIN_PART, &Error::PartMissing(DOCX_MAIN_PART.to_string()));
    }

    for part in parts {
        let Some(bytes) = read_entry(archive, &part)? else {
            continue;
        };
        let mut dom = match xml::parse_part(&part, &bytes) {
            Ok(dom) => dom,
            Err(e) => {
                report.skip(&part, &e);
                continue;
            }
        };
        let rels_bytes = read_entry(archive, &docx::rels_path_for(&part))?;
        let (mut rels, rels_error) = RelationshipRegistry::load(&part, rels_bytes.as_deref());
        if let Some(e) = &rels_error {
            report.skip(&rels.rels_path(), e);
        }

        let fragments = docx::convert_dom(&mut dom, lookup, &mut rels);
        if fragments == 0 {
            continue;
        }
        info!("{part}: converted {fragments} fragment(s)");
        staged.put(&part, xml::serialize(&dom));
        if rels.is_dirty() {
            staged.put(&rels.rels_path(), rels.to_xml());
        }
        report.converted_parts.push(part);
        report.fragments_converted += fragments;
    }
    Ok(())
}

fn stage_odt<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    lookup: &RichTextLookup,
    staged: &mut Staged,
    report: &mut RewriteReport,
) -> Result<()> {
    let mut styles = StyleRegistry::new();
    let mut changed: Vec<(&str, XmlDom, usize)> = Vec::new();

    for part in ODT_PARTS {
        let Some(bytes) = read_entry(archive, part)? else {
            if part == "content.xml" {
                report.skip(part, &Error::PartMissing(part.to_string()));
            }
            continue;
        };
        let mut dom = match xml::parse_part(part, &bytes) {
            Ok(dom) => dom,
            Err(e) => {
                report.skip(part, &e);
                continue;
            }
        };
        let fragments = odt::convert_dom(&mut dom, lookup, &mut styles);
        if fragments > 0 {
            changed.push((part, dom, fragments));
        }
    }

    // A style first needed by a later part is still declared in every part.
    for (part, mut dom, fragments) in changed {
        styles.inject(&mut dom);
        info!("{part}: converted {fragments} fragment(s)");
        staged.put(part, xml::serialize(&dom));
        report.converted_parts.push(part.to_string());
        report.fragments_converted += fragments;
    }
    Ok(())
}

fn stage_metadata<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    format: DocumentFormat,
    metadata: &Metadata,
    staged: &mut Staged,
    report: &mut RewriteReport,
) -> Result<()> {
    let part = match format {
        DocumentFormat::Docx => metadata::DOCX_CORE_PART,
        DocumentFormat::Odt => metadata::ODT_META_PART,
    };
    let Some(bytes) = read_entry(archive, part)? else {
        report.skip(part, &Error::PartMissing(part.to_string()));
        return Ok(());
    };
    let source = xml::decode_part(&bytes);
    let result = match format {
        DocumentFormat::Docx => metadata::apply_docx_metadata(&source, metadata),
        DocumentFormat::Odt => metadata::apply_odt_metadata(&source, metadata),
    };
    match result {
        Ok(xml) if xml.as_bytes() != bytes.as_slice() => {
            staged.put(part, xml);
            report.converted_parts.push(part.to_string());
        }
        Ok(_) => {}
        Err(e) => report.skip(part, &e),
    }
    Ok(())
}

/// Write the archive with staged entries replaced or appended.
fn repack<R, W>(
    archive: &mut ZipArchive<R>,
    staged: &Staged,
    writer: W,
    options: &RewriteOptions,
) -> Result<()>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let deflated = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(options.compression_level.unwrap_or(6)));
    let mut zip = ZipWriter::new(writer);
    let mut written = HashSet::new();

    for i in 0..archive.len() {
        let file = archive.by_index_raw(i)?;
        let name = file.name().to_string();
        match staged.entries.get(&name) {
            Some(data) => {
                zip.start_file(name.as_str(), deflated)?;
                zip.write_all(data)?;
            }
            None => zip.raw_copy_file(file)?,
        }
        written.insert(name);
    }
    for (name, data) in &staged.entries {
        if written.contains(name) {
            continue;
        }
        zip.start_file(name.as_str(), deflated)?;
        zip.write_all(data)?;
    }
    zip.finish()?;
    Ok(())
}
