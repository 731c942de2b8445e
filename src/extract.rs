//! Extension-keyed text extraction.
//!
//! [`ExtractorRegistry`] maps a lowercase file extension to an [`Extractor`].
//! The registry is built once at startup and shared read-only by all workers.
//! Extractors report failures as [`ExtractionError`] values and never panic
//! on malformed input.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::error::ExtractionError;
use crate::models::{ExtractedContent, ExtractionResult};

/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Something that turns a file on disk into text plus structural counts.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> ExtractionResult;
}

impl<F> Extractor for F
where
    F: Fn(&Path) -> ExtractionResult + Send + Sync,
{
    fn extract(&self, path: &Path) -> ExtractionResult {
        self(path)
    }
}

#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
    max_bytes: Option<u64>,
}

impl ExtractorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in PDF, plain text, Markdown and DOCX extractors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("pdf", extract_pdf);
        registry.register("txt", extract_plain_text);
        registry.register("md", extract_plain_text);
        registry.register("docx", extract_docx);
        registry
    }

    /// Reject files above `limit` bytes before any extractor runs.
    pub fn with_max_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_bytes = limit;
        self
    }

    /// Register (or replace) the extractor for an extension. A leading dot
    /// and letter case are ignored.
    pub fn register(&mut self, extension: &str, extractor: impl Extractor + 'static) {
        self.extractors
            .insert(normalize_extension(extension), Arc::new(extractor));
    }

    pub fn get(&self, extension: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(&normalize_extension(extension)).cloned()
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.extractors.contains_key(&normalize_extension(extension))
    }

    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.extractors.keys().cloned().collect();
        exts.sort();
        exts
    }

    /// Run the extractor registered for `extension` on `path`.
    pub fn extract(&self, extension: &str, path: &Path) -> ExtractionResult {
        let extractor = self
            .get(extension)
            .ok_or_else(|| ExtractionError::Unsupported(extension.to_string()))?;
        if let Some(limit) = self.max_bytes {
            let size = std::fs::metadata(path)?.len();
            if size > limit {
                return Err(ExtractionError::TooLarge { size, limit });
            }
        }
        extractor.extract(path)
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_lowercase()
}

/// PDF text via `pdf-extract`, page count and `Info` dictionary via `lopdf`.
pub fn extract_pdf(path: &Path) -> ExtractionResult {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(ExtractionError::Pdf("empty file".to_string()));
    }

    let doc = lopdf::Document::load_mem(&bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))?;
    let unit_count = doc.get_pages().len() as u32;
    let properties = pdf_info(&doc);

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| ExtractionError::Pdf(e.to_string()))?;

    Ok(ExtractedContent {
        text,
        unit_count,
        byte_size: bytes.len() as u64,
        line_count: None,
        properties,
    })
}

fn pdf_info(doc: &lopdf::Document) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    let info = doc
        .trailer
        .get(b"Info")
        .and_then(|obj| obj.as_reference())
        .and_then(|id| doc.get_dictionary(id));
    let Ok(info) = info else {
        return props;
    };
    for (key, value) in info.iter() {
        if let Ok(s) = value.as_str() {
            props.insert(
                String::from_utf8_lossy(key).to_string(),
                String::from_utf8_lossy(s).trim().to_string(),
            );
        }
    }
    props
}

/// UTF-8 text, with invalid sequences replaced rather than rejected.
pub fn extract_plain_text(path: &Path) -> ExtractionResult {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let line_count = text.matches('\n').count() + 1;
    Ok(ExtractedContent {
        text,
        unit_count: 1,
        byte_size: bytes.len() as u64,
        line_count: Some(line_count),
        properties: BTreeMap::new(),
    })
}

/// Text of the `<w:t>` runs in `word/document.xml`.
pub fn extract_docx(path: &Path) -> ExtractionResult {
    let bytes = std::fs::read(path)?;
    let docx_err = |e: String| ExtractionError::Docx(e);

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice()))
        .map_err(|e| docx_err(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| docx_err(e.to_string()))?;
    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| docx_err(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(docx_err("word/document.xml exceeds size limit".to_string()));
    }

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                in_text = true;
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(docx_err(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    let text = paragraphs.join("\n");
    Ok(ExtractedContent {
        line_count: Some(paragraphs.len()),
        text,
        unit_count: 1,
        byte_size: bytes.len() as u64,
        properties: BTreeMap::new(),
    })
}
