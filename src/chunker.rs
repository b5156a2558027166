//! Markdown chunking along `##` section boundaries
//!
//! Each chunk is self-describing when shown out of context: the content is
//! prefixed with a provenance header naming the source file and the document
//! title. Malformed markdown never fails here; a document without headings
//! degrades to a single whole-document chunk.

use lazy_static::lazy_static;
use regex::Regex;

pub type Metadata = serde_json::Map<String, serde_json::Value>;

lazy_static! {
    static ref DOC_TITLE_RE: Regex = Regex::new(r"(?m)^#\s+(.+)$").unwrap();
    static ref SECTION_HEADING_RE: Regex = Regex::new(r"(?m)^##\s+(.+)$").unwrap();
    static ref SECTION_SPLIT_RE: Regex = Regex::new(r"(?m)^##\s").unwrap();
}

/// One retrieval unit produced by chunking, before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct DocChunk {
    pub content: String,
    pub metadata: Metadata,
}

/// Split a markdown document into section chunks.
///
/// The document title comes from the first `#` heading, falling back to the
/// filename. The body is split before each `##` heading; leading text with
/// no heading of its own becomes an "Introduction" section. A document with
/// no `##` headings is one chunk. An empty (after trim) document yields no
/// chunks at all.
pub fn chunk_markdown(content: &str, filename: &str) -> Vec<DocChunk> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let doc_title = DOC_TITLE_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| filename.to_string());

    let mut chunks = Vec::new();

    for section in split_sections(content) {
        let section = section.trim();
        if section.is_empty() {
            continue;
        }

        let section_title = SECTION_HEADING_RE
            .captures(section)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .unwrap_or("Introduction");

        let mut metadata = Metadata::new();
        metadata.insert("source_file".into(), filename.into());
        metadata.insert("section_title".into(), section_title.into());

        chunks.push(DocChunk {
            content: format!("[From: {filename}]\n# {doc_title}\n\n{section}"),
            metadata,
        });
    }

    chunks
}

/// Split at each `##` heading, keeping the heading with its section.
///
/// The document title line is dropped from the leading segment: it is
/// re-synthesized into every chunk's provenance header, so a document whose
/// only preamble is its `#` title contributes no "Introduction" chunk.
fn split_sections(content: &str) -> Vec<String> {
    let starts: Vec<usize> = SECTION_SPLIT_RE.find_iter(content).map(|m| m.start()).collect();
    if starts.is_empty() {
        return vec![content.to_string()];
    }

    let lead = DOC_TITLE_RE.replace(&content[..starts[0]], "").into_owned();

    let mut sections = Vec::with_capacity(starts.len() + 1);
    sections.push(lead);
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(content.len());
        sections.push(content[start..end].to_string());
    }
    sections
}
