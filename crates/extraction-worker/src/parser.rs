//! Document parsing (phase a)
//!
//! Turns a source document into page-addressable text chunks. PDFs are
//! extracted per page with lopdf; plain-text documents are split into
//! page-sized chunks. Oversized pages are sub-chunked so no single
//! inference call gets an unbounded payload.

use crate::errors::ExtractionError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::{debug, warn};

/// One page-addressable chunk of document text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageChunk {
    /// 1-based source page number
    pub page: i32,
    /// Position of this chunk within the document
    pub index: i32,
    pub content: String,
}

/// Parse a document into page chunks
pub fn parse_document(path: &Path, chunk_size: usize) -> Result<Vec<PageChunk>, ExtractionError> {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let pages = match extension.as_str() {
        "pdf" => parse_pdf(path, &name)?,
        "txt" | "md" | "text" => parse_plain_text(path, &name, chunk_size)?,
        _ => return Err(ExtractionError::UnsupportedFormat { name }),
    };

    let chunks = chunk_pages(pages, chunk_size);
    if chunks.is_empty() {
        return Err(ExtractionError::EmptyDocument { name });
    }

    debug!(document = %name, chunk_count = chunks.len(), "Document parsed");
    Ok(chunks)
}

/// Extract per-page text from a PDF
fn parse_pdf(path: &Path, name: &str) -> Result<Vec<(i32, String)>, ExtractionError> {
    let doc = lopdf::Document::load(path).map_err(|e| ExtractionError::ParseError {
        name: name.to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    let mut pages = Vec::new();

    for (index, page_id) in doc.page_iter().enumerate() {
        let page_number = (index + 1) as i32;
        match doc.get_page_content(page_id) {
            Ok(content) => {
                let text = clean_text(&text_from_content_stream(&content));
                if !text.is_empty() {
                    pages.push((page_number, text));
                }
            }
            Err(e) => {
                warn!(page = page_number, error = %e, "Failed to read page content, skipping");
            }
        }
    }

    Ok(pages)
}

/// Treat a plain-text document as a sequence of page-sized chunks
fn parse_plain_text(
    path: &Path,
    name: &str,
    chunk_size: usize,
) -> Result<Vec<(i32, String)>, ExtractionError> {
    let text = std::fs::read_to_string(path).map_err(|e| ExtractionError::ParseError {
        name: name.to_string(),
        message: format!("Failed to read text file: {}", e),
    })?;

    let splitter = TextSplitter::new(ChunkConfig::new(chunk_size));
    Ok(splitter
        .chunks(&text)
        .enumerate()
        .map(|(i, chunk)| ((i + 1) as i32, clean_text(chunk)))
        .filter(|(_, text)| !text.is_empty())
        .collect())
}

/// Sub-chunk any page longer than `chunk_size`, keeping its page number
fn chunk_pages(pages: Vec<(i32, String)>, chunk_size: usize) -> Vec<PageChunk> {
    let splitter = TextSplitter::new(ChunkConfig::new(chunk_size));
    let mut chunks = Vec::new();
    let mut index = 0;

    for (page, text) in pages {
        if text.len() <= chunk_size {
            chunks.push(PageChunk { page, index, content: text });
            index += 1;
            continue;
        }
        for piece in splitter.chunks(&text) {
            chunks.push(PageChunk {
                page,
                index,
                content: piece.to_string(),
            });
            index += 1;
        }
    }

    chunks
}

/// Pull text-showing operators (Tj, TJ, ', ") out of a PDF content stream
fn text_from_content_stream(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;

    for line in content_str.lines() {
        let trimmed = line.trim();
        match trimmed {
            "BT" => in_text_block = true,
            "ET" => {
                in_text_block = false;
                if !text.ends_with(' ') {
                    text.push(' ');
                }
            }
            _ if in_text_block => {
                if let Some(shown) = text_from_operator(trimmed) {
                    text.push_str(&shown);
                }
            }
            _ => {}
        }
    }

    text
}

fn text_from_operator(line: &str) -> Option<String> {
    let is_show = line.ends_with("Tj")
        || line.ends_with("TJ")
        || line.ends_with('\'')
        || line.ends_with('"');
    if !is_show {
        return None;
    }

    // Collect every (...) literal; covers both single strings and TJ arrays
    let mut result = String::new();
    let mut current = String::new();
    let mut in_paren = false;
    let mut escaped = false;

    for ch in line.chars() {
        if escaped {
            current.push(match ch {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_paren => escaped = true,
            '(' if !in_paren => in_paren = true,
            ')' if in_paren => {
                in_paren = false;
                result.push_str(&current);
                current.clear();
            }
            _ if in_paren => current.push(ch),
            _ => {}
        }
    }

    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

/// Collapse whitespace and strip common PDF artifacts
fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{FEFF}', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("docsift-parser-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_plain_text_pages() {
        let path = temp_file("survey.txt", &"The loading dock was unsecured. ".repeat(50));
        let chunks = parse_document(&path, 200).unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[0].index, 0);
        // Pages are 1-based and indexes dense
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as i32);
            assert!(chunk.page >= 1);
        }
    }

    #[test]
    fn test_empty_document_is_permanent() {
        let path = temp_file("blank.txt", "   \n  \n");
        let err = parse_document(&path, 200).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyDocument { .. }));
        assert!(err.is_permanent());
    }

    #[test]
    fn test_unsupported_format() {
        let path = temp_file("photo.png", "not really an image");
        let err = parse_document(&path, 200).unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedFormat { .. }));
        assert!(err.is_permanent());
    }

    #[test]
    fn test_garbled_pdf_is_parse_error() {
        let path = temp_file("garbled.pdf", "this is not a pdf at all");
        let err = parse_document(&path, 200).unwrap_err();
        assert!(err.is_permanent());
    }

    #[test]
    fn test_operator_extraction() {
        assert_eq!(
            text_from_operator("(Hello World) Tj"),
            Some("Hello World".to_string())
        );
        assert_eq!(
            text_from_operator("[(Per) -10 (imeter)] TJ"),
            Some("Perimeter".to_string())
        );
        assert_eq!(
            text_from_operator("(Line\\nbreak) Tj"),
            Some("Line\nbreak".to_string())
        );
        assert_eq!(text_from_operator("1 0 0 1 72 720 Tm"), None);
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("Hello   World\n\nTest"), "Hello World Test");
    }
}
