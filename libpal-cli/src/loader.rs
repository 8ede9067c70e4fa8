//! Reads documents from disk into `(source_id, text)` pairs.
//!
//! Plain text and Markdown are read as UTF-8, falling back to Latin-1, which
//! maps every byte to a character. PDF text is extracted page by page with a
//! `--- Page N ---` marker before each page. DOCX text comes from
//! `word/document.xml`: paragraphs one per line, table rows as their cell
//! texts joined by spaces.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Unsupported file type: {path} (expected .txt, .md, .pdf or .docx)")]
    Unsupported { path: PathBuf },

    #[error("Could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not extract text from PDF {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("Could not extract text from DOCX {path}: {message}")]
    Docx { path: PathBuf, message: String },
}

/// A document ready to be inserted into the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    /// The file name, used as the citation label.
    pub source_id: String,
    pub text: String,
    pub lossy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Text,
    Pdf,
    Docx,
}

fn document_kind(path: &Path) -> Option<DocumentKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "txt" | "md" => Some(DocumentKind::Text),
        "pdf" => Some(DocumentKind::Pdf),
        "docx" => Some(DocumentKind::Docx),
        _ => None,
    }
}

pub fn load_document(path: &Path) -> Result<LoadedDocument, LoadError> {
    let kind = document_kind(path).ok_or_else(|| LoadError::Unsupported {
        path: path.to_path_buf(),
    })?;

    let bytes = std::fs::read(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let (text, lossy) = match kind {
        DocumentKind::Text => decode(bytes),
        DocumentKind::Pdf => (extract_pdf(path, &bytes)?, false),
        DocumentKind::Docx => (extract_docx(path, bytes)?, false),
    };
    if lossy {
        tracing::debug!(path = %path.display(), "File is not UTF-8, decoded as Latin-1");
    }
    if text.trim().is_empty() {
        tracing::warn!(path = %path.display(), "No text extracted");
    }

    let source_id = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(LoadedDocument {
        source_id,
        text,
        lossy,
    })
}

fn decode(bytes: Vec<u8>) -> (String, bool) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, false),
        Err(err) => {
            let text = err.into_bytes().into_iter().map(char::from).collect();
            (text, true)
        }
    }
}

fn extract_pdf(path: &Path, bytes: &[u8]) -> Result<String, LoadError> {
    let pages =
        pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| LoadError::Pdf {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    tracing::debug!(path = %path.display(), pages = pages.len(), "Extracted PDF text");
    Ok(join_pdf_pages(&pages))
}

/// Concatenate page texts, each preceded by a 1-based page marker. Pages
/// without text are skipped.
pub fn join_pdf_pages(pages: &[String]) -> String {
    let mut text = String::new();
    for (i, page) in pages.iter().enumerate() {
        if page.trim().is_empty() {
            continue;
        }
        text.push_str(&format!("\n--- Page {} ---\n{}\n", i + 1, page));
    }
    text
}

fn extract_docx(path: &Path, bytes: Vec<u8>) -> Result<String, LoadError> {
    let docx_error = |message: String| LoadError::Docx {
        path: path.to_path_buf(),
        message,
    };

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| docx_error(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| docx_error(format!("word/document.xml: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| docx_error(e.to_string()))?;

    docx_xml_to_text(&xml).map_err(docx_error)
}

/// Plain text of a WordprocessingML body.
///
/// Only `w:t` runs contribute text. Paragraphs outside tables become lines;
/// each table row becomes one line of its non-empty cells joined by spaces.
pub fn docx_xml_to_text(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut out = String::new();
    let mut paragraph = String::new();
    let mut cell = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut table_depth = 0usize;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"tbl" => table_depth += 1,
                b"tr" => row.clear(),
                b"tc" => cell.clear(),
                b"p" => paragraph.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push(' '),
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_text => {
                let text = e.unescape().map_err(|err| err.to_string())?;
                paragraph.push_str(&text);
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if !paragraph.trim().is_empty() => {
                    let text = paragraph.trim();
                    if table_depth > 0 {
                        if !cell.is_empty() {
                            cell.push(' ');
                        }
                        cell.push_str(text);
                    } else {
                        out.push_str(text);
                        out.push('\n');
                    }
                }
                b"tc" => {
                    if !cell.trim().is_empty() {
                        row.push(cell.trim().to_string());
                    }
                }
                b"tr" => {
                    if !row.is_empty() {
                        out.push_str(&row.join(" "));
                        out.push('\n');
                    }
                }
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
