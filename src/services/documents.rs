use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const TEXT_MIME: &str = "text/plain";

#[derive(Debug, Error)]
pub(crate) enum DocumentError {
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),
    #[error("document exceeds the {limit_mb} MB upload limit")]
    TooLarge { limit_mb: u64 },
    #[error("failed to extract text: {0}")]
    Extraction(String),
    #[error("document contains no extractable text")]
    Empty,
}

/// Pulls plain text out of an uploaded study document. The caller passes the
/// request's content type; anything but pdf, docx and plain text is refused.
pub(crate) fn extract_text(
    content_type: &str,
    data: &[u8],
    max_size_mb: u64,
) -> Result<String, DocumentError> {
    if data.len() as u64 > max_size_mb * 1024 * 1024 {
        return Err(DocumentError::TooLarge { limit_mb: max_size_mb });
    }

    let mime = content_type.split(';').next().unwrap_or(content_type).trim();
    let text = match mime {
        PDF_MIME => extract_pdf(data)?,
        DOCX_MIME => extract_docx(data)?,
        TEXT_MIME => String::from_utf8_lossy(data).into_owned(),
        other => return Err(DocumentError::UnsupportedType(other.to_string())),
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(DocumentError::Empty);
    }
    Ok(text)
}

fn extract_pdf(data: &[u8]) -> Result<String, DocumentError> {
    pdf_extract::extract_text_from_mem(data)
        .map_err(|err| DocumentError::Extraction(err.to_string()))
}

/// OOXML stores the body in word/document.xml; text lives in `w:t` elements
/// and paragraphs become line breaks.
fn extract_docx(data: &[u8]) -> Result<String, DocumentError> {
    let cursor = Cursor::new(data);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|err| DocumentError::Extraction(err.to_string()))?;

    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| DocumentError::Extraction(err.to_string()))?
        .read_to_string(&mut document_xml)
        .map_err(|err| DocumentError::Extraction(err.to_string()))?;

    let mut reader = Reader::from_str(&document_xml);
    let mut text = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                in_text = element.name().as_ref() == b"w:t";
            }
            Ok(Event::End(element)) => {
                if element.name().as_ref() == b"w:t" {
                    in_text = false;
                } else if element.name().as_ref() == b"w:p" {
                    text.push('\n');
                }
            }
            Ok(Event::Text(value)) if in_text => {
                let chunk =
                    value.unescape().map_err(|err| DocumentError::Extraction(err.to_string()))?;
                text.push_str(&chunk);
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(DocumentError::Extraction(err.to_string())),
            _ => {}
        }
    }

    Ok(text)
}
