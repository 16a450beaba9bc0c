//! Multi-format text extraction for downloaded documents.
//!
//! The store supplies bytes + MIME type; this module returns plain UTF-8
//! text. Dispatch is a match over [`MimeType`], one arm per supported
//! format, no trait objects involved.

use std::io::Read;

use crate::error::PipelineError;
use crate::models::MimeType;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extracts plain text from a document's raw bytes.
///
/// - PDF: per-page text concatenated in page order.
/// - DOCX: paragraph text in document order, newline-joined.
/// - Plain text: strict UTF-8 decode; invalid bytes are a [`PipelineError::Decode`].
/// - PPTX: slides in numeric order, one line per text-bearing shape.
///
/// An empty document of a supported type yields empty text, not an error.
/// Unknown types fail with [`PipelineError::UnsupportedType`].
pub fn extract_text(bytes: &[u8], mime_type: &MimeType) -> Result<String, PipelineError> {
    match mime_type {
        MimeType::Pdf => extract_pdf(bytes),
        MimeType::Docx => extract_docx(bytes),
        MimeType::Text => extract_plain(bytes),
        MimeType::Pptx => extract_pptx(bytes),
        other => Err(PipelineError::UnsupportedType(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, PipelineError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| PipelineError::Decode(format!("pdf: {}", e)))
}

fn extract_plain(bytes: &[u8]) -> Result<String, PipelineError> {
    std::str::from_utf8(bytes)
        .map(|s| s.to_string())
        .map_err(|e| PipelineError::Decode(format!("invalid utf-8: {}", e)))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, PipelineError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| PipelineError::Decode(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| PipelineError::Decode(format!("{}: {}", name, e)))?;
    if out.len() as u64 >= max_bytes {
        return Err(PipelineError::Decode(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, PipelineError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| PipelineError::Decode(format!("docx: {}", e)))?;
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    extract_docx_paragraphs(&doc_xml)
}

/// Walks `word/document.xml`, concatenating `w:t` runs within a paragraph
/// and joining paragraphs (`w:p`) with newlines.
fn extract_docx_paragraphs(xml: &[u8]) -> Result<String, PipelineError> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_paragraph = false;
    // No trim_text: run text is only read right after a `t` start tag, and
    // its leading/trailing spaces are significant.
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"p" {
                    in_paragraph = true;
                    current.clear();
                } else if name.as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        current.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && in_paragraph {
                    paragraphs.push(std::mem::take(&mut current));
                    in_paragraph = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(PipelineError::Decode(format!("docx xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    if in_paragraph && !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

fn extract_pptx(bytes: &[u8]) -> Result<String, PipelineError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| PipelineError::Decode(format!("pptx: {}", e)))?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    let mut shapes: Vec<String> = Vec::new();
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        extract_pptx_shapes(&xml, &mut shapes)?;
    }
    Ok(shapes.join("\n"))
}

/// Walks one slide's XML, appending the text of each text-bearing shape
/// (`p:sp`); `a:t` runs within a shape are concatenated.
fn extract_pptx_shapes(xml: &[u8], shapes: &mut Vec<String>) -> Result<(), PipelineError> {
    let mut current = String::new();
    let mut in_shape = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"sp" {
                    in_shape = true;
                    current.clear();
                } else if name.as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        current.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"sp" && in_shape {
                    if !current.is_empty() {
                        shapes.push(std::mem::take(&mut current));
                    }
                    in_shape = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(PipelineError::Decode(format!("pptx xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with_entry(name: &str, xml: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            writer
                .start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip_with_entry("word/document.xml", &xml)
    }

    #[test]
    fn unsupported_mime_type_returns_error() {
        let err = extract_text(b"foo", &MimeType::Other("application/octet-stream".into()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedType(_)));
    }

    #[test]
    fn folder_is_unsupported() {
        let err = extract_text(b"", &MimeType::Folder).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedType(_)));
    }

    #[test]
    fn invalid_pdf_returns_decode_error() {
        let err = extract_text(b"not a pdf", &MimeType::Pdf).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn invalid_zip_returns_decode_error_for_docx() {
        let err = extract_text(b"not a zip", &MimeType::Docx).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn plain_text_decodes_utf8() {
        let text = extract_text("héllo wörld".as_bytes(), &MimeType::Text).unwrap();
        assert_eq!(text, "héllo wörld");
    }

    #[test]
    fn plain_text_rejects_invalid_utf8() {
        let err = extract_text(&[0xff, 0xfe, 0x00], &MimeType::Text).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn empty_plain_text_is_empty_not_error() {
        assert_eq!(extract_text(b"", &MimeType::Text).unwrap(), "");
    }

    #[test]
    fn docx_paragraphs_are_newline_joined() {
        let bytes = docx_with_paragraphs(&["First paragraph.", "Second paragraph."]);
        let text = extract_text(&bytes, &MimeType::Docx).unwrap();
        assert_eq!(text, "First paragraph.\nSecond paragraph.");
    }

    #[test]
    fn docx_runs_within_a_paragraph_are_concatenated() {
        let xml = "<?xml version=\"1.0\"?><w:document xmlns:w=\"x\"><w:body><w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p></w:body></w:document>";
        let bytes = zip_with_entry("word/document.xml", xml);
        let text = extract_text(&bytes, &MimeType::Docx).unwrap();
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn empty_docx_body_is_empty_text() {
        let xml = "<?xml version=\"1.0\"?><w:document xmlns:w=\"x\"><w:body></w:body></w:document>";
        let bytes = zip_with_entry("word/document.xml", xml);
        assert_eq!(extract_text(&bytes, &MimeType::Docx).unwrap(), "");
    }

    #[test]
    fn docx_without_document_xml_is_decode_error() {
        let bytes = zip_with_entry("word/other.xml", "<x/>");
        let err = extract_text(&bytes, &MimeType::Docx).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn pptx_slides_in_order_one_line_per_shape() {
        let slide = |text: &str| {
            format!(
                "<?xml version=\"1.0\"?><p:sld xmlns:p=\"x\" xmlns:a=\"y\"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
                text
            )
        };
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            // Written out of order; extraction must sort numerically.
            for (name, text) in [
                ("ppt/slides/slide2.xml", "second slide"),
                ("ppt/slides/slide1.xml", "first slide"),
            ] {
                writer
                    .start_file(name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(slide(text).as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        let text = extract_text(&buf, &MimeType::Pptx).unwrap();
        assert_eq!(text, "first slide\nsecond slide");
    }

    #[test]
    fn pptx_without_slides_is_empty_text() {
        let bytes = zip_with_entry("ppt/presentation.xml", "<p/>");
        assert_eq!(extract_text(&bytes, &MimeType::Pptx).unwrap(), "");
    }
}
