//! Text extraction for binary office formats.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;

use super::PartitionError;

/// Page separator emitted by `pdf-extract`.
const PAGE_BREAK: char = '\x0c';

/// Main part of a Word document inside the archive.
const DOCX_DOCUMENT_PART: &str = "word/document.xml";

/// Extracted text of each PDF page, numbered from 1. Blank pages are skipped
/// but keep their number.
pub(super) fn pdf_pages(path: &Path) -> Result<Vec<(u32, String)>, PartitionError> {
    let text = pdf_extract::extract_text(path)
        .map_err(|e| PartitionError::Provider(format!("no se pudo leer el PDF: {e}")))?;
    Ok(split_pages(&text))
}

pub(super) fn split_pages(text: &str) -> Vec<(u32, String)> {
    text.split(PAGE_BREAK)
        .zip(1u32..)
        .filter_map(|(page, number)| {
            let page = page.trim();
            (!page.is_empty()).then(|| (number, page.to_string()))
        })
        .collect()
}

/// Paragraph texts of a `.docx` file.
pub(super) fn docx_paragraphs(path: &Path) -> Result<Vec<String>, PartitionError> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| PartitionError::Provider(format!("el DOCX no es un ZIP válido: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name(DOCX_DOCUMENT_PART)
        .map_err(|_| PartitionError::Provider(format!("DOCX inválido: falta {DOCX_DOCUMENT_PART}")))?
        .read_to_string(&mut xml)?;

    paragraphs_from_document_xml(&xml)
}

/// Concatenated `<w:t>` runs of every non-empty `<w:p>`.
pub(super) fn paragraphs_from_document_xml(xml: &str) -> Result<Vec<String>, PartitionError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"p" => {
                    let text = current.trim();
                    if !text.is_empty() {
                        paragraphs.push(text.to_string());
                    }
                    current.clear();
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|e| PartitionError::Provider(format!("XML inválido en DOCX: {e}")))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(PartitionError::Provider(format!("XML inválido en DOCX: {e}")));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Cláusula primera</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve">El arriendo dura </w:t></w:r><w:r><w:t>12 meses &amp; se renueva.</w:t></w:r></w:p>
    <w:p></w:p>
    <w:p><w:r><w:t>Firma</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    #[test]
    fn test_split_pages_keeps_page_numbers() {
        let pages = split_pages("Portada\n\x0c  \n\x0cÍndice\x0cCapítulo 1\n");
        assert_eq!(
            pages,
            vec![
                (1, "Portada".to_string()),
                (3, "Índice".to_string()),
                (4, "Capítulo 1".to_string()),
            ]
        );
    }

    #[test]
    fn test_single_page_without_breaks() {
        assert_eq!(split_pages("solo texto"), vec![(1, "solo texto".to_string())]);
        assert!(split_pages("").is_empty());
    }

    #[test]
    fn test_document_xml_paragraphs() {
        let paragraphs = paragraphs_from_document_xml(DOCUMENT_XML).unwrap();
        assert_eq!(
            paragraphs,
            vec!["Cláusula primera", "El arriendo dura 12 meses & se renueva.", "Firma"]
        );
    }

    #[test]
    fn test_docx_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contrato.docx");
        let mut writer = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        writer
            .start_file(
                DOCX_DOCUMENT_PART,
                zip::write::SimpleFileOptions::default()
                    .compression_method(zip::CompressionMethod::Stored),
            )
            .unwrap();
        writer.write_all(DOCUMENT_XML.as_bytes()).unwrap();
        writer.finish().unwrap();

        let paragraphs = docx_paragraphs(&path).unwrap();
        assert_eq!(paragraphs.len(), 3);
        assert_eq!(paragraphs[0], "Cláusula primera");
    }

    #[test]
    fn test_docx_that_is_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roto.docx");
        std::fs::write(&path, b"no soy un zip").unwrap();
        assert!(matches!(docx_paragraphs(&path), Err(PartitionError::Provider(_))));
    }
}
