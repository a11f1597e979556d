//! Plain-text extraction from uploaded documents.

use async_trait::async_trait;
use lopdf::Document;

/// Failure to turn uploaded bytes into text.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("not a readable PDF: {0}")]
    Corrupt(String),

    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Turns document bytes into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String, ExtractionError>;
}

/// PDF extractor backed by `lopdf`.
///
/// Pages are read in order and concatenated without separators. A page whose
/// text cannot be extracted contributes nothing instead of failing the
/// document.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    /// Extract synchronously. Prefer [`TextExtractor::extract`] from async code.
    pub fn extract_blocking(bytes: &[u8]) -> Result<String, ExtractionError> {
        let document =
            Document::load_mem(bytes).map_err(|e| ExtractionError::Corrupt(e.to_string()))?;

        let mut text = String::new();
        for page_number in document.get_pages().into_keys() {
            match document.extract_text(&[page_number]) {
                Ok(page_text) => text.push_str(&page_text),
                Err(e) => {
                    tracing::warn!(page = page_number, error = %e, "Skipping unreadable PDF page");
                }
            }
        }

        Ok(text)
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String, ExtractionError> {
        tokio::task::spawn_blocking(move || Self::extract_blocking(&bytes))
            .await
            .map_err(|e| ExtractionError::Task(e.to_string()))?
    }
}

/// Whether `filename` names a PDF, ignoring case.
pub fn is_pdf_filename(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".pdf")
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a PDF with one page per entry in `pages`.
    pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        pdf_from_contents(pages.iter().map(|text| text_page(text)).collect())
    }

    /// Content stream that draws `text` in the page font.
    pub fn text_page(text: &str) -> Content {
        Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        }
    }

    /// Content stream whose font selection has no operands, which text
    /// extraction rejects.
    pub fn unreadable_page() -> Content {
        Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![]),
                Operation::new("Tj", vec![Object::string_literal("lost")]),
                Operation::new("ET", vec![]),
            ],
        }
    }

    /// Build a PDF with one page per content stream.
    pub fn pdf_from_contents(pages: Vec<Content>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for content in pages {
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }
}
