//! Reference-document model and the external text-extraction capability.

use anyhow::{Context, Result};
use crc32fast::Hasher as Crc32;
use serde::Serialize;

/// Page separator used by PDF text extraction and by [`Document::to_storage`].
const PAGE_SEPARATOR: char = '\u{c}';

/// Ordered page texts of one uploaded reference document.
///
/// Pages that failed extraction are dropped during construction; the stored
/// sequence never contains empty placeholders. Documents are read-only after
/// construction and superseded wholesale by a re-upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pages: Vec<String>,
}

impl Document {
    /// Builds a document from raw page texts, dropping pages without usable text.
    pub fn from_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = pages
            .into_iter()
            .map(Into::into)
            .filter(|page| !page.trim().is_empty())
            .collect();
        Self { pages }
    }

    /// Rebuilds a document from its [`Document::to_storage`] form.
    pub fn from_storage(text: &str) -> Self {
        Self::from_pages(text.split(PAGE_SEPARATOR))
    }

    /// Usable page texts in original order.
    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    /// Number of usable pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// True when extraction produced no usable text at all.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Total extracted characters across all pages.
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|page| page.len()).sum()
    }

    /// Serializes the page sequence into a single string with form-feed page
    /// separators, suitable for a session-store slot.
    pub fn to_storage(&self) -> String {
        self.pages.join("\u{c}")
    }
}

/// External capability that turns an uploaded file into ordered page texts.
///
/// Implementations may return fewer pages than the source contains when
/// individual pages fail extraction; failure of the whole operation is an
/// error. Callers treat an empty page list as "no usable content".
pub trait TextSource {
    /// Extracts ordered page texts from raw file bytes.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>>;
}

/// PDF-backed text source.
///
/// The extractor emits one form feed between consecutive pages, which is the
/// page boundary used here. Layout analysis beyond plain text extraction is
/// out of scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextSource;

impl TextSource for PdfTextSource {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .context("failed to extract text from PDF")?;
        Ok(text
            .split(PAGE_SEPARATOR)
            .map(|page| page.to_string())
            .collect())
    }
}

/// Summary returned to the uploader after successful extraction.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReceipt {
    /// Usable pages after extraction.
    pub pages: usize,
    /// Total extracted characters.
    pub chars: usize,
    /// CRC32 checksum of the raw uploaded bytes.
    pub checksum: u32,
}

impl DocumentReceipt {
    /// Builds a receipt for `document` as extracted from the `raw` upload.
    pub fn new(document: &Document, raw: &[u8]) -> Self {
        let mut hasher = Crc32::new();
        hasher.update(raw);
        Self {
            pages: document.page_count(),
            chars: document.char_count(),
            checksum: hasher.finalize(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_pages_without_usable_text() {
        let document = Document::from_pages(vec!["first", "", "   \n", "second"]);
        assert_eq!(document.page_count(), 2);
        assert_eq!(document.pages(), ["first", "second"]);
    }

    #[test]
    fn empty_document_is_representable() {
        let document = Document::from_pages(Vec::<String>::new());
        assert!(document.is_empty());
        assert_eq!(document.char_count(), 0);
    }

    #[test]
    fn storage_round_trip_preserves_page_boundaries() {
        let document = Document::from_pages(vec!["page one", "page two", "page three"]);
        let restored = Document::from_storage(&document.to_storage());
        assert_eq!(restored, document);
    }

    #[test]
    fn receipt_counts_pages_and_characters() {
        let document = Document::from_pages(vec!["abcd", "ef"]);
        let receipt = DocumentReceipt::new(&document, b"raw bytes");
        assert_eq!(receipt.pages, 2);
        assert_eq!(receipt.chars, 6);
        let again = DocumentReceipt::new(&document, b"raw bytes");
        assert_eq!(receipt.checksum, again.checksum);
    }
}
