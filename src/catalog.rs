//! Signature discovery for a loaded document.
//!
//! The catalog parses the document once, finds every signature field, numbers the
//! revisions and builds one [`RevisionRecord`] per signature. It is read-only after
//! construction.

use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::parser_config::ParserOptions;
use crate::revision::RevisionRecord;
use crate::signatures::{ByteRange, TrustStore};
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;

/// An `%%EOF` ending at most this many bytes after a signed range's end belongs to the
/// same revision (the line break after the marker is not always signed).
const EOF_SLACK: usize = 2;

/// Every signature of one document, by name.
#[derive(Debug)]
pub struct SignatureCatalog {
    document: Arc<PdfDocument>,
    trust_store: Arc<TrustStore>,
    revisions: IndexMap<String, RevisionRecord>,
    total_revisions: usize,
}

impl SignatureCatalog {
    /// Load `path` with default parser limits.
    ///
    /// # Errors
    ///
    /// `Error::DocumentParse` when the file cannot be read or is not a usable PDF.
    pub fn open(path: impl AsRef<Path>, trust_store: Arc<TrustStore>) -> Result<Self> {
        Self::open_with_options(path, trust_store, ParserOptions::default())
    }

    /// Load `path` with explicit parser limits.
    pub fn open_with_options(
        path: impl AsRef<Path>,
        trust_store: Arc<TrustStore>,
        options: ParserOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let document_parse = |e: Error| Error::DocumentParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let document = PdfDocument::open(path, options).map_err(document_parse)?;
        Self::from_document(Arc::new(document), trust_store).map_err(document_parse)
    }

    /// Load a document held in memory.
    pub fn from_bytes(data: impl Into<bytes::Bytes>, trust_store: Arc<TrustStore>, options: ParserOptions) -> Result<Self> {
        let document_parse = |e: Error| Error::DocumentParse {
            path: "<memory>".to_string(),
            reason: e.to_string(),
        };
        let document = PdfDocument::from_bytes(data, options).map_err(document_parse)?;
        Self::from_document(Arc::new(document), trust_store).map_err(document_parse)
    }

    /// Build the catalog of an already indexed document.
    pub fn from_document(document: Arc<PdfDocument>, trust_store: Arc<TrustStore>) -> Result<Self> {
        let fields = document.signature_fields()?;

        let covered_ends: Vec<Option<usize>> = fields
            .iter()
            .map(|field| {
                field
                    .dictionary
                    .get("ByteRange")
                    .and_then(|obj| document.resolve(obj).ok())
                    .and_then(|obj| ByteRange::from_object(obj).ok())
                    .map(|range| range.covered_end())
                    .filter(|end| *end <= document.len())
            })
            .collect();
        let boundaries = revision_boundaries(document.revision_ends(), &covered_ends, document.len());
        let total_revisions = boundaries.len();

        let mut revisions = IndexMap::with_capacity(fields.len());
        for (field, covered_end) in fields.iter().zip(&covered_ends) {
            let revision = covered_end
                .and_then(|end| boundaries.binary_search(&end).ok())
                .map(|index| index + 1)
                .unwrap_or(total_revisions);
            let record = RevisionRecord::new(document.clone(), trust_store.clone(), field, revision, total_revisions);
            revisions.insert(field.name.clone(), record);
        }
        log::info!(
            "Found {} signatures across {} revisions",
            revisions.len(),
            total_revisions
        );

        Ok(Self {
            document,
            trust_store,
            revisions,
            total_revisions,
        })
    }

    /// Signature names in AcroForm order.
    pub fn signature_names(&self) -> Vec<&str> {
        self.revisions.keys().map(String::as_str).collect()
    }

    /// Number of incremental revisions in the document.
    pub fn total_revisions(&self) -> usize {
        self.total_revisions
    }

    /// The record for `name`.
    pub fn revision(&self, name: &str) -> Option<&RevisionRecord> {
        self.revisions.get(name)
    }

    /// Every record, in AcroForm order.
    pub fn revisions(&self) -> impl Iterator<Item = &RevisionRecord> {
        self.revisions.values()
    }

    /// The underlying document.
    pub fn document(&self) -> &PdfDocument {
        &self.document
    }

    /// The trust store shared by every record.
    pub fn trust_store(&self) -> &TrustStore {
        &self.trust_store
    }
}

/// Sorted revision end offsets.
///
/// Every signed range ends a revision. An `%%EOF` marker ends one too unless it sits
/// within [`EOF_SLACK`] bytes after a signed end. A file with neither has one revision.
fn revision_boundaries(eof_ends: &[usize], covered_ends: &[Option<usize>], file_len: usize) -> Vec<usize> {
    let mut boundaries: Vec<usize> = covered_ends.iter().flatten().copied().collect();
    for &eof in eof_ends {
        let absorbed = covered_ends
            .iter()
            .flatten()
            .any(|&end| end <= eof && eof - end <= EOF_SLACK);
        if !absorbed {
            boundaries.push(eof);
        }
    }
    if boundaries.is_empty() {
        boundaries.push(file_len);
    }
    boundaries.sort_unstable();
    boundaries.dedup();
    boundaries
}
