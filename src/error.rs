//! Error types for signature verification.
//!
//! Verification *outcomes* (a modified document, a signature that does not cover the
//! whole file, an untrusted chain) are reported as values, not errors. The variants
//! below cover the cases where an evaluation cannot be completed at all.

use crate::object::ObjectRef;
use std::path::PathBuf;

/// Result type alias for verification operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while loading and verifying a signed PDF.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Referenced object is not defined anywhere in the file
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Structurally invalid PDF content
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Stream filter this crate does not decode
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Reference chain loops back on itself
    #[error("Circular reference detected: object {0}")]
    CircularReference(ObjectRef),

    /// Nesting or reference depth exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),

    /// Document could not be opened or is not a usable PDF
    #[error("Cannot load document {path}: {reason}")]
    DocumentParse {
        /// Path of the document
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// No trust anchors could be loaded from the platform or the bundled roots
    #[error("Trust store unavailable: {0}")]
    TrustStoreUnavailable(String),

    /// Trust file unreadable or without a parseable certificate
    #[error("Certificate parse error: {0}")]
    CertificateParse(String),

    /// Malformed CMS structure or unusable key material for one signature
    #[error("Signature verification error: {0}")]
    SignatureVerification(String),

    /// Writing an exported certificate or revision failed
    #[error("Export to {path:?} failed: {source}")]
    ExportIo {
        /// Target file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Requested signature name is not present in the document
    #[error("No such signature name: {0}")]
    SignatureNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error aborts a whole verification run.
    ///
    /// Signature-level and export errors are folded into the per-signature report;
    /// everything else stops evaluation before any aggregate can be produced.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::SignatureVerification(_) | Error::ExportIo { .. })
    }
}

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Self {
        Error::SignatureVerification(format!("DER: {}", err))
    }
}
