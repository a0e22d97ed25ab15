// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::manual_find)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # pdf_sigcheck
//!
//! Verification of incrementally signed PDF documents.
//!
//! Every signing operation appends a revision to a PDF. For each signature this crate
//! answers three questions:
//!
//! - **Coverage**: does the signed byte range account for the whole file, or were
//!   bytes appended after signing?
//! - **Integrity**: do the signed bytes still match the CMS signature?
//! - **Trust**: does the signer's certificate chain validate against a trust store at
//!   the signing instant?
//!
//! ## Architecture
//!
//! - [`document`]: in-memory PDF index with incremental-update semantics and
//!   AcroForm signature field discovery
//! - [`signatures`]: ByteRange, CMS decoding, chain validation, trust stores
//! - [`catalog`]: one [`RevisionRecord`] per signature, with revision numbering
//! - [`session`]: fail-fast (or full) evaluation folded into an [`AggregateResult`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_sigcheck::config::VerifyConfig;
//! use pdf_sigcheck::session::verify_document;
//!
//! # fn main() -> pdf_sigcheck::Result<()> {
//! let config = VerifyConfig::new().with_trust_file("roots.pem");
//! let result = verify_document("contract.pdf", config)?;
//! for report in &result.evaluated {
//!     println!("{}: revision {} of {}", report.name, report.revision, report.total_revisions);
//! }
//! std::process::exit(result.exit_code());
//! # }
//! ```
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 7.5.6 - Incremental Updates
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures

#![warn(missing_docs)]

// Error handling
pub mod error;

// Core PDF parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod parser_config;

// Stream decoders
pub mod decoders;

// Signature verification
pub mod signatures;

// Orchestration
pub mod catalog;
pub mod config;
pub mod revision;
pub mod session;

// Re-exports
pub use catalog::SignatureCatalog;
pub use config::{ScanMode, TrustSource, VerifyConfig};
pub use document::PdfDocument;
pub use error::{Error, Result};
pub use revision::RevisionRecord;
pub use session::{AggregateResult, ResultFlags, RevisionReport, VerificationSession};
