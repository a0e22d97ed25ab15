//! PDF digital signature verification.
//!
//! The pieces needed to check an existing signature:
//!
//! - **ByteRange**: which bytes a signature covers, and whether that is the whole file
//! - **PKCS#7 / CMS**: decoding `/Contents`, resolving the signer, checking the digest
//! - **Chain validation**: building the signer chain and validating it against a
//!   [`TrustStore`] at the signing instant
//!
//! ## Signature Types Supported
//!
//! - PKCS#7 detached signatures (adbe.pkcs7.detached)
//! - PKCS#7 SHA-1 signatures (adbe.pkcs7.sha1)
//! - PAdES signatures (ETSI.CAdES.detached)
//!
//! Signer keys may be RSA (PKCS#1 v1.5) or ECDSA on P-256 / P-384.
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - RFC 5652 - Cryptographic Message Syntax

pub mod algorithms;
mod byterange;
mod pkcs7;
mod trust_store;
mod types;
mod verifier;

pub use byterange::ByteRange;
pub use pkcs7::Pkcs7Signature;
pub use trust_store::{serial_radix36, AnchorSource, TrustAnchor, TrustStore};
pub use types::{
    parse_pdf_date, CertificateSummary, DigestAlgorithm, FailureReason, SignatureInfo, SignatureSubFilter,
    SubjectFields, VerificationOutcome,
};
pub use verifier::{summarize, ChainVerifier};
