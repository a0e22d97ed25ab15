//! One signature and the document revision it closed.
//!
//! A [`RevisionRecord`] is built by the [`SignatureCatalog`](crate::catalog::SignatureCatalog)
//! for every signature field. Construction decodes the CMS structure and checks the
//! signed bytes once; the queries below only read those cached results, except for
//! chain validation, which depends on the trust store and the export target.

use crate::document::{PdfDocument, SignatureField};
use crate::error::{Error, Result};
use crate::session::CertificateExport;
use crate::signatures::{
    ByteRange, ChainVerifier, Pkcs7Signature, SignatureInfo, SubjectFields, TrustStore, VerificationOutcome,
};
use chrono::{DateTime, Utc};
use der::Encode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use x509_cert::Certificate;

/// Decoded signature and the outcome of the content check.
#[derive(Debug)]
struct SignedContent {
    signature: Pkcs7Signature,
    chain: Vec<Certificate>,
    intact: bool,
}

/// A named signature within a loaded document.
#[derive(Debug)]
pub struct RevisionRecord {
    document: Arc<PdfDocument>,
    trust_store: Arc<TrustStore>,
    name: String,
    info: SignatureInfo,
    byte_range: Option<ByteRange>,
    revision: usize,
    total_revisions: usize,
    // error text rather than `Error` so the record stays cheap to query repeatedly
    content: std::result::Result<SignedContent, String>,
}

impl RevisionRecord {
    /// Decode and check one signature field.
    ///
    /// Problems with the signature itself are cached and reported by the queries, so
    /// this never fails.
    pub(crate) fn new(
        document: Arc<PdfDocument>,
        trust_store: Arc<TrustStore>,
        field: &SignatureField,
        revision: usize,
        total_revisions: usize,
    ) -> Self {
        let info = SignatureInfo::from_dictionary(&field.dictionary);
        let byte_range = field.dictionary.get("ByteRange").map(|obj| {
            document
                .resolve(obj)
                .and_then(ByteRange::from_object)
                .and_then(|range| range.validate(document.len()).map(|_| range))
        });

        let content = match byte_range {
            Some(Ok(ref range)) => check_content(&document, &field.dictionary, range),
            Some(Err(ref e)) => Err(e.to_string()),
            None => Err("signature dictionary has no /ByteRange".to_string()),
        };
        match &content {
            Ok(signed) => log::debug!(
                "{}: {} certificates, content intact: {}",
                field.name,
                signed.chain.len(),
                signed.intact
            ),
            Err(e) => log::warn!("{}: cannot check signature: {}", field.name, e),
        }

        Self {
            document,
            trust_store,
            name: field.name.clone(),
            info,
            byte_range: byte_range.and_then(|r| r.ok()),
            revision,
            total_revisions,
            content,
        }
    }

    /// Fully qualified signature field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptive entries of the signature dictionary.
    pub fn info(&self) -> &SignatureInfo {
        &self.info
    }

    /// The signature's byte range, when it parsed and fits the file.
    pub fn byte_range(&self) -> Option<&ByteRange> {
        self.byte_range.as_ref()
    }

    /// True when the signed range accounts for every byte of the current file.
    pub fn signature_covers_whole_document(&self) -> bool {
        self.byte_range
            .as_ref()
            .map(|range| range.covers_whole(self.document.as_bytes()))
            .unwrap_or(false)
    }

    /// True when the signed bytes no longer match the signature.
    ///
    /// # Errors
    ///
    /// `Error::SignatureVerification` when the signature could not be checked at all.
    pub fn is_document_modified(&self) -> Result<bool> {
        let signed = self.signed()?;
        if signed.intact {
            log::info!("{}: Verify OK: true", self.name);
        } else {
            log::warn!("{}: Verify OK: false", self.name);
        }
        Ok(!signed.intact)
    }

    /// Validate the signer chain against the trust store at the signing instant.
    ///
    /// With `export`, every chain certificate is also written to disk whatever the
    /// outcome; export failures are logged and do not change the result.
    pub fn verify(&self, export: Option<&CertificateExport>) -> Result<VerificationOutcome> {
        let signed = self.signed()?;
        let at = self.signing_time();
        let outcome = ChainVerifier::new(&self.trust_store).verify(&signed.chain, at);
        match &outcome {
            VerificationOutcome::Trusted => log::info!("{}: certificate chain trusted at {}", self.name, at),
            VerificationOutcome::Failed { .. } => log::warn!("{}: {}", self.name, outcome),
        }

        if let Some(export) = export {
            if let Err(e) = self.export_certificates(export) {
                log::error!("{}: {}", self.name, e);
            }
        }
        Ok(outcome)
    }

    /// Decomposed subject of the signing certificate.
    pub fn subject(&self) -> Result<SubjectFields> {
        SubjectFields::from_certificate_der(&self.signing_certificate()?.to_der()?)
    }

    /// The certificate that produced the signature.
    pub fn signing_certificate(&self) -> Result<&Certificate> {
        Ok(self.signed()?.signature.signer_certificate())
    }

    /// Signing instant: the CMS `signingTime` attribute, then `/M`, then now.
    pub fn signing_time(&self) -> DateTime<Utc> {
        self.content
            .as_ref()
            .ok()
            .and_then(|signed| signed.signature.signing_time())
            .or_else(|| self.info.signing_instant())
            .unwrap_or_else(Utc::now)
    }

    /// 1-based position of this signature's revision among all revisions.
    pub fn revision_number(&self) -> usize {
        self.revision
    }

    /// Number of revisions in the document.
    pub fn total_revisions(&self) -> usize {
        self.total_revisions
    }

    /// Signer certificate followed by its issuers, as far as the CMS supplies them.
    pub fn certificate_chain(&self) -> Result<&[Certificate]> {
        Ok(&self.signed()?.chain)
    }

    /// Write every chain certificate as DER, named by `export`.
    ///
    /// Returns the paths written.
    pub fn export_certificates(&self, export: &CertificateExport) -> Result<Vec<PathBuf>> {
        let chain = self.certificate_chain()?;
        let mut written = Vec::with_capacity(chain.len());
        for (index, cert) in chain.iter().enumerate() {
            let path = export.file_name_for(index);
            let der = cert.to_der()?;
            std::fs::write(&path, der).map_err(|source| Error::ExportIo {
                path: path.clone(),
                source,
            })?;
            log::debug!("{}: wrote {}", self.name, path.display());
            written.push(path);
        }
        Ok(written)
    }

    /// The file as it stood when this signature was applied.
    pub fn revision_bytes(&self) -> &[u8] {
        let data = self.document.as_bytes();
        match &self.byte_range {
            Some(range) => &data[..range.covered_end()],
            None => data,
        }
    }

    /// Write [`revision_bytes`](Self::revision_bytes) to `path`.
    ///
    /// Best effort: I/O failures are logged and reported as `false`.
    pub fn extract(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match std::fs::write(path, self.revision_bytes()) {
            Ok(()) => {
                log::info!("{}: extracted revision {} to {}", self.name, self.revision, path.display());
                true
            },
            Err(e) => {
                log::error!("{}: cannot write {}: {}", self.name, path.display(), e);
                false
            },
        }
    }

    /// `revision_<name>.pdf`, with path separators in the name replaced by `_`.
    pub fn default_extract_path(&self) -> PathBuf {
        let safe: String = self
            .name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        PathBuf::from(format!("revision_{}.pdf", safe))
    }

    fn signed(&self) -> Result<&SignedContent> {
        self.content
            .as_ref()
            .map_err(|e| Error::SignatureVerification(format!("{}: {}", self.name, e)))
    }
}

fn check_content(
    document: &PdfDocument,
    dictionary: &crate::object::Dictionary,
    range: &ByteRange,
) -> std::result::Result<SignedContent, String> {
    let contents = dictionary
        .get("Contents")
        .and_then(|obj| document.resolve(obj).ok())
        .and_then(|obj| obj.as_string())
        .ok_or_else(|| "signature dictionary has no /Contents string".to_string())?;
    let signature = Pkcs7Signature::from_der(contents).map_err(|e| e.to_string())?;
    let signed_bytes = range
        .extract_signed_bytes(document.as_bytes())
        .map_err(|e| e.to_string())?;
    let intact = signature.verify_content(&signed_bytes).map_err(|e| e.to_string())?;
    let chain = ChainVerifier::build_chain(signature.signer_certificate(), signature.certificates());
    Ok(SignedContent {
        signature,
        chain,
        intact,
    })
}
