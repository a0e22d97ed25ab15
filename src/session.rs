//! Verification orchestration.
//!
//! A [`VerificationSession`] owns one trust store and one catalog, evaluates
//! signatures in lexicographic name order and folds the per-signature facts into an
//! [`AggregateResult`]. Fail-fast mode stops at the first signature with any flag set.
//!
//! Certificate export file names carry a sequence number. The sequence belongs to the
//! session and advances once per evaluation that exports.

use crate::catalog::SignatureCatalog;
use crate::config::{ScanMode, TrustSource, VerifyConfig};
use crate::error::{Error, Result};
use crate::signatures::{SignatureInfo, TrustStore, VerificationOutcome};
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Exit status when a run aborts before any signature is evaluated.
pub const EXIT_FATAL: i32 = -1;

/// Exit status for invalid command-line arguments.
pub const EXIT_USAGE: i32 = -2;

bitflags! {
    /// Failure facts of one signature.
    ///
    /// Zero means the signature covers the whole file, is intact and trusted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResultFlags: u8 {
        /// Bytes exist outside the signed range
        const NOT_WHOLE_DOCUMENT = 1 << 0;
        /// The signed bytes no longer match the signature
        const MODIFIED = 1 << 1;
        /// The signer chain did not validate
        const UNTRUSTED = 1 << 2;
    }
}

fn serialize_flags<S: Serializer>(flags: &ResultFlags, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u8(flags.bits())
}

/// What one evaluation found.
#[derive(Debug, Clone, Serialize)]
pub struct RevisionReport {
    /// Signature field name
    pub name: String,
    /// Revision the signature closed
    pub revision: usize,
    /// Revisions in the document
    pub total_revisions: usize,
    /// Signer subject for display
    pub subject: Option<String>,
    /// Instant the chain was validated at
    pub signing_time: DateTime<Utc>,
    /// Signature dictionary metadata
    pub info: SignatureInfo,
    /// No bytes outside the signed range
    pub covers_whole_document: bool,
    /// Signed bytes altered, or not checkable
    pub modified: bool,
    /// Chain validation result; absent when the signature could not be decoded
    pub outcome: Option<VerificationOutcome>,
    /// Why the signature could not be checked
    pub error: Option<String>,
    /// Certificate files written
    pub exported: Vec<PathBuf>,
}

impl RevisionReport {
    /// Fold the three facts into flags.
    pub fn flags(&self) -> ResultFlags {
        let mut flags = ResultFlags::empty();
        flags.set(ResultFlags::NOT_WHOLE_DOCUMENT, !self.covers_whole_document);
        flags.set(ResultFlags::MODIFIED, self.modified);
        flags.set(
            ResultFlags::UNTRUSTED,
            !self.outcome.as_ref().map(VerificationOutcome::is_trusted).unwrap_or(false),
        );
        flags
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateResult {
    /// Flags of the first failing signature, empty when none failed
    #[serde(serialize_with = "serialize_flags")]
    pub flags: ResultFlags,
    /// Name of the first failing signature
    pub failing_signature: Option<String>,
    /// Every evaluated signature, in evaluation order
    pub evaluated: Vec<RevisionReport>,
}

impl AggregateResult {
    /// True when no evaluated signature failed.
    pub fn is_success(&self) -> bool {
        self.flags.is_empty()
    }

    /// Process exit status: the flag bits.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.flags.bits())
    }
}

/// Exit status for a run result, [`EXIT_FATAL`] for errors.
pub fn exit_code(result: &Result<AggregateResult>) -> i32 {
    match result {
        Ok(aggregate) => aggregate.exit_code(),
        Err(_) => EXIT_FATAL,
    }
}

/// Export sequence numbers, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSequence {
    next: u32,
}

impl Default for ExportSequence {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl ExportSequence {
    /// Fresh sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number the next export will use.
    pub fn peek(&self) -> u32 {
        self.next
    }

    /// Take the next number.
    pub fn advance(&mut self) -> u32 {
        let current = self.next;
        self.next += 1;
        current
    }

    /// Export target for the next evaluation.
    pub fn next_export(&mut self, template: impl Into<PathBuf>) -> CertificateExport {
        CertificateExport::new(template, self.advance())
    }
}

/// Where one evaluation writes its certificates.
///
/// For template `dir/out.pem` and sequence 2 the signer certificate goes to
/// `dir/out_rev2.pem`, its issuers to `dir/out1_rev2.pem`, `dir/out2_rev2.pem`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateExport {
    template: PathBuf,
    sequence: u32,
}

impl CertificateExport {
    /// Export target with an explicit sequence number.
    pub fn new(template: impl Into<PathBuf>, sequence: u32) -> Self {
        Self {
            template: template.into(),
            sequence,
        }
    }

    /// The template path.
    pub fn template(&self) -> &Path {
        &self.template
    }

    /// The sequence number.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// File for the chain certificate at `index` (0 = signer).
    pub fn file_name_for(&self, index: usize) -> PathBuf {
        let file_name = self
            .template
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (base, ext) = match file_name.find('.') {
            Some(dot) => file_name.split_at(dot),
            None => (file_name.as_str(), ""),
        };
        let suffix = if index == 0 { String::new() } else { index.to_string() };
        let name = format!("{}{}_rev{}{}", base, suffix, self.sequence, ext);
        match self.template.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }
}

/// One trust store, one document, one export sequence.
#[derive(Debug)]
pub struct VerificationSession {
    catalog: SignatureCatalog,
    config: VerifyConfig,
    export_sequence: ExportSequence,
}

impl VerificationSession {
    /// Load the trust store named by `config`, then the document.
    ///
    /// # Errors
    ///
    /// Trust store and document errors; all of them are fatal.
    pub fn open(path: impl AsRef<Path>, config: VerifyConfig) -> Result<Self> {
        let trust_store = match &config.trust_source {
            TrustSource::Default => TrustStore::load_default()?,
            TrustSource::File(file) => TrustStore::load_from_file(file)?,
        };
        let catalog = SignatureCatalog::open_with_options(path, Arc::new(trust_store), config.parser)?;
        Ok(Self::with_catalog(catalog, config))
    }

    /// Session over an existing catalog.
    pub fn with_catalog(catalog: SignatureCatalog, config: VerifyConfig) -> Self {
        Self {
            catalog,
            config,
            export_sequence: ExportSequence::new(),
        }
    }

    /// The document's signatures.
    pub fn catalog(&self) -> &SignatureCatalog {
        &self.catalog
    }

    /// The run configuration.
    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// The export sequence number the next exporting evaluation will use.
    pub fn next_export_sequence(&self) -> u32 {
        self.export_sequence.peek()
    }

    /// Evaluate one signature.
    ///
    /// Problems with the signature itself end up in the report; only an unknown name
    /// is an error.
    pub fn evaluate(&mut self, name: &str) -> Result<RevisionReport> {
        let record = self
            .catalog
            .revision(name)
            .ok_or_else(|| Error::SignatureNotFound(name.to_string()))?;

        let mut error = None;
        let covers_whole_document = record.signature_covers_whole_document();
        let modified = match record.is_document_modified() {
            Ok(modified) => modified,
            Err(e) if !e.is_fatal() => {
                error = Some(e.to_string());
                true
            },
            Err(e) => return Err(e),
        };
        let outcome = match record.verify(None) {
            Ok(outcome) => Some(outcome),
            Err(e) if !e.is_fatal() => {
                error.get_or_insert_with(|| e.to_string());
                None
            },
            Err(e) => return Err(e),
        };

        let mut exported = Vec::new();
        if let Some(template) = &self.config.export_template {
            let export = self.export_sequence.next_export(template.clone());
            match record.export_certificates(&export) {
                Ok(paths) => exported = paths,
                Err(e) => log::error!("{}: certificate export failed: {}", name, e),
            }
        }

        Ok(RevisionReport {
            name: name.to_string(),
            revision: record.revision_number(),
            total_revisions: record.total_revisions(),
            subject: record.subject().ok().map(|subject| subject.to_string()),
            signing_time: record.signing_time(),
            info: record.info().clone(),
            covers_whole_document,
            modified,
            outcome,
            error,
            exported,
        })
    }

    /// Evaluate the configured signature, or every signature in name order.
    pub fn run(&mut self) -> Result<AggregateResult> {
        let names: Vec<String> = match &self.config.signature {
            Some(name) => vec![name.clone()],
            None => {
                let mut names: Vec<String> = self.catalog.signature_names().into_iter().map(str::to_string).collect();
                names.sort();
                names
            },
        };

        let mut aggregate = AggregateResult::default();
        for name in names {
            let report = self.evaluate(&name)?;
            let flags = report.flags();
            log::debug!("{}: flags {:#05b}", name, flags.bits());
            aggregate.evaluated.push(report);
            if !flags.is_empty() && aggregate.failing_signature.is_none() {
                aggregate.flags = flags;
                aggregate.failing_signature = Some(name);
                if self.config.scan_mode == ScanMode::FailFast {
                    break;
                }
            }
        }
        Ok(aggregate)
    }
}

/// Open `path` and run every check `config` asks for.
pub fn verify_document(path: impl AsRef<Path>, config: VerifyConfig) -> Result<AggregateResult> {
    VerificationSession::open(path, config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_bits() {
        assert_eq!(ResultFlags::NOT_WHOLE_DOCUMENT.bits(), 1);
        assert_eq!(ResultFlags::MODIFIED.bits(), 2);
        assert_eq!(ResultFlags::UNTRUSTED.bits(), 4);
    }

    #[test]
    fn test_empty_aggregate_is_success() {
        let aggregate = AggregateResult::default();
        assert!(aggregate.is_success());
        assert_eq!(aggregate.exit_code(), 0);
        assert_eq!(exit_code(&Ok(aggregate)), 0);
        assert_eq!(exit_code(&Err(Error::InvalidPdf("x".to_string()))), EXIT_FATAL);
    }

    #[test]
    fn test_export_names() {
        let export = CertificateExport::new("out.pem", 1);
        assert_eq!(export.file_name_for(0), PathBuf::from("out_rev1.pem"));
        assert_eq!(export.file_name_for(1), PathBuf::from("out1_rev1.pem"));
        assert_eq!(export.file_name_for(2), PathBuf::from("out2_rev1.pem"));
    }

    #[test]
    fn test_export_name_splits_at_first_dot() {
        let export = CertificateExport::new("chain.tar.der", 3);
        assert_eq!(export.file_name_for(1), PathBuf::from("chain1_rev3.tar.der"));
        let export = CertificateExport::new("plain", 2);
        assert_eq!(export.file_name_for(0), PathBuf::from("plain_rev2"));
    }

    #[test]
    fn test_export_name_keeps_dotted_directory() {
        let export = CertificateExport::new("certs.d/out.pem", 1);
        assert_eq!(export.file_name_for(0), PathBuf::from("certs.d/out_rev1.pem"));
    }

    #[test]
    fn test_export_sequence() {
        let mut sequence = ExportSequence::new();
        assert_eq!(sequence.peek(), 1);
        assert_eq!(sequence.next_export("a.pem").sequence(), 1);
        assert_eq!(sequence.next_export("a.pem").sequence(), 2);
        assert_eq!(sequence.peek(), 3);
    }

    #[test]
    fn test_aggregate_json() {
        let aggregate = AggregateResult {
            flags: ResultFlags::MODIFIED | ResultFlags::UNTRUSTED,
            failing_signature: Some("Sig1".to_string()),
            evaluated: Vec::new(),
        };
        let json = serde_json::to_value(&aggregate).unwrap();
        assert_eq!(json["flags"], 6);
        assert_eq!(json["failing_signature"], "Sig1");
    }
}
