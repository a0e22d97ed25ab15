//! Certificate chain building and validation.
//!
//! Validation walks the chain from the signer upwards. For every certificate it checks
//! the validity window at the signing instant, then whether a trust anchor issued it,
//! then whether a certificate later in the chain issued it. The first certificate that
//! fails decides the outcome.

use super::algorithms::verify_signature;
use super::trust_store::{serial_radix36, TrustStore};
use super::types::{CertificateSummary, FailureReason, VerificationOutcome};
use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use der::Encode;
use x509_cert::time::Time;
use x509_cert::Certificate;

/// Validates signer chains against one trust store.
pub struct ChainVerifier<'a> {
    trust_store: &'a TrustStore,
}

impl<'a> ChainVerifier<'a> {
    /// Create a verifier backed by `trust_store`.
    pub fn new(trust_store: &'a TrustStore) -> Self {
        Self { trust_store }
    }

    /// Order the signer and its issuers found in `pool`, leaf first.
    ///
    /// Stops at a self-issued certificate or when no issuer is available.
    pub fn build_chain(signer: &Certificate, pool: &[Certificate]) -> Vec<Certificate> {
        let mut chain = vec![signer.clone()];
        while chain.len() <= pool.len() {
            let current = &chain[chain.len() - 1];
            if current.tbs_certificate.subject == current.tbs_certificate.issuer {
                break;
            }
            let next = pool
                .iter()
                .filter(|candidate| !chain.contains(candidate))
                .find(|candidate| issued_by(current, candidate).unwrap_or(false))
                .cloned();
            match next {
                Some(issuer) => chain.push(issuer),
                None => break,
            }
        }
        chain
    }

    /// Validate `chain` (leaf first) at instant `at`.
    pub fn verify(&self, chain: &[Certificate], at: DateTime<Utc>) -> VerificationOutcome {
        for (i, cert) in chain.iter().enumerate() {
            if let Some(reason) = validity_failure(cert, at) {
                return failed(cert, reason);
            }

            match self.trust_store.is_issued_by_anchor(cert, at) {
                Ok(true) => return VerificationOutcome::Trusted,
                Ok(false) => {},
                Err(e) => return failed(cert, unsupported(e)),
            }

            let mut issuer_found = false;
            for later in &chain[i + 1..] {
                match issued_by(cert, later) {
                    Ok(true) => {
                        issuer_found = true;
                        break;
                    },
                    Ok(false) => {},
                    Err(e) => return failed(cert, unsupported(e)),
                }
            }
            if !issuer_found {
                return failed(cert, FailureReason::UntrustedIssuer);
            }
        }

        // every issuer was found in the chain but none of them is anchored
        match chain.last() {
            Some(root) => failed(root, FailureReason::UntrustedIssuer),
            None => VerificationOutcome::Failed {
                certificate: CertificateSummary {
                    subject: String::new(),
                    issuer: String::new(),
                    serial: String::new(),
                },
                reason: FailureReason::UntrustedIssuer,
            },
        }
    }
}

/// Summary used in reports and failure outcomes.
pub fn summarize(cert: &Certificate) -> CertificateSummary {
    CertificateSummary {
        subject: cert.tbs_certificate.subject.to_string(),
        issuer: cert.tbs_certificate.issuer.to_string(),
        serial: serial_radix36(&cert.tbs_certificate.serial_number),
    }
}

fn failed(cert: &Certificate, reason: FailureReason) -> VerificationOutcome {
    VerificationOutcome::Failed {
        certificate: summarize(cert),
        reason,
    }
}

fn unsupported(err: Error) -> FailureReason {
    FailureReason::UnsupportedAlgorithm { detail: err.to_string() }
}

pub(super) fn to_utc(time: Time) -> DateTime<Utc> {
    Utc.timestamp_opt(time.to_unix_duration().as_secs() as i64, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn validity_failure(cert: &Certificate, at: DateTime<Utc>) -> Option<FailureReason> {
    let validity = &cert.tbs_certificate.validity;
    let not_before = to_utc(validity.not_before);
    let not_after = to_utc(validity.not_after);
    if at < not_before {
        Some(FailureReason::NotYetValid {
            not_before,
            checked_at: at,
        })
    } else if at > not_after {
        Some(FailureReason::Expired {
            not_after,
            checked_at: at,
        })
    } else {
        None
    }
}

/// Whether `issuer`'s subject and key account for `cert`.
fn issued_by(cert: &Certificate, issuer: &Certificate) -> Result<bool> {
    if cert.tbs_certificate.issuer != issuer.tbs_certificate.subject {
        return Ok(false);
    }
    let tbs = cert.tbs_certificate.to_der()?;
    verify_signature(
        &issuer.tbs_certificate.subject_public_key_info,
        &cert.signature_algorithm,
        None,
        &tbs,
        cert.signature.raw_bytes(),
    )
}
