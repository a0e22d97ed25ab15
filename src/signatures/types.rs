//! Signature data types.
//!
//! Dictionary metadata, digest algorithms, subject names, and the trust outcome of a
//! verified signature.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use der::oid::ObjectIdentifier;
use serde::Serialize;
use sha2::Digest;
use x509_parser::x509::AttributeTypeAndValue;

/// Digest algorithm named by a CMS `SignerInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DigestAlgorithm {
    /// MD5 (legacy producers only)
    Md5,
    /// SHA-1 (deprecated, but still common in legacy PDFs)
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    pub(crate) const MD5_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.2.5");
    pub(crate) const SHA1_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
    pub(crate) const SHA256_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
    pub(crate) const SHA384_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
    pub(crate) const SHA512_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

    /// OID of this algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Md5 => Self::MD5_OID,
            DigestAlgorithm::Sha1 => Self::SHA1_OID,
            DigestAlgorithm::Sha256 => Self::SHA256_OID,
            DigestAlgorithm::Sha384 => Self::SHA384_OID,
            DigestAlgorithm::Sha512 => Self::SHA512_OID,
        }
    }

    /// Algorithm for a digest OID.
    pub fn from_oid(oid: &ObjectIdentifier) -> Result<Self> {
        [
            DigestAlgorithm::Md5,
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ]
        .into_iter()
        .find(|alg| alg.oid() == *oid)
        .ok_or_else(|| Error::SignatureVerification(format!("unsupported digest algorithm {}", oid)))
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Hash `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Md5 => md5::Md5::digest(data).to_vec(),
            DigestAlgorithm::Sha1 => sha1::Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }
}

/// Signature sub-filter (signature format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached - PKCS#7 detached signature
    Pkcs7Detached,
    /// adbe.pkcs7.sha1 - PKCS#7 over a SHA-1 digest of the range
    Pkcs7Sha1,
    /// ETSI.CAdES.detached - PAdES CAdES signature
    CadesDetached,
    /// ETSI.RFC3161 - Document timestamp
    Rfc3161,
}

impl SignatureSubFilter {
    /// PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::Pkcs7Sha1 => "adbe.pkcs7.sha1",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
            SignatureSubFilter::Rfc3161 => "ETSI.RFC3161",
        }
    }

    /// Parse a PDF name into a sub-filter type.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "adbe.pkcs7.sha1" => Some(SignatureSubFilter::Pkcs7Sha1),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            "ETSI.RFC3161" => Some(SignatureSubFilter::Rfc3161),
            _ => None,
        }
    }
}

/// Descriptive entries of a signature dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignatureInfo {
    /// `/Name`: signer name as entered by the signing tool
    pub signer_name: Option<String>,
    /// `/M`: claimed signing time, as written
    pub signing_time: Option<String>,
    /// `/Reason`
    pub reason: Option<String>,
    /// `/Location`
    pub location: Option<String>,
    /// `/ContactInfo`
    pub contact_info: Option<String>,
    /// `/Filter`: preferred signature handler
    pub filter: Option<String>,
    /// `/SubFilter`
    pub sub_filter: Option<SignatureSubFilter>,
}

impl SignatureInfo {
    /// Collect the descriptive entries of a signature dictionary.
    pub fn from_dictionary(dict: &Dictionary) -> Self {
        let text = |key: &str| dict.get(key).and_then(Object::as_text);
        Self {
            signer_name: text("Name"),
            signing_time: text("M"),
            reason: text("Reason"),
            location: text("Location"),
            contact_info: text("ContactInfo"),
            filter: dict.get("Filter").and_then(|f| f.as_name()).map(str::to_string),
            sub_filter: dict
                .get("SubFilter")
                .and_then(|f| f.as_name())
                .and_then(SignatureSubFilter::from_pdf_name),
        }
    }

    /// `/M` parsed as an instant.
    pub fn signing_instant(&self) -> Option<DateTime<Utc>> {
        self.signing_time.as_deref().and_then(parse_pdf_date)
    }
}

/// Parse a PDF date string (`D:YYYYMMDDHHmmSSOHH'mm'`).
///
/// Every field after the year is optional; a missing offset means UTC.
pub fn parse_pdf_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    let s = trimmed.strip_prefix("D:").unwrap_or(trimmed);
    let digit_len = s.bytes().take_while(u8::is_ascii_digit).count();
    let digits = &s[..digit_len];
    if digits.len() < 4 {
        return None;
    }
    let field = |start: usize, default: u32| -> u32 {
        digits
            .get(start..start + 2)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    };

    let year: i32 = digits[..4].parse().ok()?;
    let naive = NaiveDate::from_ymd_opt(year, field(4, 1), field(6, 1))?
        .and_hms_opt(field(8, 0), field(10, 0), field(12, 0))?;

    let zone = &s[digit_len..];
    let offset_secs = match zone.as_bytes().first() {
        Some(sign @ (b'+' | b'-')) => {
            let tz: String = zone[1..].chars().filter(char::is_ascii_digit).collect();
            let hours: i32 = tz.get(0..2).and_then(|v| v.parse().ok()).unwrap_or(0);
            let minutes: i32 = tz.get(2..4).and_then(|v| v.parse().ok()).unwrap_or(0);
            let secs = hours * 3600 + minutes * 60;
            if *sign == b'-' {
                -secs
            } else {
                secs
            }
        },
        _ => 0,
    };

    FixedOffset::east_opt(offset_secs)?
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Decomposed subject name of a certificate, for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubjectFields {
    /// CN
    pub common_name: Option<String>,
    /// O
    pub organization: Option<String>,
    /// OU
    pub organizational_unit: Option<String>,
    /// L
    pub locality: Option<String>,
    /// ST
    pub state: Option<String>,
    /// C
    pub country: Option<String>,
    /// emailAddress
    pub email: Option<String>,
}

impl SubjectFields {
    /// Decompose the subject of a DER certificate.
    pub fn from_certificate_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| Error::CertificateParse(format!("signer certificate: {}", e)))?;
        let subject = cert.subject();
        Ok(Self {
            common_name: first_value(subject.iter_common_name()),
            organization: first_value(subject.iter_organization()),
            organizational_unit: first_value(subject.iter_organizational_unit()),
            locality: first_value(subject.iter_locality()),
            state: first_value(subject.iter_state_or_province()),
            country: first_value(subject.iter_country()),
            email: first_value(subject.iter_email()),
        })
    }
}

fn first_value<'a, 'b: 'a>(mut values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> Option<String> {
    values.next().and_then(|v| v.as_str().ok()).map(str::to_string)
}

impl std::fmt::Display for SubjectFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = [
            ("CN", &self.common_name),
            ("OU", &self.organizational_unit),
            ("O", &self.organization),
            ("L", &self.locality),
            ("ST", &self.state),
            ("C", &self.country),
            ("E", &self.email),
        ];
        let rendered: Vec<String> = parts
            .iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| format!("{}={}", key, v)))
            .collect();
        write!(f, "{}", rendered.join(", "))
    }
}

/// The certificate a trust failure refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateSummary {
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Serial number in radix 36
    pub serial: String,
}

impl std::fmt::Display for CertificateSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (serial {}, issued by {})", self.subject, self.serial, self.issuer)
    }
}

/// Why a certificate in the signer's chain was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Validity ended before the signing instant
    Expired {
        /// End of validity
        not_after: DateTime<Utc>,
        /// Instant the chain was validated at
        checked_at: DateTime<Utc>,
    },
    /// Validity started after the signing instant
    NotYetValid {
        /// Start of validity
        not_before: DateTime<Utc>,
        /// Instant the chain was validated at
        checked_at: DateTime<Utc>,
    },
    /// Neither a trust anchor nor a later chain certificate issued it
    UntrustedIssuer,
    /// Key or signature algorithm this crate cannot check
    UnsupportedAlgorithm {
        /// Algorithm details
        detail: String,
    },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Expired { not_after, checked_at } => {
                write!(f, "certificate expired on {} (checked at {})", not_after, checked_at)
            },
            FailureReason::NotYetValid { not_before, checked_at } => {
                write!(f, "certificate not valid before {} (checked at {})", not_before, checked_at)
            },
            FailureReason::UntrustedIssuer => {
                write!(f, "cannot be verified against the trust store or the certificate chain")
            },
            FailureReason::UnsupportedAlgorithm { detail } => {
                write!(f, "unsupported certificate algorithm: {}", detail)
            },
        }
    }
}

/// Result of validating a signer's certificate chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// The chain reaches a trust anchor and every certificate was valid at signing time
    Trusted,
    /// The first certificate that failed, and why
    Failed {
        /// Rejected certificate
        certificate: CertificateSummary,
        /// Rejection reason
        reason: FailureReason,
    },
}

impl VerificationOutcome {
    /// True for `Trusted`.
    pub fn is_trusted(&self) -> bool {
        matches!(self, VerificationOutcome::Trusted)
    }

    /// Certificate and reason of a failure.
    pub fn failure(&self) -> Option<(&CertificateSummary, &FailureReason)> {
        match self {
            VerificationOutcome::Trusted => None,
            VerificationOutcome::Failed { certificate, reason } => Some((certificate, reason)),
        }
    }
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationOutcome::Trusted => write!(f, "trusted"),
            VerificationOutcome::Failed { certificate, reason } => {
                write!(f, "certificate {} failed: {}", certificate, reason)
            },
        }
    }
}
