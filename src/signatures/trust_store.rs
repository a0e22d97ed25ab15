//! Trust anchors for certificate chain validation.
//!
//! A store is built once per verification session and never changes afterwards.
//! Certificates loaded from a bundle are keyed by their serial number in radix 36, so a
//! later certificate with the same serial replaces an earlier one.

use super::algorithms::verify_signature;
use super::verifier::to_utc;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use der::{Decode, Encode, Reader, SliceReader};
use indexmap::IndexMap;
use rsa::BigUint;
use spki::SubjectPublicKeyInfoOwned;
use std::path::{Path, PathBuf};
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

/// CA bundle locations probed by [`TrustStore::load_platform`], after `SSL_CERT_FILE`.
const PLATFORM_BUNDLES: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/ca-bundle.pem",
    "/etc/ssl/cert.pem",
    "/usr/local/etc/openssl/cert.pem",
];

/// Where the anchors of a store came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorSource {
    /// The platform CA bundle at this path
    Platform(PathBuf),
    /// Mozilla roots compiled into the binary
    Bundled,
    /// A caller-supplied certificate file
    File(PathBuf),
    /// Certificates handed over in memory
    Memory,
}

/// One trusted subject and key.
///
/// Anchors loaded from certificates keep their validity window. Bundled roots carry
/// none and are usable at any instant.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    subject: Vec<u8>,
    spki: SubjectPublicKeyInfoOwned,
    validity: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl TrustAnchor {
    fn from_certificate(cert: &Certificate) -> Result<Self> {
        let validity = &cert.tbs_certificate.validity;
        Ok(Self {
            subject: cert.tbs_certificate.subject.to_der()?,
            spki: cert.tbs_certificate.subject_public_key_info.clone(),
            validity: Some((to_utc(validity.not_before), to_utc(validity.not_after))),
        })
    }

    /// DER-encoded subject name.
    pub fn subject_der(&self) -> &[u8] {
        &self.subject
    }

    /// Whether the anchor may be used at `at`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        match self.validity {
            Some((not_before, not_after)) => not_before <= at && at <= not_after,
            None => true,
        }
    }
}

/// Immutable set of trust anchors.
#[derive(Debug, Clone)]
pub struct TrustStore {
    anchors: IndexMap<String, TrustAnchor>,
    source: AnchorSource,
}

impl TrustStore {
    /// The platform default store, or the bundled Mozilla roots when no platform
    /// bundle can be read.
    pub fn load_default() -> Result<Self> {
        match Self::load_platform() {
            Ok(store) => Ok(store),
            Err(e) => {
                log::info!("{}; using bundled root certificates", e);
                Self::load_bundled()
            },
        }
    }

    /// The first readable CA bundle among `SSL_CERT_FILE` and the usual system paths.
    pub fn load_platform() -> Result<Self> {
        let candidates = std::env::var_os("SSL_CERT_FILE")
            .map(PathBuf::from)
            .into_iter()
            .chain(PLATFORM_BUNDLES.iter().map(PathBuf::from));

        for path in candidates {
            let Ok(data) = std::fs::read(&path) else {
                continue;
            };
            let certs = match parse_certificates(&data) {
                Ok(certs) if !certs.is_empty() => certs,
                _ => continue,
            };
            let mut anchors = IndexMap::with_capacity(certs.len());
            for (i, cert) in certs.iter().enumerate() {
                // serials are only unique per issuer, keep colliding roots apart
                let mut key = serial_radix36(&cert.tbs_certificate.serial_number);
                if anchors.contains_key(&key) {
                    key = format!("{}#{}", key, i);
                }
                anchors.insert(key, TrustAnchor::from_certificate(cert)?);
            }
            log::debug!("loaded {} platform trust anchors from {}", anchors.len(), path.display());
            return Ok(Self {
                anchors,
                source: AnchorSource::Platform(path),
            });
        }

        Err(Error::TrustStoreUnavailable("no readable platform CA bundle".to_string()))
    }

    /// The Mozilla root program snapshot shipped with `webpki-roots`.
    pub fn load_bundled() -> Result<Self> {
        let mut anchors = IndexMap::with_capacity(webpki_roots::TLS_SERVER_ROOTS.len());
        for (i, root) in webpki_roots::TLS_SERVER_ROOTS.iter().enumerate() {
            let subject = wrap_sequence(root.subject.as_ref());
            let spki = SubjectPublicKeyInfoOwned::from_der(&wrap_sequence(root.subject_public_key_info.as_ref()))?;
            anchors.insert(
                format!("bundled-{}", i),
                TrustAnchor {
                    subject,
                    spki,
                    validity: None,
                },
            );
        }
        if anchors.is_empty() {
            return Err(Error::TrustStoreUnavailable("bundled root set is empty".to_string()));
        }
        Ok(Self {
            anchors,
            source: AnchorSource::Bundled,
        })
    }

    /// Every certificate in a PEM or DER file, keyed by serial number.
    ///
    /// # Errors
    ///
    /// `Error::CertificateParse` when the file cannot be read or holds no certificate.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| Error::CertificateParse(format!("{}: {}", path.display(), e)))?;
        let certs = parse_certificates(&data)
            .map_err(|e| Error::CertificateParse(format!("{}: {}", path.display(), e)))?;
        if certs.is_empty() {
            return Err(Error::CertificateParse(format!("{}: no certificates found", path.display())));
        }
        let mut store = Self {
            anchors: IndexMap::with_capacity(certs.len()),
            source: AnchorSource::File(path.to_path_buf()),
        };
        store.extend(&certs)?;
        log::debug!("loaded {} trust anchors from {}", store.len(), path.display());
        Ok(store)
    }

    /// Build a store from DER certificates held in memory.
    pub fn from_der_certificates<B: AsRef<[u8]>>(certificates: &[B]) -> Result<Self> {
        let certs = certificates
            .iter()
            .map(|der| Certificate::from_der(der.as_ref()).map_err(|e| Error::CertificateParse(e.to_string())))
            .collect::<Result<Vec<_>>>()?;
        let mut store = Self {
            anchors: IndexMap::new(),
            source: AnchorSource::Memory,
        };
        store.extend(&certs)?;
        Ok(store)
    }

    fn extend(&mut self, certs: &[Certificate]) -> Result<()> {
        for cert in certs {
            let key = serial_radix36(&cert.tbs_certificate.serial_number);
            if self.anchors.insert(key.clone(), TrustAnchor::from_certificate(cert)?).is_some() {
                log::debug!("trust anchor with serial {} replaced by a later certificate", key);
            }
        }
        Ok(())
    }

    /// Number of anchors.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// True when the store holds no anchor.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Origin of the anchors.
    pub fn source(&self) -> &AnchorSource {
        &self.source
    }

    /// Anchor stored under a radix-36 serial number.
    pub fn get(&self, serial: &str) -> Option<&TrustAnchor> {
        self.anchors.get(serial)
    }

    /// Whether some anchor valid at `at` issued `cert` (or is `cert` itself).
    ///
    /// The anchor's subject must equal the certificate's issuer and the anchor's key
    /// must verify the certificate's signature. An anchor whose key cannot be used is
    /// skipped; its error is returned only when no other anchor verifies.
    pub fn is_issued_by_anchor(&self, cert: &Certificate, at: DateTime<Utc>) -> Result<bool> {
        let issuer = cert.tbs_certificate.issuer.to_der()?;
        let tbs = cert.tbs_certificate.to_der()?;
        let signature = cert.signature.raw_bytes();
        let mut last_error = None;
        for (key, anchor) in self.anchors.iter().filter(|(_, a)| a.subject == issuer) {
            if !anchor.is_valid_at(at) {
                log::debug!("trust anchor {} is not valid at {}", key, at);
                continue;
            }
            match verify_signature(&anchor.spki, &cert.signature_algorithm, None, &tbs, signature) {
                Ok(true) => return Ok(true),
                Ok(false) => {},
                Err(e) => {
                    log::debug!("trust anchor {} skipped: {}", key, e);
                    last_error = Some(e);
                },
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(false),
        }
    }
}

/// Serial number as a lowercase radix-36 string.
pub fn serial_radix36(serial: &SerialNumber) -> String {
    BigUint::from_bytes_be(serial.as_bytes()).to_str_radix(36)
}

/// PEM `CERTIFICATE` blocks, or a run of concatenated DER certificates.
///
/// A block that is not a certificate is skipped in both forms. A DER run whose framing
/// is broken cannot be resynchronised and fails as a whole.
fn parse_certificates(data: &[u8]) -> Result<Vec<Certificate>> {
    if data.starts_with(&[0x30]) {
        let mut reader = SliceReader::new(data)?;
        let mut certs = Vec::new();
        while !reader.is_finished() {
            let tlv = reader.tlv_bytes()?;
            match Certificate::from_der(tlv) {
                Ok(cert) => certs.push(cert),
                Err(e) => log::warn!("skipping unparseable certificate: {}", e),
            }
        }
        return Ok(certs);
    }

    let mut certs = Vec::new();
    for pem in x509_parser::pem::Pem::iter_from_buffer(data) {
        let pem = pem.map_err(|e| Error::CertificateParse(format!("PEM: {}", e)))?;
        if pem.label != "CERTIFICATE" && pem.label != "TRUSTED CERTIFICATE" {
            continue;
        }
        match Certificate::from_der(&pem.contents) {
            Ok(cert) => certs.push(cert),
            Err(e) => log::warn!("skipping unparseable certificate: {}", e),
        }
    }
    Ok(certs)
}

/// Restore the outer SEQUENCE that `webpki-roots` strips from names and keys.
fn wrap_sequence(contents: &[u8]) -> Vec<u8> {
    let len = contents.len();
    let mut out = Vec::with_capacity(len + 6);
    out.push(0x30);
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let len_bytes: Vec<u8> = len.to_be_bytes().iter().copied().skip_while(|b| *b == 0).collect();
        out.push(0x80 | len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
    out.extend_from_slice(contents);
    out
}
