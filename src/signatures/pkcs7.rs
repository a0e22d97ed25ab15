//! CMS (PKCS#7) SignedData as stored in a signature's `/Contents`.
//!
//! The `/Contents` hex string is a fixed-size placeholder, so the DER value is usually
//! followed by zero padding. [`Pkcs7Signature::from_der`] trims the padding using the
//! outer TLV length before decoding.

use super::algorithms::verify_signature;
use super::types::DigestAlgorithm;
use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::OctetString;
use der::oid::ObjectIdentifier;
use der::{Decode, Encode, Header, Reader, SliceReader};
use x509_cert::time::Time;
use x509_cert::Certificate;

const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
const ID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
const ID_SUBJECT_KEY_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");

/// A decoded CMS SignedData with its signer resolved.
#[derive(Debug, Clone)]
pub struct Pkcs7Signature {
    certificates: Vec<Certificate>,
    signer_index: usize,
    signer_info: SignerInfo,
    digest_algorithm: DigestAlgorithm,
    signing_time: Option<DateTime<Utc>>,
    message_digest: Option<Vec<u8>>,
    encapsulated_content: Option<Vec<u8>>,
}

impl Pkcs7Signature {
    /// Decode a `/Contents` value.
    ///
    /// # Errors
    ///
    /// `Error::SignatureVerification` for anything that is not a SignedData with at
    /// least one signer whose certificate is embedded.
    pub fn from_der(contents: &[u8]) -> Result<Self> {
        let der = trim_to_tlv(contents)?;
        let content_info = ContentInfo::from_der(der)?;
        if content_info.content_type != ID_SIGNED_DATA {
            return Err(Error::SignatureVerification(format!(
                "expected SignedData content, found {}",
                content_info.content_type
            )));
        }
        let signed_data = SignedData::from_der(&content_info.content.to_der()?)?;

        let certificates: Vec<Certificate> = signed_data
            .certificates
            .as_ref()
            .map(|set| {
                set.0
                    .iter()
                    .filter_map(|choice| match choice {
                        CertificateChoices::Certificate(cert) => Some(cert.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let signer_info = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .cloned()
            .ok_or_else(|| Error::SignatureVerification("SignedData has no SignerInfo".to_string()))?;
        if signed_data.signer_infos.0.len() > 1 {
            log::debug!("SignedData carries {} signers, using the first", signed_data.signer_infos.0.len());
        }

        let signer_index = certificates
            .iter()
            .position(|cert| identifies(&signer_info.sid, cert))
            .ok_or_else(|| {
                Error::SignatureVerification("signer certificate not found in SignedData".to_string())
            })?;

        let digest_algorithm = DigestAlgorithm::from_oid(&signer_info.digest_alg.oid)?;

        let mut signing_time = None;
        let mut message_digest = None;
        if let Some(attrs) = &signer_info.signed_attrs {
            for attr in attrs.iter() {
                let Some(value) = attr.values.iter().next() else {
                    continue;
                };
                match attr.oid {
                    ID_MESSAGE_DIGEST => {
                        let digest = OctetString::from_der(&value.to_der()?)?;
                        message_digest = Some(digest.as_bytes().to_vec());
                    },
                    ID_SIGNING_TIME => {
                        let time = Time::from_der(&value.to_der()?)?;
                        signing_time = Utc
                            .timestamp_opt(time.to_unix_duration().as_secs() as i64, 0)
                            .single();
                    },
                    _ => {},
                }
            }
        }

        let encapsulated_content = signed_data
            .encap_content_info
            .econtent
            .as_ref()
            .map(|content| OctetString::from_der(&content.to_der()?).map(|octets| octets.as_bytes().to_vec()))
            .transpose()?;

        Ok(Self {
            certificates,
            signer_index,
            signer_info,
            digest_algorithm,
            signing_time,
            message_digest,
            encapsulated_content,
        })
    }

    /// The certificate that produced the signature.
    pub fn signer_certificate(&self) -> &Certificate {
        &self.certificates[self.signer_index]
    }

    /// Every certificate embedded in the SignedData, in encoded order.
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// The `signingTime` signed attribute, if present.
    pub fn signing_time(&self) -> Option<DateTime<Utc>> {
        self.signing_time
    }

    /// Digest algorithm of the signer.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// Check the signature against the bytes its `/ByteRange` selects.
    ///
    /// `Ok(false)` means the bytes or the signature do not match; errors are reserved
    /// for structures that cannot be checked at all.
    pub fn verify_content(&self, signed_bytes: &[u8]) -> Result<bool> {
        // adbe.pkcs7.sha1 signs a SHA-1 of the range carried as eContent
        let content: &[u8] = match &self.encapsulated_content {
            Some(encapsulated) => {
                if DigestAlgorithm::Sha1.digest(signed_bytes) != *encapsulated {
                    log::debug!("encapsulated SHA-1 does not match the signed range");
                    return Ok(false);
                }
                encapsulated
            },
            None => signed_bytes,
        };

        let spki = &self.signer_certificate().tbs_certificate.subject_public_key_info;
        let signature = self.signer_info.signature.as_bytes();
        let algorithm = &self.signer_info.signature_algorithm;

        match &self.signer_info.signed_attrs {
            Some(attrs) => {
                let expected = self
                    .message_digest
                    .as_ref()
                    .ok_or_else(|| Error::SignatureVerification("signed attributes lack messageDigest".to_string()))?;
                if self.digest_algorithm.digest(content) != *expected {
                    log::debug!("messageDigest does not match the signed content");
                    return Ok(false);
                }
                let attrs_der = attrs.to_der()?;
                verify_signature(spki, algorithm, Some(self.digest_algorithm), &attrs_der, signature)
            },
            None => verify_signature(spki, algorithm, Some(self.digest_algorithm), content, signature),
        }
    }
}

/// Cut `bytes` down to the first complete DER value.
fn trim_to_tlv(bytes: &[u8]) -> Result<&[u8]> {
    let mut reader = SliceReader::new(bytes)?;
    let header = Header::decode(&mut reader)?;
    let total = (header.encoded_len()? + header.length)?;
    let total = usize::try_from(total)?;
    if reader.remaining_len() < header.length {
        return Err(Error::SignatureVerification("truncated signature value".to_string()));
    }
    Ok(&bytes[..total])
}

fn identifies(sid: &SignerIdentifier, cert: &Certificate) -> bool {
    match sid {
        SignerIdentifier::IssuerAndSerialNumber(ias) => {
            cert.tbs_certificate.issuer == ias.issuer && cert.tbs_certificate.serial_number == ias.serial_number
        },
        SignerIdentifier::SubjectKeyIdentifier(ski) => subject_key_identifier(cert)
            .map(|id| id == ski.0.as_bytes())
            .unwrap_or(false),
    }
}

fn subject_key_identifier(cert: &Certificate) -> Option<Vec<u8>> {
    cert.tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == ID_SUBJECT_KEY_IDENTIFIER)
        .and_then(|ext| OctetString::from_der(ext.extn_value.as_bytes()).ok())
        .map(|id| id.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_padding() {
        let mut padded = vec![0x30, 0x03, 0x02, 0x01, 0x05];
        padded.extend_from_slice(&[0u8; 32]);
        assert_eq!(trim_to_tlv(&padded).unwrap(), &[0x30, 0x03, 0x02, 0x01, 0x05]);
    }

    #[test]
    fn test_trim_truncated() {
        assert!(trim_to_tlv(&[0x30, 0x10, 0x02]).is_err());
    }

    #[test]
    fn test_all_zero_contents_rejected() {
        let err = Pkcs7Signature::from_der(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, Error::SignatureVerification(_)));
    }

    #[test]
    fn test_not_der_rejected() {
        assert!(Pkcs7Signature::from_der(b"not a signature").is_err());
    }
}
