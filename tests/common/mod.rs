//! Test fixtures: a small ECDSA PKI and incrementally signed PDFs built at test time.

#![allow(dead_code)]

use base64::Engine;
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos};
use der::asn1::{BitString, ObjectIdentifier, OctetString, SetOfVec, UtcTime};
use der::{Any, Encode};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use sha2::{Digest, Sha256};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use x509_cert::attr::Attribute;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};
use x509_cert::{Certificate, TbsCertificate, Version};

const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
const ID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");

/// 2020-01-01T00:00:00Z
pub const VALID_FROM: u64 = 1_577_836_800;
/// 2040-01-01T00:00:00Z
pub const VALID_UNTIL: u64 = 2_208_988_800;
/// 2024-03-15T12:00:00Z, the signingTime written into every CMS
pub const SIGNING_TIME: u64 = 1_710_504_000;

/// Hex digits reserved for `/Contents`.
const CONTENTS_PLACEHOLDER: usize = 16384;
const BYTE_RANGE_PLACEHOLDER: &str = "[0 0000000000 0000000000 0000000000]";

fn key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).unwrap()
}

fn ecdsa_sha256() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: ECDSA_WITH_SHA256,
        parameters: None,
    }
}

fn spki_for(key: &SigningKey) -> SubjectPublicKeyInfoOwned {
    let point = key.verifying_key().to_encoded_point(false);
    SubjectPublicKeyInfoOwned {
        algorithm: AlgorithmIdentifierOwned {
            oid: EC_PUBLIC_KEY,
            parameters: Some(Any::encode_from(&SECP256R1).unwrap()),
        },
        subject_public_key: BitString::from_bytes(point.as_bytes()).unwrap(),
    }
}

fn utc(secs: u64) -> Time {
    Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(secs)).unwrap())
}

fn sign_der(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    let signature: Signature = key.sign(message);
    signature.to_der().as_bytes().to_vec()
}

/// Issue a certificate for `subject_key`, signed by `issuer_key`.
pub fn make_certificate(
    subject: &str,
    issuer: &str,
    serial: u8,
    subject_key: &SigningKey,
    issuer_key: &SigningKey,
    not_before: u64,
    not_after: u64,
) -> Certificate {
    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[serial]).unwrap(),
        signature: ecdsa_sha256(),
        issuer: Name::from_str(issuer).unwrap(),
        validity: Validity {
            not_before: utc(not_before),
            not_after: utc(not_after),
        },
        subject: Name::from_str(subject).unwrap(),
        subject_public_key_info: spki_for(subject_key),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };
    let signature = sign_der(issuer_key, &tbs_certificate.to_der().unwrap());
    Certificate {
        tbs_certificate,
        signature_algorithm: ecdsa_sha256(),
        signature: BitString::from_bytes(&signature).unwrap(),
    }
}

/// A signer key and its certificate chain, leaf first.
pub struct TestPki {
    pub signer_key: SigningKey,
    pub chain: Vec<Certificate>,
}

pub const ROOT_DN: &str = "CN=Test Root CA,O=Example Trust,C=HR";
pub const INTERMEDIATE_DN: &str = "CN=Test Intermediate CA,O=Example Trust,C=HR";
pub const SIGNER_DN: &str = "CN=Test Signer,OU=Legal,O=Example Corp,C=HR";

impl TestPki {
    /// Root, intermediate and signer, all valid 2020-2040.
    pub fn three_level() -> Self {
        Self::three_level_with_leaf_validity(VALID_FROM, VALID_UNTIL)
    }

    /// Like [`three_level`](Self::three_level) with a custom signer validity window.
    pub fn three_level_with_leaf_validity(not_before: u64, not_after: u64) -> Self {
        Self::build_three_level((VALID_FROM, VALID_UNTIL), (not_before, not_after))
    }

    /// Like [`three_level`](Self::three_level) with a custom root validity window.
    pub fn three_level_with_root_validity(not_before: u64, not_after: u64) -> Self {
        Self::build_three_level((not_before, not_after), (VALID_FROM, VALID_UNTIL))
    }

    fn build_three_level(root_validity: (u64, u64), (not_before, not_after): (u64, u64)) -> Self {
        let root_key = key(0x11);
        let intermediate_key = key(0x22);
        let signer_key = key(0x33);
        let root = make_certificate(ROOT_DN, ROOT_DN, 1, &root_key, &root_key, root_validity.0, root_validity.1);
        let intermediate =
            make_certificate(INTERMEDIATE_DN, ROOT_DN, 2, &intermediate_key, &root_key, VALID_FROM, VALID_UNTIL);
        let leaf = make_certificate(SIGNER_DN, INTERMEDIATE_DN, 3, &signer_key, &intermediate_key, not_before, not_after);
        Self {
            signer_key,
            chain: vec![leaf, intermediate, root],
        }
    }

    /// A self-signed signer.
    pub fn self_signed(dn: &str, seed: u8, serial: u8) -> Self {
        let signer_key = key(seed);
        let leaf = make_certificate(dn, dn, serial, &signer_key, &signer_key, VALID_FROM, VALID_UNTIL);
        Self {
            signer_key,
            chain: vec![leaf],
        }
    }

    pub fn leaf(&self) -> &Certificate {
        &self.chain[0]
    }

    pub fn root(&self) -> &Certificate {
        &self.chain[self.chain.len() - 1]
    }

    pub fn der(cert: &Certificate) -> Vec<u8> {
        cert.to_der().unwrap()
    }
}

/// A certificate named `subject` whose key sits on secp256k1, which no verifier here
/// supports.
pub fn unsupported_curve_certificate(subject: &str, serial: u8) -> Certificate {
    let signing_key = key(0x77);
    let mut cert = make_certificate(subject, subject, serial, &signing_key, &signing_key, VALID_FROM, VALID_UNTIL);
    cert.tbs_certificate.subject_public_key_info.algorithm.parameters =
        Some(Any::encode_from(&ObjectIdentifier::new_unwrap("1.3.132.0.10")).unwrap());
    cert
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Attribute {
    Attribute {
        oid,
        values: SetOfVec::try_from(vec![value]).unwrap(),
    }
}

/// Detached CMS SignedData over `signed_bytes`, with signed attributes.
pub fn build_cms(signed_bytes: &[u8], pki: &TestPki) -> Vec<u8> {
    let digest = Sha256::digest(signed_bytes).to_vec();
    let signed_attrs = SetOfVec::try_from(vec![
        attribute(ID_CONTENT_TYPE, Any::encode_from(&ID_DATA).unwrap()),
        attribute(ID_SIGNING_TIME, Any::encode_from(&utc(SIGNING_TIME)).unwrap()),
        attribute(ID_MESSAGE_DIGEST, Any::encode_from(&OctetString::new(digest).unwrap()).unwrap()),
    ])
    .unwrap();
    let signature = sign_der(&pki.signer_key, &signed_attrs.to_der().unwrap());

    let leaf = pki.leaf();
    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: leaf.tbs_certificate.issuer.clone(),
            serial_number: leaf.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: AlgorithmIdentifierOwned {
            oid: SHA256,
            parameters: None,
        },
        signed_attrs: Some(signed_attrs),
        signature_algorithm: ecdsa_sha256(),
        signature: OctetString::new(signature).unwrap(),
        unsigned_attrs: None,
    };

    let certificates = pki
        .chain
        .iter()
        .cloned()
        .map(CertificateChoices::Certificate)
        .collect::<Vec<_>>();
    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![AlgorithmIdentifierOwned {
            oid: SHA256,
            parameters: None,
        }])
        .unwrap(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: ID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(SetOfVec::try_from(certificates).unwrap())),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).unwrap()),
    };

    ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::encode_from(&signed_data).unwrap(),
    }
    .to_der()
    .unwrap()
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> usize {
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
        .unwrap()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// What goes into a signature's `/Contents`.
pub enum Contents<'a> {
    /// A real CMS signature by this PKI
    Cms(&'a TestPki),
    /// Arbitrary bytes
    Raw(&'a [u8]),
}

/// Builds a one-page PDF and appends signed or unsigned incremental updates.
pub struct SignedPdfBuilder {
    data: Vec<u8>,
    next_id: u32,
    fields: Vec<u32>,
}

impl Default for SignedPdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SignedPdfBuilder {
    pub fn new() -> Self {
        let data = b"%PDF-1.7\n\
1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n\
3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>\nendobj\n\
trailer\n<< /Size 4 /Root 1 0 R >>\n%%EOF\n"
            .to_vec();
        Self {
            data,
            next_id: 4,
            fields: Vec::new(),
        }
    }

    /// Append an update carrying a signature field `name` signed by `pki`.
    pub fn sign(&mut self, name: &str, pki: &TestPki) -> &mut Self {
        self.sign_with(name, Contents::Cms(pki), "Approval")
    }

    /// Append a signature update with explicit contents and `/Reason`.
    pub fn sign_with(&mut self, name: &str, contents: Contents<'_>, reason: &str) -> &mut Self {
        let sig_id = self.next_id;
        let field_id = self.next_id + 1;
        self.next_id += 2;
        self.fields.push(field_id);

        let update_start = self.data.len();
        let fields = self
            .fields
            .iter()
            .map(|id| format!("{} 0 R", id))
            .collect::<Vec<_>>()
            .join(" ");
        let update = format!(
            "{sig} 0 obj\n<< /Type /Sig /Filter /Adobe.PPKLite /SubFilter /adbe.pkcs7.detached \
/Name ({name} signer) /Reason ({reason}) /M (D:20240315120000Z) /ByteRange {br} /Contents <{zeros}> >>\nendobj\n\
{field} 0 obj\n<< /FT /Sig /T ({name}) /V {sig} 0 R /Type /Annot /Subtype /Widget /Rect [0 0 0 0] >>\nendobj\n\
1 0 obj\n<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [{fields}] /SigFlags 3 >> >>\nendobj\n\
trailer\n<< /Size {size} /Root 1 0 R >>\n%%EOF\n",
            sig = sig_id,
            field = field_id,
            name = name,
            reason = reason,
            br = BYTE_RANGE_PLACEHOLDER,
            zeros = "0".repeat(CONTENTS_PLACEHOLDER),
            fields = fields,
            size = self.next_id,
        );
        self.data.extend_from_slice(update.as_bytes());

        let br_start = find(&self.data, BYTE_RANGE_PLACEHOLDER.as_bytes(), update_start);
        let contents_start = find(&self.data, b"/Contents <", update_start) + "/Contents ".len();
        let contents_end = contents_start + CONTENTS_PLACEHOLDER + 2;
        let total = self.data.len();
        let byte_range = format!(
            "[0 {:010} {:010} {:010}]",
            contents_start,
            contents_end,
            total - contents_end
        );
        self.data[br_start..br_start + byte_range.len()].copy_from_slice(byte_range.as_bytes());

        let mut signed = self.data[..contents_start].to_vec();
        signed.extend_from_slice(&self.data[contents_end..]);
        let value = match contents {
            Contents::Cms(pki) => build_cms(&signed, pki),
            Contents::Raw(bytes) => bytes.to_vec(),
        };
        let hex = to_hex(&value);
        assert!(hex.len() <= CONTENTS_PLACEHOLDER, "signature does not fit the placeholder");
        self.data[contents_start + 1..contents_start + 1 + hex.len()].copy_from_slice(hex.as_bytes());
        self
    }

    /// Append an unsigned incremental update.
    pub fn append_update(&mut self) -> &mut Self {
        let id = self.next_id;
        self.next_id += 1;
        let update = format!(
            "{id} 0 obj\n<< /Producer (later edit) >>\nendobj\ntrailer\n<< /Size {size} /Root 1 0 R /Info {id} 0 R >>\n%%EOF\n",
            id = id,
            size = self.next_id,
        );
        self.data.extend_from_slice(update.as_bytes());
        self
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.data.clone()
    }
}

/// Certificates as a PEM bundle.
pub fn pem_bundle(certs: &[&Certificate]) -> String {
    let mut pem = String::new();
    for cert in certs {
        let encoded = base64::engine::general_purpose::STANDARD.encode(cert.to_der().unwrap());
        pem.push_str("-----BEGIN CERTIFICATE-----\n");
        for line in encoded.as_bytes().chunks(64) {
            pem.push_str(std::str::from_utf8(line).unwrap());
            pem.push('\n');
        }
        pem.push_str("-----END CERTIFICATE-----\n");
    }
    pem
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Flip one byte of the last occurrence of `marker`.
pub fn tamper(data: &mut [u8], marker: &[u8]) {
    let pos = data
        .windows(marker.len())
        .rposition(|w| w == marker)
        .unwrap();
    data[pos] ^= 0x01;
}
