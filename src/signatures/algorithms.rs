//! Public-key signature checks.
//!
//! One entry point, [`verify_signature`], serves both CMS signer signatures and
//! certificate signatures: it derives the digest from the signature algorithm (or from
//! the signer's digest algorithm for bare key OIDs such as `rsaEncryption`), hashes the
//! message and checks the signature with the key from a SubjectPublicKeyInfo.
//!
//! Supported: RSA PKCS#1 v1.5 and ECDSA over P-256 and P-384.

use super::types::DigestAlgorithm;
use crate::error::{Error, Result};
use der::oid::ObjectIdentifier;
use der::{Decode, Encode};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use signature::hazmat::PrehashVerifier;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

pub(crate) const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
pub(crate) const MD5_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.4");
pub(crate) const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
pub(crate) const RSASSA_PSS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.10");
pub(crate) const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
pub(crate) const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
pub(crate) const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
pub(crate) const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
pub(crate) const ECDSA_WITH_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");
pub(crate) const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
pub(crate) const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
pub(crate) const ECDSA_WITH_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");
pub(crate) const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
pub(crate) const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// A verification key decoded from a SubjectPublicKeyInfo.
enum VerificationKey {
    Rsa(RsaPublicKey),
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
}

impl VerificationKey {
    fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let key_bytes = spki.subject_public_key.raw_bytes();
        match spki.algorithm.oid {
            RSA_ENCRYPTION => RsaPublicKey::from_pkcs1_der(key_bytes)
                .map(VerificationKey::Rsa)
                .map_err(|e| Error::SignatureVerification(format!("RSA public key: {}", e))),
            EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or_else(|| Error::SignatureVerification("EC key without curve parameters".to_string()))
                    .and_then(|params| Ok(ObjectIdentifier::from_der(&params.to_der()?)?))?;
                match curve {
                    SECP256R1 => p256::ecdsa::VerifyingKey::from_sec1_bytes(key_bytes)
                        .map(VerificationKey::P256)
                        .map_err(|e| Error::SignatureVerification(format!("P-256 public key: {}", e))),
                    SECP384R1 => p384::ecdsa::VerifyingKey::from_sec1_bytes(key_bytes)
                        .map(VerificationKey::P384)
                        .map_err(|e| Error::SignatureVerification(format!("P-384 public key: {}", e))),
                    other => Err(Error::SignatureVerification(format!("unsupported curve {}", other))),
                }
            },
            other => Err(Error::SignatureVerification(format!("unsupported key algorithm {}", other))),
        }
    }

    fn verify_prehash(&self, digest_alg: DigestAlgorithm, digest: &[u8], signature: &[u8]) -> bool {
        match self {
            VerificationKey::Rsa(key) => {
                if key.verify(pkcs1v15_scheme(digest_alg), digest, signature).is_ok() {
                    return true;
                }
                // Some signers omit the NULL parameters in the DigestInfo
                key.verify(pkcs1v15_scheme_without_null(digest_alg), digest, signature)
                    .is_ok()
            },
            VerificationKey::P256(key) => p256::ecdsa::Signature::from_der(signature)
                .map(|sig| key.verify_prehash(digest, &sig).is_ok())
                .unwrap_or(false),
            VerificationKey::P384(key) => p384::ecdsa::Signature::from_der(signature)
                .map(|sig| key.verify_prehash(digest, &sig).is_ok())
                .unwrap_or(false),
        }
    }
}

fn pkcs1v15_scheme(digest_alg: DigestAlgorithm) -> Pkcs1v15Sign {
    match digest_alg {
        DigestAlgorithm::Md5 => Pkcs1v15Sign::new::<md5::Md5>(),
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
    }
}

/// DigestInfo prefix with an AlgorithmIdentifier that has no NULL parameters.
fn pkcs1v15_scheme_without_null(digest_alg: DigestAlgorithm) -> Pkcs1v15Sign {
    let oid = digest_alg.oid();
    let oid = oid.as_bytes();
    let hash_len = digest_alg.digest(b"").len();
    let mut prefix = vec![
        0x30,
        (oid.len() + 6 + hash_len) as u8,
        0x30,
        (oid.len() + 2) as u8,
        0x06,
        oid.len() as u8,
    ];
    prefix.extend_from_slice(oid);
    prefix.extend_from_slice(&[0x04, hash_len as u8]);
    Pkcs1v15Sign {
        hash_len: Some(hash_len),
        prefix: prefix.into_boxed_slice(),
    }
}

/// Digest algorithm implied by a signature algorithm.
///
/// Bare key algorithms (`rsaEncryption`, `id-ecPublicKey`) carry no digest, so the
/// caller's `fallback` (the CMS signer digest) is used.
pub fn signature_digest(
    algorithm: &AlgorithmIdentifierOwned,
    fallback: Option<DigestAlgorithm>,
) -> Result<DigestAlgorithm> {
    match algorithm.oid {
        MD5_WITH_RSA => Ok(DigestAlgorithm::Md5),
        SHA1_WITH_RSA | ECDSA_WITH_SHA1 => Ok(DigestAlgorithm::Sha1),
        SHA256_WITH_RSA | ECDSA_WITH_SHA256 => Ok(DigestAlgorithm::Sha256),
        SHA384_WITH_RSA | ECDSA_WITH_SHA384 => Ok(DigestAlgorithm::Sha384),
        SHA512_WITH_RSA | ECDSA_WITH_SHA512 => Ok(DigestAlgorithm::Sha512),
        RSA_ENCRYPTION | EC_PUBLIC_KEY => fallback.ok_or_else(|| {
            Error::SignatureVerification(format!("signature algorithm {} names no digest", algorithm.oid))
        }),
        RSASSA_PSS => Err(Error::SignatureVerification("RSASSA-PSS signatures are not supported".to_string())),
        other => Err(Error::SignatureVerification(format!("unsupported signature algorithm {}", other))),
    }
}

/// Check `signature` over `message` with the key in `spki`.
///
/// Returns `Ok(false)` for a signature that does not match and an error when the key
/// or algorithm cannot be used at all.
pub fn verify_signature(
    spki: &SubjectPublicKeyInfoOwned,
    algorithm: &AlgorithmIdentifierOwned,
    fallback_digest: Option<DigestAlgorithm>,
    message: &[u8],
    signature: &[u8],
) -> Result<bool> {
    let digest_alg = signature_digest(algorithm, fallback_digest)?;
    let key = VerificationKey::from_spki(spki)?;
    Ok(key.verify_prehash(digest_alg, &digest_alg.digest(message), signature))
}
