//! Chain validation, trust stores and certificate export.

mod common;

use common::{
    pem_bundle, unsupported_curve_certificate, write_file, SignedPdfBuilder, TestPki, ROOT_DN, SIGNING_TIME, VALID_FROM,
};
use der::{Decode, Encode};
use pdf_sigcheck::parser_config::ParserOptions;
use pdf_sigcheck::session::CertificateExport;
use pdf_sigcheck::signatures::{serial_radix36, AnchorSource, FailureReason, TrustStore, VerificationOutcome};
use pdf_sigcheck::{Error, SignatureCatalog};
use std::sync::Arc;
use x509_cert::Certificate;

fn catalog_with(store: TrustStore, bytes: Vec<u8>) -> SignatureCatalog {
    SignatureCatalog::from_bytes(bytes, Arc::new(store), ParserOptions::default()).unwrap()
}

fn store_of(certs: &[&Certificate]) -> TrustStore {
    let ders: Vec<Vec<u8>> = certs.iter().map(|c| TestPki::der(c)).collect();
    TrustStore::from_der_certificates(&ders).unwrap()
}

#[test]
fn test_chain_to_trusted_root() {
    let pki = TestPki::three_level();
    let catalog = catalog_with(store_of(&[pki.root()]), SignedPdfBuilder::new().sign("Sig1", &pki).bytes());
    let record = catalog.revision("Sig1").unwrap();

    assert_eq!(record.certificate_chain().unwrap().len(), 3);
    assert_eq!(record.verify(None).unwrap(), VerificationOutcome::Trusted);
}

#[test]
fn test_missing_root_fails_at_root() {
    let pki = TestPki::three_level();
    let other = TestPki::self_signed("CN=Unrelated CA", 0x44, 9);
    let catalog = catalog_with(store_of(&[other.leaf()]), SignedPdfBuilder::new().sign("Sig1", &pki).bytes());

    let outcome = catalog.revision("Sig1").unwrap().verify(None).unwrap();
    let (certificate, reason) = outcome.failure().unwrap();
    assert_eq!(reason, &FailureReason::UntrustedIssuer);
    assert!(certificate.subject.contains("Test Root CA"));
}

#[test]
fn test_self_signed_signer_directly_trusted() {
    let pki = TestPki::self_signed("CN=Solo Signer,O=Example Corp", 0x55, 7);
    let bytes = SignedPdfBuilder::new().sign("Sig1", &pki).bytes();

    let trusted = catalog_with(store_of(&[pki.leaf()]), bytes.clone());
    assert!(trusted.revision("Sig1").unwrap().verify(None).unwrap().is_trusted());

    let untrusted = catalog_with(store_of(&[]), bytes);
    let outcome = untrusted.revision("Sig1").unwrap().verify(None).unwrap();
    let (certificate, reason) = outcome.failure().unwrap();
    assert_eq!(reason, &FailureReason::UntrustedIssuer);
    assert!(certificate.subject.contains("Solo Signer"));
    assert_eq!(certificate.serial, serial_radix36(&pki.leaf().tbs_certificate.serial_number));
}

#[test]
fn test_expired_signer() {
    // valid 2020-2021, signed 2024
    let pki = TestPki::three_level_with_leaf_validity(VALID_FROM, VALID_FROM + 365 * 24 * 3600);
    let catalog = catalog_with(store_of(&[pki.root()]), SignedPdfBuilder::new().sign("Sig1", &pki).bytes());

    let outcome = catalog.revision("Sig1").unwrap().verify(None).unwrap();
    match outcome {
        VerificationOutcome::Failed {
            certificate,
            reason: FailureReason::Expired { checked_at, .. },
        } => {
            assert!(certificate.subject.contains("Test Signer"));
            assert_eq!(checked_at.timestamp(), SIGNING_TIME as i64);
        },
        other => panic!("expected expiry, got {:?}", other),
    }
}

#[test]
fn test_expired_anchor_is_not_trusted() {
    // root anchor valid 2020-2021, signed 2024
    let pki = TestPki::three_level_with_root_validity(VALID_FROM, VALID_FROM + 365 * 24 * 3600);
    let catalog = catalog_with(store_of(&[pki.root()]), SignedPdfBuilder::new().sign("Sig1", &pki).bytes());

    let outcome = catalog.revision("Sig1").unwrap().verify(None).unwrap();
    assert!(!outcome.is_trusted());
    let (certificate, reason) = outcome.failure().unwrap();
    assert!(certificate.subject.contains("Test Root CA"));
    assert!(matches!(reason, FailureReason::Expired { .. }));
}

#[test]
fn test_unusable_anchor_does_not_hide_valid_one() {
    let pki = TestPki::three_level();
    let bytes = SignedPdfBuilder::new().sign("Sig1", &pki).bytes();
    let unusable = unsupported_curve_certificate(ROOT_DN, 9);

    let catalog = catalog_with(store_of(&[&unusable, pki.root()]), bytes.clone());
    assert!(catalog.revision("Sig1").unwrap().verify(None).unwrap().is_trusted());

    let catalog = catalog_with(store_of(&[&unusable]), bytes);
    let outcome = catalog.revision("Sig1").unwrap().verify(None).unwrap();
    let (certificate, reason) = outcome.failure().unwrap();
    assert!(certificate.subject.contains("Test Intermediate CA"));
    assert!(matches!(reason, FailureReason::UnsupportedAlgorithm { .. }));
}

#[test]
fn test_signing_time_from_cms() {
    let pki = TestPki::three_level();
    let catalog = catalog_with(store_of(&[pki.root()]), SignedPdfBuilder::new().sign("Sig1", &pki).bytes());
    let record = catalog.revision("Sig1").unwrap();
    assert_eq!(record.signing_time().timestamp(), SIGNING_TIME as i64);
}

#[test]
fn test_subject_fields() {
    let pki = TestPki::three_level();
    let catalog = catalog_with(store_of(&[pki.root()]), SignedPdfBuilder::new().sign("Sig1", &pki).bytes());
    let subject = catalog.revision("Sig1").unwrap().subject().unwrap();
    assert_eq!(subject.common_name.as_deref(), Some("Test Signer"));
    assert_eq!(subject.organization.as_deref(), Some("Example Corp"));
    assert_eq!(subject.organizational_unit.as_deref(), Some("Legal"));
    assert_eq!(subject.country.as_deref(), Some("HR"));
}

#[test]
fn test_export_writes_whole_chain() {
    let pki = TestPki::three_level();
    let catalog = catalog_with(store_of(&[]), SignedPdfBuilder::new().sign("Sig1", &pki).bytes());
    let record = catalog.revision("Sig1").unwrap();
    let dir = tempfile::tempdir().unwrap();

    let export = CertificateExport::new(dir.path().join("out.pem"), 1);
    // exported even though the chain is untrusted
    assert!(!record.verify(Some(&export)).unwrap().is_trusted());

    for (index, name) in ["out_rev1.pem", "out1_rev1.pem", "out2_rev1.pem"].iter().enumerate() {
        let der = std::fs::read(dir.path().join(name)).unwrap();
        let cert = Certificate::from_der(&der).unwrap();
        assert_eq!(cert, pki.chain[index]);
    }
}

#[test]
fn test_export_into_missing_directory_does_not_fail_verify() {
    let pki = TestPki::three_level();
    let catalog = catalog_with(store_of(&[pki.root()]), SignedPdfBuilder::new().sign("Sig1", &pki).bytes());
    let record = catalog.revision("Sig1").unwrap();

    let export = CertificateExport::new("/nonexistent/dir/out.pem", 1);
    assert!(record.verify(Some(&export)).unwrap().is_trusted());
    assert!(matches!(record.export_certificates(&export), Err(Error::ExportIo { .. })));
}

#[test]
fn test_load_pem_trust_file() {
    let pki = TestPki::three_level();
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "roots.pem", pem_bundle(&[pki.root(), &pki.chain[1]]).as_bytes());

    let store = TrustStore::load_from_file(&path).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.source(), &AnchorSource::File(path.clone()));
    assert!(store.get(&serial_radix36(&pki.root().tbs_certificate.serial_number)).is_some());

    let catalog = catalog_with(store, SignedPdfBuilder::new().sign("Sig1", &pki).bytes());
    assert!(catalog.revision("Sig1").unwrap().verify(None).unwrap().is_trusted());
}

#[test]
fn test_load_der_trust_file() {
    let pki = TestPki::three_level();
    let dir = tempfile::tempdir().unwrap();
    let mut der = pki.root().to_der().unwrap();
    der.extend(pki.chain[1].to_der().unwrap());
    let path = write_file(dir.path(), "roots.der", &der);

    let store = TrustStore::load_from_file(&path).unwrap();
    assert_eq!(store.len(), 2);
}

#[test]
fn test_der_trust_file_skips_non_certificate() {
    let pki = TestPki::three_level();
    let dir = tempfile::tempdir().unwrap();
    let mut der = pki.root().to_der().unwrap();
    der.extend_from_slice(&[0x30, 0x03, 0x02, 0x01, 0x01]);
    der.extend(pki.chain[1].to_der().unwrap());
    let path = write_file(dir.path(), "roots.der", &der);

    let store = TrustStore::load_from_file(&path).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.get(&serial_radix36(&pki.chain[1].tbs_certificate.serial_number)).is_some());
}

#[test]
fn test_same_serial_replaces_anchor() {
    let first = TestPki::self_signed("CN=First", 0x61, 5);
    let second = TestPki::self_signed("CN=Second", 0x62, 5);
    let store = store_of(&[first.leaf(), second.leaf()]);
    assert_eq!(store.len(), 1);
    let anchor = store.get(&serial_radix36(&second.leaf().tbs_certificate.serial_number)).unwrap();
    assert_eq!(anchor.subject_der(), second.leaf().tbs_certificate.subject.to_der().unwrap().as_slice());
}

#[test]
fn test_load_default_store() {
    let store = TrustStore::load_default().unwrap();
    assert!(!store.is_empty());
}
