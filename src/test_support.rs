//! Fixtures shared by the unit tests.

use der::asn1::OctetString;
use der::Encode;
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use x509_cert::certificate::Version;
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::pkix::{AuthorityKeyIdentifier, CrlReason};
use x509_cert::ext::Extension;
use x509_cert::serial_number::SerialNumber;

use crate::algorithms;
use crate::certificate::Certificate;
use crate::crl::Crl;
use crate::name_codec;
use crate::oids;
use crate::request::RequestBuilder;
use crate::timefmt;

pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

/// Self-signed v1 certificate for `subject` with a fresh P-256 key.
pub fn self_signed(subject: &str) -> (Certificate, PKey<Private>) {
    let key = ec_key();
    let csr = RequestBuilder::new().subject(subject).build(&key).unwrap();
    let mut cert = Certificate::from_request(&csr).unwrap();
    cert.sign(&key, None).unwrap();
    (cert, key)
}

fn extension(oid: const_oid::ObjectIdentifier, value: Vec<u8>) -> Extension {
    Extension {
        extn_id: oid,
        critical: false,
        extn_value: OctetString::new(value).unwrap(),
    }
}

/// v2 CRL signed by `key`, numbered 42, with keyIdentifier 0102030405.
///
/// `revoked` lists (hex serial, reason) pairs.
pub fn signed_crl(key: &PKey<Private>, issuer: &str, revoked: &[(&str, Option<CrlReason>)]) -> Crl {
    let digest = algorithms::resolve_digest(key, None).unwrap();
    let algorithm = algorithms::signature_algorithm(key, digest).unwrap();

    let entries: Vec<RevokedCert> = revoked
        .iter()
        .map(|(serial, reason)| RevokedCert {
            serial_number: SerialNumber::new(&hex::decode(serial).unwrap()).unwrap(),
            revocation_date: timefmt::time_from_now(-60).unwrap(),
            crl_entry_extensions: reason
                .map(|r| vec![extension(oids::CRL_REASON, r.to_der().unwrap())]),
        })
        .collect();

    let aki = AuthorityKeyIdentifier {
        key_identifier: Some(OctetString::new(vec![1, 2, 3, 4, 5]).unwrap()),
        authority_cert_issuer: None,
        authority_cert_serial_number: None,
    };

    let tbs_cert_list = TbsCertList {
        version: Version::V2,
        signature: algorithm.clone(),
        issuer: name_codec::parse_name(issuer).unwrap(),
        this_update: timefmt::time_from_now(0).unwrap(),
        next_update: Some(timefmt::time_from_now(7 * 86_400).unwrap()),
        revoked_certificates: if entries.is_empty() { None } else { Some(entries) },
        crl_extensions: Some(vec![
            extension(oids::CRL_NUMBER, vec![0x02, 0x01, 0x2A]),
            extension(oids::AUTHORITY_KEY_IDENTIFIER, aki.to_der().unwrap()),
        ]),
    };

    let tbs = tbs_cert_list.to_der().unwrap();
    let signature = algorithms::sign(key, digest, &tbs).unwrap();

    Crl::from_inner(CertificateList {
        tbs_cert_list,
        signature_algorithm: algorithm,
        signature: der::asn1::BitString::from_bytes(&signature).unwrap(),
    })
}
