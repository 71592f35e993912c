//! Digest resolution, signature algorithm selection and raw sign/verify.
//!
//! The X.509 structures are held as `x509-cert` types while the actual
//! cryptography runs through OpenSSL. This module is the bridge: it picks the
//! signature `AlgorithmIdentifier` for a key and digest, signs or verifies the
//! DER of a to-be-signed structure, and turns OIDs into the long names from
//! OpenSSL's object database.

use const_oid::ObjectIdentifier;
use der::asn1::Any;
use der::{Decode, Encode};
use openssl::asn1::Asn1Object;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, Id, PKey, PKeyRef, Private, Public};
use openssl::sign::{Signer, Verifier};
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::error::{PkiError, Result, VerificationFailure};
use crate::oids;

/// Digest to use with `key`.
///
/// `None` picks the key's default: SHA-256 for RSA, EC and DSA keys, no
/// separate digest for Ed25519/Ed448. A named digest must be known to OpenSSL.
pub fn resolve_digest<T>(key: &PKeyRef<T>, name: Option<&str>) -> Result<Option<MessageDigest>> {
    match name {
        Some(name) if !name.is_empty() => {
            if matches!(key.id(), Id::ED25519 | Id::ED448) {
                return Err(PkiError::unsupported(format!(
                    "{:?} keys do not take a separate digest ({})",
                    key.id(),
                    name
                )));
            }
            MessageDigest::from_name(name)
                .map(Some)
                .ok_or_else(|| PkiError::unsupported(format!("Unknown digest: {}", name)))
        }
        _ => match key.id() {
            Id::RSA | Id::EC | Id::DSA => Ok(Some(MessageDigest::sha256())),
            Id::ED25519 | Id::ED448 => Ok(None),
            other => Err(PkiError::unsupported(format!(
                "No default digest for key type {:?}",
                other
            ))),
        },
    }
}

/// Signature algorithm identifier for a key type and digest.
pub fn signature_algorithm<T>(
    key: &PKeyRef<T>,
    digest: Option<MessageDigest>,
) -> Result<AlgorithmIdentifierOwned> {
    let digest_nid = digest.map(|md| md.type_());

    let (oid, null_params) = match (key.id(), digest_nid) {
        (Id::RSA, Some(Nid::SHA1)) => (oids::SHA1_WITH_RSA, true),
        (Id::RSA, Some(Nid::SHA224)) => (oids::SHA224_WITH_RSA, true),
        (Id::RSA, Some(Nid::SHA256)) => (oids::SHA256_WITH_RSA, true),
        (Id::RSA, Some(Nid::SHA384)) => (oids::SHA384_WITH_RSA, true),
        (Id::RSA, Some(Nid::SHA512)) => (oids::SHA512_WITH_RSA, true),
        (Id::EC, Some(Nid::SHA1)) => (oids::ECDSA_WITH_SHA1, false),
        (Id::EC, Some(Nid::SHA224)) => (oids::ECDSA_WITH_SHA224, false),
        (Id::EC, Some(Nid::SHA256)) => (oids::ECDSA_WITH_SHA256, false),
        (Id::EC, Some(Nid::SHA384)) => (oids::ECDSA_WITH_SHA384, false),
        (Id::EC, Some(Nid::SHA512)) => (oids::ECDSA_WITH_SHA512, false),
        (Id::DSA, Some(Nid::SHA1)) => (oids::DSA_WITH_SHA1, false),
        (Id::DSA, Some(Nid::SHA224)) => (oids::DSA_WITH_SHA224, false),
        (Id::DSA, Some(Nid::SHA256)) => (oids::DSA_WITH_SHA256, false),
        (Id::ED25519, None) => (oids::ED25519, false),
        (Id::ED448, None) => (oids::ED448, false),
        (id, nid) => {
            let digest = nid
                .and_then(|n| n.long_name().ok())
                .unwrap_or("none");
            return Err(PkiError::unsupported(format!(
                "No signature algorithm for key type {:?} with digest {}",
                id, digest
            )));
        }
    };

    Ok(AlgorithmIdentifierOwned {
        oid,
        parameters: if null_params { Some(Any::null()) } else { None },
    })
}

/// Sign `data` (normally the DER of a TBS structure).
pub fn sign(key: &PKeyRef<Private>, digest: Option<MessageDigest>, data: &[u8]) -> Result<Vec<u8>> {
    let result = match digest {
        Some(md) => Signer::new(md, key).and_then(|mut signer| {
            signer.update(data)?;
            signer.sign_to_vec()
        }),
        None => Signer::new_without_digest(key)
            .and_then(|mut signer| signer.sign_oneshot_to_vec(data)),
    };
    result.map_err(|e| PkiError::encoding("Failed to sign data", e))
}

/// Check `signature` over `data` with the algorithm named by `algorithm`.
///
/// `Ok(false)` means the check ran and the signature does not match. An
/// unusable algorithm or key is reported as an error.
pub fn verify<T: HasPublic>(
    key: &PKeyRef<T>,
    algorithm: &ObjectIdentifier,
    data: &[u8],
    signature: &[u8],
) -> Result<bool> {
    let errored = |context: String| PkiError::verification(VerificationFailure::Errored, context);

    match digest_for_signature(algorithm)? {
        Some(md) => {
            let mut verifier = Verifier::new(md, key)
                .map_err(|e| errored(format!("Cannot initialise verifier: {}", e)))?;
            verifier
                .update(data)
                .map_err(|e| errored(format!("Cannot hash signed data: {}", e)))?;
            // OpenSSL reports a malformed signature as an error; for the
            // caller that is still a signature that does not match.
            Ok(verifier.verify(signature).unwrap_or(false))
        }
        None => {
            let mut verifier = Verifier::new_without_digest(key)
                .map_err(|e| errored(format!("Cannot initialise verifier: {}", e)))?;
            Ok(verifier.verify_oneshot(signature, data).unwrap_or(false))
        }
    }
}

/// Digest bound to a signature algorithm OID. `None` for pure schemes (Ed25519/Ed448).
fn digest_for_signature(algorithm: &ObjectIdentifier) -> Result<Option<MessageDigest>> {
    if *algorithm == oids::ED25519 || *algorithm == oids::ED448 {
        return Ok(None);
    }

    let nid = nid_of(algorithm).ok_or_else(|| {
        PkiError::verification(
            VerificationFailure::Errored,
            format!("Unknown signature algorithm {}", algorithm),
        )
    })?;
    let digest = nid
        .signature_algorithms()
        .and_then(|algs| MessageDigest::from_nid(algs.digest))
        .ok_or_else(|| {
            PkiError::verification(
                VerificationFailure::Errored,
                format!("No digest for signature algorithm {}", algorithm),
            )
        })?;
    Ok(Some(digest))
}

fn nid_of(oid: &ObjectIdentifier) -> Option<Nid> {
    let object = Asn1Object::from_str(&oid.to_string()).ok()?;
    match object.nid() {
        Nid::UNDEF => None,
        nid => Some(nid),
    }
}

/// OpenSSL long name for `oid`, or the dotted OID when it is not registered.
pub fn algorithm_name(oid: &ObjectIdentifier) -> String {
    nid_of(oid)
        .and_then(|nid| nid.long_name().ok())
        .map(str::to_string)
        .unwrap_or_else(|| oid.to_string())
}

/// Long name of the digest bound to a signature algorithm, `""` if unresolvable.
pub fn digest_name_for_signature(oid: &ObjectIdentifier) -> String {
    nid_of(oid)
        .and_then(|nid| nid.signature_algorithms())
        .filter(|algs| algs.digest != Nid::UNDEF)
        .and_then(|algs| algs.digest.long_name().ok())
        .map(str::to_string)
        .unwrap_or_default()
}

/// Decode a `SubjectPublicKeyInfo` into an OpenSSL key.
pub fn public_key_from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<PKey<Public>> {
    let der = spki
        .to_der()
        .map_err(|e| PkiError::encoding("Failed to encode public key info", e))?;
    PKey::public_key_from_der(&der).map_err(|e| PkiError::parse("Failed to load public key", e))
}

/// `SubjectPublicKeyInfo` of an OpenSSL key.
pub fn spki_from_key<T: HasPublic>(key: &PKeyRef<T>) -> Result<SubjectPublicKeyInfoOwned> {
    let der = key
        .public_key_to_der()
        .map_err(|e| PkiError::encoding("Failed to export public key", e))?;
    SubjectPublicKeyInfoOwned::from_der(&der)
        .map_err(|e| PkiError::parse("Failed to decode public key info", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::rsa::Rsa;

    fn ec_key() -> PKey<Private> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
    }

    #[test]
    fn test_default_digests() {
        let ec = ec_key();
        let md = resolve_digest(&ec, None).unwrap().unwrap();
        assert_eq!(md.type_(), Nid::SHA256);

        let ed = PKey::generate_ed25519().unwrap();
        assert!(resolve_digest(&ed, None).unwrap().is_none());
    }

    #[test]
    fn test_unknown_digest_is_unsupported() {
        let err = resolve_digest(&ec_key(), Some("no-such-digest")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
    }

    #[test]
    fn test_rsa_signature_algorithm_has_null_params() {
        let rsa = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let alg = signature_algorithm(&rsa, Some(MessageDigest::sha384())).unwrap();
        assert_eq!(alg.oid, oids::SHA384_WITH_RSA);
        assert!(alg.parameters.is_some());

        let alg = signature_algorithm(&ec_key(), Some(MessageDigest::sha256())).unwrap();
        assert_eq!(alg.oid, oids::ECDSA_WITH_SHA256);
        assert!(alg.parameters.is_none());
    }

    #[test]
    fn test_sign_and_verify() {
        let key = ec_key();
        let md = resolve_digest(&key, None).unwrap();
        let sig = sign(&key, md, b"to be signed").unwrap();

        assert!(verify(&key, &oids::ECDSA_WITH_SHA256, b"to be signed", &sig).unwrap());
        assert!(!verify(&key, &oids::ECDSA_WITH_SHA256, b"tampered", &sig).unwrap());
    }

    #[test]
    fn test_ed25519_sign_and_verify() {
        let key = PKey::generate_ed25519().unwrap();
        let sig = sign(&key, None, b"data").unwrap();
        assert!(verify(&key, &oids::ED25519, b"data", &sig).unwrap());
    }

    #[test]
    fn test_verify_unknown_algorithm_errors() {
        let key = ec_key();
        let unknown = ObjectIdentifier::new_unwrap("1.2.3.4.5");
        let err = verify(&key, &unknown, b"data", b"sig").unwrap_err();
        assert_eq!(err.verification_failure(), Some(VerificationFailure::Errored));
    }

    #[test]
    fn test_names() {
        assert_eq!(algorithm_name(&oids::SHA256_WITH_RSA), "sha256WithRSAEncryption");
        assert_eq!(digest_name_for_signature(&oids::SHA256_WITH_RSA), "sha256");
        assert_eq!(digest_name_for_signature(&oids::ECDSA_WITH_SHA384), "sha384");

        let unknown = ObjectIdentifier::new_unwrap("1.2.3.4.5");
        assert_eq!(algorithm_name(&unknown), "1.2.3.4.5");
        assert_eq!(digest_name_for_signature(&unknown), "");
    }

    #[test]
    fn test_spki_round_trip() {
        let key = ec_key();
        let spki = spki_from_key(&key).unwrap();
        let public = public_key_from_spki(&spki).unwrap();
        assert!(public.public_eq(&key));
    }
}
