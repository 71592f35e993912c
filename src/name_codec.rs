//! Distinguished name codec for the slash notation used by the store tooling.
//!
//! A name string looks like `/CN=Ivan Petrov/O=Org/C=RU/`. Each non-empty
//! segment becomes a single-valued RDN, in order, with its value encoded as a
//! UTF8String. The leading and trailing slashes are optional.
//!
//! There is no escaping: a value may not contain `/`, and only the first `=`
//! of a segment separates the type from the value. Callers must keep those
//! characters out of attribute values.

use const_oid::ObjectIdentifier;
use der::asn1::{Any, SetOfVec};
use der::{Tag, Tagged};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

use crate::error::{PkiError, Result};
use crate::oids;

/// Attribute types accepted in name strings: (short name, long name, OID).
const ATTRIBUTE_TYPES: &[(&str, &str, ObjectIdentifier)] = &[
    ("CN", "commonName", oids::COMMON_NAME),
    ("SN", "surname", oids::SURNAME),
    ("serialNumber", "serialNumber", oids::SERIAL_NUMBER),
    ("C", "countryName", oids::COUNTRY_NAME),
    ("L", "localityName", oids::LOCALITY_NAME),
    ("ST", "stateOrProvinceName", oids::STATE_OR_PROVINCE_NAME),
    ("street", "streetAddress", oids::STREET_ADDRESS),
    ("O", "organizationName", oids::ORGANIZATION_NAME),
    ("OU", "organizationalUnitName", oids::ORGANIZATIONAL_UNIT_NAME),
    ("title", "title", oids::TITLE),
    ("postalCode", "postalCode", oids::POSTAL_CODE),
    ("GN", "givenName", oids::GIVEN_NAME),
    ("initials", "initials", oids::INITIALS),
    ("pseudonym", "pseudonym", oids::PSEUDONYM),
    ("DC", "domainComponent", oids::DOMAIN_COMPONENT),
    ("UID", "userId", oids::USER_ID),
    ("emailAddress", "emailAddress", oids::EMAIL_ADDRESS),
    ("OGRN", "OGRN", oids::OGRN),
    ("SNILS", "SNILS", oids::SNILS),
    ("OGRNIP", "OGRNIP", oids::OGRNIP),
    ("INN", "INN", oids::INN),
];

/// Resolve an attribute type token (short name, long name or dotted OID).
pub fn resolve_attribute_type(token: &str) -> Result<ObjectIdentifier> {
    if let Some((_, _, oid)) = ATTRIBUTE_TYPES
        .iter()
        .find(|(short, long, _)| *short == token || *long == token)
    {
        return Ok(*oid);
    }

    if token.starts_with(|c: char| c.is_ascii_digit()) {
        return ObjectIdentifier::new(token).map_err(|e| {
            PkiError::encoding_msg(format!("Invalid attribute OID '{}': {}", token, e))
        });
    }

    Err(PkiError::encoding_msg(format!(
        "Unknown attribute type '{}'",
        token
    )))
}

/// Short name of an attribute type, or its dotted form when unknown.
pub fn attribute_short_name(oid: &ObjectIdentifier) -> String {
    ATTRIBUTE_TYPES
        .iter()
        .find(|(_, _, known)| known == oid)
        .map(|(short, _, _)| short.to_string())
        .unwrap_or_else(|| oid.to_string())
}

/// Parse a slash-delimited name string.
pub fn parse_name(text: &str) -> Result<Name> {
    let mut rdns = Vec::new();

    for segment in text.split('/').filter(|s| !s.is_empty()) {
        let (field, value) = segment.split_once('=').ok_or_else(|| {
            PkiError::encoding_msg(format!("Name segment '{}' has no '='", segment))
        })?;

        let oid = resolve_attribute_type(field)?;
        if oid == oids::COUNTRY_NAME && value.chars().count() != 2 {
            return Err(PkiError::encoding_msg(format!(
                "countryName must be two characters, got '{}'",
                value
            )));
        }

        let value = Any::new(Tag::Utf8String, value.as_bytes())
            .map_err(|e| PkiError::encoding(format!("Unable to encode value of {}", field), e))?;
        let atv = AttributeTypeAndValue { oid, value };
        let set = SetOfVec::try_from(vec![atv])
            .map_err(|e| PkiError::encoding(format!("Unable to add {} to name", field), e))?;
        rdns.push(RelativeDistinguishedName(set));
    }

    Ok(RdnSequence(rdns))
}

/// Render a name in the slash notation accepted by [`parse_name`].
pub fn format_name(name: &Name) -> String {
    let mut out = String::new();
    for rdn in name.0.iter() {
        for atv in rdn.0.iter() {
            out.push('/');
            out.push_str(&attribute_short_name(&atv.oid));
            out.push('=');
            out.push_str(&attribute_value_to_string(&atv.value));
        }
    }
    out
}

/// Value of the first attribute of type `oid`, in name order.
pub fn first_attribute(name: &Name, oid: &ObjectIdentifier) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| &atv.oid == oid)
        .map(|atv| attribute_value_to_string(&atv.value))
}

/// Decode a directory string value to UTF-8.
pub fn attribute_value_to_string(value: &Any) -> String {
    match value.tag() {
        Tag::BmpString => {
            let units: Vec<u16> = value
                .value()
                .chunks(2)
                .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(value.value()).into_owned(),
    }
}
