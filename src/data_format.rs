//! Binary and PEM encodings for certificates, CRLs and requests.
//!
//! PEM input must carry the label of the expected object type
//! (`CERTIFICATE`, `X509 CRL` or `CERTIFICATE REQUEST`).

use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::str::FromStr;

use der::pem::{self, LineEnding};
use der::{Decode, Encode};

use crate::error::{PkiError, Result};

/// Serialization of certificates, CRLs and requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFormat {
    /// Binary DER.
    Der,
    /// PEM armoured base64.
    Base64,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Der => "DER",
            DataFormat::Base64 => "BASE64",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = PkiError;

    /// Parse a format tag. `PEM` is accepted as an alias of `BASE64`.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DER" => Ok(DataFormat::Der),
            "BASE64" | "PEM" => Ok(DataFormat::Base64),
            _ => Err(PkiError::encoding_msg(format!("Unknown data format: {}", s))),
        }
    }
}

/// PEM armour of one object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Armor {
    pub label: &'static str,
    /// Name used in error messages.
    pub what: &'static str,
}

pub(crate) const CERTIFICATE: Armor = Armor {
    label: "CERTIFICATE",
    what: "certificate",
};

pub(crate) const CRL: Armor = Armor {
    label: "X509 CRL",
    what: "CRL",
};

pub(crate) const REQUEST: Armor = Armor {
    label: "CERTIFICATE REQUEST",
    what: "certificate request",
};

/// Decode a structure from DER or PEM bytes.
pub(crate) fn decode<T>(bytes: &[u8], format: DataFormat, armor: Armor) -> Result<T>
where
    T: for<'a> Decode<'a>,
{
    if bytes.is_empty() {
        return Err(PkiError::invalid_input(format!("Empty {} data", armor.what)));
    }
    match format {
        DataFormat::Der => T::from_der(bytes)
            .map_err(|e| PkiError::parse(format!("Unable to decode {} (DER)", armor.what), e)),
        DataFormat::Base64 => {
            let der = pem_to_der(bytes, armor)?;
            T::from_der(&der)
                .map_err(|e| PkiError::parse(format!("Unable to decode {} (PEM)", armor.what), e))
        }
    }
}

fn pem_to_der(bytes: &[u8], armor: Armor) -> Result<Vec<u8>> {
    let (label, der) = pem::decode_vec(bytes).map_err(|e| {
        PkiError::parse(
            format!("Unable to decode {} (PEM)", armor.what),
            der::Error::from(e),
        )
    })?;
    if label != armor.label {
        return Err(PkiError::Parse {
            context: format!(
                "Unexpected PEM label '{}', expected '{}'",
                label, armor.label
            ),
            source: None,
        });
    }
    Ok(der)
}

/// Encode a structure as DER or PEM bytes.
pub(crate) fn encode<T: Encode>(value: &T, format: DataFormat, armor: Armor) -> Result<Vec<u8>> {
    let der = value
        .to_der()
        .map_err(|e| PkiError::encoding(format!("Unable to encode {} (DER)", armor.what), e))?;
    match format {
        DataFormat::Der => Ok(der),
        DataFormat::Base64 => pem::encode_string(armor.label, LineEnding::LF, &der)
            .map(String::into_bytes)
            .map_err(|e| {
                PkiError::encoding(
                    format!("Unable to encode {} (PEM)", armor.what),
                    der::Error::from(e),
                )
            }),
    }
}

/// Rewind `source` and read it to the end.
pub(crate) fn read_all<R: Read + Seek>(source: &mut R) -> Result<Vec<u8>> {
    source
        .seek(SeekFrom::Start(0))
        .map_err(|e| PkiError::io("Unable to rewind input", e))?;
    let mut bytes = Vec::new();
    source
        .read_to_end(&mut bytes)
        .map_err(|e| PkiError::io("Unable to read input", e))?;
    Ok(bytes)
}

pub(crate) fn write_all<W: Write>(sink: &mut W, bytes: &[u8]) -> Result<()> {
    sink.write_all(bytes)
        .and_then(|_| sink.flush())
        .map_err(|e| PkiError::io("Unable to write output", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_format_tags() {
        assert_eq!("der".parse::<DataFormat>().unwrap(), DataFormat::Der);
        assert_eq!("PEM".parse::<DataFormat>().unwrap(), DataFormat::Base64);
        assert_eq!("BASE64".parse::<DataFormat>().unwrap(), DataFormat::Base64);

        let err = "SMIME".parse::<DataFormat>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_read_all_rewinds() {
        let mut cursor = std::io::Cursor::new(b"payload".to_vec());
        cursor.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(read_all(&mut cursor).unwrap(), b"payload");
    }

    #[test]
    fn test_pem_label_must_match() {
        let der = der::asn1::Null.to_der().unwrap();
        let pem = pem::encode_string("X509 CRL", LineEnding::LF, &der).unwrap();

        assert_eq!(pem_to_der(pem.as_bytes(), CRL).unwrap(), der);
        let err = pem_to_der(pem.as_bytes(), CERTIFICATE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("X509 CRL"));
    }
}
