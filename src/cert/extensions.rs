use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use const_oid::AssociatedOid;
use der::{
    Any, Decode, Encode, Tag, Tagged,
    asn1::{GeneralizedTime, Ia5String, OctetString, UtcTime, Utf8StringRef},
    oid::ObjectIdentifier,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use x509_cert::ext::pkix::name::GeneralName;

use super::params::{AlternateName, AlternateNameType};
use crate::error::CertFactoryError;

/// Trait for converting to and from X.509 extensions.
///
/// This trait provides methods to encode and decode X.509 extension values.
///
/// # Example
/// ```
/// use certfactory::cert::extensions::{SubjectAltName, ToAndFromX509Extension};
/// use certfactory::cert::params::AlternateName;
/// let san = SubjectAltName { names: vec![AlternateName::dns("example.com")] };
/// let encoded = san.to_x509_extension_value().unwrap();
/// let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
/// assert_eq!(san.names, decoded.names);
/// ```
pub trait ToAndFromX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>, CertFactoryError>;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, CertFactoryError>
    where
        Self: Sized;
}

/// OIDs of the extensions that have a dedicated codec in this module.
///
/// A request may not set these as custom extensions, and Clone does not
/// report them as such.
pub const MANAGED_EXTENSIONS: [ObjectIdentifier; 6] = [
    <x509_cert::ext::pkix::SubjectAltName as AssociatedOid>::OID,
    <x509_cert::ext::pkix::BasicConstraints as AssociatedOid>::OID,
    <x509_cert::ext::pkix::KeyUsage as AssociatedOid>::OID,
    <x509_cert::ext::pkix::ExtendedKeyUsage as AssociatedOid>::OID,
    <x509_cert::ext::pkix::SubjectKeyIdentifier as AssociatedOid>::OID,
    <x509_cert::ext::pkix::AuthorityKeyIdentifier as AssociatedOid>::OID,
];

/// Represents the Subject Alternative Name (SAN) extension.
///
/// Encoding validates every name and keeps the given order. Decoding
/// returns the names in certificate order; general name kinds other than
/// DNS, email, IP and URI are skipped.
///
/// # Fields
/// * `names` - The alternate names.
#[derive(Debug, Clone, Default)]
pub struct SubjectAltName {
    pub names: Vec<AlternateName>,
}

impl SubjectAltName {
    fn general_name(index: usize, name: &AlternateName) -> Result<GeneralName, CertFactoryError> {
        let context = format!("alternate_names[{index}]");
        let invalid = |message: String| CertFactoryError::invalid(context.clone(), message);

        if name.value.is_empty() {
            return Err(invalid("empty alternate name value".to_string()));
        }

        let ia5 = |value: &str| Ia5String::new(value).map_err(|e| invalid(e.to_string()));

        match name.name_type {
            AlternateNameType::Dns => {
                if name.value == " " {
                    return Err(invalid("invalid dns name value".to_string()));
                }
                Ok(GeneralName::DnsName(ia5(&name.value)?))
            }
            AlternateNameType::Email => Ok(GeneralName::Rfc822Name(ia5(&name.value)?)),
            AlternateNameType::Ip => {
                let ip: IpAddr = name
                    .value
                    .parse()
                    .map_err(|_| invalid(format!("invalid ip address {}", name.value)))?;
                let octets = match ip {
                    IpAddr::V4(v4) => v4.octets().to_vec(),
                    IpAddr::V6(v6) => v6.octets().to_vec(),
                };
                Ok(GeneralName::IpAddress(
                    OctetString::new(octets).map_err(|e| invalid(e.to_string()))?,
                ))
            }
            AlternateNameType::Uri => {
                url::Url::parse(&name.value).map_err(|e| invalid(e.to_string()))?;
                Ok(GeneralName::UniformResourceIdentifier(ia5(&name.value)?))
            }
            AlternateNameType::Unknown => Err(invalid("unknown alternate name type".to_string())),
        }
    }
}

impl ToAndFromX509Extension for SubjectAltName {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectAltName::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, CertFactoryError> {
        let san = x509_cert::ext::pkix::SubjectAltName(
            self.names
                .iter()
                .enumerate()
                .map(|(index, name)| Self::general_name(index, name))
                .collect::<Result<Vec<_>, _>>()?,
        );

        Ok(san.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, CertFactoryError> {
        let san = x509_cert::ext::pkix::SubjectAltName::from_der(extension)?;
        let mut names = Vec::with_capacity(san.0.len());
        for name in san.0.iter() {
            match name {
                GeneralName::DnsName(dns) => names.push(AlternateName::dns(dns.to_string())),
                GeneralName::Rfc822Name(email) => {
                    names.push(AlternateName::email(email.to_string()))
                }
                GeneralName::IpAddress(ip) => names.push(AlternateName::ip(ip_to_string(ip)?)),
                GeneralName::UniformResourceIdentifier(uri) => {
                    names.push(AlternateName::uri(uri.to_string()))
                }
                _ => {}
            }
        }
        Ok(Self { names })
    }
}

fn ip_to_string(ip: &OctetString) -> Result<String, CertFactoryError> {
    let bytes = ip.as_bytes();
    if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
        Ok(Ipv4Addr::from(v4).to_string())
    } else if let Ok(v6) = <[u8; 16]>::try_from(bytes) {
        Ok(Ipv6Addr::from(v6).to_string())
    } else {
        Err(CertFactoryError::DecodingError(format!(
            "IP address of {} bytes in subject alternative name",
            bytes.len()
        )))
    }
}

/// Represents the Basic Constraints extension.
///
/// Issued CAs carry no path length constraint.
#[derive(Debug, Default)]
pub struct BasicConstraints {
    pub is_ca: bool,
}

impl ToAndFromX509Extension for BasicConstraints {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::BasicConstraints::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, CertFactoryError> {
        let bc = x509_cert::ext::pkix::BasicConstraints {
            ca: self.is_ca,
            path_len_constraint: None,
        };

        Ok(bc.to_der()?)
    }

    fn from_x509_extension_value(der_bytes: &[u8]) -> Result<Self, CertFactoryError> {
        let bc = x509_cert::ext::pkix::BasicConstraints::from_der(der_bytes)?;
        Ok(Self { is_ca: bc.ca })
    }
}

pub use der::flagset::FlagSet;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
pub use x509_cert::ext::pkix::KeyUsages;

/// Represents the Key Usage extension.
///
/// This extension defines the purpose of the key contained in the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage(pub FlagSet<KeyUsages>);

impl ToAndFromX509Extension for KeyUsage {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, CertFactoryError> {
        let ku = X509KeyUsage(self.0);
        Ok(ku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, CertFactoryError> {
        let ku = X509KeyUsage::from_der(extension)?;
        Ok(Self(ku.0))
    }
}

/// Represents the Extended Key Usage extension.
///
/// Well-known purposes and custom OIDs share one list, in encoding order.
#[derive(Debug, Clone, Default)]
pub struct ExtendedKeyUsage {
    pub usage: Vec<ObjectIdentifier>,
}

impl ToAndFromX509Extension for ExtendedKeyUsage {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::ExtendedKeyUsage::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, CertFactoryError> {
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage(self.usage.clone());
        Ok(eku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, CertFactoryError> {
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage::from_der(extension)?;
        Ok(Self { usage: eku.0 })
    }
}

/// Represents an option for the Extended Key Usage extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedKeyUsageOption {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
}

impl ExtendedKeyUsageOption {
    /// All options, in the order they are encoded.
    pub const ALL: [ExtendedKeyUsageOption; 6] = [
        ExtendedKeyUsageOption::ServerAuth,
        ExtendedKeyUsageOption::ClientAuth,
        ExtendedKeyUsageOption::CodeSigning,
        ExtendedKeyUsageOption::EmailProtection,
        ExtendedKeyUsageOption::TimeStamping,
        ExtendedKeyUsageOption::OcspSigning,
    ];

    /// Maps a well-known OID back to its option.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|option| ObjectIdentifier::from(*option) == *oid)
    }
}

impl From<ExtendedKeyUsageOption> for ObjectIdentifier {
    fn from(value: ExtendedKeyUsageOption) -> Self {
        match value {
            ExtendedKeyUsageOption::OcspSigning => const_oid::db::rfc5912::ID_KP_OCSP_SIGNING,
            ExtendedKeyUsageOption::ServerAuth => const_oid::db::rfc5912::ID_KP_SERVER_AUTH,
            ExtendedKeyUsageOption::ClientAuth => const_oid::db::rfc5912::ID_KP_CLIENT_AUTH,
            ExtendedKeyUsageOption::CodeSigning => const_oid::db::rfc5912::ID_KP_CODE_SIGNING,
            ExtendedKeyUsageOption::EmailProtection => {
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION
            }
            ExtendedKeyUsageOption::TimeStamping => const_oid::db::rfc5912::ID_KP_TIME_STAMPING,
        }
    }
}

/// Represents the Subject Key Identifier extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectKeyIdentifier(pub Vec<u8>);

impl ToAndFromX509Extension for SubjectKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectKeyIdentifier::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, CertFactoryError> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier(OctetString::new(self.0.clone())?);
        Ok(ski.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, CertFactoryError> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier::from_der(extension)?;
        Ok(Self(ski.0.as_bytes().to_vec()))
    }
}

/// Represents the Authority Key Identifier (AKI) extension.
///
/// Only the key identifier is written, so chains are matched by key rather
/// than by issuer name and serial.
///
/// # Fields
/// * `key_identifier` - The issuer's key identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityKeyIdentifier {
    pub key_identifier: Vec<u8>,
}

impl ToAndFromX509Extension for AuthorityKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::AuthorityKeyIdentifier::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, CertFactoryError> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier {
            key_identifier: Some(OctetString::new(self.key_identifier.as_slice())?),
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        };

        Ok(aki.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, CertFactoryError> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier::from_der(extension)?;

        Ok(Self {
            key_identifier: aki
                .key_identifier
                .map(|id| id.as_bytes().to_vec())
                .unwrap_or_default(),
        })
    }
}

/// Typed value of a custom extension.
///
/// Serialized as `{"Type": "integer", "Value": 42}`; timestamps use RFC 3339
/// and lose sub-second precision once encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", content = "Value", rename_all = "lowercase")]
pub enum ExtensionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
}

impl ExtensionValue {
    /// Encodes the value as a single DER element.
    ///
    /// Strings become UTF8String; timestamps become UTCTime or
    /// GeneralizedTime depending on the year.
    pub fn to_der(&self) -> Result<Vec<u8>, CertFactoryError> {
        let encoded = match self {
            ExtensionValue::String(value) => Utf8StringRef::new(value)?.to_der()?,
            ExtensionValue::Integer(value) => value.to_der()?,
            ExtensionValue::Boolean(value) => value.to_der()?,
            ExtensionValue::Timestamp(value) => {
                crate::tbs_certificate::encode_time(*value)?.to_der()?
            }
        };
        Ok(encoded)
    }

    /// Decodes a single DER element.
    ///
    /// # Errors
    /// `DecodingError` for malformed DER or a type outside the union.
    pub fn from_der(bytes: &[u8]) -> Result<Self, CertFactoryError> {
        let any = Any::from_der(bytes)?;
        match any.tag() {
            Tag::Utf8String | Tag::PrintableString | Tag::Ia5String => {
                let value = String::from_utf8(any.value().to_vec())
                    .map_err(|e| CertFactoryError::DecodingError(e.to_string()))?;
                Ok(ExtensionValue::String(value))
            }
            Tag::Integer => Ok(ExtensionValue::Integer(any.decode_as::<i64>()?)),
            Tag::Boolean => Ok(ExtensionValue::Boolean(any.decode_as::<bool>()?)),
            Tag::UtcTime => {
                let time = any.decode_as::<UtcTime>()?;
                Ok(ExtensionValue::Timestamp(unix_to_datetime(
                    time.to_unix_duration(),
                )?))
            }
            Tag::GeneralizedTime => {
                let time = any.decode_as::<GeneralizedTime>()?;
                Ok(ExtensionValue::Timestamp(unix_to_datetime(
                    time.to_unix_duration(),
                )?))
            }
            other => Err(CertFactoryError::DecodingError(format!(
                "unsupported extension value type {other}"
            ))),
        }
    }
}

pub(crate) fn unix_to_datetime(
    duration: std::time::Duration,
) -> Result<OffsetDateTime, CertFactoryError> {
    let seconds = i64::try_from(duration.as_secs())
        .map_err(|e| CertFactoryError::DecodingError(e.to_string()))?;
    OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|e| CertFactoryError::DecodingError(e.to_string()))
}
