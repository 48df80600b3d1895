use bon::Builder;
use const_oid::ObjectIdentifier;
use der::asn1::SetOfVec;
use der::{Any, Tag};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
pub use crate::cert::extensions::ExtensionValue;
use crate::error::CertFactoryError;

const OID_COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const OID_PROVINCE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const OID_CITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const OID_ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Key algorithm and size used for a new certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// RSA with a 2048-bit modulus.
    Rsa2048,
    /// RSA with a 4096-bit modulus.
    Rsa4096,
    /// RSA with an 8192-bit modulus.
    Rsa8192,
    /// ECDSA over NIST P-256.
    Ecc256,
    /// ECDSA over NIST P-384.
    Ecc384,
}

/// Digest half of the signature algorithm.
///
/// The key half comes from the signing key, see
/// [`crate::cert::SigningAlgorithm::pair`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl SignatureAlgorithm {
    /// Hashes `data` with this algorithm's digest.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        use sha2::Digest;
        match self {
            SignatureAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            SignatureAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            SignatureAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }
}

/// A certificate request: everything needed to issue one certificate except
/// key material, serial number and issuer, which are supplied at issuance.
///
/// Requests are validated lazily while they are encoded into a signing
/// template, see [`crate::tbs_certificate::TbsCertificate::from_request`].
///
/// # Fields
/// * `key_type` - Algorithm and size of the key to generate.
/// * `signature_algorithm` - Digest used when signing this certificate.
/// * `subject` - Subject name.
/// * `validity` - Validity period, day precision.
/// * `alternate_names` - Subject alternative names, order preserved.
/// * `usage` - Key usage, extended key usage and custom EKU OIDs.
/// * `is_certificate_authority` - Whether the certificate may sign others.
/// * `status_providers` - CRL/OCSP URLs. Descriptive only, never encoded.
/// * `extensions` - Additional non-critical extensions, order preserved.
#[derive(Clone, Debug, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateRequest {
    pub key_type: KeyType,
    #[builder(default)]
    #[serde(default)]
    pub signature_algorithm: SignatureAlgorithm,
    #[builder(default)]
    #[serde(default)]
    pub subject: Name,
    pub validity: DateRange,
    #[builder(default)]
    #[serde(default)]
    pub alternate_names: Vec<AlternateName>,
    #[builder(default)]
    #[serde(default)]
    pub usage: KeyUsage,
    #[builder(default)]
    #[serde(default)]
    pub is_certificate_authority: bool,
    #[builder(default)]
    #[serde(default)]
    pub status_providers: StatusProviders,
    #[builder(default)]
    #[serde(default)]
    pub extensions: Vec<Extension>,
}

/// Distinguished name of a certificate subject or issuer.
///
/// Empty fields are left out of the encoded name. Multi-valued attributes
/// are read back as their first value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Name {
    #[builder(default, into)]
    pub organization: String,
    #[builder(default, into)]
    pub city: String,
    #[builder(default, into)]
    pub province: String,
    #[builder(default, into)]
    pub country: String,
    #[builder(default, into)]
    pub common_name: String,
}

impl Name {
    /// Converts the name to an X.509 RDN sequence in C, ST, L, O, CN order.
    pub fn to_x509_name(&self) -> Result<x509_cert::name::Name, CertFactoryError> {
        let attributes = [
            (OID_COUNTRY, &self.country),
            (OID_PROVINCE, &self.province),
            (OID_CITY, &self.city),
            (OID_ORGANIZATION, &self.organization),
            (OID_COMMON_NAME, &self.common_name),
        ];

        let mut rdns = Vec::new();
        for (oid, value) in attributes {
            if value.is_empty() {
                continue;
            }
            let tag = if is_printable(value) {
                Tag::PrintableString
            } else {
                Tag::Utf8String
            };
            let atv = AttributeTypeAndValue {
                oid,
                value: Any::new(tag, value.as_bytes())
                    .map_err(|e| CertFactoryError::invalid("subject", e.to_string()))?,
            };
            let set = SetOfVec::try_from(vec![atv])
                .map_err(|e| CertFactoryError::EncodingError(e.to_string()))?;
            rdns.push(RelativeDistinguishedName(set));
        }

        Ok(RdnSequence(rdns))
    }

    /// Creates a `Name` from an X.509 RDN sequence.
    ///
    /// Attributes other than the five modelled ones are ignored.
    pub fn from_x509_name(x509dn: &x509_cert::name::Name) -> Self {
        let mut name = Name::default();

        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let field = match attr.oid {
                    OID_COUNTRY => &mut name.country,
                    OID_PROVINCE => &mut name.province,
                    OID_CITY => &mut name.city,
                    OID_ORGANIZATION => &mut name.organization,
                    OID_COMMON_NAME => &mut name.common_name,
                    _ => continue,
                };
                if field.is_empty() {
                    *field = String::from_utf8_lossy(attr.value.value()).into_owned();
                }
            }
        }

        name
    }
}

// PrintableString alphabet, X.680 §41.4.
fn is_printable(value: &str) -> bool {
    value.chars().all(|c| {
        c.is_ascii_alphanumeric() || " '()+,-./:=?".contains(c)
    })
}

/// Certificate validity period as calendar dates.
///
/// Dates are `YYYY-MM-DD` strings; a full RFC 3339 timestamp is accepted and
/// truncated to its UTC date. Certificates are valid from midnight UTC of
/// `not_before` to midnight UTC of `not_after`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DateRange {
    pub not_before: String,
    pub not_after: String,
}

impl DateRange {
    /// Creates a range from two dates.
    pub fn new(not_before: Date, not_after: Date) -> Self {
        Self {
            not_before: format_date(not_before),
            not_after: format_date(not_after),
        }
    }

    /// Creates a range starting today (UTC) for the given number of days.
    ///
    /// The end saturates at the last (or first) representable date.
    pub fn for_days(days: i64) -> Self {
        let today = OffsetDateTime::now_utc().date();
        let end = days
            .checked_mul(86_400)
            .and_then(|seconds| today.checked_add(time::Duration::seconds(seconds)))
            .unwrap_or(if days < 0 { Date::MIN } else { Date::MAX });
        Self::new(today, end)
    }

    /// Parses both ends of the range.
    ///
    /// # Errors
    /// `InvalidInput` when either date does not parse or when
    /// `not_before >= not_after`.
    pub fn parse(&self) -> Result<(Date, Date), CertFactoryError> {
        let not_before = parse_date(&self.not_before)
            .ok_or_else(|| CertFactoryError::invalid("validity.not_before", "invalid date"))?;
        let not_after = parse_date(&self.not_after)
            .ok_or_else(|| CertFactoryError::invalid("validity.not_after", "invalid date"))?;

        if not_before >= not_after {
            return Err(CertFactoryError::invalid(
                "validity",
                "not_before must be earlier than not_after",
            ));
        }

        Ok((not_before, not_after))
    }

    /// Whether `moment` lies inside the range.
    ///
    /// An unparseable range is never valid.
    pub fn is_valid_at(&self, moment: OffsetDateTime) -> bool {
        match self.parse() {
            Ok((not_before, not_after)) => {
                let moment = moment.to_offset(UtcOffset::UTC);
                moment > not_before.midnight().assume_utc()
                    && moment < not_after.midnight().assume_utc()
            }
            Err(_) => false,
        }
    }

    /// Whether the current time lies inside the range.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(OffsetDateTime::now_utc())
    }
}

pub(crate) fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

fn parse_date(value: &str) -> Option<Date> {
    let value = value.trim();
    if let Ok(date) = Date::parse(value, format_description!("[year]-[month]-[day]")) {
        return Some(date);
    }
    OffsetDateTime::parse(value, &Rfc3339)
        .ok()
        .map(|moment| moment.to_offset(UtcOffset::UTC).date())
}

/// Kind of a subject alternative name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlternateNameType {
    Dns,
    Email,
    Ip,
    Uri,
    /// Any type string this engine does not know. Rejected at issuance.
    #[serde(other)]
    Unknown,
}

/// One subject alternative name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlternateName {
    #[serde(rename = "Type")]
    pub name_type: AlternateNameType,
    pub value: String,
}

impl AlternateName {
    pub fn dns(value: impl Into<String>) -> Self {
        Self {
            name_type: AlternateNameType::Dns,
            value: value.into(),
        }
    }

    pub fn email(value: impl Into<String>) -> Self {
        Self {
            name_type: AlternateNameType::Email,
            value: value.into(),
        }
    }

    pub fn ip(value: impl Into<String>) -> Self {
        Self {
            name_type: AlternateNameType::Ip,
            value: value.into(),
        }
    }

    pub fn uri(value: impl Into<String>) -> Self {
        Self {
            name_type: AlternateNameType::Uri,
            value: value.into(),
        }
    }
}

/// Key usage of a certificate.
///
/// The first nine flags form the key usage bitmask, the next six map to
/// well-known extended key usage OIDs, and `custom_ekus` lists further
/// extended key usage OIDs in dotted-decimal form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KeyUsage {
    // Basic
    pub digital_signature: bool,
    pub content_commitment: bool,
    pub key_encipherment: bool,
    pub data_encipherment: bool,
    pub key_agreement: bool,
    pub cert_sign: bool,
    #[serde(rename = "CRLSign")]
    pub crl_sign: bool,
    pub encipher_only: bool,
    pub decipher_only: bool,

    // Extended
    pub server_auth: bool,
    pub client_auth: bool,
    pub code_signing: bool,
    pub email_protection: bool,
    pub time_stamping: bool,
    #[serde(rename = "OCSPSigning")]
    pub ocsp_signing: bool,
    #[serde(rename = "CustomEKUs")]
    pub custom_ekus: Vec<String>,
}

/// Optional certificate status endpoints.
///
/// Carried for the caller's benefit; not encoded into any extension.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusProviders {
    #[serde(rename = "CRL", default, skip_serializing_if = "Option::is_none")]
    pub crl: Option<String>,
    #[serde(rename = "OCSP", default, skip_serializing_if = "Option::is_none")]
    pub ocsp: Option<String>,
}

/// An additional, non-critical X.509 extension with a typed value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Extension {
    pub oid: String,
    pub value: ExtensionValue,
}

/// Represents an encoded X.509 extension.
///
/// This struct contains the OID, criticality, and value of an extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Encodes a specific extension.
    ///
    /// # Arguments
    /// * `extension` - The extension to encode.
    /// * `critical` - Indicates if the extension is critical.
    pub fn from_extension<E: ToAndFromX509Extension>(
        extension: &E,
        critical: bool,
    ) -> Result<Self, CertFactoryError> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes the value into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E, CertFactoryError> {
        E::from_x509_extension_value(&self.value)
    }

    /// Converts to the `x509_cert` representation.
    pub fn to_x509_extension(&self) -> Result<x509_cert::ext::Extension, CertFactoryError> {
        Ok(x509_cert::ext::Extension {
            extn_id: self.oid,
            critical: self.critical,
            extn_value: der::asn1::OctetString::new(self.value.clone())
                .map_err(|e| CertFactoryError::EncodingError(e.to_string()))?,
        })
    }

    /// Converts from the `x509_cert` representation.
    pub fn from_x509_extension(ext: &x509_cert::ext::Extension) -> Self {
        Self {
            oid: ext.extn_id,
            critical: ext.critical,
            value: ext.extn_value.as_bytes().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_date_range_rejects_inverted_and_equal_ranges() {
        let inverted = DateRange::new(date!(2002 - 01 - 01), date!(2001 - 01 - 01));
        assert!(matches!(
            inverted.parse(),
            Err(CertFactoryError::InvalidInput { context, .. }) if context == "validity"
        ));

        let equal = DateRange::new(date!(2001 - 01 - 01), date!(2001 - 01 - 01));
        assert!(equal.parse().is_err());
    }

    #[test]
    fn test_date_range_rejects_garbage() {
        let range = DateRange {
            not_before: "yesterday".to_string(),
            not_after: "2030-01-01".to_string(),
        };
        assert!(matches!(
            range.parse(),
            Err(CertFactoryError::InvalidInput { context, .. }) if context == "validity.not_before"
        ));
    }

    #[test]
    fn test_date_range_truncates_timestamps_to_utc_dates() {
        let range = DateRange {
            not_before: "2001-01-01T23:30:00-02:00".to_string(),
            not_after: "2002-01-01".to_string(),
        };
        let (not_before, not_after) = range.parse().unwrap();
        assert_eq!(not_before, date!(2001 - 01 - 02));
        assert_eq!(not_after, date!(2002 - 01 - 01));
    }

    #[test]
    fn test_for_days_saturates() {
        let range = DateRange::for_days(i64::MAX);
        assert_eq!(range.not_after, format_date(Date::MAX));
        let range = DateRange::for_days(i64::MIN);
        assert_eq!(range.not_after, format_date(Date::MIN));
        let range = DateRange::for_days(30);
        let (not_before, not_after) = range.parse().unwrap();
        assert_eq!((not_after - not_before).whole_days(), 30);
    }

    #[test]
    fn test_date_range_is_valid() {
        let today = OffsetDateTime::now_utc().date();
        let current = DateRange::new(
            today - time::Duration::days(30),
            today + time::Duration::days(30),
        );
        assert!(current.is_valid());

        let future = DateRange::new(
            today + time::Duration::days(30),
            today + time::Duration::days(60),
        );
        assert!(!future.is_valid());

        let past = DateRange::new(
            today - time::Duration::days(60),
            today - time::Duration::days(30),
        );
        assert!(!past.is_valid());
    }

    #[test]
    fn test_name_round_trips_through_x509() {
        let name = Name::builder()
            .organization("example.com")
            .city("Vancouver")
            .province("British Columbia")
            .country("CA")
            .common_name("Caf\u{e9} Root, Inc.")
            .build();

        let x509 = name.to_x509_name().unwrap();
        assert_eq!(x509.0.len(), 5);
        assert_eq!(Name::from_x509_name(&x509), name);
    }

    #[test]
    fn test_name_skips_empty_fields() {
        let name = Name::builder().common_name("leaf").build();
        let x509 = name.to_x509_name().unwrap();
        assert_eq!(x509.0.len(), 1);
        assert_eq!(x509.to_string(), "CN=leaf");
    }

    #[test]
    fn test_request_json_shape() {
        let json = r#"{
            "KeyType": "ecc256",
            "Subject": { "CommonName": "root" },
            "Validity": { "NotBefore": "2001-01-01", "NotAfter": "2002-01-01" },
            "AlternateNames": [{ "Type": "dns", "Value": "foo.example.com" }, { "Type": "x400", "Value": "bar" }],
            "Usage": { "CertSign": true, "CRLSign": true, "OCSPSigning": true, "CustomEKUs": ["1.2.3.4"] },
            "IsCertificateAuthority": true,
            "StatusProviders": { "CRL": "http://crl.example.com" }
        }"#;

        let request: CertificateRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.key_type, KeyType::Ecc256);
        assert_eq!(request.signature_algorithm, SignatureAlgorithm::Sha256);
        assert_eq!(request.subject.common_name, "root");
        assert_eq!(request.alternate_names[0], AlternateName::dns("foo.example.com"));
        assert_eq!(request.alternate_names[1].name_type, AlternateNameType::Unknown);
        assert!(request.usage.cert_sign && request.usage.crl_sign && request.usage.ocsp_signing);
        assert_eq!(request.usage.custom_ekus, vec!["1.2.3.4".to_string()]);
        assert!(request.is_certificate_authority);
        assert_eq!(
            request.status_providers.crl.as_deref(),
            Some("http://crl.example.com")
        );
        assert!(request.extensions.is_empty());
    }
}
