use std::str::FromStr;

use der::asn1::{GeneralizedTime, UtcTime};
use der::flagset::FlagSet;
use time::OffsetDateTime;
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::{Time, Validity};

use crate::cert::SigningAlgorithm;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage,
    KeyUsages, MANAGED_EXTENSIONS, SubjectAltName, SubjectKeyIdentifier,
};
use crate::cert::params::{self, CertificateRequest, ExtensionParam, SignatureAlgorithm};
use crate::error::CertFactoryError;
use crate::key::key_identifier;

/// Represents the "To Be Signed" (TBS) portion of an X.509 certificate,
/// minus the parts that depend on the issuer and the subject's key.
///
/// Building one from a request runs every validation a request is subject
/// to, so a `TbsCertificate` always encodes.
///
/// # Fields
/// * `serial_number` - Positive DER integer bytes of the serial number.
/// * `signature_algorithm` - Digest used when signing.
/// * `subject` - The encoded subject name.
/// * `not_before` - The start of the certificate's validity period.
/// * `not_after` - The end of the certificate's validity period.
/// * `extensions` - Encoded extensions, in certificate order.
#[derive(Debug, Clone)]
pub struct TbsCertificate {
    pub serial_number: Vec<u8>,
    pub signature_algorithm: SignatureAlgorithm,
    pub subject: x509_cert::name::Name,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub extensions: Vec<ExtensionParam>,
}

impl TbsCertificate {
    /// Validates a request and encodes it into a signing template.
    ///
    /// Extensions are laid out as BasicConstraints (critical), KeyUsage
    /// (critical, only when a flag is set), ExtendedKeyUsage (only when a
    /// purpose is set), SubjectAltName (only when names are given), then the
    /// request's custom extensions, non-critical, in request order.
    ///
    /// # Errors
    /// `InvalidInput` naming the offending field.
    pub fn from_request(request: &CertificateRequest) -> Result<Self, CertFactoryError> {
        let (not_before, not_after) = request.validity.parse()?;
        let not_before = not_before.midnight().assume_utc();
        let not_after = not_after.midnight().assume_utc();
        encode_time(not_before).map_err(|e| e.with_context("validity.not_before"))?;
        encode_time(not_after).map_err(|e| e.with_context("validity.not_after"))?;

        let subject = request.subject.to_x509_name()?;

        let mut extensions = vec![ExtensionParam::from_extension(
            &BasicConstraints {
                is_ca: request.is_certificate_authority,
            },
            true,
        )?];

        let key_usage = key_usage_flags(&request.usage);
        if !key_usage.is_empty() {
            extensions.push(ExtensionParam::from_extension(&KeyUsage(key_usage), true)?);
        }

        let extended_key_usage = extended_key_usage(&request.usage)?;
        if !extended_key_usage.usage.is_empty() {
            extensions.push(ExtensionParam::from_extension(&extended_key_usage, false)?);
        }

        if !request.alternate_names.is_empty() {
            let san = SubjectAltName {
                names: request.alternate_names.clone(),
            };
            extensions.push(ExtensionParam::from_extension(&san, false)?);
        }

        for (index, extension) in request.extensions.iter().enumerate() {
            extensions.push(
                custom_extension(extension)
                    .map_err(|e| e.with_context(&format!("extensions[{index}]")))?,
            );
        }

        Ok(Self {
            serial_number: random_serial(),
            signature_algorithm: request.signature_algorithm,
            subject,
            not_before,
            not_after,
            extensions,
        })
    }

    /// Converts the template into a `TbsCertificateInner` for DER encoding.
    ///
    /// # Arguments
    /// * `issuer` - The issuer name; the template's own subject when self-signing.
    /// * `subject_public_key_info` - The subject's public key.
    /// * `authority_key_id` - The issuer's key identifier; `None` when self-signing.
    /// * `algorithm` - The issuer's signing algorithm.
    ///
    /// A SubjectKeyIdentifier is always added, and an AuthorityKeyIdentifier
    /// when `authority_key_id` is given.
    pub fn to_tbs_certificate_inner(
        &self,
        issuer: &x509_cert::name::Name,
        subject_public_key_info: SubjectPublicKeyInfoOwned,
        authority_key_id: Option<Vec<u8>>,
        algorithm: SigningAlgorithm,
    ) -> Result<x509_cert::TbsCertificate, CertFactoryError> {
        let mut extensions = self.extensions.clone();
        extensions.push(ExtensionParam::from_extension(
            &SubjectKeyIdentifier(key_identifier(&subject_public_key_info)),
            false,
        )?);
        if let Some(key_identifier) = authority_key_id {
            extensions.push(ExtensionParam::from_extension(
                &AuthorityKeyIdentifier { key_identifier },
                false,
            )?);
        }

        let extensions = extensions
            .iter()
            .map(ExtensionParam::to_x509_extension)
            .collect::<Result<Vec<_>, _>>()?;

        let serial_number: SerialNumber = SerialNumber::new(&self.serial_number)
            .map_err(|e| CertFactoryError::EncodingError(e.to_string()))?;

        let tbs: x509_cert::TbsCertificate = TbsCertificateInner {
            version: Version::V3,
            serial_number,
            signature: algorithm.into(),
            issuer: issuer.clone(),
            validity: Validity {
                not_before: encode_time(self.not_before)?,
                not_after: encode_time(self.not_after)?,
            },
            subject: self.subject.clone(),
            subject_public_key_info,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        };
        Ok(tbs)
    }
}

/// Encodes a moment as an X.509 time: UTCTime for 1950 through 2049,
/// GeneralizedTime otherwise.
///
/// # Errors
/// `InvalidInput` (without a field path) for moments before the Unix epoch.
pub(crate) fn encode_time(moment: OffsetDateTime) -> Result<Time, CertFactoryError> {
    let seconds = u64::try_from(moment.unix_timestamp())
        .map_err(|_| CertFactoryError::invalid("", "times before 1970-01-01 are not supported"))?;
    let duration = std::time::Duration::from_secs(seconds);

    let time = if moment.year() < 2050 {
        Time::UtcTime(UtcTime::from_unix_duration(duration)?)
    } else {
        Time::GeneralTime(GeneralizedTime::from_unix_duration(duration)?)
    };
    Ok(time)
}

/// Reads an X.509 time back into a UTC moment.
pub(crate) fn decode_time(time: &Time) -> Result<OffsetDateTime, CertFactoryError> {
    crate::cert::extensions::unix_to_datetime(time.to_unix_duration())
}

fn random_serial() -> Vec<u8> {
    let mut serial = rand::random::<u128>();
    while serial == 0 {
        serial = rand::random::<u128>();
    }

    let bytes = serial.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    let mut encoded = Vec::with_capacity(17);
    if bytes[start] & 0x80 != 0 {
        encoded.push(0);
    }
    encoded.extend_from_slice(&bytes[start..]);
    encoded
}

pub(crate) fn key_usage_flags(usage: &params::KeyUsage) -> FlagSet<KeyUsages> {
    let flags = [
        (usage.digital_signature, KeyUsages::DigitalSignature),
        (usage.content_commitment, KeyUsages::NonRepudiation),
        (usage.key_encipherment, KeyUsages::KeyEncipherment),
        (usage.data_encipherment, KeyUsages::DataEncipherment),
        (usage.key_agreement, KeyUsages::KeyAgreement),
        (usage.cert_sign, KeyUsages::KeyCertSign),
        (usage.crl_sign, KeyUsages::CRLSign),
        (usage.encipher_only, KeyUsages::EncipherOnly),
        (usage.decipher_only, KeyUsages::DecipherOnly),
    ];

    flags
        .into_iter()
        .filter(|(set, _)| *set)
        .fold(FlagSet::default(), |acc, (_, flag)| acc | flag)
}

fn extended_key_usage(usage: &params::KeyUsage) -> Result<ExtendedKeyUsage, CertFactoryError> {
    let well_known = [
        (usage.server_auth, ExtendedKeyUsageOption::ServerAuth),
        (usage.client_auth, ExtendedKeyUsageOption::ClientAuth),
        (usage.code_signing, ExtendedKeyUsageOption::CodeSigning),
        (usage.email_protection, ExtendedKeyUsageOption::EmailProtection),
        (usage.time_stamping, ExtendedKeyUsageOption::TimeStamping),
        (usage.ocsp_signing, ExtendedKeyUsageOption::OcspSigning),
    ];

    let mut oids: Vec<const_oid::ObjectIdentifier> = well_known
        .into_iter()
        .filter(|(set, _)| *set)
        .map(|(_, option)| option.into())
        .collect();

    for (index, custom) in usage.custom_ekus.iter().enumerate() {
        let oid = const_oid::ObjectIdentifier::from_str(custom).map_err(|e| {
            CertFactoryError::invalid(format!("usage.custom_ekus[{index}]"), e.to_string())
        })?;
        oids.push(oid);
    }

    Ok(ExtendedKeyUsage { usage: oids })
}

fn custom_extension(extension: &params::Extension) -> Result<ExtensionParam, CertFactoryError> {
    let oid = const_oid::ObjectIdentifier::from_str(&extension.oid)
        .map_err(|e| CertFactoryError::invalid("oid", e.to_string()))?;
    if MANAGED_EXTENSIONS.contains(&oid) {
        return Err(CertFactoryError::invalid(
            "oid",
            format!("extension {oid} is managed by the request's own fields"),
        ));
    }

    let value = extension
        .value
        .to_der()
        .map_err(|e| match e {
            CertFactoryError::InvalidInput { .. } => e.with_context("value"),
            other => CertFactoryError::invalid("value", other.to_string()),
        })?;

    Ok(ExtensionParam {
        oid,
        critical: false,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::ToAndFromX509Extension;
    use crate::cert::params::{AlternateName, DateRange, ExtensionValue, KeyType, Name};
    use time::macros::{date, datetime};

    fn request() -> CertificateRequest {
        CertificateRequest::builder()
            .key_type(KeyType::Ecc256)
            .subject(Name::builder().common_name("leaf").build())
            .validity(DateRange::new(date!(2001 - 01 - 01), date!(2002 - 01 - 01)))
            .build()
    }

    fn context_of(result: Result<TbsCertificate, CertFactoryError>) -> String {
        match result {
            Err(CertFactoryError::InvalidInput { context, .. }) => context,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_minimal_request_has_only_basic_constraints() {
        let tbs = TbsCertificate::from_request(&request()).unwrap();
        assert_eq!(tbs.extensions.len(), 1);
        assert_eq!(tbs.extensions[0].oid, BasicConstraints::OID);
        assert!(tbs.extensions[0].critical);
        assert_eq!(tbs.not_before, datetime!(2001-01-01 00:00 UTC));
    }

    #[test]
    fn test_serials_are_positive_and_distinct() {
        let a = TbsCertificate::from_request(&request()).unwrap();
        let b = TbsCertificate::from_request(&request()).unwrap();
        assert_ne!(a.serial_number, b.serial_number);
        assert!(a.serial_number.len() <= 17);
        assert_eq!(a.serial_number[0] & 0x80, 0);
    }

    #[test]
    fn test_usage_becomes_key_usage_and_eku() {
        let mut request = request();
        request.usage.digital_signature = true;
        request.usage.crl_sign = true;
        request.usage.server_auth = true;
        request.usage.custom_ekus = vec!["1.2.3.4.5".to_string()];

        let tbs = TbsCertificate::from_request(&request).unwrap();
        let ku: KeyUsage = tbs.extensions[1].to_extension().unwrap();
        assert_eq!(ku.0, KeyUsages::DigitalSignature | KeyUsages::CRLSign);
        assert!(tbs.extensions[1].critical);

        let eku: ExtendedKeyUsage = tbs.extensions[2].to_extension().unwrap();
        assert_eq!(
            eku.usage,
            vec![
                const_oid::db::rfc5912::ID_KP_SERVER_AUTH,
                const_oid::ObjectIdentifier::new_unwrap("1.2.3.4.5"),
            ]
        );
    }

    #[test]
    fn test_validation_errors_name_the_field() {
        let mut bad_eku = request();
        bad_eku.usage.custom_ekus = vec!["1.2.3".to_string(), "not an oid".to_string()];
        assert_eq!(
            context_of(TbsCertificate::from_request(&bad_eku)),
            "usage.custom_ekus[1]"
        );

        let mut bad_san = request();
        bad_san.alternate_names = vec![AlternateName::dns("a.example.com"), AlternateName::ip("")];
        assert_eq!(
            context_of(TbsCertificate::from_request(&bad_san)),
            "alternate_names[1]"
        );

        let mut bad_validity = request();
        bad_validity.validity = DateRange::new(date!(2002 - 01 - 01), date!(2001 - 01 - 01));
        assert_eq!(context_of(TbsCertificate::from_request(&bad_validity)), "validity");

        let mut pre_epoch = request();
        pre_epoch.validity = DateRange::new(date!(1969 - 01 - 01), date!(2001 - 01 - 01));
        assert_eq!(
            context_of(TbsCertificate::from_request(&pre_epoch)),
            "validity.not_before"
        );
    }

    #[test]
    fn test_custom_extensions() {
        let mut request = request();
        request.extensions = vec![
            params::Extension {
                oid: "1.3.6.1.4.1.99999.1".to_string(),
                value: ExtensionValue::String("hello".to_string()),
            },
            params::Extension {
                oid: "1.3.6.1.4.1.99999.2".to_string(),
                value: ExtensionValue::Integer(42),
            },
        ];
        let tbs = TbsCertificate::from_request(&request).unwrap();
        let custom = &tbs.extensions[1..];
        assert_eq!(custom.len(), 2);
        assert!(custom.iter().all(|ext| !ext.critical));
        assert_eq!(
            ExtensionValue::from_der(&custom[1].value).unwrap(),
            ExtensionValue::Integer(42)
        );

        request.extensions[1].oid = "1.3.6.1.4.1.99999.x".to_string();
        assert_eq!(
            context_of(TbsCertificate::from_request(&request)),
            "extensions[1].oid"
        );

        request.extensions[1].oid = "2.5.29.17".to_string();
        assert_eq!(
            context_of(TbsCertificate::from_request(&request)),
            "extensions[1].oid"
        );

        request.extensions[1] = params::Extension {
            oid: "1.3.6.1.4.1.99999.2".to_string(),
            value: ExtensionValue::Timestamp(datetime!(1960-01-01 00:00 UTC)),
        };
        assert_eq!(
            context_of(TbsCertificate::from_request(&request)),
            "extensions[1].value"
        );
    }

    #[test]
    fn test_encode_time_switches_to_generalized_time() {
        assert!(matches!(
            encode_time(datetime!(2049-12-31 00:00 UTC)).unwrap(),
            Time::UtcTime(_)
        ));
        let late = encode_time(datetime!(2050-01-01 00:00 UTC)).unwrap();
        assert!(matches!(late, Time::GeneralTime(_)));
        assert_eq!(decode_time(&late).unwrap(), datetime!(2050-01-01 00:00 UTC));
    }
}
