pub mod extensions;
pub mod params;

use der::asn1::AnyRef;
use der::{Any, Decode};
use serde::{Deserialize, Serialize};

use crate::error::CertFactoryError;
use crate::key::{KeyPair, PublicKey};
use crate::tbs_certificate::decode_time;
use extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption,
    ExtensionValue, KeyUsage, KeyUsages, MANAGED_EXTENSIONS, SubjectAltName,
    SubjectKeyIdentifier, ToAndFromX509Extension,
};
use params::{
    AlternateNameType, CertificateRequest, DateRange, ExtensionParam, Name, SignatureAlgorithm,
    StatusProviders, format_date,
};

pub type Result<T> = std::result::Result<T, CertFactoryError>;

/// Represents the supported signature algorithms for certificates.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    /// SHA-256 with RSA encryption.
    RsaSha256,
    /// SHA-384 with RSA encryption.
    RsaSha384,
    /// SHA-512 with RSA encryption.
    RsaSha512,
    /// SHA-256 with ECDSA.
    EcdsaSha256,
    /// SHA-384 with ECDSA.
    EcdsaSha384,
    /// SHA-512 with ECDSA.
    EcdsaSha512,
}

impl SigningAlgorithm {
    /// Pairs the signing key's family with a requested digest.
    pub fn pair(key: &KeyPair, digest: SignatureAlgorithm) -> Self {
        match (key, digest) {
            (KeyPair::Rsa { .. }, SignatureAlgorithm::Sha256) => SigningAlgorithm::RsaSha256,
            (KeyPair::Rsa { .. }, SignatureAlgorithm::Sha384) => SigningAlgorithm::RsaSha384,
            (KeyPair::Rsa { .. }, SignatureAlgorithm::Sha512) => SigningAlgorithm::RsaSha512,
            (_, SignatureAlgorithm::Sha256) => SigningAlgorithm::EcdsaSha256,
            (_, SignatureAlgorithm::Sha384) => SigningAlgorithm::EcdsaSha384,
            (_, SignatureAlgorithm::Sha512) => SigningAlgorithm::EcdsaSha512,
        }
    }

    /// The digest half of the algorithm.
    pub fn digest(self) -> SignatureAlgorithm {
        match self {
            SigningAlgorithm::RsaSha256 | SigningAlgorithm::EcdsaSha256 => {
                SignatureAlgorithm::Sha256
            }
            SigningAlgorithm::RsaSha384 | SigningAlgorithm::EcdsaSha384 => {
                SignatureAlgorithm::Sha384
            }
            SigningAlgorithm::RsaSha512 | SigningAlgorithm::EcdsaSha512 => {
                SignatureAlgorithm::Sha512
            }
        }
    }

    pub fn oid(self) -> const_oid::ObjectIdentifier {
        use const_oid::db::rfc5912;
        match self {
            SigningAlgorithm::RsaSha256 => rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            SigningAlgorithm::RsaSha384 => rfc5912::SHA_384_WITH_RSA_ENCRYPTION,
            SigningAlgorithm::RsaSha512 => rfc5912::SHA_512_WITH_RSA_ENCRYPTION,
            SigningAlgorithm::EcdsaSha256 => rfc5912::ECDSA_WITH_SHA_256,
            SigningAlgorithm::EcdsaSha384 => rfc5912::ECDSA_WITH_SHA_384,
            SigningAlgorithm::EcdsaSha512 => rfc5912::ECDSA_WITH_SHA_512,
        }
    }

    /// Looks up the algorithm for a signature algorithm OID.
    pub fn from_oid(oid: &const_oid::ObjectIdentifier) -> Option<Self> {
        [
            SigningAlgorithm::RsaSha256,
            SigningAlgorithm::RsaSha384,
            SigningAlgorithm::RsaSha512,
            SigningAlgorithm::EcdsaSha256,
            SigningAlgorithm::EcdsaSha384,
            SigningAlgorithm::EcdsaSha512,
        ]
        .into_iter()
        .find(|algorithm| algorithm.oid() == *oid)
    }

    fn is_rsa(self) -> bool {
        matches!(
            self,
            SigningAlgorithm::RsaSha256 | SigningAlgorithm::RsaSha384 | SigningAlgorithm::RsaSha512
        )
    }
}

impl From<SigningAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    /// Converts a `SigningAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA identifiers carry explicit NULL parameters (RFC 4055 §5);
    /// ECDSA identifiers carry none (RFC 5758 §3.2).
    fn from(value: SigningAlgorithm) -> Self {
        x509_cert::spki::AlgorithmIdentifierOwned {
            oid: value.oid(),
            parameters: value.is_rsa().then(|| Any::from(AnyRef::NULL)),
        }
    }
}

/// An issued certificate and its private key.
///
/// This is the portable form handed back to callers: both halves are
/// stored as hex-encoded DER, and every structured view is re-derived from
/// them on demand. Failing to re-derive is a [`CertFactoryError::Corrupt`].
///
/// # Fields
/// * `serial` - Decimal serial number.
/// * `subject` - Subject name.
/// * `certificate_authority` - The certificate's BasicConstraints CA flag.
/// * `certificate_data` - Hex-encoded DER certificate.
/// * `key_data` - Hex-encoded PKCS#8 DER private key; empty when the key is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Certificate {
    pub serial: String,
    pub subject: Name,
    pub certificate_authority: bool,
    pub certificate_data: String,
    #[serde(default)]
    pub key_data: String,
}

impl Certificate {
    /// Builds the issued model from a DER certificate and a PKCS#8 DER key.
    ///
    /// `key_der` may be empty for a certificate imported without its key.
    ///
    /// # Errors
    /// `DecodingError` when `cert_der` is not a certificate.
    pub fn from_parts(cert_der: &[u8], key_der: &[u8]) -> Result<Self> {
        let x509 = x509_cert::Certificate::from_der(cert_der)?;
        let tbs = &x509.tbs_certificate;

        let certificate_authority = find_extension::<BasicConstraints>(tbs)?
            .map(|bc| bc.is_ca)
            .unwrap_or(false);

        Ok(Self {
            serial: rsa::BigUint::from_bytes_be(tbs.serial_number.as_bytes()).to_string(),
            subject: Name::from_x509_name(&tbs.subject),
            certificate_authority,
            certificate_data: hex::encode(cert_der),
            key_data: hex::encode(key_der),
        })
    }

    /// The DER-encoded certificate.
    pub fn certificate_der(&self) -> Result<Vec<u8>> {
        hex::decode(&self.certificate_data)
            .map_err(|e| CertFactoryError::Corrupt(format!("certificate data: {e}")))
    }

    /// The PKCS#8 DER-encoded private key.
    ///
    /// # Errors
    /// `InvalidInput` when the certificate carries no key, `Corrupt` when
    /// the stored key is not hex.
    pub fn key_der(&self) -> Result<Vec<u8>> {
        if self.key_data.is_empty() {
            return Err(CertFactoryError::invalid(
                "key_data",
                "certificate has no private key",
            ));
        }
        hex::decode(&self.key_data)
            .map_err(|e| CertFactoryError::Corrupt(format!("key data: {e}")))
    }

    /// Parses the stored certificate.
    pub fn x509(&self) -> Result<x509_cert::Certificate> {
        x509_cert::Certificate::from_der(&self.certificate_der()?)
            .map_err(|e| CertFactoryError::Corrupt(format!("certificate data: {e}")))
    }

    /// Parses the stored private key.
    pub fn private_key(&self) -> Result<KeyPair> {
        KeyPair::from_pkcs8_der(&self.key_der()?)
            .map_err(|e| CertFactoryError::Corrupt(format!("key data: {e}")))
    }

    /// A one-line description of the subject, e.g. `C=CA,O=example.com,CN=root`.
    pub fn description(&self) -> Result<String> {
        Ok(self.x509()?.tbs_certificate.subject.to_string())
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        Ok(crate::pem_utils::der_to_pem(
            &self.certificate_der()?,
            crate::pem_utils::CERTIFICATE_LABEL,
        ))
    }

    /// The certificate's subject key identifier, if it has one.
    pub fn subject_key_identifier(&self) -> Result<Option<Vec<u8>>> {
        let x509 = self.x509()?;
        Ok(find_extension::<SubjectKeyIdentifier>(&x509.tbs_certificate)?.map(|skid| skid.0))
    }

    /// The certificate's authority key identifier, if it has one.
    pub fn authority_key_identifier(&self) -> Result<Option<Vec<u8>>> {
        let x509 = self.x509()?;
        Ok(find_extension::<AuthorityKeyIdentifier>(&x509.tbs_certificate)?
            .map(|akid| akid.key_identifier))
    }

    /// Reconstructs the request that would issue an equivalent certificate.
    ///
    /// See [`clone_request`].
    pub fn clone_request(&self) -> Result<CertificateRequest> {
        clone_request(&self.x509()?)
    }
}

/// Decodes the first extension of type `E` in a certificate, if present.
pub fn find_extension<E: ToAndFromX509Extension>(
    tbs: &x509_cert::TbsCertificate,
) -> Result<Option<E>> {
    tbs.extensions
        .iter()
        .flatten()
        .find(|ext| ext.extn_id == E::OID)
        .map(|ext| E::from_x509_extension_value(ext.extn_value.as_bytes()))
        .transpose()
}

/// Reconstructs the request that would issue a certificate equivalent to
/// `x509`, apart from key material, serial and signature.
///
/// Alternate names come back grouped by type (DNS, email, IP, URI); the
/// original interleaving is not recoverable. Extended key usage OIDs other
/// than the six well-known ones come back as custom EKUs. Extensions with
/// a dedicated codec are not repeated in `extensions`.
///
/// # Errors
/// `Corrupt` when the key or signature algorithm is one this engine never
/// issues, `DecodingError` when an extension value cannot be decoded.
pub fn clone_request(x509: &x509_cert::Certificate) -> Result<CertificateRequest> {
    let tbs = &x509.tbs_certificate;

    let key_type = PublicKey::from_x509spki(&tbs.subject_public_key_info)?.key_type()?;

    let signature_algorithm = SigningAlgorithm::from_oid(&x509.signature_algorithm.oid)
        .map(SigningAlgorithm::digest)
        .ok_or_else(|| {
            CertFactoryError::Corrupt(format!(
                "unsupported signature algorithm {}",
                x509.signature_algorithm.oid
            ))
        })?;

    let validity = DateRange {
        not_before: format_date(decode_time(&tbs.validity.not_before)?.date()),
        not_after: format_date(decode_time(&tbs.validity.not_after)?.date()),
    };

    let mut alternate_names = find_extension::<SubjectAltName>(tbs)?
        .map(|san| san.names)
        .unwrap_or_default();
    let group = |name_type: AlternateNameType| match name_type {
        AlternateNameType::Dns => 0,
        AlternateNameType::Email => 1,
        AlternateNameType::Ip => 2,
        AlternateNameType::Uri => 3,
        AlternateNameType::Unknown => 4,
    };
    alternate_names.sort_by_key(|name| group(name.name_type));

    let mut usage = params::KeyUsage::default();
    if let Some(KeyUsage(flags)) = find_extension::<KeyUsage>(tbs)? {
        usage.digital_signature = flags.contains(KeyUsages::DigitalSignature);
        usage.content_commitment = flags.contains(KeyUsages::NonRepudiation);
        usage.key_encipherment = flags.contains(KeyUsages::KeyEncipherment);
        usage.data_encipherment = flags.contains(KeyUsages::DataEncipherment);
        usage.key_agreement = flags.contains(KeyUsages::KeyAgreement);
        usage.cert_sign = flags.contains(KeyUsages::KeyCertSign);
        usage.crl_sign = flags.contains(KeyUsages::CRLSign);
        usage.encipher_only = flags.contains(KeyUsages::EncipherOnly);
        usage.decipher_only = flags.contains(KeyUsages::DecipherOnly);
    }
    if let Some(eku) = find_extension::<ExtendedKeyUsage>(tbs)? {
        for oid in eku.usage {
            match ExtendedKeyUsageOption::from_oid(&oid) {
                Some(ExtendedKeyUsageOption::ServerAuth) => usage.server_auth = true,
                Some(ExtendedKeyUsageOption::ClientAuth) => usage.client_auth = true,
                Some(ExtendedKeyUsageOption::CodeSigning) => usage.code_signing = true,
                Some(ExtendedKeyUsageOption::EmailProtection) => usage.email_protection = true,
                Some(ExtendedKeyUsageOption::TimeStamping) => usage.time_stamping = true,
                Some(ExtendedKeyUsageOption::OcspSigning) => usage.ocsp_signing = true,
                None => usage.custom_ekus.push(oid.to_string()),
            }
        }
    }

    let is_certificate_authority = find_extension::<BasicConstraints>(tbs)?
        .map(|bc| bc.is_ca)
        .unwrap_or(false);

    let extensions = tbs
        .extensions
        .iter()
        .flatten()
        .filter(|ext| !MANAGED_EXTENSIONS.contains(&ext.extn_id))
        .map(|ext| {
            let param = ExtensionParam::from_x509_extension(ext);
            let value = ExtensionValue::from_der(&param.value).map_err(|e| {
                CertFactoryError::DecodingError(format!("extension {}: {e}", param.oid))
            })?;
            Ok(params::Extension {
                oid: param.oid.to_string(),
                value,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CertificateRequest {
        key_type,
        signature_algorithm,
        subject: Name::from_x509_name(&tbs.subject),
        validity,
        alternate_names,
        usage,
        is_certificate_authority,
        status_providers: StatusProviders::default(),
        extensions,
    })
}
