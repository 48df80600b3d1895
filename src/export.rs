use std::fmt;
use std::str::FromStr;

use der::{Decode, Encode};
use der::asn1::{BitString, SetOfVec};
use p12_keystore::{KeyStore, KeyStoreEntry, PrivateKeyChain};
use serde::{Deserialize, Serialize};
use tracing::debug;
use x509_cert::attr::Attribute;
use x509_cert::request::{CertReq, CertReqInfo, ExtensionReq};

use crate::cert::params::{CertificateRequest, ExtensionParam, Name};
use crate::cert::{Certificate, SigningAlgorithm};
use crate::error::CertFactoryError;
use crate::key::{KeyPair, key_identifier};
use crate::pem_utils::{
    CERTIFICATE_REQUEST_LABEL, LegacyCipher, der_to_pem, encrypt_pem_block,
};
use crate::tbs_certificate::TbsCertificate;

type Result<T> = std::result::Result<T, CertFactoryError>;

pub const PEM_MIME: &str = "application/x-pem-file";
pub const DER_CERTIFICATE_MIME: &str = "application/x-x509-ca-cert";
pub const DER_KEY_MIME: &str = "application/octet-stream";
pub const PKCS12_MIME: &str = "application/x-pkcs12";

/// Output formats for [`export_certificates`].
///
/// Parsed from the front ends' format strings: `PEM`, `DER`, `PKCS12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    #[serde(rename = "PEM")]
    Pem,
    #[serde(rename = "DER")]
    Der,
    #[serde(rename = "PKCS12")]
    Pkcs12,
}

impl FromStr for ExportFormat {
    type Err = CertFactoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PEM" => Ok(ExportFormat::Pem),
            "DER" => Ok(ExportFormat::Der),
            "PKCS12" => Ok(ExportFormat::Pkcs12),
            other => Err(CertFactoryError::UnsupportedFormat(format!(
                "unknown export format {other}"
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Pem => "PEM",
            ExportFormat::Der => "DER",
            ExportFormat::Pkcs12 => "PKCS12",
        })
    }
}

/// One exported file, ready to be written out by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportedFile {
    pub name: String,
    pub mime: String,
    #[serde(with = "base64_data")]
    pub data: Vec<u8>,
}

impl ExportedFile {
    fn new(name: String, mime: &str, data: Vec<u8>) -> Self {
        Self {
            name,
            mime: mime.to_string(),
            data,
        }
    }
}

/// Serde adapters writing byte buffers as standard base64 strings.
pub(crate) mod base64_data {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }

    pub mod optional {
        use super::*;

        pub fn serialize<S: Serializer>(
            data: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match data {
                Some(data) => super::serialize(data, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .filter(|encoded| !encoded.is_empty())
                .map(|encoded| STANDARD.decode(encoded.as_bytes()))
                .transpose()
                .map_err(serde::de::Error::custom)
        }
    }
}

const UNSAFE_FILENAME_CHARS: &[char] = &[
    '<', '>', ':', '"', '/', '\\', '|', '?', '*', ',', '#', '\0',
];

/// Makes a common name usable as a file name on every platform.
///
/// Reserved characters are removed, spaces become `_`, and a leading `.` is
/// escaped so the file is not hidden.
pub fn filename_safe(name: &str) -> String {
    let safe: String = name
        .chars()
        .filter(|c| !UNSAFE_FILENAME_CHARS.contains(c))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();
    if safe.is_empty() {
        "certificate".to_string()
    } else if safe.starts_with('.') {
        format!("_{safe}")
    } else {
        safe
    }
}

/// The file name stem of an exported certificate: the safe common name
/// plus the first 8 digits of the serial.
pub fn export_file_name(certificate: &Certificate) -> String {
    let serial = format!("{:0>8}", certificate.serial);
    format!(
        "{}_{}",
        filename_safe(&certificate.subject.common_name),
        &serial[..8]
    )
}

/// Encodes a certificate and its key as PEM.
///
/// The key is written in its algorithm's own form, `RSA PRIVATE KEY` or
/// `EC PRIVATE KEY`. A non-empty `password` encrypts the key block with
/// AES-128-CBC the way OpenSSL's traditional format does.
pub fn export_pem(certificate: &Certificate, password: &str) -> Result<(String, String)> {
    let cert_pem = certificate.to_pem()?;
    let key_pem = key_to_pem(&certificate.private_key()?, password)?;
    Ok((cert_pem, key_pem))
}

fn key_to_pem(key: &KeyPair, password: &str) -> Result<String> {
    let (label, der) = key.to_traditional_der()?;
    if password.is_empty() {
        Ok(der_to_pem(&der, label))
    } else {
        encrypt_pem_block(&der, label, password, LegacyCipher::Aes128Cbc)
    }
}

/// Returns the DER certificate and the PKCS#8 DER key.
pub fn export_der(certificate: &Certificate) -> Result<(Vec<u8>, Vec<u8>)> {
    Ok((certificate.certificate_der()?, certificate.key_der()?))
}

/// Bundles a certificate, its key and optionally its issuer into a
/// password-protected PKCS#12 file.
///
/// # Errors
/// `InvalidInput` on `password` when the password is empty.
pub fn export_pkcs12(
    certificate: &Certificate,
    issuer: Option<&Certificate>,
    password: &str,
) -> Result<Vec<u8>> {
    let cert_der = certificate.certificate_der()?;
    let issuer_der = issuer.map(Certificate::certificate_der).transpose()?;
    build_pkcs12(
        &cert_der,
        &certificate.key_der()?,
        issuer_der.as_deref(),
        password,
    )
}

/// Builds a PKCS#12 file from DER parts. The key must be PKCS#8.
pub fn build_pkcs12(
    cert_der: &[u8],
    key_der: &[u8],
    ca_der: Option<&[u8]>,
    password: &str,
) -> Result<Vec<u8>> {
    if password.is_empty() {
        return Err(CertFactoryError::invalid(
            "password",
            "a password is required for PKCS#12 files",
        ));
    }

    let x509 = x509_cert::Certificate::from_der(cert_der)?;
    let key = KeyPair::from_pkcs8_der(key_der)?;
    if !key.matches(&x509.tbs_certificate.subject_public_key_info)? {
        return Err(CertFactoryError::invalid(
            "key",
            "private key does not match the certificate",
        ));
    }

    let mut chain = vec![p12_keystore::Certificate::from_der(cert_der)?];
    if let Some(ca_der) = ca_der {
        chain.push(p12_keystore::Certificate::from_der(ca_der)?);
    }

    let alias = Name::from_x509_name(&x509.tbs_certificate.subject).common_name;
    let alias = if alias.is_empty() {
        "certificate".to_string()
    } else {
        alias
    };
    let local_key_id = key_identifier(&x509.tbs_certificate.subject_public_key_info);

    let mut keystore = KeyStore::new();
    keystore.add_entry(
        &alias,
        KeyStoreEntry::PrivateKeyChain(PrivateKeyChain::new(key_der, local_key_id, chain)),
    );
    Ok(keystore.writer(password).write()?)
}

/// Builds a PKCS#10 signing request for `request` with a fresh key.
///
/// The request carries the same extensions an issued certificate would,
/// as an `extensionRequest` attribute. Returns the PEM request and the PEM
/// private key.
pub fn export_csr(request: &CertificateRequest) -> Result<(String, String)> {
    let template = TbsCertificate::from_request(request)?;
    let key = KeyPair::generate(request.key_type)?;
    let algorithm = SigningAlgorithm::pair(&key, template.signature_algorithm);

    let extensions = template
        .extensions
        .iter()
        .map(ExtensionParam::to_x509_extension)
        .collect::<Result<Vec<_>>>()?;
    let mut attributes = SetOfVec::new();
    attributes.insert(Attribute::try_from(ExtensionReq(extensions))?)?;

    let info = CertReqInfo {
        version: x509_cert::request::Version::V1,
        subject: template.subject.clone(),
        public_key: key.as_spki()?,
        attributes,
    };
    let info_der = info
        .to_der()
        .map_err(|e| CertFactoryError::EncodingError(e.to_string()))?;
    let signature = key.sign_data(&info_der, algorithm.digest())?;

    let csr = CertReq {
        info,
        algorithm: algorithm.into(),
        signature: BitString::from_bytes(&signature)
            .map_err(|e| CertFactoryError::EncodingError(e.to_string()))?,
    };
    let csr_der = csr
        .to_der()
        .map_err(|e| CertFactoryError::EncodingError(e.to_string()))?;
    debug!(subject = %request.subject.common_name, "built certificate signing request");

    Ok((
        der_to_pem(&csr_der, CERTIFICATE_REQUEST_LABEL),
        key_to_pem(&key, "")?,
    ))
}

/// Serializes a batch of issued certificates.
///
/// For PKCS#12, every non-CA certificate is bundled with its issuer: the
/// imported root the batch was issued from, otherwise the last CA
/// certificate of the batch. Errors are tagged with `certificates[i]`.
pub fn export_certificates(
    certificates: &[Certificate],
    imported_root: Option<&Certificate>,
    format: ExportFormat,
    password: &str,
) -> Result<Vec<ExportedFile>> {
    let root = imported_root.or_else(|| {
        certificates
            .iter()
            .rev()
            .find(|certificate| certificate.certificate_authority)
    });

    let mut files = Vec::with_capacity(certificates.len() * 2);
    for (index, certificate) in certificates.iter().enumerate() {
        let name = export_file_name(certificate);
        let exported = match format {
            ExportFormat::Pem => export_pem(certificate, password).map(|(cert, key)| {
                vec![
                    ExportedFile::new(format!("{name}.crt"), PEM_MIME, cert.into_bytes()),
                    ExportedFile::new(format!("{name}.key"), PEM_MIME, key.into_bytes()),
                ]
            }),
            ExportFormat::Der => export_der(certificate).map(|(cert, key)| {
                vec![
                    ExportedFile::new(format!("{name}.cer"), DER_CERTIFICATE_MIME, cert),
                    ExportedFile::new(format!("{name}.key"), DER_KEY_MIME, key),
                ]
            }),
            ExportFormat::Pkcs12 => {
                let issuer = root.filter(|_| !certificate.certificate_authority);
                export_pkcs12(certificate, issuer, password).map(|data| {
                    vec![ExportedFile::new(format!("{name}.p12"), PKCS12_MIME, data)]
                })
            }
        };
        files.extend(exported.map_err(|e| e.with_context(&format!("certificates[{index}]")))?);
    }

    debug!(%format, count = files.len(), "exported certificates");
    Ok(files)
}
