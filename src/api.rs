//! Request/response surface consumed by the command-line and browser
//! front ends.
//!
//! Every operation takes one parameters struct and returns one result,
//! both serializable with PascalCase field names. Binary fields travel as
//! standard base64.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cert::Certificate;
use crate::cert::params::CertificateRequest;
use crate::config::FactoryConfig;
use crate::error::CertFactoryError;
use crate::export::{
    self, ExportFormat, ExportedFile, PEM_MIME, base64_data, build_pkcs12, filename_safe,
};
use crate::import::{import_pem_certificate, import_pkcs12, parse_private_key_pem};
use crate::issuer::issue_chain;
use crate::pem_utils::{
    CERTIFICATE_LABEL, PRIVATE_KEY_LABEL, certificate_blocks, der_to_pem, is_encrypted_pem_block,
};

type Result<T> = std::result::Result<T, CertFactoryError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GenerateCertificatesParameters {
    pub requests: Vec<CertificateRequest>,
    #[serde(default)]
    pub imported_root: Option<Certificate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportCertificatesParameters {
    pub certificates: Vec<Certificate>,
    /// `PEM`, `DER` or `PKCS12`.
    pub format: String,
    #[serde(default)]
    pub password: String,
    /// The root the batch was issued from, bundled into PKCS#12 files.
    #[serde(default)]
    pub imported_root: Option<Certificate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportCsrParameters {
    pub request: CertificateRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CloneCertificateParameters {
    /// PEM-encoded certificate.
    #[serde(with = "base64_data")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImportRootCertificateParameters {
    /// PKCS#12 bundle holding the root and its key.
    #[serde(with = "base64_data")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub password: String,
}

/// A certificate and/or a key to convert. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConvertParameters {
    #[serde(default, with = "base64_data::optional")]
    pub cert: Option<Vec<u8>>,
    #[serde(default, with = "base64_data::optional")]
    pub key: Option<Vec<u8>>,
}

pub type ConvertResult = ConvertParameters;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtractPkcs12Parameters {
    #[serde(with = "base64_data")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub password: String,
}

/// PEM-encoded contents of a PKCS#12 bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtractPkcs12Result {
    #[serde(with = "base64_data")]
    pub cert: Vec<u8>,
    #[serde(with = "base64_data")]
    pub key: Vec<u8>,
    #[serde(rename = "CACert", default, with = "base64_data::optional")]
    pub ca_cert: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatePkcs12Parameters {
    /// PEM-encoded certificate.
    #[serde(with = "base64_data")]
    pub cert: Vec<u8>,
    /// PEM-encoded, unencrypted private key.
    #[serde(with = "base64_data")]
    pub key: Vec<u8>,
    #[serde(rename = "CACert", default, with = "base64_data::optional")]
    pub ca_cert: Option<Vec<u8>>,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatePkcs12Result {
    #[serde(with = "base64_data")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PingParameters {
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PingResponse {
    #[serde(rename = "OK")]
    pub ok: bool,
    pub nonce: String,
}

/// Entry point for front ends.
///
/// Holds nothing but the caller's metadata; every operation is independent.
#[derive(Debug, Clone, Default)]
pub struct CertFactory {
    config: FactoryConfig,
}

impl CertFactory {
    pub fn new(config: FactoryConfig) -> Self {
        Self { config }
    }

    /// Issues a batch of requests. See [`issue_chain`].
    pub fn generate_chain(
        &self,
        parameters: &GenerateCertificatesParameters,
    ) -> Result<Vec<Certificate>> {
        let certificates = issue_chain(&parameters.requests, parameters.imported_root.as_ref())?;
        info!(count = certificates.len(), "generated certificates");
        Ok(certificates)
    }

    /// Serializes issued certificates into files.
    ///
    /// # Errors
    /// `UnsupportedFormat` for an unknown format string, before any
    /// certificate is touched.
    pub fn export_certificates(
        &self,
        parameters: &ExportCertificatesParameters,
    ) -> Result<Vec<ExportedFile>> {
        let format: ExportFormat = parameters.format.parse()?;
        export::export_certificates(
            &parameters.certificates,
            parameters.imported_root.as_ref(),
            format,
            &parameters.password,
        )
    }

    /// Builds a signing request and its key as `<name>.csr` and `<name>.key`.
    pub fn export_csr(&self, parameters: &ExportCsrParameters) -> Result<Vec<ExportedFile>> {
        let (csr, key) = export::export_csr(&parameters.request)?;
        let name = filename_safe(&parameters.request.subject.common_name);
        Ok(vec![
            ExportedFile {
                name: format!("{name}.csr"),
                mime: PEM_MIME.to_string(),
                data: csr.into_bytes(),
            },
            ExportedFile {
                name: format!("{name}.key"),
                mime: PEM_MIME.to_string(),
                data: key.into_bytes(),
            },
        ])
    }

    /// Reconstructs the request behind a PEM certificate.
    pub fn clone_certificate(
        &self,
        parameters: &CloneCertificateParameters,
    ) -> Result<CertificateRequest> {
        let certificate = import_pem_certificate(pem_text(&parameters.data)?)
            .map_err(|e| e.with_context("error importing pem cert"))?;
        certificate.clone_request()
    }

    /// Loads a root certificate and its key from a PKCS#12 bundle, ready to
    /// be passed back as `ImportedRoot`.
    pub fn import_root_certificate(
        &self,
        parameters: &ImportRootCertificateParameters,
    ) -> Result<Certificate> {
        let contents = import_pkcs12(&parameters.data, &parameters.password)
            .map_err(|e| e.with_context("error importing P12"))?;
        if !contents.certificate.certificate_authority {
            warn!(
                subject = %contents.certificate.subject.common_name,
                "imported root is not a certificate authority"
            );
        }
        Ok(contents.certificate)
    }

    /// Unwraps the first PEM block of the certificate and of the key.
    ///
    /// # Errors
    /// `InvalidInput` on `key` for an encrypted key.
    pub fn convert_pem_to_der(&self, parameters: &ConvertParameters) -> Result<ConvertResult> {
        let cert = parameters
            .cert
            .as_deref()
            .map(|data| first_block(data, "cert"))
            .transpose()?
            .map(pem::Pem::into_contents);
        let key = parameters
            .key
            .as_deref()
            .map(|data| first_block(data, "key"))
            .transpose()?
            .map(|block| {
                if is_encrypted_pem_block(&block) {
                    Err(CertFactoryError::invalid(
                        "key",
                        "encrypted keys cannot be converted",
                    ))
                } else {
                    Ok(block.into_contents())
                }
            })
            .transpose()?;
        Ok(ConvertResult { cert, key })
    }

    /// Wraps a DER certificate as `CERTIFICATE` and a DER key as PKCS#8
    /// `PRIVATE KEY`.
    pub fn convert_der_to_pem(&self, parameters: &ConvertParameters) -> Result<ConvertResult> {
        let cert = parameters
            .cert
            .as_deref()
            .map(|der| der_to_pem(der, CERTIFICATE_LABEL).into_bytes());
        let key = parameters
            .key
            .as_deref()
            .map(|der| der_to_pem(der, PRIVATE_KEY_LABEL).into_bytes());
        Ok(ConvertResult { cert, key })
    }

    /// Opens a PKCS#12 bundle into PEM: the leaf certificate, its PKCS#8
    /// key, and the first chain certificate when there is one.
    pub fn extract_pkcs12(
        &self,
        parameters: &ExtractPkcs12Parameters,
    ) -> Result<ExtractPkcs12Result> {
        let contents = import_pkcs12(&parameters.data, &parameters.password)?;
        let ca_cert = contents
            .ca
            .as_ref()
            .map(|ca| ca.to_pem().map(String::into_bytes))
            .transpose()?;
        Ok(ExtractPkcs12Result {
            cert: contents.certificate.to_pem()?.into_bytes(),
            key: der_to_pem(&contents.certificate.key_der()?, PRIVATE_KEY_LABEL).into_bytes(),
            ca_cert,
        })
    }

    /// Bundles PEM inputs into a PKCS#12 file.
    pub fn create_pkcs12(
        &self,
        parameters: &CreatePkcs12Parameters,
    ) -> Result<CreatePkcs12Result> {
        let cert_der = first_certificate(&parameters.cert).map_err(|e| e.with_context("cert"))?;
        let key = parse_private_key_pem(pem_text(&parameters.key)?, "")
            .map_err(|e| e.with_context("key"))?;
        let ca_der = parameters
            .ca_cert
            .as_deref()
            .map(|data| first_certificate(data).map_err(|e| e.with_context("ca_cert")))
            .transpose()?;

        let data = build_pkcs12(
            &cert_der,
            &key.to_pkcs8_der()?,
            ca_der.as_deref(),
            &parameters.password,
        )?;
        Ok(CreatePkcs12Result { data })
    }

    /// Echoes the nonce back; front ends use it as a liveness check.
    pub fn ping(&self, parameters: &PingParameters) -> PingResponse {
        PingResponse {
            ok: true,
            nonce: parameters.nonce.clone(),
        }
    }

    /// The metadata this factory was created with.
    pub fn version(&self) -> &FactoryConfig {
        &self.config
    }
}

fn pem_text(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data)
        .map_err(|e| CertFactoryError::DecodingError(format!("PEM data is not text: {e}")))
}

fn first_block(data: &[u8], field: &str) -> Result<pem::Pem> {
    pem::parse(data).map_err(|e| CertFactoryError::invalid(field, format!("not valid PEM: {e}")))
}

fn first_certificate(data: &[u8]) -> Result<Vec<u8>> {
    certificate_blocks(pem_text(data)?)?
        .into_iter()
        .next()
        .ok_or_else(|| CertFactoryError::DecodingError("no certificate found".to_string()))
}
