use der::Encode;
use der::asn1::BitString;
use tracing::{debug, info, warn};
use x509_cert::certificate::CertificateInner;

use crate::cert::extensions::SubjectKeyIdentifier;
use crate::cert::params::CertificateRequest;
use crate::cert::{Certificate, SigningAlgorithm, find_extension};
use crate::error::CertFactoryError;
use crate::key::{KeyPair, key_identifier};
use crate::tbs_certificate::TbsCertificate;

/// Represents an entity capable of issuing certificates.
///
/// This trait provides methods to retrieve issuer details and issue certificates.
pub trait Issuer {
    /// Returns the distinguished name of the issuer.
    fn issuer_name(&self) -> x509_cert::name::Name;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Returns the key identifier to write into issued certificates'
    /// AuthorityKeyIdentifier, or `None` for self-signed certificates.
    fn authority_key_identifier(&self) -> Option<Vec<u8>>;

    /// Signs a certificate for `subject_key` from a validated template.
    ///
    /// # Arguments
    /// * `template` - The signing template built from the request.
    /// * `subject_key` - The subject's freshly generated key pair.
    ///
    /// # Returns
    /// The issued certificate, holding `subject_key` as its private key.
    fn issue(
        &self,
        template: &TbsCertificate,
        subject_key: &KeyPair,
    ) -> Result<Certificate, CertFactoryError> {
        let algorithm = SigningAlgorithm::pair(self.signing_key(), template.signature_algorithm);
        debug!(?algorithm, "selected signing algorithm");

        let tbs_cert = template.to_tbs_certificate_inner(
            &self.issuer_name(),
            subject_key.as_spki()?,
            self.authority_key_identifier(),
            algorithm,
        )?;

        let tbs_der = tbs_cert
            .to_der()
            .map_err(|e| CertFactoryError::EncodingError(e.to_string()))?;
        let signature = self
            .signing_key()
            .sign_data(&tbs_der, algorithm.digest())?;

        let cert: x509_cert::Certificate = CertificateInner {
            tbs_certificate: tbs_cert,
            signature_algorithm: algorithm.into(),
            signature: BitString::from_bytes(&signature)
                .map_err(|e| CertFactoryError::EncodingError(e.to_string()))?,
        };
        let cert_der = cert
            .to_der()
            .map_err(|e| CertFactoryError::EncodingError(e.to_string()))?;

        let certificate = Certificate::from_parts(&cert_der, &subject_key.to_pkcs8_der()?)?;
        info!(
            serial = %certificate.serial,
            subject = %certificate.subject.common_name,
            ca = certificate.certificate_authority,
            "issued certificate"
        );
        Ok(certificate)
    }
}

/// Issues self-signed certificates: the issuer is the template's own
/// subject and the signing key is the subject's key.
pub struct SelfIssuer<'a> {
    pub name: x509_cert::name::Name,
    pub key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> x509_cert::name::Name {
        self.name.clone()
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }

    fn authority_key_identifier(&self) -> Option<Vec<u8>> {
        None
    }
}

/// A CA certificate together with its private key, ready to sign.
#[derive(Debug, Clone)]
pub struct IssuingAuthority {
    pub cert: x509_cert::Certificate,
    pub key: KeyPair,
    key_id: Vec<u8>,
}

impl IssuingAuthority {
    /// Loads an issued certificate and its key for signing.
    ///
    /// The authority key identifier handed to issued certificates is the
    /// CA's own SubjectKeyIdentifier when it has one, else the SHA-1 of its
    /// public key.
    ///
    /// # Errors
    /// `InvalidInput` when the certificate has no key, `Corrupt` when it
    /// cannot be parsed or does not match its key.
    pub fn from_certificate(certificate: &Certificate) -> Result<Self, CertFactoryError> {
        let cert = certificate.x509()?;
        let key = certificate.private_key()?;
        if !key.matches(&cert.tbs_certificate.subject_public_key_info)? {
            return Err(CertFactoryError::Corrupt(
                "private key does not match the certificate".to_string(),
            ));
        }

        let key_id = match find_extension::<SubjectKeyIdentifier>(&cert.tbs_certificate)? {
            Some(skid) => skid.0,
            None => key_identifier(&cert.tbs_certificate.subject_public_key_info),
        };

        Ok(Self { cert, key, key_id })
    }
}

impl Issuer for IssuingAuthority {
    fn issuer_name(&self) -> x509_cert::name::Name {
        // The name of the issuer is the subject of the certificate
        self.cert.tbs_certificate.subject.clone()
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }

    fn authority_key_identifier(&self) -> Option<Vec<u8>> {
        Some(self.key_id.clone())
    }
}

/// Issues one certificate with a fresh key.
///
/// The request is fully validated before the key is generated.
///
/// # Arguments
/// * `request` - The certificate request.
/// * `issuer` - The signing CA, or `None` to self-sign.
pub fn issue_certificate(
    request: &CertificateRequest,
    issuer: Option<&IssuingAuthority>,
) -> Result<Certificate, CertFactoryError> {
    let template = TbsCertificate::from_request(request)?;
    let key = KeyPair::generate(request.key_type)?;

    match issuer {
        Some(authority) => authority.issue(&template, &key),
        None => SelfIssuer {
            name: template.subject.clone(),
            key: &key,
        }
        .issue(&template, &key),
    }
}

/// Issues a batch of requests as a chain.
///
/// Without `imported_root`, every CA request is issued self-signed, in
/// request order, and every other request is signed by the last of them.
/// With `imported_root`, CA requests are skipped and every other request is
/// signed by the imported root.
///
/// The result lists the issued CAs first, then the other certificates, each
/// group in request order. The first error aborts the whole batch; it is
/// tagged with `requests[i]`.
pub fn issue_chain(
    requests: &[CertificateRequest],
    imported_root: Option<&Certificate>,
) -> Result<Vec<Certificate>, CertFactoryError> {
    let mut issued = Vec::with_capacity(requests.len());

    let mut authority = match imported_root {
        Some(root) => Some(
            IssuingAuthority::from_certificate(root)
                .map_err(|e| e.with_context("imported_root"))?,
        ),
        None => None,
    };

    let ca_requests = requests
        .iter()
        .enumerate()
        .filter(|(_, request)| request.is_certificate_authority);

    if imported_root.is_some() {
        debug!("using imported root, skipping certificate authority requests");
    } else {
        let ca_count = ca_requests.clone().count();
        if ca_count > 1 {
            warn!(
                ca_count,
                "multiple certificate authority requests; all are self-signed and leaves are signed by the last one"
            );
        }

        for (index, request) in ca_requests {
            let certificate = issue_certificate(request, None)
                .map_err(|e| e.with_context(&format!("requests[{index}]")))?;
            authority = Some(
                IssuingAuthority::from_certificate(&certificate)
                    .map_err(|e| e.with_context(&format!("requests[{index}]")))?,
            );
            issued.push(certificate);
        }
    }

    for (index, request) in requests
        .iter()
        .enumerate()
        .filter(|(_, request)| !request.is_certificate_authority)
    {
        let context = format!("requests[{index}]");
        let authority = authority.as_ref().ok_or_else(|| {
            CertFactoryError::invalid(
                context.clone(),
                "no certificate authority to issue the certificate from",
            )
        })?;
        let certificate =
            issue_certificate(request, Some(authority)).map_err(|e| e.with_context(&context))?;
        issued.push(certificate);
    }

    Ok(issued)
}
