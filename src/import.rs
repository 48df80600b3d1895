//! Loading certificates issued elsewhere back into the issued model.
//!
//! Imported certificates keep their private key as PKCS#8 DER, whatever
//! form it arrived in, so they can sign like any certificate this crate
//! issued.

use p12_keystore::{KeyStore, KeyStoreEntry};
use tracing::debug;

use crate::cert::Certificate;
use crate::error::CertFactoryError;
use crate::key::KeyPair;
use crate::pem_utils::{
    CERTIFICATE_LABEL, PRIVATE_KEY_LABEL, certificate_blocks, decrypt_pem_block,
    is_encrypted_pem_block,
};

type Result<T> = std::result::Result<T, CertFactoryError>;

/// Imports a PEM certificate together with its PEM private key.
///
/// The key may be `PRIVATE KEY` (PKCS#8), `RSA PRIVATE KEY` (PKCS#1) or
/// `EC PRIVATE KEY` (SEC1), optionally encrypted with `password`.
///
/// # Errors
/// `InvalidPassword` when the key is encrypted and `password` does not
/// open it, `InvalidInput` on `key` when the key does not belong to the
/// certificate.
pub fn import_pem(cert_pem: &str, key_pem: &str, password: &str) -> Result<Certificate> {
    let cert_der = certificate_blocks(cert_pem)?
        .into_iter()
        .next()
        .ok_or_else(|| CertFactoryError::DecodingError("no certificate found".to_string()))?;
    let key = parse_private_key_pem(key_pem, password)?;

    let certificate = Certificate::from_parts(&cert_der, &key.to_pkcs8_der()?)?;
    if !key.matches(&certificate.x509()?.tbs_certificate.subject_public_key_info)? {
        return Err(CertFactoryError::invalid(
            "key",
            "private key does not match the certificate",
        ));
    }

    debug!(subject = %certificate.subject.common_name, "imported PEM certificate");
    Ok(certificate)
}

/// Imports the first certificate of a PEM document, without a key.
pub fn import_pem_certificate(cert_pem: &str) -> Result<Certificate> {
    let cert_der = certificate_blocks(cert_pem)?
        .into_iter()
        .next()
        .ok_or_else(|| CertFactoryError::DecodingError("no certificate found".to_string()))?;
    Certificate::from_parts(&cert_der, &[])
}

/// Parses the first private key block of a PEM document.
pub fn parse_private_key_pem(key_pem: &str, password: &str) -> Result<KeyPair> {
    let block = pem::parse_many(key_pem)?
        .into_iter()
        .find(|block| block.tag().ends_with(PRIVATE_KEY_LABEL))
        .ok_or_else(|| CertFactoryError::DecodingError("no private key found".to_string()))?;

    let encrypted = is_encrypted_pem_block(&block);
    let der = if encrypted {
        if password.is_empty() {
            return Err(CertFactoryError::InvalidPassword);
        }
        decrypt_pem_block(&block, password)?
    } else {
        block.contents().to_vec()
    };

    let key = match block.tag() {
        "PRIVATE KEY" => KeyPair::from_pkcs8_der(&der),
        "RSA PRIVATE KEY" => KeyPair::from_pkcs1_der(&der),
        "EC PRIVATE KEY" => KeyPair::from_sec1_der(&der),
        other => {
            return Err(CertFactoryError::UnsupportedFormat(format!(
                "unsupported private key type {other}"
            )));
        }
    };

    match key {
        // CBC decryption with the wrong key only fails the padding check
        // about 255 times in 256; the rest surfaces here.
        Err(_) if encrypted => Err(CertFactoryError::InvalidPassword),
        other => other,
    }
}

/// A PKCS#12 bundle opened into the issued model.
#[derive(Debug, Clone)]
pub struct Pkcs12Contents {
    /// The certificate the bundled key belongs to, with that key.
    pub certificate: Certificate,
    /// The first other certificate in the bundle, without a key.
    pub ca: Option<Certificate>,
}

/// Opens a PKCS#12 bundle.
///
/// The leaf is the certificate whose public key matches the bundled private
/// key; the first remaining certificate, if any, is the CA.
///
/// # Errors
/// `InvalidPassword` when the integrity check fails, `Pkcs12Error` for
/// malformed bundles or bundles without a private key.
pub fn import_pkcs12(data: &[u8], password: &str) -> Result<Pkcs12Contents> {
    let keystore = KeyStore::from_pkcs12(data, password)?;
    let (alias, key_chain) = keystore
        .private_key_chain()
        .ok_or_else(|| CertFactoryError::Pkcs12Error("bundle has no private key".to_string()))?;

    let key = KeyPair::from_pkcs8_der(key_chain.key())?;

    let mut certificates: Vec<&[u8]> = key_chain
        .chain()
        .iter()
        .map(p12_keystore::Certificate::as_der)
        .collect();
    certificates.extend(keystore.entries().filter_map(|(_, entry)| match entry {
        KeyStoreEntry::Certificate(cert) => Some(cert.as_der()),
        KeyStoreEntry::PrivateKeyChain(_) => None,
    }));

    let mut leaf_index = None;
    for (index, der) in certificates.iter().enumerate() {
        let candidate = Certificate::from_parts(der, &[])?;
        if key.matches(&candidate.x509()?.tbs_certificate.subject_public_key_info)? {
            leaf_index = Some(index);
            break;
        }
    }
    let leaf_index = leaf_index.ok_or_else(|| {
        CertFactoryError::Pkcs12Error("no certificate matches the bundled key".to_string())
    })?;

    let certificate = Certificate::from_parts(certificates[leaf_index], &key.to_pkcs8_der()?)?;
    let ca = certificates
        .iter()
        .enumerate()
        .find(|(index, _)| *index != leaf_index)
        .map(|(_, der)| Certificate::from_parts(der, &[]))
        .transpose()?;

    debug!(alias, has_ca = ca.is_some(), "opened PKCS#12 bundle");
    Ok(Pkcs12Contents { certificate, ca })
}

/// Whether a PEM document holds at least one certificate.
pub fn is_certificate_pem(data: &str) -> bool {
    pem::parse_many(data)
        .map(|blocks| blocks.iter().any(|block| block.tag() == CERTIFICATE_LABEL))
        .unwrap_or(false)
}
