//! # CertFactory - Certificate Request & Chain Issuance
//!
//! CertFactory issues X.509 certificate chains from portable, JSON-friendly
//! certificate requests, built entirely with rustcrypto libraries. Issued
//! certificates can be cloned back into the request that produced them and
//! exported as PEM, DER, or PKCS#12.
//!
//! ## Supported Key Types
//!
//! - **RSA**: 2048, 4096, and 8192-bit keys (`rsa2048`, `rsa4096`, `rsa8192`)
//! - **ECDSA**: P-256 and P-384 curves (`ecc256`, `ecc384`)
//!
//! Each is signed with SHA-256, SHA-384, or SHA-512.
//!
//! ## Supported Formats
//!
//! - **PEM**: certificates, traditional or PKCS#8 private keys, optionally
//!   password-encrypted keys
//! - **DER**: certificates and PKCS#8 private keys
//! - **PKCS#12**: password-protected bundles of a certificate, its key, and
//!   its issuer
//! - **CSR**: PKCS#10 signing requests
//!
//! ## Quick Start
//!
//! ### Issuing a Root and a Leaf
//!
//! ```rust,no_run
//! use certfactory::cert::params::{AlternateName, CertificateRequest, DateRange, KeyType, Name};
//! use certfactory::issuer::issue_chain;
//!
//! # fn main() -> Result<(), certfactory::error::CertFactoryError> {
//! let root = CertificateRequest::builder()
//!     .key_type(KeyType::Ecc256)
//!     .subject(Name::builder().common_name("Example Root").build())
//!     .validity(DateRange::for_days(3650))
//!     .is_certificate_authority(true)
//!     .build();
//!
//! let leaf = CertificateRequest::builder()
//!     .key_type(KeyType::Ecc256)
//!     .subject(Name::builder().common_name("foo.example.com").build())
//!     .validity(DateRange::for_days(365))
//!     .alternate_names(vec![AlternateName::dns("foo.example.com")])
//!     .build();
//!
//! // Roots come back first, then the certificates they signed
//! let chain = issue_chain(&[root, leaf], None)?;
//! println!("Leaf certificate:\n{}", chain[1].to_pem()?);
//! # Ok(())
//! # }
//! ```
//!
//! ### Cloning a Certificate
//!
//! ```rust,no_run
//! use certfactory::import::import_pem_certificate;
//!
//! # fn main() -> Result<(), certfactory::error::CertFactoryError> {
//! # let pem = "";
//! let certificate = import_pem_certificate(pem)?;
//! let request = certificate.clone_request()?;
//! println!("{}", serde_json::to_string_pretty(&request).unwrap());
//! # Ok(())
//! # }
//! ```
//!
//! ### Exporting
//!
//! ```rust,no_run
//! use certfactory::export::{ExportFormat, export_certificates};
//! # use certfactory::cert::Certificate;
//!
//! # fn main() -> Result<(), certfactory::error::CertFactoryError> {
//! # let chain: Vec<Certificate> = vec![];
//! for file in export_certificates(&chain, None, ExportFormat::Pkcs12, "1234")? {
//!     std::fs::write(&file.name, &file.data).unwrap();
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Front ends that speak JSON use [`api::CertFactory`], which wraps each
//! operation in a serializable parameters/result pair.
//!
//! ## Error Handling
//!
//! Validation errors name the offending field, so callers can point the
//! user at it:
//!
//! ```rust
//! use certfactory::cert::params::{AlternateName, CertificateRequest, DateRange, KeyType};
//! use certfactory::error::CertFactoryError;
//! use certfactory::issuer::issue_chain;
//!
//! let request = CertificateRequest::builder()
//!     .key_type(KeyType::Ecc256)
//!     .validity(DateRange::for_days(30))
//!     .is_certificate_authority(true)
//!     .alternate_names(vec![AlternateName::dns("")])
//!     .build();
//!
//! match issue_chain(&[request], None) {
//!     Err(CertFactoryError::InvalidInput { context, message }) => {
//!         assert_eq!(context, "requests[0].alternate_names[0]");
//!         println!("{context}: {message}");
//!     }
//!     other => panic!("unexpected result: {other:?}"),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`api`]: Request/response surface for front ends
//! - [`cert`]: Issued certificates, the request model, extensions, and Clone
//! - [`config`]: Version metadata supplied by the caller
//! - [`error`]: Error types and field-path context
//! - [`export`]: PEM, DER, PKCS#12, and CSR export
//! - [`import`]: PEM and PKCS#12 import
//! - [`issuer`]: Certificate and chain issuance
//! - [`key`]: Key generation, encoding, and signing
//! - [`pem_utils`]: PEM encoding and legacy PEM encryption
//! - [`tbs_certificate`]: Signing templates built from requests

pub mod api;
pub mod cert;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod issuer;
pub mod key;
pub mod pem_utils;
pub mod tbs_certificate;
