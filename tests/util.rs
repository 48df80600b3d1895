#![allow(dead_code)]

use certfactory::cert::Certificate;
use certfactory::cert::params::{
    AlternateName, CertificateRequest, DateRange, KeyType, KeyUsage, Name,
};
use certfactory::issuer::issue_chain;
use tracing_subscriber::EnvFilter;

/// Routes engine logs to the test output. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn subject(common_name: &str) -> Name {
    Name::builder()
        .organization("example.com")
        .city("Vancouver")
        .province("British Columbia")
        .country("CA")
        .common_name(common_name)
        .build()
}

pub fn root_request(key_type: KeyType) -> CertificateRequest {
    CertificateRequest::builder()
        .key_type(key_type)
        .subject(subject("example.com Example Root"))
        .validity(DateRange::for_days(365))
        .usage(KeyUsage {
            digital_signature: true,
            key_encipherment: true,
            cert_sign: true,
            crl_sign: true,
            ocsp_signing: true,
            ..Default::default()
        })
        .is_certificate_authority(true)
        .build()
}

pub fn leaf_request(key_type: KeyType) -> CertificateRequest {
    CertificateRequest::builder()
        .key_type(key_type)
        .subject(subject("foo.example.com"))
        .validity(DateRange::for_days(365))
        .alternate_names(vec![
            AlternateName::dns("foo.example.com"),
            AlternateName::email("foo@example.com"),
            AlternateName::ip("192.168.1.1"),
            AlternateName::uri("https://foo.example.com/"),
        ])
        .usage(KeyUsage {
            digital_signature: true,
            key_encipherment: true,
            server_auth: true,
            client_auth: true,
            ..Default::default()
        })
        .build()
}

/// Issues an `example.com` root and a `foo.example.com` leaf signed by it.
pub fn generate_chain(key_type: KeyType) -> (Certificate, Certificate) {
    let mut chain = issue_chain(&[root_request(key_type), leaf_request(key_type)], None)
        .expect("Failed to issue chain");
    let leaf = chain.pop().unwrap();
    let root = chain.pop().unwrap();
    (root, leaf)
}
