mod util;

use certfactory::api::{
    CertFactory, CloneCertificateParameters, ExportCertificatesParameters,
    GenerateCertificatesParameters,
};
use certfactory::cert::extensions::ExtendedKeyUsage;
use certfactory::cert::find_extension;
use certfactory::cert::params::{
    AlternateName, CertificateRequest, DateRange, Extension, ExtensionValue, KeyType, KeyUsage,
    Name,
};
use certfactory::error::CertFactoryError;
use certfactory::export::{ExportFormat, export_certificates, export_pem, export_pkcs12};
use certfactory::import::{import_pem, import_pkcs12};
use certfactory::issuer::{issue_certificate, issue_chain};
use time::macros::{date, datetime};

pub type Result<T> = std::result::Result<T, CertFactoryError>;

fn scenario_root() -> CertificateRequest {
    CertificateRequest::builder()
        .key_type(KeyType::Ecc256)
        .subject(Name::builder().common_name("root").build())
        .validity(DateRange::new(date!(2001 - 01 - 01), date!(2002 - 01 - 01)))
        .is_certificate_authority(true)
        .build()
}

fn scenario_leaf() -> CertificateRequest {
    CertificateRequest::builder()
        .key_type(KeyType::Ecc256)
        .subject(Name::builder().common_name("leaf").build())
        .validity(DateRange::new(date!(2001 - 01 - 01), date!(2002 - 01 - 01)))
        .alternate_names(vec![AlternateName::dns("foo.example.com")])
        .build()
}

#[test]
fn single_root_is_self_signed() -> Result<()> {
    let chain = issue_chain(&[scenario_root()], None)?;
    assert_eq!(chain.len(), 1);

    let root = &chain[0];
    assert!(root.certificate_authority);
    let x509 = root.x509()?;
    assert_eq!(x509.tbs_certificate.issuer, x509.tbs_certificate.subject);
    assert_eq!(root.authority_key_identifier()?, None);
    Ok(())
}

#[test]
fn leaf_links_to_root() -> Result<()> {
    let chain = issue_chain(&[scenario_root(), scenario_leaf()], None)?;
    assert_eq!(chain.len(), 2);
    let (root, leaf) = (&chain[0], &chain[1]);

    assert_eq!(
        leaf.x509()?.tbs_certificate.issuer,
        root.x509()?.tbs_certificate.subject
    );
    assert!(root.subject_key_identifier()?.is_some());
    assert_eq!(
        leaf.authority_key_identifier()?,
        root.subject_key_identifier()?
    );
    assert!(!leaf.certificate_authority);
    Ok(())
}

#[test]
fn pkcs12_export_needs_a_password() -> Result<()> {
    let chain = issue_chain(&[scenario_root(), scenario_leaf()], None)?;

    let err = export_pkcs12(&chain[1], Some(&chain[0]), "").unwrap_err();
    assert!(matches!(err, CertFactoryError::InvalidInput { .. }));
    assert!(!err.is_fatal());

    let p12 = export_pkcs12(&chain[1], Some(&chain[0]), "1234")?;
    assert!(!p12.is_empty());
    Ok(())
}

#[test]
fn custom_eku_is_encoded_after_well_known_ones() -> Result<()> {
    let mut request = scenario_root();
    request.usage = KeyUsage {
        server_auth: true,
        custom_ekus: vec!["1.2.3.4.5".to_string()],
        ..Default::default()
    };
    let certificate = issue_certificate(&request, None)?;

    let eku = find_extension::<ExtendedKeyUsage>(&certificate.x509()?.tbs_certificate)?
        .expect("missing extended key usage");
    let oids: Vec<String> = eku.usage.iter().map(ToString::to_string).collect();
    assert_eq!(oids, ["1.3.6.1.5.5.7.3.1", "1.2.3.4.5"]);

    let cloned = certificate.clone_request()?;
    assert!(cloned.usage.server_auth);
    assert_eq!(cloned.usage.custom_ekus, ["1.2.3.4.5"]);
    Ok(())
}

#[test]
fn malformed_custom_eku_reports_its_index() {
    let mut request = scenario_root();
    request.usage.custom_ekus = vec!["1.2.3".to_string(), "1.two.3".to_string()];
    let err = issue_chain(&[request], None).unwrap_err();
    assert!(matches!(
        err,
        CertFactoryError::InvalidInput { context, .. } if context == "requests[0].usage.custom_ekus[1]"
    ));
}

#[test]
fn clone_reproduces_the_request() -> Result<()> {
    let (_, leaf) = util::generate_chain(KeyType::Ecc256);
    let original = util::leaf_request(KeyType::Ecc256);

    let cloned = leaf.clone_request()?;
    assert_eq!(cloned.key_type, original.key_type);
    assert_eq!(cloned.signature_algorithm, original.signature_algorithm);
    assert_eq!(cloned.subject, original.subject);
    assert_eq!(cloned.validity, original.validity);
    assert_eq!(cloned.usage, original.usage);
    assert_eq!(cloned.alternate_names, original.alternate_names);
    assert!(!cloned.is_certificate_authority);
    assert!(cloned.extensions.is_empty());

    // The clone issues again
    issue_chain(&[util::root_request(KeyType::Ecc256), cloned], None)?;
    Ok(())
}

#[test]
fn clone_groups_alternate_names_by_type() -> Result<()> {
    let mut request = scenario_root();
    request.alternate_names = vec![
        AlternateName::uri("https://example.com/"),
        AlternateName::ip("::1"),
        AlternateName::dns("b.example.com"),
        AlternateName::email("a@example.com"),
        AlternateName::dns("a.example.com"),
    ];
    let cloned = issue_certificate(&request, None)?.clone_request()?;
    assert_eq!(
        cloned.alternate_names,
        vec![
            AlternateName::dns("b.example.com"),
            AlternateName::dns("a.example.com"),
            AlternateName::email("a@example.com"),
            AlternateName::ip("::1"),
            AlternateName::uri("https://example.com/"),
        ]
    );
    Ok(())
}

#[test]
#[ignore = "generating 4096- and 8192-bit keys takes minutes"]
fn large_rsa_keys_clone_to_their_key_type() -> Result<()> {
    for key_type in [KeyType::Rsa4096, KeyType::Rsa8192] {
        let mut request = scenario_root();
        request.key_type = key_type;
        let certificate = issue_certificate(&request, None)?;
        assert_eq!(certificate.clone_request()?.key_type, key_type);
    }
    Ok(())
}

#[test]
fn custom_extensions_round_trip() -> Result<()> {
    let mut request = scenario_root();
    request.extensions = vec![
        Extension {
            oid: "1.3.6.1.4.1.99999.1".to_string(),
            value: ExtensionValue::String("hello".to_string()),
        },
        Extension {
            oid: "1.3.6.1.4.1.99999.2".to_string(),
            value: ExtensionValue::Integer(-42),
        },
        Extension {
            oid: "1.3.6.1.4.1.99999.3".to_string(),
            value: ExtensionValue::Timestamp(datetime!(2030-06-01 12:34:56 UTC)),
        },
    ];
    let cloned = issue_certificate(&request, None)?.clone_request()?;
    assert_eq!(cloned.extensions, request.extensions);
    Ok(())
}

#[test]
fn invalid_alternate_names_fail_the_batch() {
    let cases = [
        (AlternateName::dns(""), "empty alternate name value"),
        (AlternateName::email(""), "empty alternate name value"),
        (AlternateName::dns(" "), "invalid dns name value"),
        (AlternateName::ip("300.1.1.1"), "invalid ip address 300.1.1.1"),
    ];
    for (name, expected) in cases {
        let mut leaf = scenario_leaf();
        leaf.alternate_names.push(name);
        let err = issue_chain(&[scenario_root(), leaf], None).unwrap_err();
        assert_eq!(
            err,
            CertFactoryError::invalid("requests[1].alternate_names[1]", expected)
        );
    }

    let mut leaf = scenario_leaf();
    leaf.alternate_names = vec![AlternateName::uri("not a uri")];
    let err = issue_chain(&[scenario_root(), leaf], None).unwrap_err();
    assert!(matches!(
        err,
        CertFactoryError::InvalidInput { context, .. } if context == "requests[1].alternate_names[0]"
    ));
}

#[test]
fn inverted_validity_is_rejected() {
    let mut request = scenario_root();
    request.validity = DateRange::new(date!(2002 - 01 - 01), date!(2001 - 01 - 01));
    let err = issue_chain(&[request], None).unwrap_err();
    assert!(matches!(
        err,
        CertFactoryError::InvalidInput { context, .. } if context.starts_with("requests[0].validity")
    ));
}

#[test]
fn multiple_roots_bind_leaves_to_the_last() -> Result<()> {
    util::init_tracing();
    let mut second = scenario_root();
    second.subject.common_name = "second root".to_string();
    let chain = issue_chain(&[scenario_leaf(), scenario_root(), second], None)?;

    let names: Vec<_> = chain.iter().map(|c| c.subject.common_name.clone()).collect();
    assert_eq!(names, ["root", "second root", "leaf"]);
    assert_eq!(
        chain[2].authority_key_identifier()?,
        chain[1].subject_key_identifier()?
    );
    Ok(())
}

#[test]
fn pem_round_trip_is_byte_identical() -> Result<()> {
    let (root, leaf) = util::generate_chain(KeyType::Ecc256);
    for certificate in [&root, &leaf] {
        let (cert_pem, key_pem) = export_pem(certificate, "")?;
        let imported = import_pem(&cert_pem, &key_pem, "")?;
        assert_eq!(imported.certificate_der()?, certificate.certificate_der()?);
        assert_eq!(imported.key_der()?, certificate.key_der()?);
    }
    Ok(())
}

#[test]
fn encrypted_pem_round_trip() -> Result<()> {
    let (_, leaf) = util::generate_chain(KeyType::Rsa2048);
    let (cert_pem, key_pem) = export_pem(&leaf, "correct horse")?;
    assert!(key_pem.contains("Proc-Type: 4,ENCRYPTED"));
    assert!(key_pem.contains("DEK-Info: AES-128-CBC,"));

    assert_eq!(import_pem(&cert_pem, &key_pem, "correct horse")?, leaf);
    assert_eq!(
        import_pem(&cert_pem, &key_pem, "battery staple").unwrap_err(),
        CertFactoryError::InvalidPassword
    );
    Ok(())
}

#[test]
fn pkcs12_round_trip_is_byte_identical() -> Result<()> {
    let (root, leaf) = util::generate_chain(KeyType::Ecc256);
    let p12 = export_pkcs12(&leaf, Some(&root), "1234")?;

    let contents = import_pkcs12(&p12, "1234")?;
    assert_eq!(contents.certificate.certificate_der()?, leaf.certificate_der()?);
    assert_eq!(contents.certificate.key_der()?, leaf.key_der()?);
    assert_eq!(
        contents.ca.expect("missing CA").certificate_der()?,
        root.certificate_der()?
    );
    Ok(())
}

#[test]
fn exported_file_names() -> Result<()> {
    let mut request = scenario_root();
    request.subject.common_name = ".My: Root/CA".to_string();
    let certificate = issue_certificate(&request, None)?;

    let files = export_certificates(&[certificate.clone()], None, ExportFormat::Pem, "")?;
    let expected = format!("_.My_RootCA_{}", &certificate.serial[..8]);
    assert_eq!(files[0].name, format!("{expected}.crt"));
    assert_eq!(files[1].name, format!("{expected}.key"));
    Ok(())
}

#[test]
fn corrupt_certificate_data_is_fatal() {
    let (root, _) = util::generate_chain(KeyType::Ecc256);
    let mut corrupt = root.clone();
    corrupt.certificate_data = "zz".to_string();
    let err = corrupt.clone_request().unwrap_err();
    assert!(err.is_fatal());

    let mut truncated = root;
    truncated.certificate_data.truncate(40);
    assert!(truncated.x509().unwrap_err().is_fatal());
}

#[test]
fn api_json_round_trip() {
    util::init_tracing();
    let factory = CertFactory::default();
    let parameters: GenerateCertificatesParameters = serde_json::from_str(
        r#"{
            "Requests": [
                {
                    "KeyType": "ecc256",
                    "SignatureAlgorithm": "sha384",
                    "Subject": { "CommonName": "leaf" },
                    "Validity": { "NotBefore": "2001-01-01", "NotAfter": "2002-01-01" },
                    "AlternateNames": [{ "Type": "dns", "Value": "foo.example.com" }],
                    "Usage": { "ServerAuth": true, "CustomEKUs": ["1.2.3.4.5"] }
                },
                {
                    "KeyType": "ecc384",
                    "Subject": { "CommonName": "root" },
                    "Validity": { "NotBefore": "2001-01-01", "NotAfter": "2002-01-01" },
                    "Usage": { "CertSign": true, "CRLSign": true },
                    "IsCertificateAuthority": true
                }
            ]
        }"#,
    )
    .unwrap();

    let certificates = factory.generate_chain(&parameters).unwrap();
    let json = serde_json::to_string(&certificates).unwrap();
    let certificates: Vec<certfactory::cert::Certificate> = serde_json::from_str(&json).unwrap();

    let files = factory
        .export_certificates(&ExportCertificatesParameters {
            certificates: certificates.clone(),
            format: "PKCS12".to_string(),
            password: "1234".to_string(),
            imported_root: None,
        })
        .unwrap();
    assert_eq!(files.len(), 2);

    let request = factory
        .clone_certificate(&CloneCertificateParameters {
            data: certificates[1].to_pem().unwrap().into_bytes(),
        })
        .unwrap();
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["KeyType"], "ecc256");
    assert_eq!(value["SignatureAlgorithm"], "sha384");
    assert_eq!(value["Usage"]["CustomEKUs"][0], "1.2.3.4.5");
    assert_eq!(value["AlternateNames"][0]["Type"], "dns");
}
