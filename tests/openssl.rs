mod util;

use std::fs;
use std::net::IpAddr;

use certfactory::{
    Capabilities, CertificateFactory, DigestAlgorithm, ExtendedKeyUsageOption, FactoryConfig,
    IssueRequest, KeyAlgorithm, NativeBackend,
};
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509, X509Ref, X509StoreContext, X509VerifyResult};
use tempfile::TempDir;
use util::RecordingRunner;

fn verify_chain(ca: &X509, leaf: &X509) {
    let mut store = X509StoreBuilder::new().unwrap();
    store.add_cert(ca.clone()).unwrap();
    let store = store.build();
    let chain = Stack::new().unwrap();
    let mut context = X509StoreContext::new().unwrap();
    let verified = context
        .init(&store, leaf, &chain, |c| {
            let ok = c.verify_cert()?;
            assert_eq!(c.error(), X509VerifyResult::OK, "{}", c.error());
            Ok(ok)
        })
        .unwrap();
    assert!(verified);
}

fn common_name(cert: &X509Ref) -> String {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .unwrap()
        .data()
        .as_utf8()
        .unwrap()
        .to_string()
}

#[test]
fn openssl_verifies_leaf_against_ca() {
    let home = TempDir::new().unwrap();
    let mut factory = util::factory(home.path());
    let server = factory
        .create(
            "server",
            IssueRequest::builder()
                .dn("CN=localhost,O=\"Example, Inc.\"".parse().unwrap())
                .dns_names(vec!["localhost".to_string()])
                .ip_addresses(vec!["127.0.0.1".parse::<IpAddr>().unwrap()])
                .usages(vec![ExtendedKeyUsageOption::ServerAuth])
                .build(),
        )
        .unwrap();

    let ca = X509::from_pem(&fs::read(factory.ca().generate_pem().unwrap()).unwrap()).unwrap();
    let leaf = X509::from_pem(&fs::read(server.generate_pem().unwrap()).unwrap()).unwrap();
    verify_chain(&ca, &leaf);

    assert_eq!(common_name(&ca), "Test CA");
    assert_eq!(common_name(&leaf), "localhost");
    let organization = leaf
        .subject_name()
        .entries_by_nid(Nid::ORGANIZATIONNAME)
        .next()
        .unwrap()
        .data()
        .as_utf8()
        .unwrap()
        .to_string();
    assert_eq!(organization, "Example, Inc.");

    let names = leaf.subject_alt_names().unwrap();
    assert!(names.iter().any(|n| n.dnsname() == Some("localhost")));
    assert!(names.iter().any(|n| n.ipaddress() == Some(&[127, 0, 0, 1][..])));
}

#[test]
fn openssl_reads_pkcs12_with_chain() {
    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut factory = util::factory(home.path());
    let client = factory
        .create("client", IssueRequest::common_name("client"))
        .unwrap();
    let path = out.path().join("client.p12");
    client.save_with_password(&path, "changeit").unwrap();

    let parsed = Pkcs12::from_der(&fs::read(&path).unwrap())
        .unwrap()
        .parse2("changeit")
        .unwrap();
    let cert = parsed.cert.unwrap();
    let key = parsed.pkey.unwrap();
    assert_eq!(common_name(&cert), "client");
    assert!(cert.public_key().unwrap().public_eq(&key));

    let chain = parsed.ca.unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(common_name(chain.get(0).unwrap()), "Test CA");
}

#[test]
fn openssl_reads_factory_password_pkcs12() {
    let home = TempDir::new().unwrap();
    let mut factory = util::factory(home.path());
    let server = factory
        .create("server", IssueRequest::common_name("server"))
        .unwrap();
    let path = server.generate_pkcs12().unwrap();

    let parsed = Pkcs12::from_der(&fs::read(path).unwrap())
        .unwrap()
        .parse2(factory.password())
        .unwrap();
    assert_eq!(common_name(&parsed.cert.unwrap()), "server");
}

#[test]
fn replaced_keystore_only_leaf_exports_new_identity() {
    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    {
        let mut factory = util::factory_with(
            home.path(),
            RecordingRunner::default(),
            Capabilities {
                keytool: true,
                bouncy_castle: false,
            },
        );
        let server = factory
            .create("server", IssueRequest::common_name("old"))
            .unwrap();
        server.save(out.path().join("server.jks")).unwrap();
    }

    let mut factory = util::factory(home.path());
    let server = factory
        .create("server", IssueRequest::common_name("new"))
        .unwrap();
    let parsed = Pkcs12::from_der(&fs::read(server.generate_pkcs12().unwrap()).unwrap())
        .unwrap()
        .parse2(factory.password())
        .unwrap();
    let cert = parsed.cert.unwrap();
    assert_eq!(common_name(&cert), "new");
    assert_eq!(cert.to_der().unwrap(), server.to_der().unwrap());
}

#[test]
fn openssl_verifies_rsa_chain() {
    let home = TempDir::new().unwrap();
    let mut factory = CertificateFactory::with_collaborators(
        FactoryConfig::builder()
            .home(home.path())
            .key_algorithm(KeyAlgorithm::Rsa)
            .key_size(2048)
            .signature_digest(DigestAlgorithm::Sha384)
            .build(),
        Box::new(NativeBackend),
        Box::new(RecordingRunner::default()),
        Capabilities::default(),
    )
    .unwrap();
    let server = factory
        .create("server", IssueRequest::common_name("server"))
        .unwrap();

    let ca = X509::from_der(&factory.ca().to_der().unwrap()).unwrap();
    let leaf = X509::from_der(&server.to_der().unwrap()).unwrap();
    verify_chain(&ca, &leaf);
    assert_eq!(
        leaf.signature_algorithm().object().nid(),
        Nid::SHA384WITHRSAENCRYPTION
    );

    server.generate_pem().unwrap();
    let key = PKey::private_key_from_pem(&fs::read(home.path().join("server_key.pem")).unwrap())
        .unwrap();
    assert!(leaf.public_key().unwrap().public_eq(&key));
}

#[test]
fn openssl_verifies_ed25519_chain() {
    let home = TempDir::new().unwrap();
    let mut factory = CertificateFactory::with_collaborators(
        FactoryConfig::builder()
            .home(home.path())
            .key_algorithm(KeyAlgorithm::Ed25519)
            .build(),
        Box::new(NativeBackend),
        Box::new(RecordingRunner::default()),
        Capabilities::default(),
    )
    .unwrap();
    let server = factory
        .create("server", IssueRequest::common_name("server"))
        .unwrap();

    let ca = X509::from_der(&factory.ca().to_der().unwrap()).unwrap();
    let leaf = X509::from_der(&server.to_der().unwrap()).unwrap();
    verify_chain(&ca, &leaf);
}
