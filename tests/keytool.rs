//! Exports through a real JDK `keytool`.

use std::process::Command;

use certfactory::{Capabilities, CertificateFactory, FactoryConfig, IssueRequest, KeyAlgorithm, ProcessRunner};
use tempfile::TempDir;

fn list(keystore: &std::path::Path, storetype: &str) -> String {
    let output = Command::new("keytool")
        .args(["-list", "-storepass", "password", "-storetype", storetype, "-keystore"])
        .arg(keystore)
        .output()
        .expect("Failed to execute keytool");
    assert!(
        output.status.success(),
        "keytool -list failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_lowercase()
}

#[test]
#[ignore]
fn jks_holds_leaf_and_trusted_ca() {
    let capabilities = Capabilities::detect(&ProcessRunner);
    assert!(capabilities.keytool, "keytool is not on the PATH");

    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut factory = CertificateFactory::new(
        FactoryConfig::builder()
            .home(home.path())
            .key_algorithm(KeyAlgorithm::Ec)
            .key_size(256)
            .build(),
    )
    .unwrap();
    let server = factory
        .create("server", IssueRequest::common_name("server"))
        .unwrap();

    let keystore = out.path().join("server.jks");
    server.save(&keystore).unwrap();

    let listing = list(&keystore, "JKS");
    assert!(listing.contains("server, "));
    assert!(listing.contains("privatekeyentry"));
    assert!(listing.contains("ca, "));
    assert!(listing.contains("trustedcertentry"));
}

#[test]
#[ignore]
fn pkcs12_export_through_keytool() {
    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut factory = CertificateFactory::new(
        FactoryConfig::builder()
            .home(home.path())
            .key_algorithm(KeyAlgorithm::Ec)
            .key_size(256)
            .build(),
    )
    .unwrap();
    let client = factory
        .create("client", IssueRequest::common_name("client"))
        .unwrap();

    let keystore = out.path().join("client.pfx");
    client
        .export_to_keystore(&keystore, "password", None, None)
        .unwrap();

    let listing = list(&keystore, "PKCS12");
    assert!(listing.contains("client, "));
    assert!(!listing.contains("trustedcertentry"));
}
