//! # CertFactory - Test and Development Certificates
//!
//! CertFactory is a small certificate authority for test suites and local
//! development. A [`CertificateFactory`] owns one CA and a working directory,
//! issues leaf certificates signed by that CA, and saves them as PEM, DER,
//! PKCS#12, JKS or BKS files. Keys and certificates are produced with the
//! RustCrypto crates; Java keystores are filled by the JDK `keytool`.
//!
//! ## Supported Key Types
//!
//! - **RSA**: any size the `rsa` crate accepts, 2048 bits by default
//! - **ECDSA**: P-256 and P-384, selected by key size
//! - **Ed25519**
//!
//! ## Output Formats
//!
//! | Extension | Format |
//! |-----------|--------|
//! | `.pem` | PEM certificate |
//! | `.der`, `.cer`, `.crt` | DER certificate |
//! | `.p12`, `.pfx` | PKCS#12 with key and CA chain |
//! | `.jks` | Java keystore, needs `keytool` |
//! | `.bks` | BouncyCastle keystore, needs `keytool` and the BouncyCastle provider |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use certfactory::{CertificateFactory, FactoryConfig, IssueRequest};
//!
//! # fn main() -> certfactory::Result<()> {
//! let mut factory = CertificateFactory::new(
//!     FactoryConfig::builder()
//!         .dn(r#"CN=Test CA,O="Example, Inc.""#.parse()?)
//!         .build(),
//! )?;
//!
//! let server = factory.create(
//!     "server",
//!     IssueRequest::builder()
//!         .dn("CN=localhost".parse()?)
//!         .dns_names(vec!["localhost".to_string()])
//!         .ip_addresses(vec!["127.0.0.1".parse().unwrap()])
//!         .build(),
//! )?;
//! server.save("server.p12")?.save("server.jks")?;
//! factory.ca().save("ca.pem")?;
//!
//! factory.destroy(false)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Distinguished Names
//!
//! Subjects are written as comma separated `KEY=value` pairs. Commas inside
//! quotes or escaped with a backslash belong to the value, and fields left
//! out are inherited from the factory DN:
//!
//! ```rust
//! use certfactory::DistinguishedName;
//!
//! let defaults = DistinguishedName::parse("CN=CA,O=Example,C=US").unwrap();
//! let dn = DistinguishedName::parse_with_defaults("cn=server", &defaults).unwrap();
//! assert_eq!(dn.to_string(), "CN=server,O=Example,C=US");
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`CertFactoryError`]:
//!
//! ```rust
//! use certfactory::{CertFactoryError, DistinguishedName};
//!
//! match DistinguishedName::parse("O=Example") {
//!     Err(CertFactoryError::InvalidDistinguishedName(msg)) => println!("bad name: {msg}"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`factory`]: the factory and the certificates it issues
//! - [`backend`]: key generation, signing and encoding
//! - [`keystore`]: `keytool` commands for Java keystores
//! - [`runner`]: structured execution of external tools
//! - [`capabilities`]: detection of external tooling
//! - [`key`]: key pairs and algorithms
//! - [`cert`]: X.509 certificates, names and extensions
//! - [`issuer`]: certificate signing
//! - [`error`]: error type

pub mod backend;
pub mod capabilities;
pub mod cert;
pub mod error;
pub mod factory;
pub mod issuer;
pub mod key;
pub mod keystore;
pub mod runner;
pub mod tbs_certificate;

pub use backend::{Backend, IssueRequest, Material, NativeBackend, SigningParams};
pub use capabilities::{BOUNCY_CASTLE_PROVIDER, Capabilities};
pub use cert::extensions::ExtendedKeyUsageOption;
pub use cert::params::DistinguishedName;
pub use error::{CertFactoryError, Result};
pub use factory::{Certificate, CertificateFactory, DEFAULT_PASSWORD, FactoryConfig};
pub use key::{DigestAlgorithm, KeyAlgorithm};
pub use keystore::KeystoreType;
pub use runner::{CommandRunner, ProcessRunner, ToolCommand, ToolOutput};
