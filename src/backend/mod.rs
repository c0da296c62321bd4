//! The cryptographic engine behind a factory.
//!
//! A [`Backend`] generates keys, signs certificates and encodes them into
//! the container formats the factory writes itself. JKS and BKS keystores are
//! handled by `keytool` (see [`crate::keystore`]), not by the backend.

mod native;

use std::fmt;
use std::net::IpAddr;

use bon::Builder;

pub use native::NativeBackend;

use crate::capabilities::Capabilities;
use crate::cert::Certificate;
use crate::cert::extensions::{AltName, ExtendedKeyUsageOption};
use crate::cert::params::DistinguishedName;
use crate::error::{CertFactoryError, Result};
use crate::key::{DigestAlgorithm, KeyAlgorithm};

/// Key and signature parameters shared by every certificate of a factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningParams {
    pub validity_days: u32,
    pub key_size: u32,
    pub key_algorithm: KeyAlgorithm,
    pub digest: DigestAlgorithm,
}

/// What to put in a new certificate besides its key.
///
/// ```
/// use certfactory::IssueRequest;
///
/// let request = IssueRequest::builder()
///     .dn("CN=server".parse().unwrap())
///     .dns_names(vec!["localhost".to_string()])
///     .ip_addresses(vec!["127.0.0.1".parse().unwrap()])
///     .build();
/// assert_eq!(request.alt_names().len(), 2);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct IssueRequest {
    pub dn: DistinguishedName,
    #[builder(default)]
    pub dns_names: Vec<String>,
    #[builder(default)]
    pub ip_addresses: Vec<IpAddr>,
    #[builder(default)]
    pub usages: Vec<ExtendedKeyUsageOption>,
    /// Overrides the factory validity for this certificate.
    pub validity_days: Option<u32>,
}

impl IssueRequest {
    /// A request carrying only a common name.
    pub fn common_name(common_name: impl Into<String>) -> Self {
        Self::builder()
            .dn(DistinguishedName::new(common_name))
            .build()
    }

    /// Subject alternative names, DNS names first.
    pub fn alt_names(&self) -> Vec<AltName> {
        self.dns_names
            .iter()
            .cloned()
            .map(AltName::Dns)
            .chain(self.ip_addresses.iter().copied().map(AltName::Ip))
            .collect()
    }
}

impl From<DistinguishedName> for IssueRequest {
    fn from(dn: DistinguishedName) -> Self {
        Self::builder().dn(dn).build()
    }
}

/// A signed certificate and its PKCS#8 private key.
#[derive(Clone)]
pub struct Material {
    pub certificate: Certificate,
    pub private_key: Vec<u8>,
}

impl fmt::Debug for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Material")
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}

/// Key generation, signing and encoding for a factory.
///
/// PEM, DER and key export are required: a backend that cannot produce them
/// does not type-check.
pub trait Backend: fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Generates a key and a self-signed CA certificate for `request.dn`.
    fn sign_self(&self, request: &IssueRequest, params: &SigningParams) -> Result<Material>;

    /// Generates a key and a certificate for `request.dn` signed by `issuer`.
    fn sign_child(
        &self,
        issuer: &Material,
        request: &IssueRequest,
        params: &SigningParams,
    ) -> Result<Material>;

    /// The certificate as a PEM `CERTIFICATE` block.
    fn encode_pem(&self, material: &Material) -> Result<Vec<u8>>;

    /// The certificate as DER.
    fn encode_der(&self, material: &Material) -> Result<Vec<u8>>;

    /// The private key as a PEM block.
    fn encode_key(&self, material: &Material) -> Result<Vec<u8>>;

    /// A PKCS#12 store with one private key entry named `alias`, whose chain
    /// is the certificate followed by `chain`.
    fn encode_pkcs12(
        &self,
        material: &Material,
        alias: &str,
        chain: &[&Material],
        password: &str,
    ) -> Result<Vec<u8>>;

    /// Rebuilds material from what [`Backend::encode_pem`] and
    /// [`Backend::encode_key`] wrote.
    fn load(&self, certificate_pem: &[u8], key_pem: &[u8]) -> Result<Material> {
        let _ = (certificate_pem, key_pem);
        Err(CertFactoryError::NotImplemented(format!(
            "{} backend cannot load certificates",
            self.name()
        )))
    }
}

/// Picks the engine for a factory.
///
/// The native engine needs no external tooling, so it is chosen whatever
/// `capabilities` reports.
pub fn select(capabilities: &Capabilities) -> Box<dyn Backend> {
    let backend = NativeBackend;
    tracing::debug!(backend = backend.name(), ?capabilities, "selected certificate backend");
    Box::new(backend)
}
