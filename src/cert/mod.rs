pub mod extensions;
pub mod params;

use der::{Decode, DecodePem, Encode, EncodePem};
use extensions::{
    AuthorityKeyIdentifier, BasicConstraints, SubjectKeyIdentifier, ToAndFromX509Extension,
};
use params::{CertificationRequestInfo, DistinguishedName, Validity};
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::error::{CertFactoryError, Result};
use crate::issuer::Issuer;
use crate::key::{DigestAlgorithm, KeyPair};

/// Represents the supported signature algorithms for certificates.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption.
    Sha256WithRSA,
    /// SHA-384 with RSA encryption.
    Sha384WithRSA,
    /// SHA-512 with RSA encryption.
    Sha512WithRSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
    /// SHA-384 with ECDSA.
    Sha384WithECDSA,
    /// Pure EdDSA over Ed25519.
    Ed25519,
}

impl From<SignatureAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA identifiers carry an explicit NULL parameter, ECDSA and EdDSA none.
    fn from(value: SignatureAlgorithm) -> Self {
        let rsa_null = || Some(der::Any::from(der::asn1::AnyRef::NULL));
        let (oid, parameters) = match value {
            SignatureAlgorithm::Sha256WithRSA => {
                (const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION, rsa_null())
            }
            SignatureAlgorithm::Sha384WithRSA => {
                (const_oid::db::rfc5912::SHA_384_WITH_RSA_ENCRYPTION, rsa_null())
            }
            SignatureAlgorithm::Sha512WithRSA => {
                (const_oid::db::rfc5912::SHA_512_WITH_RSA_ENCRYPTION, rsa_null())
            }
            SignatureAlgorithm::Sha256WithECDSA => (const_oid::db::rfc5912::ECDSA_WITH_SHA_256, None),
            SignatureAlgorithm::Sha384WithECDSA => (const_oid::db::rfc5912::ECDSA_WITH_SHA_384, None),
            SignatureAlgorithm::Ed25519 => (const_oid::db::rfc8410::ID_ED_25519, None),
        };
        x509_cert::spki::AlgorithmIdentifierOwned { oid, parameters }
    }
}

/// Represents an X.509 certificate.
///
/// This struct provides methods to encode the certificate into DER or PEM formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| CertFactoryError::EncodingError(e.to_string()))
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(der::pem::LineEnding::LF)
            .map_err(|e| CertFactoryError::EncodingError(e.to_string()))
    }

    /// Decodes a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_der(der)?,
        })
    }

    /// Decodes a PEM `CERTIFICATE` block.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_pem(pem)?,
        })
    }

    /// The subject name as it appears in the certificate.
    pub fn subject_name(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    /// The subject as a [`DistinguishedName`].
    pub fn subject(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(self.subject_name())
    }

    /// The issuer as a [`DistinguishedName`].
    pub fn issuer(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    /// Serial number bytes.
    pub fn serial_number(&self) -> &[u8] {
        self.inner.tbs_certificate.serial_number.as_bytes()
    }

    /// Whether the basic constraints extension marks this certificate as a CA.
    pub fn is_ca(&self) -> bool {
        self.extension::<BasicConstraints>()
            .map(|bc| bc.is_ca)
            .unwrap_or(false)
    }

    /// The subject key identifier, if present.
    pub fn subject_key_identifier(&self) -> Option<Vec<u8>> {
        self.extension::<SubjectKeyIdentifier>().map(|ski| ski.0)
    }

    /// Checks whether `issuer` is named as the issuer of this certificate.
    ///
    /// Both the issuer name and the authority key identifier must match the
    /// subject and subject key identifier of `issuer`. The signature itself is
    /// not verified.
    ///
    /// # Arguments
    ///
    /// * `issuer` - The candidate issuing certificate.
    ///
    /// # Returns
    ///
    /// `true` when the name and key identifier both match.
    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        let authority_key = self
            .extension::<AuthorityKeyIdentifier>()
            .map(|aki| aki.key_identifier);
        self.inner.tbs_certificate.issuer == *issuer.subject_name()
            && authority_key.is_some()
            && authority_key == issuer.subject_key_identifier()
    }

    /// Decodes the first extension of type `E`, if present and well formed.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Option<E> {
        self.inner
            .tbs_certificate
            .extensions
            .as_ref()?
            .iter()
            .find(|ext| ext.extn_id == E::OID)
            .and_then(|ext| E::from_x509_extension_value(ext.extn_value.as_bytes()).ok())
    }

    /// Creates a new self-signed certificate.
    ///
    /// # Arguments
    /// * `cert_info` - The certification request information.
    /// * `key` - The key pair used to sign the certificate.
    /// * `validity` - The validity period.
    /// * `digest` - Requested signature digest (see [`KeyPair::signature_algorithm`]).
    pub fn new_self_signed(
        cert_info: &CertificationRequestInfo,
        key: &KeyPair,
        validity: Validity,
        digest: DigestAlgorithm,
    ) -> Result<Self> {
        // For self-signed certificates, the issuer is the same as the subject
        let self_issuer = SelfIssuer {
            name: cert_info.subject.as_x509_name()?,
            key,
        };
        self_issuer.issue(cert_info, validity, digest)
    }
}

// Helper struct for self-signed certificates
struct SelfIssuer<'a> {
    name: Name,
    key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Result<Name> {
        Ok(self.name.clone())
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }
}

/// A certificate together with the private key matching its public key.
#[derive(Debug, Clone)]
pub struct CertificateWithPrivateKey {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Issuer for CertificateWithPrivateKey {
    fn issuer_name(&self) -> Result<Name> {
        // The name of the issuer is the subject of the certificate
        Ok(self.cert.subject_name().clone())
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }
}
