use p12_keystore::{KeyStore, KeyStoreEntry, PrivateKeyChain};

use super::{Backend, IssueRequest, Material, SigningParams};
use crate::cert::params::{CertificationRequestInfo, Validity};
use crate::cert::{Certificate, CertificateWithPrivateKey};
use crate::error::{CertFactoryError, Result};
use crate::issuer::Issuer;
use crate::key::KeyPair;

/// In-process engine built on the RustCrypto crates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl NativeBackend {
    fn request_info(
        request: &IssueRequest,
        key: &KeyPair,
        is_ca: bool,
    ) -> Result<CertificationRequestInfo> {
        Ok(CertificationRequestInfo::builder()
            .subject(request.dn.clone())
            .subject_public_key(key.public_key_info()?)
            .usages(request.usages.clone())
            .alt_names(request.alt_names())
            .is_ca(is_ca)
            .build())
    }

    fn validity(request: &IssueRequest, params: &SigningParams) -> Validity {
        Validity::for_days(i64::from(
            request.validity_days.unwrap_or(params.validity_days),
        ))
    }
}

impl Backend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn sign_self(&self, request: &IssueRequest, params: &SigningParams) -> Result<Material> {
        let key = KeyPair::generate(params.key_algorithm, params.key_size)?;
        let info = Self::request_info(request, &key, true)?;
        let certificate = Certificate::new_self_signed(
            &info,
            &key,
            Self::validity(request, params),
            params.digest,
        )?;
        Ok(Material {
            certificate,
            private_key: key.to_pkcs8_der()?,
        })
    }

    fn sign_child(
        &self,
        issuer: &Material,
        request: &IssueRequest,
        params: &SigningParams,
    ) -> Result<Material> {
        let issuer = CertificateWithPrivateKey {
            cert: issuer.certificate.clone(),
            key: KeyPair::import_from_pkcs8_der(&issuer.private_key)?,
        };
        let key = KeyPair::generate(params.key_algorithm, params.key_size)?;
        let info = Self::request_info(request, &key, false)?;
        let certificate = issuer.issue(&info, Self::validity(request, params), params.digest)?;
        Ok(Material {
            certificate,
            private_key: key.to_pkcs8_der()?,
        })
    }

    fn encode_pem(&self, material: &Material) -> Result<Vec<u8>> {
        Ok(material.certificate.to_pem()?.into_bytes())
    }

    fn encode_der(&self, material: &Material) -> Result<Vec<u8>> {
        material.certificate.to_der()
    }

    fn encode_key(&self, material: &Material) -> Result<Vec<u8>> {
        let key = KeyPair::import_from_pkcs8_der(&material.private_key)?;
        Ok(key.to_pkcs8_pem()?.into_bytes())
    }

    fn encode_pkcs12(
        &self,
        material: &Material,
        alias: &str,
        chain: &[&Material],
        password: &str,
    ) -> Result<Vec<u8>> {
        let certificates = std::iter::once(material)
            .chain(chain.iter().copied())
            .map(|m| {
                let der = m.certificate.to_der()?;
                p12_keystore::Certificate::from_der(&der)
                    .map_err(|e| CertFactoryError::EncodingError(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let key_chain = PrivateKeyChain::new(&material.private_key, [], certificates);
        let mut keystore = KeyStore::new();
        keystore.add_entry(alias, KeyStoreEntry::PrivateKeyChain(key_chain));

        keystore
            .writer(password)
            .write()
            .map_err(|e| CertFactoryError::EncodingError(format!("failed to create PKCS#12: {e}")))
    }

    fn load(&self, certificate_pem: &[u8], key_pem: &[u8]) -> Result<Material> {
        let certificate = Certificate::from_pem(certificate_pem)?;
        let key_pem = std::str::from_utf8(key_pem)
            .map_err(|e| CertFactoryError::DecodingError(e.to_string()))?;
        let key = KeyPair::import_from_pkcs8_pem(key_pem)?;
        if key.public_key_info()? != certificate.inner.tbs_certificate.subject_public_key_info {
            return Err(CertFactoryError::DecodingError(
                "private key does not match the certificate".to_string(),
            ));
        }
        Ok(Material {
            certificate,
            private_key: key.to_pkcs8_der()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::params::DistinguishedName;
    use crate::key::{DigestAlgorithm, KeyAlgorithm};

    fn params() -> SigningParams {
        SigningParams {
            validity_days: 30,
            key_size: 256,
            key_algorithm: KeyAlgorithm::Ec,
            digest: DigestAlgorithm::Sha256,
        }
    }

    #[test]
    fn encoded_pem_and_key_load_back() {
        let backend = NativeBackend;
        let ca = backend
            .sign_self(&IssueRequest::common_name("CA"), &params())
            .unwrap();
        let pem = backend.encode_pem(&ca).unwrap();
        let key = backend.encode_key(&ca).unwrap();
        let loaded = backend.load(&pem, &key).unwrap();
        assert_eq!(loaded.certificate, ca.certificate);
    }

    #[test]
    fn load_rejects_mismatched_key() {
        let backend = NativeBackend;
        let a = backend.sign_self(&IssueRequest::common_name("a"), &params()).unwrap();
        let b = backend.sign_self(&IssueRequest::common_name("b"), &params()).unwrap();
        let result = backend.load(
            &backend.encode_pem(&a).unwrap(),
            &backend.encode_key(&b).unwrap(),
        );
        assert!(matches!(result, Err(CertFactoryError::DecodingError(_))));
    }

    #[test]
    fn child_validity_override_and_subject() {
        let backend = NativeBackend;
        let ca = backend.sign_self(&IssueRequest::common_name("CA"), &params()).unwrap();
        let request = IssueRequest::builder()
            .dn(DistinguishedName::new("leaf"))
            .validity_days(2)
            .build();
        let leaf = backend.sign_child(&ca, &request, &params()).unwrap();
        let tbs = &leaf.certificate.inner.tbs_certificate;
        let days = tbs
            .validity
            .not_after
            .to_unix_duration()
            .saturating_sub(tbs.validity.not_before.to_unix_duration())
            .as_secs()
            / 86_400;
        assert_eq!(days, 2);
        assert_eq!(leaf.certificate.subject().unwrap().common_name, "leaf");
    }
}
