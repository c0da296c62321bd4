use std::cell::{Cell, OnceCell};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{Context, DEFAULT_PASSWORD, secret_file};
use crate::backend::{IssueRequest, Material};
use crate::capabilities::BOUNCY_CASTLE_PROVIDER;
use crate::cert;
use crate::cert::params::DistinguishedName;
use crate::error::{CertFactoryError, Result};
use crate::keystore::{self, ImportKeystore, ImportTrustedCert, KeystoreType};

/// A certificate issued by a [`CertificateFactory`](super::CertificateFactory).
///
/// Files under the factory home are written on demand: `<alias>.pem` with
/// `<alias>_key.pem`, and `<alias>.p12`.
pub struct Certificate {
    context: Rc<Context>,
    alias: String,
    dn: DistinguishedName,
    material: Material,
    issuer: Option<Rc<Certificate>>,
    pem: OnceCell<PathBuf>,
    p12: OnceCell<PathBuf>,
    retired: Cell<bool>,
}

impl Certificate {
    fn new(
        context: Rc<Context>,
        alias: &str,
        dn: DistinguishedName,
        material: Material,
        issuer: Option<Rc<Certificate>>,
    ) -> Self {
        Self {
            context,
            alias: alias.to_string(),
            dn,
            material,
            issuer,
            pem: OnceCell::new(),
            p12: OnceCell::new(),
            retired: Cell::new(false),
        }
    }

    pub(crate) fn self_signed(
        context: Rc<Context>,
        alias: &str,
        request: &IssueRequest,
    ) -> Result<Self> {
        let material = context.backend.sign_self(request, &context.params)?;
        Ok(Self::new(context, alias, request.dn.clone(), material, None))
    }

    pub(crate) fn signed_by(
        issuer: Rc<Certificate>,
        alias: &str,
        request: &IssueRequest,
    ) -> Result<Self> {
        let context = Rc::clone(&issuer.context);
        let material = context
            .backend
            .sign_child(&issuer.material, request, &context.params)?;
        Ok(Self::new(
            context,
            alias,
            request.dn.clone(),
            material,
            Some(issuer),
        ))
    }

    /// Reads `<alias>.pem` and `<alias>_key.pem` from the home directory.
    ///
    /// A certificate that `issuer` did not issue, such as a leaf left behind
    /// by a replaced CA, is not loaded.
    ///
    /// # Arguments
    ///
    /// * `context` - The factory state holding the home directory and backend.
    /// * `alias` - The name of the files to read.
    /// * `issuer` - The CA expected to have issued the certificate, `None` when
    ///   loading the CA itself.
    ///
    /// # Returns
    ///
    /// The certificate, or `None` when its files are missing or it belongs to
    /// another CA.
    pub(crate) fn load(
        context: &Rc<Context>,
        alias: &str,
        issuer: Option<Rc<Certificate>>,
    ) -> Result<Option<Self>> {
        let pem = context.path(&pem_name(alias));
        let key = context.path(&key_name(alias));
        if !pem.is_file() || !key.is_file() {
            return Ok(None);
        }
        let material = context.backend.load(&fs::read(&pem)?, &fs::read(&key)?)?;
        if let Some(ca) = &issuer {
            if !material.certificate.is_issued_by(ca.x509()) {
                tracing::warn!(
                    alias,
                    ca = %ca.dn(),
                    "ignoring certificate not issued by the current CA"
                );
                return Ok(None);
            }
        }
        let dn = material.certificate.subject()?;
        let cert = Self::new(Rc::clone(context), alias, dn, material, issuer);
        let _ = cert.pem.set(pem);
        let p12 = context.path(&p12_name(alias));
        if p12.is_file() {
            let _ = cert.p12.set(p12);
        }
        Ok(Some(cert))
    }

    /// Removes whichever of `<alias>.pem`, `<alias>_key.pem` and
    /// `<alias>.p12` exist in the home directory.
    pub(crate) fn remove_files(context: &Context, alias: &str) -> Result<()> {
        for name in [pem_name(alias), key_name(alias), p12_name(alias)] {
            let path = context.path(&name);
            if path.exists() {
                fs::remove_file(&path)?;
                tracing::debug!(path = %path.display(), "removed stale file");
            }
        }
        Ok(())
    }

    pub(crate) fn retire(&self) {
        self.retired.set(true);
    }

    fn ensure_live(&self) -> Result<()> {
        if self.retired.get() {
            return Err(CertFactoryError::Replaced(self.alias.clone()));
        }
        Ok(())
    }

    /// The name given to [`create`](super::CertificateFactory::create).
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The subject, with defaults from the factory DN applied.
    pub fn dn(&self) -> &DistinguishedName {
        &self.dn
    }

    /// True for the factory CA, which has no issuer.
    pub fn is_authority(&self) -> bool {
        self.issuer.is_none()
    }

    /// The CA that signed this certificate, `None` for the CA itself.
    pub fn issuer(&self) -> Option<&Rc<Certificate>> {
        self.issuer.as_ref()
    }

    /// The underlying X.509 certificate.
    pub fn x509(&self) -> &cert::Certificate {
        &self.material.certificate
    }

    /// The certificate as a PEM string, without the key.
    pub fn to_pem(&self) -> Result<String> {
        let pem = self.context.backend.encode_pem(&self.material)?;
        String::from_utf8(pem).map_err(|e| CertFactoryError::EncodingError(e.to_string()))
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.context.backend.encode_der(&self.material)
    }

    /// Writes `<alias>.pem` and `<alias>_key.pem` to the factory home unless
    /// they already exist.
    ///
    /// # Returns
    ///
    /// The path of `<alias>.pem`, or `Replaced` once the alias was reissued.
    pub fn generate_pem(&self) -> Result<&Path> {
        self.ensure_live()?;
        let path = self
            .pem
            .get_or_init(|| self.context.path(&pem_name(&self.alias)));
        if !path.exists() {
            self.write(path, &self.context.backend.encode_pem(&self.material)?)?;
        }
        let key = self.context.path(&key_name(&self.alias));
        if !key.exists() {
            self.write(&key, &self.context.backend.encode_key(&self.material)?)?;
        }
        Ok(path)
    }

    /// Writes `<alias>.p12`, protected by the factory password, unless it
    /// already exists, and returns its path.
    pub fn generate_pkcs12(&self) -> Result<&Path> {
        self.ensure_live()?;
        let path = self
            .p12
            .get_or_init(|| self.context.path(&p12_name(&self.alias)));
        if !path.exists() {
            self.write(path, &self.pkcs12(&self.context.password)?)?;
        }
        Ok(path)
    }

    /// Saves with the default password, choosing the format from the
    /// extension of `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<&Self> {
        self.save_with_password(path, DEFAULT_PASSWORD)
    }

    /// Saves in the format given by the extension of `path`: `.p12` and
    /// `.pfx` PKCS#12, `.jks`, `.bks`, `.der`, `.cer` and `.crt` DER, `.pem`.
    ///
    /// Any existing file at `path` is removed first.
    ///
    /// # Arguments
    ///
    /// * `path` - The output file. Its extension is matched case-insensitively.
    /// * `password` - The store password, ignored by DER and PEM.
    ///
    /// # Returns
    ///
    /// The certificate, so that several saves can be chained, or
    /// `UnsupportedFormat` for an unknown extension.
    pub fn save_with_password(&self, path: impl AsRef<Path>, password: &str) -> Result<&Self> {
        self.ensure_live()?;
        let path = path.as_ref();
        if path.exists() {
            fs::remove_file(path)?;
        }
        match keystore::extension(path).as_str() {
            "p12" | "pfx" => self.save_pkcs12(path, password),
            "jks" => self.save_jks(path, password),
            "bks" => self.save_bks(path, password),
            "der" | "cer" | "crt" => self.save_der(path),
            "pem" => self.save_pem(path),
            other => Err(CertFactoryError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    /// PKCS#12 store with the private key and the chain up to the CA.
    pub fn save_pkcs12(&self, path: impl AsRef<Path>, password: &str) -> Result<&Self> {
        self.ensure_live()?;
        self.write(path.as_ref(), &self.pkcs12(password)?)?;
        Ok(self)
    }

    /// Writes the certificate in PEM form, without the key.
    pub fn save_pem(&self, path: impl AsRef<Path>) -> Result<&Self> {
        self.ensure_live()?;
        self.write(path.as_ref(), &self.context.backend.encode_pem(&self.material)?)?;
        Ok(self)
    }

    /// Writes the DER encoded certificate.
    pub fn save_der(&self, path: impl AsRef<Path>) -> Result<&Self> {
        self.ensure_live()?;
        self.write(path.as_ref(), &self.context.backend.encode_der(&self.material)?)?;
        Ok(self)
    }

    /// The unencrypted PKCS#8 private key in PEM form.
    pub fn save_key(&self, path: impl AsRef<Path>) -> Result<&Self> {
        self.ensure_live()?;
        self.write(path.as_ref(), &self.context.backend.encode_key(&self.material)?)?;
        Ok(self)
    }

    /// Exports the key entry and the CA to a JKS store with `keytool`.
    pub fn save_jks(&self, path: impl AsRef<Path>, password: &str) -> Result<&Self> {
        self.export_to_keystore(path, password, Some(KeystoreType::Jks), None)
    }

    /// Requires the BouncyCastle provider in the JDK.
    pub fn save_bks(&self, path: impl AsRef<Path>, password: &str) -> Result<&Self> {
        if !self.context.capabilities.bouncy_castle {
            return Err(CertFactoryError::MissingCapability(
                "no BouncyCastle support, install the BouncyCastleProvider with your JDK"
                    .to_string(),
            ));
        }
        self.export_to_keystore(
            path,
            password,
            Some(KeystoreType::Bks),
            Some(BOUNCY_CASTLE_PROVIDER),
        )
    }

    /// Adds this certificate to a keystore with `keytool`.
    ///
    /// A leaf is imported as a private key entry named after its alias. JKS
    /// and BKS stores also get the CA as a trusted entry named after the CA
    /// alias. The CA itself only ever becomes a trusted entry, so exporting
    /// it to a PKCS#12 store runs nothing and writes no file; use
    /// [`Self::save_pkcs12`] for that.
    ///
    /// When the trusted entry cannot be added after the key entry was, a
    /// keystore created by this call is removed again. An existing keystore
    /// keeps whatever was imported into it.
    ///
    /// # Arguments
    ///
    /// * `path` - The keystore to create or add to.
    /// * `password` - The store password.
    /// * `keystore_type` - The store type, inferred from the extension of
    ///   `path` when `None`.
    /// * `provider` - A JCA provider class passed to every `keytool` call.
    ///
    /// # Errors
    ///
    /// `MissingCapability` without `keytool`, `UnsupportedFormat` for an
    /// unknown extension and `ExternalToolFailure` when a `keytool` call
    /// fails.
    pub fn export_to_keystore(
        &self,
        path: impl AsRef<Path>,
        password: &str,
        keystore_type: Option<KeystoreType>,
        provider: Option<&str>,
    ) -> Result<&Self> {
        self.ensure_live()?;
        if !self.context.capabilities.keytool {
            return Err(CertFactoryError::MissingCapability(
                "no keytool support, add keytool from your JDK bin directory to your PATH"
                    .to_string(),
            ));
        }
        let destination = path.as_ref();
        let destination_type = match keystore_type {
            Some(keystore_type) => keystore_type,
            None => KeystoreType::from_path(destination)?,
        };
        let authority = match &self.issuer {
            Some(issuer) => &**issuer,
            None => self,
        };
        let trusted_pem = match destination_type {
            KeystoreType::Pkcs12 => None,
            _ => Some(authority.generate_pem()?),
        };
        let password_file = secret_file(password)?;
        let existed = destination.exists();

        if self.issuer.is_some() {
            let source = self.generate_pkcs12()?;
            let source_password_file = self.context.password_file()?;
            let import = ImportKeystore {
                alias: &self.alias,
                source,
                source_type: KeystoreType::Pkcs12,
                source_password_file: &source_password_file,
                destination,
                destination_type,
                destination_password_file: password_file.path(),
                provider,
            };
            self.context.run(&import.command())?;
        }

        if let Some(certificate) = trusted_pem {
            let trusted = ImportTrustedCert {
                alias: authority.alias(),
                certificate,
                keystore: destination,
                keystore_type: destination_type,
                password_file: password_file.path(),
                provider,
            };
            if let Err(e) = self.context.run(&trusted.command()) {
                if !existed && destination.exists() {
                    fs::remove_file(destination)?;
                    tracing::debug!(path = %destination.display(), "removed partial keystore");
                }
                return Err(e);
            }
        }
        Ok(self)
    }

    /// Removes the files written to the factory home.
    ///
    /// A replaced certificate leaves the files alone, they belong to its
    /// successor.
    pub fn destroy(&self) -> Result<()> {
        if self.retired.get() {
            return Ok(());
        }
        let mut files = Vec::new();
        if let Some(pem) = self.pem.get() {
            files.push(pem.clone());
            files.push(self.context.path(&key_name(&self.alias)));
        }
        if let Some(p12) = self.p12.get() {
            files.push(p12.clone());
        }
        for file in files.iter().filter(|file| file.exists()) {
            fs::remove_file(file)?;
            tracing::debug!(path = %file.display(), "removed");
        }
        Ok(())
    }

    fn pkcs12(&self, password: &str) -> Result<Vec<u8>> {
        let chain: Vec<&Material> = self.issuer.iter().map(|ca| &ca.material).collect();
        self.context
            .backend
            .encode_pkcs12(&self.material, &self.alias, &chain, password)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents)?;
        tracing::debug!(alias = %self.alias, path = %path.display(), "wrote");
        Ok(())
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.dn, f)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("alias", &self.alias)
            .field("dn", &self.dn)
            .field("issuer", &self.issuer.as_ref().map(|ca| ca.alias()))
            .field("retired", &self.retired.get())
            .finish_non_exhaustive()
    }
}

fn pem_name(alias: &str) -> String {
    format!("{alias}.pem")
}

fn key_name(alias: &str) -> String {
    format!("{alias}_key.pem")
}

fn p12_name(alias: &str) -> String {
    format!("{alias}.p12")
}
