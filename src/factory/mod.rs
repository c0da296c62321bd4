//! Certificate factory: one CA, the leaves it signs, and the working
//! directory holding their intermediate files.

mod certificate;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use bon::Builder;
use tempfile::NamedTempFile;

pub use certificate::Certificate;

use crate::backend::{self, Backend, IssueRequest, SigningParams};
use crate::capabilities::Capabilities;
use crate::cert::params::DistinguishedName;
use crate::error::{CertFactoryError, Result};
use crate::key::{DigestAlgorithm, KeyAlgorithm};
use crate::runner::{CommandRunner, ProcessRunner, ToolCommand, ToolOutput};

/// Password protecting the factory's PKCS#12 files and exported keystores
/// when none is given.
pub const DEFAULT_PASSWORD: &str = "password";

/// Subject of the CA when the configuration does not name one.
pub fn default_dn() -> DistinguishedName {
    DistinguishedName::builder()
        .common_name("CertFactory Development CA")
        .organization_unit("Development")
        .organization("CertFactory")
        .locality("Jupiter")
        .state("Florida")
        .country("US")
        .build()
}

/// Settings of a [`CertificateFactory`].
///
/// ```
/// use certfactory::{FactoryConfig, KeyAlgorithm};
///
/// let config = FactoryConfig::builder()
///     .key_algorithm(KeyAlgorithm::Ec)
///     .key_size(256)
///     .build();
/// assert_eq!(config.ca_alias, "ca");
/// assert_eq!(config.validity_days, 1825);
/// assert!(config.home.is_none());
/// ```
#[derive(Debug, Clone, Builder)]
pub struct FactoryConfig {
    /// Working directory. A fresh temporary directory owned by the factory
    /// when absent.
    #[builder(into)]
    pub home: Option<PathBuf>,
    /// Subject of the CA and defaults for every other subject.
    #[builder(default = default_dn())]
    pub dn: DistinguishedName,
    /// Alias of the CA, which names its files in the home directory.
    #[builder(into, default = "ca".to_string())]
    pub ca_alias: String,
    #[builder(default = 1825)]
    pub validity_days: u32,
    /// RSA modulus size, or the EC curve size (256 or 384). Ignored for
    /// Ed25519.
    #[builder(default = 2048)]
    pub key_size: u32,
    #[builder(default)]
    pub key_algorithm: KeyAlgorithm,
    #[builder(default)]
    pub signature_digest: DigestAlgorithm,
    #[builder(into, default = DEFAULT_PASSWORD.to_string())]
    pub password: String,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// State shared by a factory and every certificate it hands out.
pub(crate) struct Context {
    home: PathBuf,
    ca_alias: String,
    params: SigningParams,
    password: String,
    password_file: RefCell<Option<NamedTempFile>>,
    backend: Box<dyn Backend>,
    runner: Box<dyn CommandRunner>,
    capabilities: Capabilities,
}

impl Context {
    pub(crate) fn path(&self, file_name: &str) -> PathBuf {
        self.home.join(file_name)
    }

    /// Path of the file holding the factory password.
    pub(crate) fn password_file(&self) -> Result<PathBuf> {
        self.password_file
            .borrow()
            .as_ref()
            .map(|file| file.path().to_path_buf())
            .ok_or_else(|| {
                CertFactoryError::InvalidInput("certificate factory was destroyed".to_string())
            })
    }

    pub(crate) fn run(&self, command: &ToolCommand) -> Result<ToolOutput> {
        tracing::debug!(%command, "running external tool");
        let output = self.runner.execute(command)?;
        if !output.success() {
            return Err(CertFactoryError::ExternalToolFailure {
                command: command.to_string(),
                output: output.failure_summary(),
            });
        }
        Ok(output)
    }
}

/// Writes `secret` to a temporary file removed when the handle is dropped.
pub(crate) fn secret_file(secret: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("certfactory-")
        .suffix(".pass")
        .tempfile()?;
    file.write_all(secret.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Issues certificates from a single CA into a working directory.
///
/// ```no_run
/// use certfactory::{CertificateFactory, FactoryConfig, IssueRequest};
///
/// # fn main() -> certfactory::Result<()> {
/// let mut factory = CertificateFactory::new(FactoryConfig::default())?;
/// let server = factory.create("server", IssueRequest::common_name("localhost"))?;
/// server.save("server.p12")?.save("server.jks")?;
/// factory.ca().save("ca.pem")?;
/// factory.destroy(false)?;
/// # Ok(())
/// # }
/// ```
pub struct CertificateFactory {
    context: Rc<Context>,
    dn: DistinguishedName,
    owns_home: bool,
    cacert: Rc<Certificate>,
    certs: HashMap<String, Rc<Certificate>>,
}

impl CertificateFactory {
    /// Creates a factory running tools as child processes, with the native
    /// backend and detected capabilities.
    ///
    /// # Arguments
    ///
    /// * `config` - The home directory, CA subject, key settings and password.
    ///
    /// # Returns
    ///
    /// The factory, with its CA loaded from or written to the home directory.
    pub fn new(config: FactoryConfig) -> Result<Self> {
        let runner: Box<dyn CommandRunner> = Box::new(ProcessRunner);
        let capabilities = Capabilities::detect(runner.as_ref());
        let backend = backend::select(&capabilities);
        Self::with_collaborators(config, backend, runner, capabilities)
    }

    /// Creates a factory with the given backend, command runner and capabilities.
    ///
    /// The CA is loaded from the home directory when its PEM and key files
    /// exist there, and generated otherwise.
    ///
    /// # Arguments
    ///
    /// * `config` - The factory settings.
    /// * `backend` - Generates, signs and encodes certificates.
    /// * `runner` - Runs `keytool` for JKS and BKS exports.
    /// * `capabilities` - The external tools `runner` can be expected to find.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a bad CA alias, `InvalidDistinguishedName` when the
    /// configured DN has no common name, and any I/O or backend failure while
    /// preparing the CA.
    pub fn with_collaborators(
        config: FactoryConfig,
        backend: Box<dyn Backend>,
        runner: Box<dyn CommandRunner>,
        capabilities: Capabilities,
    ) -> Result<Self> {
        validate_alias(&config.ca_alias)?;
        if config.dn.common_name.is_empty() {
            return Err(CertFactoryError::InvalidDistinguishedName(
                "missing common name (CN)".to_string(),
            ));
        }

        let (home, owns_home) = match config.home {
            Some(home) => {
                fs::create_dir_all(&home)?;
                (home, false)
            }
            None => {
                let home = tempfile::Builder::new()
                    .prefix("certfactory-")
                    .tempdir()?
                    .keep();
                (home, true)
            }
        };

        let context = Rc::new(Context {
            home,
            ca_alias: config.ca_alias,
            params: SigningParams {
                validity_days: config.validity_days,
                key_size: config.key_size,
                key_algorithm: config.key_algorithm,
                digest: config.signature_digest,
            },
            password_file: RefCell::new(Some(secret_file(&config.password)?)),
            password: config.password,
            backend,
            runner,
            capabilities,
        });

        let cacert = match Certificate::load(&context, &context.ca_alias, None)? {
            Some(ca) => {
                tracing::info!(home = %context.home.display(), dn = %ca.dn(), "loaded CA");
                ca
            }
            None => Self::generate_ca(&context, &config.dn)?,
        };

        Ok(Self {
            context,
            dn: config.dn,
            owns_home,
            cacert: Rc::new(cacert),
            certs: HashMap::new(),
        })
    }

    fn generate_ca(context: &Rc<Context>, dn: &DistinguishedName) -> Result<Certificate> {
        let ca = Certificate::self_signed(
            Rc::clone(context),
            &context.ca_alias,
            &IssueRequest::from(dn.clone()),
        )?;
        ca.generate_pem()?;
        tracing::info!(
            home = %context.home.display(),
            backend = context.backend.name(),
            dn = %ca.dn(),
            "created CA"
        );
        Ok(ca)
    }

    /// Issues a certificate named `alias`, replacing any existing one.
    ///
    /// Unset subject fields are taken from the factory DN. The previous
    /// holder of `alias` loses its files and every further export through it
    /// fails. Files left under `alias` by an earlier factory are removed too.
    /// Using the CA alias replaces the CA with a new self-signed one.
    ///
    /// # Arguments
    ///
    /// * `alias` - The certificate name, also the stem of its files.
    /// * `request` - The subject and extensions. A [`DistinguishedName`] or an
    ///   [`IssueRequest`] built with [`IssueRequest::common_name`].
    ///
    /// # Returns
    ///
    /// The new certificate, shared with the factory.
    pub fn create(
        &mut self,
        alias: &str,
        request: impl Into<IssueRequest>,
    ) -> Result<Rc<Certificate>> {
        validate_alias(alias)?;
        let mut request = request.into();
        if request.dn.common_name.is_empty() {
            return Err(CertFactoryError::InvalidDistinguishedName(
                "missing common name (CN)".to_string(),
            ));
        }
        request.dn = request.dn.with_defaults(&self.dn);

        match self.get(alias)? {
            Some(previous) => {
                previous.destroy()?;
                previous.retire();
                tracing::debug!(alias, "replacing certificate");
            }
            // Files that cannot be loaded, such as a lone `.p12`, would be
            // picked up by the new certificate.
            None => Certificate::remove_files(&self.context, alias)?,
        }

        if alias == self.context.ca_alias {
            let ca = Rc::new(Certificate::self_signed(
                Rc::clone(&self.context),
                alias,
                &request,
            )?);
            ca.generate_pem()?;
            tracing::info!(dn = %ca.dn(), "replaced CA");
            self.cacert = Rc::clone(&ca);
            return Ok(ca);
        }

        let cert = Rc::new(Certificate::signed_by(
            Rc::clone(&self.cacert),
            alias,
            &request,
        )?);
        tracing::debug!(alias, dn = %cert.dn(), "issued certificate");
        self.certs.insert(alias.to_string(), Rc::clone(&cert));
        Ok(cert)
    }

    /// Looks up `alias` among the issued certificates, then in the home directory.
    ///
    /// A certificate found on disk is only returned when the current CA
    /// issued it.
    ///
    /// # Returns
    ///
    /// The certificate, or `None` when there is none for `alias`.
    pub fn get(&mut self, alias: &str) -> Result<Option<Rc<Certificate>>> {
        if let Some(cert) = self.certs.get(alias) {
            return Ok(Some(Rc::clone(cert)));
        }
        if alias == self.context.ca_alias {
            return Ok(Some(Rc::clone(&self.cacert)));
        }
        validate_alias(alias)?;
        let loaded = Certificate::load(&self.context, alias, Some(Rc::clone(&self.cacert)))?;
        Ok(loaded.map(|cert| {
            let cert = Rc::new(cert);
            tracing::debug!(alias, "loaded certificate from home");
            self.certs.insert(alias.to_string(), Rc::clone(&cert));
            cert
        }))
    }

    /// The certificate authority signing every other certificate.
    pub fn ca(&self) -> &Rc<Certificate> {
        &self.cacert
    }

    /// The working directory holding the factory's files.
    pub fn home(&self) -> &Path {
        &self.context.home
    }

    /// The CA subject, also the source of defaults for new subjects.
    pub fn dn(&self) -> &DistinguishedName {
        &self.dn
    }

    /// Password of the `.p12` files in the home directory.
    pub fn password(&self) -> &str {
        &self.context.password
    }

    pub fn capabilities(&self) -> Capabilities {
        self.context.capabilities
    }

    /// Removes the password file, the certificates' files and the home
    /// directory.
    ///
    /// Does nothing unless the factory created the home directory itself or
    /// `force` is set. Afterwards every certificate handed out by the factory
    /// is unusable for export.
    ///
    /// # Arguments
    ///
    /// * `force` - Also remove a home directory supplied by the caller.
    pub fn destroy(&mut self, force: bool) -> Result<()> {
        if !(self.owns_home || force) {
            tracing::debug!(home = %self.context.home.display(), "keeping caller's home directory");
            return Ok(());
        }

        self.context.password_file.borrow_mut().take();
        self.cacert.destroy()?;
        for cert in self.certs.values() {
            cert.destroy()?;
        }
        if self.context.home.exists() {
            fs::remove_dir_all(&self.context.home)?;
        }
        self.cacert.retire();
        for cert in self.certs.values() {
            cert.retire();
        }
        tracing::info!(home = %self.context.home.display(), "destroyed certificate factory");
        Ok(())
    }

    /// Runs an external tool, failing on a non-zero exit status.
    ///
    /// # Errors
    ///
    /// `ExternalToolFailure` with the rendered command and its stderr, or
    /// stdout when stderr is empty.
    pub fn run(&self, command: &ToolCommand) -> Result<ToolOutput> {
        self.context.run(command)
    }
}

impl fmt::Debug for CertificateFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateFactory")
            .field("home", &self.context.home)
            .field("dn", &self.dn)
            .field("owns_home", &self.owns_home)
            .field("backend", &self.context.backend)
            .field("capabilities", &self.context.capabilities)
            .field("certs", &self.certs.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for CertificateFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.cacert, f)
    }
}

/// Aliases name files in the home directory.
fn validate_alias(alias: &str) -> Result<()> {
    if alias.is_empty() || alias.contains(['/', '\\']) || alias == "." || alias == ".." {
        return Err(CertFactoryError::InvalidInput(format!(
            "`{alias}` is not a valid certificate alias"
        )));
    }
    Ok(())
}
