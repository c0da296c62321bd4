//! Java keystore types and the `keytool` commands that populate them.

use std::fmt;
use std::path::Path;

use crate::error::{CertFactoryError, Result};
use crate::runner::ToolCommand;

/// Container format of a password-protected keystore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeystoreType {
    /// The Java keystore format.
    Jks,
    /// BouncyCastle keystore, needs the BouncyCastle provider.
    Bks,
    Pkcs12,
}

impl KeystoreType {
    /// Name understood by `keytool -storetype`.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeystoreType::Jks => "JKS",
            KeystoreType::Bks => "BKS",
            KeystoreType::Pkcs12 => "PKCS12",
        }
    }

    /// Infers the keystore type from the file extension.
    ///
    /// # Arguments
    ///
    /// * `path` - The keystore path. The extension is matched
    ///   case-insensitively.
    ///
    /// # Returns
    ///
    /// The type for `.jks`, `.bks`, `.p12` and `.pfx`, or `UnsupportedFormat`
    /// for any other extension.
    ///
    /// ```
    /// use std::path::Path;
    /// use certfactory::KeystoreType;
    ///
    /// assert_eq!(KeystoreType::from_path(Path::new("trust.JKS"))?, KeystoreType::Jks);
    /// assert!(KeystoreType::from_path(Path::new("server.pem")).is_err());
    /// # Ok::<(), certfactory::CertFactoryError>(())
    /// ```
    pub fn from_path(path: &Path) -> Result<Self> {
        match extension(path).as_str() {
            "jks" => Ok(KeystoreType::Jks),
            "bks" => Ok(KeystoreType::Bks),
            "p12" | "pfx" => Ok(KeystoreType::Pkcs12),
            other => Err(CertFactoryError::UnsupportedFormat(format!(".{other}"))),
        }
    }
}

impl fmt::Display for KeystoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased extension of `path` without the dot, empty when there is none.
pub(crate) fn extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Copy of one private key entry from a source keystore into a destination keystore.
#[derive(Debug, Clone)]
pub struct ImportKeystore<'a> {
    /// Alias of the entry, kept in the destination.
    pub alias: &'a str,
    pub source: &'a Path,
    pub source_type: KeystoreType,
    pub source_password_file: &'a Path,
    pub destination: &'a Path,
    pub destination_type: KeystoreType,
    /// Holds both the destination store password and the key password.
    pub destination_password_file: &'a Path,
    /// JCA provider class, required for BKS.
    pub provider: Option<&'a str>,
}

impl ImportKeystore<'_> {
    /// `keytool -importkeystore`, creating the destination when absent.
    ///
    /// Passwords are read by `keytool` from files and never appear in the
    /// argument list.
    ///
    /// # Returns
    ///
    /// The command, ready for a [`CommandRunner`](crate::runner::CommandRunner).
    pub fn command(&self) -> ToolCommand {
        ToolCommand::new("keytool")
            .args(["-noprompt", "-importkeystore", "-srcalias", self.alias])
            .arg("-srckeystore")
            .arg(self.source)
            .arg("-srcstorepass:file")
            .arg(self.source_password_file)
            .args(["-srcstoretype", self.source_type.as_str()])
            .arg("-destkeystore")
            .arg(self.destination)
            .arg("-deststorepass:file")
            .arg(self.destination_password_file)
            .arg("-destkeypass:file")
            .arg(self.destination_password_file)
            .args(["-deststoretype", self.destination_type.as_str()])
            .opt_arg("-provider", self.provider)
    }
}

/// Addition of a certificate without its key as a trusted entry.
#[derive(Debug, Clone)]
pub struct ImportTrustedCert<'a> {
    pub alias: &'a str,
    pub certificate: &'a Path,
    pub keystore: &'a Path,
    pub keystore_type: KeystoreType,
    pub password_file: &'a Path,
    pub provider: Option<&'a str>,
}

impl ImportTrustedCert<'_> {
    /// `keytool -importcert`, creating the keystore when absent.
    pub fn command(&self) -> ToolCommand {
        ToolCommand::new("keytool")
            .arg("-noprompt")
            .arg("-importcert")
            .arg("-file")
            .arg(self.certificate)
            .args(["-alias", self.alias])
            .arg("-keystore")
            .arg(self.keystore)
            .arg("-storepass:file")
            .arg(self.password_file)
            .args(["-storetype", self.keystore_type.as_str()])
            .opt_arg("-provider", self.provider)
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;

    #[test]
    fn type_follows_extension() {
        assert_eq!(
            KeystoreType::from_path(Path::new("a/server.JKS")).unwrap(),
            KeystoreType::Jks
        );
        assert_eq!(
            KeystoreType::from_path(Path::new("client.pfx")).unwrap(),
            KeystoreType::Pkcs12
        );
        assert!(matches!(
            KeystoreType::from_path(Path::new("client.pem")),
            Err(CertFactoryError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn import_keystore_passes_paths_as_single_arguments() {
        let import = ImportKeystore {
            alias: "server",
            source: Path::new("/tmp/home dir/server.p12"),
            source_type: KeystoreType::Pkcs12,
            source_password_file: Path::new("/tmp/factory.pass"),
            destination: Path::new("/tmp/out/server.bks"),
            destination_type: KeystoreType::Bks,
            destination_password_file: Path::new("/tmp/export.pass"),
            provider: Some("org.example.Provider"),
        };
        let command = import.command();
        assert_eq!(command.program(), "keytool");
        assert_eq!(
            command.value_of("-srckeystore"),
            Some(OsStr::new("/tmp/home dir/server.p12"))
        );
        assert_eq!(command.value_of("-srcalias"), Some(OsStr::new("server")));
        assert_eq!(command.value_of("-deststoretype"), Some(OsStr::new("BKS")));
        assert_eq!(
            command.value_of("-provider"),
            Some(OsStr::new("org.example.Provider"))
        );
    }

    #[test]
    fn trusted_cert_without_provider() {
        let command = ImportTrustedCert {
            alias: "ca",
            certificate: Path::new("ca.pem"),
            keystore: Path::new("server.jks"),
            keystore_type: KeystoreType::Jks,
            password_file: Path::new("pass"),
            provider: None,
        }
        .command();
        assert!(command.has_arg("-importcert"));
        assert!(!command.has_arg("-provider"));
        assert_eq!(command.value_of("-storetype"), Some(OsStr::new("JKS")));
    }
}
