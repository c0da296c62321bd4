use crate::runner::{CommandRunner, ToolCommand};

/// Fully qualified name of the JCE provider needed for BKS keystores.
pub const BOUNCY_CASTLE_PROVIDER: &str = "org.bouncycastle.jce.provider.BouncyCastleProvider";

/// External tooling available to the factory.
///
/// Detected once with [`Capabilities::detect`] or built directly, e.g. in
/// tests. A missing capability is reported as an error where it is needed;
/// nothing falls back to another format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The JDK `keytool` is on the `PATH` (JKS and BKS export).
    pub keytool: bool,
    /// The BouncyCastle provider class is visible to the JDK (BKS export).
    pub bouncy_castle: bool,
}

impl Capabilities {
    /// Probes the environment through `runner`.
    pub fn detect(runner: &dyn CommandRunner) -> Self {
        let keytool = succeeds(runner, &ToolCommand::new("keytool").arg("-help"));
        let bouncy_castle = keytool
            && runner
                .execute(&ToolCommand::new("javap").arg(BOUNCY_CASTLE_PROVIDER))
                .map(|output| {
                    output.success() && !String::from_utf8_lossy(&output.stderr).contains("Error:")
                })
                .unwrap_or(false);
        let capabilities = Self {
            keytool,
            bouncy_castle,
        };
        tracing::debug!(?capabilities, "detected external tooling");
        capabilities
    }

    /// Every capability present.
    pub fn all() -> Self {
        Self {
            keytool: true,
            bouncy_castle: true,
        }
    }
}

fn succeeds(runner: &dyn CommandRunner, command: &ToolCommand) -> bool {
    runner
        .execute(command)
        .map(|output| output.success())
        .unwrap_or(false)
}
