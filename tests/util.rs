#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::Path;
use std::rc::Rc;

use certfactory::{
    Capabilities, CertificateFactory, CommandRunner, FactoryConfig, KeyAlgorithm, NativeBackend,
    ToolCommand, ToolOutput,
};

/// Records every command and answers with a canned exit status.
///
/// A successful `-importkeystore` creates an empty destination file, as
/// `keytool` would.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    pub commands: Rc<RefCell<Vec<ToolCommand>>>,
    pub fail_with: Option<String>,
    /// Commands that succeed before `fail_with` applies.
    pub succeed_first: usize,
}

impl RecordingRunner {
    pub fn failing(stderr: &str) -> Self {
        Self::failing_after(0, stderr)
    }

    pub fn failing_after(succeed_first: usize, stderr: &str) -> Self {
        Self {
            fail_with: Some(stderr.to_string()),
            succeed_first,
            ..Default::default()
        }
    }

    pub fn recorded(&self) -> Vec<ToolCommand> {
        self.commands.borrow().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn execute(&self, command: &ToolCommand) -> io::Result<ToolOutput> {
        let mut commands = self.commands.borrow_mut();
        commands.push(command.clone());
        match &self.fail_with {
            Some(stderr) if commands.len() > self.succeed_first => Ok(ToolOutput {
                code: Some(1),
                stdout: Vec::new(),
                stderr: stderr.as_bytes().to_vec(),
            }),
            _ => {
                if let Some(destination) = command.value_of("-destkeystore") {
                    fs::write(destination, b"")?;
                }
                Ok(ToolOutput {
                    code: Some(0),
                    ..Default::default()
                })
            }
        }
    }
}

/// P-256 keys keep the tests fast.
pub fn ec_config(home: &Path) -> FactoryConfig {
    FactoryConfig::builder()
        .home(home)
        .dn("CN=Test CA,OU=Testing,O=Example,C=US".parse().unwrap())
        .key_algorithm(KeyAlgorithm::Ec)
        .key_size(256)
        .validity_days(30)
        .build()
}

pub fn factory_with(
    home: &Path,
    runner: RecordingRunner,
    capabilities: Capabilities,
) -> CertificateFactory {
    CertificateFactory::with_collaborators(
        ec_config(home),
        Box::new(NativeBackend),
        Box::new(runner),
        capabilities,
    )
    .expect("factory")
}

pub fn factory(home: &Path) -> CertificateFactory {
    factory_with(home, RecordingRunner::default(), Capabilities::default())
}
