//! Structured invocation of external tools.
//!
//! Commands are a program plus an argument vector and are never composed
//! into a shell string. The rendered form returned by `Display` is only used
//! for logging and error messages.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::process::Command;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl ToolCommand {
    /// Creates a command with no arguments.
    ///
    /// # Arguments
    ///
    /// * `program` - The program to run, looked up on the `PATH` when it is a
    ///   bare name.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Appends `flag value` when `value` is present.
    ///
    /// # Arguments
    ///
    /// * `flag` - The option name, e.g. `-provider`.
    /// * `value` - The option value; nothing is appended when `None`.
    ///
    /// # Returns
    ///
    /// The command, for chaining.
    pub fn opt_arg(self, flag: &str, value: Option<impl AsRef<OsStr>>) -> Self {
        match value {
            Some(value) => self.arg(flag).arg(value),
            None => self,
        }
    }

    /// The program to run.
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// The arguments in order, without the program.
    pub fn get_args(&self) -> impl Iterator<Item = &OsStr> {
        self.args.iter().map(OsString::as_os_str)
    }

    /// The argument following `flag`, if present.
    pub fn value_of(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(OsString::as_os_str)
    }

    /// Whether `arg` is one of the arguments.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Exit status and captured streams of a finished command.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    /// True for exit code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Diagnostic text for error reports: stderr, else stdout, else the exit status.
    pub fn failure_summary(&self) -> String {
        let stderr = trim_bytes(&self.stderr);
        if !stderr.is_empty() {
            return stderr;
        }
        let stdout = trim_bytes(&self.stdout);
        if !stdout.is_empty() {
            return stdout;
        }
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_owned(),
        }
    }
}

fn trim_bytes(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_owned()
}

/// Runs external commands to completion.
///
/// Implementations block until the process exits. An `Err` means the process
/// could not be started; a non-zero exit is reported through [`ToolOutput`].
pub trait CommandRunner: fmt::Debug {
    /// Runs `command` and waits for it to finish.
    ///
    /// # Arguments
    ///
    /// * `command` - The program and arguments to run.
    ///
    /// # Returns
    ///
    /// The exit status and captured output, whatever the exit status.
    fn execute(&self, command: &ToolCommand) -> io::Result<ToolOutput>;
}

/// Runs commands as child processes with captured stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn execute(&self, command: &ToolCommand) -> io::Result<ToolOutput> {
        let output = Command::new(command.program())
            .args(command.get_args())
            .output()?;
        Ok(ToolOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let command = ToolCommand::new("keytool")
            .arg("-alias")
            .arg("my cert")
            .arg("");
        assert_eq!(command.to_string(), r#"keytool -alias "my cert" """#);
    }

    #[test]
    fn optional_arguments_are_skipped_when_absent() {
        let command = ToolCommand::new("keytool")
            .opt_arg("-provider", None::<&str>)
            .opt_arg("-storetype", Some("JKS"));
        assert_eq!(command.to_string(), "keytool -storetype JKS");
        assert_eq!(command.value_of("-storetype"), Some(OsStr::new("JKS")));
        assert!(!command.has_arg("-provider"));
    }

    #[test]
    fn failure_summary_prefers_stderr() {
        let output = ToolOutput {
            code: Some(1),
            stdout: b"out".to_vec(),
            stderr: b"  err \n".to_vec(),
        };
        assert_eq!(output.failure_summary(), "err");
        let silent = ToolOutput {
            code: Some(3),
            ..Default::default()
        };
        assert_eq!(silent.failure_summary(), "exit code 3");
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_reports_exit_status() {
        let output = ProcessRunner
            .execute(&ToolCommand::new("sh").args(["-c", "echo oops >&2; exit 4"]))
            .unwrap();
        assert!(!output.success());
        assert_eq!(output.code, Some(4));
        assert_eq!(output.failure_summary(), "oops");
    }
}
