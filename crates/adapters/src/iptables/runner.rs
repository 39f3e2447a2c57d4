use std::process::Command;
use std::sync::Arc;

use domain::portmap::error::PortMapError;

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs an external program to completion.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// An `iptables` binary plus the flags every invocation carries.
#[derive(Clone)]
pub struct Iptables {
    path: String,
    use_wait: bool,
    runner: Arc<dyn CommandRunner>,
}

impl Iptables {
    pub fn new(path: impl Into<String>, use_wait: bool, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            path: path.into(),
            use_wait,
            runner,
        }
    }

    /// Run `iptables [--wait] args...`.
    ///
    /// Only a failure to spawn is an `Err`; a non-zero exit is reported in
    /// the returned output. `chain` is used for error context.
    pub fn exec(&self, chain: &str, args: &[String]) -> Result<CommandOutput, PortMapError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        if self.use_wait {
            full.push("--wait".to_string());
        }
        full.extend(args.iter().cloned());

        tracing::trace!(path = %self.path, args = ?full, "running iptables");
        self.runner
            .run(&self.path, &full)
            .map_err(|e| PortMapError::RuleEngine {
                chain: chain.to_string(),
                reason: format!("failed to run {}: {e}", self.path),
            })
    }

    /// Like [`exec`](Self::exec) but a non-zero exit becomes a `RuleEngine`
    /// error carrying stderr.
    pub fn exec_checked(&self, chain: &str, args: &[String]) -> Result<CommandOutput, PortMapError> {
        let out = self.exec(chain, args)?;
        if out.success {
            Ok(out)
        } else {
            Err(PortMapError::RuleEngine {
                chain: chain.to_string(),
                reason: out.stderr.trim().to_string(),
            })
        }
    }
}

/// `[-t, table, op, chain, rest...]`
pub(crate) fn table_args(table: &str, op: &str, chain: &str, rest: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(rest.len() + 4);
    args.push("-t".to_string());
    args.push(table.to_string());
    args.push(op.to_string());
    args.push(chain.to_string());
    args.extend(rest.iter().cloned());
    args
}
