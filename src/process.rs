//! Typed native command invocations and the runner that executes them.
//!
//! Backends never build shell strings. They produce [`Invocation`]s and
//! hand them to a [`CommandRunner`], which tests replace with a
//! [`ScriptedRunner`].

use crate::error::DnsError;
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

/// A program and its argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Invocation {
    /// Program name or path.
    pub program: String,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
}

impl Invocation {
    /// Creates an invocation with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and stderr.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns `true` if the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Converts a non-zero exit into [`DnsError::CommandExecutionFailed`].
    ///
    /// # Errors
    ///
    /// Returns the error when [`success`](Self::success) is `false`.
    pub fn check(self, invocation: &Invocation) -> crate::Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(DnsError::CommandExecutionFailed {
            command: invocation.to_string(),
            detail: self.describe_failure(),
        })
    }

    fn describe_failure(&self) -> String {
        let status = self
            .code
            .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"));
        let output = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        if output.is_empty() {
            status
        } else {
            format!("{status}: {output}")
        }
    }
}

/// Executes native commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `invocation` to completion and captures its output.
    ///
    /// A non-zero exit is *not* an error here; only a failure to spawn is.
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput>;
}

/// Runs a command and maps both spawn failures and non-zero exits to
/// [`DnsError::CommandExecutionFailed`].
///
/// # Errors
///
/// See above.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
) -> crate::Result<CommandOutput> {
    let output = runner
        .run(invocation)
        .await
        .map_err(|e| DnsError::CommandExecutionFailed {
            command: invocation.to_string(),
            detail: e.to_string(),
        })?;
    output.check(invocation)
}

/// Runs real processes through `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        let mut cmd = tokio::process::Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);
        // Output is parsed and matched; keep it untranslated.
        #[cfg(unix)]
        cmd.env("LC_ALL", "C");

        let out = cmd.output().await?;
        let output = CommandOutput {
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        };
        tracing::debug!(
            command = %invocation,
            code = ?output.code,
            stdout = %output.stdout.trim(),
            stderr = %output.stderr.trim(),
            "ran native command"
        );
        Ok(output)
    }
}

type Script = dyn Fn(&Invocation) -> io::Result<CommandOutput> + Send + Sync;

/// A [`CommandRunner`] that answers from a closure and records every call.
///
/// Lets callers exercise backends without touching the host.
///
/// ```
/// use dns_changer::{CommandOutput, CommandRunner, Invocation, ScriptedRunner};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let runner = ScriptedRunner::new(|inv| Ok(CommandOutput::ok(format!("{} ran", inv.program))));
/// let out = runner.run(&Invocation::new("true")).await.unwrap();
/// assert_eq!(out.stdout, "true ran");
/// assert_eq!(runner.calls().len(), 1);
/// # });
/// ```
#[derive(Clone)]
pub struct ScriptedRunner {
    script: Arc<Script>,
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedRunner {
    /// Creates a runner answering with `script`.
    pub fn new(
        script: impl Fn(&Invocation) -> io::Result<CommandOutput> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Arc::new(script),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A runner on which every command succeeds with empty output.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(CommandOutput::ok("")))
    }

    /// Every invocation seen so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every invocation rendered as a command line.
    #[must_use]
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }
}

impl fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("calls", &self.calls().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());
        (self.script)(invocation)
    }
}
