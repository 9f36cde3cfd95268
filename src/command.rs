// External command execution (tc, ip) with combined output

use async_trait::async_trait;
use std::fmt;

/// A program invocation, optionally wrapped in `ip netns exec <netns>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    /// (ip program, namespace name) when the command runs inside a named namespace.
    pub netns: Option<(String, String)>,
}

impl ShellCommand {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            netns: None,
        }
    }

    /// Run inside the named network namespace via `<ip> netns exec <name>`.
    pub fn in_netns(mut self, ip_program: &str, name: &str) -> Self {
        self.netns = Some((ip_program.to_string(), name.to_string()));
        self
    }

    /// Full argv including the namespace wrapper.
    pub fn argv(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.args.len() + 4);
        if let Some((ip, name)) = &self.netns {
            out.extend([ip.clone(), "netns".into(), "exec".into(), name.clone()]);
        }
        out.push(self.program.clone());
        out.extend(self.args.iter().cloned());
        out
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}

/// Exit status (None when killed by a signal) and stdout followed by stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs external commands. Spawn failures are `Err`; non-zero exits are `Ok` with a status.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &ShellCommand) -> std::io::Result<CommandOutput>;
}

/// Runs commands on the host with tokio::process.
#[derive(Debug, Default, Clone)]
pub struct HostRunner;

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, cmd: &ShellCommand) -> std::io::Result<CommandOutput> {
        let argv = cmd.argv();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"))?;
        let out = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;
        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(CommandOutput {
            status: out.status.code(),
            output,
        })
    }
}
