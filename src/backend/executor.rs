//! Process Executor
//!
//! Runs administrative commands as child processes. Server targets go through
//! `ssh` when the address names a login user, otherwise through the local
//! tool's `--remote-host` option.
//!
//! The remote end of an ssh login runs its command through a shell, so the
//! argv is sent as a single string with every word quoted.

use crate::domain::ports::{CommandExecutor, CommandOutput, CommandTarget, ExecError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};

/// Name of the volume-management tool
const GLUSTER: &str = "gluster";

/// Configuration for [`ProcessExecutor`]
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutorConfig {
    /// Private key for ssh logins
    pub private_key: Option<PathBuf>,
    /// ssh port, if not the default
    pub ssh_port: Option<u16>,
}

/// [`CommandExecutor`] backed by `tokio::process`
pub struct ProcessExecutor {
    config: ProcessExecutorConfig,
}

impl ProcessExecutor {
    pub fn new(config: ProcessExecutorConfig) -> Self {
        Self { config }
    }

    /// Full argv for a target
    fn command_line(&self, target: &CommandTarget, argv: &[String]) -> Result<Vec<String>, ExecError> {
        let line = match target {
            CommandTarget::Local => argv.to_vec(),
            CommandTarget::Server(server) => match server.user() {
                Some(_) => {
                    let mut line = vec![
                        "ssh".to_string(),
                        "-o".to_string(),
                        "BatchMode=yes".to_string(),
                    ];
                    if let Some(key) = &self.config.private_key {
                        line.push("-i".to_string());
                        line.push(key.to_string_lossy().into_owned());
                    }
                    if let Some(port) = self.config.ssh_port {
                        line.push("-p".to_string());
                        line.push(port.to_string());
                    }
                    line.push(server.to_string());
                    line.push("--".to_string());
                    line.push(remote_command(argv)?);
                    line
                }
                None => {
                    let mut line = vec![
                        GLUSTER.to_string(),
                        format!("--remote-host={}", server.host()),
                    ];
                    line.extend(argv.iter().cloned());
                    line
                }
            },
        };
        Ok(line)
    }
}

/// `gluster <argv>` quoted for a POSIX shell
fn remote_command(argv: &[String]) -> Result<String, ExecError> {
    let words = std::iter::once(GLUSTER)
        .chain(argv.iter().map(String::as_str))
        .map(|word| {
            shlex::try_quote(word)
                .map(|quoted| quoted.into_owned())
                .map_err(|e| {
                    ExecError::Io(std::io::Error::new(
                        ErrorKind::InvalidInput,
                        format!("cannot quote {:?}: {}", word, e),
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(words.join(" "))
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(
        &self,
        target: &CommandTarget,
        argv: &[String],
    ) -> Result<CommandOutput, ExecError> {
        let line = self.command_line(target, argv)?;
        let (program, args) = line.split_first().ok_or_else(|| {
            ExecError::Io(std::io::Error::new(ErrorKind::InvalidInput, "empty command"))
        })?;

        debug!("exec [{}]: {}", target, line.join(" "));

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ExecError::NotFound {
                    program: program.clone(),
                },
                _ => ExecError::Io(e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            warn!(
                "Command [{}] {} exited with {:?}",
                target,
                line.join(" "),
                output.status.code()
            );
            return Err(ExecError::Failed {
                status: output.status.code(),
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}
