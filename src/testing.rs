//! Test doubles shared by the unit tests
//!
//! [`FakeExecutor`] records every command it is asked to run and answers from
//! scripted replies, so tests can assert both on outcomes and on the exact
//! sequence of remote calls.

use crate::domain::ports::{CommandExecutor, CommandOutput, CommandTarget, ExecError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

/// A scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(String),
    Fail(i32, String),
    Missing,
}

impl Reply {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Reply::Ok(stdout.into())
    }

    pub fn fail(status: i32, stderr: impl Into<String>) -> Self {
        Reply::Fail(status, stderr.into())
    }

    fn to_result(&self, program: &str) -> Result<CommandOutput, ExecError> {
        match self {
            Reply::Ok(stdout) => Ok(CommandOutput::new(stdout.clone(), "")),
            Reply::Fail(status, stderr) => Err(ExecError::Failed {
                status: Some(*status),
                stderr: stderr.clone(),
            }),
            Reply::Missing => Err(ExecError::NotFound {
                program: program.to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct Script {
    exact: HashMap<(String, String), VecDeque<Reply>>,
    prefix: Vec<(String, String, Reply)>,
    calls: Vec<(String, String)>,
}

/// Parks a scripted command until the test opens it
#[derive(Default)]
pub struct Gate {
    reached: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until the gated command has been issued
    pub async fn reached(&self) {
        self.reached.notified().await
    }

    pub fn open(&self) {
        self.release.notify_one()
    }
}

/// Recording executor with scripted replies
///
/// Commands are keyed by target (`local` or the server address) and the argv
/// joined with spaces. Replies registered for the same key are consumed in
/// order, the last one repeating. Unscripted commands succeed with empty
/// output.
#[derive(Default)]
pub struct FakeExecutor {
    script: Mutex<Script>,
    gates: Mutex<HashMap<(String, String), Arc<Gate>>>,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, target: &str, command: &str, reply: Reply) {
        self.script
            .lock()
            .exact
            .entry((target.to_string(), command.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Replace any replies scripted for a command
    pub fn reset(&self, target: &str, command: &str, reply: Reply) {
        let mut script = self.script.lock();
        let queue = script
            .exact
            .entry((target.to_string(), command.to_string()))
            .or_default();
        queue.clear();
        queue.push_back(reply);
    }

    /// Hold a command before it runs until the returned gate is opened
    pub fn gate(&self, target: &str, command: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates
            .lock()
            .insert((target.to_string(), command.to_string()), gate.clone());
        gate
    }

    pub fn on_prefix(&self, target: &str, prefix: &str, reply: Reply) {
        self.script
            .lock()
            .prefix
            .push((target.to_string(), prefix.to_string(), reply));
    }

    /// Every call as `<target> <command>`, in order
    pub fn calls(&self) -> Vec<String> {
        self.script
            .lock()
            .calls
            .iter()
            .map(|(t, c)| format!("{} {}", t, c))
            .collect()
    }

    /// Commands sent to one target, in order
    pub fn commands(&self, target: &str) -> Vec<String> {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn count(&self, target: &str, command: &str) -> usize {
        self.commands(target).iter().filter(|c| *c == command).count()
    }

    pub fn count_prefix(&self, target: &str, prefix: &str) -> usize {
        self.commands(target)
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn execute(
        &self,
        target: &CommandTarget,
        argv: &[String],
    ) -> Result<CommandOutput, ExecError> {
        let target = target.to_string();
        let command = argv.join(" ");
        let program = argv.first().cloned().unwrap_or_default();

        let gate = self.gates.lock().get(&(target.clone(), command.clone())).cloned();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }

        let mut script = self.script.lock();
        script.calls.push((target.clone(), command.clone()));

        if let Some(queue) = script.exact.get_mut(&(target.clone(), command.clone())) {
            let reply = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(reply) = reply {
                return reply.to_result(&program);
            }
        }

        if let Some((_, _, reply)) = script
            .prefix
            .iter()
            .find(|(t, p, _)| *t == target && command.starts_with(p.as_str()))
        {
            return reply.to_result(&program);
        }

        Ok(CommandOutput::default())
    }
}

/// A structured result record
pub fn op_xml(ret: i32, errno: i32, errstr: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cliOutput>
  <opRet>{}</opRet>
  <opErrno>{}</opErrno>
  <opErrstr>{}</opErrstr>
</cliOutput>"#,
        ret, errno, errstr
    )
}

/// A `volume info` response for a single volume
pub fn volume_info_xml(volume: &str, options: &[(&str, &str)]) -> String {
    let rendered: String = options
        .iter()
        .map(|(name, value)| {
            format!(
                "<option><name>{}</name><value>{}</value></option>",
                name, value
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cliOutput>
  <opRet>0</opRet>
  <opErrno>0</opErrno>
  <opErrstr/>
  <volInfo>
    <volumes>
      <volume>
        <name>{}</name>
        <id>4c5d6e7f</id>
        <status>1</status>
        <bricks><brick><name>host1:/bricks/b1</name></brick></bricks>
        <optCount>{}</optCount>
        <options>{}</options>
      </volume>
      <count>1</count>
    </volumes>
  </volInfo>
</cliOutput>"#,
        volume,
        options.len(),
        rendered
    )
}
