//! A [`CommandRunner`] that replies from a rule table instead of spawning
//! processes, for tests that must assert the exact external calls.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ClusterError;
use crate::runner::{CommandOutput, CommandRunner, Invocation};

/// Matches everything.
pub const ANY: &str = "*";

enum Reply {
    Output(CommandOutput),
    Unavailable,
}

struct Rule {
    prefix: String,
    reply: Reply,
}

/// Rules match on a prefix of the rendered command line (`program args...`);
/// the longest matching prefix wins. Unmatched commands exit with 127.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit 0 with `stdout`.
    pub fn reply(self, prefix: &str, stdout: &str) -> Self {
        self.respond(
            prefix,
            CommandOutput {
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        )
    }

    /// Exit `code` with `stderr`.
    pub fn fail(self, prefix: &str, code: i32, stderr: &str) -> Self {
        self.respond(
            prefix,
            CommandOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        )
    }

    pub fn respond(mut self, prefix: &str, output: CommandOutput) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            reply: Reply::Output(output),
        });
        self
    }

    /// The program cannot be started at all.
    pub fn unavailable(mut self, prefix: &str) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            reply: Reply::Unavailable,
        });
        self
    }

    /// Every invocation seen so far, in call order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.lock().clone()
    }

    /// Rendered command lines that start with `prefix`.
    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .iter()
            .map(ToString::to_string)
            .filter(|line| line.starts_with(prefix))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Invocation>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn find(&self, line: &str) -> Option<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.prefix == ANY || line.starts_with(&r.prefix))
            .max_by_key(|r| if r.prefix == ANY { 0 } else { r.prefix.len() })
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ClusterError> {
        self.lock().push(invocation.clone());
        let line = invocation.to_string();
        match self.find(&line).map(|r| &r.reply) {
            Some(Reply::Output(out)) => Ok(out.clone()),
            Some(Reply::Unavailable) => Err(ClusterError::Spawn {
                program: invocation.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted: unavailable"),
            }),
            None => Ok(CommandOutput {
                code: Some(127),
                stdout: String::new(),
                stderr: format!("no scripted reply for `{line}`"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn longest_prefix_wins_and_calls_are_recorded() {
        let runner = ScriptedRunner::new()
            .reply(ANY, "fallback")
            .reply("helm list", "short")
            .reply("helm list --all-namespaces", "long");

        let out = runner
            .run(&Invocation::new("helm", ["list", "--all-namespaces", "--output", "json"]))
            .await
            .unwrap();
        assert_eq!(out.stdout, "long");

        let out = runner.run(&Invocation::new("kubectl", ["version"])).await.unwrap();
        assert_eq!(out.stdout, "fallback");

        assert_eq!(runner.calls().len(), 2);
        assert_eq!(runner.calls_matching("kubectl"), vec!["kubectl version"]);
    }

    #[tokio::test]
    async fn unmatched_command_exits_127() {
        let out = ScriptedRunner::new()
            .run(&Invocation::new("helm", ["version"]))
            .await
            .unwrap();
        assert_eq!(out.code, Some(127));
    }
}
