// ABOUTME: partitions a command list into proposals to pass back and approvals to run now.
// ABOUTME: each approved command gets its own scratch environment and always ends with an output.

use cmdgate_common::{Command, ErrorCode};
use tracing::{info, warn};

use crate::actions::exec::{ExecOutcome, Executor};
use crate::actions::scratch::ScratchManager;
use crate::policy;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub proposed: Vec<Command>,
    pub executed: Vec<Command>,
}

impl BatchOutcome {
    pub fn ran_anything(&self) -> bool {
        !self.executed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BatchProcessor {
    executor: Executor,
    scratch: ScratchManager,
}

impl BatchProcessor {
    pub fn new(executor: Executor, scratch: ScratchManager) -> Self {
        Self { executor, scratch }
    }

    /// Runs approved commands one after another, in input order.
    ///
    /// A failing command never stops the rest of the batch.
    pub async fn process(&self, commands: Vec<Command>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for command in commands {
            if !command.execute {
                outcome.proposed.push(command);
                continue;
            }
            if command.has_run() {
                info!(command = %command.command, "skipping re-submitted command that already ran");
                outcome.executed.push(command);
                continue;
            }
            outcome.executed.push(self.execute(command).await);
        }
        outcome
    }

    async fn execute(&self, mut command: Command) -> Command {
        let result = if policy::is_command_denied(&command.command) {
            warn!(command = %command.command, "command denied by policy");
            ExecOutcome::failed(None, ErrorCode::PolicyDenied, "command denied by policy".to_string())
        } else {
            self.run_in_scratch(&command).await
        };

        info!(
            command = %command.command,
            success = result.success,
            exit_code = ?result.exit_code,
            "command executed"
        );
        command.output = Some(result.command_output());
        command.exit_code = result.exit_code;
        command.success = Some(result.success);
        command
    }

    async fn run_in_scratch(&self, command: &Command) -> ExecOutcome {
        let env = match self.scratch.acquire() {
            Ok(env) => env,
            Err(err) => return ExecOutcome::failed(None, ErrorCode::ScratchIo, err.to_string()),
        };

        let result = match env.write(&command.files).await {
            Ok(()) => {
                let text = format!("cd {} && {}", shell_quote(&env.path().to_string_lossy()), command.command);
                self.executor.run(&text, env.path()).await
            }
            Err(err) => ExecOutcome::failed(None, ErrorCode::ScratchIo, err.to_string()),
        };

        if let Err(err) = env.release() {
            warn!(command = %command.command, error = %err, "scratch release failed");
        }
        result
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
