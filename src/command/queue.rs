// src/command/queue.rs

use tracing::{debug, error, info};

use crate::command::model::Command;
use crate::types::{BoxFuture, CommandStatus, ToolKind, ToolOutput};

/// Something that can really run the conversion tool.
///
/// The worker routes this over the host capability RPC; tests record calls.
pub trait ToolRunner: Send + Sync {
    fn run_tool(
        &self,
        kind: ToolKind,
        args: Vec<String>,
    ) -> BoxFuture<'_, std::result::Result<ToolOutput, String>>;
}

/// Two-phase queue of tool invocations.
///
/// Commands are recorded while the scripting phase runs and executed
/// strictly one at a time afterwards. Nothing is ever removed, so the full
/// history stays available for inspection.
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: Vec<Command>,
    next_id: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, kind: ToolKind, args: Vec<String>) -> Command {
        self.next_id += 1;
        let cmd = Command::new(self.next_id, kind, args);
        info!(
            id = cmd.id,
            command = %kind,
            input = ?cmd.input_path,
            output = ?cmd.output_path,
            "queued tool command"
        );
        self.commands.push(cmd.clone());
        cmd
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn pending_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| c.status == CommandStatus::Pending)
            .count()
    }

    /// Run every still-pending command in enqueue order, one at a time.
    ///
    /// Returns the commands touched by this call in their final state.
    /// Commands already terminal are left alone, so calling this again only
    /// runs what was enqueued since.
    pub async fn execute_queued(&mut self, runner: &dyn ToolRunner) -> Vec<Command> {
        let pending: Vec<usize> = self
            .commands
            .iter()
            .enumerate()
            .filter(|(_, c)| c.status == CommandStatus::Pending)
            .map(|(idx, _)| idx)
            .collect();

        info!(count = pending.len(), "executing queued tool commands");
        let mut touched = Vec::with_capacity(pending.len());

        for idx in pending {
            let (kind, args) = {
                let cmd = &mut self.commands[idx];
                cmd.status = CommandStatus::Running;
                info!(id = cmd.id, command = %cmd.command, "running tool command");
                debug!(id = cmd.id, args = ?cmd.args, "tool arguments");
                (cmd.command, cmd.args.clone())
            };

            let outcome = runner.run_tool(kind, args).await;
            let cmd = &mut self.commands[idx];

            match outcome {
                Ok(output) => {
                    info!(id = cmd.id, exit_code = output.exit_code, "tool command exited");
                    if output.exit_code == 0 {
                        cmd.status = CommandStatus::Completed;
                    } else {
                        cmd.status = CommandStatus::Error;
                        cmd.error = Some(if output.stderr.trim().is_empty() {
                            format!("{} exited with code {}", cmd.command, output.exit_code)
                        } else {
                            output.stderr.clone()
                        });
                    }
                    cmd.result = Some(output);
                }
                Err(message) => {
                    error!(id = cmd.id, error = %message, "tool command failed");
                    cmd.status = CommandStatus::Error;
                    cmd.error = Some(message);
                }
            }

            touched.push(cmd.clone());
        }

        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ToolRunner for Recorder {
        fn run_tool(
            &self,
            _kind: ToolKind,
            args: Vec<String>,
        ) -> BoxFuture<'_, std::result::Result<ToolOutput, String>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(args.clone());
                match args.first().map(String::as_str) {
                    Some("fail") => Ok(ToolOutput {
                        exit_code: 1,
                        stdout: String::new(),
                        stderr: String::new(),
                    }),
                    Some("crash") => Err("process capability unavailable".to_string()),
                    _ => Ok(ToolOutput::success("done", "")),
                }
            })
        }
    }

    fn recorder() -> Recorder {
        Recorder {
            calls: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error_with_synthesised_message() {
        let mut queue = CommandQueue::new();
        queue.enqueue(ToolKind::Ffmpeg, vec!["fail".to_string()]);
        let runner = recorder();

        let done = queue.execute_queued(&runner).await;
        assert_eq!(done[0].status, CommandStatus::Error);
        assert_eq!(done[0].error.as_deref(), Some("ffmpeg exited with code 1"));
        assert_eq!(done[0].result.as_ref().map(|r| r.exit_code), Some(1));
    }

    #[tokio::test]
    async fn runner_failure_is_captured_on_the_command() {
        let mut queue = CommandQueue::new();
        queue.enqueue(ToolKind::Ffprobe, vec!["crash".to_string()]);
        queue.enqueue(ToolKind::Ffmpeg, vec!["ok".to_string()]);
        let runner = recorder();

        let done = queue.execute_queued(&runner).await;
        assert_eq!(done[0].status, CommandStatus::Error);
        assert_eq!(done[0].error.as_deref(), Some("process capability unavailable"));
        assert_eq!(done[1].status, CommandStatus::Completed);
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(queue.commands().len(), 2);
    }
}
