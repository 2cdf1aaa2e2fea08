//! The `bash_exec` tool: the entire contract is the command sandbox.

use serde_json::json;
use warden_types::{Capability, ToolCall};

use super::{ToolCtx, ToolOutput, required_str};
use crate::anchor::scrub;
use crate::exec::spawn_argv;
use crate::registry::{ToolDescriptor, ToolFut, ToolHandler};
use crate::ToolError;

#[derive(Debug, Default)]
pub struct BashExecTool;

impl ToolHandler for BashExecTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "bash_exec",
            capability: Capability::Action,
            description: "Validate a command through the sandbox and execute it directly",
        }
    }

    fn invoke<'a>(&'a self, call: &'a ToolCall, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let command = required_str(call, 0, "command")?;
            if command.trim().is_empty() {
                return Err(ToolError::BadArgs {
                    message: "bash_exec: command must not be empty".to_string(),
                });
            }

            // Phases 0-3; the accepted argv is executed verbatim.
            let argv = ctx.command_sandbox.validate(&command)?;
            let program = ctx.binaries.program(&argv[0]);
            let env = ctx.child_env();

            let outcome = spawn_argv(
                &program,
                &argv[1..],
                &ctx.working_dir,
                &env,
                ctx.limits,
            )
            .await?;

            if outcome.timed_out {
                return Err(ToolError::Timeout {
                    tool: "bash_exec".to_string(),
                    elapsed: ctx.limits.wall_clock,
                });
            }

            let mut output = scrub(&outcome.stdout);
            let stderr = scrub(&outcome.stderr);
            if !stderr.trim().is_empty() {
                if !output.is_empty() {
                    output.push_str("\n\n");
                }
                output.push_str("[stderr]\n");
                output.push_str(&stderr);
            }

            Ok(ToolOutput::data(json!({
                "exit_code": outcome.exit_code,
                "output": output,
            }))
            .with_truncated(outcome.truncated))
        })
    }
}
