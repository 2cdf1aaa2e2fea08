//! Stdio session loop.
//!
//! The model backend (or an operator driving the runtime by hand) writes
//! model output on stdin; framed tool results come back on stdout. Blocks
//! are terminated by an empty line. Operator commands start with `/` and
//! mark conversation boundaries, so `/reset` is what clears the provenance
//! flag - never the runtime itself mid-conversation.

use std::io::{BufRead, Write};

use warden_engine::Dispatcher;
use warden_engine::tools::ToolCtx;
use warden_engine::turn::TurnContext;
use warden_sandbox::PathMode;

pub struct Session {
    dispatcher: Dispatcher,
    ctx: ToolCtx,
    turn: TurnContext,
}

impl Session {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, ctx: ToolCtx) -> Self {
        Self {
            dispatcher,
            ctx,
            turn: TurnContext::new(),
        }
    }

    pub fn run(mut self) -> std::io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        eprintln!("warden ready; blocks end with an empty line, /help for commands");
        let stdin = std::io::stdin();
        let mut block = String::new();
        for line in stdin.lock().lines() {
            let line = line?;
            if let Some(command) = line.strip_prefix('/') {
                if !block.trim().is_empty() {
                    runtime.block_on(self.dispatch_block(&block));
                    block.clear();
                }
                if !self.operator_command(command) {
                    break;
                }
                continue;
            }
            if line.trim().is_empty() {
                if !block.trim().is_empty() {
                    runtime.block_on(self.dispatch_block(&block));
                    block.clear();
                }
                continue;
            }
            block.push_str(&line);
            block.push('\n');
        }
        if !block.trim().is_empty() {
            runtime.block_on(self.dispatch_block(&block));
        }
        Ok(())
    }

    /// Dispatch one model-output block, racing operator interrupt.
    ///
    /// On Ctrl-C the in-flight call is dropped (its child process group is
    /// killed by the executor guard) and no partial result is emitted.
    async fn dispatch_block(&mut self, block: &str) {
        let records = tokio::select! {
            records = self.dispatcher.run_turn(block, &mut self.turn, &mut self.ctx) => records,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("interrupted; partial tool result discarded");
                return;
            }
        };
        let mut stdout = std::io::stdout().lock();
        for record in &records {
            if let Some(kind) = record.result.kind() {
                let detail = record.result.detail.as_deref().unwrap_or("");
                eprintln!("denied {}: {} ({detail})", record.tool, kind.as_str());
            }
            let _ = writeln!(stdout, "{}", record.framed);
        }
        let _ = stdout.flush();
    }

    /// Handle an operator command; returns false to end the session.
    fn operator_command(&mut self, command: &str) -> bool {
        let mut parts = command.split_whitespace();
        match parts.next() {
            Some("quit" | "exit") => return false,
            Some("reset") => {
                // New operator message: the per-turn taint flag clears here.
                self.turn.reset();
                eprintln!("turn context reset");
            }
            Some("trust") => match parts.next() {
                Some(raw) => match self.ctx.paths.validate(raw, PathMode::Read) {
                    Ok(canonical) => {
                        eprintln!("trusted: {}", canonical.display());
                        self.ctx.trust.trust(canonical);
                    }
                    Err(e) => eprintln!("cannot trust {raw}: {e}"),
                },
                None => eprintln!("usage: /trust <path>"),
            },
            Some("undo") => {
                let result = {
                    let mut backups =
                        self.ctx.backups.lock().unwrap_or_else(|p| p.into_inner());
                    backups.undo()
                };
                match result {
                    Ok(path) => eprintln!("restored: {}", path.display()),
                    Err(e) => eprintln!("undo failed: {e}"),
                }
            }
            Some("tools") => {
                for descriptor in self.dispatcher.registry().descriptors() {
                    eprintln!("{:<14} {}", descriptor.name, descriptor.description);
                }
            }
            Some("help") | None => {
                eprintln!("/reset  new operator message (clears provenance)");
                eprintln!("/trust <path>  mark a file trusted for this session");
                eprintln!("/undo   restore the most recent write or edit");
                eprintln!("/tools  list registered tools");
                eprintln!("/quit   end the session");
            }
            Some(other) => eprintln!("unknown command: /{other}"),
        }
        true
    }
}
