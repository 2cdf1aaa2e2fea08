//! Per-turn tool dispatch.
//!
//! Calls execute strictly in emission order; provenance transitions observed
//! by call *k* are visible to calls *k+1..n*. Internal errors are contained
//! at this boundary and reported as `internal_error` without ending the
//! session.

use futures_util::FutureExt;

use warden_types::{ErrorKind, ToolResult, frame_result};

use crate::anchor::Anchorer;
use crate::arbiter::{PermissionArbiter, Verdict};
use crate::audit::{AuditEvent, AuditLog};
use crate::protocol::{self, Extracted};
use crate::registry::ToolRegistry;
use crate::tools::ToolCtx;
use crate::turn::TurnContext;
use crate::ToolError;

/// One dispatched call and its framed result.
#[derive(Debug)]
pub struct CallRecord {
    pub tool: String,
    pub result: ToolResult,
    pub framed: String,
}

/// Owns the registry and all cross-cutting defenses.
pub struct Dispatcher {
    registry: ToolRegistry,
    arbiter: PermissionArbiter,
    anchorer: Anchorer,
    audit: AuditLog,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: ToolRegistry, arbiter: PermissionArbiter, audit: AuditLog) -> Self {
        Self {
            registry,
            arbiter,
            anchorer: Anchorer::new(),
            audit,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn arbiter_mut(&mut self) -> &mut PermissionArbiter {
        &mut self.arbiter
    }

    /// Extract and execute every tool call in one model response.
    pub async fn run_turn(
        &self,
        model_output: &str,
        turn: &mut TurnContext,
        ctx: &mut ToolCtx,
    ) -> Vec<CallRecord> {
        let mut records = Vec::new();
        for extracted in protocol::extract(model_output) {
            match extracted {
                Extracted::Malformed(issue) => {
                    let tool = issue.name.clone().unwrap_or_else(|| "unknown".to_string());
                    let result = ToolResult::failure(ErrorKind::ParseError, issue.message.clone());
                    self.audit.emit(
                        &AuditEvent::new("parse_error")
                            .tool(&tool, turn.next_call_index())
                            .error(ErrorKind::ParseError)
                            .detail(issue.message),
                    );
                    let framed = frame_result(&tool, &result);
                    records.push(CallRecord {
                        tool,
                        result,
                        framed,
                    });
                }
                Extracted::Call(call) => {
                    let index = turn.next_call_index();
                    let result = self.execute_call(&call, index, turn, ctx).await;
                    turn.record(index, &call.name, result.ok);
                    let framed = frame_result(&call.name, &result);
                    records.push(CallRecord {
                        tool: call.name,
                        result,
                        framed,
                    });
                }
            }
        }
        records
    }

    async fn execute_call(
        &self,
        call: &warden_types::ToolCall,
        index: u32,
        turn: &mut TurnContext,
        ctx: &mut ToolCtx,
    ) -> ToolResult {
        let handler = match self.registry.lookup(&call.name) {
            Ok(handler) => handler,
            Err(e) => return self.deny(&call.name, index, &e),
        };
        let descriptor = handler.descriptor();

        let summary = call.render();
        if self.arbiter.arbitrate(descriptor.name, descriptor.capability, &summary)
            == Verdict::Denied
        {
            return self.deny(
                descriptor.name,
                index,
                &ToolError::PermissionDenied {
                    tool: descriptor.name.to_string(),
                },
            );
        }

        if descriptor.capability.is_action() && turn.tainted() {
            tracing::warn!(
                tool = descriptor.name,
                origin = turn.taint_origin(),
                "provenance gate refused action tool"
            );
            return self.deny(
                descriptor.name,
                index,
                &ToolError::ProvenanceBlocked {
                    tool: descriptor.name.to_string(),
                },
            );
        }

        let invocation = std::panic::AssertUnwindSafe(handler.invoke(call, ctx));
        let outcome = match invocation.catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(tool = descriptor.name, "tool handler panicked");
                Err(ToolError::ExecutionFailed {
                    tool: descriptor.name.to_string(),
                    message: "handler panicked".to_string(),
                })
            }
        };

        match outcome {
            Ok(mut output) => {
                if let Some(origin) = output.origin.take() {
                    output.data = match std::mem::take(&mut output.data) {
                        serde_json::Value::String(content) => {
                            serde_json::Value::String(self.anchorer.apply(&origin, &content))
                        }
                        other => other,
                    };
                    if output.untrusted {
                        turn.mark_tainted(origin.clone());
                        self.audit.emit(
                            &AuditEvent::new("taint")
                                .tool(descriptor.name, index)
                                .detail(origin),
                        );
                    }
                }
                if let Some(bytes) = output.bytes_read {
                    turn.add_bytes_read(bytes);
                }
                let mut result = ToolResult::success(output.data)
                    .with_truncated(output.truncated);
                if let Some(bytes) = output.bytes_read {
                    result = result.with_bytes_read(bytes);
                }
                self.audit.emit(
                    &AuditEvent::new("tool_call")
                        .tool(descriptor.name, index)
                        .outcome("ok"),
                );
                result
            }
            Err(e) => self.deny(descriptor.name, index, &e),
        }
    }

    /// Report a failure: audited, framed, never thrown.
    fn deny(&self, tool: &str, index: u32, error: &ToolError) -> ToolResult {
        let kind = error.kind();
        tracing::debug!(tool, kind = kind.as_str(), error = %error, "tool call refused");
        self.audit.emit(
            &AuditEvent::new("denial")
                .tool(tool, index)
                .outcome("refused")
                .error(kind)
                .detail(error.to_string()),
        );
        ToolResult::failure(kind, error.to_string())
    }
}
