//! Closed registry of tool descriptors.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use warden_types::{Capability, ToolCall};

use crate::ToolError;
use crate::tools::{ToolCtx, ToolOutput};

/// Tool execution future type alias.
pub type ToolFut<'a> = Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + 'a>>;

/// Static identity of a registered tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub capability: Capability,
    pub description: &'static str,
}

/// The capability interface every tool implements.
///
/// Handlers receive validated arguments plus the validators in `ToolCtx`;
/// they must never perform filesystem or process operations without routing
/// through those components.
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    fn descriptor(&self) -> ToolDescriptor;
    fn invoke<'a>(&'a self, call: &'a ToolCall, ctx: &'a mut ToolCtx) -> ToolFut<'a>;
}

/// Closed registry, frozen after boot.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<&'static str, Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn register(&mut self, handler: Box<dyn ToolHandler>) -> Result<(), ToolError> {
        let name = handler.descriptor().name;
        if self.handlers.contains_key(name) {
            return Err(ToolError::DuplicateTool {
                name: name.to_string(),
            });
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn ToolHandler, ToolError> {
        self.handlers
            .get(name)
            .map(std::convert::AsRef::as_ref)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })
    }

    /// Descriptors sorted by name, for prompts and audit context.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut out: Vec<ToolDescriptor> =
            self.handlers.values().map(|h| h.descriptor()).collect();
        out.sort_by(|a, b| a.name.cmp(b.name));
        out
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
