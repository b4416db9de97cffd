//! Catalog of tools discovered from a worker.

use super::channel::DispatchChannel;
use super::schema::ToolDescriptor;
use crate::error::{ProtocolError, Result, SpliceError};
use std::collections::HashMap;
use tracing::info;

/// Ordered, name-unique set of tool descriptors.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Run discovery on `channel` and build the registry.
    ///
    /// A catalog with duplicate names is rejected and leaves the channel
    /// unable to carry invocations.
    pub async fn discover(channel: &DispatchChannel) -> Result<Self> {
        let registry = channel.discover_with(Self::from_descriptors).await?;
        info!("Discovered {} tool(s)", registry.len());
        Ok(registry)
    }

    /// Build a registry, preserving order.
    pub fn from_descriptors(tools: Vec<ToolDescriptor>) -> Result<Self> {
        let mut index = HashMap::with_capacity(tools.len());
        for (position, tool) in tools.iter().enumerate() {
            if index.insert(tool.name.clone(), position).is_some() {
                return Err(ProtocolError::DuplicateTool(tool.name.clone()).into());
            }
        }
        Ok(Self { tools, index })
    }

    /// Find a tool by exact (case-sensitive) name.
    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor> {
        self.index
            .get(name)
            .map(|&position| &self.tools[position])
            .ok_or_else(|| SpliceError::UnknownTool(name.to_string()))
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
