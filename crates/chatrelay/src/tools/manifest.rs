use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::models::tool::Tool;

/// Who executes a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    /// Declared by the browser, which also runs it
    Frontend,
    /// Offered by a configured tool server, run by the relay
    Server { server: String },
}

impl fmt::Display for ToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolSource::Frontend => write!(f, "frontend"),
            ToolSource::Server { server } => write!(f, "server '{}'", server),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolEntry {
    pub tool: Tool,
    pub source: ToolSource,
}

/// Tools keyed by name, in insertion order.
///
/// Inserting a name that already exists replaces the earlier entry in place,
/// so the source merged last wins.
#[derive(Debug, Clone, Default)]
pub struct ToolManifest {
    entries: Vec<ToolEntry>,
    index: HashMap<String, usize>,
}

impl ToolManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frontend(tools: Vec<Tool>) -> Self {
        let mut manifest = Self::new();
        for tool in tools {
            manifest.insert(tool, ToolSource::Frontend);
        }
        manifest
    }

    /// Add a tool, returning the entry it replaced
    pub fn insert(&mut self, tool: Tool, source: ToolSource) -> Option<ToolEntry> {
        let entry = ToolEntry { tool, source };
        let existing = self.index.get(&entry.tool.name).copied();
        match existing {
            Some(position) => {
                let previous = std::mem::replace(&mut self.entries[position], entry);
                warn!(
                    tool = %previous.tool.name,
                    previous = %previous.source,
                    replacement = %self.entries[position].source,
                    "tool name collision, keeping the later definition"
                );
                Some(previous)
            }
            None => {
                self.index
                    .insert(entry.tool.name.clone(), self.entries.len());
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn extend_from_server(&mut self, server: &str, tools: Vec<Tool>) {
        for tool in tools {
            self.insert(
                tool,
                ToolSource::Server {
                    server: server.to_string(),
                },
            );
        }
    }

    /// Merge another manifest on top of this one
    pub fn merge(&mut self, other: ToolManifest) {
        for entry in other.entries {
            self.insert(entry.tool, entry.source);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.index.get(name).map(|&position| &self.entries[position])
    }

    /// The tools to advertise to the model
    pub fn tools(&self) -> Vec<Tool> {
        self.entries.iter().map(|e| e.tool.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.tool.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
