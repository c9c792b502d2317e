//! Decision tree: branches, their tools, and which branch follows a tool.
//!
//! ```text
//!   base ─┬─ query ───────────► respond ── text_response (terminal)
//!         ├─ aggregate ───────► respond
//!         ├─ hashtag_aggregate ► respond
//!         └─ text_response (terminal)
//! ```
//!
//! Registration is idempotent: a tool registered again under the same name
//! replaces the earlier instance in place, and re-adding an existing branch
//! under the same parent is a no-op.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::TreeError;
use crate::tool::Tool;

// ============================================================================
// Nodes
// ============================================================================

/// A tool offered at a node, and the branch to descend into after it.
#[derive(Clone)]
pub struct ToolEntry {
    pub tool: Arc<dyn Tool>,
    pub child: Option<String>,
}

impl fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolEntry")
            .field("tool", &self.tool.name())
            .field("child", &self.child)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DecisionNode {
    pub id: String,
    pub parent: Option<String>,
    pub description: String,
    tools: Vec<ToolEntry>,
    children: Vec<String>,
}

impl DecisionNode {
    fn new(id: &str, parent: Option<&str>, description: &str) -> Self {
        Self {
            id: id.to_string(),
            parent: parent.map(str::to_string),
            description: description.to_string(),
            tools: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Tools in registration order.
    pub fn tools(&self) -> &[ToolEntry] {
        &self.tools
    }

    pub fn tool(&self, name: &str) -> Option<&ToolEntry> {
        self.tools.iter().find(|e| e.tool.name() == name)
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }
}

// ============================================================================
// Tree
// ============================================================================

#[derive(Debug, Clone)]
pub struct DecisionTree {
    root: String,
    nodes: HashMap<String, DecisionNode>,
}

impl DecisionTree {
    pub fn new(root: impl Into<String>, description: impl Into<String>) -> Self {
        let root = root.into();
        let mut nodes = HashMap::new();
        nodes.insert(root.clone(), DecisionNode::new(&root, None, &description.into()));
        Self { root, nodes }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn node(&self, id: &str) -> Option<&DecisionNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut DecisionNode, TreeError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::UnknownNode(id.to_string()))
    }

    /// Register `tool` at `node`, replacing any tool with the same name.
    /// A replaced tool keeps its position and designated child.
    pub fn add_tool(&mut self, node: &str, tool: Arc<dyn Tool>) -> Result<(), TreeError> {
        let target = self.node_mut(node)?;
        let name = tool.name().to_string();
        match target.tools.iter_mut().find(|e| e.tool.name() == name) {
            Some(entry) => {
                tracing::debug!(node = %node, tool = %name, "replacing registered tool");
                entry.tool = tool;
            }
            None => target.tools.push(ToolEntry { tool, child: None }),
        }
        Ok(())
    }

    pub fn remove_tool(&mut self, node: &str, name: &str) -> Result<Option<Arc<dyn Tool>>, TreeError> {
        let target = self.node_mut(node)?;
        let removed = target
            .tools
            .iter()
            .position(|e| e.tool.name() == name)
            .map(|idx| target.tools.remove(idx).tool);
        Ok(removed)
    }

    /// Add branch `child` under `parent`. Adding the same branch under the
    /// same parent again is a no-op; under a different parent it is an error.
    pub fn add_branch(
        &mut self,
        parent: &str,
        child: &str,
        description: impl Into<String>,
    ) -> Result<(), TreeError> {
        if !self.nodes.contains_key(parent) {
            return Err(TreeError::UnknownNode(parent.to_string()));
        }
        if let Some(existing) = self.nodes.get(child) {
            return match existing.parent.as_deref() {
                Some(p) if p == parent => Ok(()),
                other => Err(TreeError::DuplicateNode {
                    node: child.to_string(),
                    parent: other.unwrap_or("<root>").to_string(),
                }),
            };
        }
        self.nodes.insert(
            child.to_string(),
            DecisionNode::new(child, Some(parent), &description.into()),
        );
        self.node_mut(parent)?.children.push(child.to_string());
        Ok(())
    }

    /// After `tool` runs at `node`, continue at `child` (a direct child of
    /// `node`). `None` makes the tool end the request.
    pub fn descend_after(
        &mut self,
        node: &str,
        tool: &str,
        child: Option<&str>,
    ) -> Result<(), TreeError> {
        let target = self.node_mut(node)?;
        if let Some(child) = child {
            if !target.children.iter().any(|c| c == child) {
                return Err(TreeError::UnknownChild {
                    node: node.to_string(),
                    tool: tool.to_string(),
                    child: child.to_string(),
                });
            }
        }
        let entry = target
            .tools
            .iter_mut()
            .find(|e| e.tool.name() == tool)
            .ok_or_else(|| TreeError::InvalidToolSelection {
                node: node.to_string(),
                tool: tool.to_string(),
                reason: "tool is not registered at this node".to_string(),
            })?;
        entry.child = child.map(str::to_string);
        Ok(())
    }
}

// ============================================================================
// Published Tree
// ============================================================================

/// Shared handle over the current tree. Edits clone the tree, apply the
/// change and swap it in; a request keeps the tree it started with.
#[derive(Debug)]
pub struct TreeHandle {
    current: RwLock<Arc<DecisionTree>>,
}

impl TreeHandle {
    pub fn new(tree: DecisionTree) -> Self {
        Self {
            current: RwLock::new(Arc::new(tree)),
        }
    }

    pub fn current(&self) -> Arc<DecisionTree> {
        Arc::clone(&self.current.read())
    }

    pub fn update<F>(&self, edit: F) -> Result<(), TreeError>
    where
        F: FnOnce(&mut DecisionTree) -> Result<(), TreeError>,
    {
        let mut guard = self.current.write();
        let mut next = DecisionTree::clone(&guard);
        edit(&mut next)?;
        *guard = Arc::new(next);
        Ok(())
    }

    pub fn register_tool(&self, node: &str, tool: Arc<dyn Tool>) -> Result<(), TreeError> {
        self.update(|tree| tree.add_tool(node, tool))
    }

    pub fn register_branch(
        &self,
        parent: &str,
        child: &str,
        description: &str,
    ) -> Result<(), TreeError> {
        self.update(|tree| tree.add_branch(parent, child, description))
    }
}
