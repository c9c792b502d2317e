//! Built-in tools and the default tree that wires them.

mod hashtag;
mod query;
mod text_response;

use std::sync::Arc;

pub use hashtag::HashtagAggregateTool;
pub use query::QueryTool;
pub use text_response::TextResponseTool;

use crate::error::TreeError;
use crate::tool::Tool;
use crate::tree::DecisionTree;

pub const ROOT_NODE: &str = "base";
pub const RESPOND_NODE: &str = "respond";

/// `base` offers the retrieval tools and a direct answer; every retrieval
/// tool continues at `respond`, which only answers.
pub fn default_tree() -> Result<DecisionTree, TreeError> {
    let mut tree = DecisionTree::new(
        ROOT_NODE,
        "Choose how to gather what the user needs, or answer directly when no data is needed.",
    );
    tree.add_branch(
        ROOT_NODE,
        RESPOND_NODE,
        "Write the answer from the gathered results.",
    )?;

    let retrieval: [Arc<dyn Tool>; 3] = [
        Arc::new(QueryTool::query()),
        Arc::new(QueryTool::aggregate()),
        Arc::new(HashtagAggregateTool::new()),
    ];
    for tool in retrieval {
        let name = tool.name().to_string();
        tree.add_tool(ROOT_NODE, tool)?;
        tree.descend_after(ROOT_NODE, &name, Some(RESPOND_NODE))?;
    }
    tree.add_tool(ROOT_NODE, Arc::new(TextResponseTool::new()))?;
    tree.add_tool(RESPOND_NODE, Arc::new(TextResponseTool::new()))?;
    Ok(tree)
}
