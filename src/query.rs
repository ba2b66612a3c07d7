use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::tree::{NodeId, TreeStore, UserId};

/// Read-only view of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    pub name: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub locked_by: Option<UserId>,
}

/// Immutable copy of the whole tree taken from a single committed state.
///
/// `generation` identifies that state: it is the number of successful
/// commits applied before the copy was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub generation: u64,
    pub roots: Vec<NodeId>,
    pub tree: BTreeMap<NodeId, NodeView>,
}

impl TreeSnapshot {
    /// Copy the lock-relevant state out of `store`
    pub fn capture(store: &TreeStore, generation: u64) -> Self {
        let id_of = |idx: usize| store.state(idx).id.clone();

        let tree = store
            .iter()
            .map(|node| {
                let view = NodeView {
                    name: node.id.clone(),
                    parent: node.parent.map(id_of),
                    children: node.children.iter().copied().map(id_of).collect(),
                    locked_by: node.locked_by,
                };
                (node.id.clone(), view)
            })
            .collect();

        TreeSnapshot {
            generation,
            roots: store.roots().map(id_of).collect(),
            tree,
        }
    }

    /// Check if snapshot is still current (no commit since it was taken)
    pub fn is_current(&self, current_generation: u64) -> bool {
        self.generation == current_generation
    }

    pub fn get(&self, id: &str) -> Option<&NodeView> {
        self.tree.get(id)
    }

    /// Locked nodes and their holders, sorted by id
    pub fn locked_nodes(&self) -> Vec<(&NodeId, UserId)> {
        self.tree
            .values()
            .filter_map(|v| v.locked_by.map(|uid| (&v.name, uid)))
            .collect()
    }

    /// Indented outline, one node per line, children under their parent
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<(&NodeId, usize)> = self.roots.iter().rev().map(|r| (r, 0)).collect();

        while let Some((id, level)) = stack.pop() {
            let Some(view) = self.tree.get(id) else {
                continue;
            };
            let _ = write!(out, "{}{}", "  ".repeat(level), id);
            if let Some(uid) = view.locked_by {
                let _ = write!(out, "  [locked by {}]", uid);
            }
            out.push('\n');
            for child in view.children.iter().rev() {
                stack.push((child, level + 1));
            }
        }
        out
    }
}
