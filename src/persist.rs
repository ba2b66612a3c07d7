use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::tree::{NodeId, TreeStore, UserId};

/// One node as stored: shape plus holder, no derived counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub locked_by: Option<UserId>,
}

/// Serializable form of a lock tree.
///
/// Only the hierarchy and `locked_by` are kept. Descendant counters and the
/// descendant index are rebuilt through the normal commit path on restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTree {
    pub nodes: Vec<PersistedNode>,
}

impl PersistedTree {
    pub fn from_tree(tree: &TreeStore) -> Self {
        let nodes = tree
            .iter()
            .map(|n| PersistedNode {
                id: n.id.clone(),
                parent: n.parent.map(|p| tree.state(p).id.clone()),
                locked_by: n.locked_by,
            })
            .collect();
        PersistedTree { nodes }
    }

    /// Rebuild the tree and replay its locks.
    ///
    /// Fails if two stored locks sit on the same root-to-leaf path.
    pub fn restore(&self) -> Result<TreeStore, TreeError> {
        let mut tree = TreeStore::from_edges(
            self.nodes
                .iter()
                .map(|n| (n.id.as_str(), n.parent.as_ref().map(|p| p.as_str()))),
        )?;

        for (idx, node) in self.nodes.iter().enumerate() {
            let Some(uid) = node.locked_by else {
                continue;
            };
            let conflict = tree
                .locked_ancestor(idx)
                .or_else(|| tree.state(idx).locked_descendants.iter().next().copied());
            if let Some(other) = conflict {
                return Err(TreeError::ConflictingLocks {
                    node: node.id.to_string(),
                    other: tree.state(other).id.to_string(),
                });
            }
            tree.commit_lock(idx, uid);
        }
        Ok(tree)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).map_err(|e| anyhow::anyhow!("Failed to parse persisted tree: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_rebuilds_counters() {
        let mut tree = TreeStore::from_level_order(&["W", "A", "B", "C", "D"], 2).unwrap();
        for name in ["C", "D"] {
            let idx = tree.index_of(name).unwrap();
            tree.commit_lock(idx, 3);
        }

        let json = PersistedTree::from_tree(&tree).to_json().unwrap();
        let restored = PersistedTree::from_json(&json).unwrap().restore().unwrap();

        assert_eq!(restored.locked_by("C").unwrap(), Some(3));
        assert_eq!(restored.locked_descendant_count("A").unwrap(), 2);
        assert_eq!(restored.locked_descendant_count("W").unwrap(), 2);
        assert!(restored.verify().is_ok());
    }

    #[test]
    fn test_restore_rejects_nested_locks() {
        let persisted = PersistedTree {
            nodes: vec![
                PersistedNode { id: "root".into(), parent: None, locked_by: Some(1) },
                PersistedNode { id: "leaf".into(), parent: Some("root".into()), locked_by: Some(2) },
            ],
        };
        assert_eq!(
            persisted.restore().unwrap_err(),
            TreeError::ConflictingLocks { node: "leaf".into(), other: "root".into() }
        );
    }

    #[test]
    fn test_restore_rejects_descendant_declared_first() {
        let persisted = PersistedTree {
            nodes: vec![
                PersistedNode { id: "leaf".into(), parent: Some("root".into()), locked_by: Some(2) },
                PersistedNode { id: "root".into(), parent: None, locked_by: Some(1) },
            ],
        };
        assert_eq!(
            persisted.restore().unwrap_err(),
            TreeError::ConflictingLocks { node: "root".into(), other: "leaf".into() }
        );
    }
}
