use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LockError, LockResult, TreeError};

/// Numeric identity of a client holding locks
pub type UserId = i64;

/// Stable, human-readable identifier of a node in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// Per-node state: fixed shape plus mutable lock bookkeeping
#[derive(Debug, Clone)]
pub struct NodeState {
    pub id: NodeId,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub locked_by: Option<UserId>,
    /// Number of locked nodes strictly below this one
    pub locked_descendant_count: usize,
    /// Indices of the locked nodes strictly below this one
    pub locked_descendants: BTreeSet<usize>,
}

impl NodeState {
    fn new(id: NodeId) -> Self {
        NodeState {
            id,
            parent: None,
            children: Vec::new(),
            locked_by: None,
            locked_descendant_count: 0,
            locked_descendants: BTreeSet::new(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }
}

/// Owns the static hierarchy and the per-node lock state.
///
/// Nodes live in a dense arena indexed in construction order. The shape is
/// fixed once built; only `locked_by`, the descendant counters and the
/// descendant index change, and only through the `commit_*` primitives.
///
/// The store performs no policy checks. Callers validate first; the commit
/// primitives only guarantee that the ancestor bookkeeping stays exact. A
/// bookkeeping contradiction (counter underflow, missing index entry) is a
/// defect and panics.
#[derive(Debug, Clone, Default)]
pub struct TreeStore {
    nodes: Vec<NodeState>,
    index: HashMap<NodeId, usize>,
}

impl TreeStore {
    /// Build an m-ary tree from level-order node names.
    ///
    /// Node `i` gets the children at positions `m*i+1 ..= m*i+m` that exist.
    pub fn from_level_order<S: AsRef<str>>(names: &[S], branching: usize) -> Result<Self, TreeError> {
        if branching == 0 {
            return Err(TreeError::ZeroBranching);
        }

        let mut store = TreeStore::with_names(names.iter().map(|n| n.as_ref()))?;
        let n = store.nodes.len();
        for i in 0..n {
            for j in 1..=branching {
                let child = branching * i + j;
                if child >= n {
                    break;
                }
                store.link(child, i);
            }
        }
        Ok(store)
    }

    /// Build a forest from `(id, parent)` pairs.
    ///
    /// Parents may be declared after their children. Children keep the
    /// order in which they appear in `edges`.
    pub fn from_edges<I, S>(edges: I) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = (S, Option<S>)>,
        S: AsRef<str>,
    {
        let edges: Vec<(S, Option<S>)> = edges.into_iter().collect();
        let mut store = TreeStore::with_names(edges.iter().map(|(id, _)| id.as_ref()))?;

        for (child, (id, parent)) in edges.iter().enumerate() {
            if let Some(parent) = parent {
                let id: &str = id.as_ref();
                let parent: &str = parent.as_ref();
                let parent_idx = store.index.get(parent).copied().ok_or_else(|| {
                    TreeError::UnknownParent {
                        node: id.to_string(),
                        parent: parent.to_string(),
                    }
                })?;
                if parent_idx == child {
                    return Err(TreeError::Cycle(id.to_string()));
                }
                store.link(child, parent_idx);
            }
        }

        store.check_acyclic()?;
        Ok(store)
    }

    fn with_names<'a, I: Iterator<Item = &'a str>>(names: I) -> Result<Self, TreeError> {
        let mut store = TreeStore::default();
        for name in names {
            let id = NodeId::from(name);
            if store.index.contains_key(name) {
                return Err(TreeError::DuplicateNode(name.to_string()));
            }
            store.index.insert(id.clone(), store.nodes.len());
            store.nodes.push(NodeState::new(id));
        }
        Ok(store)
    }

    fn link(&mut self, child: usize, parent: usize) {
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Every parent chain must reach a root within `len` steps.
    fn check_acyclic(&self) -> Result<(), TreeError> {
        for start in 0..self.nodes.len() {
            let mut steps = 0;
            let mut curr = self.nodes[start].parent;
            while let Some(p) = curr {
                steps += 1;
                if steps > self.nodes.len() {
                    return Err(TreeError::Cycle(self.nodes[start].id.to_string()));
                }
                curr = self.nodes[p].parent;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolve an id to its arena index
    pub fn index_of(&self, id: &str) -> LockResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| LockError::NodeNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Node state by arena index. Panics on an index this store never issued.
    pub fn state(&self, idx: usize) -> &NodeState {
        &self.nodes[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeState> {
        self.nodes.iter()
    }

    /// Indices of nodes without a parent, in construction order
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| i)
    }

    /// Strict ancestors of `idx`, nearest first
    pub fn ancestors(&self, idx: usize) -> Ancestors<'_> {
        Ancestors {
            store: self,
            next: self.nodes[idx].parent,
        }
    }

    pub fn parent(&self, id: &str) -> LockResult<Option<&NodeId>> {
        let idx = self.index_of(id)?;
        Ok(self.nodes[idx].parent.map(|p| &self.nodes[p].id))
    }

    pub fn children(&self, id: &str) -> LockResult<Vec<&NodeId>> {
        let idx = self.index_of(id)?;
        Ok(self.nodes[idx].children.iter().map(|&c| &self.nodes[c].id).collect())
    }

    pub fn locked_by(&self, id: &str) -> LockResult<Option<UserId>> {
        let idx = self.index_of(id)?;
        Ok(self.nodes[idx].locked_by)
    }

    pub fn locked_descendant_count(&self, id: &str) -> LockResult<usize> {
        let idx = self.index_of(id)?;
        Ok(self.nodes[idx].locked_descendant_count)
    }

    /// Ids of locked nodes below `id`, in construction order
    pub fn locked_descendants(&self, id: &str) -> LockResult<Vec<&NodeId>> {
        let idx = self.index_of(id)?;
        Ok(self.nodes[idx]
            .locked_descendants
            .iter()
            .map(|&d| &self.nodes[d].id)
            .collect())
    }

    /// Nearest locked strict ancestor, if any
    pub fn locked_ancestor(&self, idx: usize) -> Option<usize> {
        self.ancestors(idx).find(|&a| self.nodes[a].is_locked())
    }

    /// Set `locked_by` on `idx` and count it on every strict ancestor.
    pub fn commit_lock(&mut self, idx: usize, uid: UserId) {
        assert!(
            self.nodes[idx].locked_by.is_none(),
            "commit_lock on already locked node {}",
            self.nodes[idx].id
        );
        self.nodes[idx].locked_by = Some(uid);

        let mut curr = self.nodes[idx].parent;
        while let Some(a) = curr {
            let node = &mut self.nodes[a];
            node.locked_descendant_count += 1;
            node.locked_descendants.insert(idx);
            curr = node.parent;
        }
    }

    /// Clear `locked_by` on `idx` and uncount it on every strict ancestor.
    /// Returns the previous holder.
    pub fn commit_unlock(&mut self, idx: usize) -> UserId {
        let Some(uid) = self.nodes[idx].locked_by.take() else {
            panic!("commit_unlock on unlocked node {}", self.nodes[idx].id);
        };

        let mut curr = self.nodes[idx].parent;
        while let Some(a) = curr {
            self.uncount(a, idx, 1);
            curr = self.nodes[a].parent;
        }
        uid
    }

    /// Replace the locks on `absorbed` (all strictly below `target`) with a
    /// single lock on `target`.
    ///
    /// Nodes between each absorbed lock and the target lose that lock; the
    /// target's own counter drops to zero; every node above the target is
    /// visited once and its counter moves by `1 - absorbed.len()`.
    pub fn commit_upgrade(&mut self, target: usize, uid: UserId, absorbed: &[usize]) {
        assert!(
            self.nodes[target].locked_by.is_none(),
            "commit_upgrade on already locked node {}",
            self.nodes[target].id
        );

        // No writes until every absorbed node has been checked.
        for &d in absorbed {
            if !self.nodes[d].is_locked() {
                panic!("upgrade absorbed unlocked node {}", self.nodes[d].id);
            }
            if !self.ancestors(d).any(|a| a == target) {
                panic!(
                    "upgrade absorbed node {} outside subtree of {}",
                    self.nodes[d].id, self.nodes[target].id
                );
            }
            if let Some(a) = self.ancestors(d).find(|&a| !self.nodes[a].locked_descendants.contains(&d)) {
                panic!("descendant index of {} missing absorbed lock", self.nodes[a].id);
            }
        }

        for &d in absorbed {
            self.nodes[d].locked_by = None;
            let mut curr = self.nodes[d].parent;
            while let Some(a) = curr {
                if a == target {
                    break;
                }
                self.uncount(a, d, 1);
                curr = self.nodes[a].parent;
            }
        }

        let node = &mut self.nodes[target];
        for d in absorbed {
            node.locked_descendants.remove(d);
        }
        node.locked_descendant_count = node
            .locked_descendant_count
            .checked_sub(absorbed.len())
            .unwrap_or_else(|| panic!("locked descendant counter underflow on {}", node.id));
        node.locked_by = Some(uid);

        let mut curr = node.parent;
        while let Some(a) = curr {
            let node = &mut self.nodes[a];
            for d in absorbed {
                if !node.locked_descendants.remove(d) {
                    panic!("descendant index of {} missing absorbed lock", node.id);
                }
            }
            node.locked_descendants.insert(target);
            node.locked_descendant_count = (node.locked_descendant_count + 1)
                .checked_sub(absorbed.len())
                .unwrap_or_else(|| panic!("locked descendant counter underflow on {}", node.id));
            curr = node.parent;
        }
    }

    fn uncount(&mut self, ancestor: usize, locked: usize, by: usize) {
        let node = &mut self.nodes[ancestor];
        if !node.locked_descendants.remove(&locked) {
            panic!("descendant index of {} missing locked node", node.id);
        }
        node.locked_descendant_count = node
            .locked_descendant_count
            .checked_sub(by)
            .unwrap_or_else(|| panic!("locked descendant counter underflow on {}", node.id));
    }

    /// Recount everything from `locked_by` alone and compare with the
    /// incremental bookkeeping. Also checks shape consistency and that the
    /// locked set is an antichain.
    pub fn verify(&self) -> Result<(), String> {
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(p) = node.parent {
                if !self.nodes[p].children.contains(&i) {
                    return Err(format!("{} missing from children of its parent", node.id));
                }
            }
            for &c in &node.children {
                if self.nodes[c].parent != Some(i) {
                    return Err(format!("child {} does not point back to {}", self.nodes[c].id, node.id));
                }
            }
        }

        let mut expected: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            if !node.is_locked() {
                continue;
            }
            for a in self.ancestors(i) {
                if self.nodes[a].is_locked() {
                    return Err(format!("{} and its ancestor {} are both locked", node.id, self.nodes[a].id));
                }
                expected[a].insert(i);
            }
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.locked_descendants != expected[i] {
                return Err(format!("descendant index of {} is stale", node.id));
            }
            if node.locked_descendant_count != expected[i].len() {
                return Err(format!(
                    "{} counts {} locked descendants, actual {}",
                    node.id,
                    node.locked_descendant_count,
                    expected[i].len()
                ));
            }
        }
        Ok(())
    }
}

/// Iterator over strict ancestors, nearest first
pub struct Ancestors<'a> {
    store: &'a TreeStore,
    next: Option<usize>,
}

impl Iterator for Ancestors<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let curr = self.next?;
        self.next = self.store.nodes[curr].parent;
        Some(curr)
    }
}
