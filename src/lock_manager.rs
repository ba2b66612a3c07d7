use crate::error::{LockError, LockResult};
use crate::operation::Operation;
use crate::tree::{TreeStore, UserId};

/// Lock manager for exclusive node locks over a fixed hierarchy
///
/// Each operation validates every precondition against the current tree
/// first and only then calls into the store's commit primitives, so a
/// rejected request leaves the tree untouched.
///
/// Cost per call: lock and unlock walk the ancestor chain once for the check
/// and once for the commit. Upgrade is proportional to the number of locked
/// descendants times their distance to the target, never to subtree size,
/// because the descendant index already names them.
#[derive(Debug, Clone)]
pub struct LockManager {
    tree: TreeStore,
}

impl LockManager {
    pub fn new(tree: TreeStore) -> Self {
        LockManager { tree }
    }

    pub fn tree(&self) -> &TreeStore {
        &self.tree
    }

    /// Dispatch one operation
    pub fn apply(&mut self, op: Operation, node: &str, uid: UserId) -> LockResult<()> {
        match op {
            Operation::Lock => self.lock(node, uid),
            Operation::Unlock => self.unlock(node, uid),
            Operation::Upgrade => self.upgrade(node, uid).map(|_| ()),
        }
    }

    /// Lock `node` for `uid`
    pub fn lock(&mut self, node: &str, uid: UserId) -> LockResult<()> {
        let idx = self.tree.index_of(node)?;
        let state = self.tree.state(idx);

        if state.is_locked() {
            return Err(LockError::AlreadyLocked);
        }
        self.check_ancestors(idx)?;
        if state.locked_descendant_count > 0 {
            return Err(LockError::DescendantLocked);
        }

        self.tree.commit_lock(idx, uid);
        log::debug!("locked {} for user {}", node, uid);
        Ok(())
    }

    /// Release `uid`'s lock on `node`
    pub fn unlock(&mut self, node: &str, uid: UserId) -> LockResult<()> {
        let idx = self.tree.index_of(node)?;

        match self.tree.state(idx).locked_by {
            None => return Err(LockError::NotLocked),
            Some(holder) if holder != uid => return Err(LockError::NotLockedByUser),
            Some(_) => {}
        }

        self.tree.commit_unlock(idx);
        log::debug!("unlocked {} for user {}", node, uid);
        Ok(())
    }

    /// Replace all of `uid`'s locks below `node` with one lock on `node`.
    ///
    /// Returns the number of descendant locks absorbed.
    pub fn upgrade(&mut self, node: &str, uid: UserId) -> LockResult<usize> {
        let idx = self.tree.index_of(node)?;
        let state = self.tree.state(idx);

        if state.is_locked() {
            return Err(LockError::AlreadyLocked);
        }
        self.check_ancestors(idx)?;
        if state.locked_descendant_count == 0 {
            return Err(LockError::NoLockedDescendants);
        }

        let absorbed: Vec<usize> = state.locked_descendants.iter().copied().collect();
        if absorbed
            .iter()
            .any(|&d| self.tree.state(d).locked_by != Some(uid))
        {
            return Err(LockError::MixedOwnership);
        }

        self.tree.commit_upgrade(idx, uid, &absorbed);
        log::debug!(
            "upgraded {} for user {}, absorbed {} descendant locks",
            node,
            uid,
            absorbed.len()
        );
        Ok(absorbed.len())
    }

    fn check_ancestors(&self, idx: usize) -> LockResult<()> {
        match self.tree.locked_ancestor(idx) {
            Some(_) => Err(LockError::AncestorLocked),
            None => Ok(()),
        }
    }
}
