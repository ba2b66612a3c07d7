use thiserror::Error;

/// Reasons a lock, unlock or upgrade request is rejected.
///
/// These are ordinary validation outcomes. A rejected request never leaves
/// partial effects behind in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node is already locked")]
    AlreadyLocked,

    #[error("node is not locked")]
    NotLocked,

    #[error("node is locked by a different user")]
    NotLockedByUser,

    #[error("an ancestor of the node is locked")]
    AncestorLocked,

    #[error("a descendant of the node is locked")]
    DescendantLocked,

    #[error("node has no locked descendants")]
    NoLockedDescendants,

    #[error("locked descendants belong to more than one user")]
    MixedOwnership,

    /// The caller gave up waiting to enter the critical section.
    #[error("timed out waiting for admission after {0} ms")]
    AdmissionTimeout(u64),
}

impl LockError {
    /// Stable reason code surfaced at the request boundary
    pub fn code(&self) -> &'static str {
        Self::ALL_CODES[self.ordinal()]
    }

    /// Position of this variant in `ALL_CODES`
    pub fn ordinal(&self) -> usize {
        match self {
            LockError::NodeNotFound(_) => 0,
            LockError::AlreadyLocked => 1,
            LockError::NotLocked => 2,
            LockError::NotLockedByUser => 3,
            LockError::AncestorLocked => 4,
            LockError::DescendantLocked => 5,
            LockError::NoLockedDescendants => 6,
            LockError::MixedOwnership => 7,
            LockError::AdmissionTimeout(_) => 8,
        }
    }

    /// All reason codes, in declaration order
    pub const ALL_CODES: [&'static str; 9] = [
        "node_not_found",
        "already_locked",
        "not_locked",
        "not_locked_by_user",
        "ancestor_locked",
        "descendant_locked",
        "no_locked_descendants",
        "mixed_ownership",
        "admission_timeout",
    ];
}

pub type LockResult<T> = std::result::Result<T, LockError>;

/// Errors raised while building a hierarchy from its definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("node {node} references unknown parent {parent}")]
    UnknownParent { node: String, parent: String },

    #[error("cycle detected through node {0}")]
    Cycle(String),

    #[error("branching factor must be > 0")]
    ZeroBranching,

    #[error("persisted lock on {node} conflicts with lock on {other}")]
    ConflictingLocks { node: String, other: String },
}
