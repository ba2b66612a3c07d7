//! Admission control for the shared lock tree.
//!
//! Every mutating request runs its validation and commit inside one
//! exclusive critical section. Requests on disjoint subtrees still share
//! ancestor counters, so the section is global rather than per subtree.
//! Snapshots take the shared side of the same lock only long enough to
//! copy the committed state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::Config;
use crate::error::{LockError, LockResult};
use crate::lock_manager::LockManager;
use crate::logging::{AuditEvent, AuditLog, LogLevel};
use crate::metrics::LockMetrics;
use crate::operation::{LockRequest, LockResponse, Operation};
use crate::persist::PersistedTree;
use crate::query::TreeSnapshot;
use crate::tree::{TreeStore, UserId};

/// State guarded by the critical section
struct Committed {
    manager: LockManager,
    /// Successful commits so far
    generation: u64,
    audit: Option<AuditLog>,
    /// Set for the duration of a commit. Still set afterwards only if the
    /// commit panicked, leaving the tree half applied.
    poisoned: bool,
}

/// Shared handle to one authoritative lock tree.
///
/// Clones are cheap and all refer to the same tree; nothing outside this
/// handle owns a copy that could drift. Operations are applied in the order
/// they enter the critical section, and a rejected request returns at once
/// without retrying.
#[derive(Clone)]
pub struct TreeLockService {
    state: Arc<RwLock<Committed>>,
    metrics: LockMetrics,
    admission_timeout: Option<Duration>,
}

impl TreeLockService {
    /// Wrap `tree` with no admission deadline and no audit trail
    pub fn new(tree: TreeStore) -> Self {
        TreeLockService {
            state: Arc::new(RwLock::new(Committed {
                manager: LockManager::new(tree),
                generation: 0,
                audit: None,
                poisoned: false,
            })),
            metrics: LockMetrics::new(),
            admission_timeout: None,
        }
    }

    /// Build the tree and service described by `config`
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let tree = config.build_tree()?;
        let mut service = Self::new(tree).with_admission_timeout(config.admission_timeout());
        if !config.monitoring.enable_metrics {
            service = service.with_metrics(LockMetrics::disabled());
        }
        if config.monitoring.enable_audit {
            service = service.with_audit(config.concurrency.audit_capacity);
        }
        log::info!(
            "Tree initialized with {} nodes",
            service.with_tree(|t| t.len())
        );
        Ok(service)
    }

    /// Default deadline applied by `handle`
    pub fn with_admission_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.admission_timeout = timeout;
        self
    }

    /// Record every admitted operation in a bounded audit trail
    pub fn with_audit(self, capacity: usize) -> Self {
        self.state.write().audit = Some(AuditLog::new(capacity, LogLevel::Debug));
        self
    }

    /// Replace the metrics collector
    pub fn with_metrics(mut self, metrics: LockMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &LockMetrics {
        &self.metrics
    }

    /// Run one operation, waiting as long as needed for admission
    pub fn execute(&self, op: Operation, node: &str, uid: UserId) -> LockResult<()> {
        let start = Instant::now();
        let guard = self.state.write();
        self.admitted(guard, start, op, node, uid)
    }

    /// Run one operation, giving up if admission takes longer than `timeout`.
    ///
    /// Abandoning the wait touches no state.
    pub fn execute_timeout(&self, op: Operation, node: &str, uid: UserId, timeout: Duration) -> LockResult<()> {
        let start = Instant::now();
        match self.state.try_write_for(timeout) {
            Some(guard) => self.admitted(guard, start, op, node, uid),
            None => {
                let err = LockError::AdmissionTimeout(timeout.as_millis() as u64);
                self.metrics.record_rejection(&err);
                log::warn!("{} {} by {}: {}", op, node, uid, err);
                Err(err)
            }
        }
    }

    /// Boundary entry point: run `request` under the configured deadline
    pub fn handle(&self, op: Operation, request: &LockRequest) -> LockResponse {
        let result = match self.admission_timeout {
            Some(timeout) => self.execute_timeout(op, request.node.as_str(), request.uid, timeout),
            None => self.execute(op, request.node.as_str(), request.uid),
        };
        LockResponse::from(result)
    }

    fn admitted(
        &self,
        mut guard: RwLockWriteGuard<'_, Committed>,
        start: Instant,
        op: Operation,
        node: &str,
        uid: UserId,
    ) -> LockResult<()> {
        self.metrics.record_admission_wait(start.elapsed().as_micros() as u64);
        self.metrics.record_request(op);

        let committed = &mut *guard;
        if committed.poisoned {
            panic!("lock tree is unusable after an internal consistency failure");
        }
        committed.poisoned = true;
        let result = match op {
            Operation::Upgrade => committed.manager.upgrade(node, uid).map(|absorbed| {
                self.metrics.record_absorbed(absorbed as u64);
            }),
            Operation::Lock | Operation::Unlock => committed.manager.apply(op, node, uid),
        };
        committed.poisoned = false;

        match &result {
            Ok(()) => {
                committed.generation += 1;
                self.metrics.record_commit();
            }
            Err(e) => {
                self.metrics.record_rejection(e);
                log::debug!("{} {} by {} rejected: {}", op, node, uid, e);
            }
        }

        if let Some(audit) = committed.audit.as_mut() {
            audit.log(AuditEvent::new(op, node, uid, &result, committed.generation));
        }
        result
    }

    /// Copy of the tree as of the latest commit
    pub fn snapshot(&self) -> TreeSnapshot {
        let state = self.read_committed();
        self.metrics.record_snapshot();
        TreeSnapshot::capture(state.manager.tree(), state.generation)
    }

    /// Number of successful commits so far
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Run `f` against the committed tree while holding the shared side
    pub fn with_tree<R>(&self, f: impl FnOnce(&TreeStore) -> R) -> R {
        let state = self.read_committed();
        f(state.manager.tree())
    }

    fn read_committed(&self) -> RwLockReadGuard<'_, Committed> {
        let state = self.state.read();
        if state.poisoned {
            panic!("lock tree is unusable after an internal consistency failure");
        }
        state
    }

    /// Serializable hierarchy plus lock holders, from one committed state
    pub fn persist(&self) -> PersistedTree {
        self.with_tree(PersistedTree::from_tree)
    }

    /// Audit events recorded so far, oldest first. Empty when auditing is off.
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.state
            .read()
            .audit
            .as_ref()
            .map(|a| a.get_events())
            .unwrap_or_default()
    }

    /// Audit trail as JSON lines
    pub fn export_audit(&self) -> String {
        self.state
            .read()
            .audit
            .as_ref()
            .map(|a| a.export_jsonl())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    fn service() -> TreeLockService {
        TreeLockService::new(crate::test_utils::world_tree()).with_audit(100)
    }

    #[test]
    fn test_generation_counts_commits_only() {
        let svc = service();
        assert_eq!(svc.generation(), 0);
        svc.execute(Operation::Lock, "India", 1).unwrap();
        assert!(svc.execute(Operation::Lock, "Asia", 2).is_err());
        assert_eq!(svc.generation(), 1);

        let snap = svc.snapshot();
        assert!(snap.is_current(svc.generation()));
        svc.execute(Operation::Unlock, "India", 1).unwrap();
        assert!(!snap.is_current(svc.generation()));
    }

    #[test]
    fn test_handle_reports_reason() {
        let svc = service();
        let resp = svc.handle(Operation::Unlock, &LockRequest::new("India", 1));
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("not_locked"));

        let resp = svc.handle(Operation::Lock, &LockRequest::new("Mars", 1));
        assert_eq!(resp.error.as_deref(), Some("node_not_found"));
    }

    #[test]
    fn test_admission_timeout_leaves_state() {
        let svc = service();
        let hold = svc.state.write();
        let err = svc
            .execute_timeout(Operation::Lock, "Asia", 1, Duration::from_millis(20))
            .unwrap_err();
        drop(hold);

        assert_eq!(err, LockError::AdmissionTimeout(20));
        assert_eq!(svc.generation(), 0);
        assert_eq!(svc.snapshot().get("Asia").unwrap().locked_by, None);
        assert_eq!(svc.metrics().snapshot().rejections_for("admission_timeout"), 1);
        assert!(svc.audit_events().is_empty());
    }

    #[test]
    fn test_audit_records_admission_order() {
        let svc = service();
        svc.execute(Operation::Lock, "China", 5).unwrap();
        svc.execute(Operation::Lock, "India", 5).unwrap();
        svc.execute(Operation::Upgrade, "Asia", 5).unwrap();

        let events = svc.audit_events();
        let ops: Vec<Operation> = events.iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec![Operation::Lock, Operation::Lock, Operation::Upgrade]);
        assert_eq!(events[2].generation, 3);
        assert_eq!(svc.metrics().snapshot().absorbed_locks, 2);
    }

    #[test]
    fn test_same_node_contention_has_one_winner() {
        let svc = service();
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let svc = svc.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    svc.execute(Operation::Lock, "Africa", i as UserId).is_ok()
                })
            })
            .collect();

        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(winners, 1);

        let holder = svc.snapshot().get("Africa").unwrap().locked_by.unwrap();
        let first = svc.audit_events().into_iter().find(|e| e.succeeded()).unwrap();
        assert_eq!(first.uid, holder);
    }

    #[test]
    fn test_from_config_wires_tree_audit_and_deadline() {
        let config = crate::config::ConfigBuilder::new()
            .edge("root", None)
            .edge("left", Some("root"))
            .edge("right", Some("root"))
            .edge("leaf", Some("left"))
            .audit(true)
            .audit_capacity(2)
            .admission_timeout_ms(Some(25))
            .build()
            .unwrap();
        let svc = TreeLockService::from_config(&config).unwrap();

        assert_eq!(svc.with_tree(|t| t.len()), 4);
        assert!(svc.metrics().is_enabled());

        svc.execute(Operation::Lock, "leaf", 1).unwrap();
        svc.execute(Operation::Lock, "root", 2).unwrap_err();
        svc.execute(Operation::Unlock, "leaf", 1).unwrap();
        let events = svc.audit_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome.as_deref(), Some("descendant_locked"));
        assert_eq!(svc.export_audit().lines().count(), 2);

        let acquired = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let holder = {
            let svc = svc.clone();
            let acquired = Arc::clone(&acquired);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                let _guard = svc.state.write();
                acquired.wait();
                release.wait();
            })
        };
        acquired.wait();
        let resp = svc.handle(Operation::Lock, &LockRequest::new("right", 3));
        release.wait();
        holder.join().unwrap();

        assert!(resp.is_rejected_with(&LockError::AdmissionTimeout(25)));
        assert_eq!(svc.generation(), 2);
    }

    #[test]
    fn test_from_config_without_metrics_or_audit() {
        let config = crate::config::ConfigBuilder::new()
            .metrics(false)
            .audit(false)
            .build()
            .unwrap();
        let svc = TreeLockService::from_config(&config).unwrap();

        svc.execute(Operation::Lock, "Asia", 1).unwrap();
        assert!(!svc.metrics().is_enabled());
        assert_eq!(svc.metrics().snapshot().commits, 0);
        assert!(svc.audit_events().is_empty());
        assert_eq!(svc.export_audit(), "");
    }

    #[test]
    fn test_interrupted_commit_poisons_service() {
        let svc = service();
        svc.state.write().poisoned = true;

        let write = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            svc.execute(Operation::Lock, "Asia", 1)
        }));
        assert!(write.is_err());
        let read = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| svc.snapshot()));
        assert!(read.is_err());
    }
}
