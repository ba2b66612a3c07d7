use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::LockError;
use crate::operation::Operation;

const REJECTION_CODES: usize = LockError::ALL_CODES.len();

/// Lock service metrics collection
#[derive(Debug, Clone)]
pub struct LockMetrics {
    // Requests admitted, by operation
    pub lock_requests: Arc<AtomicU64>,
    pub unlock_requests: Arc<AtomicU64>,
    pub upgrade_requests: Arc<AtomicU64>,

    // Outcomes
    pub commits: Arc<AtomicU64>,
    pub rejections: Arc<[AtomicU64; REJECTION_CODES]>,
    pub absorbed_locks: Arc<AtomicU64>,

    // Admission
    pub admission_waits_us: Arc<AtomicU64>,
    pub snapshots: Arc<AtomicU64>,

    enabled: bool,
}

impl LockMetrics {
    pub fn new() -> Self {
        LockMetrics {
            lock_requests: Arc::new(AtomicU64::new(0)),
            unlock_requests: Arc::new(AtomicU64::new(0)),
            upgrade_requests: Arc::new(AtomicU64::new(0)),

            commits: Arc::new(AtomicU64::new(0)),
            rejections: Arc::new(std::array::from_fn(|_| AtomicU64::new(0))),
            absorbed_locks: Arc::new(AtomicU64::new(0)),

            admission_waits_us: Arc::new(AtomicU64::new(0)),
            snapshots: Arc::new(AtomicU64::new(0)),

            enabled: true,
        }
    }

    /// Collector whose `record_*` calls are no-ops
    pub fn disabled() -> Self {
        LockMetrics {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_request(&self, op: Operation) {
        if !self.enabled {
            return;
        }
        let counter = match op {
            Operation::Lock => &self.lock_requests,
            Operation::Unlock => &self.unlock_requests,
            Operation::Upgrade => &self.upgrade_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        if !self.enabled {
            return;
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, err: &LockError) {
        if !self.enabled {
            return;
        }
        self.rejections[err.ordinal()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_absorbed(&self, count: u64) {
        if !self.enabled {
            return;
        }
        self.absorbed_locks.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_admission_wait(&self, micros: u64) {
        if !self.enabled {
            return;
        }
        self.admission_waits_us.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn record_snapshot(&self) {
        if !self.enabled {
            return;
        }
        self.snapshots.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lock_requests: self.lock_requests.load(Ordering::Relaxed),
            unlock_requests: self.unlock_requests.load(Ordering::Relaxed),
            upgrade_requests: self.upgrade_requests.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rejections: LockError::ALL_CODES
                .iter()
                .zip(self.rejections.iter())
                .map(|(code, c)| (*code, c.load(Ordering::Relaxed)))
                .collect(),
            absorbed_locks: self.absorbed_locks.load(Ordering::Relaxed),
            admission_waits_us: self.admission_waits_us.load(Ordering::Relaxed),
            snapshots: self.snapshots.load(Ordering::Relaxed),
        }
    }
}

impl Default for LockMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub lock_requests: u64,
    pub unlock_requests: u64,
    pub upgrade_requests: u64,
    pub commits: u64,
    pub rejections: Vec<(&'static str, u64)>,
    pub absorbed_locks: u64,
    pub admission_waits_us: u64,
    pub snapshots: u64,
}

impl MetricsSnapshot {
    pub fn total_requests(&self) -> u64 {
        self.lock_requests + self.unlock_requests + self.upgrade_requests
    }

    pub fn total_rejections(&self) -> u64 {
        self.rejections.iter().map(|(_, n)| n).sum()
    }

    pub fn rejections_for(&self, code: &str) -> u64 {
        self.rejections
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    /// Generate Prometheus metrics in text format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "# HELP treelock_requests_total Operations admitted, by kind");
        let _ = writeln!(output, "# TYPE treelock_requests_total counter");
        let _ = writeln!(output, "treelock_requests_total{{op=\"lock\"}} {}", self.lock_requests);
        let _ = writeln!(output, "treelock_requests_total{{op=\"unlock\"}} {}", self.unlock_requests);
        let _ = writeln!(output, "treelock_requests_total{{op=\"upgrade\"}} {}", self.upgrade_requests);

        let _ = writeln!(output, "# HELP treelock_commits_total Successful commits");
        let _ = writeln!(output, "# TYPE treelock_commits_total counter");
        let _ = writeln!(output, "treelock_commits_total {}", self.commits);

        let _ = writeln!(output, "# HELP treelock_rejections_total Rejected operations, by reason");
        let _ = writeln!(output, "# TYPE treelock_rejections_total counter");
        for (code, n) in &self.rejections {
            let _ = writeln!(output, "treelock_rejections_total{{reason=\"{}\"}} {}", code, n);
        }

        let _ = writeln!(output, "# HELP treelock_absorbed_locks_total Descendant locks absorbed by upgrades");
        let _ = writeln!(output, "# TYPE treelock_absorbed_locks_total counter");
        let _ = writeln!(output, "treelock_absorbed_locks_total {}", self.absorbed_locks);

        let _ = writeln!(output, "# HELP treelock_admission_wait_microseconds_total Time spent waiting to enter the critical section");
        let _ = writeln!(output, "# TYPE treelock_admission_wait_microseconds_total counter");
        let _ = writeln!(output, "treelock_admission_wait_microseconds_total {}", self.admission_waits_us);

        output
    }
}
