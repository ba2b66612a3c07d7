use serde::{Serialize, Deserialize};
use std::collections::VecDeque;
use std::fmt::Write;
use chrono::{DateTime, Utc};

use crate::error::LockResult;
use crate::operation::Operation;
use crate::tree::{NodeId, UserId};

/// Parse a level name as accepted in configuration
pub fn parse_level_filter(level: &str) -> Option<log::LevelFilter> {
    match level.to_lowercase().as_str() {
        "off" => Some(log::LevelFilter::Off),
        "error" => Some(log::LevelFilter::Error),
        "warn" => Some(log::LevelFilter::Warn),
        "info" => Some(log::LevelFilter::Info),
        "debug" => Some(log::LevelFilter::Debug),
        "trace" => Some(log::LevelFilter::Trace),
        _ => None,
    }
}

/// Install the process logger. `RUST_LOG`, when set, overrides `level`.
pub fn init_logging(level: &str) {
    let filter = parse_level_filter(level).unwrap_or(log::LevelFilter::Info);
    let _ = env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .try_init();
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
        }
    }
}

/// One admitted operation and its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub operation: Operation,
    pub node: NodeId,
    pub uid: UserId,
    /// Reason code of a rejection, None on success
    pub outcome: Option<String>,
    /// Commit generation after the operation
    pub generation: u64,
    pub trace_id: String,
}

impl AuditEvent {
    pub fn new(operation: Operation, node: &str, uid: UserId, result: &LockResult<()>, generation: u64) -> Self {
        let (level, outcome) = match result {
            Ok(()) => (LogLevel::Info, None),
            Err(e) => (LogLevel::Warn, Some(e.code().to_string())),
        };
        AuditEvent {
            timestamp: Utc::now(),
            level,
            operation,
            node: NodeId::from(node),
            uid,
            outcome,
            generation,
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.is_none()
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"timestamp":"{}","operation":"{}","node":"{}","uid":{}}}"#,
                self.timestamp.to_rfc3339(),
                self.operation,
                self.node,
                self.uid
            )
        })
    }

    /// Convert to human-readable format
    pub fn to_text(&self) -> String {
        let mut output = format!(
            "[{}] {} {} {} uid={} gen={}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.operation,
            self.node,
            self.uid,
            self.generation
        );

        match &self.outcome {
            None => output.push_str(" ok"),
            Some(code) => {
                let _ = write!(output, " rejected={}", code);
            }
        }
        let _ = write!(output, " [trace_id:{}]", self.trace_id);

        output
    }
}

/// Bounded in-memory audit trail, oldest events pruned first
#[derive(Debug, Clone)]
pub struct AuditLog {
    events: VecDeque<AuditEvent>,
    max_size: usize,
    min_level: LogLevel,
}

impl AuditLog {
    pub fn new(max_size: usize, min_level: LogLevel) -> Self {
        AuditLog {
            events: VecDeque::new(),
            max_size,
            min_level,
        }
    }

    /// Add event to log, pruning oldest if needed
    pub fn log(&mut self, event: AuditEvent) {
        if event.level >= self.min_level {
            self.events.push_back(event);
            if self.events.len() > self.max_size {
                self.events.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get all events, oldest first
    pub fn get_events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }

    /// Export as JSON lines (one event per line)
    pub fn export_jsonl(&self) -> String {
        self.events.iter()
            .map(|e| e.to_json())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Get statistics
    pub fn stats(&self) -> AuditStats {
        let succeeded = self.events.iter().filter(|e| e.succeeded()).count();
        AuditStats {
            total_events: self.events.len(),
            succeeded,
            rejected: self.events.len() - succeeded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStats {
    pub total_events: usize,
    pub succeeded: usize,
    pub rejected: usize,
}

impl std::fmt::Display for AuditStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AuditStats: {} total | {} succeeded | {} rejected",
            self.total_events,
            self.succeeded,
            self.rejected
        )
    }
}
