use serde_json::json;

use crate::metrics::MetricsSnapshot;
use crate::operation::LockResponse;
use crate::query::TreeSnapshot;

/// JSON output formatter for CLI commands and the request stream
pub struct JsonOutput;

impl JsonOutput {
    /// Format a lock/unlock/upgrade outcome
    pub fn response(response: &LockResponse) -> String {
        serde_json::to_value(response)
            .unwrap_or_else(|_| json!({ "success": response.success }))
            .to_string()
    }

    /// Format a tree query answer: `{"tree": {...}, "generation": n}`
    pub fn tree(snapshot: &TreeSnapshot) -> String {
        json!({
            "tree": snapshot.tree,
            "roots": snapshot.roots,
            "generation": snapshot.generation
        }).to_string()
    }

    /// Format metrics as JSON
    pub fn metrics(snapshot: &MetricsSnapshot) -> String {
        let rejections: serde_json::Map<String, serde_json::Value> = snapshot
            .rejections
            .iter()
            .map(|(code, n)| (code.to_string(), json!(n)))
            .collect();

        json!({
            "requests": {
                "lock": snapshot.lock_requests,
                "unlock": snapshot.unlock_requests,
                "upgrade": snapshot.upgrade_requests,
                "total": snapshot.total_requests()
            },
            "commits": snapshot.commits,
            "rejections": rejections,
            "absorbed_locks": snapshot.absorbed_locks,
            "admission_wait_us": snapshot.admission_waits_us,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }).to_string()
    }

    /// Format error as JSON
    pub fn error(message: &str, code: &str) -> String {
        json!({
            "success": false,
            "error": code,
            "message": message
        }).to_string()
    }
}
