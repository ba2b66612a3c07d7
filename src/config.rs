use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::tree::TreeStore;

/// Lock service configuration with sensible defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub tree: TreeConfig,
    pub concurrency: ConcurrencyConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Node names in level order
    pub nodes: Vec<String>,
    /// Children per node for level-order construction
    pub branching_factor: usize,
    /// Explicit `(node, parent)` definition; overrides `nodes` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<EdgeConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub node: String,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Give up waiting for admission after this long (None = wait forever)
    pub admission_timeout_ms: Option<u64>,
    /// Maximum audit events retained in memory
    pub audit_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable metrics collection
    pub enable_metrics: bool,
    /// Enable the in-memory audit trail
    pub enable_audit: bool,
    /// Log level
    pub log_level: String,
}

impl Config {
    /// Default configuration for production
    pub fn production() -> Self {
        Config {
            tree: TreeConfig {
                nodes: ["World", "Asia", "Africa", "China", "India", "SouthAfrica", "Egypt"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                branching_factor: 2,
                edges: None,
            },
            concurrency: ConcurrencyConfig {
                admission_timeout_ms: Some(5_000),
                audit_capacity: 10_000,
            },
            monitoring: MonitoringConfig {
                enable_metrics: true,
                enable_audit: true,
                log_level: "info".to_string(),
            },
        }
    }

    /// Development configuration
    pub fn development() -> Self {
        let mut config = Self::production();
        config.concurrency.admission_timeout_ms = None;
        config.monitoring.log_level = "debug".to_string();
        config
    }

    /// Testing configuration
    pub fn testing() -> Self {
        let mut config = Self::development();
        config.concurrency.audit_capacity = 1_000;
        config.monitoring.log_level = "warn".to_string();
        config
    }

    pub fn from_preset(preset: &str) -> anyhow::Result<Self> {
        match preset {
            "production" => Ok(Config::production()),
            "development" => Ok(Config::development()),
            "testing" => Ok(Config::testing()),
            other => Err(anyhow::anyhow!(
                "Unknown preset '{}'. Use: production|development|testing",
                other
            )),
        }
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&json)?;
        config
            .validate()
            .map_err(|errors| anyhow::anyhow!("Configuration validation failed: {}", errors.join("; ")))?;
        Ok(config)
    }

    /// Save to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn admission_timeout(&self) -> Option<Duration> {
        self.concurrency.admission_timeout_ms.map(Duration::from_millis)
    }

    /// Build the hierarchy this config describes
    pub fn build_tree(&self) -> anyhow::Result<TreeStore> {
        let tree = match &self.tree.edges {
            Some(edges) => TreeStore::from_edges(
                edges.iter().map(|e| (e.node.as_str(), e.parent.as_deref())),
            ),
            None => TreeStore::from_level_order(&self.tree.nodes, self.tree.branching_factor),
        };
        tree.context("Failed to build tree from configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.tree.edges.is_none() && self.tree.branching_factor == 0 {
            errors.push("branching_factor must be > 0".to_string());
        }

        if self.concurrency.audit_capacity == 0 {
            errors.push("audit_capacity must be > 0".to_string());
        }

        if self.concurrency.admission_timeout_ms == Some(0) {
            errors.push("admission_timeout_ms must be > 0 when set".to_string());
        }

        if crate::logging::parse_level_filter(&self.monitoring.log_level).is_none() {
            errors.push(format!("unknown log_level '{}'", self.monitoring.log_level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::production()
    }
}

/// Configuration builder for fluent API
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::production(),
        }
    }

    pub fn nodes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.tree.nodes = names.into_iter().map(Into::into).collect();
        self.config.tree.edges = None;
        self
    }

    pub fn branching_factor(mut self, m: usize) -> Self {
        self.config.tree.branching_factor = m;
        self
    }

    pub fn edge(mut self, node: impl Into<String>, parent: Option<&str>) -> Self {
        self.config
            .tree
            .edges
            .get_or_insert_with(Vec::new)
            .push(EdgeConfig {
                node: node.into(),
                parent: parent.map(str::to_string),
            });
        self
    }

    pub fn admission_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.config.concurrency.admission_timeout_ms = ms;
        self
    }

    pub fn audit_capacity(mut self, capacity: usize) -> Self {
        self.config.concurrency.audit_capacity = capacity;
        self
    }

    pub fn metrics(mut self, enabled: bool) -> Self {
        self.config.monitoring.enable_metrics = enabled;
        self
    }

    pub fn audit(mut self, enabled: bool) -> Self {
        self.config.monitoring.enable_audit = enabled;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.monitoring.log_level = level.into();
        self
    }

    pub fn build(self) -> anyhow::Result<Config> {
        match self.config.validate() {
            Ok(()) => Ok(self.config),
            Err(errors) => Err(anyhow::anyhow!("Configuration validation failed: {}", errors.join("; ")))
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_default_tree() {
        let tree = Config::default().build_tree().unwrap();
        assert_eq!(tree.len(), 7);
        assert_eq!(tree.parent("Egypt").unwrap().unwrap().as_str(), "Africa");
    }

    #[test]
    fn test_presets() {
        assert_eq!(Config::development().monitoring.log_level, "debug");
        assert_eq!(Config::development().admission_timeout(), None);
        assert_eq!(
            Config::production().admission_timeout(),
            Some(Duration::from_millis(5_000))
        );
        assert!(Config::from_preset("testing").is_ok());
        assert!(Config::from_preset("turbo").is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = ConfigBuilder::new()
            .edge("root", None)
            .edge("child", Some("root"))
            .build()
            .unwrap();
        let parsed = Config::from_json(&config.to_json()).unwrap();
        let tree = parsed.build_tree().unwrap();
        assert_eq!(tree.parent("child").unwrap().unwrap().as_str(), "root");
    }

    #[test]
    fn test_validation_errors() {
        let err = ConfigBuilder::new()
            .branching_factor(0)
            .audit_capacity(0)
            .log_level("loud")
            .build()
            .unwrap_err()
            .to_string();
        assert!(err.contains("branching_factor"));
        assert!(err.contains("audit_capacity"));
        assert!(err.contains("loud"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let config = ConfigBuilder::new().nodes(["r", "a", "b"]).build().unwrap();
        file.write_all(config.to_json().as_bytes()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.tree.nodes, vec!["r", "a", "b"]);
        assert!(Config::load(Path::new("/nonexistent/treelock.json")).is_err());
    }

    #[test]
    fn test_bad_tree_definition_is_error() {
        let config = ConfigBuilder::new().nodes(["a", "a"]).build().unwrap();
        assert!(config.build_tree().is_err());
    }
}
