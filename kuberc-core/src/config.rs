use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{KubercError, Result};

/// Main kuberc configuration
///
/// Built once per invocation and passed by reference into every discovery
/// and failover call; nothing in the core reads ambient state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubercConfig {
    pub redis: RedisConfig,
    pub sentinel: SentinelConfig,
    pub discovery: DiscoveryConfig,
    pub failover: FailoverConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub namespace: String,
    /// Container running redis-server (first container when unset)
    pub container: Option<String>,
    pub port: u16,
    /// redis-cli binary inside the container
    pub cli_path: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub namespace: String,
    pub container: Option<String>,
    pub port: u16,
    /// Sentinel `requirepass`, when set
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Label selector used to list candidate pods (all pods in the namespace when unset)
    pub selector: Option<String>,
    /// PING nodes whose address matches no pod
    pub confirm_unresolved: bool,
    /// Run ROLE in every resolved pod
    pub confirm_roles: bool,
    pub confirm_retries: u32,
    pub exec_timeout_ms: u64,
}

/// Flavour of `CLUSTER FAILOVER`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterFailoverMode {
    /// Coordinated failover, master must be reachable
    #[default]
    Default,
    /// Skip the handshake with the master
    Force,
    /// Skip the cluster election entirely
    Takeover,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    /// Require ROLE in the new master pod to report `master` before succeeding
    pub confirm_role: bool,
    pub cluster_mode: ClusterFailoverMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            container: None,
            port: 6379,
            cli_path: "redis-cli".to_string(),
            password: None,
        }
    }
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            container: None,
            port: 26379,
            password: None,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            selector: None,
            confirm_unresolved: true,
            confirm_roles: false,
            confirm_retries: 2,
            exec_timeout_ms: 10_000,
        }
    }
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_attempts: 30,
            confirm_role: true,
            cluster_mode: ClusterFailoverMode::Default,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl KubercConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| KubercError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: KubercConfig = serde_yaml::from_str(content)
            .map_err(|e| KubercError::Config(format!("invalid yaml: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `KUBERC_*` environment variables; empty values are ignored
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars<F: Fn(&str) -> Option<String>>(&mut self, get: F) {
        let get = |key: &str| get(key).filter(|v| !v.is_empty());
        if let Some(ns) = get("KUBERC_NAMESPACE") {
            self.redis.namespace = ns.clone();
            self.sentinel.namespace = ns;
        }
        if let Some(password) = get("KUBERC_REDIS_PASSWORD") {
            self.redis.password = Some(password);
        }
        if let Some(password) = get("KUBERC_SENTINEL_PASSWORD") {
            self.sentinel.password = Some(password);
        }
        if let Some(level) = get("KUBERC_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.redis.port == 0 || self.sentinel.port == 0 {
            return Err(KubercError::Config("port must be non-zero".to_string()));
        }
        if self.redis.cli_path.trim().is_empty() {
            return Err(KubercError::Config("redis.cli_path is empty".to_string()));
        }
        if self.failover.max_attempts == 0 {
            return Err(KubercError::Config(
                "failover.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.discovery.exec_timeout_ms == 0 {
            return Err(KubercError::Config(
                "discovery.exec_timeout_ms must be non-zero".to_string(),
            ));
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(KubercError::Config(format!(
                "unknown logging.format: {}",
                other
            ))),
        }
    }

    /// Get per-exec timeout as Duration
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery.exec_timeout_ms)
    }

    /// Get failover poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.failover.poll_interval_ms)
    }
}
