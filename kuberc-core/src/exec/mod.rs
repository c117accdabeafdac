//! Remote command execution inside pods
//!
//! - `PodExecutor` / `PodLister`: the boundary with the cluster API
//! - `PodCommandRunner`: timeout + cancellation + error context around an executor
//! - `RedisCli`: argv construction and error-reply detection for redis-cli
//! - `KubeExecutor`: the kube-rs backed implementation

pub mod kubernetes;
pub mod redis_cli;
pub mod runner;

pub use kubernetes::KubeExecutor;
pub use redis_cli::RedisCli;
pub use runner::{ExecContext, PodCommandRunner, masked_command};

use crate::error::{ExecFailure, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::net::IpAddr;

/// Snapshot of a pod taken at discovery time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PodRef {
    pub name: String,
    pub namespace: String,
    /// First container of the pod spec
    pub container: Option<String>,
    pub ip: Option<IpAddr>,
    /// Kubernetes node the pod is scheduled on
    pub host: Option<String>,
    pub phase: Option<String>,
}

impl PodRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            container: None,
            ip: None,
            host: None,
            phase: None,
        }
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn is_running(&self) -> bool {
        self.phase.as_deref().is_none_or(|phase| phase == "Running")
    }
}

/// Runs an argv inside a container and returns captured stdout
#[async_trait]
pub trait PodExecutor: Send + Sync {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        argv: &[String],
    ) -> std::result::Result<Vec<u8>, ExecFailure>;
}

/// Supplies candidate pods for address resolution
#[async_trait]
pub trait PodLister: Send + Sync {
    async fn list_pods(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<PodRef>>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodRef>>;
}
