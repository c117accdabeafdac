//! kube-rs backed `PodExecutor` and `PodLister`

use super::{PodExecutor, PodLister, PodRef};
use crate::error::{ExecFailure, KubercError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Talks to the cluster API; assumed already authenticated
#[derive(Clone)]
pub struct KubeExecutor {
    client: Client,
}

impl KubeExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from an explicit kubeconfig, or the default chain
    /// (`$KUBECONFIG`, `~/.kube/config`, in-cluster service account)
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let client = match kubeconfig {
            Some(path) => {
                info!("Loading kubeconfig from {}", path.display());
                let kubeconfig =
                    Kubeconfig::read_from(path).map_err(|e| KubercError::Kube(e.to_string()))?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| KubercError::Kube(e.to_string()))?;
                Client::try_from(config).map_err(|e| KubercError::Kube(e.to_string()))?
            }
            None => Client::try_default()
                .await
                .map_err(|e| KubercError::Kube(e.to_string()))?,
        };
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn pod_ref(pod: &Pod) -> PodRef {
    let spec = pod.spec.as_ref();
    let status = pod.status.as_ref();
    PodRef {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        container: spec
            .and_then(|s| s.containers.first())
            .map(|c| c.name.clone()),
        ip: status
            .and_then(|s| s.pod_ip.as_deref())
            .and_then(|ip| ip.parse().ok()),
        host: spec.and_then(|s| s.node_name.clone()),
        phase: status.and_then(|s| s.phase.clone()),
    }
}

/// Exit code from the status frame the exec subresource sends on close
fn exit_code(status: &Status) -> i32 {
    if status.status.as_deref() == Some("Success") {
        return 0;
    }
    status
        .details
        .as_ref()
        .and_then(|d| d.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|c| c.reason.as_deref() == Some("ExitCode"))
        })
        .and_then(|c| c.message.as_deref())
        .and_then(|m| m.trim().parse().ok())
        .unwrap_or(1)
}

#[async_trait]
impl PodExecutor for KubeExecutor {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        argv: &[String],
    ) -> std::result::Result<Vec<u8>, ExecFailure> {
        let api = self.pods(namespace);

        let found = api
            .get_opt(pod)
            .await
            .map_err(|e| ExecFailure::Transport(e.to_string()))?
            .ok_or(ExecFailure::PodNotFound)?;

        let has_container = found
            .spec
            .as_ref()
            .is_some_and(|s| s.containers.iter().any(|c| c.name == container));
        if !has_container {
            return Err(ExecFailure::ContainerNotFound);
        }

        let phase = found
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        if phase != "Running" {
            return Err(ExecFailure::PodNotRunning(phase));
        }

        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut attached = api
            .exec(pod, argv.to_vec(), &params)
            .await
            .map_err(|e| ExecFailure::Transport(e.to_string()))?;

        let mut stdout_reader = attached
            .stdout()
            .ok_or_else(|| ExecFailure::Transport("stdout not attached".to_string()))?;
        let mut stderr_reader = attached
            .stderr()
            .ok_or_else(|| ExecFailure::Transport("stderr not attached".to_string()))?;
        let status = attached
            .take_status()
            .ok_or_else(|| ExecFailure::Transport("status channel missing".to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let (out, err, status) = tokio::join!(
            stdout_reader.read_to_end(&mut stdout),
            stderr_reader.read_to_end(&mut stderr),
            status
        );
        out.map_err(|e| ExecFailure::Transport(e.to_string()))?;
        err.map_err(|e| ExecFailure::Transport(e.to_string()))?;

        attached
            .join()
            .await
            .map_err(|e| ExecFailure::Transport(e.to_string()))?;

        let code = status.as_ref().map(exit_code).unwrap_or(0);
        debug!(pod, container, code, bytes = stdout.len(), "exec finished");

        if code != 0 {
            return Err(ExecFailure::NonZeroExit {
                code,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(stdout)
    }
}

#[async_trait]
impl PodLister for KubeExecutor {
    async fn list_pods(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<PodRef>> {
        let mut params = ListParams::default();
        if let Some(selector) = selector {
            params = params.labels(selector);
        }
        let list = self
            .pods(namespace)
            .list(&params)
            .await
            .map_err(|e| KubercError::Kube(e.to_string()))?;
        Ok(list.items.iter().map(pod_ref).collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodRef>> {
        let pod = self
            .pods(namespace)
            .get_opt(name)
            .await
            .map_err(|e| KubercError::Kube(e.to_string()))?;
        Ok(pod.as_ref().map(pod_ref))
    }
}
