use super::{PodExecutor, PodLister, PodRef, RedisCli};
use crate::config::KubercConfig;
use crate::error::{ExecFailure, KubercError, Result};
use crate::reply::{InfoReply, RoleReply, parse_info, parse_role};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Executes one argv in one container, bounded by a timeout and a cancellation token
///
/// No connection outlives a call; every failure carries the pod, container
/// and command so callers can tell "node down" from "could not ask".
#[derive(Clone)]
pub struct PodCommandRunner {
    executor: Arc<dyn PodExecutor>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl PodCommandRunner {
    pub fn new(executor: Arc<dyn PodExecutor>, timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            executor,
            timeout,
            cancel,
        }
    }

    pub async fn run(&self, pod: &PodRef, container: &str, command: &[String]) -> Result<Vec<u8>> {
        if self.cancel.is_cancelled() {
            return Err(KubercError::Cancelled);
        }

        let shown = masked_command(command);
        debug!(pod = %pod.name, container, command = %shown, "exec");

        let exec = self
            .executor
            .exec(&pod.namespace, &pod.name, container, command);

        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => return Err(KubercError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, exec) => outcome,
        };

        let failure = match outcome {
            Ok(Ok(stdout)) => return Ok(stdout),
            Ok(Err(failure)) => failure,
            Err(_) => ExecFailure::Timeout(self.timeout.as_millis() as u64),
        };

        debug!(pod = %pod.name, error = %failure, "exec failed");
        Err(KubercError::Exec {
            pod: pod.name.clone(),
            container: container.to_string(),
            command: shown,
            source: failure,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Argv joined for logs and error context, with the value after `-a` masked
pub fn masked_command(command: &[String]) -> String {
    let mut shown = Vec::with_capacity(command.len());
    let mut secret_next = false;
    for arg in command {
        if secret_next {
            shown.push("******");
            secret_next = false;
        } else {
            secret_next = arg == "-a";
            shown.push(arg.as_str());
        }
    }
    shown.join(" ")
}

/// Everything a discovery or failover call needs, passed explicitly
#[derive(Clone)]
pub struct ExecContext {
    config: KubercConfig,
    runner: PodCommandRunner,
    lister: Arc<dyn PodLister>,
    cancel: CancellationToken,
}

impl ExecContext {
    pub fn new(
        config: KubercConfig,
        executor: Arc<dyn PodExecutor>,
        lister: Arc<dyn PodLister>,
    ) -> Self {
        Self::with_cancellation(config, executor, lister, CancellationToken::new())
    }

    pub fn with_cancellation(
        config: KubercConfig,
        executor: Arc<dyn PodExecutor>,
        lister: Arc<dyn PodLister>,
        cancel: CancellationToken,
    ) -> Self {
        let runner = PodCommandRunner::new(executor, config.exec_timeout(), cancel.clone());
        Self {
            config,
            runner,
            lister,
            cancel,
        }
    }

    pub fn config(&self) -> &KubercConfig {
        &self.config
    }

    pub fn runner(&self) -> &PodCommandRunner {
        &self.runner
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// redis-cli against the data port of a redis pod
    pub fn redis_cli(&self) -> RedisCli {
        let redis = &self.config.redis;
        RedisCli::new(&redis.cli_path, redis.port)
            .with_container(redis.container.clone())
            .with_password(redis.password.clone())
    }

    /// redis-cli against the sentinel port of a sentinel pod
    pub fn sentinel_cli(&self) -> RedisCli {
        let sentinel = &self.config.sentinel;
        RedisCli::new(&self.config.redis.cli_path, sentinel.port)
            .with_container(sentinel.container.clone())
            .with_password(sentinel.password.clone())
    }

    /// Look up a single pod by name
    pub async fn pod(&self, namespace: &str, name: &str) -> Result<PodRef> {
        self.lister
            .get_pod(namespace, name)
            .await?
            .ok_or_else(|| KubercError::PodNotFound(format!("{}/{}", namespace, name)))
    }

    pub async fn redis_pod(&self, name: &str) -> Result<PodRef> {
        self.pod(&self.config.redis.namespace, name).await
    }

    pub async fn sentinel_pod(&self, name: &str) -> Result<PodRef> {
        self.pod(&self.config.sentinel.namespace, name).await
    }

    /// `ROLE` in a redis pod
    pub async fn redis_role(&self, pod: &PodRef) -> Result<RoleReply> {
        let cli = self.redis_cli();
        let text = cli.query(&self.runner, pod, &["role"]).await?;
        parse_role(&text).map_err(|reason| KubercError::Parse {
            pod: pod.name.clone(),
            command: cli.display(&["role"]),
            reason,
        })
    }

    /// `INFO [section]` in a redis pod
    pub async fn redis_info(&self, pod: &PodRef, section: Option<&str>) -> Result<InfoReply> {
        let args: Vec<&str> = std::iter::once("info").chain(section).collect();
        let text = self.redis_cli().query(&self.runner, pod, &args).await?;
        Ok(parse_info(&text))
    }

    /// Candidate pods for address resolution
    pub async fn redis_pods(&self) -> Result<Vec<PodRef>> {
        let pods = self
            .lister
            .list_pods(
                &self.config.redis.namespace,
                self.config.discovery.selector.as_deref(),
            )
            .await?;
        debug!(count = pods.len(), namespace = %self.config.redis.namespace, "listed pods");
        Ok(pods)
    }
}
