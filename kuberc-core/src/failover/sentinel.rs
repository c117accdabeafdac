use super::attempt::FailoverMode;
use super::orchestrator::{FailoverTarget, Observation};
use crate::cluster::graph::pods_by_ip;
use crate::cluster::types::NodeRole;
use crate::error::{KubercError, Result};
use crate::exec::{ExecContext, PodRef};
use crate::sentinel::{SentinelGroup, SentinelView};
use async_trait::async_trait;
use tracing::{debug, info};

/// `SENTINEL FAILOVER <master-name>` through one sentinel pod
///
/// Sentinel picks the replica to promote; this target only issues the
/// command and watches the master address move.
pub struct SentinelFailover {
    sentinel_pod: String,
    master_name: String,
    sentinel: Option<PodRef>,
    before: Option<SentinelGroup>,
}

impl SentinelFailover {
    pub fn new(sentinel_pod: impl Into<String>, master_name: impl Into<String>) -> Self {
        Self {
            sentinel_pod: sentinel_pod.into(),
            master_name: master_name.into(),
            sentinel: None,
            before: None,
        }
    }

    /// Group as it looked before the failover was issued
    pub fn before(&self) -> Option<&SentinelGroup> {
        self.before.as_ref()
    }
}

#[async_trait]
impl FailoverTarget for SentinelFailover {
    fn mode(&self) -> FailoverMode {
        FailoverMode::Sentinel
    }

    fn describe(&self) -> String {
        self.master_name.clone()
    }

    async fn initiate(&mut self, ctx: &ExecContext) -> Result<()> {
        let view = SentinelView::new(ctx);
        let sentinel = ctx.sentinel_pod(&self.sentinel_pod).await?;
        let group = view.query_pod(&sentinel, &self.master_name).await?;

        info!(
            master = %self.master_name,
            addr = %format!("{}:{}", group.master.ip, group.master.port),
            pod = ?group.master.pod_name(),
            replicas = group.replicas.len(),
            quorum = group.quorum,
            "pre-failover sentinel view"
        );

        ctx.sentinel_cli()
            .query(
                ctx.runner(),
                &sentinel,
                &["sentinel", "failover", &self.master_name],
            )
            .await?;

        self.sentinel = Some(sentinel);
        self.before = Some(group);
        Ok(())
    }

    async fn poll(&mut self, ctx: &ExecContext) -> Result<Observation> {
        let (Some(sentinel), Some(before)) = (&self.sentinel, &self.before) else {
            return Err(KubercError::Config(format!(
                "failover of {} polled before it was initiated",
                self.master_name
            )));
        };

        let master = SentinelView::new(ctx).master(sentinel, &self.master_name).await?;
        let addr = format!("{}:{}", master.ip, master.port);

        if (master.ip, master.port) == before.master.addr() {
            return Ok(Observation {
                master_addr: Some(addr.clone()),
                master: before.master.pod.clone(),
                ..Observation::pending(format!("master still at {}", addr))
            });
        }
        let Some(promoted) = before.replica_at(master.ip, master.port) else {
            return Ok(Observation {
                master_addr: Some(addr.clone()),
                ..Observation::pending(format!("master moved to {} which was not a replica", addr))
            });
        };

        // pods may have been rescheduled since the snapshot
        let pods = ctx.redis_pods().await?;
        let pod = pods_by_ip(&pods)
            .get(&master.ip)
            .map(|p| (*p).clone())
            .or_else(|| promoted.pod.clone());

        if ctx.config().failover.confirm_role {
            if let Some(pod) = &pod {
                let role = ctx.redis_role(pod).await?;
                if role.node_role() != NodeRole::Master {
                    debug!(pod = %pod.name, role = %role.node_role(), "promoted pod not master yet");
                    return Ok(Observation {
                        master: Some(pod.clone()),
                        master_addr: Some(addr),
                        ..Observation::pending(format!("{} still reports {}", pod.name, role.node_role()))
                    });
                }
            }
        }

        Ok(Observation {
            converged: true,
            detail: format!("master is now {}", addr),
            master: pod,
            master_addr: Some(addr),
        })
    }
}
