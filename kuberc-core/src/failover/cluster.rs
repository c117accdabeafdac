use super::attempt::FailoverMode;
use super::orchestrator::{FailoverTarget, Observation};
use crate::cluster::{ClusterGraph, ClusterTopology, NodeRole, RedisNode};
use crate::config::ClusterFailoverMode;
use crate::error::{KubercError, Result};
use crate::exec::{ExecContext, PodRef};
use crate::reply::ReplicationInfo;
use async_trait::async_trait;
use futures::future::join_all;
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// A replica that could be promoted, with its replication offset if known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaCandidate {
    pub node_id: String,
    pub pod: PodRef,
    pub offset: Option<u64>,
}

/// Highest offset wins; missing offsets lose to any known one; ties go to
/// the smallest pod name, then the smallest node id.
fn candidate_order(a: &ReplicaCandidate, b: &ReplicaCandidate) -> Ordering {
    b.offset
        .cmp(&a.offset)
        .then_with(|| a.pod.name.cmp(&b.pod.name))
        .then_with(|| a.node_id.cmp(&b.node_id))
}

/// Pick the replica to promote from a set of candidates
pub fn pick_replica(mut candidates: Vec<ReplicaCandidate>) -> Option<ReplicaCandidate> {
    candidates.sort_by(candidate_order);
    candidates.into_iter().next()
}

/// Choose a replica of `master_id` by most recent sync
///
/// Replicas without a pod, flagged `fail` or `nofailover` are not
/// candidates. Offsets come from `INFO replication` in each pod; a pod
/// that cannot be asked keeps no offset rather than failing the choice.
pub async fn select_replica(
    ctx: &ExecContext,
    graph: &ClusterGraph,
    master_id: &str,
) -> Result<ReplicaCandidate> {
    let eligible: Vec<(&RedisNode, &PodRef)> = graph
        .replicas_of(master_id)
        .into_iter()
        .filter(|n| !n.row.flags.is_fail && !n.row.flags.is_nofailover)
        .filter_map(|n| n.pod.as_ref().map(|pod| (n, pod)))
        .collect();
    if eligible.is_empty() {
        return Err(KubercError::NoEligibleReplica(format!(
            "master {} has no replica running in a known pod",
            master_id
        )));
    }

    let probes = eligible.iter().map(|(node, pod)| async move {
        let offset = match ctx.redis_info(pod, Some("replication")).await {
            Ok(info) => ReplicationInfo::from_reply(&info)
                .ok()
                .and_then(|r| r.slave_repl_offset),
            Err(err) => {
                warn!(pod = %pod.name, error = %err, "could not read replication offset");
                None
            }
        };
        ReplicaCandidate {
            node_id: node.id().to_string(),
            pod: (*pod).clone(),
            offset,
        }
    });
    let candidates = join_all(probes).await;

    if ctx.runner().is_cancelled() {
        return Err(KubercError::Cancelled);
    }
    for c in &candidates {
        debug!(pod = %c.pod.name, node_id = %c.node_id, offset = ?c.offset, "replica candidate");
    }

    pick_replica(candidates).ok_or_else(|| KubercError::NoEligibleReplica(master_id.to_string()))
}

/// `CLUSTER FAILOVER [FORCE|TAKEOVER]` on a replica of the target master
pub struct ClusterFailover {
    seed: String,
    target: String,
    replica: Option<String>,
    mode: ClusterFailoverMode,
    chosen: Option<ReplicaCandidate>,
}

impl ClusterFailover {
    /// `target` is a master node id or the name of the pod hosting it
    pub fn new(seed: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            target: target.into(),
            replica: None,
            mode: ClusterFailoverMode::Default,
            chosen: None,
        }
    }

    /// Replica to promote, by node id or pod name; chosen automatically when unset
    pub fn with_replica(mut self, replica: Option<String>) -> Self {
        self.replica = replica;
        self
    }

    pub fn with_mode(mut self, mode: ClusterFailoverMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn command(&self) -> Vec<&'static str> {
        match self.mode {
            ClusterFailoverMode::Default => vec!["cluster", "failover"],
            ClusterFailoverMode::Force => vec!["cluster", "failover", "force"],
            ClusterFailoverMode::Takeover => vec!["cluster", "failover", "takeover"],
        }
    }

    fn named_replica(&self, graph: &ClusterGraph, master: &RedisNode, key: &str) -> Result<ReplicaCandidate> {
        let node = graph
            .find(key)
            .ok_or_else(|| KubercError::NodeNotFound(key.to_string()))?;
        if node.row.master_id.as_deref() != Some(master.id()) {
            return Err(KubercError::NoEligibleReplica(format!(
                "{} is not a replica of {}",
                key,
                master.id()
            )));
        }
        let pod = node.pod.clone().ok_or_else(|| {
            KubercError::NoEligibleReplica(format!("replica {} matches no pod", node.id()))
        })?;
        Ok(ReplicaCandidate {
            node_id: node.id().to_string(),
            pod,
            offset: None,
        })
    }
}

#[async_trait]
impl FailoverTarget for ClusterFailover {
    fn mode(&self) -> FailoverMode {
        FailoverMode::Cluster
    }

    fn describe(&self) -> String {
        self.target.clone()
    }

    fn chosen_replica(&self) -> Option<String> {
        self.chosen.as_ref().map(|c| c.pod.name.clone())
    }

    async fn initiate(&mut self, ctx: &ExecContext) -> Result<()> {
        let report = ClusterTopology::new(ctx).discover(&self.seed).await?;
        let graph = &report.graph;

        let master = graph
            .find(&self.target)
            .filter(|n| n.is_master())
            .ok_or_else(|| KubercError::NodeNotFound(format!("master {}", self.target)))?;

        let chosen = match &self.replica {
            Some(key) => self.named_replica(graph, master, key)?,
            None => select_replica(ctx, graph, master.id()).await?,
        };
        info!(
            master = %master.id(),
            replica = %chosen.node_id,
            pod = %chosen.pod.name,
            offset = ?chosen.offset,
            mode = ?self.mode,
            "promoting replica"
        );

        ctx.redis_cli()
            .query(ctx.runner(), &chosen.pod, &self.command())
            .await?;
        self.chosen = Some(chosen);
        Ok(())
    }

    async fn poll(&mut self, ctx: &ExecContext) -> Result<Observation> {
        let Some(chosen) = &self.chosen else {
            return Err(KubercError::Config(format!(
                "failover of {} polled before it was initiated",
                self.target
            )));
        };

        let reply = ClusterTopology::new(ctx).cluster_nodes(&chosen.pod).await?;
        let Some(myself) = reply.myself() else {
            return Ok(Observation::pending(format!(
                "no myself row in CLUSTER NODES from {}",
                chosen.pod.name
            )));
        };

        let addr = myself.addr.to_string();
        if myself.id == chosen.node_id && myself.role() == NodeRole::Master {
            return Ok(Observation {
                converged: true,
                master: Some(chosen.pod.clone()),
                master_addr: Some(addr),
                detail: format!("{} is master with {} slots", chosen.pod.name, myself.slot_count()),
            });
        }
        Ok(Observation {
            master_addr: Some(addr),
            ..Observation::pending(format!("{} still reports {}", chosen.pod.name, myself.role()))
        })
    }
}
