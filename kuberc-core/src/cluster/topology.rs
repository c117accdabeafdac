//! Cluster Topology Discovery
//!
//! Builds a `ClusterGraph` from one `CLUSTER NODES` call in a seed pod,
//! then optionally confirms what the join on IP could not settle.

use super::graph::ClusterGraph;
use super::types::{Liveness, NodeRole};
use crate::error::{KubercError, Result};
use crate::exec::{ExecContext, PodRef};
use crate::reply::{ClusterInfo, ClusterNodesReply, InfoReply, SkippedLine, parse_cluster_nodes, parse_info};
use futures::future::join_all;
use serde::Serialize;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// Outcome of a discovery run
#[derive(Debug, Clone, Serialize)]
pub struct TopologyReport {
    pub seed: PodRef,
    pub graph: ClusterGraph,
    /// `CLUSTER NODES` lines that could not be parsed
    pub skipped: Vec<SkippedLine>,
}

impl TopologyReport {
    pub fn is_degraded(&self) -> bool {
        self.graph.is_degraded()
    }
}

/// Cluster topology discovery over an `ExecContext`
pub struct ClusterTopology<'a> {
    ctx: &'a ExecContext,
}

impl<'a> ClusterTopology<'a> {
    pub fn new(ctx: &'a ExecContext) -> Self {
        Self { ctx }
    }

    /// `CLUSTER NODES` in one pod
    pub async fn cluster_nodes(&self, pod: &PodRef) -> Result<ClusterNodesReply> {
        let text = self
            .ctx
            .redis_cli()
            .query(self.ctx.runner(), pod, &["cluster", "nodes"])
            .await?;
        let reply = parse_cluster_nodes(&text);

        for skipped in &reply.skipped {
            warn!(
                pod = %pod.name,
                line = skipped.line_no,
                reason = %skipped.reason,
                "skipping CLUSTER NODES line"
            );
        }
        Ok(reply)
    }

    /// Discover the cluster as seen from `seed`
    pub async fn discover(&self, seed: &str) -> Result<TopologyReport> {
        let seed = self.ctx.redis_pod(seed).await?;
        let reply = self.cluster_nodes(&seed).await?;
        let pods = self.ctx.redis_pods().await?;
        let mut graph = ClusterGraph::resolve(reply.rows, &pods);

        let discovery = &self.ctx.config().discovery;
        if discovery.confirm_unresolved {
            self.probe_unresolved(&seed, &mut graph).await?;
        }
        if discovery.confirm_roles {
            self.confirm_roles(&mut graph).await?;
        }

        info!(
            seed = %seed.name,
            nodes = graph.len(),
            masters = graph.masters().len(),
            unresolved = graph.unresolved().len(),
            slots = graph.slots_covered(),
            skipped = reply.skipped.len(),
            "discovered cluster topology"
        );
        if graph.is_degraded() {
            warn!(slots = graph.slots_covered(), "cluster does not cover all hash slots");
        }

        Ok(TopologyReport {
            seed,
            graph,
            skipped: reply.skipped,
        })
    }

    /// PING every unresolved node address from inside the seed pod
    async fn probe_unresolved(&self, seed: &PodRef, graph: &mut ClusterGraph) -> Result<()> {
        let targets: Vec<(String, IpAddr, u16)> = graph
            .unresolved()
            .iter()
            .filter_map(|n| n.ip().map(|ip| (n.id().to_string(), ip, n.row.addr.port)))
            .collect();
        if targets.is_empty() {
            return Ok(());
        }
        debug!(count = targets.len(), "probing nodes with no matching pod");

        let probes = targets
            .iter()
            .map(|(id, ip, port)| async move { (id, self.ping(seed, *ip, *port).await) });

        for (id, alive) in join_all(probes).await {
            let liveness = if alive? {
                Liveness::Alive
            } else {
                Liveness::Unreachable
            };
            if let Some(node) = graph.get_mut(id) {
                node.liveness = liveness;
            }
        }
        Ok(())
    }

    async fn ping(&self, seed: &PodRef, ip: IpAddr, port: u16) -> Result<bool> {
        let cli = self.ctx.redis_cli().against(ip.to_string(), port);
        let attempts = self.ctx.config().discovery.confirm_retries + 1;

        for attempt in 1..=attempts {
            match cli.query(self.ctx.runner(), seed, &["ping"]).await {
                Ok(reply) if reply.trim() == "PONG" => return Ok(true),
                Ok(reply) => debug!(%ip, port, attempt, reply = %reply.trim(), "unexpected PING reply"),
                // an error reply still proves the process is up
                Err(err) if err.is_redis_error() => return Ok(true),
                Err(KubercError::Cancelled) => return Err(KubercError::Cancelled),
                Err(err) => debug!(%ip, port, attempt, error = %err, "probe failed"),
            }
        }

        warn!(%ip, port, attempts, "node with no matching pod is unreachable");
        Ok(false)
    }

    /// Run ROLE in every resolved pod
    ///
    /// Fills in roles the flags left unknown; disagreements are logged and
    /// the flags are kept.
    async fn confirm_roles(&self, graph: &mut ClusterGraph) -> Result<()> {
        let targets: Vec<(String, PodRef)> = graph
            .nodes()
            .filter_map(|n| n.pod.clone().map(|pod| (n.id().to_string(), pod)))
            .collect();

        let probes = targets
            .iter()
            .map(|(id, pod)| async move { (id, pod, self.ctx.redis_role(pod).await) });

        for (id, pod, outcome) in join_all(probes).await {
            let reported = match outcome {
                Ok(role) => role.node_role(),
                Err(KubercError::Cancelled) => return Err(KubercError::Cancelled),
                Err(err) => {
                    warn!(pod = %pod.name, error = %err, "ROLE probe failed");
                    continue;
                }
            };
            let Some(node) = graph.get_mut(id) else {
                continue;
            };
            if node.role == NodeRole::Unknown {
                node.role = reported;
            } else if node.role != reported {
                warn!(
                    pod = %pod.name,
                    node_id = %id,
                    flags = %node.role,
                    role = %reported,
                    "ROLE disagrees with CLUSTER NODES flags"
                );
            }
        }
        Ok(())
    }

    /// `CLUSTER INFO` in the seed pod
    pub async fn cluster_info(&self, seed: &str) -> Result<ClusterInfo> {
        let pod = self.ctx.redis_pod(seed).await?;
        let cli = self.ctx.redis_cli();
        let args = ["cluster", "info"];
        let text = cli.query(self.ctx.runner(), &pod, &args).await?;

        ClusterInfo::from_reply(&parse_info(&text)).map_err(|reason| KubercError::Parse {
            pod: pod.name.clone(),
            command: cli.display(&args),
            reason,
        })
    }

    /// Pods to run a per-node command in: the seed alone, or every pod in the cluster
    pub async fn cluster_pods(&self, seed: &str, all: bool) -> Result<Vec<PodRef>> {
        if !all {
            return Ok(vec![self.ctx.redis_pod(seed).await?]);
        }
        let report = self.discover(seed).await?;
        let pods = report.graph.pods();
        if pods.is_empty() {
            return Ok(vec![report.seed]);
        }
        Ok(pods)
    }

    /// `INFO [section]` in each pod, concurrently; one failure does not hide the others
    pub async fn node_info(
        &self,
        pods: &[PodRef],
        section: Option<&str>,
    ) -> Vec<(PodRef, Result<InfoReply>)> {
        let calls = pods
            .iter()
            .map(|pod| async move { (pod.clone(), self.ctx.redis_info(pod, section).await) });
        join_all(calls).await
    }
}
