//! Cluster graph: Redis nodes joined with the pods that host them

use super::types::{Liveness, NodeRole, NodeRow, RedisNode, TOTAL_SLOTS};
use crate::exec::PodRef;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

/// Snapshot of a cluster keyed by node id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterGraph {
    nodes: BTreeMap<String, RedisNode>,
}

/// One display row of a topology listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeListing {
    pub pod: Option<String>,
    pub ip: Option<IpAddr>,
    pub port: u16,
    pub node_id: String,
    /// Kubernetes node hosting the pod
    pub host: Option<String>,
    pub is_master: bool,
    pub role: NodeRole,
    pub master_id: Option<String>,
    pub slots: usize,
    pub liveness: Liveness,
}

/// Pick one pod per IP. Running pods win, then the smallest name, so the
/// result does not depend on the order pods were listed in.
pub(crate) fn pods_by_ip(pods: &[PodRef]) -> HashMap<IpAddr, &PodRef> {
    let mut by_ip: HashMap<IpAddr, &PodRef> = HashMap::new();
    for pod in pods {
        let Some(ip) = pod.ip else { continue };
        match by_ip.get(&ip) {
            Some(current) if prefer(current, pod) != Ordering::Greater => {}
            _ => {
                by_ip.insert(ip, pod);
            }
        }
    }
    by_ip
}

fn prefer(a: &PodRef, b: &PodRef) -> Ordering {
    b.is_running()
        .cmp(&a.is_running())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.namespace.cmp(&b.namespace))
}

/// Join node rows with pods on exact IP match
pub fn resolve_nodes(rows: Vec<NodeRow>, pods: &[PodRef]) -> ClusterGraph {
    ClusterGraph::resolve(rows, pods)
}

impl ClusterGraph {
    /// Join node rows with pods on exact IP match
    ///
    /// Nodes whose address matches no pod are kept with `pod: None`.
    pub fn resolve(rows: Vec<NodeRow>, pods: &[PodRef]) -> Self {
        let by_ip = pods_by_ip(pods);
        let nodes = rows
            .into_iter()
            .map(|row| {
                let pod = row.addr.ip.and_then(|ip| by_ip.get(&ip)).map(|p| (*p).clone());
                (row.id.clone(), RedisNode::new(row, pod))
            })
            .collect();
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RedisNode> {
        self.nodes.values()
    }

    pub fn get(&self, node_id: &str) -> Option<&RedisNode> {
        self.nodes.get(node_id)
    }

    pub(crate) fn get_mut(&mut self, node_id: &str) -> Option<&mut RedisNode> {
        self.nodes.get_mut(node_id)
    }

    pub fn masters(&self) -> Vec<&RedisNode> {
        self.nodes().filter(|n| n.is_master()).collect()
    }

    pub fn replicas(&self) -> Vec<&RedisNode> {
        self.nodes().filter(|n| n.is_replica()).collect()
    }

    pub fn replicas_of(&self, master_id: &str) -> Vec<&RedisNode> {
        self.nodes()
            .filter(|n| n.row.master_id.as_deref() == Some(master_id))
            .collect()
    }

    /// Master node id -> replica node ids
    pub fn replica_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = self
            .masters()
            .into_iter()
            .map(|m| (m.id().to_string(), Vec::new()))
            .collect();
        for node in self.nodes() {
            if let Some(master_id) = &node.row.master_id {
                map.entry(master_id.clone())
                    .or_default()
                    .push(node.id().to_string());
            }
        }
        map
    }

    /// Number of distinct slots owned by some node
    pub fn slots_covered(&self) -> usize {
        let mut covered = vec![false; TOTAL_SLOTS as usize];
        for node in self.nodes() {
            for range in &node.row.slots {
                for slot in range.start..=range.end {
                    covered[slot as usize] = true;
                }
            }
        }
        covered.iter().filter(|c| **c).count()
    }

    /// True when fewer than 16384 slots are covered
    pub fn is_degraded(&self) -> bool {
        self.slots_covered() != TOTAL_SLOTS as usize
    }

    /// Nodes whose address matched no known pod
    pub fn unresolved(&self) -> Vec<&RedisNode> {
        self.nodes().filter(|n| n.pod.is_none()).collect()
    }

    pub fn node_for_pod(&self, pod_name: &str) -> Option<&RedisNode> {
        self.nodes().find(|n| n.pod_name() == Some(pod_name))
    }

    /// Look a node up by node id or by the name of its pod
    pub fn find(&self, key: &str) -> Option<&RedisNode> {
        self.get(key).or_else(|| self.node_for_pod(key))
    }

    /// Node that answered the query
    pub fn myself(&self) -> Option<&RedisNode> {
        self.nodes().find(|n| n.row.flags.is_myself)
    }

    /// Pods hosting cluster members, sorted by name
    pub fn pods(&self) -> Vec<PodRef> {
        let mut pods: Vec<PodRef> = self.nodes().filter_map(|n| n.pod.clone()).collect();
        pods.sort_by(|a, b| a.name.cmp(&b.name));
        pods.dedup_by(|a, b| a.name == b.name && a.namespace == b.namespace);
        pods
    }

    /// Display rows sorted by pod name, ties broken by node id
    pub fn listing(&self) -> Vec<NodeListing> {
        let mut rows: Vec<NodeListing> = self
            .nodes()
            .map(|n| NodeListing {
                pod: n.pod.as_ref().map(|p| p.name.clone()),
                ip: n.ip(),
                port: n.row.addr.port,
                node_id: n.id().to_string(),
                host: n.pod.as_ref().and_then(|p| p.host.clone()),
                is_master: n.is_master(),
                role: n.role,
                master_id: n.row.master_id.clone(),
                slots: n.slot_count(),
                liveness: n.liveness,
            })
            .collect();
        rows.sort_by(|a, b| {
            a.pod
                .as_deref()
                .unwrap_or("")
                .cmp(b.pod.as_deref().unwrap_or(""))
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        rows
    }
}
