//! kuberc core
//!
//! Maps Redis Cluster and Redis Sentinel topology onto the Kubernetes pods
//! hosting each Redis process, and drives master-to-replica failovers.
//!
//! Every operation takes an [`ExecContext`]: configuration, the pod executor,
//! the pod lister and a cancellation token, passed explicitly.

pub mod cluster;
pub mod config;
pub mod error;
pub mod exec;
pub mod failover;
pub mod reply;
pub mod sentinel;

pub use cluster::{ClusterGraph, ClusterTopology, NodeListing, RedisNode, TopologyReport};
pub use config::{ClusterFailoverMode, KubercConfig};
pub use error::{ExecFailure, KubercError, Result};
pub use exec::{ExecContext, KubeExecutor, PodCommandRunner, PodExecutor, PodLister, PodRef, RedisCli};
pub use failover::{
    ClusterFailover, FailoverOrchestrator, FailoverOutcome, FailoverReport, FailoverTarget,
    RetryPolicy, SentinelFailover,
};
pub use sentinel::{SentinelGroup, SentinelMember, SentinelView};
