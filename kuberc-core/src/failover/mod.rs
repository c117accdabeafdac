//! Failover Orchestration
//!
//! A bounded state machine over one attempt:
//! - Initiated: snapshot the topology and issue the failover command once
//! - Polling: re-read the topology every interval until it converges
//! - Succeeded / TimedOut / Aborted: terminal, returned in a `FailoverReport`
//!
//! `SentinelFailover` leaves the choice of replica to Sentinel;
//! `ClusterFailover` picks one deterministically unless told which.

pub mod attempt;
pub mod cluster;
pub mod orchestrator;
pub mod policy;
pub mod sentinel;

pub use attempt::{FailoverAttempt, FailoverMode, FailoverOutcome, FailoverState};
pub use cluster::{ClusterFailover, ReplicaCandidate, pick_replica, select_replica};
pub use orchestrator::{FailoverOrchestrator, FailoverReport, FailoverTarget, Observation};
pub use policy::{Clock, RetryPolicy, TokioClock};
pub use sentinel::SentinelFailover;
