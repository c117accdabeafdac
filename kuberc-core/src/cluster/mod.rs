//! Redis Cluster topology
//!
//! - `types`: node rows, flags and slot ranges
//! - `graph`: the node graph joined with pods by IP
//! - `topology`: discovery through a seed pod

pub mod graph;
pub mod topology;
pub mod types;

pub use graph::{ClusterGraph, NodeListing, resolve_nodes};
pub use topology::{ClusterTopology, TopologyReport};
pub use types::{
    LinkState, Liveness, MigrationDirection, NodeAddr, NodeFlags, NodeRole, NodeRow, RedisNode,
    SlotMigration, SlotRange, TOTAL_SLOTS, merge_ranges,
};
