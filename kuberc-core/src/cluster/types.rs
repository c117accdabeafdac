use crate::exec::PodRef;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

/// Total number of hash slots (Redis-compatible)
pub const TOTAL_SLOTS: u16 = 16384;

/// Role a node reports in its flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    #[serde(rename = "slave")]
    Replica,
    #[default]
    Unknown,
}

impl NodeRole {
    pub fn parse(s: &str) -> Self {
        match s {
            "master" => Self::Master,
            "slave" | "replica" => Self::Replica,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => write!(f, "master"),
            Self::Replica => write!(f, "slave"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Node flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct NodeFlags {
    pub is_master: bool,
    pub is_replica: bool,
    pub is_myself: bool,
    pub is_fail: bool,
    pub is_pfail: bool,
    pub is_handshake: bool,
    pub is_noaddr: bool,
    pub is_nofailover: bool,
}

impl NodeFlags {
    /// Parse the comma-joined flag field; unknown flags are ignored
    pub fn parse(field: &str) -> Self {
        let mut flags = Self::default();
        for flag in field.split(',') {
            match flag {
                "master" => flags.is_master = true,
                "slave" => flags.is_replica = true,
                "myself" => flags.is_myself = true,
                "fail" => flags.is_fail = true,
                "fail?" => flags.is_pfail = true,
                "handshake" => flags.is_handshake = true,
                "noaddr" => flags.is_noaddr = true,
                "nofailover" => flags.is_nofailover = true,
                _ => {}
            }
        }
        flags
    }

    pub fn role(&self) -> NodeRole {
        if self.is_master {
            NodeRole::Master
        } else if self.is_replica {
            NodeRole::Replica
        } else {
            NodeRole::Unknown
        }
    }
}

/// Slot range (inclusive start, inclusive end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
}

impl SlotRange {
    /// Returns None when the range is inverted or out of bounds
    pub fn new(start: u16, end: u16) -> Option<Self> {
        (start <= end && end < TOTAL_SLOTS).then_some(Self { start, end })
    }

    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    pub fn count(&self) -> usize {
        (self.end - self.start) as usize + 1
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Collapse a set of slots into the minimal list of sorted ranges
pub fn merge_ranges<I: IntoIterator<Item = u16>>(slots: I) -> Vec<SlotRange> {
    let mut slots: Vec<u16> = slots.into_iter().filter(|s| *s < TOTAL_SLOTS).collect();
    slots.sort_unstable();
    slots.dedup();

    let mut ranges: Vec<SlotRange> = Vec::new();
    for slot in slots {
        match ranges.last_mut() {
            Some(last) if last.end + 1 == slot => last.end = slot,
            _ => ranges.push(SlotRange {
                start: slot,
                end: slot,
            }),
        }
    }
    ranges
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// `[slot->-node]`: this node is sending the slot away
    Migrating,
    /// `[slot-<-node]`: this node is receiving the slot
    Importing,
}

/// In-flight slot migration marker, recorded but not acted on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotMigration {
    pub slot: u16,
    pub direction: MigrationDirection,
    pub peer_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// Advertised address of a node (`ip:port@cport[,hostname]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeAddr {
    /// None for nodes flagged `noaddr`
    pub ip: Option<IpAddr>,
    pub port: u16,
    pub bus_port: Option<u16>,
    pub hostname: Option<String>,
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            Some(ip) => write!(f, "{}:{}", ip, self.port),
            None => write!(f, ":{}", self.port),
        }
    }
}

/// One well-formed row of `CLUSTER NODES`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRow {
    pub id: String,
    pub addr: NodeAddr,
    pub flags: NodeFlags,
    pub master_id: Option<String>,
    pub ping_sent: u64,
    pub pong_recv: u64,
    pub config_epoch: u64,
    pub link_state: LinkState,
    pub slots: Vec<SlotRange>,
    pub migrations: Vec<SlotMigration>,
}

impl NodeRow {
    pub fn role(&self) -> NodeRole {
        self.flags.role()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.iter().map(SlotRange::count).sum()
    }
}

/// Result of probing a node that could not be tied to a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    #[default]
    NotChecked,
    Alive,
    Unreachable,
}

/// A cluster member joined with the pod hosting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedisNode {
    #[serde(flatten)]
    pub row: NodeRow,
    /// None when the advertised IP matches no known pod
    pub pod: Option<PodRef>,
    pub role: NodeRole,
    pub liveness: Liveness,
}

impl RedisNode {
    pub fn new(row: NodeRow, pod: Option<PodRef>) -> Self {
        let role = row.role();
        Self {
            row,
            pod,
            role,
            liveness: Liveness::NotChecked,
        }
    }

    pub fn id(&self) -> &str {
        &self.row.id
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.row.addr.ip
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    pub fn is_replica(&self) -> bool {
        self.role == NodeRole::Replica
    }

    pub fn slot_count(&self) -> usize {
        self.row.slot_count()
    }

    pub fn pod_name(&self) -> Option<&str> {
        self.pod.as_ref().map(|p| p.name.as_str())
    }
}
