//! Redis reply parsers
//!
//! Pure functions over the textual output of redis-cli. Nothing here performs
//! I/O; multi-row replies never fail as a whole.

pub mod cluster_nodes;
pub mod info;
pub mod sentinel;

pub use cluster_nodes::{ClusterNodesReply, LineOutcome, SkippedLine, parse_cluster_nodes};
pub use info::{ClusterInfo, InfoReply, ReplicationInfo, RoleReply, parse_info, parse_role};
pub use sentinel::{
    SentinelMasterReply, SentinelReplicaReply, parse_field_pairs, parse_master_addr,
    parse_sentinel_master, parse_sentinel_masters, parse_sentinel_replicas,
};

/// Error prefixes Redis and Sentinel put in front of error replies
const ERROR_PREFIXES: &[&str] = &[
    "ERR",
    "WRONGTYPE",
    "NOAUTH",
    "WRONGPASS",
    "NOPERM",
    "NOGOODSLAVE",
    "NOQUORUM",
    "IDONTKNOW",
    "INPROG",
    "CLUSTERDOWN",
    "MOVED",
    "ASK",
    "LOADING",
    "BUSY",
    "READONLY",
    "MASTERDOWN",
    "NOREPLICAS",
    "UNKILLABLE",
];

/// Error message if `text` is a Redis error reply
///
/// Accepts both raw output (`ERR ...`) and tty-style output (`(error) ERR ...`).
pub fn reply_error(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.strip_prefix("(error)").map(str::trim).unwrap_or(line);
    let prefix = line.split_whitespace().next()?;
    ERROR_PREFIXES
        .contains(&prefix)
        .then(|| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_error_detection() {
        assert_eq!(
            reply_error("ERR No such master with that name\n").as_deref(),
            Some("ERR No such master with that name")
        );
        assert_eq!(
            reply_error("(error) NOGOODSLAVE No suitable replica to promote").as_deref(),
            Some("NOGOODSLAVE No suitable replica to promote")
        );
        assert!(reply_error("\nINPROG Failover already in progress\n").is_some());
    }

    #[test]
    fn test_regular_replies_are_not_errors() {
        assert_eq!(reply_error("OK\n"), None);
        assert_eq!(reply_error("PONG\n"), None);
        assert_eq!(reply_error("master\n100\n"), None);
        assert_eq!(reply_error("name\nmymaster\n"), None);
        assert_eq!(reply_error("# Replication\nrole:master\n"), None);
        assert_eq!(reply_error(""), None);
    }
}
