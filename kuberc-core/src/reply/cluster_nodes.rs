//! `CLUSTER NODES` parser
//!
//! Each line is parsed independently into a `LineOutcome`. A bad line becomes
//! a `SkippedLine` and parsing continues, so one corrupt row from a flapping
//! node never hides the rest of the cluster.

use crate::cluster::types::{
    LinkState, MigrationDirection, NodeAddr, NodeFlags, NodeRole, NodeRow, SlotMigration,
    SlotRange, TOTAL_SLOTS,
};
use serde::Serialize;
use std::collections::HashSet;
use std::net::IpAddr;

/// A line that could not be turned into a node row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    /// 1-based line number in the reply
    pub line_no: usize,
    pub line: String,
    pub reason: String,
}

/// Outcome of parsing one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Row(NodeRow),
    Skip(SkippedLine),
}

/// Parsed `CLUSTER NODES` reply: good rows plus the lines that were skipped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterNodesReply {
    pub rows: Vec<NodeRow>,
    pub skipped: Vec<SkippedLine>,
}

impl ClusterNodesReply {
    /// The row flagged `myself`, i.e. the node that answered
    pub fn myself(&self) -> Option<&NodeRow> {
        self.rows.iter().find(|r| r.flags.is_myself)
    }
}

/// Parse a full `CLUSTER NODES` reply. Never fails.
pub fn parse_cluster_nodes(text: &str) -> ClusterNodesReply {
    let mut reply = ClusterNodesReply::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 1;

        match parse_line(line_no, line) {
            LineOutcome::Row(row) => {
                if !seen.insert(row.id.clone()) {
                    reply.skipped.push(skip(line_no, line, "duplicate node id"));
                } else {
                    reply.rows.push(row);
                }
            }
            LineOutcome::Skip(skipped) => reply.skipped.push(skipped),
        }
    }

    reply
}

/// Parse one non-empty line
pub fn parse_line(line_no: usize, line: &str) -> LineOutcome {
    match parse_row(line) {
        Ok(row) => LineOutcome::Row(row),
        Err(reason) => LineOutcome::Skip(skip(line_no, line, &reason)),
    }
}

fn skip(line_no: usize, line: &str, reason: &str) -> SkippedLine {
    SkippedLine {
        line_no,
        line: line.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_row(line: &str) -> Result<NodeRow, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 8 {
        return Err(format!("expected at least 8 fields, got {}", fields.len()));
    }

    let id = parse_node_id(fields[0])?;
    let addr = parse_addr(fields[1])?;
    let flags = NodeFlags::parse(fields[2]);
    let master_id = match fields[3] {
        "-" => None,
        other => Some(parse_node_id(other)?),
    };
    let ping_sent = parse_number(fields[4], "ping-sent")?;
    let pong_recv = parse_number(fields[5], "pong-recv")?;
    let config_epoch = parse_number(fields[6], "config-epoch")?;
    let link_state = match fields[7] {
        "connected" => LinkState::Connected,
        "disconnected" => LinkState::Disconnected,
        other => return Err(format!("unknown link state {:?}", other)),
    };

    let mut slots = Vec::new();
    let mut migrations = Vec::new();
    for token in &fields[8..] {
        if token.starts_with('[') {
            migrations.push(parse_migration(token)?);
        } else {
            slots.push(parse_slot_range(token)?);
        }
    }

    if !slots.is_empty() && flags.role() != NodeRole::Master {
        return Err(format!(
            "node {} owns slots but is not flagged master",
            id
        ));
    }
    if master_id.is_some() && flags.is_master {
        return Err(format!("master {} references a master id", id));
    }

    Ok(NodeRow {
        id,
        addr,
        flags,
        master_id,
        ping_sent,
        pong_recv,
        config_epoch,
        link_state,
        slots,
        migrations,
    })
}

/// Node ids are 40 hex characters assigned by Redis
fn parse_node_id(s: &str) -> Result<String, String> {
    if s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(s.to_string())
    } else {
        Err(format!("invalid node id {:?}", s))
    }
}

fn parse_number(s: &str, what: &str) -> Result<u64, String> {
    s.parse()
        .map_err(|_| format!("invalid {} {:?}", what, s))
}

/// `ip:port@cport[,hostname]`; the bus port is absent before Redis 4
pub fn parse_addr(s: &str) -> Result<NodeAddr, String> {
    let (endpoint, hostname) = match s.split_once(',') {
        Some((endpoint, host)) if !host.is_empty() => (endpoint, Some(host.to_string())),
        Some((endpoint, _)) => (endpoint, None),
        None => (s, None),
    };

    let (host_port, bus_port) = match endpoint.split_once('@') {
        Some((hp, bus)) => {
            let bus: u16 = bus
                .parse()
                .map_err(|_| format!("invalid bus port in {:?}", s))?;
            (hp, Some(bus))
        }
        None => (endpoint, None),
    };

    let (ip, port) = host_port
        .rsplit_once(':')
        .ok_or_else(|| format!("address {:?} has no port", s))?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("invalid port in {:?}", s))?;

    let ip = ip.trim_start_matches('[').trim_end_matches(']');
    let ip = if ip.is_empty() {
        None
    } else {
        Some(
            ip.parse::<IpAddr>()
                .map_err(|_| format!("invalid ip in {:?}", s))?,
        )
    };

    Ok(NodeAddr {
        ip,
        port,
        bus_port,
        hostname,
    })
}

fn parse_slot(s: &str) -> Result<u16, String> {
    let slot: u16 = s.parse().map_err(|_| format!("invalid slot {:?}", s))?;
    if slot >= TOTAL_SLOTS {
        return Err(format!("slot {} out of range", slot));
    }
    Ok(slot)
}

fn parse_slot_range(token: &str) -> Result<SlotRange, String> {
    let (start, end) = match token.split_once('-') {
        Some((a, b)) => (parse_slot(a)?, parse_slot(b)?),
        None => {
            let slot = parse_slot(token)?;
            (slot, slot)
        }
    };
    SlotRange::new(start, end).ok_or_else(|| format!("inverted slot range {:?}", token))
}

/// `[slot->-node]` or `[slot-<-node]`
fn parse_migration(token: &str) -> Result<SlotMigration, String> {
    let inner = token
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| format!("malformed migration marker {:?}", token))?;

    let (slot, direction, peer) = if let Some((slot, peer)) = inner.split_once("->-") {
        (slot, MigrationDirection::Migrating, peer)
    } else if let Some((slot, peer)) = inner.split_once("-<-") {
        (slot, MigrationDirection::Importing, peer)
    } else {
        return Err(format!("malformed migration marker {:?}", token));
    };

    Ok(SlotMigration {
        slot: parse_slot(slot)?,
        direction,
        peer_id: parse_node_id(peer)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca";
    const B: &str = "67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1";
    const C: &str = "292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f";

    #[test]
    fn test_parse_master_row() {
        let line = format!(
            "{A} 10.0.0.1:6379@16379 myself,master - 0 1426238316232 2 connected 0-5460 7000"
        );
        let reply = parse_cluster_nodes(&line);
        assert!(reply.skipped.is_empty());

        let row = &reply.rows[0];
        assert_eq!(row.id, A);
        assert_eq!(row.addr.ip, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(row.addr.port, 6379);
        assert_eq!(row.addr.bus_port, Some(16379));
        assert!(row.flags.is_myself);
        assert_eq!(row.role(), NodeRole::Master);
        assert_eq!(row.master_id, None);
        assert_eq!(row.config_epoch, 2);
        assert_eq!(row.link_state, LinkState::Connected);
        assert_eq!(row.slot_count(), 5461 + 1);
        assert_eq!(reply.myself().map(|r| r.id.as_str()), Some(A));
    }

    #[test]
    fn test_parse_replica_row_with_hostname() {
        let line = format!(
            "{B} 10.0.0.2:6379@16379,redis-1.redis slave {A} 0 1426238317239 4 connected"
        );
        let reply = parse_cluster_nodes(&line);
        let row = &reply.rows[0];
        assert_eq!(row.role(), NodeRole::Replica);
        assert_eq!(row.master_id.as_deref(), Some(A));
        assert_eq!(row.addr.hostname.as_deref(), Some("redis-1.redis"));
        assert!(row.slots.is_empty());
    }

    #[test]
    fn test_parse_migration_markers() {
        let line = format!(
            "{A} 10.0.0.1:6379@16379 master - 0 0 1 connected 0-99 [100->-{B}] [200-<-{C}]"
        );
        let reply = parse_cluster_nodes(&line);
        let row = &reply.rows[0];
        assert_eq!(row.slots, vec![SlotRange { start: 0, end: 99 }]);
        assert_eq!(row.migrations.len(), 2);
        assert_eq!(row.migrations[0].slot, 100);
        assert_eq!(row.migrations[0].direction, MigrationDirection::Migrating);
        assert_eq!(row.migrations[0].peer_id, B);
        assert_eq!(row.migrations[1].direction, MigrationDirection::Importing);
    }

    #[test]
    fn test_parse_noaddr_and_legacy_address() {
        let addr = parse_addr(":0@0").unwrap();
        assert_eq!(addr.ip, None);
        assert_eq!(addr.port, 0);

        let addr = parse_addr("127.0.0.1:30001").unwrap();
        assert_eq!(addr.bus_port, None);

        let addr = parse_addr("::1:6379@16379").unwrap();
        assert_eq!(addr.ip, Some("::1".parse().unwrap()));
        assert_eq!(addr.port, 6379);

        assert!(parse_addr("10.0.0.1").is_err());
        assert!(parse_addr("not-an-ip:6379@16379").is_err());
    }

    #[test]
    fn test_bad_lines_are_skipped_not_fatal() {
        let text = format!(
            "{A} 10.0.0.1:6379@16379 myself,master - 0 0 1 connected 0-8191\n\
             garbage line\n\
             {B} 10.0.0.2:notaport@16379 master - 0 0 2 connected 8192-16383\n\
             {C} 10.0.0.3:6379@16379 slave {A} 0 0 1 connected\n"
        );
        let reply = parse_cluster_nodes(&text);

        assert_eq!(reply.rows.len(), 2);
        assert_eq!(reply.skipped.len(), 2);
        assert_eq!(reply.skipped[0].line_no, 2);
        assert_eq!(reply.skipped[1].line_no, 3);
        assert!(reply.skipped[1].reason.contains("port"));
    }

    #[test]
    fn test_slots_on_replica_are_rejected() {
        let line = format!("{B} 10.0.0.2:6379@16379 slave {A} 0 0 1 connected 0-10");
        let reply = parse_cluster_nodes(&line);
        assert!(reply.rows.is_empty());
        assert!(reply.skipped[0].reason.contains("not flagged master"));
    }

    #[test]
    fn test_duplicate_ids_are_skipped() {
        let text = format!(
            "{A} 10.0.0.1:6379@16379 master - 0 0 1 connected\n{A} 10.0.0.9:6379@16379 master - 0 0 1 connected\n"
        );
        let reply = parse_cluster_nodes(&text);
        assert_eq!(reply.rows.len(), 1);
        assert_eq!(reply.rows[0].addr.ip, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(reply.skipped[0].reason, "duplicate node id");
    }

    #[test]
    fn test_out_of_range_slot() {
        let line = format!("{A} 10.0.0.1:6379@16379 master - 0 0 1 connected 16000-16384");
        let reply = parse_cluster_nodes(&line);
        assert!(reply.rows.is_empty());
        assert!(reply.skipped[0].reason.contains("out of range"));
    }

    #[test]
    fn test_empty_reply_and_crlf() {
        assert_eq!(parse_cluster_nodes(""), ClusterNodesReply::default());

        let text = format!("{A} 10.0.0.1:6379@16379 master - 0 0 1 connected 0-1\r\n\r\n");
        let reply = parse_cluster_nodes(&text);
        assert_eq!(reply.rows.len(), 1);
        assert!(reply.skipped.is_empty());
    }
}
