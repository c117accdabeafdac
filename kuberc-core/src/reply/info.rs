//! `INFO`, `CLUSTER INFO` and `ROLE` replies

use crate::cluster::types::NodeRole;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// `key:value` lines grouped by `# Section` headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InfoReply {
    /// Section name (lowercased) -> fields; headerless replies land in ""
    pub sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl InfoReply {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.sections
            .values()
            .find_map(|fields| fields.get(key))
            .map(String::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn section(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.sections.get(&name.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.sections.values().all(BTreeMap::is_empty)
    }
}

impl fmt::Display for InfoReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, fields) in &self.sections {
            if !name.is_empty() {
                let mut chars = name.chars();
                let title: String = chars
                    .next()
                    .map(|c| c.to_ascii_uppercase())
                    .into_iter()
                    .chain(chars)
                    .collect();
                writeln!(f, "# {}", title)?;
            }
            for (key, value) in fields {
                writeln!(f, "{}:{}", key, value)?;
            }
        }
        Ok(())
    }
}

/// Parse any `key:value` style reply. Lines without a colon are ignored.
pub fn parse_info(text: &str) -> InfoReply {
    let mut reply = InfoReply::default();
    let mut current = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            current = header.trim().to_ascii_lowercase();
            reply.sections.entry(current.clone()).or_default();
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            reply
                .sections
                .entry(current.clone())
                .or_default()
                .insert(key.to_string(), value.to_string());
        }
    }

    reply
}

/// Typed view over `CLUSTER INFO`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterInfo {
    pub state: String,
    pub slots_assigned: u64,
    pub slots_ok: u64,
    pub slots_pfail: u64,
    pub slots_fail: u64,
    pub known_nodes: u64,
    pub size: u64,
    pub current_epoch: u64,
}

impl ClusterInfo {
    pub fn from_reply(reply: &InfoReply) -> Result<Self, String> {
        let state = reply
            .get("cluster_state")
            .ok_or_else(|| "missing cluster_state".to_string())?
            .to_string();
        let num = |key: &str| reply.get_u64(key).unwrap_or(0);

        Ok(Self {
            state,
            slots_assigned: num("cluster_slots_assigned"),
            slots_ok: num("cluster_slots_ok"),
            slots_pfail: num("cluster_slots_pfail"),
            slots_fail: num("cluster_slots_fail"),
            known_nodes: num("cluster_known_nodes"),
            size: num("cluster_size"),
            current_epoch: num("cluster_current_epoch"),
        })
    }

    pub fn is_ok(&self) -> bool {
        self.state == "ok"
    }
}

/// Typed view over the `replication` section of `INFO`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationInfo {
    pub role: NodeRole,
    pub connected_slaves: u64,
    pub master_host: Option<String>,
    pub master_port: Option<u16>,
    pub master_link_status: Option<String>,
    /// Offset applied by this replica; most recent sync signal for replica selection
    pub slave_repl_offset: Option<u64>,
    pub master_repl_offset: Option<u64>,
}

impl ReplicationInfo {
    pub fn from_reply(reply: &InfoReply) -> Result<Self, String> {
        let role = reply
            .get("role")
            .map(NodeRole::parse)
            .ok_or_else(|| "missing role".to_string())?;

        Ok(Self {
            role,
            connected_slaves: reply.get_u64("connected_slaves").unwrap_or(0),
            master_host: reply.get("master_host").map(str::to_string),
            master_port: reply.get("master_port").and_then(|p| p.parse().ok()),
            master_link_status: reply.get("master_link_status").map(str::to_string),
            slave_repl_offset: reply.get_u64("slave_repl_offset"),
            master_repl_offset: reply.get_u64("master_repl_offset"),
        })
    }

    pub fn link_up(&self) -> bool {
        self.master_link_status.as_deref() == Some("up")
    }
}

/// Parsed `ROLE` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum RoleReply {
    Master {
        offset: u64,
        /// (ip, port, acknowledged offset)
        replicas: Vec<(String, u16, u64)>,
    },
    #[serde(rename = "slave")]
    Replica {
        master_ip: String,
        master_port: u16,
        /// connect / connecting / sync / connected
        state: String,
        offset: Option<u64>,
    },
    Sentinel {
        masters: Vec<String>,
    },
}

impl RoleReply {
    pub fn node_role(&self) -> NodeRole {
        match self {
            Self::Master { .. } => NodeRole::Master,
            Self::Replica { .. } => NodeRole::Replica,
            Self::Sentinel { .. } => NodeRole::Unknown,
        }
    }
}

/// Parse the one-item-per-line output of `ROLE`
pub fn parse_role(text: &str) -> Result<RoleReply, String> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let (kind, rest) = lines
        .split_first()
        .ok_or_else(|| "empty ROLE reply".to_string())?;

    match *kind {
        "master" => {
            let offset: u64 = rest
                .first()
                .and_then(|o| o.parse().ok())
                .ok_or_else(|| "master ROLE reply without offset".to_string())?;
            let replicas = rest[1..]
                .chunks(3)
                .map(|chunk| match chunk {
                    [ip, port, offset] => Ok((
                        ip.to_string(),
                        port.parse::<u16>()
                            .map_err(|_| format!("invalid port {:?}", port))?,
                        offset.parse::<u64>().unwrap_or(0),
                    )),
                    _ => Err("truncated replica entry in ROLE reply".to_string()),
                })
                .collect::<Result<Vec<_>, String>>()?;
            Ok(RoleReply::Master { offset, replicas })
        }
        "slave" | "replica" => match rest {
            [ip, port, state, tail @ ..] => Ok(RoleReply::Replica {
                master_ip: ip.to_string(),
                master_port: port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid master port {:?}", port))?,
                state: state.to_string(),
                offset: tail.first().and_then(|o| o.parse().ok()),
            }),
            _ => Err("truncated replica ROLE reply".to_string()),
        },
        "sentinel" => Ok(RoleReply::Sentinel {
            masters: rest.iter().map(|m| m.to_string()).collect(),
        }),
        other => Err(format!("unknown role {:?}", other)),
    }
}
