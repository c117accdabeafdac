//! Sentinel replies
//!
//! redis-cli prints `SENTINEL MASTER` as alternating key / value lines, and
//! flattens the list of maps returned by `SENTINEL MASTERS` and
//! `SENTINEL SLAVES` into one long key / value sequence. Every map starts
//! with `name`, which is what records are split on.

use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Split a reply into (key, value) pairs
pub fn parse_field_pairs(text: &str) -> Result<Vec<(String, String)>, String> {
    let mut lines: Vec<&str> = text.lines().map(|l| l.trim_end_matches('\r')).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    if lines.len() % 2 != 0 {
        return Err(format!("odd number of lines ({}) in key/value reply", lines.len()));
    }
    Ok(lines
        .chunks(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect())
}

/// Group pairs into one map per record, starting a new record at every `name`
fn split_records(pairs: Vec<(String, String)>) -> Result<Vec<BTreeMap<String, String>>, String> {
    let mut records: Vec<BTreeMap<String, String>> = Vec::new();
    for (key, value) in pairs {
        if key == "name" {
            records.push(BTreeMap::new());
        }
        match records.last_mut() {
            Some(record) => {
                record.insert(key, value);
            }
            None => return Err(format!("record does not start with name (got {:?})", key)),
        }
    }
    Ok(records)
}

fn required<'a>(fields: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, String> {
    fields
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| format!("missing field {:?}", key))
}

fn parse_ip(fields: &BTreeMap<String, String>) -> Result<IpAddr, String> {
    let ip = required(fields, "ip")?;
    ip.parse().map_err(|_| format!("invalid ip {:?}", ip))
}

fn parse_port(fields: &BTreeMap<String, String>) -> Result<u16, String> {
    let port = required(fields, "port")?;
    port.parse().map_err(|_| format!("invalid port {:?}", port))
}

fn parse_flags(fields: &BTreeMap<String, String>) -> Vec<String> {
    fields
        .get("flags")
        .map(|f| f.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn optional<T: std::str::FromStr>(fields: &BTreeMap<String, String>, key: &str) -> Option<T> {
    fields.get(key).and_then(|v| v.parse().ok())
}

/// One master as reported by `SENTINEL MASTER(S)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentinelMasterReply {
    pub name: String,
    pub ip: IpAddr,
    pub port: u16,
    pub flags: Vec<String>,
    pub num_slaves: u32,
    pub num_other_sentinels: u32,
    pub quorum: u32,
    pub config_epoch: Option<u64>,
    pub failover_state: Option<String>,
}

impl SentinelMasterReply {
    fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, String> {
        Ok(Self {
            name: required(fields, "name")?.to_string(),
            ip: parse_ip(fields)?,
            port: parse_port(fields)?,
            flags: parse_flags(fields),
            num_slaves: optional(fields, "num-slaves").unwrap_or(0),
            num_other_sentinels: optional(fields, "num-other-sentinels").unwrap_or(0),
            quorum: required(fields, "quorum")?
                .parse::<u32>()
                .map_err(|_| "invalid quorum".to_string())?,
            config_epoch: optional(fields, "config-epoch"),
            failover_state: fields.get("failover-state").cloned(),
        })
    }

    pub fn is_down(&self) -> bool {
        self.flags.iter().any(|f| f == "s_down" || f == "o_down")
    }
}

/// One replica as reported by `SENTINEL SLAVES` / `SENTINEL REPLICAS`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentinelReplicaReply {
    pub name: String,
    pub ip: IpAddr,
    pub port: u16,
    pub flags: Vec<String>,
    pub master_link_status: Option<String>,
    pub master_host: Option<String>,
    pub slave_repl_offset: Option<u64>,
    pub slave_priority: Option<u32>,
}

impl SentinelReplicaReply {
    fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, String> {
        Ok(Self {
            name: required(fields, "name")?.to_string(),
            ip: parse_ip(fields)?,
            port: parse_port(fields)?,
            flags: parse_flags(fields),
            master_link_status: fields.get("master-link-status").cloned(),
            master_host: fields.get("master-host").cloned(),
            slave_repl_offset: optional(fields, "slave-repl-offset"),
            slave_priority: optional(fields, "slave-priority")
                .or_else(|| optional(fields, "replica-priority")),
        })
    }
}

/// `SENTINEL MASTER <name>`: exactly one record
pub fn parse_sentinel_master(text: &str) -> Result<SentinelMasterReply, String> {
    let records = split_records(parse_field_pairs(text)?)?;
    match records.as_slice() {
        [fields] => SentinelMasterReply::from_fields(fields),
        [] => Err("empty SENTINEL MASTER reply".to_string()),
        _ => Err(format!("expected one master record, got {}", records.len())),
    }
}

/// `SENTINEL MASTERS`: zero or more records
pub fn parse_sentinel_masters(text: &str) -> Result<Vec<SentinelMasterReply>, String> {
    split_records(parse_field_pairs(text)?)?
        .iter()
        .map(SentinelMasterReply::from_fields)
        .collect()
}

/// `SENTINEL SLAVES <name>`: zero records is a valid single-node deployment
pub fn parse_sentinel_replicas(text: &str) -> Result<Vec<SentinelReplicaReply>, String> {
    split_records(parse_field_pairs(text)?)?
        .iter()
        .map(SentinelReplicaReply::from_fields)
        .collect()
}

/// `SENTINEL GET-MASTER-ADDR-BY-NAME <name>`; None for a nil reply
pub fn parse_master_addr(text: &str) -> Result<Option<(IpAddr, u16)>, String> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    match lines.as_slice() {
        [] => Ok(None),
        [ip, port] => {
            let ip: IpAddr = ip.parse().map_err(|_| format!("invalid ip {:?}", ip))?;
            let port: u16 = port.parse().map_err(|_| format!("invalid port {:?}", port))?;
            Ok(Some((ip, port)))
        }
        _ => Err(format!("expected ip and port, got {} lines", lines.len())),
    }
}
