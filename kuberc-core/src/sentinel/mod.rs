//! Sentinel View
//!
//! What one Sentinel believes about a monitored master: where the master
//! is, which replicas follow it, and the quorum. Addresses are tied to pods
//! with the same IP join the cluster graph uses.

use crate::cluster::graph::pods_by_ip;
use crate::error::{KubercError, Result};
use crate::exec::{ExecContext, PodRef, RedisCli};
use crate::reply::{
    SentinelMasterReply, SentinelReplicaReply, parse_master_addr, parse_sentinel_master,
    parse_sentinel_masters, parse_sentinel_replicas,
};
use serde::Serialize;
use std::net::IpAddr;
use tracing::{debug, info};

/// Flags that mark a member as unusable
const DOWN_FLAGS: &[&str] = &["s_down", "o_down", "disconnected"];

/// A master or replica as Sentinel reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentinelMember {
    pub ip: IpAddr,
    pub port: u16,
    /// None when the address matches no known pod
    pub pod: Option<PodRef>,
    pub flags: Vec<String>,
    pub master_link_status: Option<String>,
    pub repl_offset: Option<u64>,
    pub priority: Option<u32>,
}

impl SentinelMember {
    pub fn addr(&self) -> (IpAddr, u16) {
        (self.ip, self.port)
    }

    pub fn pod_name(&self) -> Option<&str> {
        self.pod.as_ref().map(|p| p.name.as_str())
    }

    pub fn is_down(&self) -> bool {
        self.flags.iter().any(|f| DOWN_FLAGS.contains(&f.as_str()))
    }
}

/// Sentinel's view of one monitored master
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentinelGroup {
    pub master_name: String,
    pub master: SentinelMember,
    pub replicas: Vec<SentinelMember>,
    pub quorum: u32,
    pub num_other_sentinels: u32,
    pub flags: Vec<String>,
    pub config_epoch: Option<u64>,
    pub failover_state: Option<String>,
}

impl SentinelGroup {
    /// Join Sentinel's replies with pods by IP
    pub fn resolve(
        master: SentinelMasterReply,
        replicas: Vec<SentinelReplicaReply>,
        pods: &[PodRef],
    ) -> Self {
        let by_ip = pods_by_ip(pods);
        let pod_for = |ip: &IpAddr| by_ip.get(ip).map(|p| (*p).clone());

        let replicas = replicas
            .into_iter()
            .map(|r| SentinelMember {
                pod: pod_for(&r.ip),
                ip: r.ip,
                port: r.port,
                flags: r.flags,
                master_link_status: r.master_link_status,
                repl_offset: r.slave_repl_offset,
                priority: r.slave_priority,
            })
            .collect();

        Self {
            master: SentinelMember {
                pod: pod_for(&master.ip),
                ip: master.ip,
                port: master.port,
                flags: master.flags.clone(),
                master_link_status: None,
                repl_offset: None,
                priority: None,
            },
            master_name: master.name,
            replicas,
            quorum: master.quorum,
            num_other_sentinels: master.num_other_sentinels,
            flags: master.flags,
            config_epoch: master.config_epoch,
            failover_state: master.failover_state,
        }
    }

    pub fn master_pod(&self) -> Option<&PodRef> {
        self.master.pod.as_ref()
    }

    pub fn replica_pods(&self) -> Vec<&PodRef> {
        self.replicas.iter().filter_map(|r| r.pod.as_ref()).collect()
    }

    /// Replicas not flagged down whose link to the master is `ok`
    pub fn healthy_replicas(&self) -> Vec<&SentinelMember> {
        self.replicas
            .iter()
            .filter(|r| !r.is_down() && r.master_link_status.as_deref() == Some("ok"))
            .collect()
    }

    /// Replica currently at `ip:port`
    pub fn replica_at(&self, ip: IpAddr, port: u16) -> Option<&SentinelMember> {
        self.replicas.iter().find(|r| r.addr() == (ip, port))
    }

    pub fn is_master_down(&self) -> bool {
        self.master.is_down()
    }
}

/// Sentinel queries over an `ExecContext`
pub struct SentinelView<'a> {
    ctx: &'a ExecContext,
}

impl<'a> SentinelView<'a> {
    pub fn new(ctx: &'a ExecContext) -> Self {
        Self { ctx }
    }

    async fn ask(&self, cli: &RedisCli, pod: &PodRef, args: &[&str]) -> Result<String> {
        cli.query(self.ctx.runner(), pod, args).await
    }

    fn parse_failed(cli: &RedisCli, pod: &PodRef, args: &[&str], reason: String) -> KubercError {
        KubercError::Parse {
            pod: pod.name.clone(),
            command: cli.display(args),
            reason,
        }
    }

    /// `SENTINEL MASTER <name>`
    pub async fn master(&self, sentinel: &PodRef, master_name: &str) -> Result<SentinelMasterReply> {
        let cli = self.ctx.sentinel_cli();
        let args = ["sentinel", "master", master_name];
        let text = self.ask(&cli, sentinel, &args).await?;
        parse_sentinel_master(&text).map_err(|reason| Self::parse_failed(&cli, sentinel, &args, reason))
    }

    /// `SENTINEL SLAVES <name>`
    pub async fn replicas(
        &self,
        sentinel: &PodRef,
        master_name: &str,
    ) -> Result<Vec<SentinelReplicaReply>> {
        let cli = self.ctx.sentinel_cli();
        let args = ["sentinel", "slaves", master_name];
        let text = self.ask(&cli, sentinel, &args).await?;
        parse_sentinel_replicas(&text).map_err(|reason| Self::parse_failed(&cli, sentinel, &args, reason))
    }

    /// `SENTINEL GET-MASTER-ADDR-BY-NAME <name>`
    pub async fn master_addr(
        &self,
        sentinel: &PodRef,
        master_name: &str,
    ) -> Result<Option<(IpAddr, u16)>> {
        let cli = self.ctx.sentinel_cli();
        let args = ["sentinel", "get-master-addr-by-name", master_name];
        let text = self.ask(&cli, sentinel, &args).await?;
        parse_master_addr(&text).map_err(|reason| Self::parse_failed(&cli, sentinel, &args, reason))
    }

    /// Build the group for `master_name` as seen by the named sentinel pod
    pub async fn query(&self, sentinel_pod: &str, master_name: &str) -> Result<SentinelGroup> {
        let sentinel = self.ctx.sentinel_pod(sentinel_pod).await?;
        self.query_pod(&sentinel, master_name).await
    }

    pub async fn query_pod(&self, sentinel: &PodRef, master_name: &str) -> Result<SentinelGroup> {
        let master = self.master(sentinel, master_name).await?;
        let replicas = self.replicas(sentinel, master_name).await?;
        let pods = self.ctx.redis_pods().await?;

        let group = SentinelGroup::resolve(master, replicas, &pods);
        debug!(
            sentinel = %sentinel.name,
            master = %group.master_name,
            master_pod = ?group.master.pod_name(),
            replicas = group.replicas.len(),
            quorum = group.quorum,
            "sentinel view"
        );
        Ok(group)
    }

    /// Every master the sentinel monitors
    pub async fn masters(&self, sentinel_pod: &str) -> Result<Vec<SentinelMasterReply>> {
        let sentinel = self.ctx.sentinel_pod(sentinel_pod).await?;
        let cli = self.ctx.sentinel_cli();
        let args = ["sentinel", "masters"];
        let text = self.ask(&cli, &sentinel, &args).await?;
        let masters = parse_sentinel_masters(&text)
            .map_err(|reason| Self::parse_failed(&cli, &sentinel, &args, reason))?;

        info!(sentinel = %sentinel.name, count = masters.len(), "listed monitored masters");
        Ok(masters)
    }
}
