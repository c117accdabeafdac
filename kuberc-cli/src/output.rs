use colored::Colorize;
use kuberc_core::cluster::{Liveness, NodeListing};
use kuberc_core::reply::{InfoReply, SentinelMasterReply};
use kuberc_core::{FailoverReport, PodRef, SentinelGroup, SentinelMember, TopologyReport};
use serde::Serialize;

/// Left-aligned table with space-padded columns
pub struct Table {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<&'static str>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.len()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }
        widths
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let line = |cells: Vec<&str>| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, w)| format!("{:<w$}", cell, w = w))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = vec![line(self.headers.clone()).bold().to_string()];
        for row in &self.rows {
            out.push(line(row.iter().map(String::as_str).collect()));
        }
        out.join("\n")
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn nodes_table(listing: &[NodeListing]) -> Table {
    let mut table = Table::new(vec!["Pod", "IP", "NodeID", "Host", "IsMaster", "Slots"]);
    for node in listing {
        let pod = match (&node.pod, node.liveness) {
            (Some(pod), _) => pod.clone(),
            (None, Liveness::Alive) => "(unmanaged)".to_string(),
            (None, Liveness::Unreachable) => "(unreachable)".to_string(),
            (None, Liveness::NotChecked) => "-".to_string(),
        };
        table.push(vec![
            pod,
            or_dash(node.ip),
            node.node_id.clone(),
            or_dash(node.host.as_ref()),
            node.is_master.to_string(),
            node.slots.to_string(),
        ]);
    }
    table
}

pub fn print_topology(report: &TopologyReport) {
    println!("{}", nodes_table(&report.graph.listing()).render());

    if report.is_degraded() {
        println!(
            "\n{} {} of 16384 slots covered",
            "degraded:".yellow().bold(),
            report.graph.slots_covered()
        );
    }
    if !report.skipped.is_empty() {
        println!("\n{}", "Skipped lines:".yellow());
        for skipped in &report.skipped {
            println!(
                "  {} {} ({})",
                format!("{}:", skipped.line_no).dimmed(),
                skipped.line,
                skipped.reason
            );
        }
    }
}

pub fn print_info(pod: &PodRef, info: &InfoReply, multi: bool) {
    if multi {
        println!("{}", format!("==> {} <==", pod.name).bold().cyan());
    }
    println!("{}", info);
}

fn member_row(role: &str, member: &SentinelMember) -> Vec<String> {
    let role = if member.is_down() {
        format!("{} (down)", role)
    } else {
        role.to_string()
    };
    vec![
        role,
        or_dash(member.pod_name()),
        format!("{}:{}", member.ip, member.port),
        member.flags.join(","),
        or_dash(member.master_link_status.as_ref()),
        or_dash(member.repl_offset),
    ]
}

pub fn print_group(group: &SentinelGroup) {
    println!(
        "{} {}  quorum {}  other sentinels {}  epoch {}",
        "master".bold().cyan(),
        group.master_name.bold(),
        group.quorum,
        group.num_other_sentinels,
        or_dash(group.config_epoch)
    );
    if let Some(state) = &group.failover_state {
        println!("failover state: {}", state.yellow());
    }

    let mut table = Table::new(vec!["Role", "Pod", "Addr", "Flags", "Link", "Offset"]);
    table.push(member_row("master", &group.master));
    for replica in &group.replicas {
        table.push(member_row("replica", replica));
    }
    println!("{}", table.render());

    if group.master_pod().is_none() {
        println!(
            "{} master {}:{} matches no pod",
            "warning:".yellow().bold(),
            group.master.ip,
            group.master.port
        );
    }
}

pub fn print_masters(masters: &[SentinelMasterReply]) {
    let mut table = Table::new(vec!["Name", "Addr", "Flags", "Replicas", "Sentinels", "Quorum"]);
    for master in masters {
        table.push(vec![
            master.name.clone(),
            format!("{}:{}", master.ip, master.port),
            master.flags.join(","),
            master.num_slaves.to_string(),
            (master.num_other_sentinels + 1).to_string(),
            master.quorum.to_string(),
        ]);
    }
    println!("{}", table.render());
}

pub fn print_report(report: &FailoverReport) {
    let attempt = &report.attempt;
    let outcome = if report.succeeded() {
        report.outcome.to_string().green().bold()
    } else {
        report.outcome.to_string().red().bold()
    };
    println!("{} failover of {}: {}", attempt.mode, attempt.target.bold(), outcome);
    println!("  {} {}", "attempt:".dimmed(), attempt.id);
    println!("  {} {}", "polls:".dimmed(), attempt.polls);
    if let Some(replica) = &attempt.chosen_replica {
        println!("  {} {}", "replica:".dimmed(), replica);
    }
    if let Some(master) = &report.new_master {
        println!("  {} {}", "new master:".dimmed(), master.name.green());
    }
    if let Some(observation) = &report.last_observation {
        println!("  {} {}", "last poll:".dimmed(), observation.detail);
    }
}
