mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use kuberc_core::{
    ClusterFailover, ClusterFailoverMode, ClusterTopology, ExecContext, FailoverOrchestrator,
    FailoverReport, FailoverTarget, KubeExecutor, KubercConfig, SentinelFailover, SentinelView,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kuberc")]
#[command(about = "Inspect and fail over Redis Cluster and Sentinel deployments in Kubernetes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Namespace of the redis pods (and of sentinel pods unless --sentinel-namespace)
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Container running redis-server
    #[arg(short, long, global = true)]
    container: Option<String>,

    /// Redis port inside the pods [default: 6379]
    #[arg(short, long, global = true)]
    port: Option<u16>,

    #[arg(long, global = true)]
    sentinel_namespace: Option<String>,

    #[arg(long, global = true)]
    sentinel_container: Option<String>,

    /// Sentinel port inside the pods [default: 26379]
    #[arg(long, global = true)]
    sentinel_port: Option<u16>,

    /// Path to kubeconfig (defaults to $KUBECONFIG, ~/.kube/config, then in-cluster)
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Label selector for candidate redis pods
    #[arg(short = 'l', long, global = true)]
    selector: Option<String>,

    #[arg(short, long, global = true, value_enum, default_value_t = Output::Table)]
    output: Output,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cluster nodes joined with their pods
    Nodes {
        /// Any pod of the cluster
        pod: String,
    },

    /// Run INFO in a pod, or in every pod of the cluster
    Info {
        pod: String,

        /// Every pod reachable from CLUSTER NODES
        #[arg(long)]
        all: bool,

        /// INFO section (replication, memory, ...)
        #[arg(long)]
        section: Option<String>,
    },

    /// Show a sentinel master group, or every master a sentinel watches
    Sentinel {
        /// Sentinel pod
        pod: String,

        master: Option<String>,
    },

    /// Ask sentinel to fail a master over and wait for the new master
    Failover {
        /// Sentinel pod
        pod: String,

        master: String,
    },

    /// Promote a replica with CLUSTER FAILOVER and wait for it to take over
    ClusterFailover {
        /// Any pod of the cluster
        seed: String,

        /// Master node id, or the pod hosting it
        master: String,

        /// Replica to promote (node id or pod); most synced replica when unset
        #[arg(long)]
        replica: Option<String>,

        #[arg(long, conflicts_with = "takeover")]
        force: bool,

        #[arg(long)]
        takeover: bool,
    },
}

impl Cli {
    fn load_config(&self) -> Result<KubercConfig> {
        let mut config = match &self.config {
            Some(path) => KubercConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => KubercConfig::default(),
        };
        config.apply_env();

        if let Some(ns) = &self.namespace {
            config.redis.namespace = ns.clone();
            config.sentinel.namespace = ns.clone();
        }
        if let Some(ns) = &self.sentinel_namespace {
            config.sentinel.namespace = ns.clone();
        }
        if let Some(container) = &self.container {
            config.redis.container = Some(container.clone());
        }
        if let Some(container) = &self.sentinel_container {
            config.sentinel.container = Some(container.clone());
        }
        if let Some(port) = self.port {
            config.redis.port = port;
        }
        if let Some(port) = self.sentinel_port {
            config.sentinel.port = port;
        }
        if let Some(selector) = &self.selector {
            config.discovery.selector = Some(selector.clone());
        }
        if let Commands::ClusterFailover { force, takeover, .. } = &self.command {
            if *force {
                config.failover.cluster_mode = ClusterFailoverMode::Force;
            } else if *takeover {
                config.failover.cluster_mode = ClusterFailoverMode::Takeover;
            }
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(config: &KubercConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_tracing(&config, cli.verbose);
    debug!(
        namespace = %config.redis.namespace,
        sentinel_namespace = %config.sentinel.namespace,
        "configuration loaded"
    );

    let executor = KubeExecutor::connect(cli.kubeconfig.as_deref())
        .await
        .context("Failed to connect to Kubernetes")?;
    let ctx = ExecContext::new(config, Arc::new(executor.clone()), Arc::new(executor));

    let token = ctx.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling in-flight commands");
            token.cancel();
        }
    });

    match cli.command {
        Commands::Nodes { ref pod } => nodes(&ctx, pod, cli.output).await,
        Commands::Info {
            ref pod,
            all,
            ref section,
        } => node_info(&ctx, pod, all, section.as_deref(), cli.output).await,
        Commands::Sentinel {
            ref pod,
            ref master,
        } => sentinel(&ctx, pod, master.as_deref(), cli.output).await,
        Commands::Failover {
            ref pod,
            ref master,
        } => {
            let mut target = SentinelFailover::new(pod.as_str(), master.as_str());
            failover(&ctx, &mut target, cli.output).await
        }
        Commands::ClusterFailover {
            ref seed,
            ref master,
            ref replica,
            ..
        } => {
            let mut target = ClusterFailover::new(seed.as_str(), master.as_str())
                .with_replica(replica.clone())
                .with_mode(ctx.config().failover.cluster_mode);
            failover(&ctx, &mut target, cli.output).await
        }
    }
}

async fn nodes(ctx: &ExecContext, pod: &str, format: Output) -> Result<()> {
    let report = ClusterTopology::new(ctx)
        .discover(pod)
        .await
        .with_context(|| format!("Failed to discover cluster from {}", pod))?;

    match format {
        Output::Json => output::print_json(&report),
        Output::Table => {
            output::print_topology(&report);
            Ok(())
        }
    }
}

async fn node_info(
    ctx: &ExecContext,
    pod: &str,
    all: bool,
    section: Option<&str>,
    format: Output,
) -> Result<()> {
    let topology = ClusterTopology::new(ctx);
    let pods = topology
        .cluster_pods(pod, all)
        .await
        .with_context(|| format!("Failed to resolve pods from {}", pod))?;
    let results = topology.node_info(&pods, section).await;

    let mut failed = 0;
    let mut replies = serde_json::Map::new();
    for (pod, result) in &results {
        match result {
            Ok(info) => match format {
                Output::Json => {
                    replies.insert(pod.name.clone(), serde_json::to_value(info)?);
                }
                Output::Table => output::print_info(pod, info, all),
            },
            Err(err) => {
                failed += 1;
                eprintln!("{} {}: {}", "error:".red().bold(), pod.name, err);
            }
        }
    }
    if format == Output::Json {
        output::print_json(&replies)?;
    }

    if failed > 0 {
        anyhow::bail!("INFO failed in {} of {} pods", failed, results.len());
    }
    Ok(())
}

async fn sentinel(ctx: &ExecContext, pod: &str, master: Option<&str>, format: Output) -> Result<()> {
    let view = SentinelView::new(ctx);
    match master {
        Some(name) => {
            let group = view
                .query(pod, name)
                .await
                .with_context(|| format!("Failed to query master {} from {}", name, pod))?;
            match format {
                Output::Json => output::print_json(&group)?,
                Output::Table => output::print_group(&group),
            }
        }
        None => {
            let masters = view
                .masters(pod)
                .await
                .with_context(|| format!("Failed to list masters from {}", pod))?;
            match format {
                Output::Json => output::print_json(&masters)?,
                Output::Table => output::print_masters(&masters),
            }
        }
    }
    Ok(())
}

async fn failover<T: FailoverTarget>(ctx: &ExecContext, target: &mut T, format: Output) -> Result<()> {
    let orchestrator = FailoverOrchestrator::new(ctx);
    let policy = orchestrator.policy();
    info!(
        failover = %target.describe(),
        mode = %target.mode(),
        max_attempts = policy.max_attempts,
        interval_ms = policy.interval.as_millis() as u64,
        budget_ms = policy.budget().as_millis() as u64,
        "starting failover"
    );

    let report: FailoverReport = orchestrator.run(target).await;
    match format {
        Output::Json => output::print_json(&report)?,
        Output::Table => output::print_report(&report),
    }

    let description = format!("{} failover of {}", report.attempt.mode, report.attempt.target);
    report.into_result().with_context(|| format!("{} did not complete", description))?;
    Ok(())
}
