//! Failover Orchestration Tests
//!
//! - State machine transitions with a scripted target
//! - Sentinel failover end to end over a scripted executor
//! - Cluster failover with deterministic replica selection


use async_trait::async_trait;
use kuberc_core::config::ClusterFailoverMode;
use kuberc_core::error::{KubercError, Result};
use kuberc_core::exec::{ExecContext, PodRef};
use kuberc_core::failover::{
    ClusterFailover, Clock, FailoverMode, FailoverOrchestrator, FailoverOutcome, FailoverState,
    FailoverTarget, Observation, RetryPolicy, SentinelFailover,
};
use std::time::Duration;
use test_helper::*;

/// Target whose behaviour is fixed up front
struct ScriptedTarget {
    initiate_error: Option<KubercError>,
    /// Poll number (1-based) on which the target reports convergence
    converge_on: Option<u32>,
    /// Poll numbers that fail with a transport error
    failing_polls: Vec<u32>,
    cancel_on_initiate: bool,
    initiated: u32,
    polled: u32,
}

impl ScriptedTarget {
    fn converging_on(poll: u32) -> Self {
        Self {
            initiate_error: None,
            converge_on: Some(poll),
            failing_polls: Vec::new(),
            cancel_on_initiate: false,
            initiated: 0,
            polled: 0,
        }
    }

    fn never_converging() -> Self {
        Self {
            converge_on: None,
            ..Self::converging_on(0)
        }
    }
}

#[async_trait]
impl FailoverTarget for ScriptedTarget {
    fn mode(&self) -> FailoverMode {
        FailoverMode::Sentinel
    }

    fn describe(&self) -> String {
        "mymaster".to_string()
    }

    async fn initiate(&mut self, ctx: &ExecContext) -> Result<()> {
        self.initiated += 1;
        if self.cancel_on_initiate {
            ctx.cancel_token().cancel();
        }
        match self.initiate_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn poll(&mut self, _ctx: &ExecContext) -> Result<Observation> {
        self.polled += 1;
        if self.failing_polls.contains(&self.polled) {
            return Err(KubercError::Kube("connection reset".to_string()));
        }
        if self.converge_on == Some(self.polled) {
            return Ok(Observation {
                converged: true,
                master: Some(pod("redis-2", "10.0.0.12")),
                master_addr: Some("10.0.0.12:6379".to_string()),
                detail: "converged".to_string(),
            });
        }
        Ok(Observation::pending(format!("poll {}", self.polled)))
    }
}

fn empty_context() -> ExecContext {
    context(FakeExecutor::new(), redis_pods(3))
}

#[tokio::test]
async fn test_converges_on_first_poll() {
    let ctx = empty_context();
    let clock = FakeClock::new();
    let orchestrator = FailoverOrchestrator::new(&ctx).with_clock(clock.clone());
    let mut target = ScriptedTarget::converging_on(1);

    let report = orchestrator.run(&mut target).await;

    assert_eq!(report.outcome, FailoverOutcome::Succeeded);
    assert_eq!(report.attempt.state, FailoverState::Succeeded);
    assert_eq!(report.attempt.polls, 1);
    assert_eq!(target.polled, 1);
    assert_eq!(report.new_master.as_ref().map(|p| p.name.as_str()), Some("redis-2"));
    assert!(report.error.is_none());
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(200)]);
    assert_eq!(report.attempt.started_at, clock.now());
}

#[tokio::test]
async fn test_initiate_failure_aborts_without_polling() {
    let ctx = empty_context();
    let orchestrator = FailoverOrchestrator::new(&ctx).with_clock(FakeClock::new());
    let mut target = ScriptedTarget {
        initiate_error: Some(KubercError::RedisCommand {
            pod: "sentinel-0".to_string(),
            command: "sentinel failover mymaster".to_string(),
            message: "NOGOODSLAVE No suitable replica to promote".to_string(),
        }),
        ..ScriptedTarget::converging_on(1)
    };

    let report = orchestrator.run(&mut target).await;

    assert_eq!(report.outcome, FailoverOutcome::Aborted);
    assert_eq!(report.attempt.polls, 0);
    assert_eq!(target.polled, 0);
    assert!(report.new_master.is_none());
    assert!(matches!(report.error, Some(KubercError::RedisCommand { .. })));
}

#[tokio::test]
async fn test_exhausted_budget_times_out() {
    let ctx = empty_context();
    let clock = FakeClock::new();
    let orchestrator = FailoverOrchestrator::new(&ctx)
        .with_clock(clock.clone())
        .with_policy(RetryPolicy::new(4, Duration::from_millis(50)));
    let mut target = ScriptedTarget::never_converging();

    let report = orchestrator.run(&mut target).await;

    assert_eq!(report.outcome, FailoverOutcome::TimedOut);
    assert_eq!(report.attempt.polls, 4);
    assert_eq!(target.polled, 4);
    assert_eq!(target.initiated, 1);
    assert_eq!(clock.sleeps().len(), 4);
    assert_eq!(report.last_observation.as_ref().unwrap().detail, "poll 4");
    match report.error {
        Some(KubercError::ConvergenceTimeout { target, attempts }) => {
            assert_eq!(target, "mymaster");
            assert_eq!(attempts, 4);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_polls_count_as_unconverged() {
    let ctx = empty_context();
    let orchestrator = FailoverOrchestrator::new(&ctx).with_clock(FakeClock::new());
    let mut target = ScriptedTarget {
        failing_polls: vec![1, 2],
        ..ScriptedTarget::converging_on(3)
    };

    let report = orchestrator.run(&mut target).await;
    assert_eq!(report.outcome, FailoverOutcome::Succeeded);
    assert_eq!(report.attempt.polls, 3);
}

#[tokio::test]
async fn test_cancellation_aborts_polling() {
    let ctx = empty_context();
    let orchestrator = FailoverOrchestrator::new(&ctx).with_clock(FakeClock::new());
    let mut target = ScriptedTarget {
        cancel_on_initiate: true,
        ..ScriptedTarget::converging_on(1)
    };

    let report = orchestrator.run(&mut target).await;

    assert_eq!(report.outcome, FailoverOutcome::Aborted);
    assert_eq!(report.attempt.polls, 0);
    assert_eq!(target.polled, 0);
    assert!(matches!(report.error, Some(KubercError::Cancelled)));
}

#[tokio::test]
async fn test_report_into_result() {
    let ctx = empty_context();
    let orchestrator = FailoverOrchestrator::new(&ctx).with_clock(FakeClock::new());

    let ok = orchestrator.run(&mut ScriptedTarget::converging_on(2)).await;
    assert!(ok.succeeded());
    let json = serde_json::to_value(&ok).unwrap();
    assert_eq!(json["outcome"], "succeeded");
    assert_eq!(json["attempt"]["polls"], 2);
    assert_eq!(json["error"], serde_json::Value::Null);
    assert_eq!(ok.into_result().unwrap().unwrap().name, "redis-2");

    let timed_out = orchestrator
        .with_policy(RetryPolicy::new(1, Duration::ZERO))
        .run(&mut ScriptedTarget::never_converging())
        .await;
    assert!(matches!(
        timed_out.into_result(),
        Err(KubercError::ConvergenceTimeout { .. })
    ));
}

fn sentinel_pods() -> Vec<PodRef> {
    let mut pods = redis_pods(3);
    pods.push(sentinel_pod());
    pods
}

/// Sentinel reports mymaster at redis-1; after the failover it reports redis-2
#[tokio::test]
async fn test_sentinel_failover_moves_master_to_replica() {
    let executor = FakeExecutor::new();
    executor
        .replies(
            "sentinel-0",
            "sentinel master mymaster",
            &[
                &sentinel_master_reply("10.0.0.11"),
                &sentinel_master_reply("10.0.0.12"),
            ],
        )
        .reply(
            "sentinel-0",
            "sentinel slaves mymaster",
            &sentinel_slaves_reply(&[("10.0.0.10", 100), ("10.0.0.12", 120)]),
        )
        .reply("sentinel-0", "sentinel failover mymaster", "OK\n")
        .reply("redis-2", "role", "master\n120\n10.0.0.10\n6379\n120\n");
    let ctx = context(executor.clone(), sentinel_pods());
    let orchestrator = FailoverOrchestrator::new(&ctx).with_clock(FakeClock::new());

    let mut target = SentinelFailover::new("sentinel-0", "mymaster");
    let report = orchestrator.run(&mut target).await;

    assert_eq!(report.outcome, FailoverOutcome::Succeeded, "{:?}", report.error);
    assert_eq!(report.attempt.polls, 1);
    assert_eq!(report.attempt.mode, FailoverMode::Sentinel);
    assert_eq!(report.new_master.as_ref().unwrap().name, "redis-2");
    assert_eq!(
        report.last_observation.as_ref().unwrap().master_addr.as_deref(),
        Some("10.0.0.12:6379")
    );
    assert_eq!(target.before().unwrap().master_pod().unwrap().name, "redis-1");
    assert_eq!(executor.count("sentinel-0", "sentinel failover mymaster"), 1);
}

#[tokio::test]
async fn test_sentinel_failover_unknown_master_aborts() {
    let executor = FakeExecutor::new();
    executor.reply(
        "sentinel-0",
        "sentinel master nosuch",
        "ERR No such master with that name\n",
    );
    let ctx = context(executor.clone(), sentinel_pods());
    let orchestrator = FailoverOrchestrator::new(&ctx).with_clock(FakeClock::new());

    let report = orchestrator.run(&mut SentinelFailover::new("sentinel-0", "nosuch")).await;

    assert_eq!(report.outcome, FailoverOutcome::Aborted);
    assert_eq!(report.attempt.polls, 0);
    assert!(report.error.as_ref().unwrap().is_redis_error());
    assert_eq!(executor.count("sentinel-0", "sentinel failover nosuch"), 0);
    assert_eq!(executor.calls().len(), 1);
}

#[tokio::test]
async fn test_sentinel_failover_rejected_by_sentinel() {
    let executor = FakeExecutor::new();
    executor
        .reply("sentinel-0", "sentinel master mymaster", &sentinel_master_reply("10.0.0.11"))
        .reply("sentinel-0", "sentinel slaves mymaster", "")
        .reply(
            "sentinel-0",
            "sentinel failover mymaster",
            "NOGOODSLAVE No suitable replica to promote\n",
        );
    let ctx = context(executor.clone(), sentinel_pods());
    let orchestrator = FailoverOrchestrator::new(&ctx).with_clock(FakeClock::new());

    let report = orchestrator.run(&mut SentinelFailover::new("sentinel-0", "mymaster")).await;

    assert_eq!(report.outcome, FailoverOutcome::Aborted);
    assert_eq!(report.attempt.polls, 0);
    assert_eq!(executor.count("sentinel-0", "sentinel master mymaster"), 1);
}

#[tokio::test]
async fn test_sentinel_failover_times_out_when_master_stays() {
    let executor = FakeExecutor::new();
    executor
        .reply("sentinel-0", "sentinel master mymaster", &sentinel_master_reply("10.0.0.11"))
        .reply(
            "sentinel-0",
            "sentinel slaves mymaster",
            &sentinel_slaves_reply(&[("10.0.0.12", 100)]),
        )
        .reply("sentinel-0", "sentinel failover mymaster", "OK\n");
    let mut config = test_config();
    config.failover.max_attempts = 3;
    let ctx = context_with(config, executor.clone(), sentinel_pods());
    let orchestrator = FailoverOrchestrator::new(&ctx).with_clock(FakeClock::new());

    let report = orchestrator.run(&mut SentinelFailover::new("sentinel-0", "mymaster")).await;

    assert_eq!(report.outcome, FailoverOutcome::TimedOut);
    assert_eq!(report.attempt.polls, 3);
    assert_eq!(executor.count("sentinel-0", "sentinel failover mymaster"), 1);
    // one snapshot read plus one per poll
    assert_eq!(executor.count("sentinel-0", "sentinel master mymaster"), 4);
    let last = report.last_observation.unwrap();
    assert!(!last.converged);
    assert_eq!(last.master.unwrap().name, "redis-1");
}

#[tokio::test]
async fn test_sentinel_failover_waits_for_role() {
    let executor = FakeExecutor::new();
    executor
        .replies(
            "sentinel-0",
            "sentinel master mymaster",
            &[
                &sentinel_master_reply("10.0.0.11"),
                &sentinel_master_reply("10.0.0.12"),
            ],
        )
        .reply(
            "sentinel-0",
            "sentinel slaves mymaster",
            &sentinel_slaves_reply(&[("10.0.0.12", 100)]),
        )
        .reply("sentinel-0", "sentinel failover mymaster", "OK\n")
        .replies(
            "redis-2",
            "role",
            &["slave\n10.0.0.11\n6379\nconnected\n100\n", "master\n100\n"],
        );
    let ctx = context(executor.clone(), sentinel_pods());
    let orchestrator = FailoverOrchestrator::new(&ctx).with_clock(FakeClock::new());

    let report = orchestrator.run(&mut SentinelFailover::new("sentinel-0", "mymaster")).await;

    assert_eq!(report.outcome, FailoverOutcome::Succeeded);
    assert_eq!(report.attempt.polls, 2);
    assert_eq!(executor.count("redis-2", "role"), 2);
}

/// One master on redis-0 with replicas on redis-1 and redis-2, seen from `myself`
fn replicated_cluster(myself: u32, promoted: bool) -> String {
    let flag = |id: u32, role: &str| {
        if id == myself {
            format!("myself,{}", role)
        } else {
            role.to_string()
        }
    };
    let (m, r2, r2_master, slots_m, slots_r2) = if promoted {
        ("slave", "master", "-".to_string(), "", "0-16383")
    } else {
        ("master", "slave", node_id(1), "0-16383", "")
    };
    let master_of_m = if promoted { node_id(3) } else { "-".to_string() };
    let master_of_r1 = if promoted { node_id(3) } else { node_id(1) };

    format!(
        "{} 10.0.0.10:6379@16379 {} {} 0 0 1 connected {}\n\
         {} 10.0.0.11:6379@16379 {} {} 0 0 1 connected\n\
         {} 10.0.0.12:6379@16379 {} {} 0 0 2 connected {}\n",
        node_id(1),
        flag(1, m),
        master_of_m,
        slots_m,
        node_id(2),
        flag(2, "slave"),
        master_of_r1,
        node_id(3),
        flag(3, r2),
        r2_master,
        slots_r2
    )
}

#[tokio::test]
async fn test_cluster_failover_promotes_most_synced_replica() {
    let executor = FakeExecutor::new();
    executor
        .reply("redis-0", "cluster nodes", &replicated_cluster(1, false))
        .reply("redis-1", "info replication", "# Replication\r\nrole:slave\r\nslave_repl_offset:500\r\n")
        .reply("redis-2", "info replication", "# Replication\r\nrole:slave\r\nslave_repl_offset:900\r\n")
        .reply("redis-2", "cluster failover", "OK\n")
        .replies(
            "redis-2",
            "cluster nodes",
            &[&replicated_cluster(3, false), &replicated_cluster(3, true)],
        );
    let ctx = context(executor.clone(), redis_pods(3));
    let orchestrator = FailoverOrchestrator::new(&ctx).with_clock(FakeClock::new());

    let mut target = ClusterFailover::new("redis-0", "redis-0");
    let report = orchestrator.run(&mut target).await;

    assert_eq!(report.outcome, FailoverOutcome::Succeeded, "{:?}", report.error);
    assert_eq!(report.attempt.mode, FailoverMode::Cluster);
    assert_eq!(report.attempt.chosen_replica.as_deref(), Some("redis-2"));
    assert_eq!(report.attempt.polls, 2);
    assert_eq!(report.new_master.unwrap().name, "redis-2");
    assert_eq!(executor.count("redis-2", "cluster failover"), 1);
    assert_eq!(executor.count("redis-1", "cluster failover"), 0);
}

#[tokio::test]
async fn test_cluster_failover_ties_go_to_smallest_pod_name() {
    let executor = FakeExecutor::new();
    executor
        .reply("redis-0", "cluster nodes", &replicated_cluster(1, false))
        .fail(
            "redis-1",
            "info replication",
            kuberc_core::ExecFailure::Transport("stream closed".to_string()),
        )
        .reply("redis-2", "info replication", "# Replication\r\nrole:slave\r\n")
        .reply("redis-1", "cluster failover force", "OK\n")
        .reply("redis-1", "cluster nodes", &replicated_cluster(2, false));
    let ctx = context(executor.clone(), redis_pods(3));
    let orchestrator = FailoverOrchestrator::new(&ctx)
        .with_clock(FakeClock::new())
        .with_policy(RetryPolicy::new(2, Duration::from_millis(10)));

    let mut target =
        ClusterFailover::new("redis-0", node_id(1)).with_mode(ClusterFailoverMode::Force);
    let report = orchestrator.run(&mut target).await;

    assert_eq!(report.attempt.chosen_replica.as_deref(), Some("redis-1"));
    assert_eq!(executor.count("redis-1", "cluster failover force"), 1);
    assert_eq!(report.outcome, FailoverOutcome::TimedOut);
    assert_eq!(report.attempt.polls, 2);
}

#[tokio::test]
async fn test_cluster_failover_rejects_foreign_replica() {
    let executor = FakeExecutor::new();
    executor.reply("redis-0", "cluster nodes", &replicated_cluster(1, false));
    let ctx = context(executor.clone(), redis_pods(3));
    let orchestrator = FailoverOrchestrator::new(&ctx).with_clock(FakeClock::new());

    // redis-1 hosts a replica, not a master
    let report = orchestrator
        .run(&mut ClusterFailover::new("redis-0", "redis-1"))
        .await;
    assert_eq!(report.outcome, FailoverOutcome::Aborted);
    assert!(matches!(report.error, Some(KubercError::NodeNotFound(_))));

    // the named replica must follow the target master
    let report = orchestrator
        .run(&mut ClusterFailover::new("redis-0", "redis-0").with_replica(Some("redis-0".to_string())))
        .await;
    assert_eq!(report.outcome, FailoverOutcome::Aborted);
    assert!(matches!(report.error, Some(KubercError::NoEligibleReplica(_))));
    assert_eq!(executor.calls().iter().filter(|c| c.command().contains("failover")).count(), 0);
}
