use super::attempt::{FailoverAttempt, FailoverMode, FailoverOutcome, FailoverState};
use super::policy::{Clock, RetryPolicy, TokioClock};
use crate::error::{KubercError, Result};
use crate::exec::{ExecContext, PodRef};
use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one convergence poll saw
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub converged: bool,
    /// Pod now hosting the master, when it resolves to one
    pub master: Option<PodRef>,
    /// `ip:port` of the reported master
    pub master_addr: Option<String>,
    pub detail: String,
}

impl Observation {
    pub fn pending(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            ..Self::default()
        }
    }
}

/// One side of a failover: how to start it and how to tell it is done
#[async_trait]
pub trait FailoverTarget: Send {
    fn mode(&self) -> FailoverMode;

    /// Name of what is being failed over (master name, node id or pod)
    fn describe(&self) -> String;

    /// Replica picked for promotion, once known
    fn chosen_replica(&self) -> Option<String> {
        None
    }

    /// Snapshot the pre-failover topology and issue the failover command
    async fn initiate(&mut self, ctx: &ExecContext) -> Result<()>;

    async fn poll(&mut self, ctx: &ExecContext) -> Result<Observation>;
}

fn error_text<S: Serializer>(error: &Option<KubercError>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    error.as_ref().map(ToString::to_string).serialize(serializer)
}

/// Result of `FailoverOrchestrator::run`
#[derive(Debug, Serialize)]
pub struct FailoverReport {
    pub attempt: FailoverAttempt,
    pub outcome: FailoverOutcome,
    pub new_master: Option<PodRef>,
    pub last_observation: Option<Observation>,
    #[serde(serialize_with = "error_text")]
    pub error: Option<KubercError>,
}

impl FailoverReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == FailoverOutcome::Succeeded
    }

    /// New master pod on success, the recorded error otherwise
    pub fn into_result(self) -> Result<Option<PodRef>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.new_master),
        }
    }
}

/// Drives a failover through initiate, poll and a terminal outcome
///
/// The failover command is issued at most once per run; an attempt that
/// times out is reported and never retried.
pub struct FailoverOrchestrator<'a> {
    ctx: &'a ExecContext,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl<'a> FailoverOrchestrator<'a> {
    pub fn new(ctx: &'a ExecContext) -> Self {
        Self {
            ctx,
            policy: RetryPolicy::from_config(&ctx.config().failover),
            clock: Arc::new(TokioClock),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run<T: FailoverTarget + ?Sized>(&self, target: &mut T) -> FailoverReport {
        let mut attempt = FailoverAttempt::new(target.mode(), target.describe(), self.clock.now());
        info!(
            id = %attempt.id,
            mode = %attempt.mode,
            failover = %attempt.target,
            "starting failover"
        );

        let initiated = target.initiate(self.ctx).await;
        attempt.chosen_replica = target.chosen_replica();
        if let Err(err) = initiated {
            warn!(id = %attempt.id, failover = %attempt.target, error = %err, "failover aborted");
            return Self::finish(attempt, FailoverOutcome::Aborted, None, Some(err));
        }

        attempt.state = FailoverState::Polling;
        info!(
            id = %attempt.id,
            replica = ?attempt.chosen_replica,
            max_attempts = self.policy.max_attempts,
            "failover issued, waiting for convergence"
        );

        let mut last: Option<Observation> = None;
        while attempt.polls < self.policy.max_attempts {
            if let Err(err) = self.policy.wait(self.clock.as_ref(), self.ctx.cancel_token()).await {
                warn!(id = %attempt.id, polls = attempt.polls, "failover polling cancelled");
                return Self::finish(attempt, FailoverOutcome::Aborted, last, Some(err));
            }

            attempt.polls += 1;
            match target.poll(self.ctx).await {
                Ok(observation) if observation.converged => {
                    info!(
                        id = %attempt.id,
                        polls = attempt.polls,
                        master = ?observation.master.as_ref().map(|p| p.name.as_str()),
                        addr = ?observation.master_addr,
                        "failover converged"
                    );
                    return Self::finish(attempt, FailoverOutcome::Succeeded, Some(observation), None);
                }
                Ok(observation) => {
                    debug!(id = %attempt.id, poll = attempt.polls, detail = %observation.detail, "not converged");
                    last = Some(observation);
                }
                Err(KubercError::Cancelled) => {
                    return Self::finish(attempt, FailoverOutcome::Aborted, last, Some(KubercError::Cancelled));
                }
                Err(err) => {
                    warn!(id = %attempt.id, poll = attempt.polls, error = %err, "poll failed");
                }
            }
        }

        let err = KubercError::ConvergenceTimeout {
            target: attempt.target.clone(),
            attempts: attempt.polls,
        };
        warn!(id = %attempt.id, polls = attempt.polls, "failover did not converge");
        Self::finish(attempt, FailoverOutcome::TimedOut, last, Some(err))
    }

    fn finish(
        mut attempt: FailoverAttempt,
        outcome: FailoverOutcome,
        observation: Option<Observation>,
        error: Option<KubercError>,
    ) -> FailoverReport {
        attempt.finish(outcome);
        let new_master = match outcome {
            FailoverOutcome::Succeeded => observation.as_ref().and_then(|o| o.master.clone()),
            _ => None,
        };
        FailoverReport {
            attempt,
            outcome,
            new_master,
            last_observation: observation,
            error,
        }
    }
}
