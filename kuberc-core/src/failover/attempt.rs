use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailoverMode {
    /// `SENTINEL FAILOVER <master-name>`
    Sentinel,
    /// `CLUSTER FAILOVER` on a replica
    Cluster,
}

impl fmt::Display for FailoverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sentinel => write!(f, "sentinel"),
            Self::Cluster => write!(f, "cluster"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailoverState {
    Initiated,
    Polling,
    Succeeded,
    TimedOut,
    Aborted,
}

impl FailoverState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::TimedOut | Self::Aborted)
    }
}

/// Terminal state of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailoverOutcome {
    Succeeded,
    TimedOut,
    Aborted,
}

impl From<FailoverOutcome> for FailoverState {
    fn from(outcome: FailoverOutcome) -> Self {
        match outcome {
            FailoverOutcome::Succeeded => Self::Succeeded,
            FailoverOutcome::TimedOut => Self::TimedOut,
            FailoverOutcome::Aborted => Self::Aborted,
        }
    }
}

impl fmt::Display for FailoverOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::TimedOut => write!(f, "timed-out"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// One orchestration run; lives only as long as the call that made it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailoverAttempt {
    pub id: Uuid,
    pub mode: FailoverMode,
    /// Master name (sentinel) or master node / pod (cluster)
    pub target: String,
    pub chosen_replica: Option<String>,
    pub started_at: DateTime<Utc>,
    pub polls: u32,
    pub state: FailoverState,
}

impl FailoverAttempt {
    pub fn new(mode: FailoverMode, target: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            target: target.into(),
            chosen_replica: None,
            started_at,
            polls: 0,
            state: FailoverState::Initiated,
        }
    }

    pub fn finish(&mut self, outcome: FailoverOutcome) {
        self.state = outcome.into();
    }

    pub fn outcome(&self) -> Option<FailoverOutcome> {
        match self.state {
            FailoverState::Succeeded => Some(FailoverOutcome::Succeeded),
            FailoverState::TimedOut => Some(FailoverOutcome::TimedOut),
            FailoverState::Aborted => Some(FailoverOutcome::Aborted),
            FailoverState::Initiated | FailoverState::Polling => None,
        }
    }
}
