use thiserror::Error;

/// Why a command could not be run inside a pod
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecFailure {
    #[error("pod not found")]
    PodNotFound,

    #[error("container not found")]
    ContainerNotFound,

    #[error("pod is not running (phase: {0})")]
    PodNotRunning(String),

    #[error("command exited with status {code}: {stderr}")]
    NonZeroExit {
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),
}

/// Main error type for kuberc operations
#[derive(Debug, Error)]
pub enum KubercError {
    /// Could not run a command in a pod (transport, auth, not found, exit status)
    #[error("exec in {pod}/{container} failed for `{command}`: {source}")]
    Exec {
        pod: String,
        container: String,
        command: String,
        #[source]
        source: ExecFailure,
    },

    /// Pod was reached and Redis answered with an error reply
    #[error("redis error from {pod} for `{command}`: {message}")]
    RedisCommand {
        pod: String,
        command: String,
        message: String,
    },

    /// Reply text did not match the expected grammar
    #[error("cannot parse reply from {pod} for `{command}`: {reason}")]
    Parse {
        pod: String,
        command: String,
        reason: String,
    },

    #[error("failover of {target} did not converge after {attempts} polls")]
    ConvergenceTimeout { target: String, attempts: u32 },

    #[error("no eligible replica: {0}")]
    NoEligibleReplica(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("pod not found: {0}")]
    PodNotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("kubernetes API error: {0}")]
    Kube(String),
}

impl KubercError {
    /// Pod the failing command was aimed at, when there is one
    pub fn pod(&self) -> Option<&str> {
        match self {
            Self::Exec { pod, .. } | Self::RedisCommand { pod, .. } | Self::Parse { pod, .. } => {
                Some(pod)
            }
            Self::PodNotFound(pod) => Some(pod),
            _ => None,
        }
    }

    /// Transport-level failures may succeed when asked again; Redis-level ones will not
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Exec {
                source: ExecFailure::Transport(_) | ExecFailure::Timeout(_),
                ..
            }
        )
    }

    /// True when the pod could be reached but the command itself failed
    pub fn is_redis_error(&self) -> bool {
        matches!(self, Self::RedisCommand { .. })
    }
}

/// Result type alias for kuberc operations
pub type Result<T> = std::result::Result<T, KubercError>;
