use super::{PodCommandRunner, PodRef};
use crate::error::{ExecFailure, KubercError, Result};
use crate::reply::reply_error;

/// Builds `redis-cli` argument vectors and runs them through a `PodCommandRunner`
///
/// Arguments are passed as separate argv entries, never through a shell.
#[derive(Debug, Clone)]
pub struct RedisCli {
    cli_path: String,
    host: Option<String>,
    port: u16,
    container: Option<String>,
    password: Option<String>,
}

impl RedisCli {
    pub fn new(cli_path: impl Into<String>, port: u16) -> Self {
        Self {
            cli_path: cli_path.into(),
            host: None,
            port,
            container: None,
            password: None,
        }
    }

    pub fn with_container(mut self, container: Option<String>) -> Self {
        self.container = container;
        self
    }

    /// An empty password counts as none
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    /// Target another server from inside the pod (`-h <host> -p <port>`)
    pub fn against(&self, host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port,
            ..self.clone()
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn argv(&self, args: &[&str]) -> Vec<String> {
        let mut argv = vec![self.cli_path.clone()];
        if let Some(host) = &self.host {
            argv.push("-h".to_string());
            argv.push(host.clone());
        }
        argv.push("-p".to_string());
        argv.push(self.port.to_string());
        if let Some(password) = &self.password {
            argv.push("-a".to_string());
            argv.push(password.clone());
            argv.push("--no-auth-warning".to_string());
        }
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    /// Container to exec into: configured name first, then the pod's first container
    pub fn container_for(&self, pod: &PodRef) -> Result<String> {
        self.container
            .clone()
            .or_else(|| pod.container.clone())
            .ok_or_else(|| {
                KubercError::Config(format!("no container known for pod {}", pod.name))
            })
    }

    /// Human-readable command for error context, without credentials
    pub fn display(&self, args: &[&str]) -> String {
        let mut parts = vec![self.cli_path.clone()];
        if let Some(host) = &self.host {
            parts.push(format!("-h {}", host));
        }
        parts.push(format!("-p {}", self.port));
        parts.extend(args.iter().map(|a| a.to_string()));
        parts.join(" ")
    }

    /// Run `args` in `pod` and return the reply text
    ///
    /// An error reply from Redis becomes `RedisCommand`, whether redis-cli
    /// exited zero or not.
    pub async fn query(
        &self,
        runner: &PodCommandRunner,
        pod: &PodRef,
        args: &[&str],
    ) -> Result<String> {
        let container = self.container_for(pod)?;
        let argv = self.argv(args);

        match runner.run(pod, &container, &argv).await {
            Ok(stdout) => {
                let text = String::from_utf8_lossy(&stdout).into_owned();
                match reply_error(&text) {
                    Some(message) => Err(self.redis_error(pod, args, message)),
                    None => Ok(text),
                }
            }
            Err(err) => {
                if let KubercError::Exec {
                    source: ExecFailure::NonZeroExit { stdout, .. },
                    ..
                } = &err
                {
                    if let Some(message) = reply_error(stdout) {
                        return Err(self.redis_error(pod, args, message));
                    }
                }
                Err(err)
            }
        }
    }

    fn redis_error(&self, pod: &PodRef, args: &[&str], message: String) -> KubercError {
        KubercError::RedisCommand {
            pod: pod.name.clone(),
            command: self.display(args),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_plain() {
        let cli = RedisCli::new("redis-cli", 6379);
        assert_eq!(
            cli.argv(&["cluster", "nodes"]),
            vec!["redis-cli", "-p", "6379", "cluster", "nodes"]
        );
    }

    #[test]
    fn test_argv_with_host_and_password() {
        let cli = RedisCli::new("/usr/local/bin/redis-cli", 6379)
            .with_password(Some("pw".to_string()))
            .against("10.0.0.7", 6380);

        assert_eq!(
            cli.argv(&["ping"]),
            vec![
                "/usr/local/bin/redis-cli",
                "-h",
                "10.0.0.7",
                "-p",
                "6380",
                "-a",
                "pw",
                "--no-auth-warning",
                "ping"
            ]
        );
        assert_eq!(cli.display(&["ping"]), "/usr/local/bin/redis-cli -h 10.0.0.7 -p 6380 ping");
    }

    #[test]
    fn test_argv_keeps_hostile_arguments_intact() {
        let cli = RedisCli::new("redis-cli", 26379);
        let argv = cli.argv(&["sentinel", "master", "name; rm -rf /"]);
        assert_eq!(argv.last().map(String::as_str), Some("name; rm -rf /"));
    }

    #[test]
    fn test_empty_password_sends_no_auth() {
        let cli = RedisCli::new("redis-cli", 6379).with_password(Some(String::new()));
        assert_eq!(cli.argv(&["ping"]), vec!["redis-cli", "-p", "6379", "ping"]);
    }

    #[test]
    fn test_container_selection() {
        let pod = PodRef::new("redis-0", "default").with_container("redis");
        let cli = RedisCli::new("redis-cli", 6379);
        assert_eq!(cli.container_for(&pod).unwrap(), "redis");

        let cli = cli.with_container(Some("sidecar".to_string()));
        assert_eq!(cli.container_for(&pod).unwrap(), "sidecar");

        let bare = PodRef::new("redis-1", "default");
        assert!(RedisCli::new("redis-cli", 6379).container_for(&bare).is_err());
    }
}
