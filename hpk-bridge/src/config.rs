//! Bridge configuration
//!
//! Defines every tunable of the bridge: control plane connection, polling
//! cadence, staleness policy, compute binaries and the remote exec target.

use hpk_compute::ComputeConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Where status artifacts are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTarget {
    /// Artifacts live on a filesystem visible to the bridge
    Local,
    /// Artifacts are read over ssh on the cluster login node
    Ssh {
        host: String,
        port: u16,
        user: String,
        key: Option<PathBuf>,
    },
}

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Name this bridge reports as
    pub node_name: String,

    /// Control plane base URL (e.g., "http://localhost:8080")
    pub control_plane_url: String,

    /// How often pods are synced and reconciled
    pub poll_interval: Duration,

    /// How long a status artifact may stay unreadable before the container
    /// is given up on
    pub status_stale_after: Duration,

    /// Maximum runtime of a container, unlimited when unset
    pub job_timeout: Option<Duration>,

    /// How long one status read may take before it counts as failed
    pub status_read_timeout: Duration,

    /// How long one launch (image pull, compile, sbatch) may take
    pub launch_timeout: Duration,

    /// Max pods reconciled at the same time
    pub max_parallel_pods: usize,

    /// Directories and binaries on the cluster side
    pub compute: ComputeConfig,

    pub remote: RemoteTarget,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(node_name: String, control_plane_url: String) -> Self {
        Self {
            node_name,
            control_plane_url,
            poll_interval: Duration::from_secs(5),
            status_stale_after: Duration::from_secs(600),
            job_timeout: None,
            status_read_timeout: Duration::from_secs(30),
            launch_timeout: Duration::from_secs(900),
            max_parallel_pods: 16,
            compute: ComputeConfig::new(default_workdir()),
            remote: RemoteTarget::Local,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - CONTROL_PLANE_URL (required)
    /// - NODE_NAME (optional, default: random uuid)
    /// - HPK_WORKDIR (optional, default: $HOME/.hpk)
    /// - POLL_INTERVAL (optional, seconds, default: 5)
    /// - STATUS_STALE_AFTER (optional, seconds, default: 600)
    /// - JOB_TIMEOUT (optional, seconds, default: unlimited)
    /// - STATUS_READ_TIMEOUT (optional, seconds, default: 30)
    /// - LAUNCH_TIMEOUT (optional, seconds, default: 900)
    /// - MAX_PARALLEL_PODS (optional, default: 16)
    /// - RUNTIME_BIN, APPTAINER_BIN, SBATCH_BIN, SCANCEL_BIN (optional)
    /// - REMOTE_HOST, REMOTE_PORT, REMOTE_USER, REMOTE_KEY (optional, ssh target)
    pub fn from_env() -> anyhow::Result<Self> {
        let control_plane_url = std::env::var("CONTROL_PLANE_URL")
            .map_err(|_| anyhow::anyhow!("CONTROL_PLANE_URL environment variable not set"))?;

        let node_name =
            std::env::var("NODE_NAME").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        let workdir = std::env::var("HPK_WORKDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_workdir());

        let poll_interval = env_secs("POLL_INTERVAL").unwrap_or(Duration::from_secs(5));

        let status_stale_after =
            env_secs("STATUS_STALE_AFTER").unwrap_or(Duration::from_secs(600));

        let job_timeout = env_secs("JOB_TIMEOUT");

        let status_read_timeout =
            env_secs("STATUS_READ_TIMEOUT").unwrap_or(Duration::from_secs(30));

        let launch_timeout = env_secs("LAUNCH_TIMEOUT").unwrap_or(Duration::from_secs(900));

        let max_parallel_pods = std::env::var("MAX_PARALLEL_PODS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(16);

        let mut compute = ComputeConfig::new(workdir);
        if let Ok(bin) = std::env::var("RUNTIME_BIN") {
            compute.runtime_bin = bin;
        }
        if let Ok(bin) = std::env::var("APPTAINER_BIN") {
            compute.apptainer_bin = bin;
        }
        if let Ok(bin) = std::env::var("SBATCH_BIN") {
            compute.sbatch_bin = bin;
        }
        if let Ok(bin) = std::env::var("SCANCEL_BIN") {
            compute.scancel_bin = bin;
        }

        let remote = match std::env::var("REMOTE_HOST") {
            Ok(host) => RemoteTarget::Ssh {
                host,
                port: std::env::var("REMOTE_PORT")
                    .ok()
                    .and_then(|s| s.parse::<u16>().ok())
                    .unwrap_or(22),
                user: std::env::var("REMOTE_USER")
                    .or_else(|_| std::env::var("USER"))
                    .unwrap_or_default(),
                key: std::env::var("REMOTE_KEY").ok().map(PathBuf::from),
            },
            Err(_) => RemoteTarget::Local,
        };

        Ok(Self {
            node_name,
            control_plane_url,
            poll_interval,
            status_stale_after,
            job_timeout,
            status_read_timeout,
            launch_timeout,
            max_parallel_pods,
            compute,
            remote,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node_name.is_empty() {
            anyhow::bail!("node_name cannot be empty");
        }

        if self.control_plane_url.is_empty() {
            anyhow::bail!("control_plane_url cannot be empty");
        }

        if !self.control_plane_url.starts_with("http://")
            && !self.control_plane_url.starts_with("https://")
        {
            anyhow::bail!("control_plane_url must start with http:// or https://");
        }

        if self.poll_interval.as_secs() == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.status_stale_after < self.poll_interval {
            anyhow::bail!("status_stale_after must not be shorter than poll_interval");
        }

        if self.job_timeout.is_some_and(|t| t.is_zero()) {
            anyhow::bail!("job_timeout must be greater than 0 when set");
        }

        if self.status_read_timeout.is_zero() || self.launch_timeout.is_zero() {
            anyhow::bail!("status_read_timeout and launch_timeout must be greater than 0");
        }

        if self.status_read_timeout >= self.status_stale_after {
            anyhow::bail!("status_read_timeout must be shorter than status_stale_after");
        }

        if self.max_parallel_pods == 0 {
            anyhow::bail!("max_parallel_pods must be greater than 0");
        }

        if let RemoteTarget::Ssh { host, user, .. } = &self.remote {
            if host.is_empty() || user.is_empty() {
                anyhow::bail!("ssh target needs both a host and a user");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "http://localhost:8080".to_string(),
        )
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn default_workdir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".hpk")
}
