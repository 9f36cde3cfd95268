use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub docker: DockerConfig,
    pub shaping: ShapingConfig,
    pub reconcile: ReconcileConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Unix socket path; bollard's defaults (DOCKER_HOST, /var/run/docker.sock) when unset.
    pub socket: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShapingConfig {
    pub tc_path: String,
    pub ip_path: String,
    /// Where `ip netns` looks up namespace names. Fixed by iproute2 at build time, so only its
    /// NETNS_RUN_DIR (or the /run alias) is accepted.
    pub netns_dir: PathBuf,
    /// Symlink each container's sandbox key into netns_dir under its display name.
    pub link_netns: bool,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            tc_path: "tc".into(),
            ip_path: "ip".into(),
            netns_dir: PathBuf::from("/var/run/netns"),
            link_netns: true,
        }
    }
}

/// What the enumerator does when one container cannot be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the whole pass; nothing is installed.
    #[default]
    FailClosed,
    /// Log and skip the container; shape the rest.
    SkipContainer,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub failure_policy: FailurePolicy,
    /// Quiet period after a trigger before a pass starts; bursts of events collapse into one pass.
    pub debounce_ms: u64,
    /// Full pass even without events.
    pub resync_interval_secs: u64,
    /// Wait before resubscribing after the Docker event stream drops.
    pub event_retry_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::FailClosed,
            debounce_ms: 250,
            resync_interval_secs: 300,
            event_retry_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".into(),
            port: 9184,
        }
    }
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// iproute2's NETNS_RUN_DIR and its /run alias.
const NETNS_RUN_DIRS: &[&str] = &["/var/run/netns", "/run/netns"];

impl AppConfig {
    /// Load `$CONFIG_FILE`, or `config.toml` when present, or defaults.
    pub fn load() -> anyhow::Result<Self> {
        let s = match std::env::var("CONFIG_FILE") {
            Ok(path) => std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("reading {}: {}", path, e))?,
            Err(_) => match std::fs::read_to_string(DEFAULT_CONFIG_FILE) {
                Ok(s) => s,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => anyhow::bail!("reading {}: {}", DEFAULT_CONFIG_FILE, e),
            },
        };
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.shaping.tc_path.is_empty(),
            "shaping.tc_path must be non-empty"
        );
        anyhow::ensure!(
            !self.shaping.ip_path.is_empty(),
            "shaping.ip_path must be non-empty"
        );
        anyhow::ensure!(
            NETNS_RUN_DIRS
                .iter()
                .any(|d| self.shaping.netns_dir.as_path() == Path::new(d)),
            "shaping.netns_dir must be the directory `ip netns` uses ({}), got {}",
            NETNS_RUN_DIRS.join(" or "),
            self.shaping.netns_dir.display()
        );
        anyhow::ensure!(
            self.reconcile.resync_interval_secs > 0,
            "reconcile.resync_interval_secs must be > 0, got {}",
            self.reconcile.resync_interval_secs
        );
        anyhow::ensure!(
            self.reconcile.event_retry_secs > 0,
            "reconcile.event_retry_secs must be > 0, got {}",
            self.reconcile.event_retry_secs
        );
        if self.server.enabled {
            anyhow::ensure!(
                self.server.port > 0,
                "server.port must be between 1 and 65535, got {}",
                self.server.port
            );
            anyhow::ensure!(!self.server.host.is_empty(), "server.host must be non-empty");
        }
        if let Some(socket) = &self.docker.socket {
            anyhow::ensure!(!socket.is_empty(), "docker.socket must be non-empty when set");
        }
        Ok(())
    }
}
