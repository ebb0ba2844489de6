#![warn(missing_docs)]

//! # Slipway Config
//!
//! One typed [`Config`] built from the process environment at startup.
//! Every component receives only the slice it needs (`HttpConfig`,
//! `WorkerConfig`, ...); nothing else in the workspace reads environment
//! variables.
//!
//! Parsing is total: every variable has a default, and a malformed value
//! is a [`ConfigError`] naming the variable rather than a panic.

use std::path::PathBuf;
use std::time::Duration;

/// Error produced when an environment variable cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid value for {var}: {value:?} ({expected})")]
pub struct ConfigError {
    /// The offending variable name.
    pub var: &'static str,
    /// The rejected raw value.
    pub value: String,
    /// What was expected instead.
    pub expected: &'static str,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Bind address, default `0.0.0.0`.
    pub host: String,
    /// Bind port, default `3000`.
    pub port: u16,
}

/// Durable storage locations.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root for deployment/credential/log documents and the queue
    /// journal. Default `./data`.
    pub data_dir: PathBuf,
    /// Root under which clone workspaces are created. Default
    /// `<data_dir>/workspaces`.
    pub workspace_root: PathBuf,
}

/// Container daemon settings.
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    /// Daemon endpoint (`unix:///...` or `http://...`); `None` means the
    /// platform's local socket.
    pub host: Option<String>,
}

/// Credential vault settings.
#[derive(Debug, Clone, Default)]
pub struct VaultConfig {
    /// Hex- or base64-encoded master key. Absent means the vault
    /// generates an ephemeral key and logs a warning.
    pub encryption_key: Option<String>,
}

/// Worker pool and job policy settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pool size, default the number of CPUs, minimum 1.
    pub count: usize,
    /// Per-job wall-clock budget, default 15 minutes.
    pub job_timeout: Duration,
    /// Delivery attempt cap, default 3.
    pub max_attempts: u32,
}

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Backlog size beyond which intake logs a warning (it never
    /// blocks). Default 100.
    pub high_water: usize,
}

/// API limits.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Intake requests accepted per minute. Default 60.
    pub rate_limit_per_minute: u32,
}

/// The complete process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listener.
    pub http: HttpConfig,
    /// Storage locations.
    pub storage: StorageConfig,
    /// Container daemon.
    pub container: ContainerConfig,
    /// Credential vault.
    pub vault: VaultConfig,
    /// Worker pool.
    pub worker: WorkerConfig,
    /// Queue tuning.
    pub queue: QueueConfig,
    /// API limits.
    pub api: ApiConfig,
}

impl Config {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. The seam tests use.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = lookup("SLIPWAY_DATA_DIR")
            .map_or_else(|| PathBuf::from("./data"), PathBuf::from);
        let workspace_root = lookup("WORKSPACE_ROOT")
            .map_or_else(|| data_dir.join("workspaces"), PathBuf::from);

        Ok(Self {
            http: HttpConfig {
                host: lookup("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
                port: parse(&lookup, "HTTP_PORT", 3000, "a port number")?,
            },
            storage: StorageConfig {
                data_dir,
                workspace_root,
            },
            container: ContainerConfig {
                host: lookup("CONTAINER_HOST").filter(|v| !v.is_empty()),
            },
            vault: VaultConfig {
                encryption_key: lookup("ENCRYPTION_KEY").filter(|v| !v.is_empty()),
            },
            worker: WorkerConfig {
                count: parse(&lookup, "WORKER_COUNT", default_worker_count(), "a positive integer")?
                    .max(1),
                job_timeout: Duration::from_millis(parse(
                    &lookup,
                    "JOB_TIMEOUT_MS",
                    900_000,
                    "milliseconds",
                )?),
                max_attempts: parse(&lookup, "MAX_ATTEMPTS", 3, "a positive integer")?.max(1),
            },
            queue: QueueConfig {
                high_water: parse(&lookup, "QUEUE_HIGH_WATER", 100, "a positive integer")?,
            },
            api: ApiConfig {
                rate_limit_per_minute: parse(
                    &lookup,
                    "RATE_LIMIT_PER_MINUTE",
                    60,
                    "a positive integer",
                )?,
            },
        })
    }
}

fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) if raw.is_empty() => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError {
            var,
            value: raw,
            expected,
        }),
    }
}
