//! Engine configuration: scheduler and worker tunables, read from a JSON
//! file with per-field defaults, resolved (validated) into an owned
//! [`ResolvedConfig`] the rest of the engine runs on.

use tracing::trace;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default = "default_scheduler_enabled")]
    pub scheduler_enabled: bool,

    #[serde(default = "default_scheduler_interval")]
    pub scheduler_interval_secs: u64,

    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    #[serde(default = "default_queue_overwhelmed_size")]
    pub queue_overwhelmed_size: usize,

    #[serde(default = "default_queue_warning_size")]
    pub queue_warning_size: usize,

    #[serde(default = "default_registry_warning_size")]
    pub registry_warning_size: usize,

    /// Storage backend configuration (optional — defaults to in-memory).
    pub storage: Option<StorageConfig>,

    /// Email provider configuration (optional — defaults to a no-op provider).
    pub email: Option<EmailConfig>,

    /// Status API configuration (optional — API disabled if not specified).
    #[cfg(feature = "api")]
    pub api: Option<ApiConfig>,
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_scheduler_interval() -> u64 {
    30
}

fn default_health_check_interval() -> u64 {
    120
}

fn default_worker_count() -> usize {
    12
}

fn default_http_timeout() -> u64 {
    20
}

fn default_retry_delay() -> u64 {
    10
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_success_threshold() -> u32 {
    3
}

fn default_queue_overwhelmed_size() -> usize {
    1000
}

fn default_queue_warning_size() -> usize {
    500
}

fn default_registry_warning_size() -> usize {
    5000
}

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence across restarts)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: std::path::PathBuf,

        /// Retention period in days (check results older than this are deleted)
        #[serde(default = "default_retention_days")]
        retention_days: u32,

        /// Cleanup interval in hours (how often to run retention cleanup)
        #[serde(default = "default_cleanup_interval_hours")]
        cleanup_interval_hours: u32,
    },
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::None => Ok(()),
            StorageConfig::Sqlite {
                retention_days,
                cleanup_interval_hours,
                ..
            } => {
                if *retention_days < 1 {
                    return Err("retention_days must be at least 1".to_string());
                }
                if *retention_days > 3650 {
                    return Err("retention_days cannot exceed 3650 (10 years)".to_string());
                }
                if *cleanup_interval_hours < 1 {
                    return Err("cleanup_interval_hours must be at least 1".to_string());
                }
                if *cleanup_interval_hours > 720 {
                    return Err("cleanup_interval_hours cannot exceed 720 (30 days)".to_string());
                }

                let retention_hours = *retention_days as u64 * 24;
                if (*cleanup_interval_hours as u64) > retention_hours {
                    tracing::warn!(
                        "cleanup_interval_hours ({}) is longer than retention period ({} hours); \
                         old check results may accumulate",
                        cleanup_interval_hours,
                        retention_hours
                    );
                }

                Ok(())
            }
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
        }
    }
}

fn default_sqlite_path() -> std::path::PathBuf {
    std::path::PathBuf::from("./uptime-engine.db")
}

fn default_retention_days() -> u32 {
    30
}

fn default_cleanup_interval_hours() -> u32 {
    24
}

/// Email provider configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmailConfig {
    /// No-op provider: always reports success, sends nothing. Default.
    Noop,

    /// Transactional email HTTP API.
    Http {
        api_url: String,
        api_key: String,
        sender_email: String,
        sender_name: String,
    },
}

impl Default for EmailConfig {
    fn default() -> Self {
        EmailConfig::Noop
    }
}

/// Status API configuration
#[cfg(feature = "api")]
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind")]
    pub bind: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Optional bearer token required on all status routes.
    pub auth_token: Option<String>,

    #[serde(default = "default_api_cors")]
    pub enable_cors: bool,
}

#[cfg(feature = "api")]
fn default_api_bind() -> String {
    "127.0.0.1".to_string()
}

#[cfg(feature = "api")]
fn default_api_port() -> u16 {
    8080
}

#[cfg(feature = "api")]
fn default_api_cors() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

/// Resolved, validated configuration the engine runs on.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub scheduler_enabled: bool,
    pub scheduler_interval_secs: u64,
    pub health_check_interval_secs: u64,
    pub worker_count: usize,
    pub http_timeout_secs: u64,
    pub retry_delay_secs: u64,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub queue_overwhelmed_size: usize,
    pub queue_warning_size: usize,
    pub registry_warning_size: usize,
    pub storage: Option<StorageConfig>,
    pub email: EmailConfig,
    #[cfg(feature = "api")]
    pub api: Option<ApiConfig>,
}

impl Config {
    /// Validate and freeze the raw config into a [`ResolvedConfig`].
    ///
    /// Unlike a server-fleet config (which merges per-item overrides against
    /// defaults), every tunable here is a single global value, so resolution
    /// is pure bounds validation plus construction.
    pub fn resolve(self) -> anyhow::Result<ResolvedConfig> {
        if !(1..=50).contains(&self.worker_count) {
            anyhow::bail!("worker_count must be within 1..=50, got {}", self.worker_count);
        }
        if !(10..=300).contains(&self.scheduler_interval_secs) {
            anyhow::bail!(
                "scheduler_interval_secs must be within 10..=300, got {}",
                self.scheduler_interval_secs
            );
        }
        if !(5..=120).contains(&self.http_timeout_secs) {
            anyhow::bail!(
                "http_timeout_secs must be within 5..=120, got {}",
                self.http_timeout_secs
            );
        }

        if let Some(ref storage_config) = self.storage {
            storage_config
                .validate()
                .map_err(|e| anyhow::anyhow!("invalid storage configuration: {e}"))?;
        }

        Ok(ResolvedConfig {
            scheduler_enabled: self.scheduler_enabled,
            scheduler_interval_secs: self.scheduler_interval_secs,
            health_check_interval_secs: self.health_check_interval_secs,
            worker_count: self.worker_count,
            http_timeout_secs: self.http_timeout_secs,
            retry_delay_secs: self.retry_delay_secs,
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            queue_overwhelmed_size: self.queue_overwhelmed_size,
            queue_warning_size: self.queue_warning_size,
            registry_warning_size: self.registry_warning_size,
            storage: self.storage,
            email: self.email.unwrap_or_default(),
            #[cfg(feature = "api")]
            api: self.api,
        })
    }
}

/// Per-user notification preferences (external — owned by the REST/settings
/// layer, read by the Notification Coordinator via the persistence adapter).
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct NotificationSettings {
    pub email_enabled: bool,
    pub email_address: String,
    /// Consecutive failures required before a failure event qualifies; 5..=20.
    pub failure_threshold: u32,
}
