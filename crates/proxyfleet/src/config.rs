//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{WrapErr, bail, eyre};
use serde::Deserialize;

use proxyfleet_core::{
    Backend, DEFAULT_PARALLELISM, DistributionSettings, HostSpec, HysteriaSettings,
    ProvisionProfile, Timeouts, validate_hosts,
};
use proxyfleet_exec::{RetryPolicy, SshCredential};
use proxyfleet_link::ProtocolKind;
use proxyfleet_routing::RoutingOptions;

/// Top-level configuration for proxyfleet
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    /// Shared credentials, required by the hysteria backend
    pub hysteria: Option<HysteriaConfig>,
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub routing: RoutingOptions,
    /// Inline inventory; when empty the JSON inventory file is used
    #[serde(default)]
    pub host: Vec<HostEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// JSON host inventory
    #[serde(default = "default_inventory")]
    pub inventory: PathBuf,
    /// Hosts provisioned at once
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// `alias: link` lines of succeeded hosts
    #[serde(default = "default_subscriptions_file")]
    pub subscriptions_file: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            inventory: default_inventory(),
            parallelism: default_parallelism(),
            subscriptions_file: default_subscriptions_file(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_inventory() -> PathBuf {
    PathBuf::from("servers.json")
}

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

fn default_subscriptions_file() -> PathBuf {
    PathBuf::from("subscriptions.txt")
}

/// Connection retry settings
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Handshake and authentication, per attempt
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    Timeouts::default().connect.as_secs()
}

impl SshConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

/// Which backend installs the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    SingBox,
    Hysteria,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub backend: BackendKind,
    /// Protocol for the sing-box backend
    pub protocol: ProtocolKind,
    pub listen_port: u16,
    /// REALITY camouflage domain
    pub reality_server_name: String,
    pub command_timeout_secs: u64,
    pub install_timeout_secs: u64,
    pub pipeline_timeout_secs: u64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        let timeouts = Timeouts::default();
        Self {
            backend: BackendKind::default(),
            protocol: ProtocolKind::Reality,
            listen_port: 443,
            reality_server_name: "www.microsoft.com".to_string(),
            command_timeout_secs: timeouts.command.as_secs(),
            install_timeout_secs: timeouts.install.as_secs(),
            pipeline_timeout_secs: timeouts.pipeline.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HysteriaConfig {
    pub auth_password: String,
    pub obfs_password: String,
    #[serde(default = "default_hysteria_sni")]
    pub sni: String,
    #[serde(default = "default_up_mbps")]
    pub up_mbps: u32,
    #[serde(default = "default_down_mbps")]
    pub down_mbps: u32,
}

fn default_hysteria_sni() -> String {
    "www.bing.com".to_string()
}

fn default_up_mbps() -> u32 {
    100
}

fn default_down_mbps() -> u32 {
    200
}

/// Publishing of the routing config
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Upload to the first provisioned host; the local copy is always written
    pub enabled: bool,
    pub local_path: PathBuf,
    pub web_root: String,
    pub file_name: String,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        let settings = DistributionSettings::default();
        Self {
            enabled: true,
            local_path: settings.local_path,
            web_root: settings.web_root,
            file_name: settings.file_name,
        }
    }
}

impl DistributionConfig {
    #[must_use]
    pub fn settings(&self) -> DistributionSettings {
        DistributionSettings {
            local_path: self.local_path.clone(),
            web_root: self.web_root.clone(),
            file_name: self.file_name.clone(),
        }
    }
}

/// One inventory entry as written in `servers.json` or a `[[host]]` table
#[derive(Debug, Clone, Deserialize)]
pub struct HostEntry {
    #[serde(default)]
    pub alias: String,
    #[serde(alias = "ip")]
    pub address: String,
    #[serde(alias = "user", default = "default_user")]
    pub ssh_user: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    pub password: Option<String>,
    pub ssh_key: Option<PathBuf>,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

impl TryFrom<HostEntry> for HostSpec {
    type Error = eyre::Report;

    fn try_from(entry: HostEntry) -> Result<Self, Self::Error> {
        let credential = match (entry.password, entry.ssh_key) {
            (Some(_), Some(_)) => {
                bail!("host `{}` sets both password and ssh_key", entry.alias)
            }
            (Some(password), None) => SshCredential::Password(password),
            (None, Some(key)) => SshCredential::KeyFile(key),
            (None, None) => bail!("host `{}` has neither password nor ssh_key", entry.alias),
        };

        Ok(HostSpec {
            alias: entry.alias,
            address: entry.address,
            ssh_user: entry.ssh_user,
            ssh_port: entry.ssh_port,
            credential,
        })
    }
}

/// Parse a JSON inventory (array of host entries)
///
/// # Errors
/// Returns error if the JSON is malformed or an entry has no usable credential
pub fn parse_inventory(json: &str) -> eyre::Result<Vec<HostSpec>> {
    let entries: Vec<HostEntry> = serde_json::from_str(json).wrap_err("invalid inventory JSON")?;
    entries.into_iter().map(HostSpec::try_from).collect()
}

/// Load and validate a JSON inventory file
///
/// # Errors
/// Returns error if the file is missing, unreadable, invalid or fails validation
pub fn load_inventory(path: &Path) -> eyre::Result<Vec<HostSpec>> {
    if !path.exists() {
        bail!("inventory {} not found", path.display());
    }
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read inventory {}", path.display()))?;
    let hosts = parse_inventory(&content)?;
    validate_hosts(&hosts)?;
    Ok(hosts)
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).wrap_err_with(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Load from default paths or use defaults
    ///
    /// Also returns the file that was loaded, `None` when falling back to defaults.
    ///
    /// # Errors
    /// Returns error if a config file is found but cannot be loaded
    pub fn load_default() -> eyre::Result<(Self, Option<PathBuf>)> {
        if let Ok(path) = std::env::var("PROXYFLEET_CONFIG") {
            let path = PathBuf::from(path);
            return Ok((Self::load(&path)?, Some(path)));
        }

        let paths = [
            PathBuf::from("proxyfleet.toml"),
            PathBuf::from("/etc/proxyfleet/proxyfleet.toml"),
            dirs::config_dir()
                .map(|p| p.join("proxyfleet/proxyfleet.toml"))
                .unwrap_or_default(),
        ];

        for path in paths {
            if path.is_file() {
                return Ok((Self::load(&path)?, Some(path)));
            }
        }

        Ok((Config::default(), None))
    }

    /// Timeouts for provisioning and distribution
    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.ssh.connect_timeout_secs),
            command: Duration::from_secs(self.profile.command_timeout_secs),
            install: Duration::from_secs(self.profile.install_timeout_secs),
            pipeline: Duration::from_secs(self.profile.pipeline_timeout_secs),
        }
    }

    /// Hosts to provision
    ///
    /// `inventory` overrides everything; otherwise inline `[[host]]` tables
    /// win over the configured inventory file.
    ///
    /// # Errors
    /// Returns error if the inventory cannot be loaded or fails validation
    pub fn hosts(&self, inventory: Option<&Path>) -> eyre::Result<Vec<HostSpec>> {
        if let Some(path) = inventory {
            return load_inventory(path);
        }
        if self.host.is_empty() {
            return load_inventory(&self.general.inventory);
        }

        let hosts = self
            .host
            .iter()
            .cloned()
            .map(HostSpec::try_from)
            .collect::<eyre::Result<Vec<_>>>()?;
        validate_hosts(&hosts)?;
        Ok(hosts)
    }

    /// Build the per-run provisioning profile
    ///
    /// # Errors
    /// Returns error if the hysteria backend is selected without credentials
    pub fn provision_profile(&self) -> eyre::Result<ProvisionProfile> {
        let backend = match self.profile.backend {
            BackendKind::SingBox => Backend::SingBox {
                protocol: self.profile.protocol,
                reality_server_name: self.profile.reality_server_name.clone(),
            },
            BackendKind::Hysteria => {
                let hy = self.hysteria.as_ref().ok_or_else(|| {
                    eyre!("backend `hysteria` needs a [hysteria] section with auth_password and obfs_password")
                })?;
                Backend::Hysteria(HysteriaSettings {
                    auth_password: hy.auth_password.clone(),
                    obfs_password: hy.obfs_password.clone(),
                    sni: hy.sni.clone(),
                    up_mbps: hy.up_mbps,
                    down_mbps: hy.down_mbps,
                })
            }
        };

        Ok(ProvisionProfile {
            backend,
            listen_port: self.profile.listen_port,
            timeouts: self.timeouts(),
        })
    }
}
