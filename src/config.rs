use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::DEFAULT_DISCOVERY_WAIT;
use crate::detect::DEFAULT_THRESHOLD;
use crate::pipeline::{DEFAULT_CAPTURE_TIMEOUT, DEFAULT_CYCLE_INTERVAL};
use crate::report::DEFAULT_REPORT_TIMEOUT;

pub const DEFAULT_AGGREGATOR_URL: &str = "http://localhost:5000/presence";
pub const DEFAULT_TRANSPORT: &str = "synthetic";
pub const DEFAULT_BIND_IP: &str = "0.0.0.0";
pub const DEFAULT_BIND_PORT: u16 = 5000;
const DEFAULT_SOURCES: [&str; 2] = ["stub://CamA", "stub://CamB"];

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    monitor: Option<MonitorConfigFile>,
    aggregator: Option<AggregatorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    aggregator_url: Option<String>,
    transport: Option<String>,
    sources: Option<Vec<String>>,
    select: Option<Vec<u32>>,
    capture_timeout_ms: Option<u64>,
    cycle_interval_ms: Option<u64>,
    discovery_wait_ms: Option<u64>,
    report_timeout_ms: Option<u64>,
    detection_threshold: Option<f32>,
    detector: Option<String>,
    model_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct AggregatorConfigFile {
    bind_ip: Option<String>,
    bind_port: Option<u16>,
}

/// Settings for the monitor process.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub aggregator_url: String,
    /// `synthetic` or `http`.
    pub transport: String,
    /// Source specs handed to the transport (`stub://name` or `name=url`).
    pub sources: Vec<String>,
    /// Pre-answered ordinal selection; `None` means ask the operator.
    pub select: Option<Vec<u32>>,
    pub capture_timeout: Duration,
    pub cycle_interval: Duration,
    pub discovery_wait: Duration,
    pub report_timeout: Duration,
    pub detection_threshold: f32,
    pub detector: Option<String>,
    pub model_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_file(MonitorConfigFile::default())
    }
}

impl MonitorConfig {
    /// Defaults, then `PRESENCE_CONFIG`, then `PRESENCE_*` overrides.
    pub fn load() -> Result<Self> {
        let file = load_config_file()?;
        let mut cfg = Self::from_file(file.monitor.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let file = read_config_file(path)?;
        let mut cfg = Self::from_file(file.monitor.unwrap_or_default());
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let millis = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_millis).unwrap_or(default)
        };
        Self {
            aggregator_url: file
                .aggregator_url
                .unwrap_or_else(|| DEFAULT_AGGREGATOR_URL.to_string()),
            transport: file
                .transport
                .unwrap_or_else(|| DEFAULT_TRANSPORT.to_string()),
            sources: file
                .sources
                .unwrap_or_else(|| DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect()),
            select: file.select,
            capture_timeout: millis(file.capture_timeout_ms, DEFAULT_CAPTURE_TIMEOUT),
            cycle_interval: millis(file.cycle_interval_ms, DEFAULT_CYCLE_INTERVAL),
            discovery_wait: millis(file.discovery_wait_ms, DEFAULT_DISCOVERY_WAIT),
            report_timeout: millis(file.report_timeout_ms, DEFAULT_REPORT_TIMEOUT),
            detection_threshold: file.detection_threshold.unwrap_or(DEFAULT_THRESHOLD),
            detector: file.detector,
            model_path: file.model_path,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = non_empty_env("PRESENCE_AGGREGATOR_URL") {
            self.aggregator_url = url;
        }
        if let Some(transport) = non_empty_env("PRESENCE_TRANSPORT") {
            self.transport = transport;
        }
        if let Some(sources) = non_empty_env("PRESENCE_SOURCES") {
            let parsed = split_csv(&sources);
            if !parsed.is_empty() {
                self.sources = parsed;
            }
        }
        if let Some(select) = non_empty_env("PRESENCE_SELECT") {
            self.select = Some(crate::operator::parse_selection(&select));
        }
        if let Some(ms) = env_millis("PRESENCE_CAPTURE_TIMEOUT_MS")? {
            self.capture_timeout = ms;
        }
        if let Some(ms) = env_millis("PRESENCE_CYCLE_INTERVAL_MS")? {
            self.cycle_interval = ms;
        }
        if let Some(ms) = env_millis("PRESENCE_DISCOVERY_WAIT_MS")? {
            self.discovery_wait = ms;
        }
        if let Some(ms) = env_millis("PRESENCE_REPORT_TIMEOUT_MS")? {
            self.report_timeout = ms;
        }
        if let Some(threshold) = non_empty_env("PRESENCE_DETECTION_THRESHOLD") {
            self.detection_threshold = threshold.trim().parse().map_err(|_| {
                anyhow!("PRESENCE_DETECTION_THRESHOLD must be a number between 0 and 1")
            })?;
        }
        if let Some(detector) = non_empty_env("PRESENCE_DETECTOR") {
            self.detector = Some(detector);
        }
        if let Some(path) = non_empty_env("PRESENCE_MODEL_PATH") {
            self.model_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return Err(anyhow!(
                "detection threshold {} is outside [0, 1]",
                self.detection_threshold
            ));
        }
        for (name, value) in [
            ("capture timeout", self.capture_timeout),
            ("discovery wait", self.discovery_wait),
            ("report timeout", self.report_timeout),
        ] {
            if value.is_zero() {
                return Err(anyhow!("{} must be greater than zero", name));
            }
        }
        if self.aggregator_url.trim().is_empty() {
            return Err(anyhow!("aggregator url must not be empty"));
        }
        if !matches!(self.transport.as_str(), "synthetic" | "http") {
            return Err(anyhow!(
                "unknown transport '{}' (expected synthetic or http)",
                self.transport
            ));
        }
        Ok(())
    }
}

/// Settings for the aggregator process.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub bind_ip: String,
    pub bind_port: u16,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            bind_ip: DEFAULT_BIND_IP.to_string(),
            bind_port: DEFAULT_BIND_PORT,
        }
    }
}

impl AggregatorConfig {
    pub fn load() -> Result<Self> {
        let file = load_config_file()?;
        let mut cfg = Self::from_file(file.aggregator.unwrap_or_default());
        if let Some(ip) = non_empty_env("PRESENCE_BIND_IP") {
            cfg.bind_ip = ip;
        }
        if let Some(port) = non_empty_env("PRESENCE_BIND_PORT") {
            cfg.bind_port = port
                .trim()
                .parse()
                .map_err(|_| anyhow!("PRESENCE_BIND_PORT must be a port number"))?;
        }
        cfg.bind_addr()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let file = read_config_file(path)?;
        let cfg = Self::from_file(file.aggregator.unwrap_or_default());
        cfg.bind_addr()?;
        Ok(cfg)
    }

    fn from_file(file: AggregatorConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            bind_ip: file.bind_ip.unwrap_or(defaults.bind_ip),
            bind_port: file.bind_port.unwrap_or(defaults.bind_port),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_ip
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid bind ip '{}'", self.bind_ip))?;
        Ok(SocketAddr::new(ip, self.bind_port))
    }
}

fn load_config_file() -> Result<ConfigFile> {
    match non_empty_env("PRESENCE_CONFIG") {
        Some(path) => read_config_file(Path::new(&path)),
        None => Ok(ConfigFile::default()),
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    match non_empty_env(key) {
        Some(value) => {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be an integer number of milliseconds", key))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        None => Ok(None),
    }
}

pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
