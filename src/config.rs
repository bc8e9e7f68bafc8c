use crate::error::{Result, SpeedtestError};
use crate::types::Algorithm;
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONFIG_URL: &str = "http://www.speedtest.net/speedtest-config.php";
pub const DEFAULT_SERVERS_URL: &str = "http://www.speedtest.net/speedtest-servers-static.php";

pub const DEFAULT_NUM_CLOSEST: usize = 3;
pub const DEFAULT_NUM_LATENCY_TESTS: usize = 5;
pub const DEFAULT_REPORT_CHAR: &str = "|";
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Edge length (px) of the randomNxN.jpg images fetched by the download test
pub const DEFAULT_DOWNLOAD_SIZES: &[u32] = &[350, 500, 750, 1000, 1500, 2000, 2500, 3000, 3500, 4000];

/// Upload payload sizes in bytes: 0.25, 0.5, 1, 1.5 and 2 MiB
pub const DEFAULT_UPLOAD_SIZES: &[usize] = &[
    256 * 1024,
    512 * 1024,
    1024 * 1024,
    1536 * 1024,
    2048 * 1024,
];

/// Every upload body starts with this form field; no window can be smaller.
pub const UPLOAD_FORM_PREFIX: &str = "content1=";

/// Run-wide settings. Built once, then only ever borrowed.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub algorithm: Algorithm,
    pub num_closest: usize,
    pub num_latency_tests: usize,
    pub report_char: String,
    /// Parallel probes/windows within one probe or one direction
    pub concurrency: usize,
    pub probe_timeout: Duration,
    pub window_timeout: Duration,
    pub download_sizes: Vec<u32>,
    pub upload_sizes: Vec<usize>,
    pub config_url: String,
    pub servers_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Max,
            num_closest: DEFAULT_NUM_CLOSEST,
            num_latency_tests: DEFAULT_NUM_LATENCY_TESTS,
            report_char: DEFAULT_REPORT_CHAR.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            probe_timeout: Duration::from_secs(3),
            window_timeout: Duration::from_secs(15),
            download_sizes: DEFAULT_DOWNLOAD_SIZES.to_vec(),
            upload_sizes: DEFAULT_UPLOAD_SIZES.to_vec(),
            config_url: DEFAULT_CONFIG_URL.to_string(),
            servers_url: DEFAULT_SERVERS_URL.to_string(),
        }
    }
}

/// One layer of partial settings: the TOML file, or the command line.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsLayer {
    pub algorithm: Option<Algorithm>,
    pub num_closest: Option<usize>,
    pub num_latency_tests: Option<usize>,
    pub report_char: Option<String>,
    pub concurrency: Option<usize>,
    pub probe_timeout_secs: Option<u64>,
    pub window_timeout_secs: Option<u64>,
    pub download_sizes: Option<Vec<u32>>,
    pub upload_sizes: Option<Vec<usize>>,
    pub config_url: Option<String>,
    pub servers_url: Option<String>,
}

impl Settings {
    /// Apply every field the layer sets on top of `self`.
    pub fn merge(mut self, layer: SettingsLayer) -> Self {
        if let Some(v) = layer.algorithm {
            self.algorithm = v;
        }
        if let Some(v) = layer.num_closest {
            self.num_closest = v;
        }
        if let Some(v) = layer.num_latency_tests {
            self.num_latency_tests = v;
        }
        if let Some(v) = layer.report_char {
            self.report_char = v;
        }
        if let Some(v) = layer.concurrency {
            self.concurrency = v;
        }
        if let Some(v) = layer.probe_timeout_secs {
            self.probe_timeout = Duration::from_secs(v);
        }
        if let Some(v) = layer.window_timeout_secs {
            self.window_timeout = Duration::from_secs(v);
        }
        if let Some(v) = layer.download_sizes {
            self.download_sizes = v;
        }
        if let Some(v) = layer.upload_sizes {
            self.upload_sizes = v;
        }
        if let Some(v) = layer.config_url {
            self.config_url = v;
        }
        if let Some(v) = layer.servers_url {
            self.servers_url = v;
        }
        // 至少一个并发
        self.concurrency = self.concurrency.max(1);
        self
    }

    /// Defaults, then the user's settings.toml (if any), then `cli`.
    pub fn load(cli: SettingsLayer) -> Result<Self> {
        let mut settings = Settings::default();
        if let Some(path) = settings_path() {
            if let Some(file) = read_layer(&path)? {
                debug!("Loaded settings from {:?}", path);
                settings = settings.merge(file);
            }
        }
        settings.merge(cli).validated()
    }

    /// Reject upload windows too small to carry the form prefix.
    pub fn validated(self) -> Result<Self> {
        if let Some(&bytes) = self
            .upload_sizes
            .iter()
            .find(|&&b| b < UPLOAD_FORM_PREFIX.len())
        {
            return Err(SpeedtestError::InvalidParameter(format!(
                "upload size {} is below the minimum of {} bytes",
                bytes,
                UPLOAD_FORM_PREFIX.len()
            )));
        }
        Ok(self)
    }
}

/// ~/.config/speedtest/settings.toml (platform equivalent elsewhere)
pub fn settings_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "speedtest").map(|dirs| dirs.config_dir().join("settings.toml"))
}

/// A missing file is not an error; a malformed one is.
pub fn read_layer(path: &Path) -> Result<Option<SettingsLayer>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&content)?))
}
