use crate::error::SpeedtestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 地理坐标 (单位: 度)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// 测速服务器定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub sponsor: String, // 例如: "Comcast"
    pub name: String,    // 例如: "Chicago, IL"
    pub country: String,
    pub cc: String,
    pub host: String,
    pub url: String, // 例如: "http://speedtest.example.net/speedtest/upload.php"
    pub coordinate: Coordinate,
}

impl Server {
    #[cfg(test)]
    pub fn new(id: &str, name: &str, url: &str, coordinate: Coordinate) -> Self {
        Self {
            id: id.to_string(),
            sponsor: name.to_string(),
            name: name.to_string(),
            country: String::new(),
            cc: String::new(),
            host: String::new(),
            url: url.to_string(),
            coordinate,
        }
    }

    /// Directory part of the upload URL; latency.txt and the random*.jpg
    /// images live next to upload.php.
    pub fn base_url(&self) -> &str {
        match self.url.rfind('/') {
            Some(idx) => &self.url[..idx],
            None => &self.url,
        }
    }

    pub fn latency_url(&self) -> String {
        format!("{}/latency.txt", self.base_url())
    }

    pub fn download_url(&self, size: u32) -> String {
        format!("{}/random{}x{}.jpg", self.base_url(), size, size)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}) [id {}]",
            self.sponsor, self.name, self.country, self.id
        )
    }
}

/// The tester as seen by speedtest.net (speedtest-config.php).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientInfo {
    pub ip: String,
    pub isp: String,
    pub coordinate: Coordinate,
}

/// 选中的服务器及其测得的延迟
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub server: Server,
    pub latency_ms: f64,
}

/// How several samples reduce to one reported figure.
///
/// `Max` is best-case reporting: the lowest latency and the highest
/// throughput. `Avg` is the arithmetic mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Max,
    Avg,
}

impl Algorithm {
    pub fn latency_label(&self) -> &'static str {
        match self {
            Algorithm::Max => "Lowest",
            Algorithm::Avg => "Avg",
        }
    }

    pub fn throughput_label(&self) -> &'static str {
        match self {
            Algorithm::Max => "Max",
            Algorithm::Avg => "Avg",
        }
    }
}

impl FromStr for Algorithm {
    type Err = SpeedtestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "max" => Ok(Algorithm::Max),
            "avg" => Ok(Algorithm::Avg),
            other => Err(SpeedtestError::InvalidParameter(format!(
                "invalid algorithm '{}', expected 'max' or 'avg'",
                other
            ))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Max => write!(f, "max"),
            Algorithm::Avg => write!(f, "avg"),
        }
    }
}

/// One timed transfer window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl Sample {
    pub fn new(bytes: u64, elapsed: Duration) -> Self {
        Self { bytes, elapsed }
    }

    /// bits / seconds / 1e6. `None` when nothing moved or no time passed.
    pub fn mbps(&self) -> Option<f64> {
        let seconds = self.elapsed.as_secs_f64();
        if self.bytes == 0 || seconds <= 0.0 {
            return None;
        }
        Some((self.bytes as f64 * 8.0) / seconds / 1_000_000.0)
    }
}

/// Everything a finished run hands to the report layer.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub server: Server,
    pub latency_ms: f64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub algorithm: Algorithm,
    /// Directions that failed; their figure above is 0
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Ping-only result, labelled with the policy that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct PingSummary {
    pub server: Server,
    pub latency_ms: f64,
    pub algorithm: Algorithm,
}
