//! Scripted in-memory transport for engine tests.

use crate::catalog::Catalog;
use crate::error::{Result, SpeedtestError};
use crate::traits::Transport;
use crate::types::{ClientInfo, Coordinate, Sample, Server};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MockTransport {
    pub client: ClientInfo,
    pub servers: Vec<Server>,
    /// Per-URL queue of ping outcomes (ms, `None` = failure), consumed in order
    pings: Mutex<HashMap<String, VecDeque<Option<u64>>>>,
    /// Per-URL latency used once the queue is empty
    latencies: HashMap<String, u64>,
    downloads: HashMap<String, Sample>,
    uploads: HashMap<usize, Sample>,
    pub ping_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_servers(mut self, servers: Vec<Server>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_client(mut self, coordinate: Coordinate) -> Self {
        self.client.coordinate = coordinate;
        self
    }

    pub fn with_pings(self, url: &str, script: Vec<Option<u64>>) -> Self {
        self.pings
            .lock()
            .unwrap()
            .insert(url.to_string(), script.into_iter().collect());
        self
    }

    pub fn with_latency(mut self, url: &str, ms: u64) -> Self {
        self.latencies.insert(url.to_string(), ms);
        self
    }

    pub fn with_download(mut self, url: &str, sample: Sample) -> Self {
        self.downloads.insert(url.to_string(), sample);
        self
    }

    pub fn with_upload(mut self, bytes: usize, sample: Sample) -> Self {
        self.uploads.insert(bytes, sample);
        self
    }
}

/// A test server at (lat, lon) with a predictable URL.
pub fn server(id: &str, lat: f64, lon: f64) -> Server {
    Server::new(
        id,
        &format!("Server {}", id),
        &format!("http://{}.example.net/speedtest/upload.php", id),
        Coordinate::new(lat, lon),
    )
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch_client(&self) -> Result<ClientInfo> {
        Ok(self.client.clone())
    }

    async fn fetch_servers(&self) -> Result<Catalog> {
        Ok(Catalog::new(self.servers.clone()))
    }

    async fn ping(&self, url: &str) -> Result<Duration> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .pings
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front());

        let ms = match scripted {
            Some(outcome) => outcome,
            None => self.latencies.get(url).copied(),
        };
        ms.map(Duration::from_millis)
            .ok_or(SpeedtestError::Status(503))
    }

    async fn download(&self, url: &str) -> Result<Sample> {
        self.downloads
            .get(url)
            .copied()
            .ok_or(SpeedtestError::Status(404))
    }

    async fn upload(&self, _url: &str, bytes: usize) -> Result<Sample> {
        self.uploads
            .get(&bytes)
            .copied()
            .ok_or(SpeedtestError::Status(500))
    }
}
