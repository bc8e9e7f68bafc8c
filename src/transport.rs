use crate::catalog::{self, Catalog};
use crate::config::{Settings, UPLOAD_FORM_PREFIX};
use crate::error::{Result, SpeedtestError};
use crate::traits::Transport;
use crate::types::{ClientInfo, Sample};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use tracing::debug;

const USER_AGENT: &str = concat!("speedtest-rs/", env!("CARGO_PKG_VERSION"));

// 建立连接的超时; 整个请求的超时由 engine 按窗口控制
const CONNECT_TIMEOUT: u64 = 5;

// Descriptor fetches are not measured, they just must not hang forever
const FETCH_TIMEOUT: u64 = 30;

/// reqwest-backed transport talking to the speedtest.net infrastructure.
pub struct HttpTransport {
    client: Client,
    config_url: String,
    servers_url: String,
}

impl HttpTransport {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT))
            .build()?;

        Ok(Self {
            client,
            config_url: settings.config_url.clone(),
            servers_url: settings.servers_url.clone(),
        })
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        debug!("Fetching {}", url);
        let resp = self
            .client
            .get(url)
            .timeout(Duration::from_secs(FETCH_TIMEOUT))
            .send()
            .await?;
        Ok(check_status(resp)?.text().await?)
    }
}

/// 返回 404/500 等也视为失败
fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(SpeedtestError::Status(status.as_u16()))
    }
}

/// Form body the upload endpoint expects: `content1=<letters>`, `bytes` long.
/// Sizes below the prefix length are rejected when settings load.
fn upload_payload(bytes: usize) -> String {
    let filler = bytes.saturating_sub(UPLOAD_FORM_PREFIX.len());

    let mut body = String::with_capacity(UPLOAD_FORM_PREFIX.len() + filler);
    body.push_str(UPLOAD_FORM_PREFIX);
    body.extend(std::iter::repeat_with(fastrand::alphanumeric).take(filler));
    body
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_client(&self) -> Result<ClientInfo> {
        let xml = self.fetch_text(&self.config_url).await?;
        catalog::parse_client(&xml)
    }

    async fn fetch_servers(&self) -> Result<Catalog> {
        let xml = self.fetch_text(&self.servers_url).await?;
        let catalog = catalog::parse_servers(&xml)?;
        debug!("Loaded {} servers", catalog.len());
        Ok(catalog)
    }

    async fn ping(&self, url: &str) -> Result<Duration> {
        let start = Instant::now();
        let resp = check_status(self.client.get(url).send().await?)?;
        // latency.txt 很小, 读完再计时
        resp.bytes().await?;
        Ok(start.elapsed())
    }

    async fn download(&self, url: &str) -> Result<Sample> {
        let start = Instant::now();
        let mut resp = check_status(self.client.get(url).send().await?)?;

        let mut bytes = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            bytes += chunk.len() as u64;
        }

        Ok(Sample::new(bytes, start.elapsed()))
    }

    async fn upload(&self, url: &str, bytes: usize) -> Result<Sample> {
        let body = upload_payload(bytes);
        let sent = body.len() as u64;

        let start = Instant::now();
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        check_status(resp)?.bytes().await?;

        Ok(Sample::new(sent, start.elapsed()))
    }
}
