use crate::catalog::Catalog;
use crate::error::Result;
use crate::types::{ClientInfo, Sample};
use async_trait::async_trait;
use std::time::Duration;

/// Transport: the raw request/response layer every measurement goes through.
///
/// Each call is one independent request. Implementations report failure
/// (connection error, non-2xx status) as `Err`; the engine decides what a
/// failed sample means.
#[async_trait]
pub trait Transport: Sync + Send {
    /// 获取测试者信息 (IP, ISP, 坐标)
    async fn fetch_client(&self) -> Result<ClientInfo>;

    /// 获取全部测速服务器
    async fn fetch_servers(&self) -> Result<Catalog>;

    /// One round trip to `url`; returns the time to a successful response.
    async fn ping(&self, url: &str) -> Result<Duration>;

    /// GET `url` and drain the body.
    async fn download(&self, url: &str) -> Result<Sample>;

    /// POST a `bytes`-sized payload to `url`.
    async fn upload(&self, url: &str, bytes: usize) -> Result<Sample>;
}
