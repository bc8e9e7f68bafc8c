use super::{collect_samples, progress_bar, reduce, Better};
use crate::config::Settings;
use crate::error::{Result, SpeedtestError};
use crate::traits::Transport;
use crate::types::{Sample, Server};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => write!(f, "download"),
            Direction::Upload => write!(f, "upload"),
        }
    }
}

/// Download throughput in Mbps: one window per configured image size.
pub async fn download_test(
    transport: &dyn Transport,
    server: &Server,
    settings: &Settings,
    quiet: bool,
) -> Result<f64> {
    let urls: Vec<String> = settings
        .download_sizes
        .iter()
        .map(|&size| server.download_url(size))
        .collect();

    let pb = progress_bar(urls.len(), "Testing download speed...", quiet);
    let attempts = urls.iter().map(|url| transport.download(url));
    let samples = collect_samples(attempts, settings.concurrency, settings.window_timeout, &pb).await;
    pb.finish_and_clear();

    finish(Direction::Download, server, urls.len(), &samples, settings)
}

/// Upload throughput in Mbps: one window per configured payload size.
pub async fn upload_test(
    transport: &dyn Transport,
    server: &Server,
    settings: &Settings,
    quiet: bool,
) -> Result<f64> {
    let pb = progress_bar(settings.upload_sizes.len(), "Testing upload speed...", quiet);
    let attempts = settings
        .upload_sizes
        .iter()
        .map(|&bytes| transport.upload(&server.url, bytes));
    let samples = collect_samples(attempts, settings.concurrency, settings.window_timeout, &pb).await;
    pb.finish_and_clear();

    finish(
        Direction::Upload,
        server,
        settings.upload_sizes.len(),
        &samples,
        settings,
    )
}

fn finish(
    direction: Direction,
    server: &Server,
    windows: usize,
    samples: &[Sample],
    settings: &Settings,
) -> Result<f64> {
    if windows == 0 {
        return Err(SpeedtestError::InvalidParameter(format!(
            "no {} window sizes configured",
            direction
        )));
    }

    // 0 字节或 0 耗时的窗口无法换算, 同样剔除
    let mbps: Vec<f64> = samples.iter().filter_map(Sample::mbps).collect();
    debug!(
        "{}: {}/{} windows usable {:?}",
        direction,
        mbps.len(),
        windows,
        mbps
    );

    let result = reduce(settings.algorithm, &mbps, Better::Higher).ok_or_else(|| {
        SpeedtestError::TransferFailed {
            direction: direction.to_string(),
            server: server.id.clone(),
        }
    })?;
    info!("{} ({}): {:.2} Mbps", direction, settings.algorithm, result);
    Ok(result)
}
