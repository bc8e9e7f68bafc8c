use super::{collect_samples, reduce, Better};
use crate::config::Settings;
use crate::error::{Result, SpeedtestError};
use crate::traits::Transport;
use crate::types::Server;
use indicatif::ProgressBar;
use tracing::debug;

/// Probe `server` `count` times and reduce the round trips to one latency (ms).
///
/// Dropped probes are excluded. Only when every probe fails does this
/// return `NoReachableServer`.
pub async fn probe(
    transport: &dyn Transport,
    server: &Server,
    count: usize,
    settings: &Settings,
    pb: &ProgressBar,
) -> Result<f64> {
    if count == 0 {
        return Err(SpeedtestError::InvalidParameter(
            "latency probe count must be at least 1".to_string(),
        ));
    }

    let url = server.latency_url();
    let attempts = (0..count).map(|_| transport.ping(&url));

    let samples: Vec<f64> = collect_samples(attempts, settings.concurrency, settings.probe_timeout, pb)
        .await
        .into_iter()
        .map(|rtt| rtt.as_nanos() as f64 / 1_000_000.0)
        .collect();

    debug!(
        "Server {}: {}/{} probes succeeded {:?}",
        server.id,
        samples.len(),
        count,
        samples
    );

    reduce(settings.algorithm, &samples, Better::Lower).ok_or_else(|| {
        SpeedtestError::NoReachableServer {
            server: server.id.clone(),
            attempts: count,
        }
    })
}
