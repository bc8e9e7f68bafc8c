use super::probe::probe;
use super::progress_bar;
use crate::catalog::{filter_closest, find_server};
use crate::config::Settings;
use crate::error::{Result, SpeedtestError};
use crate::traits::Transport;
use crate::types::{Coordinate, Selection, Server};
use tracing::{debug, info, warn};

/// How the test server is chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Server id, or a case-insensitive fragment of its sponsor/location
    Explicit(String),
    /// Closest `num_closest` by distance, then the lowest latency among them
    Automatic,
}

/// Pick the test server and measure its latency.
///
/// The returned `Selection` always carries a measured latency.
pub async fn select_server(
    transport: &dyn Transport,
    servers: &[Server],
    tester: Coordinate,
    mode: &Mode,
    settings: &Settings,
    quiet: bool,
) -> Result<Selection> {
    match mode {
        Mode::Explicit(query) => select_explicit(transport, servers, query, settings, quiet).await,
        Mode::Automatic => select_automatic(transport, servers, tester, settings, quiet).await,
    }
}

async fn select_explicit(
    transport: &dyn Transport,
    servers: &[Server],
    query: &str,
    settings: &Settings,
    quiet: bool,
) -> Result<Selection> {
    let server = find_server(servers, query)?;
    info!("Server '{}' matched {}", query, server);

    let pb = progress_bar(settings.num_latency_tests, "Measuring latency...", quiet);
    let latency_ms = probe(transport, &server, settings.num_latency_tests, settings, &pb).await;
    pb.finish_and_clear();

    Ok(Selection {
        server,
        latency_ms: latency_ms?,
    })
}

/// 逻辑:
/// 1. 按距离取最近的 num_closest 个服务器
/// 2. 并发测试每个候选的延迟 (join_all)
/// 3. 选延迟最低的; 相同延迟时按距离顺序取第一个
async fn select_automatic(
    transport: &dyn Transport,
    servers: &[Server],
    tester: Coordinate,
    settings: &Settings,
    quiet: bool,
) -> Result<Selection> {
    if settings.num_latency_tests == 0 {
        return Err(SpeedtestError::InvalidParameter(
            "latency probe count must be at least 1".to_string(),
        ));
    }

    let candidates = filter_closest(servers, tester, settings.num_closest);
    if candidates.is_empty() {
        return Err(SpeedtestError::NoServersAvailable);
    }
    debug!(
        "Closest candidates: {:?}",
        candidates.iter().map(|s| s.id.as_str()).collect::<Vec<_>>()
    );

    let pb = progress_bar(
        probe_total(candidates.len(), settings.num_latency_tests),
        "Finding fastest server...",
        quiet,
    );

    let tasks = candidates
        .iter()
        .map(|server| probe(transport, server, settings.num_latency_tests, settings, &pb));
    let results = futures::future::join_all(tasks).await;

    pb.finish_and_clear();

    let mut best: Option<(usize, f64)> = None;
    let mut first_error = None;

    for (idx, res) in results.into_iter().enumerate() {
        match res {
            Ok(latency) => {
                debug!("Candidate {}: {:.2} ms", candidates[idx].id, latency);
                // strictly lower only: ties keep the closer server
                if best.map_or(true, |(_, b)| latency < b) {
                    best = Some((idx, latency));
                }
            }
            Err(e @ SpeedtestError::NoReachableServer { .. }) => {
                warn!("{}", e);
                first_error.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }

    match best {
        Some((idx, latency_ms)) => {
            let server = candidates[idx].clone();
            info!("Fastest server: {} ({:.2} ms)", server, latency_ms);
            Ok(Selection { server, latency_ms })
        }
        None => Err(first_error.unwrap_or(SpeedtestError::NoServersAvailable)),
    }
}

/// Progress length for probing every candidate
fn probe_total(candidates: usize, count: usize) -> usize {
    candidates.saturating_mul(count)
}
