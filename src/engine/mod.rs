//! Measurement engine: latency probing, server selection and throughput.
//!
//! Every probe or transfer window is an independent request. Within one
//! call they run concurrently (bounded by `Settings::concurrency`), each
//! under its own timeout. A failed or timed-out attempt is dropped from the
//! sample set; only an empty sample set surfaces as an error.

pub mod probe;
pub mod select;
pub mod throughput;

#[cfg(test)]
pub mod mock;

use crate::error::{Result, SpeedtestError};
use crate::types::Algorithm;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Which end of the scale is the favorable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Better {
    Lower,
    Higher,
}

/// Reduce samples to one figure. `None` when there are no samples.
pub fn reduce(algorithm: Algorithm, samples: &[f64], better: Better) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let values = samples.iter().copied();
    let value = match (algorithm, better) {
        (Algorithm::Max, Better::Lower) => values.fold(f64::INFINITY, f64::min),
        (Algorithm::Max, Better::Higher) => values.fold(f64::NEG_INFINITY, f64::max),
        (Algorithm::Avg, _) => values.sum::<f64>() / samples.len() as f64,
    };
    Some(value)
}

/// Run `attempts` with at most `concurrency` in flight, each bounded by
/// `timeout`, and keep the successes in attempt order.
pub async fn collect_samples<T, Fut, I>(
    attempts: I,
    concurrency: usize,
    timeout: Duration,
    pb: &ProgressBar,
) -> Vec<T>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T>>,
{
    let results: Vec<Result<T>> = stream::iter(attempts)
        .map(|attempt| {
            let pb = pb.clone();
            async move {
                let res = match tokio::time::timeout(timeout, attempt).await {
                    Ok(res) => res,
                    Err(_) => Err(SpeedtestError::Timeout(timeout)),
                };
                pb.inc(1);
                res
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    results
        .into_iter()
        .enumerate()
        .filter_map(|(i, res)| match res {
            Ok(sample) => Some(sample),
            Err(e) => {
                debug!("Attempt {} excluded: {}", i + 1, e);
                None
            }
        })
        .collect()
}

/// 进度条, 与 benchmark 一致的样式
pub fn progress_bar(len: usize, message: &str, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("[{bar:40.cyan/blue}] {percent}% {msg}") {
        pb.set_style(style.progress_chars("|| "));
    }
    pb.set_message(message.to_string());
    pb
}
