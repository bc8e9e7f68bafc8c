mod catalog;
mod config;
mod engine;
mod error;
mod geo;
mod report;
mod traits;
mod transport;
mod types;

use anyhow::{bail, Result};
use catalog::Catalog;
use clap::Parser;
use config::{Settings, SettingsLayer};
use engine::select::{select_server, Mode};
use engine::throughput::{download_test, upload_test, Direction};
use error::SpeedtestError;
use std::io::Write;
use traits::Transport;
use transport::HttpTransport;
use types::{Algorithm, ClientInfo, RunSummary};

#[derive(Parser)]
#[command(name = "speedtest")]
#[command(version)]
#[command(about = "Command line client for speedtest.net servers", long_about = None)]
struct Cli {
    /// Measurement method to use ('max', 'avg')
    #[arg(long, short = 'a')]
    algo: Option<String>,

    /// Turn on debugging
    #[arg(long, short = 'd')]
    debug: bool,

    /// List available servers, closest first
    #[arg(long, short = 'l')]
    list: bool,

    /// Ping only mode
    #[arg(long, short = 'p')]
    ping: bool,

    /// Quiet mode (no progress output)
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Reporting mode: one line, fields separated by '|' (see --rc).
    /// Server ID, Server Name (Location), Ping ms, Download kbps, Upload kbps
    #[arg(long, short = 'r', conflicts_with = "json")]
    report: bool,

    /// Print the result as JSON
    #[arg(long, short = 'j')]
    json: bool,

    /// Only perform the download test
    #[arg(long = "downloadonly", visible_alias = "do", conflicts_with = "upload_only")]
    download_only: bool,

    /// Only perform the upload test
    #[arg(long = "uploadonly", visible_alias = "uo")]
    upload_only: bool,

    /// Report separator, e.g. --rc=','
    #[arg(long = "reportchar", visible_alias = "rc")]
    report_char: Option<String>,

    /// Use a specific server (id or part of its name)
    #[arg(long, short = 's')]
    server: Option<String>,

    /// Number of 'closest' servers to find
    #[arg(long = "numclosest", visible_alias = "nc")]
    num_closest: Option<usize>,

    /// Number of latency tests to perform
    #[arg(long = "numlatency", visible_alias = "nl")]
    num_latency: Option<usize>,

    /// Parallel requests within one latency probe or transfer direction
    #[arg(long, short = 'c')]
    concurrency: Option<usize>,
}

impl Cli {
    fn settings_layer(&self) -> Result<SettingsLayer> {
        let algorithm = match &self.algo {
            Some(a) => Some(a.parse::<Algorithm>()?),
            None => None,
        };
        Ok(SettingsLayer {
            algorithm,
            num_closest: self.num_closest,
            num_latency_tests: self.num_latency,
            report_char: self.report_char.clone(),
            concurrency: self.concurrency,
            ..Default::default()
        })
    }

    /// Anything but the human-readable mode keeps stdout clean
    fn machine_output(&self) -> bool {
        self.report || self.json
    }
}

fn init_logging(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let settings = Settings::load(cli.settings_layer()?)?;
    tracing::debug!("Settings: {:?}", settings);
    let transport = HttpTransport::new(&settings)?;
    let mut out = std::io::stdout();

    tokio::select! {
        res = run(&cli, &settings, &transport, &mut out) => res,
        _ = tokio::signal::ctrl_c() => bail!("Interrupted"),
    }
}

// --- Handlers ---

async fn run<W: Write>(
    cli: &Cli,
    settings: &Settings,
    transport: &dyn Transport,
    out: &mut W,
) -> Result<()> {
    let (client, catalog) = tokio::try_join!(transport.fetch_client(), transport.fetch_servers())?;
    tracing::debug!("Client: {:?}, {} servers", client, catalog.len());
    if catalog.is_empty() {
        tracing::warn!("Server list is empty");
    }

    if cli.list {
        return handle_list(&client, &catalog, out);
    }

    let hide_progress = cli.quiet || cli.machine_output();
    let mode = match &cli.server {
        Some(query) => Mode::Explicit(query.clone()),
        None => Mode::Automatic,
    };

    if !cli.machine_output() {
        writeln!(out, "{}", report::client_line(&client))?;
    }

    let selection = select_server(
        transport,
        catalog.servers(),
        client.coordinate,
        &mode,
        settings,
        hide_progress,
    )
    .await?;

    if cli.ping {
        if cli.json {
            writeln!(out, "{}", report::ping_json(&selection, settings.algorithm)?)?;
        } else if cli.report {
            writeln!(
                out,
                "{}",
                report::ping_report_line(&selection, settings.algorithm, &settings.report_char)
            )?;
        } else {
            writeln!(out, "{}", report::server_line(&selection))?;
            writeln!(out, "{}", report::ping_line(selection.latency_ms, settings.algorithm))?;
        }
        return Ok(());
    }

    if !cli.machine_output() {
        writeln!(out, "{}", report::server_line(&selection))?;
    }

    // 两个方向互相独立: 一个失败不影响另一个的结果
    let download = if cli.upload_only {
        None
    } else {
        Some(download_test(transport, &selection.server, settings, hide_progress).await)
    };
    let upload = if cli.download_only {
        None
    } else {
        Some(upload_test(transport, &selection.server, settings, hide_progress).await)
    };

    let requested = usize::from(download.is_some()) + usize::from(upload.is_some());
    let mut failures = Vec::new();
    let download_mbps = settle(Direction::Download, download, &mut failures);
    let upload_mbps = settle(Direction::Upload, upload, &mut failures);

    // nothing was measured: no figures to show
    if requested > 0 && failures.len() == requested {
        return Err(failures.remove(0).1.into());
    }

    let summary = RunSummary {
        server: selection.server,
        latency_ms: selection.latency_ms,
        download_mbps,
        upload_mbps,
        algorithm: settings.algorithm,
        errors: failures.iter().map(|(_, e)| e.to_string()).collect(),
    };

    if cli.json {
        writeln!(out, "{}", report::json(&summary)?)?;
    } else if cli.report {
        writeln!(out, "{}", report::report_line(&summary, &settings.report_char))?;
    } else if failures.is_empty() {
        writeln!(out, "{}", report::summary_line(&summary))?;
    } else {
        // 只显示成功的方向
        for (direction, mbps) in [
            (Direction::Download, download_mbps),
            (Direction::Upload, upload_mbps),
        ] {
            if failures.iter().all(|(failed, _)| *failed != direction) {
                write_direction(out, direction, mbps, settings.algorithm)?;
            }
        }
    }

    match failures.into_iter().next() {
        Some((_, e)) => Err(e.into()),
        None => Ok(()),
    }
}

/// Figure for one direction; a failure is recorded and counts as 0.
/// A skipped direction is 0 as well.
fn settle(
    direction: Direction,
    result: Option<error::Result<f64>>,
    failures: &mut Vec<(Direction, SpeedtestError)>,
) -> f64 {
    match result {
        Some(Ok(mbps)) => mbps,
        Some(Err(e)) => {
            failures.push((direction, e));
            0.0
        }
        None => 0.0,
    }
}

fn write_direction<W: Write>(
    out: &mut W,
    direction: Direction,
    mbps: f64,
    algorithm: Algorithm,
) -> Result<()> {
    let label = match direction {
        Direction::Download => "Download",
        Direction::Upload => "Upload",
    };
    writeln!(out, "{} ({}): {:.2} Mbps", label, algorithm.throughput_label(), mbps)?;
    Ok(())
}

fn handle_list<W: Write>(client: &ClientInfo, catalog: &Catalog, out: &mut W) -> Result<()> {
    writeln!(out, "{}", "-".repeat(80))?;
    writeln!(
        out,
        "{:<6} {:<28} {:<24} {:<4} {:>12}",
        "ID", "Sponsor", "Location", "CC", "Distance"
    )?;
    writeln!(out, "{}", "-".repeat(80))?;

    for (distance, server) in catalog.by_distance(client.coordinate) {
        writeln!(out, "{}", report::list_row(server, distance))?;
    }
    writeln!(out, "{}", "-".repeat(80))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{server, MockTransport};
    use crate::types::Sample;
    use std::time::Duration;

    // server "1": 10 ms away, 1 Mbps down, 2 Mbps up
    fn transport(with_upload: bool) -> MockTransport {
        let s = server("1", 0.0, 0.0);
        let transport = MockTransport::new()
            .with_servers(vec![s.clone()])
            .with_latency(&s.latency_url(), 10)
            .with_download(&s.download_url(350), Sample::new(125_000, Duration::from_secs(1)));
        if with_upload {
            transport.with_upload(1000, Sample::new(250_000, Duration::from_secs(1)))
        } else {
            transport
        }
    }

    async fn run_with(args: &[&str], transport: &MockTransport) -> (String, Result<()>) {
        let cli = Cli::parse_from(args);
        let settings = Settings {
            download_sizes: vec![350],
            upload_sizes: vec![1000],
            ..Settings::default()
        }
        .merge(cli.settings_layer().unwrap());

        let mut out = Vec::new();
        let res = run(&cli, &settings, transport, &mut out).await;
        (String::from_utf8(out).unwrap(), res)
    }

    fn transfer_failed(res: &Result<()>, expected: &str) -> bool {
        match res {
            Err(e) => matches!(
                e.downcast_ref::<SpeedtestError>(),
                Some(SpeedtestError::TransferFailed { direction, .. }) if direction == expected
            ),
            Ok(()) => false,
        }
    }

    #[tokio::test]
    async fn test_full_run_report_line() {
        let (out, res) = run_with(&["speedtest", "-r"], &transport(true)).await;
        assert!(res.is_ok());
        assert_eq!(out, "1|Server 1 (Server 1, )|10.00|1000|2000\n");
    }

    #[tokio::test]
    async fn test_skipped_direction_reports_zero() {
        let (out, res) = run_with(&["speedtest", "-r", "--do"], &transport(false)).await;
        assert!(res.is_ok());
        assert_eq!(out, "1|Server 1 (Server 1, )|10.00|1000|0\n");

        let (out, res) = run_with(&["speedtest", "-r", "--uo"], &transport(true)).await;
        assert!(res.is_ok());
        assert_eq!(out, "1|Server 1 (Server 1, )|10.00|0|2000\n");
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_download_in_report_line() {
        let (out, res) = run_with(&["speedtest", "-r", "-q"], &transport(false)).await;
        assert_eq!(out, "1|Server 1 (Server 1, )|10.00|1000|0\n");
        assert!(transfer_failed(&res, "upload"));
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_download_in_json() {
        let (out, res) = run_with(&["speedtest", "-j"], &transport(false)).await;
        assert!(transfer_failed(&res, "upload"));

        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["download_mbps"], 1.0);
        assert_eq!(v["upload_mbps"], 0.0);
        assert_eq!(v["algorithm"], "max");
        assert!(v["errors"][0].as_str().unwrap().contains("upload"));
    }

    #[tokio::test]
    async fn test_failed_upload_human_output() {
        let (out, res) = run_with(&["speedtest", "-q"], &transport(false)).await;
        assert!(transfer_failed(&res, "upload"));
        assert!(out.contains("Selected server: Server 1"));
        assert!(out.contains("Download (Max): 1.00 Mbps"));
        assert!(!out.contains("Upload"));
    }

    #[tokio::test]
    async fn test_both_directions_failed() {
        let s = server("1", 0.0, 0.0);
        let transport = MockTransport::new()
            .with_servers(vec![s.clone()])
            .with_latency(&s.latency_url(), 10);

        let (out, res) = run_with(&["speedtest", "-r"], &transport).await;
        assert!(out.is_empty());
        assert!(transfer_failed(&res, "download"));
    }

    #[tokio::test]
    async fn test_ping_only() {
        let transport = transport(true);

        let (out, res) = run_with(&["speedtest", "-p", "-r"], &transport).await;
        assert!(res.is_ok());
        assert_eq!(out, "1|Server 1 (Server 1, )|10.00 (Lowest)\n");

        let (out, res) = run_with(&["speedtest", "-p", "-q", "-a", "avg"], &transport).await;
        assert!(res.is_ok());
        assert!(out.contains("Ping (Avg): 10.00 ms"));
        assert!(!out.contains("Mbps"));

        let (out, res) = run_with(&["speedtest", "-p", "-j", "-a", "avg"], &transport).await;
        assert!(res.is_ok());
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["algorithm"], "avg");
        assert_eq!(v["latency_ms"], 10.0);
    }

    #[tokio::test]
    async fn test_explicit_server_not_found() {
        let (_, res) = run_with(&["speedtest", "-r", "-s", "Tokyo"], &transport(true)).await;
        let err = res.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SpeedtestError>(),
            Some(SpeedtestError::ServerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_servers() {
        let (out, res) = run_with(&["speedtest", "-l"], &transport(true)).await;
        assert!(res.is_ok());
        assert!(out.contains("Sponsor"));
        assert!(out.lines().any(|l| l.starts_with("1 ")));
    }
}
