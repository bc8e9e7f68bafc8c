use crate::error::Result;
use crate::types::{Algorithm, ClientInfo, PingSummary, RunSummary, Selection, Server};

/// `id<sep>sponsor (name, country)<sep>`, the prefix of every report line
fn server_fields(server: &Server, sep: &str) -> String {
    format!(
        "{}{}{} ({}, {}){}",
        server.id, sep, server.sponsor, server.name, server.country, sep
    )
}

pub fn client_line(client: &ClientInfo) -> String {
    format!(
        "Testing from {} ({}) at {:.4}, {:.4}",
        client.isp, client.ip, client.coordinate.lat, client.coordinate.lon
    )
}

pub fn server_line(selection: &Selection) -> String {
    format!(
        "Selected server: {} - {:.2} ms",
        selection.server, selection.latency_ms
    )
}

pub fn ping_line(latency_ms: f64, algorithm: Algorithm) -> String {
    format!(
        "Ping ({}): {:.2} ms",
        algorithm.latency_label(),
        latency_ms
    )
}

pub fn ping_report_line(selection: &Selection, algorithm: Algorithm, sep: &str) -> String {
    format!(
        "{}{:.2} ({})",
        server_fields(&selection.server, sep),
        selection.latency_ms,
        algorithm.latency_label()
    )
}

pub fn summary_line(summary: &RunSummary) -> String {
    let algorithm = summary.algorithm;
    format!(
        "Ping ({}): {:.2} ms | Download ({}): {:.2} Mbps | Upload ({}): {:.2} Mbps",
        algorithm.latency_label(),
        summary.latency_ms,
        algorithm.throughput_label(),
        summary.download_mbps,
        algorithm.throughput_label(),
        summary.upload_mbps
    )
}

/// Machine-readable line: latency, then download and upload in whole kbps.
pub fn report_line(summary: &RunSummary, sep: &str) -> String {
    // 截断而不是四舍五入
    let dkbps = (summary.download_mbps * 1000.0) as u64;
    let ukbps = (summary.upload_mbps * 1000.0) as u64;
    format!(
        "{}{:.2}{}{}{}{}",
        server_fields(&summary.server, sep),
        summary.latency_ms,
        sep,
        dkbps,
        sep,
        ukbps
    )
}

pub fn json(summary: &RunSummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

pub fn ping_json(selection: &Selection, algorithm: Algorithm) -> Result<String> {
    let summary = PingSummary {
        server: selection.server.clone(),
        latency_ms: selection.latency_ms,
        algorithm,
    };
    Ok(serde_json::to_string_pretty(&summary)?)
}

/// One row of the `--list` table
pub fn list_row(server: &Server, distance_km: f64) -> String {
    let mut sponsor = server.sponsor.clone();
    // Truncate sponsor if too long
    if sponsor.chars().count() > 28 {
        sponsor = format!("{}...", sponsor.chars().take(25).collect::<String>());
    }
    format!(
        "{:<6} {:<28} {:<24} {:<4} {:>9.1} km",
        server.id, sponsor, server.name, server.cc, distance_km
    )
}
