use crate::error::{Result, SpeedtestError};
use crate::geo;
use crate::types::{ClientInfo, Coordinate, Server};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// All servers known for this run, in descriptor order.
///
/// Ids are unique: construction keeps the first entry for any repeated id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    servers: Vec<Server>,
}

impl Catalog {
    pub fn new(servers: Vec<Server>) -> Self {
        let mut seen = HashSet::new();
        let servers = servers
            .into_iter()
            .filter(|s| {
                let fresh = seen.insert(s.id.clone());
                if !fresh {
                    debug!("Dropping duplicate server id {}", s.id);
                }
                fresh
            })
            .collect();
        Self { servers }
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Servers sorted by distance from the tester, paired with that distance.
    pub fn by_distance(&self, tester: Coordinate) -> Vec<(f64, &Server)> {
        rank(&self.servers, tester)
    }
}

fn rank(servers: &[Server], tester: Coordinate) -> Vec<(f64, &Server)> {
    let mut ranked: Vec<_> = servers
        .iter()
        .map(|s| (geo::distance(s.coordinate, tester), s))
        .collect();
    // sort_by 是稳定排序, 距离相同的保持原有顺序
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked
}

/// The `k` servers closest to `tester`, nearest first.
///
/// Equal distances keep their catalog order. `k == 0` yields an empty list.
pub fn filter_closest(all: &[Server], tester: Coordinate, k: usize) -> Vec<Server> {
    rank(all, tester)
        .into_iter()
        .take(k)
        .map(|(_, s)| s.clone())
        .collect()
}

/// Look a server up by id, falling back to a case-insensitive substring
/// match on sponsor or location name. The first catalog match wins.
pub fn find_server(all: &[Server], query: &str) -> Result<Server> {
    let query = query.trim();
    if query.is_empty() {
        return Err(SpeedtestError::ServerNotFound(query.to_string()));
    }

    if let Some(s) = all.iter().find(|s| s.id == query) {
        return Ok(s.clone());
    }

    let needle = query.to_lowercase();
    all.iter()
        .find(|s| {
            s.sponsor.to_lowercase().contains(&needle) || s.name.to_lowercase().contains(&needle)
        })
        .cloned()
        .ok_or_else(|| SpeedtestError::ServerNotFound(query.to_string()))
}

// --- Descriptor parsing ---

/// Attributes of every `<tag .../>` element in `xml`, in document order.
fn elements(xml: &str, tag: &str) -> Result<Vec<HashMap<String, String>>> {
    let element_re = Regex::new(&format!(r"<{}\s+([^>]*?)/?>", regex::escape(tag)))?;
    let attr_re = Regex::new(r#"([\w:-]+)\s*=\s*"([^"]*)""#)?;

    Ok(element_re
        .captures_iter(xml)
        .map(|caps| {
            attr_re
                .captures_iter(&caps[1])
                .map(|a| (a[1].to_string(), unescape(&a[2])))
                .collect()
        })
        .collect())
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn coordinate(attrs: &HashMap<String, String>) -> Result<Coordinate> {
    let field = |key: &str| -> Result<f64> {
        attrs
            .get(key)
            .ok_or_else(|| SpeedtestError::Parse(format!("missing '{}' attribute", key)))?
            .trim()
            .parse::<f64>()
            .map_err(|e| SpeedtestError::Parse(format!("bad '{}' attribute: {}", key, e)))
    };
    Ok(Coordinate::new(field("lat")?, field("lon")?))
}

fn attr(attrs: &HashMap<String, String>, key: &str) -> String {
    attrs.get(key).cloned().unwrap_or_default()
}

/// Parse the `<client .../>` element of speedtest-config.php.
pub fn parse_client(xml: &str) -> Result<ClientInfo> {
    let attrs = elements(xml, "client")?
        .into_iter()
        .next()
        .ok_or_else(|| SpeedtestError::Parse("no <client> element in config".to_string()))?;

    Ok(ClientInfo {
        ip: attr(&attrs, "ip"),
        isp: attr(&attrs, "isp"),
        coordinate: coordinate(&attrs)?,
    })
}

/// Parse every `<server .../>` element of the server list.
///
/// Entries without an id, a url or usable coordinates are skipped.
pub fn parse_servers(xml: &str) -> Result<Catalog> {
    let mut servers = Vec::new();

    for attrs in elements(xml, "server")? {
        let id = attr(&attrs, "id");
        let url = attr(&attrs, "url");
        if id.is_empty() || url.is_empty() {
            debug!("Skipping server entry without id or url: {:?}", attrs);
            continue;
        }
        let coordinate = match coordinate(&attrs) {
            Ok(c) => c,
            Err(e) => {
                debug!("Skipping server {}: {}", id, e);
                continue;
            }
        };

        servers.push(Server {
            id,
            sponsor: attr(&attrs, "sponsor"),
            name: attr(&attrs, "name"),
            country: attr(&attrs, "country"),
            cc: attr(&attrs, "cc"),
            host: attr(&attrs, "host"),
            url,
            coordinate,
        });
    }

    Ok(Catalog::new(servers))
}
