//! Bridge discovery via SSDP multicast and the vendor N-UPnP portal.

use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;
use strum_macros::Display;
use url::Url;

use crate::bridge::Discovery;
use crate::client::BridgeClient;
use crate::errors::Error;
use crate::runtime::{self, AsyncUdpSocket, Instant, UdpSocket};

type Result<T> = std::result::Result<T, Error>;

/// Multicast group and port SSDP searches are sent to.
pub const SSDP_ADDR: &str = "239.255.255.250:1900";
/// Vendor portal listing bridges registered from the caller's public IP.
pub const NUPNP_URL: &str = "https://discovery.meethue.com/";

const M_SEARCH: &str = "M-SEARCH * HTTP/1.1\r\n\
HOST: 239.255.255.250:1900\r\n\
MAN: \"ssdp:discover\"\r\n\
MX: 2\r\n\
ST: ssdp:all\r\n\r\n";

/// Where to look for bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DiscoveryStrategy {
    /// SSDP on the local network only; works offline.
    Local,
    /// SSDP plus the N-UPnP portal.
    Exhaustive,
}

/// A bridge found on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredBridge {
    /// IP address or hostname of the bridge
    pub host: String,
    /// Bridge id, when the discovery channel reports one
    pub id: Option<String>,
}

impl DiscoveredBridge {
    /// A bridge record for a host the operator already knows.
    pub fn from_host(host: &str) -> Self {
        DiscoveredBridge {
            host: host.to_string(),
            id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NupnpEntry {
    id: Option<String>,
    internalipaddress: String,
}

/// Discovery over the real network, producing [`BridgeClient`]s.
#[derive(Debug, Clone)]
pub struct HueDiscovery {
    http: reqwest::Client,
    nupnp_url: Url,
    ssdp_target: String,
    ssdp_window: Duration,
}

impl HueDiscovery {
    pub fn new(http: reqwest::Client, ssdp_window: Duration) -> Result<Self> {
        let nupnp_url = Url::parse(NUPNP_URL).map_err(|e| Error::Discovery(e.to_string()))?;
        Ok(HueDiscovery {
            http,
            nupnp_url,
            ssdp_target: SSDP_ADDR.to_string(),
            ssdp_window,
        })
    }

    /// Point N-UPnP lookups somewhere else (tests, mirrors).
    pub fn with_nupnp_url(mut self, url: Url) -> Self {
        self.nupnp_url = url;
        self
    }

    /// Send the M-SEARCH to `addr` instead of the SSDP multicast group.
    pub fn with_ssdp_target(mut self, addr: &str) -> Self {
        self.ssdp_target = addr.to_string();
        self
    }
}

impl Discovery for HueDiscovery {
    type Client = BridgeClient;

    async fn discover(&self, strategy: DiscoveryStrategy) -> Result<Vec<DiscoveredBridge>> {
        match strategy {
            DiscoveryStrategy::Local => discover_ssdp(&self.ssdp_target, self.ssdp_window).await,
            DiscoveryStrategy::Exhaustive => {
                let (ssdp, nupnp) = futures::join!(
                    discover_ssdp(&self.ssdp_target, self.ssdp_window),
                    discover_nupnp(&self.http, &self.nupnp_url)
                );
                combine(ssdp, nupnp)
            }
        }
    }

    fn connect(&self, bridge: &DiscoveredBridge, username: Option<&str>) -> BridgeClient {
        BridgeClient::new(self.http.clone(), &bridge.host, username)
    }
}

/// Search the local network for bridges with an SSDP M-SEARCH sent to
/// `target`, normally [`SSDP_ADDR`].
///
/// Collects responses for `window`; a bridge answering several times is
/// reported once.
pub async fn discover_ssdp(target: &str, window: Duration) -> Result<Vec<DiscoveredBridge>> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| Error::socket("bind", e))?;

    socket
        .set_multicast_ttl_v4(2)
        .map_err(|e| Error::socket("set_multicast_ttl", e))?;

    socket
        .send_to(M_SEARCH.as_bytes(), target)
        .await
        .map_err(|e| Error::socket("send_to", e))?;

    let mut discovered = Vec::new();
    let start = Instant::now();
    let mut buffer = [0u8; 4096];
    let recv_timeout = Duration::from_millis(500);

    while start.elapsed() < window {
        match runtime::timeout(recv_timeout, socket.recv_from(&mut buffer)).await {
            Ok(Ok((size, addr))) => {
                let text = String::from_utf8_lossy(&buffer[..size]);
                if let Some(bridge) = parse_ssdp_response(&text, addr) {
                    debug!("SSDP response from bridge at {}", bridge.host);
                    push_unique(&mut discovered, bridge);
                }
            }
            Ok(Err(_)) | Err(_) => continue,
        }
    }

    Ok(discovered)
}

/// Ask the N-UPnP portal which bridges share our public IP.
pub async fn discover_nupnp(http: &reqwest::Client, url: &Url) -> Result<Vec<DiscoveredBridge>> {
    debug!("GET {url}");
    let resp = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| Error::http("nupnp", e))?;

    if !resp.status().is_success() {
        return Err(Error::Status {
            path: url.path().to_string(),
            status: resp.status().as_u16(),
        });
    }

    let body = resp.bytes().await.map_err(|e| Error::http("nupnp", e))?;
    let entries: Vec<NupnpEntry> = serde_json::from_slice(&body).map_err(Error::JsonLoad)?;

    let mut discovered = Vec::new();
    for entry in entries {
        push_unique(
            &mut discovered,
            DiscoveredBridge {
                host: entry.internalipaddress,
                id: entry.id,
            },
        );
    }
    Ok(discovered)
}

/// Extract a bridge from one SSDP response, ignoring other UPnP devices.
pub fn parse_ssdp_response(text: &str, from: SocketAddr) -> Option<DiscoveredBridge> {
    let mut location = None;
    let mut server = None;
    let mut bridge_id = None;

    for line in text.lines().skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "location" => location = Some(value.to_string()),
            "server" => server = Some(value.to_string()),
            "hue-bridgeid" => bridge_id = Some(value.to_string()),
            _ => {}
        }
    }

    let is_bridge = bridge_id.is_some() || server.is_some_and(|s| s.contains("IpBridge"));
    if !is_bridge {
        return None;
    }

    let host = location
        .and_then(|l| Url::parse(&l).ok())
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| from.ip().to_string());

    Some(DiscoveredBridge {
        host,
        id: bridge_id,
    })
}

fn combine(
    ssdp: Result<Vec<DiscoveredBridge>>,
    nupnp: Result<Vec<DiscoveredBridge>>,
) -> Result<Vec<DiscoveredBridge>> {
    let (local, remote) = match (ssdp, nupnp) {
        (Ok(local), Ok(remote)) => (local, remote),
        (Ok(local), Err(e)) => {
            warn!("N-UPnP lookup failed, using SSDP results only: {e}");
            (local, Vec::new())
        }
        (Err(e), Ok(remote)) => {
            warn!("SSDP search failed, using N-UPnP results only: {e}");
            (Vec::new(), remote)
        }
        (Err(ssdp), Err(nupnp)) => {
            return Err(Error::Discovery(format!("ssdp: {ssdp}; nupnp: {nupnp}")));
        }
    };

    let mut merged = local;
    for bridge in remote {
        push_unique(&mut merged, bridge);
    }
    Ok(merged)
}

fn push_unique(list: &mut Vec<DiscoveredBridge>, bridge: DiscoveredBridge) {
    match list.iter_mut().find(|b| b.host == bridge.host) {
        Some(existing) => {
            if existing.id.is_none() {
                existing.id = bridge.id;
            }
        }
        None => list.push(bridge),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn from() -> SocketAddr {
        "192.168.1.2:1900".parse().unwrap()
    }

    const BRIDGE_REPLY: &str = "HTTP/1.1 200 OK\r\n\
        SERVER: Linux/3.14.0 UPnP/1.0 IpBridge/1.26.0\r\n\
        hue-bridgeid: 001788FFFE23BFC2\r\n\r\n";

    /// A loopback SSDP responder answering the first M-SEARCH with `reply`.
    async fn ssdp_responder(reply: &'static str) -> String {
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            if let Ok((size, peer)) = socket.recv_from(&mut buf).await {
                if buf[..size].starts_with(b"M-SEARCH") {
                    let _ = socket.send_to(reply.as_bytes(), peer).await;
                }
            }
        });
        addr
    }

    async fn portal(status: u16, body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    fn discovery(portal: &MockServer, ssdp_target: &str) -> HueDiscovery {
        HueDiscovery::new(reqwest::Client::new(), Duration::from_millis(300))
            .unwrap()
            .with_nupnp_url(Url::parse(&portal.uri()).unwrap())
            .with_ssdp_target(ssdp_target)
    }

    #[tokio::test]
    async fn test_exhaustive_merges_both_channels() {
        let target = ssdp_responder(BRIDGE_REPLY).await;
        let portal = portal(
            200,
            json!([{"id": "001788fffe23bfc3", "internalipaddress": "192.168.1.20"}]),
        )
        .await;

        let bridges = discovery(&portal, &target)
            .discover(DiscoveryStrategy::Exhaustive)
            .await
            .unwrap();

        assert_eq!(
            bridges,
            vec![
                DiscoveredBridge {
                    host: "127.0.0.1".into(),
                    id: Some("001788FFFE23BFC2".into()),
                },
                DiscoveredBridge {
                    host: "192.168.1.20".into(),
                    id: Some("001788fffe23bfc3".into()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_exhaustive_survives_portal_failure() {
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = silent.local_addr().unwrap().to_string();
        let portal = portal(500, json!({})).await;

        let bridges = discovery(&portal, &target)
            .discover(DiscoveryStrategy::Exhaustive)
            .await
            .unwrap();

        assert!(bridges.is_empty());
    }

    #[tokio::test]
    async fn test_local_never_asks_portal() {
        let target = ssdp_responder(BRIDGE_REPLY).await;
        let portal = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&portal)
            .await;

        let bridges = discovery(&portal, &target)
            .discover(DiscoveryStrategy::Local)
            .await
            .unwrap();

        assert_eq!(bridges.len(), 1);
        assert_eq!(bridges[0].host, "127.0.0.1");
    }

    #[test]
    fn test_parse_bridge_response() {
        let text = "HTTP/1.1 200 OK\r\n\
            CACHE-CONTROL: max-age=100\r\n\
            LOCATION: http://192.168.1.20:80/description.xml\r\n\
            SERVER: Linux/3.14.0 UPnP/1.0 IpBridge/1.26.0\r\n\
            hue-bridgeid: 001788FFFE23BFC2\r\n\
            ST: upnp:rootdevice\r\n\r\n";

        let bridge = parse_ssdp_response(text, from()).unwrap();
        assert_eq!(bridge.host, "192.168.1.20");
        assert_eq!(bridge.id.as_deref(), Some("001788FFFE23BFC2"));
    }

    #[test]
    fn test_parse_old_bridge_without_id() {
        let text = "HTTP/1.1 200 OK\r\n\
            SERVER: FreeRTOS/6.0.5, UPnP/1.0, IpBridge/0.1\r\n\r\n";

        let bridge = parse_ssdp_response(text, from()).unwrap();
        assert_eq!(bridge.host, "192.168.1.2");
        assert_eq!(bridge.id, None);
    }

    #[test]
    fn test_parse_ignores_other_devices() {
        let text = "HTTP/1.1 200 OK\r\n\
            LOCATION: http://192.168.1.30:49152/rootDesc.xml\r\n\
            SERVER: Linux UPnP/1.0 MiniUPnPd/2.1\r\n\r\n";

        assert!(parse_ssdp_response(text, from()).is_none());
    }

    #[test]
    fn test_combine_dedupes_by_host() {
        let local = vec![DiscoveredBridge::from_host("192.168.1.20")];
        let remote = vec![
            DiscoveredBridge {
                host: "192.168.1.20".into(),
                id: Some("abc".into()),
            },
            DiscoveredBridge::from_host("192.168.1.21"),
        ];

        let merged = combine(Ok(local), Ok(remote)).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_combine_tolerates_one_failure() {
        let merged = combine(
            Err(Error::NoLights),
            Ok(vec![DiscoveredBridge::from_host("10.0.0.5")]),
        )
        .unwrap();
        assert_eq!(merged, vec![DiscoveredBridge::from_host("10.0.0.5")]);

        let failed = combine(Err(Error::NoLights), Err(Error::NoBridges));
        assert!(matches!(failed, Err(Error::Discovery(_))));
    }

    #[tokio::test]
    async fn test_nupnp_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "001788fffe23bfc2", "internalipaddress": "192.168.1.20", "port": 443}
            ])))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let bridges = discover_nupnp(&reqwest::Client::new(), &url).await.unwrap();

        assert_eq!(
            bridges,
            vec![DiscoveredBridge {
                host: "192.168.1.20".into(),
                id: Some("001788fffe23bfc2".into()),
            }]
        );
    }

    #[tokio::test]
    async fn test_nupnp_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let result = discover_nupnp(&reqwest::Client::new(), &url).await;

        assert!(matches!(result, Err(Error::Status { status: 429, .. })));
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(DiscoveryStrategy::Local.to_string(), "local");
        assert_eq!(DiscoveryStrategy::Exhaustive.to_string(), "exhaustive");
    }
}
