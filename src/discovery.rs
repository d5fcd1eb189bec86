use crate::types::DiscoveredCandidate;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

/// Search target advertised by webOS televisions
pub const SEARCH_TARGET: &str = "urn:lge-com:service:webos-second-screen:1";

const SSDP_ADDR: &str = "239.255.255.250:1900";

/// Finds televisions on the local network with SSDP
///
/// Each call to [`Discovery::discover`] broadcasts a fresh search and
/// yields replies until the timeout elapses. Silence is not an error: the
/// stream simply ends empty.
///
/// # Example
///
/// ```no_run
/// use futures_util::StreamExt;
/// use std::time::Duration;
/// use webos_control::Discovery;
///
/// #[tokio::main]
/// async fn main() {
///     let discovery = Discovery::new(Duration::from_secs(3));
///     let mut candidates = discovery.discover();
///     while let Some(tv) = candidates.next().await {
///         println!("Found TV at {}", tv.ip);
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Discovery {
    timeout: Duration,
}

/// Receive state between two yielded candidates
struct Listening {
    socket: UdpSocket,
    deadline: Instant,
    seen: HashSet<String>,
}

impl Discovery {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Broadcast a search and stream each answering address once
    pub fn discover(&self) -> BoxStream<'static, DiscoveredCandidate> {
        stream::once(start_search(self.timeout))
            .flat_map(|started| match started {
                Ok((socket, deadline)) => listen(socket, deadline),
                Err(e) => {
                    tracing::warn!("Discovery search failed: {}", e);
                    stream::empty().boxed()
                }
            })
            .boxed()
    }

    /// Like [`Discovery::discover`], skipping addresses already managed
    pub fn discover_new(&self, known_ips: HashSet<String>) -> BoxStream<'static, DiscoveredCandidate> {
        skip_known(self.discover(), known_ips)
    }
}

/// Yield search replies arriving on `socket` until `deadline`, one per
/// address
fn listen(socket: UdpSocket, deadline: Instant) -> BoxStream<'static, DiscoveredCandidate> {
    let state = Listening {
        socket,
        deadline,
        seen: HashSet::new(),
    };

    stream::unfold(state, |mut state| async move {
        let mut buffer = [0u8; 2048];
        loop {
            let received = timeout_at(state.deadline, state.socket.recv_from(&mut buffer)).await;
            let (size, source) = match received {
                Ok(Ok(received)) => received,
                Ok(Err(e)) => {
                    tracing::warn!("Discovery socket error: {}", e);
                    return None;
                }
                Err(_) => {
                    tracing::debug!("Discovery finished, {} device(s) answered", state.seen.len());
                    return None;
                }
            };

            let Ok(text) = std::str::from_utf8(&buffer[..size]) else {
                continue;
            };
            let Some(candidate) = parse_ssdp_response(text, source) else {
                continue;
            };
            if !state.seen.insert(candidate.ip.clone()) {
                continue;
            }

            tracing::info!("Found TV at {}", candidate.ip);
            return Some((candidate, state));
        }
    })
    .boxed()
}

fn skip_known(
    candidates: BoxStream<'static, DiscoveredCandidate>,
    known_ips: HashSet<String>,
) -> BoxStream<'static, DiscoveredCandidate> {
    candidates
        .filter(move |candidate| {
            let fresh = !known_ips.contains(&candidate.ip);
            async move { fresh }
        })
        .boxed()
}

/// Drop candidates whose address already belongs to a managed device
pub fn exclude_known<I>(candidates: I, known_ips: &HashSet<String>) -> Vec<DiscoveredCandidate>
where
    I: IntoIterator<Item = DiscoveredCandidate>,
{
    candidates
        .into_iter()
        .filter(|candidate| !known_ips.contains(&candidate.ip))
        .collect()
}

async fn start_search(scan_timeout: Duration) -> std::io::Result<(UdpSocket, Instant)> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_multicast_loop_v4(true)?;

    let request = format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: 2\r\n\
         ST: {}\r\n\
         \r\n",
        SSDP_ADDR, SEARCH_TARGET
    );
    socket.send_to(request.as_bytes(), SSDP_ADDR).await?;
    tracing::debug!("Sent M-SEARCH for {}", SEARCH_TARGET);

    Ok((socket, Instant::now() + scan_timeout))
}

/// Parse a search reply. Replies for other search targets are ignored.
fn parse_ssdp_response(text: &str, source: SocketAddr) -> Option<DiscoveredCandidate> {
    let mut lines = text.lines();
    let status = lines.next()?.trim();
    if !status.starts_with("HTTP/") || !status.contains(" 200") {
        return None;
    }

    let headers: BTreeMap<String, String> = lines
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_ascii_uppercase(), value.trim().to_string()))
        })
        .collect();

    if headers.get("ST").map(String::as_str) != Some(SEARCH_TARGET) {
        return None;
    }

    let ip = headers
        .get("LOCATION")
        .and_then(|location| host_of(location))
        .unwrap_or_else(|| source.ip().to_string());

    Some(DiscoveredCandidate {
        ip,
        raw_handshake_info: headers,
    })
}

/// Host part of an `http://host:port/path` URL
fn host_of(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = rest.split('/').next()?;
    let host = match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    };

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
