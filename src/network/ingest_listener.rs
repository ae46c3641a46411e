//! # Ingestion Listener Module
//!
//! Accepts telemetry pushes on `/commit/` and feeds the capture log.
//!
//! ```text
//! ┌──────────────┐    ┌────────────────┐    ┌─────────────┐
//! │ Sender       │───▶│ IngestListener │───▶│ RecordStore │
//! │ GET /commit/ │    │                │    │ (append)    │
//! └──────────────┘    │ - ack "OK"     └────┴─────────────┘
//!                     │ - decode packet
//!                     │ - armed gate
//!                     └────────────────┘
//! ```
//!
//! The listener answers every request with the literal body `OK` before
//! it so much as looks at the payload; a sender never blocks on, or
//! learns about, validation. Requests are served one at a time on a
//! single worker task, which is what serializes store mutation on the
//! ingestion side. Packets that fail to decode are dropped and the
//! worker keeps serving.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::data_capture::capture_state::CaptureStateMachine;
use crate::data_capture::record_store::RecordStore;
use crate::error_handling::types::ListenerError;
use crate::packet;

/// Acknowledgment sent for every `/commit/` request, valid or not.
const OK_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK";

const NOT_FOUND_RESPONSE: &[u8] =
    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Upper bound on the request head we bother reading; the interesting
/// part is the request line and a full packet fits in ~180 characters.
const MAX_REQUEST_HEAD: usize = 4096;

/// How long shutdown waits for the worker before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Background HTTP listener for the telemetry ingestion endpoint.
///
/// Binding happens at construction; the accept loop runs on a dedicated
/// tokio task until [`shutdown`](IngestListener::shutdown) is called.
/// Shutdown is idempotent and safe to invoke after the worker has
/// already exited on its own.
pub struct IngestListener {
    local_addr: SocketAddr,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IngestListener {
    /// Binds `bind_addr:port` and spawns the serve loop.
    ///
    /// Must be called from within a tokio runtime. Port 0 binds an
    /// ephemeral port, observable through
    /// [`local_addr`](IngestListener::local_addr).
    pub fn spawn(
        bind_addr: std::net::IpAddr,
        port: u16,
        store: Arc<RecordStore>,
        state: Arc<CaptureStateMachine>,
        count_tx: Arc<watch::Sender<usize>>,
    ) -> Result<Self, ListenerError> {
        let addr = SocketAddr::new(bind_addr, port);
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(ListenerError::SockError)?;
        socket.bind(addr).map_err(ListenerError::BindError)?;
        let listener = socket.listen(1024).map_err(ListenerError::BindError)?;
        let local_addr = listener.local_addr().map_err(ListenerError::BindError)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = tokio::spawn(serve_loop(listener, shutdown_rx, store, state, count_tx));
        info!("ingest listener bound on http://{}/commit/", local_addr);

        Ok(Self {
            local_addr,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Address the listener actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the worker and waits (bounded) for it to exit.
    ///
    /// The first call signals the worker and joins it, aborting a worker
    /// that ignores the signal past [`SHUTDOWN_GRACE`]. Later calls are
    /// no-ops. An abort observed by the worker as an error is normal
    /// termination, not a failure.
    pub async fn shutdown(&self) {
        if let Some(tx) = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(());
        }

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut worker) = worker else {
            return;
        };

        match tokio::time::timeout(SHUTDOWN_GRACE, &mut worker).await {
            Ok(Ok(())) => debug!("ingest worker stopped"),
            Ok(Err(e)) => debug!("ingest worker exited abnormally: {}", e),
            Err(_) => {
                warn!(
                    "ingest worker still running after {:?}, aborting it",
                    SHUTDOWN_GRACE
                );
                worker.abort();
                let _ = worker.await;
            }
        }
    }
}

async fn serve_loop(
    listener: TcpListener,
    mut shutdown_rx: oneshot::Receiver<()>,
    store: Arc<RecordStore>,
    state: Arc<CaptureStateMachine>,
    count_tx: Arc<watch::Sender<usize>>,
) {
    loop {
        let (mut stream, peer) = tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("ingest worker received shutdown signal");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    continue;
                }
            },
        };
        trace!("request from {}", peer);

        // The payload is extracted and acknowledged before any decoding,
        // so an abort mid-decode can only ever lose the packet in hand.
        if let Some(payload) = handle_request(&mut stream).await {
            ingest(&payload, &store, &state, &count_tx);
        }
    }
}

/// Reads one request, answers it, and returns the `data` query value for
/// a `/commit/` request (empty string when the parameter is absent).
/// Returns `None` when there is nothing to ingest: unreadable request or
/// foreign path.
async fn handle_request(stream: &mut TcpStream) -> Option<String> {
    // TODO: bound the header read with a timeout so one stalled sender
    // cannot pause ingestion indefinitely.
    let mut buf = [0u8; MAX_REQUEST_HEAD];
    let mut filled = 0usize;
    loop {
        if filled == buf.len() {
            break;
        }
        match stream.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                if buf[..filled].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            Err(e) => {
                debug!("request read failed: {}", e);
                return None;
            }
        }
    }

    let head = String::from_utf8_lossy(&buf[..filled]);
    let request_line = head.lines().next().unwrap_or("");
    let target = request_line.split_whitespace().nth(1).unwrap_or("");
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    // Prefix match, like an HttpListener prefix registration: /commit,
    // /commit/ and anything beneath it are all the ingest endpoint.
    if path != "/commit" && !path.starts_with("/commit/") {
        debug!("rejecting request for {}", path);
        let _ = stream.write_all(NOT_FOUND_RESPONSE).await;
        let _ = stream.shutdown().await;
        return None;
    }

    let payload = query
        .split('&')
        .find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == "data").then(|| percent_decode(value))
        })
        .unwrap_or_default();

    // Acknowledge unconditionally. A sender that hung up early still had
    // its packet delivered, so the payload is processed either way.
    if let Err(e) = stream.write_all(OK_RESPONSE).await {
        debug!("ack write failed: {}", e);
    }
    let _ = stream.shutdown().await;

    Some(payload)
}

/// Undoes `%XX` escapes; anything malformed passes through unchanged and
/// is left for the packet decoder to reject.
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn ingest(
    payload: &str,
    store: &RecordStore,
    state: &CaptureStateMachine,
    count_tx: &watch::Sender<usize>,
) {
    if !state.is_armed() {
        trace!("packet dropped: capture is idle");
        return;
    }

    match packet::decode(payload) {
        Ok(decoded) => {
            store.append(decoded.record, decoded.channel_count);
            let count = store.count();
            count_tx.send_replace(count);
            debug!(
                "record {} appended ({} channel(s) declared)",
                count, decoded.channel_count
            );
        }
        Err(e) => debug!("packet dropped: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE;
    use base64::Engine as _;
    use std::net::{IpAddr, Ipv4Addr};
    use crate::packet::PACKET_LEN;

    struct Harness {
        listener: IngestListener,
        store: Arc<RecordStore>,
        state: Arc<CaptureStateMachine>,
        count_tx: Arc<watch::Sender<usize>>,
    }

    fn harness() -> Harness {
        let store = Arc::new(RecordStore::new());
        let state = Arc::new(CaptureStateMachine::new());
        let (count_tx, _) = watch::channel(0usize);
        let count_tx = Arc::new(count_tx);
        let listener = IngestListener::spawn(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            0,
            Arc::clone(&store),
            Arc::clone(&state),
            Arc::clone(&count_tx),
        )
        .unwrap();
        Harness {
            listener,
            store,
            state,
            count_tx,
        }
    }

    fn encode_packet(channel_count: u8, bools: u32, numbers: &[f32]) -> String {
        let mut bytes = vec![0u8; PACKET_LEN];
        bytes[1] = channel_count;
        bytes[2..6].copy_from_slice(&bools.to_le_bytes());
        for (i, n) in numbers.iter().enumerate() {
            bytes[6 + i * 4..6 + (i + 1) * 4].copy_from_slice(&n.to_le_bytes());
        }
        URL_SAFE.encode(bytes)
    }

    async fn get(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n", target);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    async fn wait_for_append(rx: &mut watch::Receiver<usize>) {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("timed out waiting for an append")
            .unwrap();
    }

    #[tokio::test]
    async fn acknowledges_before_validating() {
        let h = harness();

        let response = get(
            h.listener.local_addr(),
            "/commit/?data=definitely-not-a-packet",
        )
        .await;

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("OK"));
        assert_eq!(h.store.count(), 0);
    }

    #[tokio::test]
    async fn armed_listener_appends_valid_packets() {
        let h = harness();
        let mut rx = h.count_tx.subscribe();
        h.state.start();

        let payload = encode_packet(3, 0b101, &[1.5, 2.5, 3.5]);
        get(h.listener.local_addr(), &format!("/commit/?data={}", payload)).await;

        wait_for_append(&mut rx).await;
        assert_eq!(h.store.count(), 1);
        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.max_channel_count, 3);
        assert_eq!(snapshot.records[0].numbers[1], 2.5);
    }

    #[tokio::test]
    async fn idle_listener_drops_valid_packets() {
        let h = harness();

        let payload = encode_packet(2, 0, &[1.0, 2.0]);
        get(h.listener.local_addr(), &format!("/commit/?data={}", payload)).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.store.count(), 0);
    }

    #[tokio::test]
    async fn truncated_packet_does_not_kill_the_worker() {
        let h = harness();
        let mut rx = h.count_tx.subscribe();
        h.state.start();

        // 133 decoded bytes: one short of a packet.
        let short = URL_SAFE.encode(vec![0u8; PACKET_LEN - 1]);
        get(h.listener.local_addr(), &format!("/commit/?data={}", short)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.store.count(), 0);

        // The worker is still alive and still appending.
        let payload = encode_packet(1, 0, &[7.0]);
        get(h.listener.local_addr(), &format!("/commit/?data={}", payload)).await;
        wait_for_append(&mut rx).await;
        assert_eq!(h.store.count(), 1);
    }

    #[tokio::test]
    async fn malformed_base64_does_not_kill_the_worker() {
        let h = harness();
        let mut rx = h.count_tx.subscribe();
        h.state.start();

        let response = get(h.listener.local_addr(), "/commit/?data=%%%%").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));

        let payload = encode_packet(1, 1, &[1.0]);
        get(h.listener.local_addr(), &format!("/commit/?data={}", payload)).await;
        wait_for_append(&mut rx).await;
        assert_eq!(h.store.count(), 1);
    }

    #[tokio::test]
    async fn missing_data_parameter_is_acknowledged_and_dropped() {
        let h = harness();
        h.state.start();

        let response = get(h.listener.local_addr(), "/commit/").await;

        assert!(response.ends_with("OK"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.store.count(), 0);
    }

    #[tokio::test]
    async fn foreign_paths_are_not_found() {
        let h = harness();

        let response = get(h.listener.local_addr(), "/somewhere-else").await;

        assert!(response.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn percent_encoded_padding_decodes() {
        let h = harness();
        let mut rx = h.count_tx.subscribe();
        h.state.start();

        let payload = encode_packet(1, 0, &[5.0]).replace('=', "%3D");
        get(h.listener.local_addr(), &format!("/commit/?data={}", payload)).await;

        wait_for_append(&mut rx).await;
        assert_eq!(h.store.count(), 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let h = harness();
        let addr = h.listener.local_addr();

        h.listener.shutdown().await;
        h.listener.shutdown().await;

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[test]
    fn percent_decode_passes_malformed_escapes_through() {
        assert_eq!(percent_decode("abc%3D"), "abc=");
        assert_eq!(percent_decode("abc%"), "abc%");
        assert_eq!(percent_decode("abc%zz"), "abc%zz");
        assert_eq!(percent_decode("plain"), "plain");
    }
}
