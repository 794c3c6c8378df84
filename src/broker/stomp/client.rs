//! STOMP session over a single WebSocket connection.
//!
//! # Responsibilities
//! - Dial the broker, negotiate the STOMP subprotocol and send CONNECT
//! - Queue SEND frames from any task through one writer
//! - Dispatch RECEIPT frames to the callback registered for that receipt id
//! - Drive the ConnectionGate and reconnect with backoff until shutdown
//!
//! # Design Decisions
//! - Receipt callbacks are dropped when a session ends; their senders time out
//! - An ERROR frame ends the session (the broker closes after sending it)
//! - Outgoing heart-beats only; incoming heart-beats are tolerated, not enforced

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::broker::stomp::frame::{decode_frames, Command, Frame};
use crate::broker::{
    AckCallback, BrokerConnection, BrokerError, ConnectionGate, ConnectionState, OutboundMessage,
    ReceiptId,
};
use crate::config::BrokerConfig;
use crate::observability::metrics;
use crate::resilience::backoff::ReconnectBackoff;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SUBPROTOCOLS: &str = "v12.stomp, v11.stomp, v10.stomp";
const ACCEPT_VERSION: &str = "1.0,1.1,1.2";

/// Headers the bridge sets itself; caller-supplied values are ignored.
const RESERVED_HEADERS: [&str; 3] = ["destination", "receipt", "content-length"];

/// How a session ended without a transport error.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Closed,
}

/// Broker binding speaking STOMP 1.2 over WebSocket.
pub struct StompConnection {
    url: Url,
    config: BrokerConfig,
    gate: ConnectionGate,
    connector: Option<Connector>,
    /// Writer channel of the live session, if any.
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    /// Callbacks waiting for a RECEIPT, keyed by receipt id.
    receipts: DashMap<String, AckCallback>,
}

impl StompConnection {
    /// Build the binding. Reads `tlsOptions.ca_files` eagerly so bad trust
    /// material fails at startup rather than on the first dial.
    pub fn new(url: Url, config: BrokerConfig, gate: ConnectionGate) -> Result<Self, BrokerError> {
        let connector = if config.tls_options.ca_files.is_empty() {
            None
        } else {
            Some(load_connector(&config.tls_options.ca_files)?)
        };

        Ok(Self {
            url,
            config,
            gate,
            connector,
            outbound: Mutex::new(None),
            receipts: DashMap::new(),
        })
    }

    pub fn gate(&self) -> &ConnectionGate {
        &self.gate
    }

    /// Keep a session alive until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut backoff = ReconnectBackoff::new(&self.config.broker_options);

        loop {
            self.gate.transition(ConnectionState::Connecting);
            tracing::info!(
                url = %self.url,
                failures = backoff.failures(),
                "Connecting to message broker"
            );

            let dialed = tokio::select! {
                result = self.connect() => result,
                _ = shutdown.recv() => break,
            };

            match dialed {
                Ok(ws) => {
                    backoff.reset();
                    let outcome = self.serve(ws, &mut shutdown).await;
                    self.detach();
                    match outcome {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Closed) => {
                            tracing::warn!(url = %self.url, "Broker closed the connection");
                            self.gate.transition(ConnectionState::Disconnected);
                        }
                        Err(e) => {
                            tracing::warn!(url = %self.url, error = %e, "Broker session failed");
                            self.gate.transition(ConnectionState::Errored);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "Failed to connect to message broker");
                    self.gate.transition(ConnectionState::Errored);
                }
            }

            let delay = backoff.next_delay();
            metrics::record_broker_reconnect();
            tracing::info!(
                delay = ?delay,
                failures = backoff.failures(),
                "Reconnecting to message broker"
            );

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }

        self.detach();
        self.gate.transition(ConnectionState::Disconnected);
        tracing::info!("Broker connection stopped");
    }

    /// Dial and complete the CONNECT / CONNECTED exchange.
    async fn connect(&self) -> Result<WsStream, BrokerError> {
        let connect_timeout = Duration::from_millis(self.config.broker_options.connect_timeout_ms);

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOLS));

        let dial = connect_async_tls_with_config(request, None, false, self.connector.clone());
        let (mut ws, _response) = time::timeout(connect_timeout, dial)
            .await
            .map_err(|_| BrokerError::ConnectTimeout)?
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        ws.send(Message::text(self.connect_frame().encode()))
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let handshake = async {
            while let Some(message) = ws.next().await {
                let message = message.map_err(|e| BrokerError::Transport(e.to_string()))?;
                let Some(text) = message_text(&message) else {
                    continue;
                };
                let frames =
                    decode_frames(text).map_err(|e| BrokerError::Protocol(e.to_string()))?;
                for frame in frames {
                    match frame.command {
                        Command::Connected => {
                            tracing::info!(
                                version = frame.get_header("version").unwrap_or("1.0"),
                                server = frame.get_header("server").unwrap_or("unknown"),
                                "STOMP session established"
                            );
                            return Ok(());
                        }
                        Command::Error => return Err(error_frame(&frame)),
                        other => {
                            tracing::debug!(command = %other, "Ignoring frame before CONNECTED")
                        }
                    }
                }
            }
            Err(BrokerError::Closed)
        };

        time::timeout(connect_timeout, handshake)
            .await
            .map_err(|_| BrokerError::ConnectTimeout)??;

        Ok(ws)
    }

    /// Pump frames for one established session.
    async fn serve(
        &self,
        ws: WsStream,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<SessionEnd, BrokerError> {
        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
        *lock(&self.outbound) = Some(tx);
        self.gate.transition(ConnectionState::Connected);

        let heartbeat_ms = self.config.broker_options.heartbeat_outgoing_ms;
        let heartbeat_enabled = heartbeat_ms > 0;
        let period = Duration::from_millis(heartbeat_ms.max(1));
        let mut heartbeat = time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                Some(frame) = rx.recv() => {
                    sink.send(Message::text(frame.encode()))
                        .await
                        .map_err(|e| BrokerError::Transport(e.to_string()))?;
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                    Some(Ok(message)) => {
                        if let Some(text) = message_text(&message) {
                            self.handle_incoming(text)?;
                        }
                    }
                    Some(Err(e)) => return Err(BrokerError::Transport(e.to_string())),
                },
                _ = heartbeat.tick(), if heartbeat_enabled => {
                    sink.send(Message::text("\n"))
                        .await
                        .map_err(|e| BrokerError::Transport(e.to_string()))?;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Disconnecting from message broker");
                    let _ = sink.send(Message::text(Frame::new(Command::Disconnect).encode())).await;
                    let _ = sink.close().await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }

    /// Handle one inbound WebSocket text payload.
    fn handle_incoming(&self, text: &str) -> Result<(), BrokerError> {
        let frames = match decode_frames(text) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable broker payload");
                return Ok(());
            }
        };
        for frame in frames {
            self.handle_frame(frame)?;
        }
        Ok(())
    }

    fn handle_frame(&self, frame: Frame) -> Result<(), BrokerError> {
        match frame.command {
            Command::Receipt => {
                let Some(id) = frame.get_header("receipt-id") else {
                    tracing::warn!("RECEIPT frame without receipt-id");
                    return Ok(());
                };
                match self.receipts.remove(id) {
                    Some((id, on_ack)) => on_ack(ReceiptId::from(id)),
                    None => tracing::debug!(receipt_id = id, "Receipt for unknown send"),
                }
                Ok(())
            }
            Command::Error => Err(error_frame(&frame)),
            other => {
                tracing::debug!(command = %other, "Ignoring broker frame");
                Ok(())
            }
        }
    }

    /// Forget the live session and every receipt still waiting on it.
    fn detach(&self) {
        lock(&self.outbound).take();
        let dropped = self.receipts.len();
        self.receipts.clear();
        if dropped > 0 {
            tracing::warn!(dropped, "Dropped receipt callbacks of the closed session");
        }
    }

    fn connect_frame(&self) -> Frame {
        let login = &self.config.login_options;
        let host = login
            .host
            .clone()
            .or_else(|| self.url.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string());

        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header(
                "heart-beat",
                format!("{},0", self.config.broker_options.heartbeat_outgoing_ms),
            );
        if let Some(user) = &login.login {
            frame = frame.header("login", user.clone());
        }
        if let Some(passcode) = &login.passcode {
            frame = frame.header("passcode", passcode.clone());
        }
        frame
    }

    fn send_frame(&self, message: &OutboundMessage) -> Frame {
        let destination = format!(
            "{}{}",
            self.config.broker_options.destination_prefix, message.destination
        );
        let mut frame = Frame::new(Command::Send)
            .header("destination", destination)
            .header("receipt", message.receipt.as_str());

        let mut extra: Vec<_> = message
            .headers
            .iter()
            .filter(|(name, _)| !RESERVED_HEADERS.contains(&name.as_str()))
            .collect();
        extra.sort();
        for (name, value) in extra {
            frame = frame.header(name.clone(), value.clone());
        }
        frame.body(message.body.clone())
    }

    #[cfg(test)]
    fn attach_for_test(&self) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.outbound) = Some(tx);
        self.gate.transition(ConnectionState::Connected);
        rx
    }
}

impl BrokerConnection for StompConnection {
    fn state(&self) -> ConnectionState {
        self.gate.current()
    }

    fn send(&self, message: OutboundMessage, on_ack: AckCallback) -> Result<(), BrokerError> {
        if !self.gate.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        let outbound = lock(&self.outbound);
        let tx = outbound.as_ref().ok_or(BrokerError::NotConnected)?;

        let frame = self.send_frame(&message);
        let receipt = message.receipt.as_str().to_string();
        self.receipts.insert(receipt.clone(), on_ack);

        if tx.send(frame).is_err() {
            self.receipts.remove(&receipt);
            return Err(BrokerError::Closed);
        }
        tracing::debug!(
            destination = %message.destination,
            receipt_id = %receipt,
            "SEND queued"
        );
        Ok(())
    }

    fn forget(&self, receipt: &ReceiptId) {
        if self.receipts.remove(receipt.as_str()).is_some() {
            tracing::debug!(receipt_id = %receipt, "Released receipt callback");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn message_text(message: &Message) -> Option<&str> {
    match message {
        Message::Text(text) => Some(text.as_str()),
        Message::Binary(bytes) => std::str::from_utf8(bytes).ok(),
        _ => None,
    }
}

fn error_frame(frame: &Frame) -> BrokerError {
    let summary = frame.get_header("message").unwrap_or("broker error");
    if frame.body.trim().is_empty() {
        BrokerError::Protocol(summary.to_string())
    } else {
        BrokerError::Protocol(format!("{}: {}", summary, frame.body.trim()))
    }
}

/// Root store made of the configured CA files only.
fn load_connector(ca_files: &[String]) -> Result<Connector, BrokerError> {
    let mut roots = rustls::RootCertStore::empty();
    for path in ca_files {
        let path = Path::new(path);
        let file = File::open(path)
            .map_err(|e| BrokerError::Tls(format!("cannot read {:?}: {}", path, e)))?;
        let mut added = 0usize;
        for cert in rustls_pemfile::certs(&mut BufReader::new(file)) {
            let cert = cert.map_err(|e| BrokerError::Tls(format!("{:?}: {}", path, e)))?;
            roots
                .add(cert)
                .map_err(|e| BrokerError::Tls(format!("{:?}: {}", path, e)))?;
            added += 1;
        }
        if added == 0 {
            return Err(BrokerError::Tls(format!("no certificates in {:?}", path)));
        }
    }

    let config = rustls::ClientConfig::builder_with_provider(crate::net::tls::crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| BrokerError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Connector::Rustls(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{CorrelationEngine, SendOutcome, SendRequest};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn connection(config: BrokerConfig) -> StompConnection {
        let url = Url::parse("ws://broker.local:61614/stomp").unwrap();
        StompConnection::new(url, config, ConnectionGate::new()).unwrap()
    }

    fn message(destination: &str, receipt: &str) -> OutboundMessage {
        OutboundMessage {
            destination: destination.to_string(),
            headers: HashMap::new(),
            body: "hi".to_string(),
            receipt: ReceiptId::from(receipt),
        }
    }

    #[test]
    fn connect_frame_carries_login_and_host() {
        let mut config = BrokerConfig::default();
        config.login_options.login = Some("guest".into());
        config.login_options.passcode = Some("secret".into());
        let frame = connection(config).connect_frame();

        assert_eq!(frame.command, Command::Connect);
        assert_eq!(frame.get_header("accept-version"), Some(ACCEPT_VERSION));
        assert_eq!(frame.get_header("host"), Some("broker.local"));
        assert_eq!(frame.get_header("login"), Some("guest"));
        assert_eq!(frame.get_header("passcode"), Some("secret"));
        assert_eq!(frame.get_header("heart-beat"), Some("10000,0"));
    }

    #[test]
    fn send_frame_prefixes_destination_and_protects_reserved_headers() {
        let conn = connection(BrokerConfig::default());
        let mut msg = message("queue/a", "r1");
        msg.headers.insert("receipt".into(), "spoofed".into());
        msg.headers.insert("priority".into(), "9".into());

        let frame = conn.send_frame(&msg);
        assert_eq!(frame.get_header("destination"), Some("/queue/a"));
        assert_eq!(frame.get_header("receipt"), Some("r1"));
        assert_eq!(frame.get_header("priority"), Some("9"));
        assert_eq!(frame.headers.iter().filter(|(k, _)| k == "receipt").count(), 1);
        assert_eq!(frame.body, "hi");
    }

    #[test]
    fn send_while_disconnected_fails_synchronously() {
        let conn = connection(BrokerConfig::default());
        let err = conn
            .send(message("queue/a", "r1"), Box::new(|_| panic!("must not be acknowledged")))
            .unwrap_err();
        assert_eq!(err, BrokerError::NotConnected);
        assert!(conn.receipts.is_empty());
    }

    #[test]
    fn receipt_frame_invokes_matching_callback_once() {
        let conn = connection(BrokerConfig::default());
        let mut wire = conn.attach_for_test();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        conn.send(
            message("queue/a", "r1"),
            Box::new(move |id| {
                assert_eq!(id.as_str(), "r1");
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        let sent = wire.try_recv().unwrap();
        assert_eq!(sent.command, Command::Send);

        conn.handle_incoming("RECEIPT\nreceipt-id:r1\n\n\0").unwrap();
        conn.handle_incoming("RECEIPT\nreceipt-id:r1\n\n\0").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn error_frame_ends_session() {
        let conn = connection(BrokerConfig::default());
        let err = conn
            .handle_incoming("ERROR\nmessage:access refused\n\n\0")
            .unwrap_err();
        assert_eq!(err, BrokerError::Protocol("access refused".into()));
    }

    #[test]
    fn detach_drops_waiting_receipts() {
        let conn = connection(BrokerConfig::default());
        let _wire = conn.attach_for_test();
        conn.send(message("queue/a", "r1"), Box::new(|_| {})).unwrap();
        assert_eq!(conn.receipts.len(), 1);

        conn.detach();
        assert!(conn.receipts.is_empty());
        assert_eq!(
            conn.send(message("queue/a", "r2"), Box::new(|_| {})).unwrap_err(),
            BrokerError::NotConnected
        );
    }

    #[test]
    fn forget_releases_waiting_receipt() {
        let conn = connection(BrokerConfig::default());
        let _wire = conn.attach_for_test();
        conn.send(message("queue/a", "r1"), Box::new(|_| panic!("must not be acknowledged")))
            .unwrap();

        conn.forget(&ReceiptId::from("r1"));
        assert!(conn.receipts.is_empty());
        // A receipt arriving afterwards finds nothing to call.
        conn.handle_incoming("RECEIPT\nreceipt-id:r1\n\n\0").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_sends_leave_no_callbacks_behind() {
        let conn = Arc::new(connection(BrokerConfig::default()));
        let mut wire = conn.attach_for_test();
        let engine = CorrelationEngine::new(conn.clone(), Duration::from_millis(100));

        for _ in 0..1000 {
            let request = SendRequest::new("queue/a", HashMap::new(), "hi".to_string()).unwrap();
            assert_eq!(engine.send(request).await, SendOutcome::TimedOut);
        }

        assert_eq!(engine.pending_count(), 0);
        assert_eq!(conn.receipts.len(), 0);
        let mut written = 0;
        while wire.try_recv().is_ok() {
            written += 1;
        }
        assert_eq!(written, 1000);
    }

    #[test]
    fn unreadable_ca_file_fails_construction() {
        let mut config = BrokerConfig::default();
        config.tls_options.ca_files = vec!["/nonexistent/ca.pem".into()];
        let url = Url::parse("wss://broker.local/stomp").unwrap();
        let result = StompConnection::new(url, config, ConnectionGate::new());
        assert!(matches!(result, Err(BrokerError::Tls(_))));
    }
}
