//! Progress stream for a running data-generation simulation.
//!
//! Parameters are validated over HTTP first; the socket is opened only when
//! the backend accepts them. Each text frame carries one or more
//! newline-separated progress lines. Lines already seen on the connection
//! are dropped.

use std::collections::HashSet;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::FetchError;
use crate::filters::SessionContext;
use crate::logging::{self, obj, v_str, Domain};
use crate::query::Params;
use crate::transport::Transport;

pub const VALIDATE_PARAMS: &str = "/api/validate/websocket-params";
pub const START_SIMULATION: &str = "/start-simulation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    Connecting,
    Open,
    /// Closed with a close frame.
    Closed,
    /// Connection dropped without a close frame.
    Disconnected,
    Errored,
}

impl SocketStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SocketStatus::Connecting => "connecting",
            SocketStatus::Open => "connected",
            SocketStatus::Closed => "closed",
            SocketStatus::Disconnected => "disconnected",
            SocketStatus::Errored => "error",
        }
    }
}

/// Per-connection duplicate filter.
#[derive(Debug, Default)]
pub struct MessageLog {
    seen: HashSet<String>,
    messages: Vec<String>,
}

impl MessageLog {
    /// Split a frame into lines and keep the ones not seen before; returns
    /// the newly kept lines.
    pub fn accept(&mut self, frame: &str) -> Vec<String> {
        let mut fresh = Vec::new();
        for line in frame.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
            if self.seen.insert(line.to_string()) {
                self.messages.push(line.to_string());
                fresh.push(line.to_string());
            }
        }
        fresh
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[derive(Debug, Deserialize)]
struct ValidationError {
    #[serde(default)]
    message: Option<String>,
}

/// Query shared by the validation call and the socket URL.
pub fn simulation_params(ctx: &SessionContext) -> Result<Params, FetchError> {
    let range = &ctx.filters.date_range;
    match (&ctx.session_id, range.start_str(), range.end_str()) {
        (Some(id), Some(start), Some(end)) => Ok(Params::new()
            .with("sessionId", id.as_str())
            .with("durationStart", start)
            .with("durationEnd", end)),
        _ => Err(FetchError::Config(
            "session id or date range is missing".to_string(),
        )),
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct ProgressChannel {
    socket: Option<Socket>,
    status: SocketStatus,
    log: MessageLog,
}

impl ProgressChannel {
    /// Validate parameters, then open the socket.
    pub async fn connect(
        transport: &dyn Transport,
        api_base: &str,
        ws_base: &str,
        ctx: &SessionContext,
    ) -> Result<Self, FetchError> {
        let params = simulation_params(ctx)?;
        let resp = transport.get(&params.url(api_base, VALIDATE_PARAMS)).await?;
        if !resp.is_success() {
            let message = serde_json::from_slice::<ValidationError>(&resp.body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("validation failed with status {}", resp.status));
            logging::warn(
                Domain::Progress,
                "validation_rejected",
                obj(&[("msg", v_str(&message))]),
            );
            return Err(FetchError::Application(message));
        }

        let mut channel = Self {
            socket: None,
            status: SocketStatus::Connecting,
            log: MessageLog::default(),
        };
        let url = params.url(ws_base, START_SIMULATION);
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                channel.socket = Some(socket);
                channel.status = SocketStatus::Open;
                logging::info(Domain::Progress, "socket_open", obj(&[]));
                Ok(channel)
            }
            Err(err) => {
                logging::error(
                    Domain::Progress,
                    "socket_failed",
                    obj(&[("msg", v_str(&err.to_string()))]),
                );
                Err(FetchError::Network(err.to_string()))
            }
        }
    }

    pub fn status(&self) -> SocketStatus {
        self.status
    }

    pub fn messages(&self) -> &[String] {
        self.log.messages()
    }

    /// Wait for the next batch of new progress lines. `None` once the
    /// connection is gone; `status()` then tells how it ended.
    pub async fn next_batch(&mut self) -> Option<Vec<String>> {
        loop {
            let socket = self.socket.as_mut()?;
            let event = socket.next().await;
            match event {
                Some(Ok(Message::Text(text))) => {
                    let fresh = self.log.accept(&text);
                    if !fresh.is_empty() {
                        return Some(fresh);
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let fresh = self.log.accept(&String::from_utf8_lossy(&bytes));
                    if !fresh.is_empty() {
                        return Some(fresh);
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    self.finish(SocketStatus::Closed);
                    return None;
                }
                Some(Ok(_)) => {}
                Some(Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)))
                | Some(Err(WsError::ConnectionClosed))
                | None => {
                    self.finish(SocketStatus::Disconnected);
                    return None;
                }
                Some(Err(err)) => {
                    logging::error(
                        Domain::Progress,
                        "socket_error",
                        obj(&[("msg", v_str(&err.to_string()))]),
                    );
                    self.finish(SocketStatus::Errored);
                    return None;
                }
            }
        }
    }

    fn finish(&mut self, status: SocketStatus) {
        self.socket = None;
        self.status = status;
        self.log.clear();
        logging::info(
            Domain::Progress,
            "socket_finished",
            obj(&[("status", v_str(status.label()))]),
        );
    }

    /// Send a close frame and release the connection.
    pub async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
            self.finish(SocketStatus::Closed);
        }
    }
}

// Dropping an open channel releases the TCP connection without a close
// frame; call `close()` first for a clean shutdown.
impl Drop for ProgressChannel {
    fn drop(&mut self) {
        if self.socket.is_some() {
            logging::debug(Domain::Progress, "socket_dropped", obj(&[]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::DateRange;
    use crate::transport::mock::MockTransport;
    use crate::transport::RawResponse;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use std::future::Future;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn ready_ctx() -> SessionContext {
        SessionContext::new(
            Some("s".into()),
            DateRange::parse(Some("2025-07-01"), Some("2025-07-02")).unwrap(),
        )
    }

    // One-connection server on an ephemeral port; returns its ws base.
    async fn serve<F, Fut>(script: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            script(ws).await;
        });
        format!("ws://{}", addr)
    }

    async fn open(ws_base: &str) -> ProgressChannel {
        let mock = MockTransport::new();
        mock.respond(VALIDATE_PARAMS, RawResponse::new(200, "{}"));
        ProgressChannel::connect(&mock, "http://b", ws_base, &ready_ctx())
            .await
            .unwrap()
    }

    async fn send_all(ws: &mut WebSocketStream<TcpStream>, frames: &[&str]) {
        for frame in frames {
            ws.send(Message::Text(frame.to_string())).await.unwrap();
        }
    }

    #[test]
    fn test_duplicates_are_suppressed() {
        let mut log = MessageLog::default();
        assert_eq!(log.accept("step 1\nstep 2\n"), vec!["step 1", "step 2"]);
        assert_eq!(log.accept("step 2"), Vec::<String>::new());
        assert_eq!(log.accept("step 3"), vec!["step 3"]);
        assert_eq!(log.messages().len(), 3);
    }

    #[test]
    fn test_clear_resets_seen_set_only() {
        let mut log = MessageLog::default();
        log.accept("a");
        log.clear();
        assert_eq!(log.accept("a"), vec!["a"]);
        assert_eq!(log.messages().len(), 2);
    }

    #[test]
    fn test_params_require_full_range() {
        let partial = SessionContext::new(
            Some("s".into()),
            DateRange::parse(Some("2025-07-01"), None).unwrap(),
        );
        assert!(simulation_params(&partial).is_err());
        let full = SessionContext::new(
            Some("s".into()),
            DateRange::parse(Some("2025-07-01"), Some("2025-07-02")).unwrap(),
        );
        assert_eq!(
            simulation_params(&full).unwrap().to_query_string(),
            "sessionId=s&durationStart=2025-07-01&durationEnd=2025-07-02"
        );
    }

    #[tokio::test]
    async fn test_rejected_validation_carries_backend_message() {
        let mock = MockTransport::new();
        mock.respond(VALIDATE_PARAMS, RawResponse::json(400, &json!({"message": "unknown session"})));
        let ctx = SessionContext::new(
            Some("s".into()),
            DateRange::parse(Some("2025-07-01"), Some("2025-07-02")).unwrap(),
        );
        let err = ProgressChannel::connect(&mock, "http://b", "ws://b", &ctx)
            .await
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "unknown session");
    }

    #[tokio::test]
    async fn test_clean_close_after_deduplicated_frames() {
        let ws_base = serve(|mut ws| async move {
            send_all(&mut ws, &["step 1", "step 1", "step 1\nstep 2"]).await;
            ws.close(None).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut channel = open(&ws_base).await;
        assert_eq!(channel.status(), SocketStatus::Open);
        assert_eq!(channel.next_batch().await, Some(vec!["step 1".to_string()]));
        assert_eq!(channel.next_batch().await, Some(vec!["step 2".to_string()]));
        assert_eq!(channel.next_batch().await, None);
        assert_eq!(channel.status(), SocketStatus::Closed);
        assert_eq!(channel.messages(), ["step 1", "step 2"]);
        assert!(channel.log.seen.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_connection_is_disconnected() {
        let ws_base = serve(|mut ws| async move {
            send_all(&mut ws, &["step 1", "step 1", "step 2"]).await;
            drop(ws);
        })
        .await;

        let mut channel = open(&ws_base).await;
        let mut received = Vec::new();
        while let Some(batch) = channel.next_batch().await {
            received.extend(batch);
        }
        assert_eq!(received, vec!["step 1", "step 2"]);
        assert_eq!(channel.status(), SocketStatus::Disconnected);
        assert_eq!(channel.status().label(), "disconnected");
    }

    #[tokio::test]
    async fn test_close_sends_frame_and_resets_seen_set() {
        let ws_base = serve(|mut ws| async move {
            send_all(&mut ws, &["a"]).await;
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        })
        .await;

        let mut channel = open(&ws_base).await;
        assert_eq!(channel.next_batch().await, Some(vec!["a".to_string()]));
        channel.close().await;
        assert_eq!(channel.status(), SocketStatus::Closed);
        assert!(channel.log.seen.is_empty());
        assert_eq!(channel.messages(), ["a"]);
        assert_eq!(channel.next_batch().await, None);
    }
}
