//! Command channel session.
//!
//! One connection per command. The node must greet before anything is sent:
//!
//! ```text
//! Connecting -> AwaitingGreeting -> CommandSent -> AwaitingResponse -> Completed
//!      \               \                                   \
//!       +---------------+-> Failed (HTTP fallback)          +-> TimedOut
//! ```
//!
//! A timeout after the command went out is reported as asynchronous success: nodes
//! process commands asynchronously and the real outcome shows up in the head state.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hydra_core::{HydraError, Result};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::http::HeadNodeClient;
use crate::protocol::{ClientCommand, ServerMessage};

/// Default time budget of a command, handshake included.
pub const DEFAULT_CHANNEL_TIMEOUT: Duration = Duration::from_millis(5000);

/// Note attached to commands that were sent but not answered in time.
pub const ASYNC_NOTE: &str =
    "command sent, node is processing asynchronously; query the head state for the result";

/// States of a command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Opening the socket.
    Connecting,
    /// Socket open, waiting for the node's Greetings.
    AwaitingGreeting,
    /// Command written to the socket.
    CommandSent,
    /// Waiting for the first non-Greetings message.
    AwaitingResponse,
    /// Response received.
    Completed,
    /// Time budget exhausted.
    TimedOut,
    /// Socket failed before the command was sent.
    Failed,
}

/// How a command ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The node answered over the channel.
    Completed {
        response_tag: String,
        response: serde_json::Value,
    },

    /// Sent, but no answer before the deadline.
    Asynchronous { note: String },

    /// Delivered through the HTTP fallback.
    Fallback { status: u16, body: serde_json::Value },
}

impl CommandOutcome {
    /// Tag of the node's response, when one arrived over the channel.
    pub fn response_tag(&self) -> Option<&str> {
        match self {
            CommandOutcome::Completed { response_tag, .. } => Some(response_tag),
            _ => None,
        }
    }
}

/// Result of one command plus the states it went through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReport {
    pub port: u16,
    pub command: String,
    pub outcome: CommandOutcome,
    pub command_sent: bool,
    pub trace: Vec<ChannelState>,
}

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Host the nodes listen on.
    pub host: String,

    /// Overall budget of one command.
    pub timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            timeout: DEFAULT_CHANNEL_TIMEOUT,
        }
    }
}

/// Delivers commands to head nodes.
#[derive(Clone)]
pub struct CommandChannel {
    config: ChannelConfig,
    http: HeadNodeClient,
}

/// Bookkeeping of one invocation.
struct Session {
    port: u16,
    command: String,
    trace: Vec<ChannelState>,
    sent: bool,
}

impl Session {
    fn enter(&mut self, state: ChannelState) {
        debug!(port = self.port, command = %self.command, state = ?state, "channel transition");
        self.trace.push(state);
    }

    fn finish(self, outcome: CommandOutcome) -> CommandReport {
        CommandReport {
            port: self.port,
            command: self.command,
            outcome,
            command_sent: self.sent,
            trace: self.trace,
        }
    }
}

impl CommandChannel {
    pub fn new(config: ChannelConfig) -> Self {
        let http = HeadNodeClient::new(config.host.clone());
        Self { config, http }
    }

    /// Use a preconfigured HTTP client for the fallback.
    pub fn with_http(mut self, http: HeadNodeClient) -> Self {
        self.http = http;
        self
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Deliver `command` to the node listening on `port`.
    pub async fn execute(&self, port: u16, command: ClientCommand) -> Result<CommandReport> {
        let deadline = Instant::now() + self.config.timeout;
        let mut session = Session {
            port,
            command: command.tag().to_string(),
            trace: Vec::new(),
            sent: false,
        };
        session.enter(ChannelState::Connecting);

        let url = format!("ws://{}:{}/", self.config.host, port);
        let mut ws = match timeout_at(deadline, connect_async(url.as_str())).await {
            Err(_) => return Err(self.timed_out(session)),
            Ok(Err(e)) => {
                session.enter(ChannelState::Failed);
                return self.fallback(session, &command, e.to_string()).await;
            }
            Ok(Ok((ws, _))) => ws,
        };
        session.enter(ChannelState::AwaitingGreeting);

        loop {
            let frame = match timeout_at(deadline, ws.next()).await {
                Err(_) => {
                    let _ = ws.close(None).await;
                    if session.sent {
                        session.enter(ChannelState::TimedOut);
                        info!(port, command = %session.command, "no response before deadline, assuming asynchronous processing");
                        return Ok(session.finish(CommandOutcome::Asynchronous {
                            note: ASYNC_NOTE.to_string(),
                        }));
                    }
                    return Err(self.timed_out(session));
                }
                Ok(frame) => frame,
            };

            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => {
                    if session.sent {
                        return Ok(self.await_deadline(session, deadline, "node closed the channel").await);
                    }
                    session.enter(ChannelState::Failed);
                    return self
                        .fallback(session, &command, "channel closed before greeting".to_string())
                        .await;
                }
                Some(Err(e)) => {
                    if session.sent {
                        return Ok(self.await_deadline(session, deadline, &e.to_string()).await);
                    }
                    session.enter(ChannelState::Failed);
                    return self.fallback(session, &command, e.to_string()).await;
                }
                Some(Ok(_)) => continue,
            };

            match ServerMessage::parse(&text) {
                Ok(ServerMessage::Greetings(_)) if !session.sent => {
                    let payload = serde_json::to_string(&command)?;
                    if let Err(e) = ws.send(Message::Text(payload)).await {
                        session.enter(ChannelState::Failed);
                        return self.fallback(session, &command, e.to_string()).await;
                    }
                    session.sent = true;
                    session.enter(ChannelState::CommandSent);
                    session.enter(ChannelState::AwaitingResponse);
                }
                Ok(ServerMessage::Greetings(_)) => {
                    debug!(port, "ignoring repeated greeting");
                }
                Ok(ServerMessage::Tagged { tag, payload }) if session.sent => {
                    session.enter(ChannelState::Completed);
                    let _ = ws.close(None).await;
                    info!(port, command = %session.command, response = %tag, "command answered");
                    return Ok(session.finish(CommandOutcome::Completed {
                        response_tag: tag,
                        response: payload,
                    }));
                }
                Ok(ServerMessage::Tagged { tag, .. }) => {
                    debug!(port, tag = %tag, "ignoring message received before greeting");
                }
                Err(e) => {
                    debug!(port, "ignoring unparseable frame: {}", e);
                }
            }
        }
    }

    fn timed_out(&self, mut session: Session) -> HydraError {
        session.enter(ChannelState::TimedOut);
        warn!(port = session.port, command = %session.command, "no greeting before deadline, command not sent");
        HydraError::ChannelTimeout {
            port: session.port,
            duration_ms: self.config.timeout.as_millis() as u64,
            message: "could not establish protocol communication".to_string(),
        }
    }

    /// The command is out but the channel went away; wait out the budget before
    /// reporting asynchronous processing.
    async fn await_deadline(&self, mut session: Session, deadline: Instant, reason: &str) -> CommandReport {
        debug!(port = session.port, "channel ended after command was sent: {}", reason);
        sleep_until(deadline).await;
        session.enter(ChannelState::TimedOut);
        session.finish(CommandOutcome::Asynchronous {
            note: ASYNC_NOTE.to_string(),
        })
    }

    /// One-shot HTTP fallback after a transport failure before the command was sent.
    ///
    /// The post gets its own channel-sized budget.
    async fn fallback(&self, session: Session, command: &ClientCommand, reason: String) -> Result<CommandReport> {
        let Some(action) = command.action() else {
            return Err(HydraError::ChannelTransport {
                port: session.port,
                message: reason,
            });
        };

        warn!(port = session.port, action = %action, "control channel failed ({}), falling back to HTTP", reason);
        let body = command.fallback_body();
        let post = self.http.post_action(session.port, action, body.as_ref());
        let (status, body) = timeout(self.config.timeout, post)
            .await
            .map_err(|_| HydraError::UpstreamTimeout {
                port: session.port,
                duration_ms: self.config.timeout.as_millis() as u64,
            })??;

        Ok(session.finish(CommandOutcome::Fallback { status, body }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
    use axum::extract::State;
    use axum::response::Response;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use hydra_core::{ErrorKind, HeadAction};

    #[derive(Clone, Copy)]
    enum Behavior {
        /// Greets and answers the first command.
        Answer,
        /// Accepts the socket and never speaks.
        Silent,
        /// Greets, reads the command, never answers.
        GreetOnly,
        /// Greets, reads the command, closes the socket.
        GreetThenClose,
        /// Closes the socket without greeting.
        CloseWithoutGreeting,
        /// Sends a head event, then greets and answers.
        TagBeforeGreeting,
    }

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<String>>,
        posts: AtomicUsize,
        post_bodies: Mutex<Vec<String>>,
    }

    #[derive(Clone)]
    struct FakeNode {
        behavior: Behavior,
        recorder: Arc<Recorder>,
    }

    async fn ws_handler(ws: WebSocketUpgrade, State(node): State<FakeNode>) -> Response {
        ws.on_upgrade(move |socket| handle_socket(socket, node))
    }

    async fn handle_socket(mut socket: WebSocket, node: FakeNode) {
        match node.behavior {
            Behavior::CloseWithoutGreeting => {
                let _ = socket.close().await;
                return;
            }
            Behavior::TagBeforeGreeting => {
                let event = r#"{"tag":"HeadIsOpen","headId":"early"}"#;
                if socket.send(WsMessage::Text(event.to_string())).await.is_err() {
                    return;
                }
            }
            _ => {}
        }
        if !matches!(node.behavior, Behavior::Silent) {
            let greeting = r#"{"tag":"Greetings","me":{"vkey":"aa"},"headStatus":"Idle"}"#;
            if socket.send(WsMessage::Text(greeting.to_string())).await.is_err() {
                return;
            }
        }

        while let Some(Ok(msg)) = socket.recv().await {
            if let WsMessage::Text(text) = msg {
                node.recorder.frames.lock().unwrap().push(text.to_string());
                match node.behavior {
                    Behavior::Answer | Behavior::TagBeforeGreeting => {
                        let reply = r#"{"tag":"HeadIsInitializing","headId":"cafe"}"#;
                        let _ = socket.send(WsMessage::Text(reply.to_string())).await;
                    }
                    Behavior::GreetThenClose => {
                        let _ = socket.close().await;
                        return;
                    }
                    Behavior::Silent | Behavior::GreetOnly | Behavior::CloseWithoutGreeting => {}
                }
            }
        }
    }

    async fn post_handler(State(node): State<FakeNode>, body: String) -> Json<serde_json::Value> {
        node.recorder.posts.fetch_add(1, Ordering::SeqCst);
        node.recorder.post_bodies.lock().unwrap().push(body);
        Json(serde_json::json!({ "tag": "Accepted" }))
    }

    async fn spawn_node(behavior: Option<Behavior>) -> (u16, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let node = FakeNode {
            behavior: behavior.unwrap_or(Behavior::Silent),
            recorder: recorder.clone(),
        };

        let mut app = Router::new()
            .route("/init", post(post_handler))
            .route("/close", post(post_handler))
            .route("/fanout", post(post_handler));
        if behavior.is_some() {
            app = app.route("/", get(ws_handler));
        }
        let app = app.with_state(node);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (port, recorder)
    }

    fn channel(timeout_ms: u64) -> CommandChannel {
        CommandChannel::new(ChannelConfig {
            host: "127.0.0.1".to_string(),
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    #[tokio::test]
    async fn test_response_after_greeting() {
        let (port, recorder) = spawn_node(Some(Behavior::Answer)).await;

        let cmd = ClientCommand::for_action(HeadAction::Init, vec!["bb".into()]);
        let report = channel(2000).execute(port, cmd).await.unwrap();

        assert_eq!(report.outcome.response_tag(), Some("HeadIsInitializing"));
        match &report.outcome {
            CommandOutcome::Completed { response, .. } => assert_eq!(response["headId"], "cafe"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            report.trace,
            vec![
                ChannelState::Connecting,
                ChannelState::AwaitingGreeting,
                ChannelState::CommandSent,
                ChannelState::AwaitingResponse,
                ChannelState::Completed,
            ]
        );
        assert!(report.command_sent);

        let frames = recorder.frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 1);
        let sent: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(sent["tag"], "Init");
        assert_eq!(sent["otherParties"][0]["vkey"], "bb");
        assert_eq!(recorder.posts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_greeting_is_error_and_nothing_sent() {
        let (port, recorder) = spawn_node(Some(Behavior::Silent)).await;

        let err = channel(300)
            .execute(port, ClientCommand::Close)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ChannelTimeout);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(recorder.frames.lock().unwrap().is_empty());
        assert_eq!(recorder.posts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sent_without_response_is_asynchronous() {
        let (port, recorder) = spawn_node(Some(Behavior::GreetOnly)).await;

        let report = channel(300).execute(port, ClientCommand::Fanout).await.unwrap();

        assert!(matches!(report.outcome, CommandOutcome::Asynchronous { .. }));
        assert_eq!(report.trace.last(), Some(&ChannelState::TimedOut));
        assert!(report.command_sent);
        assert_eq!(recorder.frames.lock().unwrap().len(), 1);
        assert_eq!(recorder.posts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_close_after_send_waits_for_deadline() {
        let (port, _recorder) = spawn_node(Some(Behavior::GreetThenClose)).await;

        let started = std::time::Instant::now();
        let report = channel(400).execute(port, ClientCommand::Close).await.unwrap();

        assert!(matches!(report.outcome, CommandOutcome::Asynchronous { .. }));
        assert!(started.elapsed() >= Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_transport_error_falls_back_once() {
        let (port, recorder) = spawn_node(None).await;

        let cmd = ClientCommand::for_action(HeadAction::Init, vec!["bb".into()]);
        let report = channel(2000).execute(port, cmd).await.unwrap();

        match &report.outcome {
            CommandOutcome::Fallback { status, body } => {
                assert_eq!(*status, 200);
                assert_eq!(body["tag"], "Accepted");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(report.trace.last(), Some(&ChannelState::Failed));
        assert!(!report.command_sent);
        assert_eq!(recorder.posts.load(Ordering::SeqCst), 1);

        let body: serde_json::Value =
            serde_json::from_str(&recorder.post_bodies.lock().unwrap()[0]).unwrap();
        assert_eq!(body["otherParties"][0]["vkey"], "bb");
    }

    #[tokio::test]
    async fn test_fallback_failure_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = channel(1000)
            .execute(port, ClientCommand::Close)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    }

    #[tokio::test]
    async fn test_new_tx_has_no_fallback() {
        let (port, recorder) = spawn_node(None).await;

        let err = channel(1000)
            .execute(port, ClientCommand::new_tx("84a3", "Tx"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelTransport);
        assert_eq!(recorder.posts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_close_before_greeting_falls_back() {
        let (port, recorder) = spawn_node(Some(Behavior::CloseWithoutGreeting)).await;

        let report = channel(2000).execute(port, ClientCommand::Close).await.unwrap();

        assert!(matches!(report.outcome, CommandOutcome::Fallback { status: 200, .. }));
        assert!(!report.command_sent);
        assert_eq!(report.trace.last(), Some(&ChannelState::Failed));
        assert!(recorder.frames.lock().unwrap().is_empty());
        assert_eq!(recorder.posts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_event_before_greeting_is_not_a_response() {
        let (port, recorder) = spawn_node(Some(Behavior::TagBeforeGreeting)).await;

        let report = channel(2000).execute(port, ClientCommand::Close).await.unwrap();

        match &report.outcome {
            CommandOutcome::Completed { response_tag, response } => {
                assert_eq!(response_tag, "HeadIsInitializing");
                assert_eq!(response["headId"], "cafe");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(recorder.frames.lock().unwrap().len(), 1);
        assert_eq!(recorder.posts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stalled_fallback_times_out() {
        let app = Router::new().route(
            "/close",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Json(serde_json::json!({ "tag": "Accepted" }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            channel(300).execute(port, ClientCommand::Close),
        )
        .await
        .expect("fallback outlived its budget");

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamTimeout);
    }
}
