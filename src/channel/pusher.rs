use crate::channel::{ChannelError, ChannelId, ChannelState, PushEvent};
use crate::config::PusherConfig;
use crate::event::AppEvent;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

pub const DEFAULT_ACTIVITY_TIMEOUT_SECS: u64 = 120;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ConnectionEstablished {
    socket_id: String,
    #[serde(default)]
    activity_timeout: Option<u64>,
}

/// What the socket loop should do in response to one inbound text frame.
#[derive(Debug, PartialEq)]
pub enum FrameAction {
    Subscribe { activity_timeout: Duration },
    Subscribed,
    Pong,
    Deliver(PushEvent),
    ServerError(String),
    SubscriptionRejected(String),
    Ignore,
}

pub fn subscribe_frame(channel: &ChannelId) -> String {
    json!({"event": "pusher:subscribe", "data": {"channel": channel.as_str()}}).to_string()
}

pub fn unsubscribe_frame(channel: &ChannelId) -> String {
    json!({"event": "pusher:unsubscribe", "data": {"channel": channel.as_str()}}).to_string()
}

pub fn ping_frame() -> String {
    json!({"event": "pusher:ping", "data": {}}).to_string()
}

pub fn pong_frame() -> String {
    json!({"event": "pusher:pong", "data": {}}).to_string()
}

pub fn interpret(text: &str, channel: &ChannelId) -> Result<FrameAction, ChannelError> {
    let frame: RawFrame =
        serde_json::from_str(text).map_err(|err| ChannelError::Frame(err.to_string()))?;

    match frame.event.as_str() {
        "pusher:connection_established" => {
            let established: ConnectionEstablished = match &frame.data {
                Value::String(encoded) => serde_json::from_str(encoded),
                other => ConnectionEstablished::deserialize(other),
            }
            .map_err(|err| ChannelError::Frame(err.to_string()))?;
            debug!(socket_id = %established.socket_id, "pusher connection established");
            let secs = established
                .activity_timeout
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_ACTIVITY_TIMEOUT_SECS);
            Ok(FrameAction::Subscribe {
                activity_timeout: Duration::from_secs(secs),
            })
        }
        "pusher_internal:subscription_succeeded" => Ok(FrameAction::Subscribed),
        "pusher:ping" => Ok(FrameAction::Pong),
        "pusher:pong" => Ok(FrameAction::Ignore),
        "pusher:error" => Ok(FrameAction::ServerError(error_message(&frame.data, "message"))),
        "pusher:subscription_error" => Ok(FrameAction::SubscriptionRejected(error_message(
            &frame.data,
            "error",
        ))),
        name if name.starts_with("pusher") => Ok(FrameAction::Ignore),
        name => {
            if frame.channel.as_deref() != Some(channel.as_str()) {
                debug!(event = name, channel = ?frame.channel, "event for another channel");
                return Ok(FrameAction::Ignore);
            }
            match PushEvent::decode(name, &frame.data)? {
                Some(event) => Ok(FrameAction::Deliver(event)),
                None => Ok(FrameAction::Ignore),
            }
        }
    }
}

/// Reads `field` from a control frame's data, which may itself be a JSON
/// string. Falls back to the raw data.
fn error_message(data: &Value, field: &str) -> String {
    let decoded = match data {
        Value::String(encoded) => serde_json::from_str(encoded).unwrap_or_else(|_| data.clone()),
        other => other.clone(),
    };
    decoded
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| match &decoded {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
}

/// A live subscription task. Dropping it tears the socket down.
pub struct Subscription {
    channel_id: ChannelId,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn spawn(
        runtime: &tokio::runtime::Handle,
        config: PusherConfig,
        channel_id: ChannelId,
        tx: mpsc::Sender<AppEvent>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = runtime.spawn(run(config, channel_id.clone(), tx, shutdown_rx));
        Self {
            channel_id,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Asks the task to unsubscribe and close. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            info!(channel = %self.channel_id, "closing push channel");
            if shutdown.send(()).is_err() {
                self.task.abort();
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

fn report(tx: &mpsc::Sender<AppEvent>, channel_id: &ChannelId, state: ChannelState) {
    let _ = tx.send(AppEvent::ChannelState {
        channel_id: channel_id.clone(),
        state,
    });
}

fn fault(tx: &mpsc::Sender<AppEvent>, channel_id: &ChannelId, message: String) {
    let _ = tx.send(AppEvent::ChannelFault {
        channel_id: channel_id.clone(),
        message,
    });
}

/// How one socket connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Shutdown,
    Reconnect { immediate: bool },
    Stop,
}

/// Pusher close codes: 4000-4099 must not reconnect, 4200-4299 reconnect
/// straight away, everything else reconnects after a backoff.
fn close_outcome(code: Option<u16>) -> Outcome {
    match code {
        Some(4000..=4099) => Outcome::Stop,
        Some(4200..=4299) => Outcome::Reconnect { immediate: true },
        _ => Outcome::Reconnect { immediate: false },
    }
}

fn backoff(attempt: u32) -> Duration {
    let secs = 1u64 << attempt.min(5);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

async fn run(
    config: PusherConfig,
    channel_id: ChannelId,
    tx: mpsc::Sender<AppEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    if config.key.trim().is_empty() && config.socket_url.is_none() {
        report(&tx, &channel_id, ChannelState::Failed);
        fault(
            &tx,
            &channel_id,
            "push channel key is not configured (set CODELOOM_PUSHER_KEY)".to_string(),
        );
        return;
    }

    let url = config.resolved_socket_url();
    let mut attempt = 0u32;
    loop {
        report(&tx, &channel_id, ChannelState::Connecting);
        info!(channel = %channel_id, %url, attempt, "opening push channel");

        let outcome =
            connect_once(&url, &config, &channel_id, &tx, &mut shutdown, &mut attempt).await;
        let delay = match outcome {
            Outcome::Shutdown => {
                report(&tx, &channel_id, ChannelState::Disconnected);
                return;
            }
            Outcome::Stop => return,
            Outcome::Reconnect { immediate: true } => Duration::ZERO,
            Outcome::Reconnect { immediate: false } => backoff(attempt),
        };
        attempt = attempt.saturating_add(1);

        report(&tx, &channel_id, ChannelState::Disconnected);
        debug!(channel = %channel_id, delay_ms = delay.as_millis() as u64, "reconnecting push channel");
        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = &mut shutdown => return,
        }
    }
}

/// Drives one websocket connection until it ends. `attempt` is reset once
/// the subscription is confirmed.
async fn connect_once(
    url: &str,
    config: &PusherConfig,
    channel_id: &ChannelId,
    tx: &mpsc::Sender<AppEvent>,
    shutdown: &mut oneshot::Receiver<()>,
    attempt: &mut u32,
) -> Outcome {
    let connected = tokio::select! {
        result = connect_async(url) => result,
        _ = &mut *shutdown => return Outcome::Shutdown,
    };
    let socket = match connected {
        Ok((socket, _response)) => socket,
        Err(err) => {
            warn!(channel = %channel_id, error = %err, "push channel connect failed");
            fault(tx, channel_id, format!("failed to connect push channel: {err}"));
            return Outcome::Reconnect { immediate: false };
        }
    };

    let (mut sink, mut stream) = socket.split();
    let mut period = Duration::from_secs(DEFAULT_ACTIVITY_TIMEOUT_SECS);
    let mut keepalive = time::interval_at(Instant::now() + period, period);
    let mut pong_deadline: Option<Instant> = None;

    loop {
        let deadline = pong_deadline;
        tokio::select! {
            _ = &mut *shutdown => {
                let _ = sink.send(Message::Text(unsubscribe_frame(channel_id))).await;
                let _ = sink.close().await;
                return Outcome::Shutdown;
            }
            _ = keepalive.tick() => {
                if let Err(err) = sink.send(Message::Text(ping_frame())).await {
                    warn!(channel = %channel_id, error = %err, "keep-alive ping failed");
                    return Outcome::Reconnect { immediate: false };
                }
                if pong_deadline.is_none() {
                    pong_deadline = Some(Instant::now() + config.pong_timeout());
                }
            }
            _ = async {
                match deadline {
                    Some(deadline) => time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                warn!(channel = %channel_id, "no pong after keep-alive ping");
                fault(tx, channel_id, "push channel stopped answering pings".to_string());
                let _ = sink.close().await;
                return Outcome::Reconnect { immediate: true };
            }
            frame = stream.next() => {
                keepalive.reset();
                pong_deadline = None;
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(close))) => {
                        let code = close.as_ref().map(|close| u16::from(close.code));
                        info!(channel = %channel_id, ?code, "push channel closed by server");
                        let outcome = close_outcome(code);
                        if outcome == Outcome::Stop {
                            report(tx, channel_id, ChannelState::Failed);
                            fault(
                                tx,
                                channel_id,
                                    format!(
                                    "push service closed the connection ({})",
                                    code.unwrap_or_default()
                                ),
                            );
                        }
                        return outcome;
                    }
                    None => {
                        info!(channel = %channel_id, "push channel stream ended");
                        return Outcome::Reconnect { immediate: false };
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!(channel = %channel_id, error = %err, "push channel read failed");
                        fault(tx, channel_id, ChannelError::from(err).to_string());
                        return Outcome::Reconnect { immediate: false };
                    }
                };

                match interpret(&text, channel_id) {
                    Ok(FrameAction::Subscribe { activity_timeout }) => {
                        if activity_timeout != period {
                            period = activity_timeout;
                            keepalive = time::interval_at(Instant::now() + period, period);
                        }
                        if let Err(err) = sink.send(Message::Text(subscribe_frame(channel_id))).await {
                            fault(tx, channel_id, format!("failed to subscribe: {err}"));
                            return Outcome::Reconnect { immediate: false };
                        }
                    }
                    Ok(FrameAction::Subscribed) => {
                        info!(channel = %channel_id, "push channel subscribed");
                        *attempt = 0;
                        report(tx, channel_id, ChannelState::Connected);
                    }
                    Ok(FrameAction::Pong) => {
                        let _ = sink.send(Message::Text(pong_frame())).await;
                    }
                    Ok(FrameAction::Deliver(event)) => {
                        debug!(channel = %channel_id, event = event.name(), "push event");
                        if tx
                            .send(AppEvent::Push {
                                channel_id: channel_id.clone(),
                                event,
                            })
                            .is_err()
                        {
                            return Outcome::Stop;
                        }
                    }
                    Ok(FrameAction::ServerError(message)) => {
                        warn!(channel = %channel_id, %message, "push service reported an error");
                        fault(tx, channel_id, format!("push service error: {message}"));
                    }
                    Ok(FrameAction::SubscriptionRejected(message)) => {
                        warn!(channel = %channel_id, %message, "subscription rejected");
                        report(tx, channel_id, ChannelState::Failed);
                        fault(tx, channel_id, format!("subscription rejected: {message}"));
                        let _ = sink.close().await;
                        return Outcome::Stop;
                    }
                    Ok(FrameAction::Ignore) => {}
                    Err(err) => {
                        warn!(channel = %channel_id, error = %err, "dropping push frame");
                        fault(tx, channel_id, err.to_string());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::CodeChunk;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::{accept_async, WebSocketStream};

    fn channel() -> ChannelId {
        ChannelId::new("user-1")
    }

    fn chunk_frame(content: &str) -> String {
        json!({
            "event": "code-chunk",
            "channel": "user-1",
            "data": json!({"filePath": "a.rs", "content": content}).to_string(),
        })
        .to_string()
    }

    async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> Option<String> {
        while let Some(message) = ws.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
        None
    }

    /// Server half of connect + subscribe for `user-1`.
    async fn handshake(ws: &mut WebSocketStream<TcpStream>, activity_timeout: u64) {
        let established = json!({
            "event": "pusher:connection_established",
            "data": json!({"socket_id": "1.1", "activity_timeout": activity_timeout}).to_string(),
        });
        ws.send(Message::Text(established.to_string()))
            .await
            .expect("established frame should send");
        let subscribe = next_text(ws).await.expect("client should subscribe");
        assert!(subscribe.contains("pusher:subscribe"));
        assert!(subscribe.contains("user-1"));
        let succeeded = json!({
            "event": "pusher_internal:subscription_succeeded",
            "channel": "user-1",
            "data": "{}",
        });
        ws.send(Message::Text(succeeded.to_string()))
            .await
            .expect("subscription ack should send");
    }

    fn wait_for(
        rx: &mpsc::Receiver<AppEvent>,
        mut done: impl FnMut(&AppEvent) -> bool,
    ) -> Vec<AppEvent> {
        let mut seen = Vec::new();
        loop {
            let event = rx
                .recv_timeout(Duration::from_secs(10))
                .expect("channel event should arrive");
            let finished = done(&event);
            seen.push(event);
            if finished {
                return seen;
            }
        }
    }

    fn local_config(addr: std::net::SocketAddr, pong_timeout_secs: u64) -> PusherConfig {
        PusherConfig {
            key: "k".to_string(),
            socket_url: Some(format!("ws://{addr}/app/k")),
            pong_timeout_secs,
            ..PusherConfig::default()
        }
    }

    #[test]
    fn socket_loop_reconnects_and_unsubscribes_on_shutdown() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime should start");
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have an address");

        let server = runtime.spawn(async move {
            let (tcp, _) = listener.accept().await.expect("client should connect");
            let mut ws = accept_async(tcp).await.expect("websocket handshake should succeed");
            handshake(&mut ws, 120).await;
            ws.send(Message::Text(chunk_frame("first")))
                .await
                .expect("chunk should send");
            ws.close(Some(CloseFrame {
                code: CloseCode::from(4200),
                reason: "reconnect".into(),
            }))
            .await
            .expect("close should send");
            while next_text(&mut ws).await.is_some() {}

            let (tcp, _) = listener.accept().await.expect("client should reconnect");
            let mut ws = accept_async(tcp).await.expect("websocket handshake should succeed");
            handshake(&mut ws, 120).await;
            ws.send(Message::Text(chunk_frame("second")))
                .await
                .expect("chunk should send");
            next_text(&mut ws).await
        });

        let (tx, rx) = mpsc::channel();
        let mut subscription =
            Subscription::spawn(runtime.handle(), local_config(addr, 30), channel(), tx);

        let mut chunks = Vec::new();
        let mut connected = 0;
        wait_for(&rx, |event| {
            match event {
                AppEvent::Push {
                    event: PushEvent::CodeChunk(chunk),
                    ..
                } => chunks.push(chunk.content.clone()),
                AppEvent::ChannelState {
                    state: ChannelState::Connected,
                    ..
                } => connected += 1,
                _ => {}
            }
            chunks.len() == 2
        });
        assert_eq!(chunks, vec!["first", "second"]);
        assert_eq!(connected, 2);

        subscription.close();
        wait_for(&rx, |event| {
            matches!(
                event,
                AppEvent::ChannelState {
                    state: ChannelState::Disconnected,
                    ..
                }
            )
        });
        let last = runtime
            .block_on(server)
            .expect("server task should finish");
        assert!(last.is_some_and(|text| text.contains("pusher:unsubscribe")));
    }

    #[test]
    fn silent_server_is_dropped_after_the_pong_deadline() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime should start");
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have an address");

        let server = runtime.spawn(async move {
            let (tcp, _) = listener.accept().await.expect("client should connect");
            let mut ws = accept_async(tcp).await.expect("websocket handshake should succeed");
            handshake(&mut ws, 1).await;
            let mut pings = 0;
            while let Some(text) = next_text(&mut ws).await {
                if text.contains("pusher:ping") {
                    pings += 1;
                }
            }

            let (tcp, _) = listener.accept().await.expect("client should reconnect");
            let mut ws = accept_async(tcp).await.expect("websocket handshake should succeed");
            handshake(&mut ws, 120).await;
            next_text(&mut ws).await;
            pings
        });

        let (tx, rx) = mpsc::channel();
        let mut subscription =
            Subscription::spawn(runtime.handle(), local_config(addr, 1), channel(), tx);

        let seen = wait_for(&rx, |event| {
            matches!(event, AppEvent::ChannelFault { message, .. } if message.contains("answering pings"))
        });
        assert!(seen.iter().any(|event| matches!(
            event,
            AppEvent::ChannelState {
                state: ChannelState::Connected,
                ..
            }
        )));
        wait_for(&rx, |event| {
            matches!(
                event,
                AppEvent::ChannelState {
                    state: ChannelState::Connected,
                    ..
                }
            )
        });

        subscription.close();
        let pings = runtime
            .block_on(server)
            .expect("server task should finish");
        assert!(pings >= 1);
    }

    #[test]
    fn close_codes_pick_the_reconnect_policy() {
        assert_eq!(close_outcome(Some(4001)), Outcome::Stop);
        assert_eq!(close_outcome(Some(4201)), Outcome::Reconnect { immediate: true });
        assert_eq!(close_outcome(Some(4100)), Outcome::Reconnect { immediate: false });
        assert_eq!(close_outcome(Some(1006)), Outcome::Reconnect { immediate: false });
        assert_eq!(close_outcome(None), Outcome::Reconnect { immediate: false });
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        assert_eq!(backoff(0), Duration::from_secs(1));
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(4), Duration::from_secs(16));
        assert_eq!(backoff(5), MAX_BACKOFF);
        assert_eq!(backoff(40), MAX_BACKOFF);
    }

    #[test]
    fn subscription_error_is_a_rejection() {
        let text = r#"{"event":"pusher:subscription_error","channel":"user-1","data":"{\"type\":\"AuthError\",\"error\":\"Unable to authenticate\",\"status\":401}"}"#;
        let action = interpret(text, &channel()).expect("frame should parse");
        assert_eq!(
            action,
            FrameAction::SubscriptionRejected("Unable to authenticate".to_string())
        );
    }

    #[test]
    fn connection_established_requests_subscription() {
        let text = r#"{"event":"pusher:connection_established","data":"{\"socket_id\":\"1.2\",\"activity_timeout\":30}"}"#;
        let action = interpret(text, &channel()).expect("frame should parse");
        assert_eq!(
            action,
            FrameAction::Subscribe {
                activity_timeout: Duration::from_secs(30)
            }
        );
    }

    #[test]
    fn missing_activity_timeout_uses_default() {
        let text = r#"{"event":"pusher:connection_established","data":{"socket_id":"1.2"}}"#;
        let action = interpret(text, &channel()).expect("frame should parse");
        assert_eq!(
            action,
            FrameAction::Subscribe {
                activity_timeout: Duration::from_secs(DEFAULT_ACTIVITY_TIMEOUT_SECS)
            }
        );
    }

    #[test]
    fn ping_is_answered() {
        let action = interpret(r#"{"event":"pusher:ping","data":{}}"#, &channel())
            .expect("frame should parse");
        assert_eq!(action, FrameAction::Pong);
    }

    #[test]
    fn channel_events_are_delivered() {
        let text = r#"{"event":"code-chunk","channel":"user-1","data":"{\"filePath\":\"a.rs\",\"content\":\"x\"}"}"#;
        let action = interpret(text, &channel()).expect("frame should parse");
        assert_eq!(
            action,
            FrameAction::Deliver(PushEvent::CodeChunk(CodeChunk {
                file_path: Some("a.rs".to_string()),
                content: "x".to_string(),
            }))
        );
    }

    #[test]
    fn events_for_other_channels_are_ignored() {
        let text = r#"{"event":"code-chunk","channel":"user-2","data":"{\"filePath\":\"a.rs\",\"content\":\"x\"}"}"#;
        let action = interpret(text, &channel()).expect("frame should parse");
        assert_eq!(action, FrameAction::Ignore);
    }

    #[test]
    fn server_errors_carry_their_message() {
        let text = r#"{"event":"pusher:error","data":{"message":"Over quota","code":4004}}"#;
        let action = interpret(text, &channel()).expect("frame should parse");
        assert_eq!(action, FrameAction::ServerError("Over quota".to_string()));
    }

    #[test]
    fn garbage_is_a_frame_error() {
        assert!(matches!(
            interpret("not json", &channel()),
            Err(ChannelError::Frame(_))
        ));
    }

    #[test]
    fn control_frames_name_the_channel() {
        let subscribe: Value =
            serde_json::from_str(&subscribe_frame(&channel())).expect("frame should be json");
        assert_eq!(subscribe["event"], "pusher:subscribe");
        assert_eq!(subscribe["data"]["channel"], "user-1");
        let unsubscribe: Value =
            serde_json::from_str(&unsubscribe_frame(&channel())).expect("frame should be json");
        assert_eq!(unsubscribe["event"], "pusher:unsubscribe");
    }
}
