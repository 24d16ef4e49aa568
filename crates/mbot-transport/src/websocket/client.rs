//! Websocket event source.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

use mbot_core::model::event_type;
use mbot_core::{
    EventSink, EventSource, RemoteApi, Subscription, TransportError, TransportResult,
    WebSocketEvent,
};

use crate::API_PATH;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// [`EventSource`] over the server's websocket.
///
/// Every [`subscribe`](EventSource::subscribe) opens a new connection,
/// authenticates it with the current session token and streams the events
/// it receives. A lost connection ends the subscription; there is no
/// automatic reconnect.
pub struct WsEventSource {
    url: String,
    api: Arc<dyn RemoteApi>,
}

impl WsEventSource {
    /// Creates a source for the websocket base URL `ws_url`, e.g.
    /// `wss://chat.example.com`. The session token is taken from `api`.
    pub fn new(ws_url: &str, api: Arc<dyn RemoteApi>) -> Self {
        Self {
            url: format!("{}{API_PATH}/websocket", ws_url.trim_end_matches('/')),
            api,
        }
    }

    /// Full websocket endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventSource for WsEventSource {
    async fn subscribe(&self) -> TransportResult<Subscription> {
        let token = self.api.auth_token().ok_or(TransportError::MissingToken)?;

        debug!(url = %self.url, "Connecting to event stream");
        let (ws_stream, _response) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    url: self.url.clone(),
                    reason: format!("WebSocket connection failed: {e}"),
                })?;
        let (mut ws_tx, ws_rx) = ws_stream.split();

        let challenge = json!({
            "seq": 1,
            "action": "authentication_challenge",
            "data": { "token": token },
        });
        ws_tx
            .send(Message::Text(challenge.to_string().into()))
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                url: self.url.clone(),
                reason: format!("authentication challenge failed: {e}"),
            })?;

        info!(url = %self.url, "Event stream connected");

        let (sink, subscription) = Subscription::channel();
        tokio::spawn(run_stream(ws_tx, ws_rx, sink, self.url.clone()));
        Ok(subscription)
    }
}

/// Pumps frames into `sink` until the connection or the subscriber goes.
async fn run_stream(mut ws_tx: WsSink, mut ws_rx: WsSource, sink: EventSink, url: String) {
    loop {
        tokio::select! {
            _ = sink.closed() => {
                debug!(url = %url, "Subscription closed, disconnecting");
                let _ = ws_tx.close().await;
                break;
            }

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_frame(text.as_str()) {
                        if event.event == event_type::HELLO {
                            debug!(url = %url, "Event stream ready");
                        }
                        trace!(event = %event.event, seq = event.seq, "Event received");
                        if !sink.send(Arc::new(event)) {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = ws_tx.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!(url = %url, frame = ?frame, "Event stream closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(url = %url, error = %e, "Event stream connection lost");
                    break;
                }
                None => {
                    warn!(url = %url, "Event stream ended");
                    break;
                }
            },
        }
    }
}

/// Parses a text frame. Replies to our own requests (`seq_reply`) are
/// logged and skipped; only frames with an `event` tag become events.
fn parse_frame(text: &str) -> Option<WebSocketEvent> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Unparseable frame on event stream");
            return None;
        }
    };

    if value.get("event").is_none() {
        let status = value.get("status").and_then(Value::as_str).unwrap_or("");
        if status != "OK" {
            warn!(reply = %value, "Request on event stream failed");
        } else {
            trace!(reply = %value, "Reply received");
        }
        return None;
    }

    match serde_json::from_value(value) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Malformed event frame");
            None
        }
    }
}

impl std::fmt::Debug for WsEventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsEventSource")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
    use axum::routing::get;
    use mbot_core::{ApiResult, Channel, NewPost, Post, Team, User};

    use super::*;

    struct TokenOnly(Option<String>);

    #[async_trait]
    impl RemoteApi for TokenOnly {
        async fn ping(&self) -> ApiResult<()> {
            Ok(())
        }
        async fn login(&self, _: &str, _: &str) -> ApiResult<User> {
            Ok(User::default())
        }
        fn auth_token(&self) -> Option<String> {
            self.0.clone()
        }
        async fn update_user(&self, user: &User) -> ApiResult<User> {
            Ok(user.clone())
        }
        async fn team_by_name(&self, _: &str) -> ApiResult<Team> {
            Ok(Team::default())
        }
        async fn channel_by_name(&self, _: &str, _: &str) -> ApiResult<Option<Channel>> {
            Ok(None)
        }
        async fn create_channel(&self, _: &str, _: &str, _: &str) -> ApiResult<Channel> {
            Ok(Channel::default())
        }
        async fn add_channel_member(&self, _: &str, _: &str) -> ApiResult<()> {
            Ok(())
        }
        async fn create_post(&self, _: &NewPost) -> ApiResult<Post> {
            Ok(Post::default())
        }
        async fn direct_channel(&self, _: &str, _: &str) -> ApiResult<Channel> {
            Ok(Channel::default())
        }
    }

    async fn serve(mut socket: WebSocket) {
        // Expect the challenge first and only answer a valid one.
        let Some(Ok(AxumMessage::Text(text))) = socket.recv().await else {
            return;
        };
        let challenge: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(challenge["action"], "authentication_challenge");
        assert_eq!(challenge["data"]["token"], "tok");

        let frames = [
            json!({"status": "OK", "seq_reply": 1}),
            json!({"event": "hello", "data": {}, "broadcast": {}, "seq": 0}),
            json!({"event": "posted", "data": {"post": "{\"message\":\"hi\"}"}, "broadcast": {}, "seq": 1}),
        ];
        for frame in frames {
            if socket
                .send(AxumMessage::Text(frame.to_string().into()))
                .await
                .is_err()
            {
                return;
            }
        }
        let _ = socket.send(AxumMessage::Close(None)).await;
    }

    async fn fake_server() -> SocketAddr {
        let app = Router::new().route(
            "/api/v4/websocket",
            get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(serve) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_parse_frame() {
        assert!(parse_frame(r#"{"status":"OK","seq_reply":1}"#).is_none());
        assert!(parse_frame("not json").is_none());
        let event = parse_frame(r#"{"event":"typing","data":{},"broadcast":{},"seq":3}"#).unwrap();
        assert_eq!(event.event, "typing");
        assert_eq!(event.seq, 3);
    }

    #[tokio::test]
    async fn test_subscribe_requires_token() {
        let source = WsEventSource::new("ws://127.0.0.1:1", Arc::new(TokenOnly(None)));
        assert!(matches!(
            source.subscribe().await,
            Err(TransportError::MissingToken)
        ));
    }

    #[tokio::test]
    async fn test_stream_delivers_events_then_ends() {
        let addr = fake_server().await;
        let api = Arc::new(TokenOnly(Some("tok".to_string())));
        let source = WsEventSource::new(&format!("ws://{addr}/"), api);
        assert_eq!(source.url(), format!("ws://{addr}/api/v4/websocket"));

        let mut sub = source.subscribe().await.unwrap();
        let hello = sub.next().await.unwrap();
        assert_eq!(hello.event, event_type::HELLO);
        let posted = sub.next().await.unwrap();
        assert!(posted.is_posted());
        assert_eq!(posted.decode_post().unwrap().message, "hi");
        assert!(sub.next().await.is_none());
    }
}
