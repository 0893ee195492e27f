//! WebSocket handler.

use std::net::SocketAddr;

use axum::extract::{
    ws::{Message, WebSocket, WebSocketUpgrade},
    ConnectInfo, State,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use uuid::Uuid;

use shared::{decode_frame, Inbound, WsMessage};

use crate::api::AppState;
use crate::relay::{self, BroadcastMessage};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

/// Forward every broadcast to this socket and feed its inbound frames to the
/// relay until the peer goes away.
async fn handle_socket(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Subscribe before anything can be read so a requester sees its own play.
    let mut rx = state.relay.subscribe();
    let conn_id = state.relay.register_connection();
    tracing::info!(
        %conn_id,
        %peer,
        connections = state.relay.connection_count(),
        "client connected"
    );

    let ping_every = Duration::from_secs(state.config.ping_interval_secs);
    let mut ping_interval = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let forward = tokio::spawn(async move {
        loop {
            tokio::select! {
                recv = rx.recv() => {
                    let msg = match recv {
                        Ok(m) => m,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(%conn_id, skipped, "client lagging, broadcasts skipped");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    let json = match msg {
                        BroadcastMessage::Play(directive) => WsMessage::Play(directive).encode(),
                    };
                    match json {
                        Ok(j) => {
                            if ws_tx.send(Message::Text(j.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::error!(%conn_id, error = %e, "encode broadcast failed"),
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(t)) => handle_frame(&state, conn_id, t.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "socket error");
                break;
            }
        }
    }

    forward.abort();
    let client_id = state.relay.unregister_connection(conn_id);
    tracing::info!(
        %conn_id,
        client_id = client_id.as_ref().map(|c| c.as_str()).unwrap_or("-"),
        connections = state.relay.connection_count(),
        "client disconnected"
    );
}

fn handle_frame(state: &AppState, conn_id: Uuid, text: &str) {
    tracing::debug!(%conn_id, frame = text, "frame received");
    match decode_frame(text) {
        Ok(Inbound::Message(WsMessage::Hello(hello))) => {
            tracing::info!(
                %conn_id,
                client_id = %hello.client_id,
                clock_offset_ms = hello.ts.saturating_sub(relay::now_ms()),
                "hello"
            );
            state.relay.identify(conn_id, hello.client_id);
        }
        Ok(Inbound::Message(WsMessage::RequestPlay(req))) => {
            tracing::info!(%conn_id, client_id = %req.client_id, "request_play");
            if let Some(announced) = state.relay.client_of(conn_id) {
                if announced != req.client_id {
                    tracing::warn!(
                        %conn_id,
                        announced = %announced,
                        requested = %req.client_id,
                        "request_play id differs from hello"
                    );
                }
            }
            state.relay.request_play(req.client_id, relay::now_ms());
        }
        Ok(Inbound::Message(other)) => {
            tracing::warn!(%conn_id, kind = other.kind(), "ignoring relay-bound message from client");
        }
        Ok(Inbound::Unknown(kind)) => {
            tracing::info!(%conn_id, kind = %kind, "ignoring unknown message type");
        }
        Err(e) => {
            tracing::warn!(%conn_id, error = %e, "dropping malformed frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::{router, AppState};
    use crate::config::Config;
    use crate::relay::{self, RelayState};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures_util::{SinkExt, StreamExt};
    use http_body_util::BodyExt;
    use shared::{decode_frame, ClientIdentity, Inbound, PlayDirective, WsMessage};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as TMessage;
    use tower::ServiceExt;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn spawn_relay(config: Config) -> (SocketAddr, Arc<RelayState>) {
        let state = AppState::new(config);
        let relay = state.relay.clone();
        let app = router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        (addr, relay)
    }

    async fn connect(addr: SocketAddr, path: &str) -> Ws {
        let url = format!("ws://{}{}", addr, path);
        let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        ws
    }

    async fn wait_for_connections(relay: &RelayState, n: usize) {
        for _ in 0..200 {
            if relay.connection_count() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("relay never reached {} connections", n);
    }

    async fn send(ws: &mut Ws, frame: &str) {
        ws.send(TMessage::Text(frame.to_string())).await.unwrap();
    }

    async fn request_play(ws: &mut Ws, client_id: &str) {
        let frame = serde_json::json!({
            "type": "request_play",
            "clientId": client_id,
            "clientTime": relay::now_ms(),
        });
        send(ws, &frame.to_string()).await;
    }

    async fn next_play(ws: &mut Ws) -> PlayDirective {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for play")
                .expect("socket closed")
                .expect("socket error");
            if let TMessage::Text(t) = msg {
                match decode_frame(&t).unwrap() {
                    Inbound::Message(WsMessage::Play(d)) => return d,
                    other => panic!("unexpected frame: {:?}", other),
                }
            }
        }
    }

    fn test_config(start_skew_ms: i64, coalesce_requests: bool) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            start_skew_ms,
            coalesce_requests,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = router(AppState::new(Config::default()));
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn request_play_is_broadcast_to_requester_and_listeners() {
        let (addr, relay) = spawn_relay(test_config(500, true)).await;
        let mut a = connect(addr, "/ws").await;
        let mut b = connect(addr, "/").await;
        wait_for_connections(&relay, 2).await;

        send(&mut a, r#"{"type":"hello","clientId":"client-a","ts":0}"#).await;
        let before = relay::now_ms();
        request_play(&mut a, "client-a").await;

        let to_a = next_play(&mut a).await;
        let to_b = next_play(&mut b).await;
        let after = relay::now_ms();

        assert_eq!(to_a, to_b);
        assert_eq!(to_a.origin.as_str(), "client-a");
        assert!(to_a.start_at - before >= 500, "start must be at least skew ahead");
        assert!(to_a.start_at - after <= 500, "start must not exceed now + skew");
    }

    #[tokio::test]
    async fn racing_requests_converge_on_one_start() {
        let (addr, relay) = spawn_relay(test_config(5_000, true)).await;
        let mut a = connect(addr, "/ws").await;
        let mut b = connect(addr, "/ws").await;
        wait_for_connections(&relay, 2).await;

        request_play(&mut a, "client-a").await;
        request_play(&mut b, "client-b").await;

        let a1 = next_play(&mut a).await;
        let a2 = next_play(&mut a).await;
        let b1 = next_play(&mut b).await;
        let b2 = next_play(&mut b).await;
        for d in [&a2, &b1, &b2] {
            assert_eq!(d.start_at, a1.start_at);
        }
        let mut origins = vec![a1.origin.to_string(), a2.origin.to_string()];
        origins.sort();
        assert_eq!(origins, vec!["client-a", "client-b"]);
    }

    #[tokio::test]
    async fn unknown_and_malformed_frames_keep_connection_open() {
        let (addr, relay) = spawn_relay(test_config(100, true)).await;
        let mut a = connect(addr, "/ws").await;
        wait_for_connections(&relay, 1).await;

        send(&mut a, "definitely not json").await;
        send(&mut a, r#"{"type":"pause","at":1}"#).await;
        send(&mut a, r#"{"type":"request_play"}"#).await;
        send(&mut a, r#"{"type":"play","startAt":1,"origin":"spoof"}"#).await;
        request_play(&mut a, "client-a").await;

        let d = next_play(&mut a).await;
        assert_eq!(d.origin.as_str(), "client-a");
        assert_eq!(relay.connection_count(), 1);
    }

    #[tokio::test]
    async fn hello_identifies_connection_and_close_unregisters() {
        let (addr, relay) = spawn_relay(test_config(100, true)).await;
        let mut a = connect(addr, "/ws").await;
        wait_for_connections(&relay, 1).await;
        send(&mut a, r#"{"type":"hello","clientId":"client-a","ts":0}"#).await;

        let conn_id = relay.connection_ids()[0];
        let mut identified = None;
        for _ in 0..200 {
            identified = relay.client_of(conn_id);
            if identified.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(identified, Some(ClientIdentity::new("client-a")));

        a.close(None).await.unwrap();
        wait_for_connections(&relay, 0).await;
        assert_eq!(relay.client_of(conn_id), None);
    }

    #[test]
    fn extreme_timestamps_are_logged_without_overflow() {
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_test_writer()
                .finish(),
        );
        let state = AppState::new(test_config(100, true));
        let conn_id = state.relay.register_connection();

        super::handle_frame(
            &state,
            conn_id,
            r#"{"type":"hello","clientId":"client-a","ts":-9223372036854775808}"#,
        );
        assert_eq!(
            state.relay.client_of(conn_id),
            Some(ClientIdentity::new("client-a"))
        );
        super::handle_frame(
            &state,
            conn_id,
            r#"{"type":"hello","clientId":"client-a","ts":9223372036854775807}"#,
        );
        assert_eq!(state.relay.connection_count(), 1);
    }

    #[test]
    fn request_play_with_other_id_than_hello_is_still_served() {
        let state = AppState::new(test_config(100, true));
        let mut rx = state.relay.subscribe();
        let conn_id = state.relay.register_connection();
        super::handle_frame(&state, conn_id, r#"{"type":"hello","clientId":"client-a","ts":0}"#);
        super::handle_frame(
            &state,
            conn_id,
            r#"{"type":"request_play","clientId":"client-b","clientTime":0}"#,
        );
        let crate::relay::BroadcastMessage::Play(d) = rx.try_recv().unwrap();
        assert_eq!(d.origin.as_str(), "client-b");
    }
}
