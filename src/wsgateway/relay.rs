//! Bidirectional WebSocket relay: dials the backend, shuttles frames both
//! directions, applies per-message rate limiting to the client-to-backend
//! path, and tears the connection down on session invalidation.

use axum::extract::ws::{CloseFrame, Message as AxumMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as TungsteniteCloseFrame;
use tokio_tungstenite::tungstenite::Message as BackendMessage;
use tracing::{debug, warn};

use crate::primitives::clock::Clock;
use crate::ratelimit::model::{EffectiveRateLimit, RateLimitKey};
use crate::ratelimit::provider::ProviderLoader;

/// Close code for a message that exceeded the per-connection rate limit
/// (outside the reserved IANA range).
pub const CLOSE_RATE_LIMITED: u16 = 4429;
/// Close code sent when the backing session was invalidated mid-connection.
pub const CLOSE_SESSION_INVALIDATED: u16 = 4401;

pub struct RelayConfig {
    pub backend_url: String,
    pub message_key: RateLimitKey,
    pub message_limit: EffectiveRateLimit,
    pub session_id: Option<String>,
}

/// Runs until either side closes, the backend is unreachable, the message
/// rate limit is exceeded, or the associated session is invalidated.
pub async fn relay(
    client: WebSocket,
    config: RelayConfig,
    limiter: Arc<ProviderLoader>,
    clock: Arc<dyn Clock>,
    mut invalidations: Option<broadcast::Receiver<String>>,
) {
    let (backend_stream, _response) = match tokio_tungstenite::connect_async(&config.backend_url).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, url = %config.backend_url, "websocket backend dial failed");
            let mut client = client;
            let _ = client.send(close_message(1011, "bad gateway")).await;
            return;
        }
    };

    let (mut client_tx, mut client_rx) = client.split();
    let (mut backend_tx, mut backend_rx) = backend_stream.split();

    loop {
        tokio::select! {
            biased;

            invalidated = async {
                match invalidations.as_mut() {
                    Some(rx) => rx.recv().await.ok(),
                    None => std::future::pending().await,
                }
            } => {
                if let Some(session_id) = invalidated {
                    if config.session_id.as_deref() == Some(session_id.as_str()) {
                        let _ = client_tx.send(close_message(CLOSE_SESSION_INVALIDATED, "session invalidated")).await;
                        break;
                    }
                }
            }

            from_client = client_rx.next() => {
                match from_client {
                    Some(Ok(msg)) => {
                        if is_countable(&msg) {
                            let now = clock.now_epoch_secs_u64();
                            let decision = limiter.check_and_consume(&config.message_key, config.message_limit, now).await;
                            if !decision.allowed {
                                let _ = client_tx.send(close_message(CLOSE_RATE_LIMITED, "message rate limit exceeded")).await;
                                break;
                            }
                        }
                        if matches!(msg, AxumMessage::Close(_)) {
                            let _ = backend_tx.send(BackendMessage::Close(None)).await;
                            break;
                        }
                        if let Err(e) = backend_tx.send(to_backend_message(msg)).await {
                            debug!(error = %e, "backend send failed, closing relay");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "client recv error, closing relay");
                        break;
                    }
                    None => break,
                }
            }

            from_backend = backend_rx.next() => {
                match from_backend {
                    Some(Ok(msg)) => {
                        let close = matches!(msg, BackendMessage::Close(_));
                        if let Err(e) = client_tx.send(to_client_message(msg)).await {
                            debug!(error = %e, "client send failed, closing relay");
                            break;
                        }
                        if close {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "backend recv error, closing relay");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

fn is_countable(msg: &AxumMessage) -> bool {
    matches!(msg, AxumMessage::Text(_) | AxumMessage::Binary(_))
}

fn close_message(code: u16, reason: &str) -> AxumMessage {
    AxumMessage::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}

fn to_backend_message(msg: AxumMessage) -> BackendMessage {
    match msg {
        AxumMessage::Text(t) => BackendMessage::Text(t.as_str().into()),
        AxumMessage::Binary(b) => BackendMessage::Binary(b.to_vec().into()),
        AxumMessage::Ping(p) => BackendMessage::Ping(p.to_vec().into()),
        AxumMessage::Pong(p) => BackendMessage::Pong(p.to_vec().into()),
        AxumMessage::Close(frame) => BackendMessage::Close(frame.map(|f| TungsteniteCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().into(),
        })),
    }
}

fn to_client_message(msg: BackendMessage) -> AxumMessage {
    match msg {
        BackendMessage::Text(t) => AxumMessage::Text(t.as_str().into()),
        BackendMessage::Binary(b) => AxumMessage::Binary(b.to_vec().into()),
        BackendMessage::Ping(p) => AxumMessage::Ping(p.to_vec().into()),
        BackendMessage::Pong(p) => AxumMessage::Pong(p.to_vec().into()),
        BackendMessage::Close(frame) => AxumMessage::Close(frame.map(|f| CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_string().into(),
        })),
        BackendMessage::Frame(_) => AxumMessage::Ping(Vec::new().into()),
    }
}
