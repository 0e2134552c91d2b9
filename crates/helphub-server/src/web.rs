//! HTTP listener: static assets for the web client plus the push transport.
//!
//! `/ws` upgrades to a bidirectional socket; every other path is served from
//! the `webapp/` directory. A push session registers with its first frame
//! (any record whose `from` names the desired identity) and from then on is
//! handled exactly like a framed session's inbound loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use helphub_proto::constants::{ERROR_ID_TAKEN, ERROR_INVALID_ID};
use helphub_proto::wire::error_frame;
use helphub_proto::{Record, RecordKind};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::framed::handle_line;
use crate::relay::{RegisterOutcome, Relay};
use crate::session::{SessionHandle, Transport};

#[derive(Clone)]
struct WebState {
    relay: Arc<Relay>,
}

/// Serve HTTP until `shutdown` fires.
pub async fn serve(
    config: ServerConfig,
    relay: Arc<Relay>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let state = WebState { relay };

    let app = axum::Router::new()
        .route("/ws", get(ws_handler))
        .fallback_service(ServeDir::new(&config.webapp_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .map_err(|e| ServerError::Bind {
            listener: "http",
            port: config.http_port,
            source: e,
        })?;

    info!(
        port = config.http_port,
        webapp = %config.webapp_dir.display(),
        "http listener serving web client and push sessions"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(ServerError::Io)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay))
}

async fn handle_socket(socket: WebSocket, relay: Arc<Relay>) {
    let (mut sender, mut receiver) = socket.split();

    // The first parseable frame names the identity.
    let first = match await_first_record(&mut receiver).await {
        Some(first) => first,
        None => return,
    };
    let identity = first.from.trim().to_string();

    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let session = SessionHandle::new(identity.clone(), Transport::Push, tx, cancel.clone());

    match relay.register(&identity, session.clone()) {
        RegisterOutcome::Accepted => {}
        outcome => {
            let reason = match outcome {
                RegisterOutcome::DuplicateId => ERROR_ID_TAKEN,
                _ => ERROR_INVALID_ID,
            };
            warn!(client_id = %identity, reason, "push registration rejected");
            let _ = sender.send(Message::Text(error_frame(reason).into())).await;
            let _ = sender.close().await;
            return;
        }
    }

    // A registration frame that is itself a deliverable record is routed;
    // a pure STATUS ping is not.
    if first.kind != RecordKind::Status {
        handle_line(&relay, relay.queue(), &identity, &first.to_wire());
    }

    let writer = tokio::spawn(write_loop(sender, rx, cancel.clone()));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    session.touch();
                    handle_line(&relay, relay.queue(), &identity, &text);
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(client_id = %identity, "push session closed");
                    break;
                }
                Some(Ok(_)) => {
                    // Pings, pongs, binary: activity, but nothing to parse.
                    session.touch();
                }
                Some(Err(e)) => {
                    info!(client_id = %identity, error = %e, "push session error");
                    break;
                }
            }
        }
    }

    relay.unregister(&identity, session.session_id());
    session.close();
    let _ = writer.await;
    info!(client_id = %identity, "web client disconnected");
}

/// Wait for the identity-bearing first frame, discarding noise.
async fn await_first_record(receiver: &mut SplitStream<WebSocket>) -> Option<Record> {
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => match Record::from_wire(&text) {
                Some(record) => return Some(record),
                None => {
                    warn!(payload = %text, "discarding malformed registration frame");
                }
            },
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                info!(error = %e, "push session failed before registering");
                return None;
            }
        }
    }
}

/// Single writer per push session: owns the socket sink, drains the channel.
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = rx.recv() => match line {
                Some(line) => {
                    if sender.send(Message::Text(line.into())).await.is_err() {
                        cancel.cancel();
                        break;
                    }
                }
                None => break,
            }
        }
    }
    let _ = sender.close().await;
}
