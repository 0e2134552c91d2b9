//! Framed TLS listener and per-session loop.
//!
//! Programmatic endpoints speak newline-delimited records over a long-lived
//! TLS stream. The first line after the handshake is the proposed identity;
//! everything after that is one record per line. Each session runs one
//! inbound task (owning the read half) and one writer task (owning the
//! write half and draining the session sink).

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use helphub_proto::constants::{ERROR_ID_TAKEN, ERROR_INVALID_ID};
use helphub_proto::wire::error_frame;
use helphub_proto::{Record, RecordKind};
use helphub_store::Queue;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::relay::{RegisterOutcome, Relay};
use crate::session::{SessionHandle, Transport};

/// Accept loop. Runs until `shutdown` fires.
pub async fn run_listener(
    config: ServerConfig,
    tls_config: Arc<rustls::ServerConfig>,
    relay: Arc<Relay>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(("0.0.0.0", config.framed_port))
        .await
        .map_err(|e| ServerError::Bind {
            listener: "framed",
            port: config.framed_port,
            source: e,
        })?;
    let acceptor = TlsAcceptor::from(tls_config);

    info!(port = config.framed_port, "framed listener accepting secure connections");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let acceptor = acceptor.clone();
                        let relay = relay.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, acceptor, relay).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to accept framed connection");
                    }
                }
            }
        }
    }

    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: std::net::SocketAddr,
    acceptor: TlsAcceptor,
    relay: Arc<Relay>,
) {
    // Handshake completes before any application read.
    let tls = match acceptor.accept(stream).await {
        Ok(tls) => tls,
        Err(e) => {
            info!(peer = %peer, error = %e, "TLS handshake failed");
            return;
        }
    };

    let (read_half, mut write_half) = tokio::io::split(tls);
    let mut lines = BufReader::new(read_half).lines();

    // First line: the proposed identity.
    let identity = match lines.next_line().await {
        Ok(Some(line)) => line.trim().to_string(),
        _ => {
            info!(peer = %peer, "connection closed before identifying");
            return;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let session = SessionHandle::new(identity.clone(), Transport::Framed, tx, cancel.clone());

    match relay.register(&identity, session.clone()) {
        RegisterOutcome::Accepted => {}
        outcome => {
            let reason = match outcome {
                RegisterOutcome::DuplicateId => ERROR_ID_TAKEN,
                _ => ERROR_INVALID_ID,
            };
            warn!(peer = %peer, client_id = %identity, reason, "registration rejected");
            let _ = write_half
                .write_all(format!("{}\n", error_frame(reason)).as_bytes())
                .await;
            let _ = write_half.shutdown().await;
            return;
        }
    }

    // Replay enqueued by register() is already buffered in the sink; the
    // writer drains it before anything this session sends next.
    let writer = tokio::spawn(write_loop(write_half, rx, cancel.clone()));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    session.touch();
                    handle_line(&relay, relay.queue(), &identity, &line);
                }
                Ok(None) => {
                    debug!(client_id = %identity, "peer closed the stream");
                    break;
                }
                Err(e) => {
                    info!(client_id = %identity, error = %e, "connection lost");
                    break;
                }
            }
        }
    }

    // Disconnect cleanup; this path runs exactly once per session.
    relay.unregister(&identity, session.session_id());
    session.close();
    let _ = writer.await;
    info!(client_id = %identity, "client disconnected");
}

/// Dispatch one inbound line. Shared verbatim with the push transport's
/// frame handler.
pub(crate) fn handle_line(relay: &Relay, queue: &Queue, identity: &str, line: &str) {
    let Some(record) = Record::from_wire(line) else {
        warn!(client_id = %identity, payload = %line, "discarding malformed record");
        return;
    };

    if let Err(e) = queue.upsert_last_seen(identity) {
        warn!(client_id = %identity, error = %e, "failed to update client directory");
    }

    match record.kind {
        RecordKind::Heartbeat => {}
        RecordKind::Ack => {
            if let Err(e) = queue.mark_delivered(&record.body) {
                warn!(record_id = %record.body, error = %e, "failed to mark record delivered");
            }
        }
        _ => {
            // Persistence failures are already logged by the relay; the
            // record is dropped rather than half-delivered.
            let _ = relay.route(&record);
        }
    }
}

/// Single writer per session: owns the write half, drains the sink.
async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = rx.recv() => match line {
                Some(line) => {
                    let framed = format!("{line}\n");
                    if writer.write_all(framed.as_bytes()).await.is_err() {
                        // Mark the session dead; the inbound loop observes
                        // the token and runs cleanup.
                        cancel.cancel();
                        break;
                    }
                }
                None => break,
            }
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    use helphub_proto::Priority;

    use crate::msglog::MessageLog;

    fn relay() -> Arc<Relay> {
        let dir = tempdir().unwrap();
        let queue = Arc::new(Queue::in_memory().unwrap());
        let msglog = Arc::new(MessageLog::new(dir.path().join("messages.log")));
        Arc::new(Relay::new(queue, msglog))
    }

    #[test]
    fn heartbeat_line_refreshes_directory_only() {
        let relay = relay();
        let hb = Record::heartbeat("alpha");
        handle_line(&relay, relay.queue(), "alpha", &hb.to_wire());

        assert_eq!(relay.queue().total_count().unwrap(), 0);
        assert!(relay.queue().get_stored(&hb.id).unwrap().is_none());
    }

    #[test]
    fn ack_line_marks_the_referenced_record_delivered() {
        let relay = relay();
        let msg = Record::new(
            RecordKind::Direct,
            "alpha",
            Some("bravo".to_string()),
            "hi",
            Priority::Normal,
        );
        relay.route(&msg).unwrap();

        let ack = Record::ack("bravo", msg.id.clone());
        handle_line(&relay, relay.queue(), "bravo", &ack.to_wire());

        assert!(relay.queue().pending_for("bravo").unwrap().is_empty());
    }

    #[test]
    fn malformed_line_is_discarded() {
        let relay = relay();
        handle_line(&relay, relay.queue(), "alpha", "{\"type\":\"DIRECT\" busted");
        assert_eq!(relay.queue().total_count().unwrap(), 0);
    }

    #[test]
    fn routable_line_is_persisted() {
        let relay = relay();
        let msg = Record::new(
            RecordKind::Direct,
            "alpha",
            Some("bravo".to_string()),
            "hi",
            Priority::Normal,
        );
        handle_line(&relay, relay.queue(), "alpha", &msg.to_wire());
        assert_eq!(relay.queue().pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn write_loop_frames_lines_and_stops_on_channel_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut out = Vec::new();

        tx.send("one".to_string()).unwrap();
        tx.send("two".to_string()).unwrap();
        drop(tx);

        write_loop(&mut out, rx, cancel).await;
        assert_eq!(String::from_utf8(out).unwrap(), "one\ntwo\n");
    }
}
