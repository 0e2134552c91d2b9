//! Admin control plane.
//!
//! A plaintext, line-oriented request/response channel for the monitoring
//! dashboard and automation. Each connection carries exactly one request:
//! the first line is the shared-secret password, the second a verb with an
//! optional argument, and the reply is a single line, after which the
//! connection closes. With no `ADMIN_PASSWORD` configured every request is
//! rejected.

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use helphub_proto::constants::{ADMIN_AUTH_FAILED, ADMIN_SENDER};
use helphub_proto::{Priority, Record, RecordKind};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::relay::Relay;

/// Accept loop. Runs until `shutdown` fires.
pub async fn run_listener(
    config: ServerConfig,
    relay: Arc<Relay>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(("0.0.0.0", config.admin_port))
        .await
        .map_err(|e| ServerError::Bind {
            listener: "admin",
            port: config.admin_port,
            source: e,
        })?;

    info!(port = config.admin_port, "admin control plane listening");

    let expected = config.admin_password.clone();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _peer)) => {
                        let relay = relay.clone();
                        let expected = expected.clone();
                        tokio::spawn(async move {
                            handle_request(stream, relay, expected).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to accept admin connection");
                    }
                }
            }
        }
    }

    Ok(())
}

async fn handle_request<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    relay: Arc<Relay>,
    expected: Option<String>,
) {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut lines = BufReader::new(read_half).lines();

    let password = match lines.next_line().await {
        Ok(Some(line)) => line,
        _ => return,
    };

    let authenticated = match expected.as_deref() {
        Some(expected) if !expected.is_empty() => expected == password,
        // Unset or empty secret rejects everything.
        _ => false,
    };
    if !authenticated {
        warn!("admin authentication failed");
        let _ = write_half
            .write_all(format!("{ADMIN_AUTH_FAILED}\n").as_bytes())
            .await;
        return;
    }

    let request = match lines.next_line().await {
        Ok(Some(line)) => line,
        _ => return,
    };

    let response = dispatch(&relay, request.trim());
    let _ = write_half.write_all(format!("{response}\n").as_bytes()).await;
}

#[derive(Serialize)]
struct Stats {
    #[serde(rename = "onlineClients")]
    online_clients: usize,
    #[serde(rename = "pendingMessages")]
    pending_messages: i64,
}

#[derive(Serialize)]
struct ClientEntry {
    #[serde(rename = "clientId")]
    client_id: String,
    #[serde(rename = "type")]
    transport: &'static str,
    #[serde(rename = "lastSeen")]
    last_seen: i64,
}

#[derive(Serialize)]
struct DataResponse {
    stats: Stats,
    clients: Vec<ClientEntry>,
    #[serde(rename = "clientsWithPending")]
    clients_with_pending: Vec<String>,
}

#[derive(Serialize)]
struct PendingEntry {
    from: String,
    priority: String,
    body: String,
}

/// Handle one authenticated request line, producing the reply line.
fn dispatch(relay: &Relay, request: &str) -> String {
    let (verb, arg) = match request.split_once(' ') {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (request, ""),
    };

    match verb {
        "GET_DATA" => get_data(relay),
        "GET_PENDING" if !arg.is_empty() => get_pending(relay, arg),
        "ADMIN_BROADCAST" if !arg.is_empty() => {
            info!(body = %arg, "operator broadcast");
            let record = Record::new(
                RecordKind::Broadcast,
                ADMIN_SENDER,
                None,
                arg,
                Priority::High,
            );
            match relay.route(&record) {
                Ok(()) => "OK".to_string(),
                Err(_) => "ERROR:STORE_FAILED".to_string(),
            }
        }
        "ADMIN_KICK" if !arg.is_empty() => {
            if relay.force_disconnect(arg) {
                "OK".to_string()
            } else {
                "ERROR:NOT_CONNECTED".to_string()
            }
        }
        _ => {
            warn!(request = %request, "unknown admin request");
            "ERROR:UNKNOWN_COMMAND".to_string()
        }
    }
}

fn get_data(relay: &Relay) -> String {
    let clients: Vec<ClientEntry> = relay
        .online_sessions()
        .into_iter()
        .map(|s| ClientEntry {
            client_id: s.identity,
            transport: s.transport.label(),
            last_seen: s.last_activity,
        })
        .collect();

    let response = DataResponse {
        stats: Stats {
            online_clients: clients.len(),
            pending_messages: relay.queue().pending_count().unwrap_or(0),
        },
        clients,
        clients_with_pending: relay
            .queue()
            .identities_with_pending_direct()
            .unwrap_or_default(),
    };

    serde_json::to_string(&response).unwrap_or_else(|_| "ERROR:INTERNAL".to_string())
}

fn get_pending(relay: &Relay, identity: &str) -> String {
    let entries: Vec<PendingEntry> = relay
        .queue()
        .pending_for(identity)
        .unwrap_or_default()
        .into_iter()
        .map(|r| PendingEntry {
            from: r.from,
            priority: r.priority.as_str().to_string(),
            body: r.body,
        })
        .collect();

    serde_json::to_string(&entries).unwrap_or_else(|_| "ERROR:INTERNAL".to_string())
}
