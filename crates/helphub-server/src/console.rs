//! Interactive admin console on standard input.
//!
//! A convenience surface for operators at the server terminal, mirroring a
//! subset of the control plane. Output goes straight to stdout as
//! human-readable tables. The loop runs as a detached task reading stdin
//! line by line, so it never holds up shutdown.

use std::sync::Arc;

use chrono::{Local, TimeZone};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::msglog::MessageLog;
use crate::relay::Relay;

pub fn spawn(relay: Arc<Relay>, msglog: Arc<MessageLog>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => handle_command(&relay, &msglog, &line),
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "admin console read error");
                    break;
                }
            }
        }
        debug!("admin console stopped");
    })
}

fn handle_command(relay: &Relay, msglog: &MessageLog, line: &str) {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else { return };
    let arg = parts.next();

    // Verbs work with or without a leading slash.
    match verb.trim_start_matches('/') {
        "stats" => print_stats(relay),
        "clients" => print_clients(relay),
        "pending" => match arg {
            Some(identity) => print_pending(relay, identity),
            None => println!("Usage: pending <clientId>"),
        },
        "tail" => {
            let count = arg.and_then(|n| n.parse().ok()).unwrap_or(10);
            print_tail(msglog, count);
        }
        "help" => print_help(),
        _ => println!("Unknown command. Type 'help' for a list of commands."),
    }
}

fn print_help() {
    println!("\n--- HelpHub Admin Console Commands ---");
    println!(" stats                  - Show server statistics.");
    println!(" clients                - List all currently connected clients.");
    println!(" pending <clientId>     - List pending messages for a specific client.");
    println!(" tail <n>               - Show the last <n> lines of the message log file.");
    println!(" help                   - Show this help message.");
    println!("--------------------------------------\n");
}

fn print_stats(relay: &Relay) {
    println!("\n--- Server Statistics ---");
    println!(" Online Clients: {}", relay.online_count());
    println!(
        " Pending Messages: {}",
        relay.queue().pending_count().unwrap_or(0)
    );
    println!(
        " Total Messages Stored: {}",
        relay.queue().total_count().unwrap_or(0)
    );
    println!("-------------------------\n");
}

fn print_clients(relay: &Relay) {
    let sessions = relay.online_sessions();
    println!("\n--- Online Clients ({}) ---", sessions.len());
    if sessions.is_empty() {
        println!(" No clients are currently connected.");
    } else {
        println!(" {:<20} | {:<5} | {:<15}", "Client ID", "Type", "Last Activity");
        println!("------------------------------------------------");
        for session in sessions {
            println!(
                " {:<20} | {:<5} | {:<15}",
                session.identity,
                session.transport.label(),
                format_time(session.last_activity)
            );
        }
    }
    println!("------------------------------------------------\n");
}

fn print_pending(relay: &Relay, identity: &str) {
    let pending = relay.queue().pending_for(identity).unwrap_or_default();
    println!(
        "\n--- Pending Messages for '{}' ({}) ---",
        identity,
        pending.len()
    );
    if pending.is_empty() {
        println!(" No pending messages for this client.");
    } else {
        for record in pending {
            println!(
                "  From: {:<15} | Prio: {:<6} | Body: {}",
                record.from, record.priority, record.body
            );
        }
    }
    println!("--------------------------------------------------\n");
}

fn print_tail(msglog: &MessageLog, count: usize) {
    println!(
        "\n--- Last {} Lines of {} ---",
        count,
        msglog.path().display()
    );
    let lines = msglog.tail(count);
    if lines.is_empty() {
        println!(" Log file does not exist yet.");
    } else {
        for line in lines {
            println!("{line}");
        }
    }
    println!("--------------------------------------------------\n");
}

fn format_time(epoch_millis: i64) -> String {
    match Local.timestamp_millis_opt(epoch_millis) {
        chrono::LocalResult::Single(dt) => dt.format("%H:%M:%S").to_string(),
        _ => epoch_millis.to_string(),
    }
}
