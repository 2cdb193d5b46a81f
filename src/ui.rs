/// Console output helpers
///
/// Small formatting helpers shared by the CLI subcommands: headers, key/value pairs,
/// tables, and colored status lines. Kept deliberately plain — no progress bars or
/// spinners, since nothing here runs long enough to need one.
use colored::*;

use crate::peer::{PeerEntry, PeerStatus};

/// Display a formatted header with decorations
pub fn print_header(title: &str) {
    let width = 80;
    let title_len = title.len();
    let padding = (width - title_len - 2) / 2;

    println!();
    println!("{}", "═".repeat(width).bright_cyan());
    println!(
        "{}{} {}{}",
        " ".repeat(padding),
        "│".bright_cyan(),
        title.bold().bright_white(),
        " ".repeat(width - padding - title_len - 2)
    );
    println!("{}", "═".repeat(width).bright_cyan());
    println!();
}

/// Display a section header
pub fn print_section(title: &str) {
    println!();
    println!("{}", format!("▶ {title}").bold().bright_blue());
    println!("{}", "─".repeat(title.len() + 2).bright_blue());
}

/// Display key-value information in a formatted way
pub fn print_key_value(key: &str, value: &str) {
    println!("  {}: {}", key.bold().bright_white(), value.bright_green());
}

/// Display a table with headers and rows
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if headers.is_empty() || rows.is_empty() {
        return;
    }

    let mut col_widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < col_widths.len() {
                col_widths[i] = col_widths[i].max(cell.len());
            }
        }
    }

    print!("  ");
    for (i, header) in headers.iter().enumerate() {
        print!("{:<width$}", header.bold().bright_cyan(), width = col_widths[i] + 2);
    }
    println!();

    print!("  ");
    for width in &col_widths {
        print!("{}", "─".repeat(width + 2));
    }
    println!();

    for row in rows {
        print!("  ");
        for (i, cell) in row.iter().enumerate() {
            if i < col_widths.len() {
                print!("{:<width$}", cell, width = col_widths[i] + 2);
            }
        }
        println!();
    }
    println!();
}

/// Render the peer table's known entries as a table, newest-joined last.
pub fn print_peer_table(peers: &[PeerEntry]) {
    let rows: Vec<Vec<String>> = peers
        .iter()
        .map(|peer| {
            vec![
                peer.identity.node_id.clone(),
                peer.identity.api_url.clone(),
                status_label(peer.status),
                peer.last_heartbeat_at.to_rfc3339(),
            ]
        })
        .collect();
    print_table(&["node_id", "api_url", "status", "last_heartbeat_at"], &rows);
}

fn status_label(status: PeerStatus) -> String {
    match status {
        PeerStatus::Active => "active".green().to_string(),
        PeerStatus::Suspected => "suspected".yellow().to_string(),
        PeerStatus::Unreachable => "unreachable".red().to_string(),
        PeerStatus::Left => "left".dimmed().to_string(),
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", "✅".green(), message);
}

pub fn print_error(message: &str) {
    println!("{} {}", "❌".red(), message.red());
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠️".yellow(), message.yellow());
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ️".blue(), message);
}
