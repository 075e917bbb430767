//! Output formatting utilities for CLI commands.

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use corral_protocol::{JobStatus, NodeStatus};

/// Build a table with the house style.
pub fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h)).collect::<Vec<_>>());
    table
}

pub fn job_status_cell(status: JobStatus) -> Cell {
    let color = match status {
        JobStatus::Pending => Color::Grey,
        JobStatus::Running => Color::Cyan,
        JobStatus::Completed => Color::Green,
        JobStatus::Failed => Color::Red,
        JobStatus::Cancelled => Color::DarkGrey,
        JobStatus::Timeout => Color::Yellow,
    };
    Cell::new(status.as_str()).fg(color)
}

pub fn node_status_cell(status: NodeStatus) -> Cell {
    let color = match status {
        NodeStatus::Online => Color::Green,
        NodeStatus::Busy => Color::Yellow,
        NodeStatus::Unresponsive => Color::Red,
        NodeStatus::Offline => Color::DarkGrey,
        NodeStatus::Error => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}

pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_opt_time(time: Option<DateTime<Utc>>) -> String {
    time.map(format_time).unwrap_or_else(|| "-".to_string())
}
