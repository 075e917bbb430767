//! Node commands: list the fleet, inspect one member.

use anyhow::{bail, Result};
use comfy_table::Cell;

use crate::cli::client::AdminClient;
use crate::cli::output::{format_time, node_status_cell, table};

/// Print the node directory.
pub fn list(client: &AdminClient) -> Result<()> {
    let response = client.list_nodes()?;
    if response.nodes.is_empty() {
        println!("No nodes registered");
        return Ok(());
    }

    let mut table = table(&["Node ID", "Hostname", "Address", "Port", "Status", "Last heartbeat"]);
    for node in &response.nodes {
        table.add_row(vec![
            Cell::new(node.node_id.to_string()),
            Cell::new(&node.hostname),
            Cell::new(&node.address),
            Cell::new(node.port),
            node_status_cell(node.status),
            Cell::new(format_time(node.last_heartbeat)),
        ]);
    }
    println!("{table}");
    println!("{} node(s)", response.nodes.len());
    Ok(())
}

/// Print one node with its capability set.
pub fn inspect(client: &AdminClient, node_id: &str) -> Result<()> {
    let response = client.list_nodes()?;
    let Some(node) = response
        .nodes
        .into_iter()
        .find(|node| node.node_id.as_str() == node_id)
    else {
        bail!("Unknown node: {node_id}");
    };

    println!("Node:           {}", node.node_id);
    println!("Hostname:       {}", node.hostname);
    println!("Address:        {}:{}", node.address, node.port);
    println!("Status:         {}", node.status);
    println!("Last heartbeat: {}", format_time(node.last_heartbeat));

    if node.capabilities.is_empty() {
        println!("Capabilities:   (none)");
    } else {
        println!("Capabilities:");
        let mut keys: Vec<&String> = node.capabilities.keys().collect();
        keys.sort();
        for key in keys {
            println!("  {key}");
        }
    }
    Ok(())
}
