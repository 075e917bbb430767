//! Agent commands: deploy a manifest, list the catalog.

use anyhow::{Context, Result};
use corral_protocol::http_types::AgentSpec;
use std::path::Path;

use crate::cli::client::AdminClient;
use crate::cli::output::table;

/// Register an agent described by a JSON manifest file.
pub fn deploy(client: &AdminClient, path: &Path) -> Result<()> {
    let manifest = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let spec: AgentSpec = serde_json::from_str(&manifest)
        .with_context(|| format!("Invalid agent manifest: {}", path.display()))?;

    let name = spec.name.clone();
    let version = spec.version;
    let response = client.register_agent(&spec)?;
    if !response.success {
        anyhow::bail!("Coordinator refused agent '{name}'");
    }

    println!("Deployed agent '{name}' version {version}");
    Ok(())
}

/// Print the agent catalog.
pub fn list(client: &AdminClient) -> Result<()> {
    let response = client.list_agents()?;
    if response.agents.is_empty() {
        println!("No agents registered");
        return Ok(());
    }

    let mut table = table(&["Agent ID", "Name", "Type", "Version", "Status"]);
    for agent in &response.agents {
        table.add_row(vec![
            agent.agent_id.to_string(),
            agent.name.clone(),
            agent.kind.to_string(),
            agent.version.to_string(),
            agent.status.to_string(),
        ]);
    }
    println!("{table}");
    println!("{} agent(s)", response.agents.len());
    Ok(())
}
