//! Job commands: submit an input file, list the job table.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use comfy_table::Cell;
use corral_ids::AgentId;
use corral_protocol::http_types::JobSpec;
use std::collections::HashMap;
use std::path::Path;

use crate::cli::client::AdminClient;
use crate::cli::output::{format_opt_time, format_time, job_status_cell, table};

/// Submit the bytes of a file as a job for an agent.
pub fn submit(client: &AdminClient, agent_id: &str, input_file: &Path) -> Result<()> {
    let input = std::fs::read(input_file)
        .with_context(|| format!("Failed to read input file: {}", input_file.display()))?;

    let response = client.submit_job(&JobSpec {
        agent_id: AgentId::from(agent_id),
        input: BASE64.encode(&input),
        metadata: HashMap::new(),
    })?;

    println!("Submitted job {}", response.job_id);
    Ok(())
}

/// Print the job table.
pub fn list(client: &AdminClient) -> Result<()> {
    let response = client.list_jobs()?;
    if response.jobs.is_empty() {
        println!("No jobs");
        return Ok(());
    }

    let mut table = table(&[
        "Job ID", "Agent", "Status", "Created", "Completed", "Node", "Error",
    ]);
    for job in &response.jobs {
        table.add_row(vec![
            Cell::new(job.job_id.to_string()),
            Cell::new(job.agent_id.to_string()),
            job_status_cell(job.status),
            Cell::new(format_time(job.created_at)),
            Cell::new(format_opt_time(job.completed_at)),
            Cell::new(
                job.executed_by_node_id
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(job.error_message.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{table}");
    println!("{} job(s)", response.jobs.len());
    Ok(())
}
