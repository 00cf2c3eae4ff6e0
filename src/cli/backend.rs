//! CLI handlers that talk to the provisioning backend.
//!
//! Presentation only; requests go through [`BackendClient`].

use crate::backend::{BackendClient, HealthStatus, ServiceHealth};
use crate::cli::ProvisionCliArgs;
use crate::config::Config;
use anyhow::{anyhow, Result};
use std::collections::HashMap;

fn backend_client(config: &Config) -> Result<BackendClient> {
    BackendClient::new(&config.backend.url, config.backend.request_timeout())
}

pub async fn handle_health_command(config: &Config) -> Result<()> {
    let client = backend_client(config)?;
    let health = client.health_check().await?;

    println!("Backend: {}", config.backend.url);
    println!("Status: {}", health_display(&health));
    println!(
        "API key: {}",
        if health.api_key_configured {
            "configured"
        } else {
            "missing"
        }
    );

    if !health.allows_calls() {
        return Err(anyhow!("Backend cannot provision calls"));
    }
    Ok(())
}

fn health_display(health: &HealthStatus) -> &'static str {
    match health.status {
        ServiceHealth::Ok => "ok",
        ServiceHealth::Unhealthy => "unhealthy",
    }
}

pub async fn handle_agents_command(config: &Config) -> Result<()> {
    let client = backend_client(config)?;
    let list = client.get_agents().await?;

    if list.agents.is_empty() {
        println!("No agents found.");
        return Ok(());
    }

    println!("Found {} agent(s):\n", list.agents.len());
    for agent in &list.agents {
        println!("ID: {}", agent.agent_id);
        println!("Name: {}", agent.agent_name);
        println!("Voice: {} | Language: {}", agent.voice_id, agent.language);
        println!("---");
    }

    println!("\nTo start a call, use: webcall provision --agent <ID>");
    Ok(())
}

pub async fn handle_provision_command(config: &Config, args: ProvisionCliArgs) -> Result<()> {
    let client = backend_client(config)?;
    let metadata: HashMap<String, String> = args.metadata.into_iter().collect();
    let call = client.create_call(&args.agent, &metadata).await?;

    println!("Call ID: {}", call.call_id);
    println!("Access token: {}", call.access_token);
    println!("Sample rate: {}", call.sample_rate);
    Ok(())
}
