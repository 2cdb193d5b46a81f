// ===================================================================================================
// swarm-core — peer membership, failure detection, discovery, and task delegation for a mesh
// of cooperating agent nodes.
// ===================================================================================================

mod api_server;
mod cli;
mod config;
mod discovery;
mod distributor;
mod error;
mod identity;
mod logging;
mod mesh;
mod messages;
mod peer;
mod session;
mod transport;
mod ui;

use std::error::Error;
use std::sync::Arc;

use clap::Parser;

use cli::{Cli, Commands};
use config::SwarmConfig;
use identity::NodeIdentity;
use mesh::MeshManager;
use messages::{GossipMessage, TaskConstraints};
use session::MockSessionFactory;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logging::init_logging_safe();

    let cli = Cli::parse();
    let config = config::SwarmConfig::load_or_default(cli.config.clone())?;

    match cli.command {
        Commands::Serve { bind } => run_serve(config, bind).await,
        Commands::Identity { remote } => run_identity(config, remote).await,
        Commands::Peers { remote } => run_peers(config, remote).await,
        Commands::Distribute { node, task, session_id, dry_run } => {
            run_distribute(config, node, task, session_id, dry_run).await
        }
    }
}

fn local_identity(config: &SwarmConfig) -> NodeIdentity {
    NodeIdentity::new(
        &config.node_name,
        &config.api_url,
        config.capabilities.iter().cloned(),
        &config.version,
    )
}

async fn run_serve(config: SwarmConfig, bind: Option<String>) -> Result<(), Box<dyn Error>> {
    let identity = local_identity(&config);
    let bind_addr = bind.unwrap_or_else(|| {
        config
            .api_url
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .to_string()
    });

    ui::print_header("swarm-core");
    ui::print_key_value("node_id", &identity.node_id);
    ui::print_key_value("api_url", &config.api_url);

    let mesh = MeshManager::new(config.clone(), identity, Some(Arc::new(MockSessionFactory)));
    let distributor = distributor::WorkDistributor::new(mesh.clone(), 1, config.delegation_timeout_ms);
    mesh.set_task_result_sink(distributor.clone()).await;

    mesh.start().await;

    let state = api_server::ApiState { mesh: mesh.clone(), distributor: distributor.clone(), token: config.token.clone() };
    let router = api_server::build_router(state);

    let server = tokio::spawn(async move { api_server::serve(&bind_addr, router).await });

    tokio::signal::ctrl_c().await?;
    ui::print_info("shutting down");
    mesh.stop().await;
    distributor.cancel_all().await;
    server.abort();

    Ok(())
}

async fn run_identity(config: SwarmConfig, remote: Option<String>) -> Result<(), Box<dyn Error>> {
    let base_url = remote.unwrap_or_else(|| config.api_url.clone());
    let transport = transport::PeerTransport::new(config.token.clone());
    let response = transport.fetch_identity(&base_url).await;
    match response.body {
        Some(identity) if response.success => {
            ui::print_key_value("node_id", &identity.node_id);
            ui::print_key_value("display_name", &identity.display_name);
            ui::print_key_value("api_url", &identity.api_url);
        }
        _ => ui::print_error(&response.error.unwrap_or_else(|| "request failed".to_string())),
    }
    Ok(())
}

async fn run_peers(config: SwarmConfig, remote: Option<String>) -> Result<(), Box<dyn Error>> {
    let base_url = remote.unwrap_or_else(|| config.api_url.clone());
    let transport = transport::PeerTransport::new(config.token.clone());
    let local = local_identity(&config);
    let digest = GossipMessage { sender_node_id: local.node_id.clone(), peers: vec![] };
    let response = transport.send_gossip(&base_url, &digest).await;
    match response.body {
        Some(msg) if response.success => {
            let rows: Vec<Vec<String>> = msg
                .peers
                .iter()
                .map(|p| vec![p.node_id.clone(), p.api_url.clone(), format!("{:?}", p.status)])
                .collect();
            ui::print_table(&["node_id", "api_url", "status"], &rows);
        }
        _ => ui::print_error(&response.error.unwrap_or_else(|| "request failed".to_string())),
    }
    Ok(())
}

async fn run_distribute(
    config: SwarmConfig,
    node: String,
    task: String,
    session_id: String,
    dry_run: bool,
) -> Result<(), Box<dyn Error>> {
    if dry_run {
        ui::print_info(&format!("would delegate to {node}: {task}"));
        return Ok(());
    }

    let transport = transport::PeerTransport::new(config.token.clone());
    let local = local_identity(&config);
    let request = messages::SwarmTaskRequest {
        task_id: uuid::Uuid::new_v4().to_string(),
        originator_node_id: local.node_id,
        originator_session_id: session_id,
        task_text: task,
        constraints: None::<TaskConstraints>,
        correlation_id: uuid::Uuid::new_v4().to_string(),
        nonce: uuid::Uuid::new_v4().to_string(),
    };

    let response = transport.send_task_request(&node, &request).await;
    match response.body {
        Some(decision) if response.success && decision.accepted => {
            ui::print_success(&format!(
                "accepted, session_id={}",
                decision.session_id.unwrap_or_default()
            ));
        }
        Some(decision) => {
            ui::print_error(&decision.reason.unwrap_or_else(|| "rejected".to_string()));
        }
        None => ui::print_error(&response.error.unwrap_or_else(|| "request failed".to_string())),
    }

    Ok(())
}
