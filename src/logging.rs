use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize the tracing subscriber for the swarm node binary.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("swarm_core=debug,reqwest=info")
        } else {
            EnvFilter::new("swarm_core=info,reqwest=warn")
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;

    info!("swarm mesh logging initialized");
    Ok(())
}

/// Initialize logging, falling back to plain stderr output if the subscriber
/// could not be installed (e.g. a global default was already set by the host).
pub fn init_logging_safe() {
    if let Err(e) = init_logging() {
        eprintln!("warning: failed to set up tracing: {e}. continuing without structured logs");
    }
}

/// Log a membership event (join/leave/sweep transition).
pub fn log_mesh_event(event: &str, details: &str) {
    info!(target: "swarm::mesh", "{}: {}", event, details);
}

/// Log a task delegation outcome.
pub fn log_delegation(task_id: &str, peer_node_id: &str, outcome: &str) {
    info!(target: "swarm::distributor", "task {} -> {}: {}", task_id, peer_node_id, outcome);
}

/// Log an error with additional context.
pub fn log_error_with_context(context: &str, error: &dyn std::error::Error) {
    error!(target: "swarm::error", "{}: {}", context, error);
}
