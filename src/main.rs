use anyhow::Context;
use clap::Parser;
use graphrag_chat::{AppConfig, ChatService, HttpServer, Preset};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "graphrag-chat", version, about = "GraphRAG chat API server")]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "GRAPHRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (overrides the configuration)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides the configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Dataset preset for retrieval
    #[arg(long, value_enum)]
    preset: Option<Preset>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(preset) = args.preset {
        config = config.with_preset(preset);
        config.validate()?;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("GraphRAG chat v{}", graphrag_chat::version());
    info!(
        "Preset {:?}, {} sources, model {}",
        config.retrieval.preset,
        config.retrieval.sources.len(),
        config.llm.model
    );

    let service = Arc::new(ChatService::from_config(&config).context("building chat service")?);

    if config.graph.bootstrap {
        match service.require_ingest()?.ensure_schema().await {
            Ok(report) => info!(
                "Graph schema ready ({} vector indexes, {} nodes embedded)",
                report.vector_indexes.len(),
                report.embedded_nodes
            ),
            Err(e) => warn!("Graph schema bootstrap failed, retrieval may find nothing: {}", e),
        }
    }

    let server = HttpServer::new(service, &config.server);

    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))?;

    Ok(())
}
