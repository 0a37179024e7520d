use anyhow::{Context, Result};
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use wordtracker::{
    config::{Cli, Command, Config},
    grpc::WordTrackerService,
    raft::{
        RaftFacade,
        http_rpc::{RaftRpcState, build_raft_rpc_router},
        network_http::HttpNetworkFactory,
        runtime::start_raft,
    },
    tracker::WordTracker,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cmd = cli.command.clone().unwrap_or(Command::Run);

    match cmd {
        Command::Run => run_server(cli.config).await,
        Command::AddWord(args) => add_word(&cli.config, args.word).await,
        Command::GetWords => get_words(&cli.config).await,
    }
}

async fn run_server(config: Config) -> Result<()> {
    let tracker = Arc::new(WordTracker::new());
    let network = HttpNetworkFactory::try_new()?;
    let raft = start_raft(
        &config.data_dir,
        config.node_id,
        &config.raft_tuning(),
        tracker.clone(),
        network,
    )
    .await?;

    if config.bootstrap {
        raft.initialize_if_needed(config.members()).await?;
    }

    let (stop_tx, mut stop_rx) = watch::channel(false);

    let raft_app = build_raft_rpc_router(RaftRpcState { raft: raft.raft() })
        .layer(TraceLayer::new_for_http());
    let raft_listener = tokio::net::TcpListener::bind(config.raft_bind)
        .await
        .with_context(|| format!("bind raft listener {}", config.raft_bind))?;
    let raft_server = tokio::spawn(async move {
        axum::serve(raft_listener, raft_app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .await
    });

    let service = WordTrackerService::new(
        tracker,
        Arc::new(raft.clone()) as Arc<dyn RaftFacade>,
        config.write_timeout(),
    );
    let rpc_listener = tokio::net::TcpListener::bind(config.rpc_bind)
        .await
        .with_context(|| format!("bind rpc listener {}", config.rpc_bind))?;

    info!(
        node_id = config.node_id,
        raft_bind = %config.raft_bind,
        rpc_bind = %config.rpc_bind,
        data_dir = %config.data_dir.display(),
        "starting wordtracker"
    );
    let served = tonic::transport::Server::builder()
        .add_service(service.into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(rpc_listener), shutdown_signal())
        .await;

    let _ = stop_tx.send(true);
    match raft_server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "raft http server failed"),
        Err(e) => warn!(error = %e, "raft http server task panicked"),
    }
    if let Err(e) = raft.raft().shutdown().await {
        warn!(error = %e, "raft shutdown failed");
    }
    info!("wordtracker stopped");

    served.context("serve grpc")
}

async fn add_word(config: &Config, word: String) -> Result<()> {
    let mut client = wordtracker::client::connect(&config.server).await?;
    let commit_index = client.add_word(word.clone()).await?;
    let out = serde_json::json!({ "word": word, "commit_index": commit_index });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn get_words(config: &Config) -> Result<()> {
    let mut client = wordtracker::client::connect(&config.server).await?;
    let resp = client.get_words().await?;
    let out = serde_json::json!({
        "read_at_index": resp.read_at_index,
        "best_words": resp.best_words,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
