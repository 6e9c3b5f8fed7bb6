mod error;
mod manager;
mod matting;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use manager::ModelManager;
use matting::Device;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the HTTP service to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 5353)]
    port: u16,

    /// Path to a matting model (ONNX file) to load at startup
    /// If not provided, a model must be loaded later via POST /load_model
    #[arg(long)]
    model: Option<PathBuf>,

    /// Place the preloaded model on the CUDA execution provider
    #[arg(long)]
    cuda: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Cutout service starting");

    let manager = Arc::new(ModelManager::new());

    if let Some(model_path) = &args.model {
        let device = if args.cuda { Device::Cuda } else { Device::Cpu };
        tracing::info!("Preloading model from {}", model_path.display());
        manager
            .load(model_path, device)
            .with_context(|| format!("Failed to load model from {}", model_path.display()))?;
    }

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("Invalid bind address")?;

    server::serve(addr, manager).await
}
