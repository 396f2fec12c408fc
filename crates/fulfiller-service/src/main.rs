//! Entry point for the intent fulfiller service.
//!
//! Wires configuration, per-chain clients, the lifecycle engine and the
//! operator HTTP surface together, and runs until interrupted. Fatal
//! configuration problems exit non-zero before anything is served.

mod server;

use alloy_signer_local::PrivateKeySigner;
use clap::Parser;
use fulfiller_chains::{ChainClient, ChainInterface};
use fulfiller_config::Config;
use fulfiller_core::FulfillerService;
use server::AppState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Command-line arguments for the fulfiller service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();
	let _ = dotenvy::dotenv();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
	fmt().with_env_filter(env_filter).with_target(true).init();

	tracing::info!("Starting intent fulfiller");

	let config = Config::from_env()?;

	let signer: PrivateKeySigner = config.private_key.parse()?;
	let fulfiller_address = config.fulfiller_address.unwrap_or_else(|| signer.address());
	tracing::info!(address = %fulfiller_address, "Fulfiller wallet");

	// Connect every configured chain; each client starts its own fee loop.
	let mut clients: HashMap<u64, Arc<ChainClient>> = HashMap::new();
	let mut chains: HashMap<u64, Arc<dyn ChainInterface>> = HashMap::new();
	for (chain_id, settings) in &config.chains {
		let client = ChainClient::connect(settings, config.max_gas_price, &config.private_key)
			.map_err(|e| format!("failed to connect to chain {chain_id}: {e}"))?;
		tracing::info!(chain_id, name = %settings.name, "Connected chain client");
		clients.insert(*chain_id, client.clone());
		chains.insert(*chain_id, client);
	}

	let metrics_port = config.metrics_port;
	let metrics_api_key = config.metrics_api_key.clone();
	let service = FulfillerService::new(config, chains, fulfiller_address)?;

	let app_state = AppState {
		chains: Arc::new(clients.clone()),
		breakers: service.breakers(),
		fulfiller_address,
		metrics_api_key,
	};

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::info!("Received interrupt, shutting down");
			let _ = shutdown_tx.send(true);
		}
	});

	let server_task = server::serve(metrics_port, app_state, shutdown_rx.clone());
	let service_task = service.run(shutdown_rx);

	tokio::select! {
		result = server_task => {
			result?;
			tracing::info!("Operator server finished");
		}
		_ = service_task => {
			tracing::info!("Fulfiller service finished");
		}
	}

	for client in clients.values() {
		client.stop_fee_updates();
	}

	tracing::info!("Stopped intent fulfiller");
	Ok(())
}
