//! Catalog HTTP server entry point.

use std::net::SocketAddr;
use std::path::PathBuf;

use catalog_core::config::CatalogConfig;
use catalog_core::db::Database;
use catalog_server::{routes, state::AppState};
use clap::Parser;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "catalog-server", about = "Content-addressed asset catalog server")]
struct Args {
	/// Path to the catalog's TOML config file (roots, categories, database path).
	#[arg(long, env = "CATALOG_CONFIG")]
	config: PathBuf,

	/// Address to bind the HTTP server to.
	#[arg(long, env = "CATALOG_BIND", default_value = "127.0.0.1:8383")]
	bind: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,catalog_server=debug,catalog_core=debug".into()),
		)
		.init();

	let args = Args::parse();
	let config = CatalogConfig::load(&args.config)?;

	let db = Database::connect(&config.database_path).await?;
	let state = AppState::new(db.conn().clone(), config);

	let app = routes::router(state).layer(
		ServiceBuilder::new()
			.layer(TraceLayer::new_for_http())
			.layer(CorsLayer::permissive()),
	);

	info!(addr = %args.bind, "catalog server listening");
	let listener = tokio::net::TcpListener::bind(args.bind).await?;
	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {
			info!("received ctrl+c, shutting down gracefully");
		}
		() = terminate => {
			info!("received sigterm, shutting down gracefully");
		}
	}
}
