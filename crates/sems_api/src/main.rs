use clap::Parser;
use sems_api::create_app;
use sems_core::StationConfig;
use sems_engine::Engine;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "sems-server")]
#[command(about = "Station Energy Management System")]
struct Args {
    /// Station configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// TCP port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt().pretty().init();

    // The station layout is fixed for the lifetime of the process; a bad or
    // missing config file is fatal before we bind anything.
    let config_path = args.config.display().to_string();
    let raw_config = tokio::fs::read_to_string(&args.config)
        .await
        .map_err(|e| format!("cannot read station config '{}': {}", config_path, e))?;
    let station_config: StationConfig = serde_json::from_str(&raw_config)
        .map_err(|e| format!("invalid station config '{}': {}", config_path, e))?;

    tracing::info!(
        station_id = %station_config.station_id,
        chargers = station_config.chargers.len(),
        battery = station_config.battery.is_some(),
        "station config loaded from {}",
        config_path
    );

    let engine = Arc::new(Engine::new(station_config));
    let app = create_app(engine);

    let bind_addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("cannot listen on {}: {}", bind_addr, e))?;
    tracing::info!("listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("server exited with error: {}", e))?;

    Ok(())
}
