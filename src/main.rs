use clap::Parser;
use portcullis::GatewayConfig;
use portcullis::cli::{Args, build_config, init_logging, load_jwt_secret};
use portcullis::run_server;
use tracing::{error, info};

// JWT_SECRET is read and removed before the runtime spawns worker threads.
fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(config) = build_config(&args, jwt_secret) else {
        std::process::exit(1);
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to start runtime");
            std::process::exit(1);
        });

    runtime.block_on(serve(args.port, config));
}

async fn serve(port: u16, config: GatewayConfig) {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap_or_else(|e| {
        error!(error = %e, "Failed to read local address");
        std::process::exit(1);
    });

    info!(
        address = %local_addr,
        upstream = %config.upstream,
        refresh_endpoint = %config.refresh_endpoint,
        open_paths = ?config.open_routes.fragments(),
        route_match = ?config.open_routes.mode(),
        coalesce_refresh = config.coalesce_refresh,
        "Listening"
    );

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
