use clap::Parser;
use frontdesk::cli::{Args, handle_bootstrap_admin, init_logging, load_secrets, open_database};
use frontdesk::{ServerConfig, init_cleanup, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some((access_secret, refresh_secret)) = load_secrets(&args) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if args.bootstrap_admin {
        // clap guarantees both are present when the flag is set
        let email = args.admin_email.as_deref().unwrap_or_default();
        let admin_password = args.admin_password.as_deref().unwrap_or_default();
        handle_bootstrap_admin(&db, email, &args.admin_name, admin_password).await;
    }

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().expect("Failed to get local address");

    init_cleanup(&db).await;

    let config = ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
    };

    info!(address = %local_addr, "Listening");

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
