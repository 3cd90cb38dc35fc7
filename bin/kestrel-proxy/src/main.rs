//! Kestrel Proxy - account API front end
//!
//! Serves the `/{account}` resource and forwards to the account server.

use anyhow::Result;
use clap::Parser;
use kestrel_common::Config;
use kestrel_proxy::{
    AccountSettings, AppState,
    client::HttpAccountClient,
    context::{AccountDenyList, ProxyContext},
    router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kestrel-proxy")]
#[command(about = "Kestrel account proxy")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/kestrel/kestrel.toml")]
    config: String,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Account server base URL (overrides config)
    #[arg(long)]
    account_server: Option<String>,

    /// Refuse account PUT and DELETE
    #[arg(long, default_value_t = false)]
    deny_account_management: bool,

    /// Treat missing accounts as empty on GET and HEAD, create them on POST
    #[arg(long, default_value_t = false)]
    account_autocreate: bool,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.proxy.listen = listen;
    }
    if let Some(account_server) = args.account_server {
        config.proxy.account_server = account_server;
    }
    if args.deny_account_management {
        config.proxy.allow_account_management = false;
    }
    if args.account_autocreate {
        config.proxy.account_autocreate = true;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Kestrel proxy");
    info!("Account server: {}", config.proxy.account_server);
    info!(
        "Account management: {}, autocreate: {}",
        config.proxy.allow_account_management, config.proxy.account_autocreate
    );

    let client = HttpAccountClient::new(
        config.proxy.account_server.clone(),
        Duration::from_millis(config.proxy.backend_timeout_ms),
    )?;

    let context = if config.proxy.denied_accounts.is_empty() {
        ProxyContext::new()
    } else {
        info!(
            "Denying {} account(s)",
            config.proxy.denied_accounts.len()
        );
        ProxyContext::with_authorizer(Arc::new(AccountDenyList::new(
            config.proxy.denied_accounts.iter().cloned(),
        )))
    };

    let state = Arc::new(AppState {
        client: Arc::new(client),
        settings: AccountSettings::from(&config.proxy),
    });
    let app = router(state, context);

    let addr: SocketAddr = config
        .proxy
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {}", config.proxy.listen, e))?;

    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    info!("Proxy shut down gracefully");
    Ok(())
}
