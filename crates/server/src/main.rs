mod bootstrap;
mod health;
mod routes;

use anyhow::Result;
use switchboard_core::config::LoadOptions;

use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).compact().init();

    let app = bootstrap::bootstrap(LoadOptions::default()).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    let state = AppState {
        orchestrator: app.orchestrator,
        approvals: app.approvals,
        broker: app.broker,
        sink: app.sink,
    };
    let router = routes::router(state);

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "switchboard-server started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router).await {
            tracing::error!(
                event_name = "system.server.error",
                error = %error,
                "http server terminated unexpectedly"
            );
        }
    });

    wait_for_shutdown().await?;
    tracing::info!(event_name = "system.server.stopping", "switchboard-server stopping");

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
