use clap::Parser;
use fnagent::{
    executor::DEFAULT_DRIVER_PATH,
    server::{create_router, AgentState},
    FnagentResult,
};
use tracing_subscriber::EnvFilter;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Function execution agent - runs user handlers under enforced timeouts
#[derive(Debug, Parser)]
#[command(name = "fnagent", author, about, version)]
struct FnagentArgs {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind the HTTP server to
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Path to the runtime driver executable
    #[arg(long, default_value = DEFAULT_DRIVER_PATH)]
    driver: String,
}

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> FnagentResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = FnagentArgs::parse();

    let state = AgentState::new(&args.driver);
    let router = create_router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("agent listening on {}, driver: {}", addr, args.driver);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down agent");
        })
        .await?;

    Ok(())
}
