//! Spindle demo server
//!
//! Registers a `hello` task that fails now and then and a `dispatch` task
//! fanning out `hello` executions, then runs until Ctrl+C.

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use spindle_broker::{InMemoryBroker, InMemoryBrokerConfig};
use spindle_config::{ConfigLoader, SpindleConfig};
use spindle_core::Parameters;
use spindle_execution::{Context, Task};
use spindle_server::EngineBuilder;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serve the HTTP API on this address
    #[arg(long)]
    api_address: Option<String>,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,
}

/// User context shared by every execution
#[derive(Clone)]
struct DemoContext {
    greeting: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", SpindleConfig::generate_sample());
        return Ok(());
    }

    let mut config = ConfigLoader::new().load(cli.config.as_ref())?;
    if let Some(address) = cli.api_address {
        config.api.enabled = true;
        config.api.bind_address = address;
    }

    let storage = spindle_storage::connect(&config.storage).await?;
    spindle_logging::init_logging_with_storage(&config.logging, storage.clone())?;
    info!("Using {} storage", storage.name());

    let broker = Arc::new(InMemoryBroker::with_config(InMemoryBrokerConfig {
        requeue_on_error: config.broker.requeue_on_error,
    }));

    let context = DemoContext {
        greeting: "Hello".to_string(),
    };
    let engine = Arc::new(
        EngineBuilder::from_config(context, &config)
            .with_broker(broker)
            .with_storage(storage)
            .with_metrics()
            .build()
            .await?,
    );

    let hello = engine.register(
        Task::new("hello", hello)
            .with_concurrency(10)
            .with_max_retries(3),
    )?;

    let mut defaults = Parameters::new();
    defaults.insert("count".to_string(), json!(10));
    engine.register(
        Task::new("dispatch", move |ctx: Context<DemoContext>| {
            let hello = hello.clone();
            async move {
                let count = ctx.state().get_int("count", Some(10));
                for i in 0..count {
                    let mut parameters = Parameters::new();
                    parameters.insert("name".to_string(), json!(format!("World {}", i)));
                    ctx.execute_task(&hello, parameters).await?;
                }
                info!("Dispatched {} hello executions", count);
                Ok(())
            }
        })
        .with_default_parameters(defaults),
    )?;

    let closer = engine.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        if let Err(e) = closer.close().await {
            error!("Failed to close engine: {}", e);
        }
    });

    engine.start().await?;
    Ok(())
}

async fn hello(ctx: Context<DemoContext>) -> Result<()> {
    let name = ctx.state().get_str("name", Some("World"));

    if rand::random::<f64>() < 0.2 {
        anyhow::bail!("random failure greeting {}", name);
    }

    info!("{}, {}!", ctx.user_context().greeting, name);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
