//! courier-call - make one call against an in-process Courier server
//!
//! Serves the `add` and `sub` methods under the name `demo` and calls one of
//! them through a regular [`courier::Connection`], printing the result as
//! JSON.
//!
//! # Usage
//!
//! ```bash
//! courier-call add '[4, 7]'
//! courier-call --async --timeout 0.5 sub '[10, 3]'
//! courier-call --list
//! RUST_LOG=courier=trace courier-call add '[1, 2]'
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use courier::{Args, CallOverrides, ConnectionConfig, Value};
use courier_test::{LoopbackConnector, LoopbackServer, arithmetic};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Call a method on an in-process Courier server", long_about = None)]
struct CliArgs {
    /// Method to call
    #[arg(required_unless_present = "list")]
    method: Option<String>,

    /// Arguments as JSON: an array of positional values or an object of named values
    #[arg(default_value = "[]")]
    args: String,

    /// Server to connect to
    #[arg(long, default_value = "demo")]
    address: String,

    /// Call timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Dispatch the call asynchronously and await the result
    #[arg(long = "async")]
    use_async: bool,

    /// Fail immediately if the server is not ready
    #[arg(long)]
    no_wait_for_ready: bool,

    /// Start with the server offline (combine with --timeout)
    #[arg(long)]
    offline: bool,

    /// List the server's methods instead of calling one
    #[arg(long)]
    list: bool,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log: Option<String>,
}

fn parse_args(json: &str) -> anyhow::Result<Args> {
    let value: Value = serde_json::from_str(json).context("arguments must be valid JSON")?;
    match value {
        Value::Array(values) => Ok(Args::positional(values)),
        Value::Object(named) => Ok(Args {
            positional: Vec::new(),
            named,
        }),
        other => Ok(Args::new().arg(other)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();

    let env_filter = match &cli.log {
        Some(level) => EnvFilter::new(format!("courier={level},courier_test={level}")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("courier=info")),
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();

    courier::init();

    let server = LoopbackServer::new("demo", arithmetic());
    server.set_available(!cli.offline);
    let connector = LoopbackConnector::serving(server);

    let mut config = ConnectionConfig::new(&cli.address).wait_for_ready(!cli.no_wait_for_ready);
    if let Some(secs) = cli.timeout {
        config = config.call_timeout_secs(secs);
    }
    let connection = Arc::new(config.connect(connector)?);

    if cli.list {
        for method in connection.list_methods()? {
            println!("{method}");
        }
        return Ok(());
    }

    let Some(method) = cli.method else {
        anyhow::bail!("no method given");
    };
    let args = parse_args(&cli.args)?;
    tracing::info!(%method, address = %cli.address, asynchronous = cli.use_async, "calling");

    let result = if cli.use_async {
        connection.futures().invoke(&method, args).await?
    } else {
        let connection = connection.clone();
        tokio::task::spawn_blocking(move || {
            connection.invoke_with(&method, args, &CallOverrides::default())
        })
        .await??
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
