#![warn(missing_docs)]

//! courier-probe: issue a single service call through the dispatcher

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use courier_dispatch::{
    CallOptions, Credentials, DispatchConfig, Dispatcher, Method, Operation, ResponseData,
    ResponseShape,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "courier-probe")]
#[command(about = "Issue one call through the courier dispatcher", long_about = None)]
struct Cli {
    /// Configuration file (.toml or .json); defaults are used if absent.
    #[arg(short, long, default_value = "courier.toml")]
    config: PathBuf,

    /// Operation name, e.g. `config` or `whoami`.
    #[arg(long)]
    call: String,

    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Appended to the operation path.
    #[arg(long, default_value = "")]
    suffix: String,

    /// Send without credentials.
    #[arg(long)]
    unauth: bool,

    /// Access key for unauthenticated calls.
    #[arg(long, env = "COURIER_ACCESS_KEY")]
    access_key: Option<String>,

    #[arg(long, env = "COURIER_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "COURIER_PASSWORD")]
    password: Option<String>,
}

fn parse_method(name: &str) -> Result<Method> {
    let method = match name.to_ascii_uppercase().as_str() {
        "GET" => Method::Get,
        "POST" => Method::Post,
        "PUT" => Method::Put,
        "DELETE" => Method::Delete,
        "PATCH" => Method::Patch,
        "HEAD" => Method::Head,
        other => bail!("Unsupported method: {}", other),
    };
    Ok(method)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        DispatchConfig::from_file(&cli.config)?
    } else {
        tracing::warn!("Config file not found, using defaults: {}", cli.config.display());
        DispatchConfig::default()
    };

    let operation: Operation = cli.call.parse()?;
    let method = parse_method(&cli.method)?;
    let credentials = match (cli.username, cli.password) {
        (Some(username), Some(password)) => Credentials::new(username, password),
        _ => Credentials::empty(),
    };

    let dispatcher = Dispatcher::new(config, credentials)?;

    let mut options = CallOptions::new(operation, method)
        .with_suffix(cli.suffix)
        .with_shape(ResponseShape::JsonWithDetails);
    if cli.unauth {
        options = options.unauthenticated(cli.access_key);
    }

    match dispatcher.call(options).await {
        Ok(outcome) => {
            let data = match outcome.data {
                ResponseData::JsonWithDetails(details) => details.data,
                _ => None,
            };
            let printed = serde_json::json!({
                "status": outcome.status,
                "body": data,
            });
            println!("{}", serde_json::to_string_pretty(&printed)?);
            Ok(())
        }
        Err(err) => {
            let body = err
                .body()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            let printed = serde_json::json!({
                "status": err.status(),
                "error": err.to_string(),
                "body": body,
            });
            println!("{}", serde_json::to_string_pretty(&printed)?);
            Err(err.into())
        }
    }
}
