//! HTTP-RPC command-line client.
//!
//! Invokes one procedure on an HTTP-RPC service and prints the decoded result
//! as JSON.

mod params;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use httprpc::{Credential, ServiceProxy, TrustPolicy};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "httprpc")]
#[command(about = "Invoke a procedure on an HTTP-RPC service")]
struct Args {
    /// Base URL of the service
    #[arg(long, env = "HTTPRPC_BASE_URL")]
    base_url: String,

    /// User name for basic authentication
    #[arg(long, env = "HTTPRPC_USER")]
    user: Option<String>,

    /// Password for basic authentication
    #[arg(long, env = "HTTPRPC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Accept any certificate the server presents
    #[arg(long)]
    insecure: bool,

    /// Request timeout in seconds (default: none)
    #[arg(long)]
    timeout: Option<u64>,

    /// Maximum number of requests in flight
    #[arg(long, default_value = "10")]
    max_concurrent: usize,

    /// Accept-Language sent with the request (defaults to the process locale)
    #[arg(long)]
    language: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Procedure name, relative to the base URL
    procedure: String,

    /// Arguments as NAME=VALUE; repeat a name to send a list
    #[arg(value_name = "NAME=VALUE")]
    arguments: Vec<String>,

    /// Attach a file as NAME=PATH
    #[arg(long = "attach", value_name = "NAME=PATH")]
    attachments: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only the result
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let arguments = params::parse_arguments(&args.arguments)?;
    let attachments = params::parse_attachments(&args.attachments)?;

    let mut builder = ServiceProxy::builder(args.base_url.as_str())
        .max_concurrent_requests(args.max_concurrent);

    if let Some(user) = args.user {
        let password = args.password.unwrap_or_default();
        builder = builder.credential(Credential::new(user, password));
    }
    if args.insecure {
        builder = builder.trust_policy(TrustPolicy::AcceptAny);
    }
    if let Some(secs) = args.timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(language) = args.language {
        builder = builder.accept_language(language);
    }

    let proxy = builder.build().context("Failed to create service proxy")?;

    debug!(
        "Invoking {} with {} arguments",
        args.procedure,
        arguments.len()
    );

    let result = proxy
        .call(&args.procedure, &arguments, &attachments)
        .await
        .with_context(|| format!("Invocation of '{}' failed", args.procedure))?;

    // A void result prints nothing
    if let Some(value) = result {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }

    Ok(())
}
