//! `reqcoord`: command-line front end for the request coordinator.
//!
//! Loads a TOML config (or defaults), runs one coordinated call and prints
//! the resulting `ApiResult` as pretty JSON. Ctrl-C cancels everything in
//! flight; the call then reports `aborted`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;

use request_coordinator::config::load_config;
use request_coordinator::observability::logging::init_logging;
use request_coordinator::{ApiRequest, Coordinator, CoordinatorConfig, Credentials};

#[derive(Parser)]
#[command(name = "reqcoord")]
#[command(about = "Coordinated API client with single-flight requests", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `api.base_url`
    #[arg(short, long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the login result
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        /// One-time code for accounts with a second factor
        #[arg(long)]
        otp: Option<String>,
        #[arg(long)]
        remember_me: bool,
    },
    /// GET a path relative to the base URL
    Get {
        path: String,
        /// Bearer token to send
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// POST a JSON body to a path relative to the base URL
    Post {
        path: String,
        #[arg(short = 'd', long, default_value = "{}")]
        body: String,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn prepare(mut request: ApiRequest, token: Option<String>, timeout_ms: Option<u64>) -> ApiRequest {
    if let Some(token) = token {
        request = request.with_header("Authorization", format!("Bearer {token}"));
    }
    if let Some(ms) = timeout_ms {
        request = request.with_timeout(Duration::from_millis(ms));
    }
    request
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => CoordinatorConfig::default(),
    };
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    init_logging(&config.observability)?;

    let coordinator = Coordinator::from_config(config)?;

    let interrupt = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let cancelled = coordinator.cancel_all();
                tracing::info!(cancelled, "Interrupted, cancelling in-flight requests");
            }
        }
    });

    let (success, output) = match cli.command {
        Commands::Login {
            email,
            password,
            otp,
            remember_me,
        } => {
            let mut credentials = Credentials::new(email, password);
            if let Some(otp) = otp {
                credentials = credentials.with_otp(otp);
            }
            if remember_me {
                credentials = credentials.remember_me(true);
            }
            let result = coordinator.login(credentials).await;
            (result.success, serde_json::to_value(&result)?)
        }
        Commands::Get {
            path,
            token,
            timeout_ms,
        } => {
            let request = prepare(ApiRequest::get(path), token, timeout_ms);
            let result = coordinator.generic_request(request).await;
            (result.success, serde_json::to_value(&result)?)
        }
        Commands::Post {
            path,
            body,
            token,
            timeout_ms,
        } => {
            let body: Value = serde_json::from_str(&body)?;
            let request = prepare(ApiRequest::post(path, body), token, timeout_ms);
            let result = coordinator.generic_request(request).await;
            (result.success, serde_json::to_value(&result)?)
        }
    };

    interrupt.abort();
    coordinator.shutdown();
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
