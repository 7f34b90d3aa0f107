use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::subscriber as tracing_subscriber_global;
use tracing::info;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

use pkce_handshake as lib;
use lib::api::oauth::OAuthClient;
use lib::config::Config;
use lib::flow::FlowStore;
use lib::pkce::PkceEngine;
use lib::random::OsRandomSource;

#[derive(Parser)]
#[command(name = "pkce-handshake", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive authorization: print the authorize URL, read back the redirect
    Auth,
    /// Generate a code verifier and print its S256 challenge
    Verifier {
        /// Also print the secret verifier itself
        #[arg(long)]
        show_secret: bool,
    },
    /// Validate config file and exit
    ConfigValidate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Explicit --config wins; otherwise prefer the system-wide file and fall
    // back to the repository example config for local use.
    let resolved_config_path: PathBuf = match &cli.config {
        Some(p) => p.clone(),
        None => {
            let etc_path = Path::new("/etc/pkce-handshake/config.toml");
            if etc_path.exists() {
                etc_path.to_path_buf()
            } else {
                PathBuf::from("config/example-config.toml")
            }
        }
    };

    let cfg = Config::from_path(&resolved_config_path)
        .with_context(|| format!("loading config from {}", resolved_config_path.display()))?;

    // log -> tracing bridge; output to stdout and a daily-rotated file in cfg.log_dir.
    let _ = LogTracer::init();
    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(&cfg.log_dir, "pkce-handshake.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking))
        .with(fmt::layer().with_writer(std::io::stdout));

    tracing_subscriber_global::set_global_default(subscriber)
        .context("failed to set global tracing subscriber")?;

    match cli.command {
        Commands::Auth => {
            cfg.validate().context("validating config")?;
            run_interactive_auth(&cfg).await?;
        }
        Commands::Verifier { show_secret } => {
            let engine = PkceEngine::new(Arc::new(OsRandomSource::new()), cfg.pkce.verifier_length)?;
            let verifier = engine.generate_verifier()?;
            if show_secret {
                println!("verifier:  {}", verifier.secret());
            }
            println!("challenge: {}", verifier.challenge());
            println!("method:    {}", lib::pkce::CHALLENGE_METHOD);
        }
        Commands::ConfigValidate => {
            match Config::from_path(&resolved_config_path).and_then(|c| c.validate()) {
                Ok(()) => println!("OK"),
                Err(e) => {
                    eprintln!("Config validation failed: {}", e);
                    std::process::exit(2);
                }
            }
        }
    }

    Ok(())
}

/// Manual handshake without an embedded HTTP server: the user opens the
/// authorize URL, approves, and pastes the redirect URL back.
async fn run_interactive_auth(cfg: &Config) -> Result<()> {
    let engine = PkceEngine::new(Arc::new(OsRandomSource::new()), cfg.pkce.verifier_length)?;
    let client = Arc::new(OAuthClient::new(cfg.oauth.clone()));
    let flows = FlowStore::new(engine, client.clone(), cfg.pkce.attempt_ttl())?;
    let sweeper = flows.spawn_sweeper(cfg.pkce.sweep_interval());

    let (attempt, challenge) = flows.begin_authorization()?;
    let url = client.authorize_url(&challenge, &attempt)?;
    println!(
        "Open this URL in your browser and authorize the application:\n\n{}\n",
        url
    );
    println!("After authorizing, copy the full redirect URL and paste it here:");

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let (code, state) = parse_callback(input.trim())?;

    let result = flows.complete_authorization(&state, &code).await;
    sweeper.abort();
    let token = result?;
    info!(
        "authorization complete; token expires at {:?}",
        token.expires_at()
    );

    let profile = client.fetch_profile(&token).await?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

fn parse_callback(input: &str) -> Result<(String, String)> {
    let parsed = Url::parse(input).map_err(|e| anyhow!("invalid url pasted: {}", e))?;
    let find = |name: &str| {
        parsed
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    if let Some(err) = find("error") {
        return Err(anyhow!("authorization denied: {}", err));
    }
    let code = find("code").ok_or_else(|| anyhow!("no code in redirect URL"))?;
    let state = find("state").ok_or_else(|| anyhow!("no state in redirect URL"))?;
    Ok((code, state))
}
