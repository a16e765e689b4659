//! clawtrap — deceptive HTTP listener for reconnaissance traffic.
//!
//! This is the main entry point. It handles CLI argument parsing and starts
//! the async runtime that runs the listener. The moving parts:
//!
//! - **flags**: the indicator corpus (textual flags with weights and tags)
//! - **origin**: true-origin resolution from proxy-chain headers
//! - **classifier**: threat scoring of each fallthrough request
//! - **store**: storage boundary + the in-memory reference store
//! - **responder**: picks reject / honeypot replay / tarpit per request
//! - **server**: hyper listener and the throttled tarpit stream

mod classifier;
mod config;
mod flags;
mod origin;
mod request;
mod responder;
mod server;
mod store;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use config::Config;
use flags::FlagCorpus;
use responder::Responder;
use store::MemoryStore;

/// How many request records the in-memory store keeps before evicting.
const REQUEST_HISTORY: usize = 10_000;

fn print_help() {
    eprintln!(
        r#"clawtrap — deceptive HTTP listener for reconnaissance traffic

USAGE:
    clawtrap [COMMAND] [OPTIONS]

COMMANDS:
    run [CONFIG]         Start the listener (default)
    check-flags [PATH]   Validate an indicator corpus file and exit
    version              Show version info
    help                 Show this help message

CONFIG:
    Default config path: {}
    Override with:       clawtrap run /path/to/config.toml
"#,
        config::DEFAULT_CONFIG_PATH
    );
}

fn print_version() {
    eprintln!("clawtrap v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Deceptive HTTP listener for reconnaissance traffic");
}

fn main() -> Result<()> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let subcommand = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    match subcommand {
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            print_version();
            Ok(())
        }
        "check-flags" => check_flags(args.get(2).map(|s| s.as_str()).unwrap_or("./flags.json")),
        "run" => run(args.get(2).map(|s| s.as_str())).await,
        other => {
            eprintln!("Unknown command: {}\n", other);
            print_help();
            std::process::exit(1);
        }
    }
}

/// One-shot corpus validation: load it strictly and report what it holds.
fn check_flags(path: &str) -> Result<()> {
    if !Path::new(path).exists() {
        anyhow::bail!("corpus file not found: {}", path);
    }
    let corpus = FlagCorpus::load(path)?;
    eprintln!(
        "OK: {} payload flags, {} user-agent flags",
        corpus.payload_flags.len(),
        corpus.user_agent_flags.len()
    );
    Ok(())
}

async fn run(config_arg: Option<&str>) -> Result<()> {
    let config_path = config_arg.unwrap_or(config::DEFAULT_CONFIG_PATH);
    let cfg = if Path::new(config_path).exists() {
        Config::load(Path::new(config_path))?
    } else {
        eprintln!("Config not found at {}, using defaults", config_path);
        Config::default()
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let corpus = Arc::new(FlagCorpus::load(&cfg.flags.path)?);
    tracing::info!(
        "loaded {} payload flags and {} user-agent flags",
        corpus.payload_flags.len(),
        corpus.user_agent_flags.len()
    );

    let store = Arc::new(MemoryStore::new(REQUEST_HISTORY));
    let decoys = store.load_decoys(&cfg.decoys.dir).await?;
    tracing::info!("registered {} honeypot decoys", decoys);

    if cfg.tarpit.enabled {
        tracing::info!("halt-scanner mode on, ceiling {} chunks per stream", cfg.tarpit.max_chunks);
    }

    let responder = Arc::new(Responder::new(corpus, store, &cfg.tarpit, cfg.server.port));
    server::run_server(&cfg.server.bind, cfg.server.port, responder).await
}
