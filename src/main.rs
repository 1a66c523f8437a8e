//! # ArbGPT CLI (`arbgpt`)
//!
//! ## Usage
//!
//! ```bash
//! arbgpt [--config ./config/arbgpt.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `arbgpt serve` | Start the web UI and JSON API |
//! | `arbgpt ask "<question>"` | Answer one question from the docs |
//! | `arbgpt contract --mode <debug\|generate> <file>` | Debug or generate a contract (`-` reads stdin) |
//!
//! Secrets come from the environment (`MONGODB_CONN_URI`, `GITHUB_TOKEN`);
//! a `.env` file in the working directory is loaded first if present.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use arbgpt::config::{self, Secrets};
use arbgpt::flows::{run_bounded, Flows, Outcome};
use arbgpt::llm::{ChatModel, OpenAIChatModel};
use arbgpt::models::ContractMode;
use arbgpt::prompts::contract_prompt;
use arbgpt::server;
use arbgpt::session::SessionStore;

/// ArbGPT: chat with the Arbitrum docs and debug Solidity contracts.
#[derive(Parser)]
#[command(
    name = "arbgpt",
    about = "ArbGPT: chat with the Arbitrum docs and debug or generate Solidity contracts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When omitted, `./config/arbgpt.toml` is used if it exists and
    /// built-in defaults otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server.
    ///
    /// Serves the landing page, the docs chat, the contract debugger, and
    /// the JSON API on `[server].bind`.
    Serve,

    /// Answer one question using the docs knowledge base.
    Ask {
        /// The question, passed to the query engine verbatim.
        question: String,

        /// Also print the retrieved passages.
        #[arg(long)]
        sources: bool,
    },

    /// Send a contract to the model for debugging or generation.
    Contract {
        /// `debug` or `generate`.
        #[arg(long, default_value = "debug")]
        mode: String,

        /// Path to the `.sol` file, or `-` for stdin.
        path: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancels `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

fn read_source(path: &PathBuf) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("Failed to load .env");
        }
    }
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => {
            let secrets = Secrets::from_env()?;
            let flows = Flows::connect(&cfg, &secrets, CancellationToken::new()).await?;
            server::run_server(&cfg, Arc::new(flows)).await?;
        }
        Commands::Ask { question, sources } => {
            let secrets = Secrets::from_env()?;
            let shutdown = CancellationToken::new();
            cancel_on_ctrl_c(shutdown.clone());
            let flows = Flows::connect(&cfg, &secrets, shutdown).await?;

            let sessions = SessionStore::new(Duration::from_secs(cfg.server.session_ttl_secs));
            let (session, _) = sessions.get_or_create(None);

            match flows.ask(&session, &question).await {
                Outcome::Resolved(answer) => {
                    println!("{}", answer.response);
                    if sources {
                        println!();
                        println!("Sources:");
                        for p in &answer.sources {
                            println!("  [{:.3}] {}", p.score, p.id);
                        }
                    }
                }
                Outcome::Ignored => bail!("question must not be empty"),
                Outcome::Pending => bail!("a request is already in flight"),
                Outcome::Failed(f) => bail!("{}: {}", f.reason.as_str(), f.message),
            }
        }
        Commands::Contract { mode, path } => {
            let mode: ContractMode = mode.parse()?;
            let code = read_source(&path)?;
            if code.trim().is_empty() {
                bail!("contract source must not be empty");
            }

            let token = Secrets::api_token_from_env()?;
            let llm = OpenAIChatModel::new(&cfg.llm, token)?;
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            tracing::info!(%mode, model = llm.model_name(), "contract request");
            let timeout = Duration::from_secs(cfg.server.request_timeout_secs);
            let prompt = contract_prompt(mode, &code);
            match run_bounded(timeout, &cancel, llm.complete(&prompt)).await {
                Ok(output) => println!("{}", output),
                Err(f) => bail!("{}: {}", f.reason.as_str(), f.message),
            }
        }
    }

    Ok(())
}
