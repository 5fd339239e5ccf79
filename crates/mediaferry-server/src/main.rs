//! Mediaferry: entry point.

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tokio_util::sync::CancellationToken;

use mediaferry::{JobRequest, MediaKind, QualityHints};
use mediaferry_server::{build_orchestrator, rest, AppState, Settings};

#[derive(Parser)]
#[command(
    name = "mediaferry",
    about = "Media acquisition pipeline: fetch, store, and report audio and video",
    version
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "mediaferry=info,mediaferry_server=info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP front door (default).
    Serve,

    /// Print the effective strategy catalog as JSON.
    Strategies,

    /// Run one job from the terminal and print its outcome.
    Fetch {
        /// Source media URL.
        url: String,

        #[arg(long, default_value = "audio")]
        kind: MediaKind,

        /// Owner namespace for the storage key.
        #[arg(long, default_value = "cli")]
        owner: String,

        /// Job identifier; generated when omitted.
        #[arg(long)]
        job_id: Option<String>,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn init_tracing(filter: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let settings = cli.settings;
            tracing::info!("starting mediaferry v{}", env!("CARGO_PKG_VERSION"));
            if settings.api_secret.as_deref().unwrap_or_default().is_empty() {
                tracing::warn!("API_SECRET is not set; every download request will be rejected");
            }
            if settings.proxy_configured() {
                tracing::info!("egress proxy configured");
            }

            let state = Arc::new(AppState::from_settings(&settings)?);
            let addr = format!("{}:{}", settings.host, settings.port);
            rest::serve(&addr, state).await?;
        }

        Commands::Strategies => {
            let catalog = cli.settings.catalog()?;
            println!("{}", serde_json::to_string_pretty(&catalog)?);
        }

        Commands::Fetch {
            url,
            kind,
            owner,
            job_id,
        } => {
            let orchestrator = build_orchestrator(&cli.settings)?;
            let request = JobRequest {
                job_id: job_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                owner_id: owner,
                url,
                media_kind: kind,
                quality: QualityHints::default(),
                callback_url: None,
                shared_secret: None,
            };

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let report = orchestrator.run(request, cancel).await;
            let outcome = serde_json::json!({
                "job_id": report.job.id(),
                "phase": report.job.phase,
                "attempts": report.job.attempted.iter()
                    .filter_map(|i| orchestrator.catalog().get(*i).map(|s| s.name.as_str()))
                    .collect::<Vec<_>>(),
                "output": report.job.output,
                "error": report.error,
            });
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !report.succeeded() {
                std::process::exit(1);
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "mediaferry", &mut std::io::stdout());
        }
    }

    Ok(())
}
