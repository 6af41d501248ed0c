//! `f2b`: start a code-generation job and follow its progress in the terminal.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use f2b_client::prelude::*;
use f2b_client::{SessionToken, init_observability};

#[derive(Parser, Debug)]
#[command(name = "f2b", version, about = "Generate a backend from a frontend repository")]
struct Cli {
    /// Base URL of the code-generation server.
    #[arg(long, global = true, env = "F2B_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a job and print progress until it finishes.
    Generate {
        /// Repository to generate a backend for.
        repo_url: String,
        /// Download the finished archive into this directory.
        #[arg(long, value_name = "DIR")]
        download: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();
    init_observability();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env().context("loading client configuration")?;
    if let Some(url) = cli.api_url {
        config = config.base_url(url);
    }

    match cli.command {
        Command::Generate { repo_url, download } => generate(config, repo_url, download).await,
    }
}

async fn generate(
    config: ClientConfig,
    repo_url: String,
    download: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let transport = HttpTransport::new(config.clone())?;
    let mut controller = SessionController::with_buffer_capacity(config.stream_buffer_capacity);
    let request = GenerationRequest::new(repo_url);

    println!("Starting generation for {}", request.repo_url.trim());
    let handle = controller
        .launch(&transport, &request)
        .await
        .context("generation job was not accepted")?;
    tracing::info!(session = %handle.token(), request_id = %request.request_id, "following progress");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                eprintln!("Interrupted, cancelling...");
                handle.abort();
            }
            update = controller.next_update() => {
                let Some(update) = update else { break };
                render(handle.token(), &update, controller.snapshot());
            }
        }
    }

    let snapshot = controller.snapshot();
    match snapshot.phase() {
        SessionPhase::Completed => {
            if let (Some(dir), Some(result)) = (download, snapshot.result.as_ref()) {
                let fetcher = ArtifactFetcher::new(config)?;
                let path = fetcher
                    .download(result, &dir)
                    .await
                    .context("downloading generated project")?;
                println!("Saved archive to {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        SessionPhase::Failed => Ok(ExitCode::FAILURE),
        SessionPhase::Ended if interrupted => Ok(ExitCode::from(130)),
        SessionPhase::Ended => Ok(ExitCode::SUCCESS),
        SessionPhase::Idle | SessionPhase::Running => {
            anyhow::bail!("session stopped without reaching a terminal state")
        }
    }
}

fn render(token: SessionToken, update: &SessionUpdate, snapshot: &SessionSnapshot) {
    match update {
        SessionUpdate::StepsChanged { status, current } => {
            println!("[{current}] {status}");
            for step in snapshot.steps.as_slice() {
                let mark = match step.state {
                    StepState::Pending => ' ',
                    StepState::Active => '>',
                    StepState::Completed => 'x',
                };
                println!("  [{mark}] {}", step.label);
            }
        }
        SessionUpdate::StatusUnchanged { status } => println!("  {status}"),
        SessionUpdate::EndpointsReplaced { count } => {
            println!("Endpoints ({count}):");
            for endpoint in &snapshot.endpoints {
                if endpoint.description.is_empty() {
                    println!("  {:<7} {}", endpoint.method, endpoint.path);
                } else {
                    println!(
                        "  {:<7} {}  {}",
                        endpoint.method, endpoint.path, endpoint.description
                    );
                }
            }
        }
        SessionUpdate::Completed(result) => {
            println!(
                "Generated {} (archive: {})",
                result.project_name, result.artifact_locator
            );
        }
        SessionUpdate::Failed(error) => eprintln!("Generation failed: {error}"),
        SessionUpdate::Ended => println!("Server ended the stream"),
        SessionUpdate::Cancelled => eprintln!("Session {token} cancelled"),
        SessionUpdate::DecodeFailed(failure) => {
            tracing::warn!(session = %token, error = %failure, "skipped malformed event");
        }
    }
}
