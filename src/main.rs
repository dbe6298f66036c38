//! # PDF Chat CLI (`pdfchat`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfchat serve` | Start the HTTP API |
//! | `pdfchat ask --pdf FILE... "<question>"` | Index the PDFs and answer one question |
//! | `pdfchat chat --pdf FILE...` | Index the PDFs and chat interactively |
//! | `pdfchat completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! export OPENROUTER_API_KEY=sk-or-...
//! pdfchat ask --pdf report.pdf "Summarise section 2"
//! pdfchat --config ./pdfchat.toml chat --pdf a.pdf --pdf b.pdf
//! PDFCHAT_LOG=pdfchat=debug pdfchat serve
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use pdfchat::config::{self, Config};
use pdfchat::session::{Pipeline, Session, UploadOutcome};
use pdfchat_core::models::UploadedDocument;

/// Chat with your PDFs.
///
/// Every command accepts an optional `--config` TOML file; without one the
/// built-in defaults are used and the API key is read from
/// `OPENROUTER_API_KEY`.
#[derive(Parser)]
#[command(
    name = "pdfchat",
    about = "Ask questions about PDF documents using retrieval-augmented generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    ///
    /// Binds to `[server].bind` (default `127.0.0.1:8501`). Sessions are
    /// held in memory and vanish when the server stops.
    Serve,

    /// Index the given PDFs and answer a single question.
    Ask {
        /// PDF file to index. Repeat for several files.
        #[arg(long = "pdf", required = true)]
        pdfs: Vec<PathBuf>,

        /// The question to ask.
        question: String,
    },

    /// Index the given PDFs, then read questions from stdin until EOF.
    ///
    /// `/history` prints the conversation so far; `/quit` exits. Ctrl-C
    /// cancels the question in flight.
    Chat {
        /// PDF file to index. Repeat for several files.
        #[arg(long = "pdf", required = true)]
        pdfs: Vec<PathBuf>,
    },

    /// Print a shell completion script to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("PDFCHAT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "pdfchat", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(cli.verbose, cli.quiet);
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => pdfchat::server::run_server(&cfg).await?,
        Commands::Ask { pdfs, question } => {
            let mut session = open_session(&cfg, &pdfs).await?;
            let reply = session.ask(&question).await?;
            println!("{}", reply);
        }
        Commands::Chat { pdfs } => {
            let session = open_session(&cfg, &pdfs).await?;
            chat_loop(session).await?;
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn read_pdfs(paths: &[PathBuf]) -> Result<Vec<UploadedDocument>> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(UploadedDocument::new(display_name(path), bytes))
        })
        .collect()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Create a session and run the build phase over the given files.
async fn open_session(cfg: &Config, paths: &[PathBuf]) -> Result<Session> {
    let docs = read_pdfs(paths)?;
    let pipeline = Arc::new(Pipeline::from_config(cfg)?);
    let mut session = Session::new(pipeline);

    if atty::is(atty::Stream::Stderr) {
        eprintln!("Processing {} PDF(s)...", docs.len());
    }
    match session.process_uploads(docs).await? {
        UploadOutcome::Processed {
            documents,
            pages,
            chunks,
        } => {
            tracing::info!(documents, pages, chunks, "PDFs processed");
        }
        other => tracing::debug!(?other, "nothing processed"),
    }
    Ok(session)
}

async fn chat_loop(mut session: Session) -> Result<()> {
    let interactive = atty::is(atty::Stream::Stdin);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if interactive {
        println!("Ask a question about your documents. /history shows the chat, /quit exits.");
    }

    loop {
        if interactive {
            print!("> ");
            std::io::stdout().flush()?;
        }

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else { break };
        let question = line.trim();

        match question {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                for msg in session.messages() {
                    println!(
                        "[{}] {}: {}",
                        msg.created_at.format("%H:%M:%S"),
                        msg.role.as_str(),
                        msg.content
                    );
                }
                continue;
            }
            _ => {}
        }

        tokio::select! {
            reply = session.ask(question) => println!("{}\n", reply?),
            _ = tokio::signal::ctrl_c() => eprintln!("cancelled"),
        }
    }

    Ok(())
}
