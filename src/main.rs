//! risk-analyst - credit-risk reports from financial statements via Gemini.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use financial_risk_analyst::{
    AnalyzerConfig, CredentialProvider, DocumentAnalyzer, EnvCredential, ProgressEvent,
    RunPhase, StaticCredential, UploadedDocument,
};

const PDF_MIME: &str = "application/pdf";

#[derive(Parser)]
#[command(name = "risk-analyst")]
#[command(about = "Credit-risk analysis of financial statements using Gemini")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gemini model to use
    #[arg(long, global = true)]
    model: Option<String>,

    /// API key (defaults to the variable named by `api_key_var`, usually GEMINI_API_KEY)
    #[arg(long, global = true, env = "RISK_ANALYST_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Prompt template file replacing the built-in credit risk prompt
    #[arg(long, global = true)]
    prompt_file: Option<PathBuf>,

    /// Built-in prompt template: credit_risk (default, Spanish) or credit_risk_en
    #[arg(long, global = true)]
    prompt_template: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more financial statements (balance sheet, income statement, comparatives)
    Analyze {
        /// Documents in chronological order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Accept files that are not PDFs
        #[arg(long)]
        any_type: bool,
        /// Do not draw a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Print the active prompt template
    Prompt,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "financial_risk_analyst=info"
    } else {
        "financial_risk_analyst=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = AnalyzerConfig::load(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config = config.with_model(model);
    }
    if let Some(path) = &cli.prompt_file {
        config.prompt_file = Some(path.clone());
    }
    if let Some(name) = &cli.prompt_template {
        config.prompt_template = Some(name.clone());
    }

    match cli.command {
        Commands::Prompt => {
            let prompt = config.prompt_template()?;
            println!("{}", prompt.text());
        }
        Commands::Analyze {
            files,
            output,
            any_type,
            no_progress,
        } => {
            let provider: Box<dyn CredentialProvider> = match cli.api_key {
                Some(key) => Box::new(StaticCredential::new(key)?),
                None => Box::new(EnvCredential::new(&config.api_key_var)),
            };
            let credential = provider.resolve()?;

            let documents = read_documents(&files, any_type).await?;
            let analyzer = DocumentAnalyzer::from_config(credential, &config)?;

            let (tx, rx) = mpsc::channel(32);
            let bar = if no_progress {
                ProgressBar::hidden()
            } else {
                ProgressBar::new(100)
            };
            let display = tokio::spawn(show_progress(bar, rx));

            let result = analyzer.run(&documents, Some(tx)).await;
            display.await??;
            let report = result?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, &report)
                        .await
                        .with_context(|| format!("writing report to {}", path.display()))?;
                    eprintln!("Report written to {}", path.display());
                }
                None => println!("{}", report),
            }
        }
    }

    Ok(())
}

async fn read_documents(paths: &[PathBuf], any_type: bool) -> anyhow::Result<Vec<UploadedDocument>> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        if !any_type && !is_pdf(path) {
            bail!(
                "{} is not a PDF (use --any-type to send it anyway)",
                path.display()
            );
        }
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("invalid file name: {}", path.display()))?;
        documents.push(UploadedDocument::new(name, bytes));
    }
    Ok(documents)
}

fn is_pdf(path: &Path) -> bool {
    mime_guess::from_path(path).first_raw() == Some(PDF_MIME)
}

async fn show_progress(
    bar: ProgressBar,
    mut rx: mpsc::Receiver<ProgressEvent>,
) -> anyhow::Result<()> {
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );

    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Uploading { index, total, name } => {
                bar.set_message(format!("Uploading file {}/{}: {}", index + 1, total, name));
            }
            ProgressEvent::Progress { fraction } => {
                bar.set_position((fraction * 100.0).round() as u64);
            }
            ProgressEvent::Phase(RunPhase::Generating) => {
                bar.set_message("Cross-checking documents and computing score...");
            }
            ProgressEvent::Phase(RunPhase::Succeeded) => {
                bar.set_message("Analysis complete");
            }
            ProgressEvent::Cleared => bar.finish_and_clear(),
            // The error itself is reported by main.
            ProgressEvent::Failed { .. } | ProgressEvent::Phase(_) => {}
        }
    }

    Ok(())
}
