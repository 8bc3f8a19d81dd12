use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use paperdigest_core::{Config, HttpFetcher, OpenAiClient, ProgressEvent, Summarizer};
use paperdigest_reporting::{ExportFormat, Report};

/// Paper digest - summarize a PDF paper with a hosted file-search assistant
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// URL of the PDF to summarize
    #[arg(required_unless_present = "purge_stores")]
    url: Option<String>,

    /// Path of the summary file
    #[arg(long, default_value = "summary.txt")]
    output: PathBuf,

    /// Print the summary instead of writing a file
    #[arg(long)]
    stdout: bool,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    format: ExportFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// OpenAI API key (defaults to OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Model used by the assistant
    #[arg(long)]
    model: Option<String>,

    /// Directory for the temporary copy of the PDF
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Give up waiting for indexing or generation after this many seconds
    #[arg(long)]
    poll_timeout: Option<u64>,

    /// Ask the chat model about the URL directly, without uploading the PDF
    #[arg(long, conflicts_with = "purge_stores")]
    quick: bool,

    /// Delete every vector store on the account and exit
    #[arg(long)]
    purge_stores: bool,
}

/// Terminal styling that honours `--no-color`.
#[derive(Clone, Copy)]
struct Style {
    color: bool,
}

impl Style {
    fn ok(&self, s: &str) -> String {
        if self.color {
            s.green().to_string()
        } else {
            s.to_string()
        }
    }

    fn warn(&self, s: &str) -> String {
        if self.color {
            s.yellow().to_string()
        } else {
            s.to_string()
        }
    }

    fn dim(&self, s: &str) -> String {
        if self.color {
            s.dimmed().to_string()
        } else {
            s.to_string()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let style = Style {
        color: !args.no_color,
    };

    // Resolve config from CLI flags > env vars > defaults
    let mut config = Config::from_env_with_key(args.api_key.clone())
        .context("no API key; pass --api-key or set OPENAI_API_KEY")?;
    if let Some(model) = args.model.clone() {
        config.model = model;
    }
    if let Some(dir) = args.scratch_dir.clone() {
        config.scratch_dir = dir;
    }
    if let Some(secs) = args.poll_timeout {
        config.poll.timeout = Duration::from_secs(secs);
    }

    log::debug!(
        "model={} base_url={} scratch_dir={} poll_timeout={}s",
        config.model,
        config.base_url,
        config.scratch_dir.display(),
        config.poll.timeout.as_secs()
    );

    let client = OpenAiClient::new(&config).context("failed to build API client")?;
    let fetcher = HttpFetcher::new(Duration::from_secs(config.request_timeout_secs))?;
    let summarizer = Summarizer::new(client, fetcher, config);

    if args.purge_stores {
        let count = summarizer
            .purge_stores(|id| println!("{} {}", style.ok("deleted"), id))
            .await
            .context("failed to purge vector stores")?;
        println!("{} {} vector stores deleted", style.ok("done:"), count);
        return Ok(());
    }

    let url = args
        .url
        .clone()
        .context("a PDF URL is required")?;

    if args.quick {
        let reply = summarizer
            .quick_summary(&url)
            .await
            .context("quick summary failed")?;
        emit(&args, &Report::Quick { url: &url, reply: &reply }, style)?;
        return Ok(());
    }

    // Handle Ctrl+C for clean shutdown: polling stops and remote resources are released
    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_for_signal.cancel();
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg} {elapsed}")?);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("fetching {url}"));

    let result = summarizer
        .summarize(&url, &cancel, |event| report_progress(&spinner, style, event))
        .await;
    spinner.finish_and_clear();

    let summary = result.with_context(|| format!("failed to summarize {url}"))?;
    emit(&args, &Report::Summary(&summary), style)?;
    Ok(())
}

fn report_progress(spinner: &ProgressBar, style: Style, event: ProgressEvent) {
    match event {
        ProgressEvent::Fetched { url, bytes } => {
            spinner.println(format!("{} {} ({} bytes)", style.ok("fetched"), url, bytes));
        }
        ProgressEvent::Staged { path } => {
            spinner.println(format!("{} {}", style.dim("staged"), path.display()));
        }
        ProgressEvent::IndexCreated { store_id } => {
            spinner.println(format!("{} {}", style.ok("vector store"), store_id));
        }
        ProgressEvent::Uploading { filename } => {
            spinner.set_message(format!("indexing {filename}"));
        }
        ProgressEvent::Uploaded { file_id, elapsed } => {
            spinner.println(format!(
                "{} {} in {:.2}s",
                style.ok("indexed"),
                file_id,
                elapsed.as_secs_f64()
            ));
        }
        ProgressEvent::AssistantReady { assistant_id } => {
            spinner.println(format!("{} {}", style.ok("assistant"), assistant_id));
        }
        ProgressEvent::RunStarted { run_id, .. } => {
            spinner.set_message(format!("summarizing ({run_id})"));
        }
        ProgressEvent::RunFinished { status, elapsed } => {
            spinner.println(format!(
                "{} {} in {:.2}s",
                style.ok("run"),
                status,
                elapsed.as_secs_f64()
            ));
        }
        ProgressEvent::Warning { message } => {
            spinner.println(format!("{} {}", style.warn("warning:"), message));
        }
        ProgressEvent::CleanedUp { released } => {
            spinner.println(format!(
                "{} {} remote resources",
                style.dim("released"),
                released
            ));
        }
    }
}

fn emit(args: &Args, report: &Report<'_>, style: Style) -> anyhow::Result<()> {
    if args.stdout {
        let body = paperdigest_reporting::render(report, args.format)?;
        print!("{body}");
        return Ok(());
    }
    paperdigest_reporting::write_summary(&args.output, report, args.format)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!("{} {}", style.ok("wrote"), args.output.display());
    Ok(())
}
