mod config;
mod digest;
mod github;
mod pr;

use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use config::{Config, ConfigFile, Overrides};
use github::GitHubClient;
use pr::metrics::sort_by_total_changes;
use pr::progress::TerminalProgress;

/// Generate an HTML digest of repository activity.
///
/// The digest has two sections: newly opened pull requests and recently
/// merged pull requests, each ordered by total change size. Every pull
/// request lists its author, dates, and the subdirectories it touches most.
///
/// Without a token GitHub allows only a handful of anonymous requests per
/// hour; pass --token or set GITHUB_TOKEN for authorized rate limits.
#[derive(Parser, Debug)]
#[command(name = "repo-digest", version, about)]
struct Cli {
    /// GitHub owner and repository, formatted as :owner/:repo (repeatable)
    #[arg(short, long = "repo")]
    repos: Vec<String>,

    /// Fetch all opened and closed pull requests since this RFC 3339 time
    /// (default: start of today)
    #[arg(short, long)]
    since: Option<String>,

    /// Ignore activity at or after this RFC 3339 time
    #[arg(short, long)]
    before: Option<String>,

    /// GitHub access token for authorized rate limits
    #[arg(short, long)]
    token: Option<String>,

    /// HTML template file (see templates/digest.html)
    #[arg(short = 'p', long)]
    template: Option<PathBuf>,

    /// Output directory
    #[arg(short, long = "outdir")]
    out_dir: Option<PathBuf>,

    /// Inline stylesheet rules into style attributes for email clients
    #[arg(long)]
    inline_styles: bool,

    /// API root for GitHub Enterprise (e.g. https://ghe.example.com/api/v3/)
    #[arg(long)]
    host: Option<String>,

    /// Config file (default: .repo-digest.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print pull requests created per month instead of writing a digest
    #[arg(long)]
    monthly: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            repos: self.repos.clone(),
            token: self.token.clone(),
            host: self.host.clone(),
            since: self.since.clone(),
            before: self.before.clone(),
            template: self.template.clone(),
            out_dir: self.out_dir.clone(),
            inline_styles: self.inline_styles,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "repo-digest failed");
            eprintln!("repo-digest: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    info!("loading configuration");
    let file = ConfigFile::load(cli.config.as_deref())?;
    let config = Config::resolve(file, cli.overrides(), Utc::now())?;
    debug!(repos = config.repos.len(), since = %config.since.to_rfc3339(), host = %config.host, "resolved configuration");

    if cli.monthly {
        return run_monthly(&config).await;
    }

    // Fail on a missing or unreadable template before any network activity.
    let template = digest::load_template(config.template()?)?;
    let client = GitHubClient::from_config(&config)?;

    let repos = config
        .repos
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let span = info_span!("digest", repos = %repos);

    let mut result = async {
        info!("fetching GitHub data");
        pr::query(&client, &config, &mut TerminalProgress).await
    }
    .instrument(span.clone())
    .await?;

    span.in_scope(|| -> Result<(), Box<dyn std::error::Error>> {
        sort_by_total_changes(&mut result.open);
        sort_by_total_changes(&mut result.closed);

        info!(open = result.open.len(), closed = result.closed.len(), "creating digest");
        let path = digest::write_digest(&config, &template, &result.open, &result.closed)?;
        println!("digest: {}", path.display());

        let next = pr::next_since(&result.open, &result.closed, Utc::now());
        println!("nextsince: {}", next.to_rfc3339());
        Ok(())
    })
}

async fn run_monthly(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let client = GitHubClient::from_config(config)?;
    let counts = pr::monthly::count_monthly(&client, config).await?;
    info!(months = counts.counts.len(), total = counts.total(), "counted monthly pull requests");
    for (boundary, count) in counts.boundaries.iter().zip(&counts.counts) {
        println!("{} {}", boundary.format("%Y-%m-%d"), count);
    }
    Ok(())
}
