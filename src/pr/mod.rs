pub mod metrics;
pub mod monthly;
pub mod progress;
pub mod types;

pub use progress::{ListingProgress, ProgressReporter};
pub use types::PullRequest;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, RepoId};
use crate::github::{FetchError, GitHubClient};
use types::{CommitEntry, File};

/// Page size requested from list endpoints (GitHub's maximum).
pub(crate) const PER_PAGE: u32 = 100;

#[derive(Debug, Error)]
pub enum PrError {
    #[error("GitHub API request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("listing pull requests of {repo} failed: {source}")]
    List {
        repo: String,
        #[source]
        source: FetchError,
    },

    #[error("couldn't parse {field} {value:?} of {url}: {source}")]
    TimeParse {
        field: &'static str,
        value: String,
        url: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Pull requests opened and merged within the window.
#[derive(Debug, Default)]
pub struct QueryResult {
    pub open: Vec<PullRequest>,
    pub closed: Vec<PullRequest>,
}

enum Section {
    Open,
    Closed,
}

pub(crate) fn parse_timestamp(
    field: &'static str,
    value: &str,
    url: &str,
) -> Result<DateTime<Utc>, PrError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| PrError::TimeParse {
            field,
            value: value.to_string(),
            url: url.to_string(),
            source,
        })
}

/// Query every configured repository, then fetch details for each matching
/// pull request. Listing of all repositories completes before any detail is
/// fetched; the first error aborts the whole query.
pub async fn query(
    client: &GitHubClient,
    config: &Config,
    progress: &mut dyn ProgressReporter,
) -> Result<QueryResult, PrError> {
    let mut result = QueryResult::default();
    for repo in &config.repos {
        let listed = query_pull_requests(client, config, repo, progress).await?;
        result.open.extend(listed.open);
        result.closed.extend(listed.closed);
    }

    let total = result.open.len() + result.closed.len();
    info!(total, "querying detailed info for each pull request");
    for (i, pr) in result
        .open
        .iter_mut()
        .chain(result.closed.iter_mut())
        .enumerate()
    {
        fetch_details(client, pr).await?;
        progress.detailed(i + 1, total);
    }

    Ok(result)
}

/// List a repository's pull requests, most recently updated first, and keep
/// those opened or merged within the window.
///
/// Listing stops at the first record not updated after `since`; everything
/// that follows was updated even earlier.
#[instrument(skip(client, config, progress), fields(repo = %repo))]
pub async fn query_pull_requests(
    client: &GitHubClient,
    config: &Config,
    repo: &RepoId,
    progress: &mut dyn ProgressReporter,
) -> Result<QueryResult, PrError> {
    info!(since = %config.since.to_rfc3339(), "querying pull requests opened or closed after since");
    let mut next = Some(config.api_url(&format!(
        "repos/{repo}/pulls?state=all&sort=updated&direction=desc&per_page={PER_PAGE}"
    )));
    let mut result = QueryResult::default();
    let mut counts = ListingProgress::default();
    let mut pages = 0usize;

    'pages: while let Some(url) = next.take() {
        let page = client
            .fetch_list::<PullRequest>(&url)
            .await
            .map_err(|source| PrError::List {
                repo: repo.to_string(),
                source,
            })?;
        pages += 1;
        counts.total += page.items.len();

        for pr in page.items {
            let updated = parse_timestamp("updated_at", &pr.updated_at, &pr.url)?;
            if updated <= config.since {
                debug!(number = pr.number, updated = %updated.to_rfc3339(), "reached since boundary");
                progress.listed(repo, counts);
                break 'pages;
            }
            match classify(&pr, config)? {
                Some(Section::Open) => {
                    counts.open += 1;
                    result.open.push(pr);
                }
                Some(Section::Closed) => {
                    counts.closed += 1;
                    result.closed.push(pr);
                }
                None => {}
            }
        }

        progress.listed(repo, counts);
        next = page.next;
    }

    info!(
        pages,
        open = result.open.len(),
        closed = result.closed.len(),
        "listed pull requests"
    );
    Ok(result)
}

/// Decide which section a listed pull request belongs in, if any.
/// Closed pull requests that were never merged are dropped.
fn classify(pr: &PullRequest, config: &Config) -> Result<Option<Section>, PrError> {
    match pr.state.as_str() {
        "open" => {
            let created = parse_timestamp("created_at", &pr.created_at, &pr.url)?;
            Ok(config.in_window(created).then_some(Section::Open))
        }
        "closed" => {
            if !pr.is_merged() {
                return Ok(None);
            }
            let closed_at = pr.closed_at.as_deref().unwrap_or_default();
            let closed = parse_timestamp("closed_at", closed_at, &pr.url)?;
            Ok(config.in_window(closed).then_some(Section::Closed))
        }
        other => {
            debug!(number = pr.number, state = other, "skipping pull request with unknown state");
            Ok(None)
        }
    }
}

/// Replace a listed pull request with its full record and attach its commit
/// messages and changed files. Ignored files are dropped.
#[instrument(skip(client, pr), fields(number = pr.number))]
pub async fn fetch_details(client: &GitHubClient, pr: &mut PullRequest) -> Result<(), PrError> {
    let url = pr.url.clone();
    let detail: PullRequest = client.fetch_one(&url).await?;
    let commits: Vec<CommitEntry> = client.fetch_all(&format!("{url}/commits")).await?;
    let files: Vec<File> = client.fetch_all(&format!("{url}/files")).await?;

    let fetched = files.len();
    let files: Vec<File> = files
        .into_iter()
        .filter(|f| !metrics::is_ignored(&f.path))
        .collect();
    debug!(
        commits = commits.len(),
        files = files.len(),
        ignored = fetched - files.len(),
        "fetched pull request details"
    );

    *pr = detail;
    if pr.url.is_empty() {
        pr.url = url;
    }
    pr.commit_messages = commits.into_iter().map(|entry| entry.commit).collect();
    pr.files = files;
    Ok(())
}

/// The `since` to use for the next run: the latest open creation or merged
/// closure seen, or `now` when nothing usable was found.
///
/// Unparseable timestamps are logged and skipped.
pub fn next_since(
    open: &[PullRequest],
    closed: &[PullRequest],
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let opened = open
        .iter()
        .map(|pr| ("created_at", pr.created_at.as_str(), pr));
    let merged = closed
        .iter()
        .map(|pr| ("closed_at", pr.closed_at.as_deref().unwrap_or_default(), pr));

    opened
        .chain(merged)
        .filter_map(|(field, value, pr)| match parse_timestamp(field, value, &pr.url) {
            Ok(t) => Some(t),
            Err(err) => {
                warn!(error = %err, "ignoring timestamp for next since");
                None
            }
        })
        .max()
        .unwrap_or(now)
}
