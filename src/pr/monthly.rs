//! Pull request counts per calendar month.

use chrono::{DateTime, Months, Utc};
use tracing::{debug, info, instrument};

use super::types::PullRequest;
use super::{parse_timestamp, PrError, PER_PAGE};
use crate::config::{Config, RepoId};
use crate::github::GitHubClient;

/// Counts of pull requests created per month, newest month first.
///
/// `boundaries[i]` is the upper end of slot `i`: the window end minus `i`
/// calendar months. Slot `i` holds PRs created in
/// `(boundaries[i + 1], boundaries[i]]`; the last slot also takes
/// everything down to and including `since`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyCounts {
    pub boundaries: Vec<DateTime<Utc>>,
    pub counts: Vec<u64>,
}

impl MonthlyCounts {
    /// One empty slot per month boundary from `end` back to `since`.
    pub fn new(end: DateTime<Utc>, since: DateTime<Utc>) -> Self {
        let boundaries: Vec<DateTime<Utc>> = (0u32..)
            .map_while(|months| end.checked_sub_months(Months::new(months)))
            .take_while(|boundary| *boundary >= since)
            .collect();
        let counts = vec![0; boundaries.len()];
        Self { boundaries, counts }
    }

    fn slot(&self, created: DateTime<Utc>) -> Option<usize> {
        let last = self.counts.len().checked_sub(1)?;
        Some(
            self.boundaries
                .iter()
                .skip(1)
                .position(|lower| created > *lower)
                .unwrap_or(last),
        )
    }

    /// Count a pull request created at `created`.
    pub fn record(&mut self, created: DateTime<Utc>) {
        if let Some(slot) = self.slot(created) {
            self.counts[slot] += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Count pull requests created in each month of the window, summed over all
/// configured repositories.
pub async fn count_monthly(
    client: &GitHubClient,
    config: &Config,
) -> Result<MonthlyCounts, PrError> {
    let mut counts = MonthlyCounts::new(config.window_end(), config.since);
    for repo in &config.repos {
        count_monthly_pull_requests(client, config, repo, &mut counts).await?;
    }
    Ok(counts)
}

/// Walk a repository's pull requests newest-created first, adding each one
/// created at or after `since` to `counts`.
#[instrument(skip(client, config, counts), fields(repo = %repo))]
pub async fn count_monthly_pull_requests(
    client: &GitHubClient,
    config: &Config,
    repo: &RepoId,
    counts: &mut MonthlyCounts,
) -> Result<(), PrError> {
    info!(since = %config.since.to_rfc3339(), "counting monthly pull requests");
    let mut next = Some(config.api_url(&format!(
        "repos/{repo}/pulls?state=all&sort=created&direction=desc&per_page={PER_PAGE}"
    )));
    let mut counted = 0usize;

    'pages: while let Some(url) = next.take() {
        let page = client
            .fetch_list::<PullRequest>(&url)
            .await
            .map_err(|source| PrError::List {
                repo: repo.to_string(),
                source,
            })?;
        for pr in &page.items {
            let created = parse_timestamp("created_at", &pr.created_at, &pr.url)?;
            if created < config.since {
                debug!(created = %created.to_rfc3339(), "reached since boundary");
                break 'pages;
            }
            if config.before.is_some_and(|before| created >= before) {
                continue;
            }
            counts.record(created);
            counted += 1;
        }
        next = page.next;
    }

    debug!(counted, "counted pull requests");
    Ok(())
}
