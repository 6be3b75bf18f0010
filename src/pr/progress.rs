use colored::Colorize;
use tracing::debug;

use crate::config::RepoId;

/// Running totals while listing a repository's pull requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingProgress {
    pub open: usize,
    pub closed: usize,
    /// Records fetched so far, matching or not
    pub total: usize,
}

/// Receives progress while pull requests are listed and detailed.
///
/// Counts never decrease within one pass.
pub trait ProgressReporter {
    fn listed(&mut self, repo: &RepoId, progress: ListingProgress);

    fn detailed(&mut self, completed: usize, total: usize);
}

/// Prints progress lines to stderr.
#[derive(Debug, Default)]
pub struct TerminalProgress;

impl ProgressReporter for TerminalProgress {
    fn listed(&mut self, repo: &RepoId, progress: ListingProgress) {
        debug!(%repo, open = progress.open, closed = progress.closed, total = progress.total, "listing progress");
        eprintln!(
            "{} {} open {} closed {} total pull requests in {}",
            "***".bold(),
            format_count(progress.open as u64).green(),
            format_count(progress.closed as u64).cyan(),
            format_count(progress.total as u64),
            repo
        );
    }

    fn detailed(&mut self, completed: usize, total: usize) {
        debug!(completed, total, "detail progress");
        eprintln!(
            "{} detailed info for {} of {} pull requests",
            "***".bold(),
            format_count(completed as u64).green(),
            format_count(total as u64)
        );
    }
}

/// Format a count with comma thousands separators, e.g. 1234567 -> "1,234,567".
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(123456), "123,456");
        assert_eq!(format_count(1234567), "1,234,567");
    }

    #[test]
    fn test_terminal_progress_does_not_panic() {
        let repo = RepoId::parse("org/repo").unwrap();
        let mut progress = TerminalProgress;
        progress.listed(&repo, ListingProgress { open: 1, closed: 2, total: 1500 });
        progress.detailed(1, 3);
    }
}
