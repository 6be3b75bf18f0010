use chrono::{DateTime, Local};
use serde::Serialize;

use crate::pr::metrics::Subdirectory;
use crate::pr::progress::format_count;
use crate::pr::types::{CommitMessage, File};
use crate::pr::PullRequest;

/// Template context for the whole digest.
#[derive(Debug, Serialize)]
pub struct DigestView {
    /// Comma-separated repository list, e.g. "org/a, org/b"
    pub repo: String,
    pub repos: Vec<String>,
    pub since: String,
    pub before: Option<String>,
    pub generated_at: String,
    pub open: Vec<PullRequestView>,
    pub closed: Vec<PullRequestView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub login: String,
    pub avatar_url: String,
}

/// Template context for one pull request, including derived metrics.
#[derive(Debug, Clone, Serialize)]
pub struct PullRequestView {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
    pub user: UserView,
    /// Raw Markdown; render with the `markdown` filter
    pub body: String,
    pub created_at: String,
    pub created_at_str: String,
    pub closed_at: String,
    pub closed_at_str: String,
    pub additions: u64,
    pub deletions: u64,
    pub comments: u64,
    pub review_comments: u64,
    pub commits: u64,
    pub changed_files: u64,
    pub additions_str: String,
    pub deletions_str: String,
    pub comments_str: String,
    pub total_changes: u64,
    pub total_changes_str: String,
    /// "tiny" through "huge"
    pub size: &'static str,
    /// 1 (tiny) through 5 (huge)
    pub size_rank: usize,
    pub subdirectories: Vec<SubdirectoryView>,
    pub files: Vec<FileView>,
    pub commit_messages: Vec<CommitMessage>,
}

/// A changed file that survived ignore filtering.
#[derive(Debug, Clone, Serialize)]
pub struct FileView {
    pub path: String,
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    pub changes: u64,
}

impl From<&File> for FileView {
    fn from(file: &File) -> Self {
        Self {
            path: file.path.clone(),
            status: file.status.clone(),
            additions: file.additions,
            deletions: file.deletions,
            changes: file.changes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubdirectoryView {
    pub name: String,
    pub total_changes: u64,
    pub total_changes_str: String,
    pub files: Vec<String>,
}

impl From<&Subdirectory<'_>> for SubdirectoryView {
    fn from(subdir: &Subdirectory<'_>) -> Self {
        let total = subdir.total_changes();
        Self {
            name: subdir.name.clone(),
            total_changes: total,
            total_changes_str: format_count(total),
            files: subdir.files.iter().map(|f| f.path.clone()).collect(),
        }
    }
}

impl From<&PullRequest> for PullRequestView {
    fn from(pr: &PullRequest) -> Self {
        let total = pr.total_changes();
        let size = pr.size_class();
        let user = pr.user.clone().unwrap_or_default();
        let closed_at = pr.closed_at.clone().unwrap_or_default();

        Self {
            id: pr.id,
            number: pr.number,
            title: pr.title.clone(),
            html_url: pr.html_url.clone(),
            state: pr.state.clone(),
            user: UserView {
                login: user.login,
                avatar_url: user.avatar_url,
            },
            body: pr.body.clone().unwrap_or_default(),
            created_at_str: display_time(&pr.created_at),
            created_at: pr.created_at.clone(),
            closed_at_str: display_time(&closed_at),
            closed_at,
            additions: pr.additions,
            deletions: pr.deletions,
            comments: pr.comments,
            review_comments: pr.review_comments,
            commits: pr.commits,
            changed_files: pr.changed_files,
            additions_str: format_count(pr.additions),
            deletions_str: format_count(pr.deletions),
            comments_str: format_count(pr.comments),
            total_changes: total,
            total_changes_str: format_count(total),
            size: size.as_str(),
            size_rank: size.rank(),
            subdirectories: pr.subdirectories().iter().map(SubdirectoryView::from).collect(),
            files: pr.files.iter().map(FileView::from).collect(),
            commit_messages: pr.commit_messages.clone(),
        }
    }
}

/// Render an RFC 3339 timestamp in local time, e.g. "Mon Oct 12 09:30:00".
/// Values that don't parse are returned unchanged.
pub fn display_time(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Local).format("%a %b %e %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pr::types::User;

    fn sample_pr() -> PullRequest {
        PullRequest {
            number: 42,
            title: "Add OAuth2 login flow".to_string(),
            html_url: "https://github.com/org/repo/pull/42".to_string(),
            state: "open".to_string(),
            user: Some(User {
                login: "alice".to_string(),
                avatar_url: "https://avatars/alice".to_string(),
            }),
            created_at: "2026-10-11T00:00:00Z".to_string(),
            additions: 1200,
            deletions: 45,
            comments: 3,
            commit_messages: vec![CommitMessage {
                message: "auth: add oauth".to_string(),
                url: String::new(),
            }],
            files: vec![
                File {
                    path: "pkg/auth/oauth.go".to_string(),
                    changes: 150,
                    ..File::default()
                },
                File {
                    path: "README.md".to_string(),
                    changes: 10,
                    ..File::default()
                },
            ],
            ..PullRequest::default()
        }
    }

    #[test]
    fn test_pull_request_view() {
        let view = PullRequestView::from(&sample_pr());
        assert_eq!(view.user.login, "alice");
        assert_eq!(view.additions_str, "1,200");
        assert_eq!(view.total_changes, 160);
        assert_eq!(view.size, "medium");
        assert_eq!(view.size_rank, 3);
        assert_eq!(view.subdirectories.len(), 1);
        assert_eq!(view.subdirectories[0].name, "pkg/auth");
        assert_eq!(view.files.len(), 2);
        assert_eq!(view.commit_messages[0].message, "auth: add oauth");
        assert_eq!(view.closed_at, "");
        assert_eq!(view.body, "");
    }

    #[test]
    fn test_view_without_user() {
        let pr = PullRequest {
            user: None,
            ..sample_pr()
        };
        let view = PullRequestView::from(&pr);
        assert_eq!(view.user.login, "");
    }

    #[test]
    fn test_display_time() {
        assert_eq!(display_time("not a time"), "not a time");
        assert_eq!(display_time(""), "");
        let shown = display_time("2026-10-11T09:30:00Z");
        assert!(shown.contains(':'));
        assert_ne!(shown, "2026-10-11T09:30:00Z");
    }
}
