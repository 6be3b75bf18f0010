use serde::{Deserialize, Serialize};

/// A pull request as returned by the GitHub pulls API.
///
/// The listing endpoint returns a summary; the detail pass replaces it with
/// the full record and fills in `commit_messages` and `files`.
/// Unknown fields are ignored and absent ones default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PullRequest {
    /// API URL of this pull request
    pub url: String,
    pub id: u64,
    pub html_url: String,
    pub number: u64,
    /// "open" or "closed"
    pub state: String,
    pub title: String,
    pub user: Option<User>,
    /// Markdown description
    pub body: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub closed_at: Option<String>,
    pub merged_at: Option<String>,
    pub comments: u64,
    pub review_comments: u64,
    pub commits: u64,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    #[serde(skip)]
    pub commit_messages: Vec<CommitMessage>,
    #[serde(skip)]
    pub files: Vec<File>,
}

impl PullRequest {
    /// Closed pull requests only count when they were merged.
    pub fn is_merged(&self) -> bool {
        self.merged_at.as_deref().is_some_and(|m| !m.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct User {
    pub login: String,
    pub avatar_url: String,
}

/// A file changed by a pull request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct File {
    #[serde(rename = "filename")]
    pub path: String,
    /// "added", "modified", "removed", "renamed", ...
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    /// additions + deletions as reported by GitHub
    pub changes: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CommitMessage {
    pub message: String,
    pub url: String,
}

/// Entry of the pull request commits resource; only the nested commit is kept.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CommitEntry {
    pub commit: CommitMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pull_request_summary() {
        let json = r#"{
            "url": "https://api.github.com/repos/org/repo/pulls/42",
            "id": 1001,
            "number": 42,
            "state": "closed",
            "title": "Add OAuth2 login flow",
            "user": { "login": "alice", "avatar_url": "https://avatars/alice", "site_admin": false },
            "body": null,
            "created_at": "2026-10-01T10:00:00Z",
            "updated_at": "2026-10-02T10:00:00Z",
            "closed_at": "2026-10-02T09:00:00Z",
            "merged_at": "2026-10-02T09:00:00Z",
            "locked": false
        }"#;
        let pr: PullRequest = serde_json::from_str(json).unwrap();
        assert_eq!(pr.number, 42);
        assert_eq!(pr.user.as_ref().map(|u| u.login.as_str()), Some("alice"));
        assert!(pr.body.is_none());
        assert!(pr.is_merged());
        assert_eq!(pr.additions, 0);
        assert!(pr.files.is_empty());
    }

    #[test]
    fn test_unmerged_pull_request() {
        let pr: PullRequest =
            serde_json::from_str(r#"{ "state": "closed", "merged_at": null }"#).unwrap();
        assert!(!pr.is_merged());

        let pr = PullRequest {
            merged_at: Some(String::new()),
            ..PullRequest::default()
        };
        assert!(!pr.is_merged());
    }

    #[test]
    fn test_decode_file_and_commit() {
        let file: File = serde_json::from_str(
            r#"{ "sha": "abc", "filename": "pkg/sql/plan.go", "status": "modified",
                 "additions": 10, "deletions": 2, "changes": 12, "patch": "@@" }"#,
        )
        .unwrap();
        assert_eq!(file.path, "pkg/sql/plan.go");
        assert_eq!(file.changes, 12);

        let entry: CommitEntry = serde_json::from_str(
            r#"{ "sha": "abc", "commit": { "message": "sql: fix plan", "url": "https://c" } }"#,
        )
        .unwrap();
        assert_eq!(entry.commit.message, "sql: fix plan");
    }
}
