//! Derived pull request metrics: change volume, size class and the
//! subdirectories that account for most of a change.

use std::collections::HashMap;
use std::fmt;

use super::types::{File, PullRequest};

// Thresholds on total changes (additions + deletions).
const TINY_PR: u64 = 20;
const SMALL_PR: u64 = 100;
const MEDIUM_PR: u64 = 500;
const LARGE_PR: u64 = 1000;

/// Subdirectories are listed until they cover more than 80% of the changes.
const SUBDIRECTORY_SHARE_NUM: u64 = 4;
const SUBDIRECTORY_SHARE_DEN: u64 = 5;

/// Generated and presentation-only files that never count toward a change.
const IGNORED_SUFFIXES: [&str; 4] = [".pb.go", ".pb.cc", ".pb.h", ".css"];

pub fn is_ignored(path: &str) -> bool {
    IGNORED_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

/// Size classification of a pull request, smallest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SizeClass {
    Tiny,
    Small,
    Medium,
    Large,
    Huge,
}

impl SizeClass {
    pub fn from_changes(changes: u64) -> Self {
        if changes < TINY_PR {
            SizeClass::Tiny
        } else if changes < SMALL_PR {
            SizeClass::Small
        } else if changes < MEDIUM_PR {
            SizeClass::Medium
        } else if changes < LARGE_PR {
            SizeClass::Large
        } else {
            SizeClass::Huge
        }
    }

    /// 1 for tiny through 5 for huge.
    pub fn rank(self) -> usize {
        self as usize + 1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SizeClass::Tiny => "tiny",
            SizeClass::Small => "small",
            SizeClass::Medium => "medium",
            SizeClass::Large => "large",
            SizeClass::Huge => "huge",
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Changed files of a pull request grouped by parent directory.
#[derive(Debug, Clone)]
pub struct Subdirectory<'a> {
    /// Parent directory, "/" for files at the repository root
    pub name: String,
    pub files: Vec<&'a File>,
}

impl Subdirectory<'_> {
    pub fn total_changes(&self) -> u64 {
        self.files.iter().map(|f| f.changes).sum()
    }
}

pub fn total_changes(files: &[File]) -> u64 {
    files.iter().map(|f| f.changes).sum()
}

fn parent_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir,
        _ => "/",
    }
}

/// Group `files` by parent directory, largest group first, keeping only the
/// shortest prefix of groups whose changes exceed 80% of the total.
///
/// Groups with equal totals keep the order their first file was seen in.
/// Returns nothing when there are no changes.
pub fn subdirectories(files: &[File]) -> Vec<Subdirectory<'_>> {
    let total = total_changes(files);
    if total == 0 {
        return Vec::new();
    }

    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Subdirectory<'_>> = Vec::new();
    for file in files {
        let dir = parent_dir(&file.path);
        let slot = *index.entry(dir).or_insert_with(|| {
            groups.push(Subdirectory {
                name: dir.to_string(),
                files: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].files.push(file);
    }

    groups.sort_by_key(|group| std::cmp::Reverse(group.total_changes()));

    let mut covered = 0;
    for (i, group) in groups.iter().enumerate() {
        covered += group.total_changes();
        if covered * SUBDIRECTORY_SHARE_DEN > total * SUBDIRECTORY_SHARE_NUM {
            groups.truncate(i + 1);
            break;
        }
    }
    groups
}

impl PullRequest {
    pub fn total_changes(&self) -> u64 {
        total_changes(&self.files)
    }

    pub fn size_class(&self) -> SizeClass {
        SizeClass::from_changes(self.total_changes())
    }

    pub fn subdirectories(&self) -> Vec<Subdirectory<'_>> {
        subdirectories(&self.files)
    }
}

/// Largest change first; equal totals keep their relative order.
pub fn sort_by_total_changes(prs: &mut [PullRequest]) {
    prs.sort_by_key(|pr| std::cmp::Reverse(pr.total_changes()));
}
