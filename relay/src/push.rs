//! GitHub push event payload and the theme path filter.

use indexmap::IndexSet;
use serde::Deserialize;

pub const EVENT_HEADER: &str = "x-github-event";

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Top-level directories of a theme. Anything else in the repository is not
/// synced.
pub const THEME_DIRECTORIES: &[&str] = &[
    "assets/",
    "config/",
    "layout/",
    "locales/",
    "sections/",
    "snippets/",
    "templates/",
];

#[derive(Debug, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub commits: Vec<Commit>,
    pub repository: Option<Repository>,
    pub head_commit: Option<HeadCommit>,
}

#[derive(Debug, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct HeadCommit {
    pub id: String,
}

impl PushEvent {
    /// Branch name the push went to; `None` for tag pushes.
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.as_deref()?.strip_prefix(BRANCH_REF_PREFIX)
    }

    /// Added and modified paths across all commits, each once, in the order
    /// they first appear. Removed paths have nothing left to sync.
    pub fn changed_files(&self) -> Vec<String> {
        let mut files = IndexSet::new();
        for commit in &self.commits {
            files.extend(commit.added.iter().cloned());
            files.extend(commit.modified.iter().cloned());
        }
        files.into_iter().collect()
    }

    pub fn repository_name(&self) -> Option<&str> {
        self.repository.as_ref().map(|r| r.full_name.as_str())
    }

    pub fn head_commit_id(&self) -> Option<&str> {
        self.head_commit.as_ref().map(|c| c.id.as_str())
    }
}

pub fn is_theme_file(path: &str) -> bool {
    THEME_DIRECTORIES.iter().any(|dir| path.starts_with(dir))
}

pub fn filter_theme_files(paths: Vec<String>) -> Vec<String> {
    paths.into_iter().filter(|p| is_theme_file(p)).collect()
}
