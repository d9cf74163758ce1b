//! Shared types describing repository state as seen through the GitHub API.
//!
//! These are the contracts between the `Forge` adapter and the rule table. They
//! carry only the fields the rules look at.

use std::fmt;

use anyhow::{Result, anyhow};

/// `owner/name` identity of a repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name`. Both halves must be non-empty.
    pub fn parse(full_name: &str) -> Result<Self> {
        match full_name.split_once('/') {
            Some((owner, name))
                if !owner.trim().is_empty() && !name.trim().is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner.trim(), name.trim()))
            }
            _ => Err(anyhow!("expected owner/name, got '{full_name}'")),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Repository metadata. Merge settings the API omits are reported as `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub repo: RepoRef,
    pub archived: bool,
    pub fork: bool,
    pub default_branch: String,
    pub allow_rebase_merge: bool,
    pub allow_squash_merge: bool,
    pub delete_branch_on_merge: bool,
}

/// Merge settings written by `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSettings {
    pub allow_rebase_merge: bool,
    pub allow_squash_merge: bool,
    pub delete_branch_on_merge: bool,
}

impl MergeSettings {
    /// Merge commits only; head branches are deleted after merging.
    pub const MERGE_COMMITS_ONLY: Self = Self {
        allow_rebase_merge: false,
        allow_squash_merge: false,
        delete_branch_on_merge: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub protected: bool,
}

/// Required status checks on a protected branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChecks {
    /// Branches must be up to date before merging.
    pub strict: bool,
    pub contexts: Vec<String>,
}

/// Users, teams and apps named by a protection rule (logins and slugs).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Actors {
    pub users: Vec<String>,
    pub teams: Vec<String>,
    pub apps: Vec<String>,
}

/// Pull-request review rules of a protected branch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReviewRules {
    /// Who may dismiss reviews; `None` means the restriction is off.
    pub dismissal_restrictions: Option<Actors>,
    pub dismiss_stale_reviews: bool,
    pub require_code_owner_reviews: bool,
    pub required_approving_review_count: u32,
    pub require_last_push_approval: bool,
    pub bypass_pull_request_allowances: Option<Actors>,
}

/// On/off branch rules. A full protection rewrite resets any rule it does
/// not send, so all of them travel with [`Protection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BranchRules {
    pub required_linear_history: bool,
    pub allow_force_pushes: bool,
    pub allow_deletions: bool,
    pub block_creations: bool,
    pub required_conversation_resolution: bool,
    pub lock_branch: bool,
    pub allow_fork_syncing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Protection {
    pub required_status_checks: Option<StatusChecks>,
    pub enforce_admins: bool,
    pub reviews: Option<ReviewRules>,
    /// Who may push; `None` means anyone with write access.
    pub restrictions: Option<Actors>,
    pub rules: BranchRules,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

/// One item of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    pub sha: String,
    pub kind: EntryKind,
}

/// Decoded file contents plus the blob sha needed to delete or replace it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub path: String,
    pub sha: String,
    pub bytes: Vec<u8>,
}

/// A file under `.github/workflows`.
///
/// `content` is only fetched for workflow names the rules recognize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowFile {
    pub name: String,
    pub content: Option<Vec<u8>>,
}

/// Everything the assessment needs to know about one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub repository: Repository,
    pub tags: Vec<String>,
    pub branch: Branch,
    /// Present only when the default branch is protected.
    pub protection: Option<Protection>,
    /// Raw `.travis.yml`, if the repository has one.
    pub travis: Option<Vec<u8>>,
    /// `None` when `.github/workflows` does not exist.
    pub workflows: Option<Vec<WorkflowFile>>,
}

/// Organization-wide policy the rules are evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Only repositories carrying this tag are in scope.
    pub distrib_tag: String,
}

/// Template workflow bodies used to detect drift in existing workflows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates {
    pub lint: Vec<u8>,
    pub null: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_repo_ref() {
        let repo = RepoRef::parse("lsst/afw").expect("parse");
        assert_eq!(repo, RepoRef::new("lsst", "afw"));
        assert_eq!(repo.to_string(), "lsst/afw");
    }

    #[test]
    fn parse_repo_ref_rejects_malformed() {
        for raw in ["afw", "/afw", "lsst/", "lsst/afw/extra"] {
            assert!(RepoRef::parse(raw).is_err(), "{raw} should not parse");
        }
    }
}
