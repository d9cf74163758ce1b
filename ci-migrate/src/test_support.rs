//! Test-only helpers: repository fixtures and an in-memory [`Forge`].

use std::cell::RefCell;
use std::collections::BTreeMap;

use anyhow::{Result, anyhow};

use crate::core::types::{
    Branch, ContentEntry, EntryKind, FileContent, MergeSettings, Policy, Protection, RepoRef,
    Repository, Snapshot, StatusChecks, Templates, WorkflowFile,
};
use crate::io::config::MigrateConfig;
use crate::io::github::Forge;

/// A `.travis.yml` that the flake8 matcher accepts.
pub const FLAKE8_TRAVIS: &str = "sudo: false
language: python
matrix:
  include:
    - python: '3.8'
      install:
        - pip install -r <(curl https://raw.githubusercontent.com/lsst/linting/master/requirements.txt)
      script: flake8
";

pub const LINT_TEMPLATE: &str = "name: lint\non: [push, pull_request]\njobs:\n  lint: {}\n";
pub const NULL_TEMPLATE: &str = "name: null\non: [push, pull_request]\njobs:\n  null_check: {}\n";
pub const SHELLCHECK_TEMPLATE: &str = "name: shellcheck\njobs:\n  shellcheck: {}\n";
pub const YAMLLINT_TEMPLATE: &str = "name: yamllint\njobs:\n  lint: {}\n";

pub const TAG: &str = "w.2020.47";

/// Unarchived, non-fork `lsst/<name>` on `main` with merge settings already off.
pub fn repository(name: &str) -> Repository {
    Repository {
        repo: RepoRef::new("lsst", name),
        archived: false,
        fork: false,
        default_branch: "main".to_string(),
        allow_rebase_merge: false,
        allow_squash_merge: false,
        delete_branch_on_merge: true,
    }
}

pub fn policy() -> Policy {
    Policy {
        distrib_tag: TAG.to_string(),
    }
}

pub fn templates() -> Templates {
    Templates {
        lint: LINT_TEMPLATE.as_bytes().to_vec(),
        null: NULL_TEMPLATE.as_bytes().to_vec(),
    }
}

/// Tagged, unprotected repository with neither Travis nor workflows.
pub fn snapshot(name: &str) -> Snapshot {
    Snapshot {
        repository: repository(name),
        tags: vec![TAG.to_string()],
        branch: Branch {
            name: "main".to_string(),
            protected: false,
        },
        protection: None,
        travis: None,
        workflows: None,
    }
}

pub fn protection(contexts: &[&str], strict: bool, enforce_admins: bool) -> Protection {
    Protection {
        required_status_checks: Some(StatusChecks {
            strict,
            contexts: contexts.iter().map(|context| context.to_string()).collect(),
        }),
        enforce_admins,
        ..Protection::default()
    }
}

pub fn workflow_file(name: &str, content: &str) -> WorkflowFile {
    WorkflowFile {
        name: name.to_string(),
        content: Some(content.as_bytes().to_vec()),
    }
}

/// Config pointing at the fake template repository.
pub fn config() -> MigrateConfig {
    MigrateConfig::default()
}

/// State of one repository held by [`FakeForge`].
#[derive(Debug, Clone)]
pub struct FakeRepo {
    pub repository: Repository,
    pub tags: Vec<String>,
    /// Protection of the default branch; `None` means unprotected.
    pub protection: Option<Protection>,
    pub files: BTreeMap<String, Vec<u8>>,
    /// Any call touching this repository fails (except listing).
    pub broken: bool,
}

impl FakeRepo {
    /// Tagged repository with no files and no protection.
    pub fn new(name: &str) -> Self {
        Self {
            repository: repository(name),
            tags: vec![TAG.to_string()],
            protection: None,
            files: BTreeMap::new(),
            broken: false,
        }
    }

    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files
            .insert(path.to_string(), contents.as_bytes().to_vec());
        self
    }

    pub fn with_protection(mut self, protection: Protection) -> Self {
        self.protection = Some(protection);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|tag| tag.to_string()).collect();
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

/// A write performed through [`FakeForge`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    MergeSettings {
        repo: String,
        settings: MergeSettings,
    },
    AdminEnforcement {
        repo: String,
        branch: String,
        enabled: bool,
    },
    RequiredChecks {
        repo: String,
        branch: String,
        checks: StatusChecks,
    },
    PutProtection {
        repo: String,
        branch: String,
        protection: Protection,
    },
    DeleteFile {
        repo: String,
        path: String,
        sha: String,
        message: String,
    },
    CreateFile {
        repo: String,
        path: String,
        message: String,
    },
}

/// In-memory [`Forge`] that applies and records every write.
#[derive(Debug, Default)]
pub struct FakeForge {
    repos: RefCell<BTreeMap<String, FakeRepo>>,
    mutations: RefCell<Vec<Mutation>>,
}

impl FakeForge {
    /// Forge holding the template repository `lsst/.github` with all four templates.
    pub fn new() -> Self {
        let forge = Self::default();
        let mut templates = FakeRepo::new(".github")
            .with_file("workflow-templates/lint.yaml", LINT_TEMPLATE)
            .with_file("workflow-templates/null.yaml", NULL_TEMPLATE)
            .with_file("workflow-templates/shellcheck.yaml", SHELLCHECK_TEMPLATE)
            .with_file("workflow-templates/yamllint.yaml", YAMLLINT_TEMPLATE);
        templates.tags.clear();
        forge.insert(templates);
        forge
    }

    pub fn insert(&self, repo: FakeRepo) {
        self.repos
            .borrow_mut()
            .insert(repo.repository.repo.full_name(), repo);
    }

    pub fn with_repo(self, repo: FakeRepo) -> Self {
        self.insert(repo);
        self
    }

    /// Current state of `owner/name`.
    pub fn repo(&self, full_name: &str) -> Option<FakeRepo> {
        self.repos.borrow().get(full_name).cloned()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.borrow().clone()
    }

    fn read<T>(&self, repo: &RepoRef, f: impl FnOnce(&FakeRepo) -> T) -> Result<Option<T>> {
        let repos = self.repos.borrow();
        match repos.get(&repo.full_name()) {
            Some(state) if state.broken => Err(anyhow!("simulated API failure for {repo}")),
            Some(state) => Ok(Some(f(state))),
            None => Ok(None),
        }
    }

    fn modify(
        &self,
        repo: &RepoRef,
        mutation: Mutation,
        f: impl FnOnce(&mut FakeRepo) -> Result<()>,
    ) -> Result<()> {
        let mut repos = self.repos.borrow_mut();
        let state = repos
            .get_mut(&repo.full_name())
            .ok_or_else(|| anyhow!("{repo}: not found"))?;
        if state.broken {
            return Err(anyhow!("simulated API failure for {repo}"));
        }
        f(state)?;
        self.mutations.borrow_mut().push(mutation);
        Ok(())
    }
}

fn fake_sha(path: &str, bytes: &[u8]) -> String {
    format!("sha-{path}-{}", bytes.len())
}

impl Forge for FakeForge {
    fn repository(&self, repo: &RepoRef) -> Result<Option<Repository>> {
        self.read(repo, |state| state.repository.clone())
    }

    fn org_repositories(&self, org: &str) -> Result<Vec<Repository>> {
        Ok(self
            .repos
            .borrow()
            .values()
            .filter(|state| state.repository.repo.owner == org)
            .map(|state| state.repository.clone())
            .collect())
    }

    fn tags(&self, repo: &RepoRef) -> Result<Vec<String>> {
        self.read(repo, |state| state.tags.clone())?
            .ok_or_else(|| anyhow!("{repo}: not found"))
    }

    fn branch(&self, repo: &RepoRef, branch: &str) -> Result<Option<Branch>> {
        Ok(self
            .read(repo, |state| {
                (state.repository.default_branch == branch).then(|| Branch {
                    name: branch.to_string(),
                    protected: state.protection.is_some(),
                })
            })?
            .flatten())
    }

    fn protection(&self, repo: &RepoRef, _branch: &str) -> Result<Option<Protection>> {
        Ok(self.read(repo, |state| state.protection.clone())?.flatten())
    }

    fn file(&self, repo: &RepoRef, path: &str) -> Result<Option<FileContent>> {
        Ok(self
            .read(repo, |state| {
                state.files.get(path).map(|bytes| FileContent {
                    path: path.to_string(),
                    sha: fake_sha(path, bytes),
                    bytes: bytes.clone(),
                })
            })?
            .flatten())
    }

    fn directory(&self, repo: &RepoRef, path: &str) -> Result<Option<Vec<ContentEntry>>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self
            .read(repo, |state| {
                let entries: Vec<ContentEntry> = state
                    .files
                    .iter()
                    .filter_map(|(file_path, bytes)| {
                        let name = file_path.strip_prefix(&prefix)?;
                        (!name.contains('/')).then(|| ContentEntry {
                            name: name.to_string(),
                            path: file_path.clone(),
                            sha: fake_sha(file_path, bytes),
                            kind: EntryKind::File,
                        })
                    })
                    .collect();
                (!entries.is_empty()).then_some(entries)
            })?
            .flatten())
    }

    fn edit_merge_settings(&self, repo: &RepoRef, settings: &MergeSettings) -> Result<()> {
        let mutation = Mutation::MergeSettings {
            repo: repo.full_name(),
            settings: *settings,
        };
        self.modify(repo, mutation, |state| {
            state.repository.allow_rebase_merge = settings.allow_rebase_merge;
            state.repository.allow_squash_merge = settings.allow_squash_merge;
            state.repository.delete_branch_on_merge = settings.delete_branch_on_merge;
            Ok(())
        })
    }

    fn set_admin_enforcement(&self, repo: &RepoRef, branch: &str, enabled: bool) -> Result<()> {
        let mutation = Mutation::AdminEnforcement {
            repo: repo.full_name(),
            branch: branch.to_string(),
            enabled,
        };
        self.modify(repo, mutation, |state| {
            let protection = state
                .protection
                .as_mut()
                .ok_or_else(|| anyhow!("branch {branch} not protected"))?;
            protection.enforce_admins = enabled;
            Ok(())
        })
    }

    fn set_required_status_checks(
        &self,
        repo: &RepoRef,
        branch: &str,
        checks: &StatusChecks,
    ) -> Result<()> {
        let mutation = Mutation::RequiredChecks {
            repo: repo.full_name(),
            branch: branch.to_string(),
            checks: checks.clone(),
        };
        self.modify(repo, mutation, |state| {
            let protection = state
                .protection
                .as_mut()
                .ok_or_else(|| anyhow!("branch {branch} not protected"))?;
            if protection.required_status_checks.is_none() {
                return Err(anyhow!("required status checks not enabled on {branch}"));
            }
            protection.required_status_checks = Some(checks.clone());
            Ok(())
        })
    }

    fn put_protection(&self, repo: &RepoRef, branch: &str, protection: &Protection) -> Result<()> {
        let mutation = Mutation::PutProtection {
            repo: repo.full_name(),
            branch: branch.to_string(),
            protection: protection.clone(),
        };
        self.modify(repo, mutation, |state| {
            state.protection = Some(protection.clone());
            Ok(())
        })
    }

    fn delete_file(&self, repo: &RepoRef, path: &str, sha: &str, message: &str) -> Result<()> {
        let mutation = Mutation::DeleteFile {
            repo: repo.full_name(),
            path: path.to_string(),
            sha: sha.to_string(),
            message: message.to_string(),
        };
        self.modify(repo, mutation, |state| {
            let bytes = state
                .files
                .get(path)
                .ok_or_else(|| anyhow!("{path} not found"))?;
            if fake_sha(path, bytes) != sha {
                return Err(anyhow!("{path}: sha mismatch"));
            }
            state.files.remove(path);
            Ok(())
        })
    }

    fn create_file(
        &self,
        repo: &RepoRef,
        path: &str,
        contents: &[u8],
        message: &str,
    ) -> Result<()> {
        let mutation = Mutation::CreateFile {
            repo: repo.full_name(),
            path: path.to_string(),
            message: message.to_string(),
        };
        self.modify(repo, mutation, |state| {
            if state.files.contains_key(path) {
                return Err(anyhow!("{path} already exists"));
            }
            state.files.insert(path.to_string(), contents.to_vec());
            Ok(())
        })
    }
}
