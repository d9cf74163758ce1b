//! Reads repository state and workflow templates through a [`Forge`].

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::travis::TRAVIS_PATH;
use crate::core::types::{EntryKind, Repository, Snapshot, Templates, WorkflowFile};
use crate::core::workflow::{WORKFLOWS_DIR, Workflow};
use crate::io::config::MigrateConfig;
use crate::io::github::Forge;

/// Fetch the body of `workflow`'s template from the template repository.
pub fn fetch_template<F: Forge>(forge: &F, cfg: &MigrateConfig, workflow: Workflow) -> Result<Vec<u8>> {
    let template_repo = cfg.template_repo()?;
    let path = workflow.template_path(&cfg.template_dir);
    let file = forge
        .file(&template_repo, &path)
        .with_context(|| format!("fetch template {path}"))?
        .ok_or_else(|| anyhow!("template {path} not found in {template_repo}"))?;
    Ok(file.bytes)
}

/// Templates used to check existing workflows for drift.
pub fn fetch_templates<F: Forge>(forge: &F, cfg: &MigrateConfig) -> Result<Templates> {
    Ok(Templates {
        lint: fetch_template(forge, cfg, Workflow::Lint)?,
        null: fetch_template(forge, cfg, Workflow::Null)?,
    })
}

/// Collect the rest of a repository's snapshot once its tags are known.
///
/// Workflow contents are only fetched for regular files whose names
/// [`Workflow::from_file_name`] recognizes.
#[instrument(skip_all, fields(repo = %repository.repo))]
pub fn collect_snapshot<F: Forge>(
    forge: &F,
    repository: &Repository,
    tags: Vec<String>,
) -> Result<Snapshot> {
    let repo = &repository.repo;
    let branch = forge
        .branch(repo, &repository.default_branch)?
        .ok_or_else(|| anyhow!("{repo}: default branch {} not found", repository.default_branch))?;
    let protection = if branch.protected {
        forge
            .protection(repo, &branch.name)
            .with_context(|| format!("{repo}: read protection of {}", branch.name))?
    } else {
        None
    };
    let travis = forge.file(repo, TRAVIS_PATH)?.map(|file| file.bytes);

    let workflows = match forge.directory(repo, WORKFLOWS_DIR)? {
        None => None,
        Some(entries) => {
            let mut files = Vec::with_capacity(entries.len());
            for entry in entries {
                let known = Workflow::from_file_name(&entry.name).is_some();
                let content = if known && entry.kind == EntryKind::File {
                    forge.file(repo, &entry.path)?.map(|file| file.bytes)
                } else {
                    None
                };
                files.push(WorkflowFile {
                    name: entry.name,
                    content,
                });
            }
            Some(files)
        }
    };

    debug!(
        protected = branch.protected,
        travis = travis.is_some(),
        workflows = workflows.as_ref().map_or(0, Vec::len),
        "snapshot collected"
    );
    Ok(Snapshot {
        repository: repository.clone(),
        tags,
        branch,
        protection,
        travis,
        workflows,
    })
}
