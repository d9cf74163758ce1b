//! Orchestration for `ci-migrate update`.
//!
//! Applies an [`UpdatePlan`] to one repository. Everything that can be checked
//! up front (sanity checks, `.travis.yml` presence, templates, existing
//! workflow files) is checked before the first write. After that the steps run
//! in order and the first failure stops the update; nothing is rolled back.

use std::io::Write;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument};

use crate::core::reconcile::{final_contexts, interim_contexts};
use crate::core::travis::TRAVIS_PATH;
use crate::core::types::{FileContent, MergeSettings, RepoRef, Repository, StatusChecks};
use crate::core::workflow::{UpdatePlan, Workflow};
use crate::fetch::fetch_template;
use crate::io::config::MigrateConfig;
use crate::io::github::Forge;

const REMOVE_TRAVIS_MESSAGE: &str = "Remove Travis workflow.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub repo: RepoRef,
    pub plan: UpdatePlan,
    /// Refuse repositories that lack the distribution tag.
    pub require_tag: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied(AppliedUpdate),
    /// Nothing was changed.
    Refused(String),
}

/// What an applied update changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedUpdate {
    pub branch: String,
    pub removed_travis: bool,
    /// Repository paths of the created workflow files.
    pub created: Vec<String>,
    /// Required status checks now set on the default branch.
    pub contexts: Vec<String>,
}

/// Everything fetched before the first write.
struct Prepared {
    travis: Option<FileContent>,
    templates: Vec<(Workflow, Vec<u8>)>,
}

/// Apply `request` to its repository, writing progress lines to `out`.
#[instrument(skip_all, fields(repo = %request.repo))]
pub fn run_update<F: Forge, W: Write>(
    forge: &F,
    cfg: &MigrateConfig,
    request: &UpdateRequest,
    out: &mut W,
) -> Result<UpdateOutcome> {
    let repo = &request.repo;
    let repository = forge
        .repository(repo)?
        .ok_or_else(|| anyhow!("repository {repo} not found"))?;
    writeln!(out, "{}:", repository.repo.name)?;

    let prepared = match prepare(forge, cfg, &repository, request)? {
        Ok(prepared) => prepared,
        Err(reason) => {
            info!(%reason, "update refused");
            writeln!(out, "*** Refusing to update {}: {reason}", repository.repo.name)?;
            return Ok(UpdateOutcome::Refused(reason));
        }
    };

    writeln!(out, "* Turning off rebase/squash merges")?;
    forge
        .edit_merge_settings(repo, &MergeSettings::MERGE_COMMITS_ONLY)
        .context("edit merge settings")?;

    let branch = forge
        .branch(repo, &repository.default_branch)?
        .ok_or_else(|| anyhow!("{repo}: default branch {} not found", repository.default_branch))?;
    let protection = if branch.protected {
        forge.protection(repo, &branch.name)?
    } else {
        None
    };
    let existing = protection
        .as_ref()
        .and_then(|protection| protection.required_status_checks.as_ref());

    // Admins (and this tool) must be able to commit straight to the branch.
    if protection.as_ref().is_some_and(|protection| protection.enforce_admins) {
        writeln!(out, "* Disabling admin enforcement on {}", branch.name)?;
        forge
            .set_admin_enforcement(repo, &branch.name, false)
            .context("disable admin enforcement")?;
    }

    if let (Some(checks), Some(contexts)) = (
        existing,
        interim_contexts(protection.as_ref(), request.plan.remove_travis),
    ) {
        if contexts != checks.contexts {
            writeln!(out, "* Changing {:?} to {contexts:?}", checks.contexts)?;
            forge
                .set_required_status_checks(
                    repo,
                    &branch.name,
                    &StatusChecks {
                        strict: true,
                        contexts,
                    },
                )
                .context("drop Travis status checks")?;
        }
    }

    if let Some(travis) = &prepared.travis {
        writeln!(out, "* Removing {TRAVIS_PATH}")?;
        forge
            .delete_file(repo, TRAVIS_PATH, &travis.sha, REMOVE_TRAVIS_MESSAGE)
            .with_context(|| format!("delete {TRAVIS_PATH}"))?;
    }

    let mut created = Vec::new();
    for (workflow, body) in &prepared.templates {
        let path = workflow.repo_path();
        writeln!(out, "* Creating {}", workflow.file_name())?;
        forge
            .create_file(repo, &path, body, workflow.commit_message())
            .with_context(|| format!("create {path}"))?;
        created.push(path);
    }

    let contexts = final_contexts(protection.as_ref(), &request.plan);
    if let Some(checks) = existing {
        writeln!(out, "Old contexts={:?}", checks.contexts)?;
    }
    writeln!(out, "* Setting strict protection contexts={contexts:?}")?;
    let checks = StatusChecks {
        strict: true,
        contexts: contexts.clone(),
    };
    if existing.is_some() {
        forge
            .set_required_status_checks(repo, &branch.name, &checks)
            .context("set required status checks")?;
        forge
            .set_admin_enforcement(repo, &branch.name, true)
            .context("restore admin enforcement")?;
    } else {
        // A full rewrite: start from what the branch has so nothing else is reset.
        let mut target = protection.unwrap_or_default();
        target.required_status_checks = Some(checks);
        target.enforce_admins = true;
        forge
            .put_protection(repo, &branch.name, &target)
            .context("protect default branch")?;
    }

    info!(branch = %branch.name, created = created.len(), "update applied");
    Ok(UpdateOutcome::Applied(AppliedUpdate {
        branch: branch.name,
        removed_travis: prepared.travis.is_some(),
        created,
        contexts,
    }))
}

/// Sanity checks and up-front reads. The inner `Err` is a refusal reason.
fn prepare<F: Forge>(
    forge: &F,
    cfg: &MigrateConfig,
    repository: &Repository,
    request: &UpdateRequest,
) -> Result<std::result::Result<Prepared, String>> {
    let repo = &repository.repo;
    if repository.archived {
        return Ok(Err("repository is archived".to_string()));
    }
    if repository.fork {
        return Ok(Err("repository is a fork".to_string()));
    }
    if request.require_tag && !forge.tags(repo)?.contains(&cfg.distrib_tag) {
        return Ok(Err(format!("not tagged with {}", cfg.distrib_tag)));
    }

    let travis = if request.plan.remove_travis {
        match forge.file(repo, TRAVIS_PATH)? {
            Some(file) => Some(file),
            None => return Ok(Err(format!("{TRAVIS_PATH} does not exist"))),
        }
    } else {
        None
    };

    let mut templates = Vec::with_capacity(request.plan.workflows.len());
    for &workflow in &request.plan.workflows {
        for path in workflow.existing_paths() {
            if forge.file(repo, &path)?.is_some() {
                return Ok(Err(format!("{path} already exists")));
            }
        }
        templates.push((workflow, fetch_template(forge, cfg, workflow)?));
    }

    Ok(Ok(Prepared { travis, templates }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeForge, FakeRepo, LINT_TEMPLATE, config};

    fn request(name: &str, plan: UpdatePlan) -> UpdateRequest {
        UpdateRequest {
            repo: RepoRef::new("lsst", name),
            plan,
            require_tag: true,
        }
    }

    fn refused(forge: &FakeForge, request: &UpdateRequest) -> String {
        let mut out = Vec::new();
        match run_update(forge, &config(), request, &mut out).expect("update") {
            UpdateOutcome::Refused(reason) => {
                assert!(forge.mutations().is_empty(), "refusal must not write");
                reason
            }
            other => panic!("expected refusal, got {other:?}"),
        }
    }

    #[test]
    fn refuses_archived_and_forks() {
        let mut archived = FakeRepo::new("old");
        archived.repository.archived = true;
        let mut fork = FakeRepo::new("copy");
        fork.repository.fork = true;
        let forge = FakeForge::new().with_repo(archived).with_repo(fork);

        assert_eq!(
            refused(&forge, &request("old", UpdatePlan::default())),
            "repository is archived"
        );
        assert_eq!(
            refused(&forge, &request("copy", UpdatePlan::default())),
            "repository is a fork"
        );
    }

    #[test]
    fn refuses_untagged_only_when_required() {
        let forge = FakeForge::new().with_repo(FakeRepo::new("afw").with_tags(&["v1"]));
        assert_eq!(
            refused(&forge, &request("afw", UpdatePlan::default())),
            "not tagged with w.2020.47"
        );

        let mut out = Vec::new();
        let outcome = run_update(
            &forge,
            &config(),
            &UpdateRequest {
                require_tag: false,
                ..request("afw", UpdatePlan::default())
            },
            &mut out,
        )
        .expect("update");
        assert!(matches!(outcome, UpdateOutcome::Applied(_)));
    }

    #[test]
    fn refuses_remove_travis_without_travis() {
        let forge = FakeForge::new().with_repo(FakeRepo::new("afw"));
        let plan = UpdatePlan {
            remove_travis: true,
            ..UpdatePlan::default()
        };
        assert_eq!(
            refused(&forge, &request("afw", plan)),
            ".travis.yml does not exist"
        );
    }

    #[test]
    fn refuses_existing_workflow_file() {
        let forge = FakeForge::new().with_repo(
            FakeRepo::new("afw").with_file(".github/workflows/lint.yaml", LINT_TEMPLATE),
        );
        let plan = UpdatePlan {
            remove_travis: false,
            workflows: [Workflow::Lint].into_iter().collect(),
        };
        assert_eq!(
            refused(&forge, &request("afw", plan)),
            ".github/workflows/lint.yaml already exists"
        );
    }

    #[test]
    fn refuses_workflow_under_yml_spelling() {
        let forge = FakeForge::new().with_repo(
            FakeRepo::new("afw").with_file(".github/workflows/lint.yml", LINT_TEMPLATE),
        );
        let plan = UpdatePlan {
            remove_travis: false,
            workflows: [Workflow::Null, Workflow::Lint].into_iter().collect(),
        };
        assert_eq!(
            refused(&forge, &request("afw", plan)),
            ".github/workflows/lint.yml already exists"
        );
    }

    #[test]
    fn missing_repository_is_an_error() {
        let forge = FakeForge::new();
        let mut out = Vec::new();
        let err = run_update(&forge, &config(), &request("nope", UpdatePlan::default()), &mut out)
            .expect_err("missing");
        assert!(err.to_string().contains("lsst/nope"));
    }
}
