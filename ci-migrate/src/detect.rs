//! Orchestration for `ci-migrate detect`.
//!
//! Walks the selected repositories one at a time, assesses each, and writes the
//! report. A failure on one repository is reported and the walk continues.

use std::io::Write;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::assess::{Assessment, Finding, Verdict, assess, screen};
use crate::core::types::{Policy, RepoRef, Repository, Templates};
use crate::fetch::{collect_snapshot, fetch_templates};
use crate::io::config::MigrateConfig;
use crate::io::github::Forge;

/// Which repositories of the organization to audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every public repository, sorted by full name.
    All,
    /// A single repository by name.
    One(String),
    /// Half-open slice `[start, end)` of the sorted list.
    Range { start: usize, end: Option<usize> },
}

impl Selection {
    pub fn from_args(repo: Option<String>, start: Option<usize>, end: Option<usize>) -> Self {
        match (repo, start, end) {
            (Some(repo), _, _) => Selection::One(repo),
            (None, None, None) => Selection::All,
            (None, start, end) => Selection::Range {
                start: start.unwrap_or(0),
                end,
            },
        }
    }
}

/// Totals over one `detect` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectSummary {
    pub repos: usize,
    pub skipped: usize,
    pub undecided: usize,
    /// Repositories with an `update` command to run.
    pub actionable: usize,
    pub errors: usize,
}

/// Audit the selected repositories of `cfg.org`, writing the report to `out`.
#[instrument(skip_all, fields(org = %cfg.org))]
pub fn run_detect<F: Forge, W: Write>(
    forge: &F,
    cfg: &MigrateConfig,
    selection: &Selection,
    out: &mut W,
) -> Result<DetectSummary> {
    let templates = fetch_templates(forge, cfg).context("load workflow templates")?;
    let policy = cfg.policy();
    let repositories = select_repositories(forge, cfg, selection)?;
    info!(count = repositories.len(), "auditing repositories");

    let mut summary = DetectSummary::default();
    for repository in &repositories {
        summary.repos += 1;
        let name = &repository.repo.name;
        writeln!(out, "{name}:")?;
        match detect_one(forge, repository, &policy, &templates) {
            Ok(assessment) => {
                for finding in &assessment.findings {
                    writeln!(out, "{}", finding.render(name))?;
                }
                match &assessment.verdict {
                    Verdict::Skipped(_) => summary.skipped += 1,
                    Verdict::Undecided => summary.undecided += 1,
                    Verdict::Actionable => {}
                }
                if let Some(command) = assessment.command(name) {
                    summary.actionable += 1;
                    writeln!(out, "$ {command}")?;
                }
            }
            Err(err) => {
                warn!(repo = %repository.repo, error = %format!("{err:#}"), "detect failed");
                summary.errors += 1;
                writeln!(out, "*** Error: {err:#}")?;
            }
        }
    }

    writeln!(
        out,
        "detect: repos={} actionable={} skipped={} undecided={} errors={}",
        summary.repos, summary.actionable, summary.skipped, summary.undecided, summary.errors
    )?;
    Ok(summary)
}

fn select_repositories<F: Forge>(
    forge: &F,
    cfg: &MigrateConfig,
    selection: &Selection,
) -> Result<Vec<Repository>> {
    match selection {
        Selection::One(name) => {
            let repo = RepoRef::new(cfg.org.as_str(), name.as_str());
            let repository = forge
                .repository(&repo)?
                .ok_or_else(|| anyhow!("repository {repo} not found"))?;
            Ok(vec![repository])
        }
        Selection::All => forge.org_repositories(&cfg.org),
        Selection::Range { start, end } => {
            let all = forge.org_repositories(&cfg.org)?;
            let end = end.unwrap_or(all.len()).min(all.len());
            debug!(start, end, total = all.len(), "slicing repository list");
            Ok(all
                .into_iter()
                .skip(*start)
                .take(end.saturating_sub(*start))
                .collect())
        }
    }
}

/// Screen on tags first so skipped repositories cost a single extra request.
fn detect_one<F: Forge>(
    forge: &F,
    repository: &Repository,
    policy: &Policy,
    templates: &Templates,
) -> Result<Assessment> {
    let tags = forge.tags(&repository.repo)?;
    if let Some(reason) = screen(repository, &tags, policy) {
        debug!(repo = %repository.repo, ?reason, "skipped");
        return Ok(Assessment::skipped(
            vec![Finding::Skipped(reason.clone())],
            reason,
        ));
    }
    let snapshot = collect_snapshot(forge, repository, tags)?;
    Ok(assess(&snapshot, policy, templates))
}
