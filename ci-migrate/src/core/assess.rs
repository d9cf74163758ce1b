//! The detection rule table.
//!
//! [`assess`] maps a repository [`Snapshot`] to the findings worth reporting and
//! the [`UpdatePlan`] that would bring the repository in line. Rules are applied
//! in a fixed order; the first skip condition wins.

use crate::core::travis::{is_flake8_travis, is_travis_check, strip_travis_checks};
use crate::core::types::{Policy, Repository, Snapshot, Templates};
use crate::core::workflow::{UpdatePlan, Workflow};

/// How prominently a finding is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Plain observation.
    Info,
    /// Something `update` would change.
    Action,
    /// Needs a human to look at it.
    Notice,
}

impl Severity {
    fn prefix(self) -> &'static str {
        match self {
            Severity::Info => "    ",
            Severity::Action => "    * ",
            Severity::Notice => "*** ",
        }
    }
}

/// Why a repository was left out of the migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Archived,
    Fork,
    Untagged { tag: String },
    /// `.travis.yml` is not the flake8 job.
    UnrecognizedTravis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    Skipped(SkipReason),
    DisableRebaseMerge,
    DisableSquashMerge,
    NoTravis,
    UnrecognizedTravis { content: String },
    NoWorkflows,
    RemoveTravisChecks { branch: String },
    RemainingContexts { contexts: Vec<String> },
    RemoveTravis,
    WorkflowFound { file: String },
    TemplateDrift { file: String },
    CreateWorkflow(Workflow),
    OnlyUnknownWorkflows,
    NotProtected { branch: String },
    NoRequiredChecks { branch: String },
    UnknownRequiredCheck,
    AddContexts { contexts: Vec<String> },
    ContextsBefore { contexts: Vec<String> },
    ContextsShouldBe { contexts: Vec<String> },
}

impl Finding {
    pub fn severity(&self) -> Severity {
        match self {
            Finding::Skipped(_)
            | Finding::TemplateDrift { .. }
            | Finding::OnlyUnknownWorkflows
            | Finding::UnknownRequiredCheck => Severity::Notice,
            Finding::DisableRebaseMerge
            | Finding::DisableSquashMerge
            | Finding::RemoveTravisChecks { .. }
            | Finding::RemoveTravis
            | Finding::CreateWorkflow(_)
            | Finding::AddContexts { .. }
            | Finding::ContextsShouldBe { .. } => Severity::Action,
            Finding::NoTravis
            | Finding::UnrecognizedTravis { .. }
            | Finding::NoWorkflows
            | Finding::RemainingContexts { .. }
            | Finding::WorkflowFound { .. }
            | Finding::NotProtected { .. }
            | Finding::NoRequiredChecks { .. }
            | Finding::ContextsBefore { .. } => Severity::Info,
        }
    }

    /// Render as report line(s) for repository `repo`.
    pub fn render(&self, repo: &str) -> String {
        let message = match self {
            Finding::Skipped(SkipReason::Archived) => format!("Skipping archived repo: {repo}"),
            Finding::Skipped(SkipReason::Fork) => format!("Skipping forked repo: {repo}"),
            Finding::Skipped(SkipReason::Untagged { tag }) => {
                format!("Skipping repo not tagged with {tag}: {repo}")
            }
            Finding::Skipped(SkipReason::UnrecognizedTravis) => {
                format!("Skipping repo with unrecognized .travis.yml: {repo}")
            }
            Finding::DisableRebaseMerge => format!("Should disable rebase merge: {repo}"),
            Finding::DisableSquashMerge => format!("Should disable squash merge: {repo}"),
            Finding::NoTravis => format!("No .travis.yml: {repo}"),
            Finding::UnrecognizedTravis { content } => {
                format!("Unrecognized .travis.yml, skipping {repo}\n{}", content.trim_end())
            }
            Finding::NoWorkflows => format!("No .github/workflows: {repo}"),
            Finding::RemoveTravisChecks { branch } => {
                format!("Should remove travis check from {repo}/{branch}")
            }
            Finding::RemainingContexts { contexts } => format!("contexts={contexts:?}"),
            Finding::RemoveTravis => format!("Should remove .travis.yml from {repo}"),
            Finding::WorkflowFound { file } => format!("{file} found in {repo}"),
            Finding::TemplateDrift { file } => format!("{file} differs from template"),
            Finding::CreateWorkflow(workflow) => {
                format!("Should create {} in {repo}", workflow.file_name())
            }
            Finding::OnlyUnknownWorkflows => format!("Only non-flake8 GHAs found in {repo}"),
            Finding::NotProtected { branch } => format!("Not protected: {repo}/{branch}"),
            Finding::NoRequiredChecks { branch } => {
                format!("No required status checks: {repo}/{branch}")
            }
            Finding::UnknownRequiredCheck => "Don't know which checks to require".to_string(),
            Finding::AddContexts { contexts } => format!("Should add contexts={contexts:?}"),
            Finding::ContextsBefore { contexts } => format!("Before: {contexts:?}"),
            Finding::ContextsShouldBe { contexts } => format!("Should be: {contexts:?}"),
        };
        format!("{}{message}", self.severity().prefix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Skipped(SkipReason),
    /// No known workflow provides a check, so no context can be required.
    Undecided,
    /// In scope with a decided minimum check; `plan` may still be empty.
    Actionable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub findings: Vec<Finding>,
    pub verdict: Verdict,
    pub plan: UpdatePlan,
    /// The context every protected default branch should require at minimum.
    pub minimum_check: Option<&'static str>,
}

impl Assessment {
    pub fn skipped(findings: Vec<Finding>, reason: SkipReason) -> Self {
        Self {
            findings,
            verdict: Verdict::Skipped(reason),
            plan: UpdatePlan::default(),
            minimum_check: None,
        }
    }

    /// The `ci-migrate update` invocation that applies the plan, if there is one.
    pub fn command(&self, repo_name: &str) -> Option<String> {
        if self.verdict != Verdict::Actionable || self.plan.is_empty() {
            return None;
        }
        Some(self.plan.command_line(repo_name))
    }
}

/// Decide whether a repository is in scope at all.
///
/// Needs only metadata and tags, so callers can avoid fetching the rest of the
/// snapshot for repositories that are skipped.
pub fn screen(repository: &Repository, tags: &[String], policy: &Policy) -> Option<SkipReason> {
    if repository.archived {
        return Some(SkipReason::Archived);
    }
    if repository.fork {
        return Some(SkipReason::Fork);
    }
    if !tags.iter().any(|tag| *tag == policy.distrib_tag) {
        return Some(SkipReason::Untagged {
            tag: policy.distrib_tag.clone(),
        });
    }
    None
}

/// Apply the rule table to one repository.
pub fn assess(snapshot: &Snapshot, policy: &Policy, templates: &Templates) -> Assessment {
    let repository = &snapshot.repository;
    let mut findings = Vec::new();

    if let Some(reason) = screen(repository, &snapshot.tags, policy) {
        findings.push(Finding::Skipped(reason.clone()));
        return Assessment::skipped(findings, reason);
    }

    if repository.allow_rebase_merge {
        findings.push(Finding::DisableRebaseMerge);
    }
    if repository.allow_squash_merge {
        findings.push(Finding::DisableSquashMerge);
    }

    match &snapshot.travis {
        None => findings.push(Finding::NoTravis),
        Some(travis) if !is_flake8_travis(travis) => {
            findings.push(Finding::UnrecognizedTravis {
                content: String::from_utf8_lossy(travis).into_owned(),
            });
            return Assessment::skipped(findings, SkipReason::UnrecognizedTravis);
        }
        Some(_) => {}
    }

    if snapshot.workflows.is_none() {
        findings.push(Finding::NoWorkflows);
    }
    let workflows = snapshot.workflows.as_deref().unwrap_or(&[]);
    let existing = snapshot
        .protection
        .as_ref()
        .and_then(|protection| protection.required_status_checks.as_ref());
    let branch = snapshot.branch.name.clone();
    let mut plan = UpdatePlan::default();

    let minimum_check = if snapshot.travis.is_some() {
        if let Some(checks) = existing.filter(|checks| {
            checks.contexts.iter().any(|context| is_travis_check(context))
        }) {
            findings.push(Finding::RemoveTravisChecks {
                branch: branch.clone(),
            });
            findings.push(Finding::RemainingContexts {
                contexts: strip_travis_checks(&checks.contexts),
            });
        }
        findings.push(Finding::RemoveTravis);
        plan.remove_travis = true;

        match workflows
            .iter()
            .find(|file| Workflow::from_file_name(&file.name) == Some(Workflow::Lint))
        {
            Some(file) => findings.push(Finding::WorkflowFound {
                file: file.name.clone(),
            }),
            None => {
                findings.push(Finding::CreateWorkflow(Workflow::Lint));
                plan.workflows.insert(Workflow::Lint);
            }
        }
        Some(Workflow::Lint.context())
    } else if !workflows.is_empty() {
        let mut minimum = None;
        for file in workflows {
            let Some(workflow) = Workflow::from_file_name(&file.name) else {
                continue;
            };
            findings.push(Finding::WorkflowFound {
                file: file.name.clone(),
            });
            if file.content.as_deref() != template_for(templates, workflow) {
                findings.push(Finding::TemplateDrift {
                    file: file.name.clone(),
                });
            }
            minimum = Some(workflow.context());
        }
        if minimum.is_none() {
            findings.push(Finding::OnlyUnknownWorkflows);
        }
        minimum
    } else {
        findings.push(Finding::CreateWorkflow(Workflow::Null));
        plan.workflows.insert(Workflow::Null);
        Some(Workflow::Null.context())
    };

    let verdict = match (&snapshot.protection, existing) {
        (None, _) => {
            findings.push(Finding::NotProtected { branch });
            require_minimum(&mut findings, minimum_check)
        }
        (Some(_), None) => {
            findings.push(Finding::NoRequiredChecks { branch });
            require_minimum(&mut findings, minimum_check)
        }
        (Some(protection), Some(checks)) => {
            let has_minimum = minimum_check
                .is_some_and(|minimum| checks.contexts.iter().any(|context| context == minimum));
            if !checks.strict || !has_minimum || !protection.enforce_admins {
                let mut contexts = strip_travis_checks(&checks.contexts);
                findings.push(Finding::ContextsBefore {
                    contexts: contexts.clone(),
                });
                if let (Some(minimum), false) = (minimum_check, has_minimum) {
                    contexts.push(minimum.to_string());
                    findings.push(Finding::ContextsShouldBe { contexts });
                }
            }
            Verdict::Actionable
        }
    };

    Assessment {
        findings,
        verdict,
        plan,
        minimum_check,
    }
}

fn require_minimum(findings: &mut Vec<Finding>, minimum_check: Option<&'static str>) -> Verdict {
    match minimum_check {
        Some(minimum) => {
            findings.push(Finding::AddContexts {
                contexts: vec![minimum.to_string()],
            });
            Verdict::Actionable
        }
        None => {
            findings.push(Finding::UnknownRequiredCheck);
            Verdict::Undecided
        }
    }
}

fn template_for(templates: &Templates, workflow: Workflow) -> Option<&[u8]> {
    match workflow {
        Workflow::Lint => Some(&templates.lint),
        Workflow::Null => Some(&templates.null),
        Workflow::Shellcheck | Workflow::Yamllint => None,
    }
}
