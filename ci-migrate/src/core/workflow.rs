//! Catalogue of the GitHub Actions workflows this tool installs, and the
//! remediation plan built from them.

use std::collections::BTreeSet;
use std::fmt;

/// Directory holding GitHub Actions workflows in a repository.
pub const WORKFLOWS_DIR: &str = ".github/workflows";

/// A template workflow that can be installed into a repository.
///
/// Declaration order is the order flags are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Workflow {
    /// Python flake8 lint (replaces the Travis job).
    Lint,
    Shellcheck,
    Yamllint,
    /// Placeholder that only exists to provide a required status check.
    Null,
}

impl Workflow {
    pub fn stem(self) -> &'static str {
        match self {
            Workflow::Lint => "lint",
            Workflow::Shellcheck => "shellcheck",
            Workflow::Yamllint => "yamllint",
            Workflow::Null => "null",
        }
    }

    /// File name created under [`WORKFLOWS_DIR`].
    pub fn file_name(self) -> String {
        format!("{}.yaml", self.stem())
    }

    pub fn repo_path(self) -> String {
        format!("{WORKFLOWS_DIR}/{}", self.file_name())
    }

    /// Every path an existing copy of this workflow may live at.
    pub fn existing_paths(self) -> [String; 2] {
        [
            self.repo_path(),
            format!("{WORKFLOWS_DIR}/{}.yml", self.stem()),
        ]
    }

    pub fn template_path(self, template_dir: &str) -> String {
        format!("{}/{}", template_dir.trim_end_matches('/'), self.file_name())
    }

    /// Status-check context the workflow's job reports.
    pub fn context(self) -> &'static str {
        match self {
            Workflow::Lint | Workflow::Yamllint => "lint",
            Workflow::Shellcheck => "shellcheck",
            Workflow::Null => "null_check",
        }
    }

    pub fn commit_message(self) -> &'static str {
        match self {
            Workflow::Lint => "Add Python lint GitHub Action.",
            Workflow::Shellcheck => "Add shellcheck GitHub Action.",
            Workflow::Yamllint => "Add YAML lint GitHub Action.",
            Workflow::Null => "Add null GitHub Action.",
        }
    }

    /// `ci-migrate update` flag that requests this workflow.
    pub fn flag(self) -> &'static str {
        match self {
            Workflow::Lint => "--flake8",
            Workflow::Shellcheck => "--shellcheck",
            Workflow::Yamllint => "--yamllint",
            Workflow::Null => "--null-check",
        }
    }

    /// Recognize an existing workflow file by name.
    ///
    /// Only the lint and null workflows are checked for in existing
    /// repositories; both `.yaml` and `.yml` spellings count.
    pub fn from_file_name(name: &str) -> Option<Workflow> {
        match name {
            "lint.yaml" | "lint.yml" => Some(Workflow::Lint),
            "null.yaml" | "null.yml" => Some(Workflow::Null),
            _ => None,
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

/// Remediation actions for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    pub remove_travis: bool,
    pub workflows: BTreeSet<Workflow>,
}

impl UpdatePlan {
    pub fn is_empty(&self) -> bool {
        !self.remove_travis && self.workflows.is_empty()
    }

    /// Contexts the planned workflows will report.
    pub fn contexts(&self) -> BTreeSet<&'static str> {
        self.workflows.iter().map(|workflow| workflow.context()).collect()
    }

    /// Flags for `ci-migrate update`, in a stable order.
    pub fn to_args(&self) -> Vec<&'static str> {
        let mut args = Vec::new();
        if self.remove_travis {
            args.push("--remove-travis");
        }
        args.extend(self.workflows.iter().map(|workflow| workflow.flag()));
        args
    }

    /// Full command line that applies this plan to `repo_name`.
    pub fn command_line(&self, repo_name: &str) -> String {
        let mut line = format!("ci-migrate update {repo_name}");
        for arg in self.to_args() {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_both_extensions() {
        assert_eq!(Workflow::from_file_name("lint.yml"), Some(Workflow::Lint));
        assert_eq!(Workflow::from_file_name("lint.yaml"), Some(Workflow::Lint));
        assert_eq!(Workflow::from_file_name("null.yml"), Some(Workflow::Null));
        assert_eq!(Workflow::from_file_name("shellcheck.yaml"), None);
        assert_eq!(Workflow::from_file_name("build.yaml"), None);
    }

    #[test]
    fn paths_follow_stem() {
        assert_eq!(Workflow::Null.repo_path(), ".github/workflows/null.yaml");
        assert_eq!(
            Workflow::Lint.existing_paths(),
            [".github/workflows/lint.yaml", ".github/workflows/lint.yml"]
        );
        assert_eq!(
            Workflow::Yamllint.template_path("workflow-templates/"),
            "workflow-templates/yamllint.yaml"
        );
    }

    #[test]
    fn command_line_orders_flags() {
        let plan = UpdatePlan {
            remove_travis: true,
            workflows: [Workflow::Null, Workflow::Lint].into_iter().collect(),
        };
        assert_eq!(
            plan.command_line("afw"),
            "ci-migrate update afw --remove-travis --flake8 --null-check"
        );
    }

    #[test]
    fn yamllint_and_lint_share_a_context() {
        let plan = UpdatePlan {
            remove_travis: false,
            workflows: [Workflow::Lint, Workflow::Yamllint, Workflow::Shellcheck]
                .into_iter()
                .collect(),
        };
        let contexts: Vec<_> = plan.contexts().into_iter().collect();
        assert_eq!(contexts, vec!["lint", "shellcheck"]);
    }

    #[test]
    fn empty_plan() {
        assert!(UpdatePlan::default().is_empty());
        assert_eq!(UpdatePlan::default().command_line("afw"), "ci-migrate update afw");
    }
}
