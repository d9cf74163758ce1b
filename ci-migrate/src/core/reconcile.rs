//! Required-status-check reconciliation for `update`.

use std::collections::BTreeSet;

use crate::core::travis::strip_travis_checks;
use crate::core::types::Protection;
use crate::core::workflow::UpdatePlan;

/// Contexts to set while Travis is being removed.
///
/// Returns `Some` only when Travis is going away and the branch already
/// requires checks; otherwise the interim state is left untouched.
pub fn interim_contexts(protection: Option<&Protection>, remove_travis: bool) -> Option<Vec<String>> {
    if !remove_travis {
        return None;
    }
    let checks = protection?.required_status_checks.as_ref()?;
    Some(strip_travis_checks(&checks.contexts))
}

/// Contexts the default branch should require once the plan is applied.
///
/// Union of the contexts the new workflows report and the contexts already
/// required, with Travis contexts dropped when Travis is removed. Sorted.
pub fn final_contexts(protection: Option<&Protection>, plan: &UpdatePlan) -> Vec<String> {
    let mut contexts: BTreeSet<String> = plan.contexts().into_iter().map(str::to_string).collect();
    if let Some(checks) = protection.and_then(|p| p.required_status_checks.as_ref()) {
        if plan.remove_travis {
            contexts.extend(strip_travis_checks(&checks.contexts));
        } else {
            contexts.extend(checks.contexts.iter().cloned());
        }
    }
    contexts.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::workflow::Workflow;
    use crate::test_support::protection;

    fn plan(remove_travis: bool, workflows: &[Workflow]) -> UpdatePlan {
        UpdatePlan {
            remove_travis,
            workflows: workflows.iter().copied().collect(),
        }
    }

    #[test]
    fn interim_only_when_removing_travis() {
        let prot = protection(&["Travis CI - Branch", "build"], false, true);
        assert_eq!(interim_contexts(Some(&prot), false), None);
        assert_eq!(
            interim_contexts(Some(&prot), true),
            Some(vec!["build".to_string()])
        );
        assert_eq!(interim_contexts(None, true), None);
    }

    #[test]
    fn interim_skipped_without_required_checks() {
        let prot = Protection {
            required_status_checks: None,
            enforce_admins: false,
            ..Protection::default()
        };
        assert_eq!(interim_contexts(Some(&prot), true), None);
    }

    #[test]
    fn final_merges_and_drops_travis() {
        let prot = protection(
            &["continuous-integration/travis-ci", "build", "lint"],
            true,
            true,
        );
        let contexts = final_contexts(Some(&prot), &plan(true, &[Workflow::Lint]));
        assert_eq!(contexts, vec!["build", "lint"]);
    }

    #[test]
    fn final_keeps_travis_when_not_removing() {
        let prot = protection(&["Travis CI - Branch"], true, true);
        let contexts = final_contexts(Some(&prot), &plan(false, &[Workflow::Shellcheck]));
        assert_eq!(contexts, vec!["Travis CI - Branch", "shellcheck"]);
    }

    #[test]
    fn final_for_unprotected_branch_is_plan_contexts() {
        let contexts = final_contexts(None, &plan(false, &[Workflow::Null, Workflow::Yamllint]));
        assert_eq!(contexts, vec!["lint", "null_check"]);
    }
}
