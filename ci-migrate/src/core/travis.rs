//! Recognition of the one Travis-CI configuration we know how to replace.
//!
//! Only the flake8 lint job is migrated. Any other `.travis.yml` is left alone.

use std::sync::LazyLock;

use regex::bytes::Regex;

/// Path of the Travis configuration in a repository.
pub const TRAVIS_PATH: &str = ".travis.yml";

/// Status-check contexts reported by Travis.
pub const TRAVIS_LIKE_CHECKS: [&str; 3] = [
    "continuous-integration/travis-ci",
    "Travis CI - Branch",
    "Travis CI - Pull Request",
];

static FLAKE8_TRAVIS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?-u)\Asudo: false
language: python
matrix:
\s+include:
\s+- python: '3.[678]'
\s+install:
\s+- '?pip install -r <\(curl https://raw.githubusercontent.com/lsst/linting/master/requirements.txt\)'?
\s+script:\s+(- )?flake8\s*\z",
    )
    .unwrap()
});

/// True if `contents` is the flake8-only Travis job.
pub fn is_flake8_travis(contents: &[u8]) -> bool {
    FLAKE8_TRAVIS_RE.is_match(contents)
}

pub fn is_travis_check(context: &str) -> bool {
    TRAVIS_LIKE_CHECKS.contains(&context)
}

/// Drop Travis contexts, preserving the order of the rest.
pub fn strip_travis_checks(contexts: &[String]) -> Vec<String> {
    contexts
        .iter()
        .filter(|context| !is_travis_check(context))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAKE8: &str = "sudo: false
language: python
matrix:
  include:
    - python: '3.8'
      install:
        - pip install -r <(curl https://raw.githubusercontent.com/lsst/linting/master/requirements.txt)
      script: flake8
";

    #[test]
    fn matches_flake8_job() {
        assert!(is_flake8_travis(FLAKE8.as_bytes()));
    }

    #[test]
    fn matches_quoted_install_and_list_script() {
        let contents = FLAKE8
            .replace(
                "- pip install -r <(curl https://raw.githubusercontent.com/lsst/linting/master/requirements.txt)",
                "- 'pip install -r <(curl https://raw.githubusercontent.com/lsst/linting/master/requirements.txt)'",
            )
            .replace("script: flake8", "script:\n        - flake8");
        assert!(is_flake8_travis(contents.as_bytes()));
    }

    #[test]
    fn allows_trailing_whitespace() {
        let contents = format!("{FLAKE8}\n\n   \n");
        assert!(is_flake8_travis(contents.as_bytes()));
    }

    #[test]
    fn rejects_trailing_content() {
        let contents = format!("{FLAKE8}notifications:\n  email: false\n");
        assert!(!is_flake8_travis(contents.as_bytes()));
    }

    #[test]
    fn rejects_other_python_versions() {
        let contents = FLAKE8.replace("'3.8'", "'3.9'");
        assert!(!is_flake8_travis(contents.as_bytes()));
    }

    #[test]
    fn rejects_leading_content() {
        let contents = format!("dist: xenial\n{FLAKE8}");
        assert!(!is_flake8_travis(contents.as_bytes()));
    }

    #[test]
    fn rejects_non_flake8_script() {
        let contents = FLAKE8.replace("script: flake8", "script: pytest");
        assert!(!is_flake8_travis(contents.as_bytes()));
    }

    #[test]
    fn rejects_non_ascii_whitespace() {
        let contents = FLAKE8.replace("script: flake8", "script:\u{a0}flake8");
        assert!(!is_flake8_travis(contents.as_bytes()));

        let contents = FLAKE8.replace("\n  include:", "\n\u{2028}include:");
        assert!(!is_flake8_travis(contents.as_bytes()));
    }

    #[test]
    fn strip_travis_checks_keeps_order() {
        let contexts = vec![
            "lint".to_string(),
            "Travis CI - Branch".to_string(),
            "build".to_string(),
            "continuous-integration/travis-ci".to_string(),
        ];
        assert_eq!(strip_travis_checks(&contexts), vec!["lint", "build"]);
    }
}
