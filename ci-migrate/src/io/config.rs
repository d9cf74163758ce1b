//! Tool configuration stored in `ci-migrate.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{Policy, RepoRef};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "ci-migrate.toml";

/// `ci-migrate` configuration (TOML).
///
/// Every field is optional in the file; missing fields default to the values
/// used for the `lsst` organization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MigrateConfig {
    /// Organization whose repositories are audited.
    pub org: String,

    /// Only repositories carrying this tag are migrated.
    pub distrib_tag: String,

    /// `owner/name` of the repository holding the workflow templates.
    pub template_repo: String,

    /// Directory inside `template_repo` holding `<workflow>.yaml` templates.
    pub template_dir: String,

    /// GitHub REST API base URL.
    pub api_url: String,

    /// Environment variable holding the GitHub token.
    pub token_env: String,

    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            org: "lsst".to_string(),
            distrib_tag: "w.2020.47".to_string(),
            template_repo: "lsst/.github".to_string(),
            template_dir: "workflow-templates".to_string(),
            api_url: "https://api.github.com".to_string(),
            token_env: "GH_TOKEN".to_string(),
            timeout_secs: 30,
        }
    }
}

impl MigrateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.org.trim().is_empty() {
            return Err(anyhow!("org must be non-empty"));
        }
        if self.distrib_tag.trim().is_empty() {
            return Err(anyhow!("distrib_tag must be non-empty"));
        }
        RepoRef::parse(&self.template_repo).context("template_repo")?;
        if self.template_dir.trim().is_empty() {
            return Err(anyhow!("template_dir must be non-empty"));
        }
        if !(self.api_url.starts_with("https://") || self.api_url.starts_with("http://")) {
            return Err(anyhow!("api_url must be an http(s) URL"));
        }
        if self.token_env.trim().is_empty() {
            return Err(anyhow!("token_env must be non-empty"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Apply per-invocation `--org`/`--tag` overrides.
    pub fn with_overrides(mut self, org: Option<&str>, tag: Option<&str>) -> Result<Self> {
        if let Some(org) = org {
            self.org = org.to_string();
        }
        if let Some(tag) = tag {
            self.distrib_tag = tag.to_string();
        }
        self.validate()?;
        Ok(self)
    }

    pub fn policy(&self) -> Policy {
        Policy {
            distrib_tag: self.distrib_tag.clone(),
        }
    }

    pub fn template_repo(&self) -> Result<RepoRef> {
        RepoRef::parse(&self.template_repo)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read the GitHub token from the configured environment variable.
    pub fn resolve_token(&self) -> Result<String> {
        let token = std::env::var(&self.token_env)
            .with_context(|| format!("read GitHub token from ${}", self.token_env))?;
        if token.trim().is_empty() {
            return Err(anyhow!("${} is empty", self.token_env));
        }
        Ok(token)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MigrateConfig::default()`.
pub fn load_config(path: &Path) -> Result<MigrateConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = MigrateConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MigrateConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    debug!(path = %path.display(), org = %cfg.org, "config loaded");
    Ok(cfg)
}
