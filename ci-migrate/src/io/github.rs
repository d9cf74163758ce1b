//! GitHub access for `detect` and `update`.
//!
//! [`Forge`] is the narrow seam the orchestration code talks to; it covers only
//! the REST calls this tool needs. [`GithubClient`] implements it over the
//! GitHub REST v3 API with a blocking HTTP client. Lookups that hit a 404 map
//! to `None` rather than an error.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::core::types::{
    Actors, Branch, BranchRules, ContentEntry, EntryKind, FileContent, MergeSettings, Protection,
    RepoRef, Repository, ReviewRules, StatusChecks,
};
use crate::io::config::MigrateConfig;

const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: usize = 100;

pub trait Forge {
    fn repository(&self, repo: &RepoRef) -> Result<Option<Repository>>;

    /// Public repositories of `org`, sorted by full name ascending.
    fn org_repositories(&self, org: &str) -> Result<Vec<Repository>>;

    fn tags(&self, repo: &RepoRef) -> Result<Vec<String>>;

    fn branch(&self, repo: &RepoRef, branch: &str) -> Result<Option<Branch>>;

    /// `None` when the branch is not protected.
    fn protection(&self, repo: &RepoRef, branch: &str) -> Result<Option<Protection>>;

    fn file(&self, repo: &RepoRef, path: &str) -> Result<Option<FileContent>>;

    fn directory(&self, repo: &RepoRef, path: &str) -> Result<Option<Vec<ContentEntry>>>;

    fn edit_merge_settings(&self, repo: &RepoRef, settings: &MergeSettings) -> Result<()>;

    fn set_admin_enforcement(&self, repo: &RepoRef, branch: &str, enabled: bool) -> Result<()>;

    /// Replace the required status checks of an already protected branch.
    fn set_required_status_checks(
        &self,
        repo: &RepoRef,
        branch: &str,
        checks: &StatusChecks,
    ) -> Result<()>;

    /// Replace the whole protection of `branch` (creating it if needed).
    fn put_protection(&self, repo: &RepoRef, branch: &str, protection: &Protection) -> Result<()>;

    fn delete_file(&self, repo: &RepoRef, path: &str, sha: &str, message: &str) -> Result<()>;

    fn create_file(&self, repo: &RepoRef, path: &str, contents: &[u8], message: &str)
    -> Result<()>;
}

/// [`Forge`] over the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: Client,
    api_url: String,
    token: String,
}

impl GithubClient {
    pub fn new(api_url: &str, token: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ci-migrate/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(cfg: &MigrateConfig) -> Result<Self> {
        let token = cfg.resolve_token()?;
        Self::new(&cfg.api_url, token, cfg.timeout())
    }

    fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
        debug!(%method, path, "github request");
        let mut request = self
            .http
            .request(method.clone(), format!("{}{path}", self.api_url))
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().with_context(|| format!("{method} {path}"))
    }

    fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self.send(Method::GET, path, None)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(path, "not found");
            return Ok(None);
        }
        let response = ensure_success(&Method::GET, path, response)?;
        let value = response
            .json()
            .with_context(|| format!("decode GET {path}"))?;
        Ok(Some(value))
    }

    fn get_paged<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let page_path = format!("{path}{separator}per_page={PAGE_SIZE}&page={page}");
            let batch: Vec<T> = self
                .get_optional(&page_path)?
                .ok_or_else(|| anyhow!("GET {page_path}: not found"))?;
            let last = batch.len() < PAGE_SIZE;
            items.extend(batch);
            if last {
                return Ok(items);
            }
            page += 1;
        }
    }

    fn write(&self, method: Method, path: &str, body: Option<Value>) -> Result<()> {
        let response = self.send(method.clone(), path, body.as_ref())?;
        ensure_success(&method, path, response)?;
        Ok(())
    }
}

impl Forge for GithubClient {
    fn repository(&self, repo: &RepoRef) -> Result<Option<Repository>> {
        let found: Option<ApiRepository> = self.get_optional(&format!("/repos/{repo}"))?;
        Ok(found.map(Repository::from))
    }

    fn org_repositories(&self, org: &str) -> Result<Vec<Repository>> {
        let repos: Vec<ApiRepository> = self.get_paged(&format!(
            "/orgs/{org}/repos?type=public&sort=full_name&direction=asc"
        ))?;
        debug!(org, count = repos.len(), "listed org repositories");
        Ok(repos.into_iter().map(Repository::from).collect())
    }

    fn tags(&self, repo: &RepoRef) -> Result<Vec<String>> {
        let tags: Vec<ApiTag> = self.get_paged(&format!("/repos/{repo}/tags"))?;
        Ok(tags.into_iter().map(|tag| tag.name).collect())
    }

    fn branch(&self, repo: &RepoRef, branch: &str) -> Result<Option<Branch>> {
        let found: Option<ApiBranch> =
            self.get_optional(&format!("/repos/{repo}/branches/{branch}"))?;
        Ok(found.map(|branch| Branch {
            name: branch.name,
            protected: branch.protected,
        }))
    }

    fn protection(&self, repo: &RepoRef, branch: &str) -> Result<Option<Protection>> {
        let found: Option<ApiProtection> =
            self.get_optional(&format!("/repos/{repo}/branches/{branch}/protection"))?;
        Ok(found.map(Protection::from))
    }

    fn file(&self, repo: &RepoRef, path: &str) -> Result<Option<FileContent>> {
        let found: Option<ApiFile> = self.get_optional(&format!("/repos/{repo}/contents/{path}"))?;
        found.map(decode_file).transpose()
    }

    fn directory(&self, repo: &RepoRef, path: &str) -> Result<Option<Vec<ContentEntry>>> {
        let found: Option<Value> = self.get_optional(&format!("/repos/{repo}/contents/{path}"))?;
        match found {
            Some(listing) => parse_listing(path, listing),
            None => Ok(None),
        }
    }

    fn edit_merge_settings(&self, repo: &RepoRef, settings: &MergeSettings) -> Result<()> {
        self.write(
            Method::PATCH,
            &format!("/repos/{repo}"),
            Some(json!({
                "allow_rebase_merge": settings.allow_rebase_merge,
                "allow_squash_merge": settings.allow_squash_merge,
                "delete_branch_on_merge": settings.delete_branch_on_merge,
            })),
        )
    }

    fn set_admin_enforcement(&self, repo: &RepoRef, branch: &str, enabled: bool) -> Result<()> {
        let method = if enabled { Method::POST } else { Method::DELETE };
        self.write(
            method,
            &format!("/repos/{repo}/branches/{branch}/protection/enforce_admins"),
            None,
        )
    }

    fn set_required_status_checks(
        &self,
        repo: &RepoRef,
        branch: &str,
        checks: &StatusChecks,
    ) -> Result<()> {
        self.write(
            Method::PATCH,
            &format!("/repos/{repo}/branches/{branch}/protection/required_status_checks"),
            Some(status_checks_body(checks)),
        )
    }

    fn put_protection(&self, repo: &RepoRef, branch: &str, protection: &Protection) -> Result<()> {
        self.write(
            Method::PUT,
            &format!("/repos/{repo}/branches/{branch}/protection"),
            Some(protection_body(protection)),
        )
    }

    fn delete_file(&self, repo: &RepoRef, path: &str, sha: &str, message: &str) -> Result<()> {
        self.write(
            Method::DELETE,
            &format!("/repos/{repo}/contents/{path}"),
            Some(json!({ "message": message, "sha": sha })),
        )
    }

    fn create_file(
        &self,
        repo: &RepoRef,
        path: &str,
        contents: &[u8],
        message: &str,
    ) -> Result<()> {
        self.write(
            Method::PUT,
            &format!("/repos/{repo}/contents/{path}"),
            Some(json!({ "message": message, "content": STANDARD.encode(contents) })),
        )
    }
}

fn ensure_success(method: &Method, path: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(anyhow!("{method} {path} failed: HTTP {status}: {}", body.trim()))
}

fn status_checks_body(checks: &StatusChecks) -> Value {
    json!({ "strict": checks.strict, "contexts": checks.contexts })
}

fn actors_body(actors: &Actors) -> Value {
    json!({ "users": actors.users, "teams": actors.teams, "apps": actors.apps })
}

/// Body for a full protection `PUT`. Anything left out of it is reset by
/// GitHub, so every modelled rule is sent back.
fn protection_body(protection: &Protection) -> Value {
    let reviews = protection.reviews.as_ref().map(|reviews| {
        let mut body = json!({
            "dismiss_stale_reviews": reviews.dismiss_stale_reviews,
            "require_code_owner_reviews": reviews.require_code_owner_reviews,
            "required_approving_review_count": reviews.required_approving_review_count,
            "require_last_push_approval": reviews.require_last_push_approval,
        });
        if let Some(actors) = &reviews.dismissal_restrictions {
            body["dismissal_restrictions"] = actors_body(actors);
        }
        if let Some(actors) = &reviews.bypass_pull_request_allowances {
            body["bypass_pull_request_allowances"] = actors_body(actors);
        }
        body
    });
    let rules = &protection.rules;
    json!({
        "required_status_checks": protection.required_status_checks.as_ref().map(status_checks_body),
        "enforce_admins": protection.enforce_admins,
        "required_pull_request_reviews": reviews,
        "restrictions": protection.restrictions.as_ref().map(actors_body),
        "required_linear_history": rules.required_linear_history,
        "allow_force_pushes": rules.allow_force_pushes,
        "allow_deletions": rules.allow_deletions,
        "block_creations": rules.block_creations,
        "required_conversation_resolution": rules.required_conversation_resolution,
        "lock_branch": rules.lock_branch,
        "allow_fork_syncing": rules.allow_fork_syncing,
    })
}

fn decode_file(file: ApiFile) -> Result<FileContent> {
    let bytes = match file.encoding.as_deref() {
        Some("base64") => {
            let compact: String = file.content.unwrap_or_default().split_whitespace().collect();
            STANDARD
                .decode(compact)
                .with_context(|| format!("decode base64 content of {}", file.path))?
        }
        other => {
            return Err(anyhow!(
                "{}: unsupported content encoding {other:?}",
                file.path
            ));
        }
    };
    Ok(FileContent {
        path: file.path,
        sha: file.sha,
        bytes,
    })
}

/// A contents response for a directory is an array; a file or symlink at
/// `path` comes back as a single object and counts as no directory.
fn parse_listing(path: &str, listing: Value) -> Result<Option<Vec<ContentEntry>>> {
    if !listing.is_array() {
        debug!(path, "not a directory");
        return Ok(None);
    }
    let entries: Vec<ApiEntry> =
        serde_json::from_value(listing).with_context(|| format!("decode listing of {path}"))?;
    Ok(Some(entries.into_iter().map(ContentEntry::from).collect()))
}

// Wire shapes of the REST responses. Only the fields we read are declared.

#[derive(Debug, Deserialize)]
struct ApiOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiRepository {
    name: String,
    owner: ApiOwner,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    fork: bool,
    default_branch: String,
    allow_rebase_merge: Option<bool>,
    allow_squash_merge: Option<bool>,
    delete_branch_on_merge: Option<bool>,
}

impl From<ApiRepository> for Repository {
    fn from(api: ApiRepository) -> Self {
        Self {
            repo: RepoRef::new(api.owner.login, api.name),
            archived: api.archived,
            fork: api.fork,
            default_branch: api.default_branch,
            allow_rebase_merge: api.allow_rebase_merge.unwrap_or(false),
            allow_squash_merge: api.allow_squash_merge.unwrap_or(false),
            delete_branch_on_merge: api.delete_branch_on_merge.unwrap_or(false),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiBranch {
    name: String,
    #[serde(default)]
    protected: bool,
}

#[derive(Debug, Deserialize)]
struct ApiStatusChecks {
    #[serde(default)]
    strict: bool,
    #[serde(default)]
    contexts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEnabled {
    enabled: bool,
}

fn enabled(flag: Option<ApiEnabled>) -> bool {
    flag.is_some_and(|flag| flag.enabled)
}

#[derive(Debug, Deserialize)]
struct ApiLogin {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiSlug {
    slug: String,
}

#[derive(Debug, Deserialize)]
struct ApiActors {
    #[serde(default)]
    users: Vec<ApiLogin>,
    #[serde(default)]
    teams: Vec<ApiSlug>,
    #[serde(default)]
    apps: Vec<ApiSlug>,
}

impl From<ApiActors> for Actors {
    fn from(api: ApiActors) -> Self {
        Self {
            users: api.users.into_iter().map(|user| user.login).collect(),
            teams: api.teams.into_iter().map(|team| team.slug).collect(),
            apps: api.apps.into_iter().map(|app| app.slug).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiReviews {
    dismissal_restrictions: Option<ApiActors>,
    #[serde(default)]
    dismiss_stale_reviews: bool,
    #[serde(default)]
    require_code_owner_reviews: bool,
    #[serde(default)]
    required_approving_review_count: u32,
    #[serde(default)]
    require_last_push_approval: bool,
    bypass_pull_request_allowances: Option<ApiActors>,
}

impl From<ApiReviews> for ReviewRules {
    fn from(api: ApiReviews) -> Self {
        Self {
            dismissal_restrictions: api.dismissal_restrictions.map(Actors::from),
            dismiss_stale_reviews: api.dismiss_stale_reviews,
            require_code_owner_reviews: api.require_code_owner_reviews,
            required_approving_review_count: api.required_approving_review_count,
            require_last_push_approval: api.require_last_push_approval,
            bypass_pull_request_allowances: api.bypass_pull_request_allowances.map(Actors::from),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiProtection {
    required_status_checks: Option<ApiStatusChecks>,
    enforce_admins: Option<ApiEnabled>,
    required_pull_request_reviews: Option<ApiReviews>,
    restrictions: Option<ApiActors>,
    required_linear_history: Option<ApiEnabled>,
    allow_force_pushes: Option<ApiEnabled>,
    allow_deletions: Option<ApiEnabled>,
    block_creations: Option<ApiEnabled>,
    required_conversation_resolution: Option<ApiEnabled>,
    lock_branch: Option<ApiEnabled>,
    allow_fork_syncing: Option<ApiEnabled>,
}

impl From<ApiProtection> for Protection {
    fn from(api: ApiProtection) -> Self {
        Self {
            required_status_checks: api.required_status_checks.map(|checks| StatusChecks {
                strict: checks.strict,
                contexts: checks.contexts,
            }),
            enforce_admins: enabled(api.enforce_admins),
            reviews: api.required_pull_request_reviews.map(ReviewRules::from),
            restrictions: api.restrictions.map(Actors::from),
            rules: BranchRules {
                required_linear_history: enabled(api.required_linear_history),
                allow_force_pushes: enabled(api.allow_force_pushes),
                allow_deletions: enabled(api.allow_deletions),
                block_creations: enabled(api.block_creations),
                required_conversation_resolution: enabled(api.required_conversation_resolution),
                lock_branch: enabled(api.lock_branch),
                allow_fork_syncing: enabled(api.allow_fork_syncing),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiFile {
    path: String,
    sha: String,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEntry {
    name: String,
    path: String,
    sha: String,
    #[serde(rename = "type")]
    kind: String,
}

impl From<ApiEntry> for ContentEntry {
    fn from(api: ApiEntry) -> Self {
        let kind = match api.kind.as_str() {
            "file" => EntryKind::File,
            "dir" => EntryKind::Dir,
            _ => EntryKind::Other,
        };
        Self {
            name: api.name,
            path: api.path,
            sha: api.sha,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_defaults_missing_merge_settings() {
        let api: ApiRepository = serde_json::from_value(json!({
            "name": "afw",
            "full_name": "lsst/afw",
            "owner": { "login": "lsst" },
            "archived": false,
            "fork": false,
            "default_branch": "main",
            "allow_rebase_merge": true
        }))
        .expect("repo json");
        let repo = Repository::from(api);
        assert_eq!(repo.repo, RepoRef::new("lsst", "afw"));
        assert!(repo.allow_rebase_merge);
        assert!(!repo.allow_squash_merge);
        assert!(!repo.delete_branch_on_merge);
    }

    #[test]
    fn protection_parses_nested_flags() {
        let api: ApiProtection = serde_json::from_value(json!({
            "url": "https://api.github.com/repos/lsst/afw/branches/main/protection",
            "required_status_checks": {
                "strict": true,
                "contexts": ["Travis CI - Branch", "lint"]
            },
            "enforce_admins": { "url": "x", "enabled": true },
            "required_pull_request_reviews": {
                "dismissal_restrictions": {
                    "users": [{ "login": "octocat" }],
                    "teams": [{ "slug": "release" }],
                    "apps": []
                },
                "dismiss_stale_reviews": false,
                "required_approving_review_count": 1,
                "require_last_push_approval": true
            },
            "restrictions": {
                "users": [],
                "teams": [{ "slug": "maintainers" }],
                "apps": [{ "slug": "release-bot" }]
            },
            "required_linear_history": { "enabled": true },
            "allow_force_pushes": { "enabled": false },
            "required_conversation_resolution": { "enabled": true }
        }))
        .expect("protection json");
        let protection = Protection::from(api);
        assert!(protection.enforce_admins);
        assert_eq!(
            protection.required_status_checks,
            Some(StatusChecks {
                strict: true,
                contexts: vec!["Travis CI - Branch".to_string(), "lint".to_string()],
            })
        );
        assert_eq!(
            protection.reviews,
            Some(ReviewRules {
                dismissal_restrictions: Some(Actors {
                    users: vec!["octocat".to_string()],
                    teams: vec!["release".to_string()],
                    apps: Vec::new(),
                }),
                required_approving_review_count: 1,
                require_last_push_approval: true,
                ..ReviewRules::default()
            })
        );
        assert_eq!(
            protection.restrictions,
            Some(Actors {
                users: Vec::new(),
                teams: vec!["maintainers".to_string()],
                apps: vec!["release-bot".to_string()],
            })
        );
        assert_eq!(
            protection.rules,
            BranchRules {
                required_linear_history: true,
                required_conversation_resolution: true,
                ..BranchRules::default()
            }
        );
    }

    #[test]
    fn unprotected_extras_parse_as_absent() {
        let api: ApiProtection = serde_json::from_value(json!({
            "enforce_admins": { "enabled": false }
        }))
        .expect("protection json");
        assert_eq!(Protection::from(api), Protection::default());
    }

    #[test]
    fn decode_file_strips_line_breaks() {
        let file = ApiFile {
            path: ".travis.yml".to_string(),
            sha: "abc".to_string(),
            content: Some("c3VkbzogZmFs\nc2UK\n".to_string()),
            encoding: Some("base64".to_string()),
        };
        let decoded = decode_file(file).expect("decode");
        assert_eq!(decoded.bytes, b"sudo: false\n");
        assert_eq!(decoded.sha, "abc");
    }

    #[test]
    fn decode_file_rejects_unencoded_content() {
        let file = ApiFile {
            path: "big.bin".to_string(),
            sha: "abc".to_string(),
            content: Some(String::new()),
            encoding: Some("none".to_string()),
        };
        assert!(decode_file(file).is_err());
    }

    #[test]
    fn minimal_protection_body_sends_every_rule() {
        let body = protection_body(&Protection {
            required_status_checks: Some(StatusChecks {
                strict: true,
                contexts: vec!["lint".to_string()],
            }),
            enforce_admins: true,
            ..Protection::default()
        });
        assert_eq!(
            body,
            json!({
                "required_status_checks": { "strict": true, "contexts": ["lint"] },
                "enforce_admins": true,
                "required_pull_request_reviews": null,
                "restrictions": null,
                "required_linear_history": false,
                "allow_force_pushes": false,
                "allow_deletions": false,
                "block_creations": false,
                "required_conversation_resolution": false,
                "lock_branch": false,
                "allow_fork_syncing": false,
            })
        );
    }

    #[test]
    fn protection_body_keeps_restrictions_and_review_actors() {
        let body = protection_body(&Protection {
            required_status_checks: None,
            enforce_admins: true,
            reviews: Some(ReviewRules {
                dismissal_restrictions: Some(Actors {
                    users: vec!["octocat".to_string()],
                    ..Actors::default()
                }),
                required_approving_review_count: 2,
                ..ReviewRules::default()
            }),
            restrictions: Some(Actors {
                teams: vec!["maintainers".to_string()],
                ..Actors::default()
            }),
            rules: BranchRules {
                required_linear_history: true,
                ..BranchRules::default()
            },
        });
        assert_eq!(
            body["restrictions"],
            json!({ "users": [], "teams": ["maintainers"], "apps": [] })
        );
        assert_eq!(
            body["required_pull_request_reviews"],
            json!({
                "dismiss_stale_reviews": false,
                "require_code_owner_reviews": false,
                "required_approving_review_count": 2,
                "require_last_push_approval": false,
                "dismissal_restrictions": { "users": ["octocat"], "teams": [], "apps": [] },
            })
        );
        assert_eq!(body["required_linear_history"], json!(true));
    }

    #[test]
    fn listing_maps_kinds() {
        let entries = parse_listing(
            ".github/workflows",
            json!([
                { "name": "lint.yaml", "path": ".github/workflows/lint.yaml", "sha": "1", "type": "file" },
                { "name": "nested", "path": ".github/workflows/nested", "sha": "2", "type": "dir" }
            ]),
        )
        .expect("listing")
        .expect("directory");
        let kinds: Vec<EntryKind> = entries.into_iter().map(|entry| entry.kind).collect();
        assert_eq!(kinds, vec![EntryKind::File, EntryKind::Dir]);
    }

    #[test]
    fn file_in_place_of_directory_is_no_listing() {
        let listing = parse_listing(
            ".github/workflows",
            json!({
                "type": "symlink",
                "name": "workflows",
                "path": ".github/workflows",
                "sha": "3",
                "target": "../ci"
            }),
        )
        .expect("listing");
        assert_eq!(listing, None);
    }
}
