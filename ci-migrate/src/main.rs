//! Travis-CI to GitHub Actions migration tool.
//!
//! `detect` audits an organization's repositories and prints the `update`
//! command each one needs; `update` applies those changes to one repository.

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use ci_migrate::core::types::RepoRef;
use ci_migrate::core::workflow::{UpdatePlan, Workflow};
use ci_migrate::detect::{Selection, run_detect};
use ci_migrate::exit_codes;
use ci_migrate::io::config::{DEFAULT_CONFIG_PATH, MigrateConfig, load_config};
use ci_migrate::io::github::GithubClient;
use ci_migrate::logging;
use ci_migrate::update::{UpdateOutcome, UpdateRequest, run_update};

#[derive(Parser)]
#[command(
    name = "ci-migrate",
    version,
    about = "Audit and migrate Travis-CI lint setups to GitHub Actions"
)]
struct Cli {
    /// Path to the TOML config (defaults apply when missing).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report what each repository needs and print the `update` command for it.
    Detect {
        /// Audit only this repository.
        #[arg(conflicts_with_all = ["start", "end"])]
        repo: Option<String>,
        /// First index (0-based) of the sorted repository list to audit.
        #[arg(long)]
        start: Option<usize>,
        /// Index one past the last repository to audit.
        #[arg(long)]
        end: Option<usize>,
    },
    /// Update one repository's workflows and branch protection.
    Update(UpdateArgs),
}

#[derive(Args, Debug)]
struct UpdateArgs {
    repo: String,
    /// Delete `.travis.yml` and its status checks.
    #[arg(long)]
    remove_travis: bool,
    /// Add the null placeholder workflow.
    #[arg(long)]
    null_check: bool,
    /// Add the Python lint workflow.
    #[arg(long)]
    flake8: bool,
    #[arg(long)]
    shellcheck: bool,
    #[arg(long)]
    yamllint: bool,
    /// Organization owning the repository (overrides config).
    #[arg(long)]
    org: Option<String>,
    /// Distribution tag the repository must carry (overrides config).
    #[arg(long)]
    tag: Option<String>,
    /// Target a user's repository instead of the organization's.
    #[arg(long)]
    user: Option<String>,
}

impl UpdateArgs {
    fn plan(&self) -> UpdatePlan {
        let requested = [
            (self.flake8, Workflow::Lint),
            (self.shellcheck, Workflow::Shellcheck),
            (self.yamllint, Workflow::Yamllint),
            (self.null_check, Workflow::Null),
        ];
        let workflows: BTreeSet<Workflow> = requested
            .into_iter()
            .filter_map(|(wanted, workflow)| wanted.then_some(workflow))
            .collect();
        UpdatePlan {
            remove_travis: self.remove_travis,
            workflows,
        }
    }

    /// Apply `--org/--tag` to `cfg` and build the request for this repository.
    ///
    /// The tag requirement only holds for the configured home organization
    /// when no `--user` is given.
    fn request(&self, cfg: MigrateConfig) -> Result<(MigrateConfig, UpdateRequest)> {
        let home_org = cfg.org.clone();
        let cfg = cfg.with_overrides(self.org.as_deref(), self.tag.as_deref())?;
        let owner = self.user.clone().unwrap_or_else(|| cfg.org.clone());
        let request = UpdateRequest {
            repo: RepoRef::new(owner, self.repo.as_str()),
            plan: self.plan(),
            require_tag: self.user.is_none() && cfg.org == home_org,
        };
        Ok((cfg, request))
    }
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Detect { repo, start, end } => {
            let forge = GithubClient::from_config(&cfg)?;
            let selection = Selection::from_args(repo, start, end);
            let summary = run_detect(&forge, &cfg, &selection, &mut out)?;
            out.flush()?;
            if summary.errors > 0 {
                return Ok(exit_codes::PARTIAL);
            }
            Ok(exit_codes::OK)
        }
        Command::Update(args) => {
            let (cfg, request) = args.request(cfg)?;
            let forge = GithubClient::from_config(&cfg)?;
            let outcome = run_update(&forge, &cfg, &request, &mut out)?;
            out.flush()?;
            match outcome {
                UpdateOutcome::Applied(_) => Ok(exit_codes::OK),
                UpdateOutcome::Refused(_) => Ok(exit_codes::REFUSED),
            }
        }
    }
}
