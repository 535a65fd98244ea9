use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crusher_replay::action::{Action, Test, TestId};
use crusher_replay::artifacts::{ArtifactDir, cleanup_old_runs, list_runs};
use crusher_replay::config::{self, BackendSettings};
use crusher_replay::driver::{BrowserDriver, MockBrowser, WebDriverClient, WebDriverConfig};
use crusher_replay::gateway::{HttpGateway, InMemoryGateway, TestGateway};
use crusher_replay::resolver::Resolver;
use crusher_replay::runner::{SessionReport, StepStatus};
use crusher_replay::session::{ExecutionSession, SessionOptions};
use crusher_replay::DeviceProfile;

/// Crusher Replay - replay recorded browser tests
#[derive(Parser, Debug)]
#[command(
    name = "crusher-replay",
    about = "Resolve, replay and manage recorded browser tests",
    after_help = "ENVIRONMENT VARIABLES:\n\
        CRUSHER_BACKEND_URL        Backend API base URL\n\
        CRUSHER_TOKEN              Backend access token\n\
        CRUSHER_PROJECT_ID         Project new tests are created in\n\
        CRUSHER_WEBDRIVER_URL      WebDriver endpoint\n\
        CRUSHER_ARTIFACTS_DIR      Base directory for run artifacts\n\
        RUST_LOG                   Log filter (overrides --verbose)"
)]
struct Args {
    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Backend API base URL
    #[arg(long, global = true, env = "CRUSHER_BACKEND_URL")]
    backend: Option<String>,

    /// Backend access token
    #[arg(long, global = true, env = "CRUSHER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Serve tests from a local JSON file (array of {id, events}) instead of the backend
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the flattened action sequence of a test
    Resolve {
        /// Test to resolve
        test_id: Option<String>,

        /// Resolve a local recording (JSON array of actions, or {events}) instead
        #[arg(long, short = 'a', conflicts_with = "test_id")]
        actions: Option<PathBuf>,

        /// Output the sequence as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a test against a browser
    Replay {
        /// Test to replay
        test_id: Option<String>,

        /// Replay a local recording instead
        #[arg(long, short = 'a', conflicts_with = "test_id")]
        actions: Option<PathBuf>,

        /// WebDriver endpoint
        #[arg(long, env = "CRUSHER_WEBDRIVER_URL", default_value = config::DEFAULT_WEBDRIVER_URL)]
        webdriver: String,

        /// Browser to request from the WebDriver endpoint
        #[arg(long, default_value = "chrome")]
        browser: String,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Replay against a mock page fixture (JSON) instead of a real browser
        #[arg(long)]
        mock_page: Option<PathBuf>,

        /// Artifact directory (default: auto-generated under CRUSHER_ARTIFACTS_DIR)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep artifacts after completion (default: cleanup unless --output is given or a step captured a screenshot)
        #[arg(long, short = 'k')]
        keep: bool,

        /// Stop at the first failed assertion
        #[arg(long, env = "CRUSHER_ABORT_ON_ASSERTION")]
        abort_on_assertion: bool,

        /// Device applied when the recording sets none
        #[arg(long, env = "CRUSHER_DEFAULT_DEVICE", default_value = config::DEFAULT_DEVICE)]
        device: String,

        /// Output the session report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Save a local recording as a new test
    Save {
        /// Recording to upload
        file: PathBuf,

        /// Test name (default: current date and time)
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// Project to create the test in
        #[arg(long, short = 'p', env = "CRUSHER_PROJECT_ID")]
        project: Option<String>,
    },

    /// Replace the steps of an existing test
    Update {
        test_id: String,

        /// Recording with the new steps
        file: PathBuf,
    },

    /// Rename a test
    Rename { test_id: String, name: String },

    /// Print the report of a build
    Report { build_id: String },

    /// Trigger a run of a project's tests
    Trigger {
        #[arg(long, short = 'p', env = "CRUSHER_PROJECT_ID")]
        project: String,

        /// Comma-separated test ids (default: all tests of the project)
        #[arg(long, value_delimiter = ',')]
        tests: Vec<String>,
    },

    /// Remove old run directories
    Clean {
        /// Remove runs older than this many hours
        #[arg(long, default_value = "24")]
        older_than_hours: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let project_override = match &args.command {
        Commands::Save { project, .. } => project.clone(),
        _ => None,
    };
    let gateway = build_gateway(&args, project_override)?;

    match args.command {
        Commands::Resolve { test_id, actions, json } => {
            let resolver = Resolver::new(gateway);
            let flat = match (test_id, actions) {
                (Some(id), _) => resolver.resolve_test(&TestId::new(id)).await?,
                (None, Some(path)) => resolver.resolve(&load_actions(&path)?, true).await?,
                (None, None) => return Err("pass a test id or --actions FILE".into()),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&flat)?);
            } else {
                println!("{} actions", flat.len());
                for (index, action) in flat.iter().enumerate() {
                    println!("  [{}] {}", index, action.label());
                }
            }
        }

        Commands::Replay {
            test_id,
            actions,
            webdriver,
            browser,
            headed,
            mock_page,
            output,
            keep,
            abort_on_assertion,
            device,
            json,
        } => {
            let driver: Box<dyn BrowserDriver> = match &mock_page {
                Some(fixture) => Box::new(MockBrowser::from_fixture(fixture)?),
                None => {
                    let wd = WebDriverConfig::new(&webdriver)
                        .browser(&browser)
                        .headless(!headed)
                        .request_timeout(Duration::from_secs(config::get().backend.request_timeout));
                    Box::new(WebDriverClient::connect(&wd).await?)
                }
            };

            let artifacts = match output {
                Some(dir) => ArtifactDir::in_dir(dir),
                None => {
                    let name = test_id.as_deref().unwrap_or("recording");
                    ArtifactDir::with_name(name).keep(keep)
                }
            };

            let mut options = SessionOptions::from_config(config::get());
            options.abort_on_assertion_failure |= abort_on_assertion;
            options.default_device = DeviceProfile::find(&device).or_else(|| DeviceProfile::from_dimensions(&device));
            if options.default_device.is_none() {
                warn!(device = %device, "unknown default device; keeping the browser's viewport");
            }

            let mut session = ExecutionSession::new(gateway, driver, artifacts).with_options(options);
            let cancel = session.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current action");
                    cancel.cancel();
                }
            });

            match (test_id, actions) {
                (Some(id), _) => session.run(&TestId::new(id)).await?,
                (None, Some(path)) => session.run_actions(&load_actions(&path)?).await?,
                (None, None) => return Err("pass a test id or --actions FILE".into()),
            };
            let (report, artifacts) = session.close().await;
            let captured = report.results.iter().any(|r| r.artifact.is_some());
            if captured && !artifacts.keep {
                info!(dir = %artifacts.dir.display(), "keeping run directory with captures");
            }
            let keep_dir = artifacts.keep || captured;
            let artifacts = artifacts.keep(keep_dir);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            // process::exit skips destructors
            drop(artifacts);
            if !report.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Save { file, name, .. } => {
            let actions = load_actions(&file)?;
            let test_id = gateway.save_test(&actions, name.as_deref()).await?;
            println!("Saved test {} ({} actions)", test_id, actions.len());
        }

        Commands::Update { test_id, file } => {
            let actions = load_actions(&file)?;
            gateway.update_test(&TestId::new(test_id.clone()), &actions).await?;
            println!("Updated test {} ({} actions)", test_id, actions.len());
        }

        Commands::Rename { test_id, name } => {
            gateway.rename_test(&TestId::new(test_id.clone()), &name).await?;
            println!("Renamed test {} to {:?}", test_id, name);
        }

        Commands::Report { build_id } => {
            let report = gateway.get_build_report(&build_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Trigger { project, tests } => {
            let ids: Vec<TestId> = tests
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(TestId::from)
                .collect();
            let selected = if ids.is_empty() { None } else { Some(ids.as_slice()) };
            let response = gateway.run_tests(&project, selected).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::Clean { older_than_hours } => {
            let base = PathBuf::from(config::artifacts_base_dir());
            let before = list_runs(&base)?.len();
            let removed = cleanup_old_runs(&base, retention(older_than_hours))?;
            info!(base = %base.display(), removed, "cleanup finished");
            println!("Removed {} of {} run directories in {}", removed, before, base.display());
        }
    }

    Ok(())
}

/// Age after which `clean` removes a run directory
fn retention(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

/// Backend client, or a local store when `--store` is given
fn build_gateway(args: &Args, project: Option<String>) -> Result<Arc<dyn TestGateway>, Box<dyn Error>> {
    if let Some(path) = &args.store {
        let tests: Vec<Test> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let gateway = InMemoryGateway::new();
        for test in tests {
            let id = test.id.ok_or("every test in the store needs an id")?;
            gateway.insert_test(id, test.events);
        }
        return Ok(Arc::new(gateway));
    }

    let mut settings: BackendSettings = config::get().backend.clone();
    if let Some(url) = &args.backend {
        settings.base_url = url.clone();
    }
    if let Some(token) = &args.token {
        settings.token = Some(token.clone());
    }
    if project.is_some() {
        settings.project_id = project;
    }
    Ok(Arc::new(HttpGateway::from_config(&settings)?))
}

/// Read a recording: a JSON array of actions or a test object with `events`
fn load_actions(path: &Path) -> Result<Vec<Action>, Box<dyn Error>> {
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let actions = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        serde_json::from_value::<Test>(value)?.events
    };
    Ok(actions)
}

fn print_report(report: &SessionReport) {
    println!(
        "Replay {:?}: {} passed, {} failed, {} skipped",
        report.state,
        report.passed(),
        report.failed(),
        report.skipped()
    );
    for result in &report.results {
        let mark = match result.status {
            StepStatus::Success => "ok  ",
            StepStatus::Failure => "FAIL",
            StepStatus::Skipped => "skip",
        };
        println!(
            "  [{}] {} {} ({}ms) {}",
            result.action_index, mark, result.action_type, result.duration_ms, result.message
        );
        if let Some(artifact) = &result.artifact {
            println!("         -> {}", artifact.display());
        }
    }
    if let Some(error) = &report.error {
        println!("\n{}: {}", error.kind, error.context);
    }
    if report.artifacts_dir.exists() {
        println!("\nArtifacts: {}", report.artifacts_dir.display());
    }
}
