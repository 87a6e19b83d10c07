//! `harvest`: collect records from comment threads, company rosters and
//! single profiles into CSV.

mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use feed_harvest::ai::OpenAI;
use feed_harvest::{
    ChromiumLauncher, Credentials, HarvestConfig, Harvester, Launcher, RateLimitedLauncher,
    RunReport, Target,
};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::CliConfig;
use crate::output::Layout;

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Harvest contacts from paginated social feeds")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Login username (falls back to LINKEDIN_USERNAME)
    #[arg(long, global = true)]
    username: Option<String>,

    /// Login password (falls back to LINKEDIN_PASSWORD)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Write CSV here instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, global = true)]
    headful: bool,

    /// Stop after this many seconds, keeping what was collected
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    /// Override the reveal-cycle bound
    #[arg(long, global = true)]
    max_cycles: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Commenters on a post who left a contact address
    Comments {
        /// Post URL
        url: String,
        /// Maximum records to collect
        #[arg(short = 'n', long, default_value_t = 50)]
        max_results: usize,
        /// Normalize each record through the inference backend
        #[arg(long)]
        normalize: bool,
    },

    /// Employees listed on a company's people page
    Employees {
        /// Company page or people page URL
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        url: Option<String>,
        /// Company name to search for
        #[arg(long)]
        name: Option<String>,
        #[arg(short = 'n', long, default_value_t = 50)]
        max_results: usize,
        #[arg(long)]
        normalize: bool,
    },

    /// One profile, normalized into structured fields
    Profile {
        /// Profile URL
        url: String,
    },

    /// Print readiness without opening a browser
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,feed_harvest=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = CliConfig::from_env().context("Failed to load configuration")?;

    if let Commands::Health = cli.command {
        health(&config);
        return Ok(());
    }

    let mut harvest_config = HarvestConfig::default();
    if let Some(max) = cli.global.max_cycles {
        harvest_config = harvest_config.with_max_cycles(max);
    }
    if let Some(secs) = cli.global.deadline_secs {
        harvest_config = harvest_config.with_deadline(Duration::from_secs(secs));
    }

    let mut launcher = ChromiumLauncher::new().headless(config.headless && !cli.global.headful);
    if let Some(dir) = &config.profile_dir {
        launcher = launcher.with_user_data_dir(dir);
    }

    match config.actions_per_second {
        Some(rate) => {
            let launcher = RateLimitedLauncher::new(launcher, rate)
                .context("Invalid HARVEST_ACTIONS_PER_SECOND")?;
            run(launcher, harvest_config, &config, cli).await
        }
        None => run(launcher, harvest_config, &config, cli).await,
    }
}

async fn run<L: Launcher>(
    launcher: L,
    harvest_config: HarvestConfig,
    config: &CliConfig,
    cli: Cli,
) -> Result<()> {
    let credentials = explicit_credentials(cli.global.username, cli.global.password)?;

    let wants_inference = match &cli.command {
        Commands::Comments { normalize, .. } | Commands::Employees { normalize, .. } => *normalize,
        Commands::Profile { .. } => true,
        Commands::Health => false,
    };
    let harvest_config = if wants_inference {
        harvest_config.normalize()
    } else {
        harvest_config
    };

    let mut harvester = Harvester::new(launcher, harvest_config);
    if wants_inference {
        match &config.openai_api_key {
            Some(key) => {
                let mut inference = OpenAI::new(key.clone());
                if let Some(model) = &config.openai_model {
                    inference = inference.with_model(model);
                }
                harvester = harvester.with_inference(Arc::new(inference));
            }
            None => tracing::warn!("OPENAI_API_KEY not set, using local field extraction"),
        }
    }

    let output = cli.global.output;
    match cli.command {
        Commands::Comments {
            url, max_results, ..
        } => {
            let target = Target::post_comments(url);
            let report = extract(&harvester, &target, max_results, credentials).await?;
            write_report(&report, output, false)
        }
        Commands::Employees {
            url,
            name,
            max_results,
            ..
        } => {
            let target = match (url, name) {
                (Some(url), _) => Target::company_url(url),
                (None, Some(name)) => Target::company_name(name),
                (None, None) => anyhow::bail!("either --url or --name is required"),
            };
            let report = extract(&harvester, &target, max_results, credentials).await?;
            write_report(&report, output, true)
        }
        Commands::Profile { url } => {
            let profile = harvester
                .extract_profile(&url, credentials)
                .await
                .with_context(|| format!("Profile extraction failed for {}", url))?;
            match output {
                Some(path) => output::write_profile(create(&path)?, &profile)?,
                None => output::write_profile(io::stdout().lock(), &profile)?,
            }
            Ok(())
        }
        Commands::Health => Ok(()),
    }
}

/// Run one extraction, cancelling on Ctrl-C with partial results.
async fn extract<L: Launcher>(
    harvester: &Harvester<L>,
    target: &Target,
    max_results: usize,
    credentials: Option<Credentials>,
) -> Result<RunReport> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing with partial results");
            on_interrupt.cancel();
        }
    });

    let report = harvester
        .extract_entities_with_cancel(target, max_results, credentials, &cancel)
        .await
        .with_context(|| format!("Extraction failed for {}", target))?;

    tracing::info!(
        records = report.len(),
        stop = %report.stop_reason,
        outcome = ?report.outcome,
        "Run complete"
    );
    Ok(report)
}

fn write_report(report: &RunReport, output: Option<PathBuf>, designation: bool) -> Result<()> {
    if report.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    let layout = Layout {
        designation,
        structured: report.records.iter().any(|r| r.structured.is_some()),
    };
    match output {
        Some(path) => {
            output::write_entities(create(&path)?, &report.records, layout)?;
            println!("Wrote {} records to {}", report.len(), path.display());
        }
        None => output::write_entities(io::stdout().lock(), &report.records, layout)?,
    }
    Ok(())
}

fn create(path: &PathBuf) -> Result<File> {
    File::create(path).with_context(|| format!("Failed to create {}", path.display()))
}

/// Credentials given on the command line. `None` lets the library fall
/// back to the environment, or to an already signed-in profile. A flag
/// whose partner is missing from both the command line and the
/// environment is an error.
fn explicit_credentials(
    username: Option<String>,
    password: Option<String>,
) -> Result<Option<Credentials>> {
    if username.is_none() && password.is_none() {
        return Ok(None);
    }
    let credentials = Credentials::resolve(username, password)
        .context("--username and --password must be given together")?;
    Ok(Some(credentials))
}

fn health(config: &CliConfig) {
    let credentials = if Credentials::from_env().is_ok() {
        "env"
    } else {
        "missing"
    };
    let inference = if config.inference_enabled() {
        config.openai_model.as_deref().unwrap_or("openai")
    } else {
        "disabled"
    };
    println!(
        "harvest {} ready: driver=chromium headless={} credentials={} inference={}",
        env!("CARGO_PKG_VERSION"),
        config.headless,
        credentials,
        inference
    );
}
