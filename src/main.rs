use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use facetprobe::cases::load_cases;
use facetprobe::cdp::CdpSessionFactory;
use facetprobe::report::{DirArtifactStore, LogReportSink};
use facetprobe::suite::Suite;
use facetprobe::ProbeConfig;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "facetprobe", version, about = "Verify faceted product search on a live listing page")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a set of test cases
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// JSON array of test cases
    #[arg(long, env = "FACETPROBE_CASES")]
    cases: PathBuf,

    /// JSON settings file; flags below override it
    #[arg(long, env = "FACETPROBE_SETTINGS")]
    settings: Option<PathBuf>,

    #[arg(long, env = "FACETPROBE_URL")]
    url: Option<String>,

    #[arg(long, env = "FACETPROBE_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    #[arg(long, env = "FACETPROBE_MAX_RETRIES")]
    max_retries: Option<u32>,

    #[arg(long, env = "FACETPROBE_CASE_RETRIES")]
    case_retries: Option<u32>,

    #[arg(long, env = "FACETPROBE_PARALLELISM")]
    parallelism: Option<usize>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Directory for failure screenshots
    #[arg(long, env = "FACETPROBE_ARTIFACTS")]
    artifacts: Option<PathBuf>,
}

impl RunArgs {
    fn config(&self) -> facetprobe::Result<ProbeConfig> {
        let mut config = match &self.settings {
            Some(path) => ProbeConfig::from_file(path)?,
            None => ProbeConfig::default(),
        };
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(case_retries) = self.case_retries {
            config.case_retries = case_retries;
        }
        if let Some(parallelism) = self.parallelism {
            config.parallelism = parallelism;
        }
        if self.headful {
            config.headless = false;
        }
        if self.artifacts.is_some() {
            config.artifacts_dir = self.artifacts.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

async fn run(args: RunArgs) -> facetprobe::Result<bool> {
    let config = args.config()?;
    let cases = load_cases(&args.cases)?;
    log::info!("loaded {} cases from {}", cases.len(), args.cases.display());

    let artifacts = config.artifacts_dir.clone();
    let mut suite = Suite::new(CdpSessionFactory, config, Arc::new(LogReportSink));
    if let Some(dir) = artifacts {
        suite = suite.with_artifacts(Arc::new(DirArtifactStore::new(dir)));
    }

    let verdicts = suite.run(cases).await;
    let summary = serde_json::to_string_pretty(&verdicts)
        .map_err(|e| facetprobe::Error::Other(format!("Failed to serialize summary: {}", e)))?;
    println!("{}", summary);

    Ok(verdicts.iter().all(|v| v.passed))
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run(args) => run(args).await,
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("facetprobe: {}", e);
            std::process::exit(2);
        }
    }
}
