use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use apkflow_core::app::{OrchestratorBuilder, Settings};
use apkflow_core::domain::{JobRequest, StatusKind, TaskKind};

#[derive(Debug, Parser)]
#[command(name = "apkflow", version, about = "Run APK analysis jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one job to completion and print its snapshot as JSON.
    Run(RunArgs),
    /// Load the settings and report which tasks can run.
    Check {
        #[arg(long, short)]
        config: PathBuf,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, short)]
    config: PathBuf,

    /// Job request JSON, as posted by the web front end.
    #[arg(long, conflicts_with_all = ["apk", "task"])]
    request: Option<PathBuf>,

    #[arg(long, required_unless_present = "request")]
    apk: Option<PathBuf>,

    /// Task name (xbot, owleye, tappable, gifdroid). Repeatable.
    #[arg(long = "task", required_unless_present = "request")]
    task: Vec<String>,

    /// Supplementary file as `<task>=<path>`, e.g. `gifdroid=run.gif`.
    #[arg(long, value_parser = parse_supplementary)]
    supplementary: Vec<(String, PathBuf)>,

    /// Job id; generated when absent.
    #[arg(long)]
    uuid: Option<String>,
}

fn parse_supplementary(raw: &str) -> Result<(String, PathBuf), String> {
    let (task, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <task>=<path>, got {raw}"))?;
    if task.is_empty() || path.is_empty() {
        return Err(format!("expected <task>=<path>, got {raw}"));
    }
    Ok((task.to_string(), PathBuf::from(path)))
}

impl RunArgs {
    fn job_request(&self) -> Result<JobRequest> {
        if let Some(path) = &self.request {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read job request {}", path.display()))?;
            let mut request: JobRequest = serde_json::from_str(&text)
                .with_context(|| format!("parse job request {}", path.display()))?;
            request.additional_files.extend(self.supplementary.iter().cloned());
            if self.uuid.is_some() {
                request.uuid = self.uuid.clone();
            }
            return Ok(request);
        }

        let Some(apk) = &self.apk else {
            bail!("either --request or --apk is required");
        };
        Ok(JobRequest {
            uuid: self.uuid.clone(),
            algorithms: self.task.clone(),
            apk_file: apk.clone(),
            additional_files: self
                .supplementary
                .iter()
                .cloned()
                .collect::<BTreeMap<_, _>>(),
        })
    }
}

async fn run(args: RunArgs) -> Result<()> {
    // (A) 設定を読み、オーケストレータを組み立てる
    let settings = Settings::load(&args.config)
        .with_context(|| format!("load settings {}", args.config.display()))?;
    tracing::info!(
        config = %args.config.display(),
        work_root = %settings.work_root.display(),
        emulators = settings.emulators.len(),
        "settings loaded"
    );
    let orchestrator =
        OrchestratorBuilder::from_settings(&settings, reqwest_client()?)?.build()?;

    // (B) ジョブを作成して起動
    // 配送は同期的なので、戻った時点でジョブは終わっている
    let job = orchestrator.create_job(args.job_request()?).await?;
    job.start_processing().await?;

    // (C) スナップショットを出力
    let snapshot = job.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    match snapshot.status {
        Some(StatusKind::Successful) => Ok(()),
        Some(status) => bail!("job {} finished {}", snapshot.job_id, status.as_str()),
        None => bail!("job {} did not finish", snapshot.job_id),
    }
}

fn check(config: PathBuf) -> Result<()> {
    let settings = Settings::load(&config)
        .with_context(|| format!("load settings {}", config.display()))?;
    let algorithms = settings.algorithms()?;
    OrchestratorBuilder::from_settings(&settings, reqwest_client()?)?.build()?;

    for kind in TaskKind::ALL {
        let configured = algorithms.contains_key(&kind);
        let runnable = configured && (!kind.needs_emulator() || !settings.emulators.is_empty());
        println!(
            "{:<10} {}",
            kind.wire_name(),
            match (configured, runnable) {
                (false, _) => "no backend",
                (true, false) => "needs an emulator",
                (true, true) => "ok",
            }
        );
    }
    Ok(())
}

fn reqwest_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .context("build HTTP client")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apkflow=info,apkflow_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Command::Run(args) => run(args).await,
        Command::Check { config } => check(config),
    }
}
