use std::io::{BufRead, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use dialoguer::Confirm;
use intentshell_channel::{InterpreterChannel, ScriptTransport};
use intentshell_core::pipeline::dry_run;
use intentshell_core::{AuditLogger, Config, IntentCache, SafetyPipeline, explain};
use intentshell_sentinel::{RiskLevel, RiskSuspensionEngine};

#[derive(Parser)]
#[command(name = "intentshell")]
#[command(about = "Natural-language shell with a risk-gated execution pipeline")]
#[command(version)]
struct Cli {
    /// Configuration file (falls back to INTENTSHELL_CONFIG, then config/default.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show what would run without executing anything
    #[arg(long)]
    dry_run: bool,

    /// Always resolve through the collaborator, ignoring cached intents
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)?;
    config.validate()?;

    let working_dir = match &config.channel.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to read working directory")?,
    };

    let channel = InterpreterChannel::start(config.channel.clone())
        .await
        .context("failed to start interpreter")?;
    let engine = RiskSuspensionEngine::new(config.suspension.clone(), working_dir);
    let cache = IntentCache::open(&config.cache);
    let mut pipeline = SafetyPipeline::new(channel, engine, cache).with_commands(&config.kernel);
    if config.audit.enabled {
        let logger = AuditLogger::from_config(&config.audit)
            .await
            .context("failed to open audit log")?;
        pipeline = pipeline.with_audit(logger);
    }

    tracing::info!(
        config = %config_path.display(),
        dialect = %config.channel.dialect,
        dry_run = cli.dry_run,
        "intentshell ready"
    );

    let result = run(&mut pipeline, &cli).await;
    pipeline.into_transport().close().await;
    result
}

async fn run<T: ScriptTransport>(pipeline: &mut SafetyPipeline<T>, cli: &Cli) -> anyhow::Result<()> {
    loop {
        let Some(line) = read_input(|| std::io::stdin().lock(), "intentshell> ").await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "reset" => {
                pipeline.engine_mut().reset();
                println!("Session risk reset.");
                continue;
            }
            _ => {}
        }

        let outcome = pipeline.process(input, cli.no_cache).await;
        println!("{}", explain(&outcome.intent, Some(&outcome.assessment)));
        if outcome.intent.is_failure() {
            continue;
        }
        println!("Command: {}", outcome.command);
        println!(
            "Risk: {} (score {:.1})",
            outcome.assessment.level, outcome.assessment.score
        );

        if cli.dry_run {
            println!("{}", dry_run(&outcome.command, &outcome.intent.description));
            continue;
        }
        if outcome.assessment.level >= RiskLevel::Medium
            && !confirm(format!("Execute this {} risk command?", outcome.assessment.level)).await
        {
            println!("Cancelled.");
            continue;
        }

        let report = pipeline.execute(&outcome.command, &outcome.intent, true).await;
        if !report.output.is_empty() {
            println!("{}", report.output);
        }
        if report.success {
            println!("SUCCESS");
            pipeline.remember_success(input, &outcome.intent);
        } else {
            println!("FAILED");
        }
    }
    Ok(())
}

/// Read one line off the runtime threads. `None` on end of input.
async fn read_input<F, R>(open: F, prompt: &'static str) -> anyhow::Result<Option<String>>
where
    F: FnOnce() -> R + Send + 'static,
    R: BufRead,
{
    tokio::task::spawn_blocking(move || -> std::io::Result<Option<String>> {
        print!("{prompt}");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if open().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    })
    .await
    .context("input task failed")?
    .context("failed to read input")
}

async fn confirm(prompt: String) -> bool {
    let result = tokio::task::spawn_blocking(move || {
        Confirm::new().with_prompt(prompt).default(false).interact()
    })
    .await;
    match result {
        Ok(Ok(answer)) => answer,
        Ok(Err(e)) => {
            tracing::warn!("confirmation unavailable, treating as declined: {e}");
            false
        }
        Err(e) => {
            tracing::warn!("confirmation task failed, treating as declined: {e}");
            false
        }
    }
}

fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("INTENTSHELL_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
