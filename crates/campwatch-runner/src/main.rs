use anyhow::Result;
use campwatch_notify::plugin::ChannelRegistry;
use campwatch_runner::config::RunnerConfig;
use campwatch_runner::cycle::{self, CycleContext};
use chrono::Utc;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config/runner.toml";

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  campwatch-runner [config.toml]                   Run the polling loop");
    eprintln!("  campwatch-runner once [config.toml]              Run a single cycle");
    eprintln!("  campwatch-runner check-rules [config.toml]       Compile rules against the current snapshot");
    eprintln!("  campwatch-runner sync-exclusions [config.toml]   Add blank exclusion rows for new entities");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("campwatch=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("once") => run_once(config_arg(&args, 2)).await,
        Some("check-rules") => run_check_rules(config_arg(&args, 2)),
        Some("sync-exclusions") => run_sync_exclusions(config_arg(&args, 2)),
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => run_loop(config_arg(&args, 1)).await,
    }
}

fn config_arg(args: &[String], idx: usize) -> &str {
    args.get(idx).map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH)
}

fn load_context(config_path: &str) -> Result<(RunnerConfig, CycleContext)> {
    let config = RunnerConfig::load(config_path)?;
    let ctx = CycleContext::from_config(&config, &ChannelRegistry::default())?;
    Ok((config, ctx))
}

async fn run_once(config_path: &str) -> Result<()> {
    let (_, ctx) = load_context(config_path)?;
    let report = cycle::run_cycle(&ctx, Utc::now()).await?;
    tracing::info!(
        sent = report.sent.len(),
        suppressed = report.suppressed,
        failed_deliveries = report.delivery.failed,
        "Single cycle completed"
    );
    Ok(())
}

fn run_check_rules(config_path: &str) -> Result<()> {
    let (_, ctx) = load_context(config_path)?;
    let check = cycle::check_rules(&ctx)?;
    for err in &check.errors {
        tracing::error!(rule = err.rule(), error = %err, "Rule check failed");
    }
    tracing::info!(
        rules = check.rules,
        rows = check.rows,
        broken = check.errors.len(),
        firing = check.candidates,
        "check-rules completed"
    );
    if !check.errors.is_empty() {
        anyhow::bail!("{} of {} rules failed to compile", check.errors.len(), check.rules);
    }
    Ok(())
}

fn run_sync_exclusions(config_path: &str) -> Result<()> {
    let config = RunnerConfig::load(config_path)?;
    let added = cycle::sync_exclusions(&cycle::dir_source(&config), &config.entity_column)?;
    tracing::info!(added, "sync-exclusions completed");
    Ok(())
}

async fn run_loop(config_path: &str) -> Result<()> {
    let (config, ctx) = load_context(config_path)?;
    tracing::info!(
        interval_secs = config.poll_interval_secs,
        cool_down_secs = config.cool_down_secs,
        data_dir = %config.data_dir,
        channels = ctx.notifier.channels().len(),
        "campwatch-runner starting"
    );

    let mut tick = interval(Duration::from_secs(config.poll_interval_secs));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                match cycle::run_cycle(&ctx, Utc::now()).await {
                    Ok(report) => {
                        tracing::debug!(
                            sent = report.sent.len(),
                            delivered = report.delivery.delivered,
                            failed = report.delivery.failed,
                            "Cycle finished"
                        );
                    }
                    Err(e) if cycle::is_log_corruption(&e) => {
                        tracing::error!(error = %format!("{e:#}"), "Alert log is corrupt, halting");
                        return Err(e);
                    }
                    Err(e) => tracing::error!(error = %format!("{e:#}"), "Cycle failed"),
                }
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Shutting down gracefully");
                break;
            }
        }
    }

    Ok(())
}
