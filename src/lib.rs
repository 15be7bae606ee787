// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod guard;
pub mod logging;
pub mod matcher;
pub mod types;
pub mod walk;
pub mod watch;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{config_base_dir, default_config_path, load_and_validate};
use crate::exec::ProcessRunner;
use crate::guard::{Guard, GuardConfig, GuardHandle};
use crate::matcher::default_patterns;

pub use crate::errors::{GuardError, Result as GuardResult};
pub use crate::guard::guard;
pub use crate::matcher::{Matcher, MatchResult, IGNORE_HIDDEN, IGNORE_VCS};

/// One guard as resolved from flags or a guard file.
#[derive(Debug, Clone)]
struct GuardPlan {
    args: Vec<String>,
    patterns: Vec<String>,
    config: GuardConfig,
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - guard resolution (flags or `--config`)
/// - one shared process runner (output sink + raw-terminal lock)
/// - every guard's watcher and event loop
/// - Ctrl-C handling
pub async fn run(invocations: Vec<CliArgs>) -> Result<()> {
    let plans = resolve_plans(&invocations)?;
    let dry_run = invocations.iter().any(|inv| inv.dry_run);

    if dry_run {
        print_dry_run(&plans)?;
        return Ok(());
    }

    let runner = ProcessRunner::new();
    let mut handles: Vec<GuardHandle> = Vec::with_capacity(plans.len());

    for plan in plans {
        let started = Guard::new(plan.args.clone(), plan.patterns, plan.config)
            .with_runner(runner.clone())
            .start()
            .await
            .with_context(|| format!("starting guard for {:?}", plan.args));
        match started {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                stop_all(handles).await;
                return Err(err);
            }
        }
    }

    info!(guards = handles.len(), "all guards running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl-C")?;

    info!("Ctrl-C received; stopping guards");
    stop_all(handles).await;
    Ok(())
}

async fn stop_all(mut handles: Vec<GuardHandle>) {
    for handle in handles.iter_mut() {
        handle.stop();
    }
    for handle in handles {
        if let Err(err) = handle.wait().await {
            tracing::warn!(error = %err, "guard ended with an error");
        }
    }
}

fn resolve_plans(invocations: &[CliArgs]) -> Result<Vec<GuardPlan>> {
    let Some(first) = invocations.first() else {
        bail!("no guard given");
    };

    // Without a command on the line, fall back to ./Kitguard.toml.
    let fallback = default_config_path();
    let config_path = match &first.config {
        Some(path) => Some(path.as_path()),
        None if first.cmd.is_empty() && invocations.len() == 1 && fallback.is_file() => {
            Some(fallback.as_path())
        }
        None => None,
    };

    if let Some(path) = config_path {
        debug!(path = ?path, "loading guard file");
        let file = load_and_validate(path)
            .with_context(|| format!("loading guard file {}", path.display()))?;
        let base = config_base_dir(path);
        return Ok(file
            .guards()
            .iter()
            .map(|spec| GuardPlan {
                args: spec.cmd.clone(),
                patterns: spec.patterns.clone(),
                config: spec.guard_config(&base),
            })
            .collect());
    }

    invocations
        .iter()
        .enumerate()
        .map(|(idx, inv)| {
            if inv.cmd.is_empty() {
                bail!("guard #{} has no command; pass it after `--`", idx + 1);
            }
            Ok(GuardPlan {
                args: inv.cmd.clone(),
                patterns: inv.patterns.clone(),
                config: inv.guard_config(),
            })
        })
        .collect()
}

/// Simple dry-run output: every guard, its options and the paths it matches.
fn print_dry_run(plans: &[GuardPlan]) -> Result<()> {
    println!("kitguard dry-run");
    println!();

    for (idx, plan) in plans.iter().enumerate() {
        let patterns = if plan.patterns.is_empty() {
            default_patterns()
        } else {
            plan.patterns.clone()
        };

        println!("guard #{}:", idx + 1);
        println!("    cmd: {:?}", plan.args);
        println!("    dir: {}", plan.config.dir.display());
        println!("    patterns: {:?}", patterns);
        println!(
            "    debounce: {:?}, poll: {:?}, watcher: {:?}",
            plan.config.debounce, plan.config.poll_interval, plan.config.watcher
        );
        if plan.config.no_init_run {
            println!("    no_init_run: true");
        }
        if plan.config.raw {
            println!("    raw: true");
        }

        let paths = walk::list(&plan.config.dir, &patterns)
            .with_context(|| format!("matching patterns for guard #{}", idx + 1))?;
        println!("    matches ({}):", paths.len());
        for path in paths {
            println!("      - {}", path.display());
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
