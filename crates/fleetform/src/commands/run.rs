//! `fleetform plan` / `fleetform apply`

use crate::RunArgs;
use crate::output;
use colored::Colorize;
use fleetform_cloud_local::{LocalCloud, registry};
use fleetform_config::Manifest;
use fleetform_core::{Executor, Mode};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Runs the manifest's tasks; returns whether every task converged
pub async fn handle(
    manifest_path: &Path,
    manifest: &Manifest,
    args: &RunArgs,
    mode: Mode,
) -> anyhow::Result<bool> {
    let overrides: BTreeMap<_, _> = args.lifecycle_overrides.iter().cloned().collect();
    let tasks = manifest.tasks_with_overrides(&registry(), &overrides)?;

    let mut options = manifest.settings.executor_options();
    if let Some(concurrency) = args.concurrency {
        options = options.with_max_concurrency(concurrency);
    }
    if let Some(secs) = args.deadline {
        options = options.with_deadline(Duration::from_secs(secs));
    }

    let state_path = manifest.settings.state_path(manifest_path);
    tracing::debug!("Using state file {}", state_path.display());
    let cloud = LocalCloud::open(&state_path).await?;

    let executor = Executor::new(options);
    let token = executor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "Interrupted: waiting for running tasks, no new ones will start".yellow()
            );
            token.cancel();
        }
    });

    if !args.json {
        let verb = match mode {
            Mode::DryRun => "Planning",
            Mode::Apply => "Applying",
        };
        println!(
            "{} {} task(s) from {}",
            verb.blue(),
            tasks.len(),
            manifest_path.display().to_string().cyan()
        );
        println!();
    }

    let report = executor.run(cloud, tasks, mode).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_report(&report);
    }
    Ok(report.is_success())
}
