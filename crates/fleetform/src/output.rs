//! Terminal rendering of run reports

use colored::Colorize;
use fleetform_core::{ActionType, FailureKind, Mode, RunReport, TaskOutcome, TaskState};

pub fn print_report(report: &RunReport) {
    for outcome in &report.outcomes {
        print_outcome(outcome, report.mode);
    }

    let summary = report.summary();
    println!();
    let title = match report.mode {
        Mode::DryRun => "Plan:",
        Mode::Apply => "Apply complete:",
    };
    if report.is_success() {
        println!("{} {}", title.green().bold(), summary);
    } else {
        println!("{} {}", "Run failed:".red().bold(), summary);
    }
    if report.cancelled {
        println!(
            "{}",
            "The run was cancelled; tasks that had not started were not attempted".yellow()
        );
    }
}

fn print_outcome(outcome: &TaskOutcome, mode: Mode) {
    let key = outcome.key.to_string();
    match outcome.state {
        TaskState::Succeeded if outcome.changed => {
            let (marker, verb) = match (outcome.action, mode) {
                (ActionType::Create, Mode::DryRun) => ("+".green(), "will be created"),
                (ActionType::Create, Mode::Apply) => ("+".green(), "created"),
                (_, Mode::DryRun) => ("~".yellow(), "will be updated"),
                (_, Mode::Apply) => ("~".yellow(), "updated"),
            };
            println!("  {} {} {}", marker, key.bold(), verb.dimmed());
            print_diff(outcome);
        }
        TaskState::Succeeded | TaskState::Skipped if outcome.warnings.is_empty() => {
            println!("  {} {} {}", "=".dimmed(), key, "unchanged".dimmed());
        }
        TaskState::Succeeded | TaskState::Skipped => {
            println!("  {} {}", "!".yellow().bold(), key.bold());
            print_diff(outcome);
            for warning in &outcome.warnings {
                println!("      {} {}", "warning:".yellow(), warning);
            }
        }
        TaskState::Failed => {
            let error = outcome.error.as_deref().unwrap_or("unknown error");
            match &outcome.failure {
                Some(FailureKind::Blocked { by }) => println!(
                    "  {} {} {}",
                    "-".dimmed(),
                    key.dimmed(),
                    format!("(not attempted, {} failed)", by).dimmed()
                ),
                Some(FailureKind::Cancelled) => println!(
                    "  {} {} {}",
                    "-".dimmed(),
                    key.dimmed(),
                    "(cancelled)".dimmed()
                ),
                _ => {
                    println!("  {} {}", "✗".red().bold(), key.bold());
                    print_diff(outcome);
                    println!("      {} {}", "error:".red(), error);
                }
            }
        }
        TaskState::Pending | TaskState::Running => {
            println!("  {} {} {}", "?".dimmed(), key, outcome.state);
        }
    }
}

fn print_diff(outcome: &TaskOutcome) {
    if let Some(diff) = &outcome.diff {
        for line in diff.lines() {
            println!("    {}", line.dimmed());
        }
    }
}
