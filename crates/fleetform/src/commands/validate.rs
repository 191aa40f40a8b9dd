use colored::Colorize;
use fleetform_cloud_local::registry;
use fleetform_config::Manifest;
use fleetform_core::{DependencyGraph, describe};
use std::path::Path;

/// Builds the task graph without touching the cloud
pub fn handle(manifest_path: &Path, manifest: &Manifest) -> bool {
    println!("{}", "Validating manifest...".blue());
    println!("Manifest: {}", manifest_path.display().to_string().cyan());

    let result = manifest
        .tasks(&registry())
        .map_err(|e| e.to_string())
        .and_then(|tasks| {
            DependencyGraph::build(&tasks)
                .map(|graph| (tasks, graph))
                .map_err(|e| e.to_string())
        });
    let (tasks, graph) = match result {
        Ok(built) => built,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Invalid manifest".red().bold());
            eprintln!("  {}", e);
            return false;
        }
    };

    println!("{}", "✓ Manifest is valid".green().bold());
    println!();
    println!("Execution order:");
    for (i, stage) in graph.stages().iter().enumerate() {
        println!("  {}", format!("Stage {}", i + 1).bold());
        for &node in stage {
            let task = &tasks[node];
            println!(
                "    - {} {}",
                describe(task.as_ref()),
                format!("({})", task.lifecycle()).dimmed()
            );
        }
    }
    true
}
