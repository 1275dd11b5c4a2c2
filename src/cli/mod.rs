//! CLI command handling
//!
//! Dispatches CLI commands to the suites and formats output.

use std::io;
use std::path::Path;

use colored::Colorize;
use tracing::info;

use crate::commands::Commands;
use crate::common::{Config, Result};
use crate::suites::{self, cases::CaseTable, cases::CaseTableRun, PlannedTest, SuiteContext};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config_path: Option<&Path>) -> Result<()> {
    match command {
        Commands::Run { suites, only, .. } => {
            // Resolve the selection before touching the network
            let tests = suites::select_tests(&suites, &only)?;
            let config = Config::load(config_path)?;
            info!(
                endpoint = %config.endpoint_url(),
                tests = tests.len(),
                "starting conformance run"
            );

            let ctx = SuiteContext::connect(config).await?;
            let planned: Vec<PlannedTest> = tests.iter().map(|t| t.plan()).collect();
            let mut stdout = io::stdout();
            let summary = suites::run_all(&ctx, &planned, &mut stdout).await?;

            info!(
                passed = summary.passed,
                not_applicable = summary.not_applicable,
                "run complete"
            );
            Ok(())
        }

        Commands::List { json } => list_tests(json),

        Commands::Cases { path } => {
            let table = CaseTable::load(&path)?;
            let config = Config::load(config_path)?;
            info!(
                table = %table.name,
                description = table.description.as_deref().unwrap_or(""),
                cases = table.cases.len(),
                endpoint = %config.endpoint_url(),
                "running case table"
            );

            let ctx = SuiteContext::connect(config).await?;
            let run = CaseTableRun::new(&ctx, table);
            let mut stdout = io::stdout();
            run.run(&mut stdout).await?;
            Ok(())
        }
    }
}

fn list_tests(json: bool) -> Result<()> {
    let tests = suites::all_tests();

    if json {
        let entries: Vec<_> = tests
            .iter()
            .map(|t| {
                serde_json::json!({
                    "suite": t.suite.as_str(),
                    "name": t.name,
                    "function": t.api.to_string(),
                    "description": t.description,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let mut current = None;
    for test in tests {
        if current != Some(test.suite) {
            println!("{}", test.suite.as_str().blue().bold());
            current = Some(test.suite);
        }
        println!(
            "  {:32} {}",
            test.name,
            test.api.to_string().dimmed()
        );
        println!("  {:32} {}", "", test.description);
    }
    Ok(())
}
