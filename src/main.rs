mod auth;
mod cli;
mod logging;
mod progress;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use colored::*;
use cli::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use tracing::{error, info};
use wscleaner_core::archive::DnanexusClient;
use wscleaner_core::config::load_configuration;
use wscleaner_core::manager::{Assessment, Decision};
use wscleaner_core::{AppConfig, LifecycleManager, Outcome, ScanSummary};

fn main() -> ExitCode {
    dotenv().ok();

    let args = Cli::parse();

    let _guard = match logging::init_logger(args.logfile.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error initialising logging: {:#}", err);
            return ExitCode::FAILURE;
        }
    };

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            error!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> anyhow::Result<ExitCode> {
    let mut config =
        load_configuration(args.config.as_deref()).context("Error loading configuration")?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    match args.command.clone().unwrap_or(Commands::Run) {
        Commands::PrintConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { runfolder } => {
            let manager = build_manager(&config, args.auth_token.as_deref())?;
            let assessment = manager.check(&runfolder)?;
            print_assessment(&runfolder, &assessment);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run => {
            let mut manager = build_manager(&config, args.auth_token.as_deref())?;
            if manager.is_dry_run() {
                info!("{}", "DRY RUN: no runfolders will be deleted".yellow());
            }
            let summary = manager.run(&CliReporter::new())?;
            print_summary(&summary);
            if summary.failed_count() > 0 {
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_manager(config: &AppConfig, auth_token: Option<&str>) -> anyhow::Result<LifecycleManager> {
    let token = auth::resolve_token(auth_token, config)?;
    let client = DnanexusClient::new(
        &config.archive.api_url,
        &token,
        config.archive.request_timeout(),
    )
    .context("Failed to build archive client")?;
    let manager = LifecycleManager::new(config, Arc::new(client))?;
    Ok(manager)
}

fn print_assessment(name: &str, assessment: &Assessment) {
    let age = assessment
        .age_days
        .map(|d| format!("{} days", d))
        .unwrap_or_else(|| "unknown".to_string());
    let run_type = assessment
        .run_type
        .as_ref()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "not checked".to_string());

    println!("{}", name.bold());
    println!("  age:      {}", age);
    println!("  run type: {}", run_type);
    match &assessment.decision {
        Decision::Delete => println!("  verdict:  {}", "eligible for deletion".green()),
        Decision::Retain(reason) => {
            println!("  verdict:  {}", "retain".yellow());
            println!("  reason:   {}", reason);
        }
    }
}

fn print_summary(summary: &ScanSummary) {
    println!();
    for report in &summary.reports {
        let state = match &report.outcome {
            Outcome::Deleted => report.outcome.state().red(),
            Outcome::DryRunSkipped => report.outcome.state().cyan(),
            Outcome::Retained(_) => report.outcome.state().yellow(),
            Outcome::DeleteFailed(_) => report.outcome.state().red().bold(),
        };
        let detail = report.outcome.detail();
        if detail.is_empty() {
            println!("  {} {}", state, report.name);
        } else {
            println!("  {} {} ({})", state, report.name, detail);
        }
    }

    info!(
        "{} deleted, {} dry-run, {} retained, {} failed, {} not candidates in {}",
        format!("{}", summary.deleted_count()).red(),
        format!("{}", summary.dry_run_count()).cyan(),
        format!("{}", summary.retained_count()).yellow(),
        format!("{}", summary.failed_count()).red(),
        summary.filtered_out,
        format!("{:.2}s", summary.duration.as_secs_f64()).green(),
    );
}
