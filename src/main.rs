use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use treelock::batch::Batch;
use treelock::cli::{Cli, Commands};
use treelock::config::Config;
use treelock::json_output::JsonOutput;
use treelock::logging::init_logging;
use treelock::serve::serve_lines;
use treelock::TreeLockService;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    init_logging(&config.monitoring.log_level);

    match cli.command {
        Commands::Run { input } => cmd_run(input.as_deref(), cli.json),
        Commands::Serve { metrics, audit } => cmd_serve(&config, metrics, audit.as_deref(), cli.json),
        Commands::Tree => cmd_tree(&config, cli.json),
        Commands::Config { preset } => cmd_config(config, preset.as_deref()),
    }
}

fn cmd_run(input: Option<&Path>, json: bool) -> Result<()> {
    let text = match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read batch file {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
            buf
        }
    };

    let batch = Batch::parse(&text)?;
    log::info!(
        "Running {} queries against {} nodes (branching factor {})",
        batch.queries.len(),
        batch.names.len(),
        batch.branching
    );

    for outcome in batch.run()? {
        if json {
            println!("{}", serde_json::json!({ "success": outcome }));
        } else {
            println!("{}", outcome);
        }
    }
    Ok(())
}

fn cmd_serve(config: &Config, print_metrics: bool, audit: Option<&Path>, json: bool) -> Result<()> {
    let service = TreeLockService::from_config(config)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let answered = serve_lines(&service, stdin.lock(), stdout.lock())?;
    log::info!("Input closed after {} requests", answered);

    if let Some(path) = audit {
        if !config.monitoring.enable_audit {
            log::warn!("Audit trail is disabled in the configuration; {} will be empty", path.display());
        }
        fs::write(path, service.export_audit())
            .with_context(|| format!("Failed to write audit trail to {}", path.display()))?;
    }

    if print_metrics && service.metrics().is_enabled() {
        let snapshot = service.metrics().snapshot();
        if json {
            eprintln!("{}", JsonOutput::metrics(&snapshot));
        } else {
            eprint!("{}", snapshot.to_prometheus());
        }
    }
    Ok(())
}

fn cmd_tree(config: &Config, json: bool) -> Result<()> {
    let service = TreeLockService::from_config(config)?;
    let snapshot = service.snapshot();

    if json {
        println!("{}", JsonOutput::tree(&snapshot));
    } else {
        print!("{}", snapshot.render_text());
    }
    Ok(())
}

fn cmd_config(config: Config, preset: Option<&str>) -> Result<()> {
    let config = match preset {
        Some(name) => Config::from_preset(name)?,
        None => config,
    };
    println!("{}", config.to_json());
    Ok(())
}
