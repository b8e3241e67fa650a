//! Analytics Sync CLI
//!
//! Publishes analytics asset files into an in-memory metadata repository and
//! reports what was built.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use analytics_sync::qualified_name::id_from_qualified_name;
use analytics_sync::{
    AnalyticsAsset, BuildReport, CapabilityContext, GraphBuilder, InMemoryRepository, PublishSession,
    SyncConfig,
};

#[derive(Parser)]
#[command(name = "analytics-sync")]
#[command(about = "Publish analytics artifacts as metadata graphs")]
struct Cli {
    /// Configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish asset JSON files (or directories of them) in order
    Publish {
        /// Asset files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Print reports as JSON
        #[arg(long)]
        json: bool,
        /// Abort on failed reference/link edges
        #[arg(long)]
        strict: bool,
    },

    /// Print the compound identifier encoded in a qualified name
    Qname {
        qualified_name: String,
        /// Reference alias to prefix
        #[arg(short, long)]
        alias: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Write it to this file instead of printing
        #[arg(long)]
        init: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = SyncConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Publish { paths, json, strict } => {
            config.build.strict_links |= strict;
            let reports = publish(&config, &paths)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    let marker = if report.is_complete() { "✅" } else { "⚠️ " };
                    println!("{} {}", marker, report.summary());
                    for diagnostic in &report.diagnostics {
                        println!("    {}", diagnostic);
                    }
                    for edge in report.skipped().chain(report.failed()) {
                        println!("    {} from {}: {:?}", edge.relationship_type, edge.source_guid, edge.outcome);
                    }
                }
            }
            Ok(())
        }

        Commands::Qname { qualified_name, alias } => {
            println!("{}", id_from_qualified_name(&qualified_name, alias.as_deref()));
            Ok(())
        }

        Commands::Config { init } => {
            match init {
                Some(path) => {
                    config.save(&path).with_context(|| format!("writing {}", path))?;
                    println!("Wrote {}", path);
                }
                None => print!("{}", toml::to_string_pretty(&config)?),
            }
            Ok(())
        }
    }
}

fn publish(config: &SyncConfig, paths: &[PathBuf]) -> anyhow::Result<Vec<BuildReport>> {
    let options = config.build_options();
    let mut repository = InMemoryRepository::new();
    let capability = CapabilityContext::register(
        &mut repository,
        &options.user,
        &config.capability.qualified_name,
        &config.capability.source,
    )?;

    let mut builder = GraphBuilder::new(&mut repository, &capability, options);
    let mut reports = Vec::new();

    for file in asset_files(paths) {
        let content = fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
        let mut asset: AnalyticsAsset = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", file.display()))?;

        let mut session = PublishSession::new();
        let has_data = !asset.container.is_empty() || !asset.item.is_empty();
        if has_data || asset.visualization.is_empty() {
            let report = builder
                .create_asset(&mut session, &mut asset)
                .with_context(|| format!("publishing {}", file.display()))?;
            reports.push(report);
        }
        if !asset.visualization.is_empty() {
            let report = builder
                .create_visualization_asset(&mut session, &mut asset)
                .with_context(|| format!("publishing visualization of {}", file.display()))?;
            reports.push(report);
        }
    }

    Ok(reports)
}

/// JSON files named directly or found under directories, in sorted order
fn asset_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| p.is_file() && is_json(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn is_json(path: &Path) -> bool {
    path.extension().map(|ext| ext == "json").unwrap_or(false)
}
