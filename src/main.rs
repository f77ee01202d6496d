use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cloudscope::audit::run_audit;
use cloudscope::common::write_string_to_file;
use cloudscope::config::{load_config, sample_config, Config, OutputOptions};
use cloudscope::export;
use cloudscope::exposure;
use cloudscope::snapshot::DirSnapshot;

#[derive(Parser)]
#[command(name = "cloudscope", about = "Audit network reachability in a captured cloud snapshot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the reachability graph for an account and write it out
    Audit(AuditArgs),
    /// Print the resources reachable from the public Internet
    Public(AuditArgs),
    /// Write a starter configuration file
    Init {
        #[clap(short, long, default_value = "cloudscope.yaml")]
        config: String,
    },
}

#[derive(Args)]
struct AuditArgs {
    /// Account name inside the snapshot directory
    #[clap(short, long)]
    account: String,

    /// Snapshot root directory
    #[clap(short, long, default_value = "snapshot")]
    snapshot: String,

    #[clap(short, long, default_value = "cloudscope.yaml")]
    config: String,

    #[clap(short, long, default_value = "graph.json")]
    output: String,

    /// Output format: json or dot
    #[clap(long, default_value = "json")]
    format: String,

    /// Keep only Internet-origin edges
    #[clap(long)]
    no_internal_edges: bool,

    /// Include database-to-database edges
    #[clap(long)]
    inter_rds_edges: bool,

    /// Hide the availability-zone hierarchy level
    #[clap(long)]
    no_azs: bool,

    /// Merge leaves sharing this tag's value into one node
    #[clap(long)]
    collapse_by_tag: Option<String>,

    /// Leave raw resource attributes out of the output
    #[clap(long)]
    no_node_data: bool,
}

impl AuditArgs {
    fn options(&self) -> OutputOptions {
        OutputOptions {
            internal_edges: !self.no_internal_edges,
            inter_rds_edges: self.inter_rds_edges,
            show_azs: !self.no_azs,
            collapse_by_tag: self.collapse_by_tag.clone(),
            node_data: !self.no_node_data,
        }
    }

    fn load_config(&self) -> Result<Config> {
        match std::fs::read_to_string(&self.config) {
            Ok(content) => {
                load_config(&content).with_context(|| format!("parsing {}", self.config))
            }
            Err(_) => {
                info!("No configuration at {}, using defaults", self.config);
                Ok(Config::default())
            }
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Audit(args) => {
            let config = args.load_config()?;
            let snapshot = DirSnapshot::new(&args.snapshot);
            let result = run_audit(&snapshot, &args.account, &config, &args.options())?;

            let output = match args.format.as_str() {
                "json" => export::to_json::render(&result.graph)
                    .map_err(|e| anyhow::anyhow!("{}", e))?,
                "dot" => export::to_dot::render(&result.graph)
                    .map_err(|e| anyhow::anyhow!("{}", e))?,
                other => bail!("Unsupported format: {} - use json or dot", other),
            };
            write_string_to_file(&args.output, &output)?;
            info!("Wrote {}", args.output);
            Ok(())
        }
        Command::Public(args) => {
            let config = args.load_config()?;
            let snapshot = DirSnapshot::new(&args.snapshot);
            let result = run_audit(&snapshot, &args.account, &config, &args.options())?;
            let entries = exposure::summarize(&result.graph)?;

            if entries.is_empty() {
                println!("{}", "No resources reachable from the public Internet".green());
                return Ok(());
            }
            for entry in entries {
                let hostname = entry.hostname.as_deref().unwrap_or("-");
                println!(
                    "{}  {}  {}  {}",
                    entry.kind.cyan(),
                    entry.name.bold(),
                    hostname,
                    entry.ports.red()
                );
            }
            Ok(())
        }
        Command::Init { config } => {
            write_string_to_file(&config, sample_config())?;
            info!("Wrote starter configuration to {}", config);
            Ok(())
        }
    }
}
