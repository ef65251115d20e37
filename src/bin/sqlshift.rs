//! sqlshift migration CLI
//!
//! # Usage
//!
//! ```bash
//! # Show what `up` would do
//! sqlshift plan
//!
//! # Apply everything
//! sqlshift up --database-url postgres://localhost/app
//!
//! # Roll back the last migration
//! sqlshift down
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use sqlshift::migrator::latest_version;
use sqlshift::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlshift")]
#[command(version)]
#[command(about = "Versioned SQL migrations: plan, apply, roll back", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqlshift new add_users
    sqlshift plan 3 --format json
    sqlshift up --database-url sqlite://app.db
    sqlshift down --steps 2")]
struct Cli {
    /// Config file (default: ./sqlshift.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database connection URL
    #[arg(long, env = "SQLSHIFT_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Migrations directory
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// Bookkeeping table name
    #[arg(long, global = true)]
    table: Option<String>,

    /// Run statement and bookkeeping without a wrapping transaction
    #[arg(long, global = true)]
    no_transaction: bool,

    /// Abort after this many seconds; the in-flight migration is rolled back
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the highest applied version
    Current,
    /// Print the highest available version
    Latest,
    /// Show applied, pending and unknown versions
    Status {
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Show the actions needed to reach a version, without running them
    Plan {
        /// Target version (default: latest)
        target: Option<Version>,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Apply migrations up to a version (default: latest)
    Up { target: Option<Version> },
    /// Roll back to a version (default: one step back)
    Down {
        target: Option<Version>,
        /// Number of applied migrations to revert when no target is given
        #[arg(short, long, default_value_t = 1, conflicts_with = "target")]
        steps: usize,
    },
    /// Move to exactly this version, up or down
    To { target: Version },
    /// Create a new migration file
    New {
        /// Label used in the file name (letters, digits, '_')
        label: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "sqlshift=debug" } else { "sqlshift=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(url) = &cli.database_url {
        config.database.url = Some(url.clone());
    }
    if let Some(dir) = &cli.dir {
        config.migrations.dir = dir.clone();
    }
    if let Some(table) = &cli.table {
        config.database.table = table.clone();
    }
    if cli.no_transaction {
        config.database.transactional = false;
    }
    if let Some(secs) = cli.timeout {
        config.migrations.timeout_secs = Some(secs);
    }

    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let source = config.source();

    if cli.verbose {
        println!("{} {}", "Migrations:".dimmed(), source.dir().display());
    }

    match cli.command {
        Commands::Latest => {
            println!("{}", latest_version(&source).await?);
        }
        Commands::New { label } => {
            let path = source.create(&label).await?;
            println!("{} Created {}", "✓".green(), path.display().to_string().cyan());
        }
        Commands::Current => {
            let mut migrator = open(&config, source).await?;
            println!("{}", migrator.current_version().await?);
        }
        Commands::Status { format } => {
            let mut migrator = open(&config, source).await?;
            let status = migrator.status().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Text => print_status(&status),
            }
        }
        Commands::Plan { target, format } => {
            let mut migrator = open(&config, source).await?;
            let target = match target {
                Some(v) => v,
                None => migrator.latest_version().await?,
            };
            let plan = migrator.plan(target).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
                OutputFormat::Text => print_plan(&plan),
            }
        }
        Commands::Up { target } => {
            let mut migrator = open(&config, source).await?;
            let target = match target {
                Some(v) => v,
                None => migrator.latest_version().await?,
            };
            let plan = migrator.plan(target).await?;
            if plan.direction == Some(Direction::Down) {
                bail!(
                    "target {} is below current version {}; use `sqlshift down {}`",
                    target,
                    plan.current,
                    target
                );
            }
            execute(&mut migrator, &plan, config.timeout()).await?;
        }
        Commands::Down { target, steps } => {
            let mut migrator = open(&config, source).await?;
            let target = match target {
                Some(v) => v,
                None => down_target(&migrator.applied_versions().await?, steps),
            };
            let plan = migrator.plan(target).await?;
            if plan.direction == Some(Direction::Up) {
                bail!(
                    "target {} is above current version {}; use `sqlshift up {}`",
                    target,
                    plan.current,
                    target
                );
            }
            execute(&mut migrator, &plan, config.timeout()).await?;
        }
        Commands::To { target } => {
            let mut migrator = open(&config, source).await?;
            let plan = migrator.plan(target).await?;
            execute(&mut migrator, &plan, config.timeout()).await?;
        }
    }

    Ok(())
}

/// Connect the configured store. Only commands that touch the database call this.
async fn open(config: &Config, source: FileSource) -> Result<Migrator<FileSource, SqlStore>> {
    let store = config.connect().await?;
    Ok(Migrator::new(source, store))
}

/// Version left in place after reverting the `steps` highest applied versions.
fn down_target(applied: &[Version], steps: usize) -> Version {
    let mut sorted = applied.to_vec();
    sorted.sort_unstable();
    let keep = sorted.len().saturating_sub(steps);
    if keep == 0 { 0 } else { sorted[keep - 1] }
}

async fn execute(
    migrator: &mut Migrator<FileSource, SqlStore>,
    plan: &Plan,
    timeout: Option<Duration>,
) -> Result<()> {
    print_plan(plan);
    if plan.is_empty() {
        return Ok(());
    }

    let atomicity = migrator.store().atomicity();
    let report = match timeout {
        Some(limit) => tokio::time::timeout(limit, migrator.apply(plan))
            .await
            .map_err(|_| timeout_error(limit, atomicity))??,
        None => migrator.apply(plan).await?,
    };

    println!();
    println!(
        "{} {} migration(s) {} in {} ms",
        "✓".green(),
        report.versions.len().to_string().cyan(),
        match report.direction {
            Some(Direction::Down) => "reverted",
            _ => "applied",
        },
        report.duration_ms
    );
    Ok(())
}

fn timeout_error(limit: Duration, atomicity: Atomicity) -> anyhow::Error {
    let outcome = match atomicity {
        Atomicity::Transactional => "the in-flight migration was rolled back",
        Atomicity::BestEffort => {
            "the in-flight migration may be partially applied and is not recorded"
        }
    };
    anyhow!("timed out after {}s; {}", limit.as_secs(), outcome)
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!(
            "{} Nothing to do (current version {}, target {})",
            "✓".green(),
            plan.current.to_string().cyan(),
            plan.target.to_string().cyan()
        );
    } else {
        println!(
            "{} {} → {} ({} step(s))",
            "📋 Migration plan:".cyan().bold(),
            plan.current.to_string().yellow(),
            plan.target.to_string().yellow(),
            plan.len()
        );
        for action in plan {
            let arrow = match action.direction {
                Direction::Up => "↑".green(),
                Direction::Down => "↓".red(),
            };
            let preview = action.statement.lines().next().unwrap_or("").trim();
            println!(
                "  {} {:>6}  {}",
                arrow,
                action.version.to_string().white().bold(),
                preview.dimmed()
            );
        }
    }

    for note in &plan.notes {
        match note {
            PlanNote::OutOfOrder { dropped, applied } => println!(
                "  {} Skipping {:?}: migration {} is already applied",
                "⚠".yellow(),
                dropped,
                applied
            ),
            PlanNote::MissingBackward { version } => println!(
                "  {} Applied migration {} has no file; it stays applied",
                "⚠".yellow(),
                version
            ),
        }
    }
}

fn print_status(status: &Status) {
    println!("{}", "📋 Migration Status".cyan().bold());
    println!();
    println!("  Current version: {}", status.current.to_string().green());
    println!("  Latest version:  {}", status.latest.to_string().green());
    println!("  Atomicity:       {}", status.atomicity.to_string().yellow());
    println!();

    if status.applied.is_empty() {
        println!("  {} No migrations applied yet", "○".dimmed());
    } else {
        println!("{}", "  Applied:".white().bold());
        for applied in &status.applied {
            let at = applied
                .applied_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            let marker = if status.unknown.contains(&applied.version) {
                "?".yellow()
            } else {
                "✓".green()
            };
            println!("    {} {:>6}  {}", marker, applied.version, at.dimmed());
        }
    }

    if !status.pending.is_empty() {
        println!();
        println!("{}", "  Pending:".white().bold());
        for version in &status.pending {
            println!("    {} {:>6}", "○".dimmed(), version);
        }
    }

    if !status.unknown.is_empty() {
        println!();
        println!(
            "  {} {} applied version(s) have no migration file",
            "⚠".yellow(),
            status.unknown.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_down_target() {
        assert_eq!(down_target(&[1, 2, 3], 1), 2);
        assert_eq!(down_target(&[3, 1, 2], 2), 1);
        assert_eq!(down_target(&[1, 2, 3], 3), 0);
        assert_eq!(down_target(&[1, 2, 3], 10), 0);
        assert_eq!(down_target(&[], 1), 0);
    }

    #[test]
    fn test_timeout_message_follows_atomicity() {
        let limit = Duration::from_secs(5);
        assert_eq!(
            timeout_error(limit, Atomicity::Transactional).to_string(),
            "timed out after 5s; the in-flight migration was rolled back"
        );
        let best_effort = timeout_error(limit, Atomicity::BestEffort).to_string();
        assert!(best_effort.contains("partially applied"));
        assert!(!best_effort.contains("rolled back"));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["sqlshift", "down", "--steps", "2"]).unwrap();
        assert!(matches!(cli.command, Commands::Down { target: None, steps: 2 }));

        let cli = Cli::try_parse_from(["sqlshift", "plan", "4", "--format", "json", "-d", "db"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Plan {
                target: Some(4),
                format: OutputFormat::Json
            }
        ));
        assert_eq!(cli.dir, Some(PathBuf::from("db")));

        assert!(Cli::try_parse_from(["sqlshift", "down", "3", "--steps", "2"]).is_err());
    }
}
