//! Stepwise Migration CLI Tool
//!
//! Command-line interface for the stepwise engine. Drives the golang-migrate
//! binary one version at a time and reports what the database recorded.

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use stepwise::config::{MigrateConfig, DEFAULT_CONFIG_PATH};
use stepwise::migration::{
    DirectorySource, DownSteps, MigrationPlan, MigrationResult, Migrator, VersioningScheme,
};
use stepwise::MigrateCommand;

#[derive(Parser)]
#[command(name = "stepwise")]
#[command(about = "Step-by-step schema migrations on top of golang-migrate")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (optional)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Migrations directory path
    #[arg(long)]
    migrations_dir: Option<PathBuf>,

    /// Path to the golang-migrate binary
    #[arg(long)]
    command_path: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current version and dirty flag
    Status,

    /// Print the current version
    Version,

    /// List migration files
    List,

    /// Check the migration files for gaps and missing down files
    Validate,

    /// Apply pending migrations
    Up {
        /// Number of migrations to apply (default: all pending)
        #[arg(long)]
        steps: Option<usize>,

        /// Dry run - show what would be executed without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Rollback migrations
    #[command(group(ArgGroup::new("amount").required(true).args(["steps", "all"])))]
    Down {
        /// Number of migrations to rollback
        #[arg(long)]
        steps: Option<usize>,

        /// Rollback every applied migration
        #[arg(long)]
        all: bool,

        /// Dry run - show what would be rolled back
        #[arg(long)]
        dry_run: bool,
    },

    /// Migrate up or down to a version
    Goto {
        version: i64,

        /// Dry run - show the steps without running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Set the version and clear the dirty flag without running SQL
    Force {
        /// Version to record (-1 for none)
        #[arg(allow_negative_numbers = true)]
        version: i64,
    },

    /// Drop everything in the database
    Drop {
        /// Confirm the drop
        #[arg(short, long)]
        force: bool,
    },

    /// Create a new up/down migration pair
    Create {
        /// Migration name (e.g., "create_users_table")
        name: String,

        /// Use a timestamp version instead of the next sequence number
        #[arg(long, conflicts_with = "seq")]
        timestamp: bool,

        /// Use the next sequence number even when the config selects timestamps
        #[arg(long)]
        seq: bool,

        /// File extension
        #[arg(long, default_value = "sql")]
        ext: String,
    },
}

impl Commands {
    /// Commands that never reach the database
    fn is_offline(&self) -> bool {
        matches!(
            self,
            Commands::List | Commands::Validate | Commands::Create { .. }
        )
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();
    } else if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    dotenv::dotenv().ok();

    match run(cli) {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

/// Returns whether the command fully succeeded
fn run(cli: Cli) -> Result<bool> {
    let config = resolve_config(&cli)?;
    let migrator = if cli.command.is_offline() {
        offline_migrator(config)
    } else {
        Migrator::from_config(config).context("Cannot start migrator")?
    };
    let out = Output {
        json: cli.json,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Status => handle_status(&migrator, out),
        Commands::Version => handle_version(&migrator, out),
        Commands::List => handle_list(&migrator, out),
        Commands::Validate => handle_validate(&migrator, out),
        Commands::Up { steps, dry_run } => {
            if dry_run {
                return handle_plan(migrator.plan_up(steps)?, out);
            }
            out.result(&migrator.up(steps)?)
        }
        Commands::Down {
            steps,
            all,
            dry_run,
        } => {
            let steps = match (all, steps) {
                (true, _) => DownSteps::All,
                (false, Some(n)) => DownSteps::Count(n),
                (false, None) => bail!("Specify --steps N or --all"),
            };
            if dry_run {
                return handle_plan(migrator.plan_down(steps)?, out);
            }
            out.result(&migrator.down(steps)?)
        }
        Commands::Goto { version, dry_run } => {
            if dry_run {
                return handle_plan(migrator.plan_goto(version)?, out);
            }
            out.result(&migrator.goto(version)?)
        }
        Commands::Force { version } => out.result(&migrator.force(version)?),
        Commands::Drop { force } => out.result(&migrator.drop(force)?),
        Commands::Create {
            name,
            timestamp,
            seq,
            ext,
        } => {
            let scheme = match (timestamp, seq) {
                (true, _) => Some(VersioningScheme::Timestamp),
                (_, true) => Some(VersioningScheme::Sequential),
                _ => None,
            };
            handle_create(&migrator, &name, scheme, &ext, out)
        }
    }
}

/// Config file and `STEPWISE__*` env vars, overridden by flags and `DATABASE_URL`
fn resolve_config(cli: &Cli) -> Result<MigrateConfig> {
    let mut config = MigrateConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    if let Some(url) = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("STEPWISE_DATABASE_URL").ok())
        .or_else(|| {
            config
                .database_url
                .is_empty()
                .then(|| std::env::var("DATABASE_URL").ok())
                .flatten()
        })
    {
        config.database_url = url;
    }
    if let Some(dir) = &cli.migrations_dir {
        config.migrations_path = dir.clone();
    }
    if let Some(command_path) = &cli.command_path {
        config.command_path = command_path.clone();
    }

    Ok(config)
}

/// A migrator for file-only commands: no URL check, no binary lookup
fn offline_migrator(config: MigrateConfig) -> Migrator {
    let source = DirectorySource::new(&config.migrations_path);
    let executor = MigrateCommand::with_program(&config.command_path, &config);
    Migrator::new(config, source, executor)
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
    quiet: bool,
}

impl Output {
    fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn result(&self, result: &MigrationResult) -> Result<bool> {
        if self.json {
            self.print_json(result)?;
        } else if result.success {
            if !self.quiet {
                println!("{} {}", "✅".green(), result.message);
                println!("   Version: {}", describe(result.version));
            }
        } else {
            eprintln!("{} {}", "❌".red(), result.message.red());
            eprintln!(
                "   Version: {}{}",
                describe(result.version),
                if result.dirty { " (dirty)".yellow().to_string() } else { String::new() }
            );
            if result.dirty {
                eprintln!("   Fix the database, then run `stepwise force <version>`");
            }
        }
        Ok(result.success)
    }
}

fn handle_status(migrator: &Migrator, out: Output) -> Result<bool> {
    let info = migrator.status()?;
    if out.json {
        out.print_json(&info)?;
        return Ok(true);
    }

    println!("\n📊 Migration Status\n");
    println!("Version: {}", describe(info.version));
    if info.dirty {
        println!("State:   {}", "dirty".red().bold());
    } else {
        println!("State:   {}", "clean".green());
    }

    let set = migrator.list()?;
    let pending = set
        .up_versions()
        .into_iter()
        .filter(|v| info.version.map_or(true, |c| *v > c))
        .count();
    println!("\n📈 Summary: {} migration(s), {} pending", set.up_versions().len(), pending);
    Ok(true)
}

fn handle_version(migrator: &Migrator, out: Output) -> Result<bool> {
    let version = migrator.version()?;
    if out.json {
        out.print_json(&serde_json::json!({ "version": version }))?;
    } else {
        println!("{}", version);
    }
    Ok(true)
}

fn handle_list(migrator: &Migrator, out: Output) -> Result<bool> {
    let set = migrator.list()?;
    if out.json {
        out.print_json(&set)?;
        return Ok(true);
    }

    println!("\n📋 Migrations ({})\n", set.up_versions().len());
    for migration in set.iter() {
        println!("  {}", migration.file_name());
    }
    Ok(true)
}

fn handle_validate(migrator: &Migrator, out: Output) -> Result<bool> {
    let result = migrator.validate()?;
    if out.json {
        out.print_json(&result)?;
        return Ok(result.valid);
    }

    println!("Validating {} migration(s)...", result.total_migrations);
    for gap in &result.gaps {
        println!("  {} missing version {}", "⚠".yellow(), gap);
    }
    for missing in &result.missing_down_files {
        println!(
            "  {} no down file for {} ({})",
            "⚠".yellow(),
            missing.version,
            missing.name
        );
    }
    for duplicate in &result.duplicates {
        println!(
            "  {} version {} used by {} {} files: {}",
            "⚠".yellow(),
            duplicate.version,
            duplicate.names.len(),
            duplicate.direction,
            duplicate.names.join(", ")
        );
    }
    for version in &result.mixed_versions {
        println!("  {} version {} does not match the numbering scheme", "⚠".yellow(), version);
    }

    if result.valid {
        println!("{} All migrations valid", "✅".green());
    } else {
        println!("{} Validation failed", "❌".red());
    }
    Ok(result.valid)
}

fn handle_plan(plan: MigrationPlan, out: Output) -> Result<bool> {
    if out.json {
        out.print_json(&plan)?;
        return Ok(true);
    }

    if plan.is_empty() {
        println!("Nothing to do at version {}", describe(plan.from));
        return Ok(true);
    }
    println!("Would run {} {} step(s):", plan.len(), plan.direction);
    for (i, step) in plan.steps.iter().enumerate() {
        println!(
            "  {}. {} -> version {}",
            i + 1,
            step.migration.file_name(),
            describe(step.expected)
        );
    }
    Ok(true)
}

/// `scheme` overrides the configured numbering when set
fn handle_create(
    migrator: &Migrator,
    name: &str,
    scheme: Option<VersioningScheme>,
    ext: &str,
    out: Output,
) -> Result<bool> {
    let scheme = scheme.unwrap_or_else(|| migrator.config().scheme());

    let source = DirectorySource::new(&migrator.config().migrations_path);
    std::fs::create_dir_all(source.path())
        .with_context(|| format!("Failed to create {}", source.path().display()))?;

    let created = migrator.create(name, scheme, ext)?;
    let paths = source.persist(&created)?;

    if out.json {
        out.print_json(&created)?;
    } else {
        for path in &paths {
            println!("{} Created {}", "✅".green(), path.display());
        }
    }
    Ok(true)
}

fn describe(version: Option<i64>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise::migration::MigrationError;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("stepwise").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_down_requires_an_amount() {
        assert!(Cli::try_parse_from(["stepwise", "down"]).is_err());
        assert!(matches!(
            parse(&["down", "--all"]).command,
            Commands::Down { all: true, .. }
        ));
        assert!(matches!(
            parse(&["down", "--steps", "2"]).command,
            Commands::Down { steps: Some(2), .. }
        ));
    }

    #[test]
    fn test_force_accepts_nil_version() {
        assert!(matches!(
            parse(&["force", "-1"]).command,
            Commands::Force { version: -1 }
        ));
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("stepwise.toml");
        std::fs::write(
            &config_path,
            "[migrate]\ndatabase_url = \"sqlite3://file.db\"\nmigrations_path = \"file_dir\"\n",
        )
        .unwrap();

        let cli = parse(&[
            "--config",
            config_path.to_str().unwrap(),
            "--migrations-dir",
            "flag_dir",
            "--database-url",
            "sqlite3://flag.db",
            "status",
        ]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.database_url, "sqlite3://flag.db");
        assert_eq!(config.migrations_path, PathBuf::from("flag_dir"));
    }

    #[test]
    fn test_create_writes_pair_without_database() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("migrations");
        let config = MigrateConfig::new("", &dir);
        let migrator = offline_migrator(config);
        let out = Output {
            json: false,
            quiet: true,
        };

        assert!(handle_create(&migrator, "create users", None, "sql", out).unwrap());
        assert!(dir.join("000001_create_users.up.sql").exists());
        assert!(dir.join("000001_create_users.down.sql").exists());

        assert!(handle_create(&migrator, "add email", None, "sql", out).unwrap());
        assert!(dir.join("000002_add_email.up.sql").exists());
    }

    #[test]
    fn test_create_numbering_flags() {
        assert!(matches!(
            parse(&["create", "users", "--seq"]).command,
            Commands::Create { seq: true, timestamp: false, .. }
        ));
        assert!(Cli::try_parse_from(["stepwise", "create", "users", "--seq", "--timestamp"]).is_err());
    }

    #[test]
    fn test_seq_overrides_timestamp_config() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("migrations");
        let mut config = MigrateConfig::new("", &dir);
        config.sequential = false;
        let migrator = offline_migrator(config);
        let out = Output {
            json: false,
            quiet: true,
        };

        assert!(handle_create(
            &migrator,
            "create users",
            Some(VersioningScheme::Sequential),
            "sql",
            out
        )
        .unwrap());
        assert!(dir.join("000001_create_users.up.sql").exists());
    }

    #[test]
    fn test_online_commands_need_a_database_url() {
        let temp_dir = TempDir::new().unwrap();
        let config = MigrateConfig::new("", temp_dir.path());
        let err = Migrator::from_config(config).err().unwrap();
        assert!(matches!(err, MigrationError::Config(_)));
    }
}
