use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use shelver_core::{
    app_paths, load_config, scan_library, validate_pattern, BatchRenamer, JsonCatalog,
    OperationKind, PreviewEntry, RenameHistory, RenameOptions, RollbackReport,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "shelver-cli")]
#[command(about = "Reorganizes a media library into a template-driven folder layout")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Plans (and with --apply, performs) moves for every catalog item.
    Organize(OrganizeArgs),
    /// Checks a template and prints its warnings.
    Validate { template: String },
    /// Writes a catalog file for the primary media files under a folder.
    Scan(ScanArgs),
    /// Lists recorded batches.
    History {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Reverses one recorded batch.
    Rollback(RollbackArgs),
    /// Reverses the newest batch that has not been rolled back.
    Undo {
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
}

#[derive(Debug, Args)]
struct OrganizeArgs {
    #[arg(long)]
    catalog: PathBuf,
    #[arg(long)]
    root: PathBuf,
    #[arg(long)]
    folder_template: Option<String>,
    #[arg(long)]
    filename_template: Option<String>,
    #[arg(long, default_value_t = false)]
    no_companions: bool,
    #[arg(long, default_value_t = false)]
    apply: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct ScanArgs {
    dir: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct RollbackArgs {
    batch_id: String,
    /// Catalog file to write restored paths back to.
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelver_core=info,shelver_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Organize(args) => cmd_organize(args),
        Commands::Validate { template } => cmd_validate(&template),
        Commands::Scan(args) => cmd_scan(args),
        Commands::History { output } => cmd_history(output),
        Commands::Rollback(args) => cmd_rollback(&args.batch_id, args.catalog),
        Commands::Undo { catalog } => cmd_undo(catalog),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

fn cmd_organize(args: OrganizeArgs) -> Result<()> {
    let config = load_config()?;
    let folder_template = args.folder_template.unwrap_or(config.folder_template);
    let filename_template = args.filename_template.unwrap_or(config.filename_template);
    let include_companions = config.include_companions && !args.no_companions;

    let mut catalog = JsonCatalog::open(&args.catalog)?;
    let mut renamer = BatchRenamer::new(RenameOptions {
        library_root: args.root,
        dry_run: !args.apply,
        max_collision_attempts: config.max_collision_attempts,
    });
    let added = renamer.add_all(
        catalog.items(),
        &folder_template,
        &filename_template,
        include_companions,
    )?;
    info!(items = added, "items scheduled");

    let preview = renamer.preview();
    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&preview)?),
        OutputFormat::Table => print_table(&preview),
    }
    for warning in renamer.warnings() {
        eprintln!("warning: {warning}");
    }

    let summary = renamer.get_operation_summary();
    eprintln!(
        "\nsummary: items={} main={} companions={}",
        summary.items, summary.main_operations, summary.companion_operations
    );

    if !args.apply {
        eprintln!("dry run: no files were moved. Pass --apply to perform the moves.");
        return Ok(());
    }

    let result = renamer.execute();
    if !renamer.executed_operations().is_empty() {
        let history = RenameHistory::open_default()?;
        let batch_id = history.save_operation_batch(renamer.executed_operations(), &config.actor)?;
        eprintln!("batch recorded: {batch_id}");
    }

    let catalog_errors = result.apply_to_catalog(&mut catalog);
    catalog.save()?;

    eprintln!(
        "applied: {} operations succeeded, {} failed",
        result.successful, result.failed
    );
    for message in result.messages.iter().chain(&catalog_errors) {
        eprintln!("error: {message}");
    }
    if result.failed > 0 || !catalog_errors.is_empty() {
        bail!("{} operations failed", result.failed + catalog_errors.len());
    }
    Ok(())
}

fn cmd_validate(template: &str) -> Result<()> {
    let validation = validate_pattern(template);
    for warning in &validation.warnings {
        println!("warning: {warning}");
    }
    if !validation.is_valid {
        bail!("template is invalid");
    }
    println!("template is valid");
    Ok(())
}

fn cmd_scan(args: ScanArgs) -> Result<()> {
    let items = scan_library(&args.dir)?;
    let catalog = JsonCatalog::with_items(&args.out, items);
    catalog.save()?;
    println!(
        "{} items written to {}",
        catalog.items().len(),
        args.out.display()
    );
    Ok(())
}

fn cmd_history(output: OutputFormat) -> Result<()> {
    let entries = RenameHistory::open_default()?.list()?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Table => {
            println!("batch id -> operations (actor, time, state)");
            for entry in &entries {
                let state = match entry.rolled_back_at {
                    Some(at) => format!("rolled back {}", at.format("%Y-%m-%d %H:%M:%S")),
                    None => "applied".to_string(),
                };
                println!(
                    "{} -> {} ({}, {}, {state})",
                    entry.batch_id,
                    entry.operations.len(),
                    entry.actor,
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }
    Ok(())
}

fn cmd_rollback(batch_id: &str, catalog: Option<PathBuf>) -> Result<()> {
    let report = RenameHistory::open_default()?.rollback_batch(batch_id)?;
    finish_rollback(&report, catalog)
}

fn cmd_undo(catalog: Option<PathBuf>) -> Result<()> {
    let history = RenameHistory::open_default()?;
    let Some(entry) = history.latest()? else {
        bail!("nothing to undo");
    };
    let report = history.rollback_batch(&entry.batch_id)?;
    finish_rollback(&report, catalog)
}

fn finish_rollback(report: &RollbackReport, catalog: Option<PathBuf>) -> Result<()> {
    println!("{}", report.message);
    for failure in &report.failures {
        eprintln!(
            "error: {} -> {}: {}",
            failure.target_path.display(),
            failure.source_path.display(),
            failure.reason
        );
    }

    if let Some(path) = catalog {
        let mut catalog = JsonCatalog::open(&path)?;
        for message in shelver_core::report_relocations(&mut catalog, &report.relocated) {
            eprintln!("error: {message}");
        }
        catalog.save()?;
    }

    if !report.success {
        bail!("rollback incomplete");
    }
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("config file: {}", paths.config_path.display());
    println!("history file: {}", paths.history_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_table(preview: &[PreviewEntry]) {
    println!("source -> target (kind)");
    for entry in preview {
        let kind = match entry.kind {
            OperationKind::Main => "main",
            OperationKind::Companion => "companion",
        };
        println!(
            "{} -> {} ({kind})",
            entry.source.display(),
            entry.target.display()
        );
        for warning in &entry.warnings {
            println!("    ! {warning}");
        }
    }
}
