//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use merchgen_core::{
    BatchConfig, BatchDeps, BatchReport, EntityOutcome, ProgressReporter, generate_designs,
};
use merchgen_document::{DocumentSession, SceneDocument};
use merchgen_export::Deliverer;
use merchgen_sheets::SheetSource;
use merchgen_shared::{
    AppConfig, BatchResult, DeliveryConfig, SheetsConfig, database_path, init_config, load_config,
};
use merchgen_storage::{NewDelivery, Storage};
use merchgen_templates::TemplateRegistry;

/// Shown in place of an empty setting.
const EMPTY_CELL: &str = "—";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// merchgen: batch-generate team merch designs.
#[derive(Parser)]
#[command(
    name = "merchgen",
    version,
    about = "Batch-generate per-team merch designs from league datasets.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Select or show the league base folder.
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// List the league's merch request list.
    Teams,

    /// Show the league's design and product ids.
    Settings,

    /// Generate one design per requested team.
    Generate {
        /// Scene document to customize.
        #[arg(short, long)]
        document: PathBuf,

        /// Write the final document state here.
        #[arg(long)]
        save: Option<PathBuf>,

        /// Template id, overriding the settings dataset.
        #[arg(short, long)]
        template: Option<String>,

        /// Export every team's design.
        #[arg(long)]
        export: bool,

        /// Upload exports regardless of the configured toggle.
        #[arg(long, conflicts_with = "no_cloud")]
        cloud: bool,

        /// Never upload exports.
        #[arg(long)]
        no_cloud: bool,

        /// Match team names ignoring case.
        #[arg(long)]
        case_insensitive: bool,

        /// Pause around text edits, in milliseconds.
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Show batch run history.
    Runs {
        /// Maximum number of runs to show.
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Base folder subcommands.
#[derive(Subcommand)]
pub(crate) enum FolderAction {
    /// Remember a league folder; its name is the league name.
    Set {
        path: PathBuf,
    },
    /// Show the remembered league folder.
    Show,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "merchgen=info",
        1 => "merchgen=debug",
        _ => "merchgen=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Folder { action } => match action {
            FolderAction::Set { path } => cmd_folder_set(&path).await,
            FolderAction::Show => cmd_folder_show().await,
        },
        Command::Teams => cmd_teams().await,
        Command::Settings => cmd_settings().await,
        Command::Generate {
            document,
            save,
            template,
            export,
            cloud,
            no_cloud,
            case_insensitive,
            delay_ms,
        } => {
            let cloud = match (cloud, no_cloud) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            cmd_generate(GenerateArgs {
                document,
                save,
                template,
                export,
                cloud,
                case_insensitive,
                delay_ms,
            })
            .await
        }
        Command::Runs { limit } => cmd_runs(limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

async fn open_storage() -> Result<Storage> {
    Ok(Storage::open(&database_path()?).await?)
}

/// The remembered base folder, or an error telling the user to pick one.
async fn require_base_folder(storage: &Storage) -> Result<PathBuf> {
    storage
        .base_folder()
        .await?
        .ok_or_else(|| eyre!("no base folder selected; run `merchgen folder set <path>` first"))
}

fn league_of(base_folder: &Path) -> Result<String> {
    base_folder
        .file_name()
        .map(|n| n.to_string_lossy().trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| eyre!("cannot derive a league name from {}", base_folder.display()))
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { EMPTY_CELL } else { value }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_folder_set(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(eyre!("'{}' is not a directory", path.display()));
    }
    let path = std::fs::canonicalize(path)?;
    let league = league_of(&path)?;

    let storage = open_storage().await?;
    storage.set_base_folder(&path).await?;

    info!(path = %path.display(), league = %league, "base folder selected");
    println!("Base folder: {}", path.display());
    println!("League:      {league}");
    Ok(())
}

async fn cmd_folder_show() -> Result<()> {
    let storage = open_storage().await?;
    match storage.base_folder().await? {
        Some(path) => {
            println!("Base folder: {}", path.display());
            println!("League:      {}", league_of(&path)?);
        }
        None => println!("No base folder selected."),
    }
    Ok(())
}

async fn cmd_teams() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage().await?;
    let league = league_of(&require_base_folder(&storage).await?)?;

    let mut sheets = SheetSource::new(SheetsConfig::from(&config))?;
    let requests = sheets.load_merch_requests(&league).await;

    if requests.is_empty() {
        println!("No merch requests found for {league}.");
        return Ok(());
    }
    for (i, request) in requests.iter().enumerate() {
        println!("{}. {} - {}", i + 1, request.abbreviation, request.full_name());
    }
    Ok(())
}

async fn cmd_settings() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage().await?;
    let league = league_of(&require_base_folder(&storage).await?)?;

    let mut sheets = SheetSource::new(SheetsConfig::from(&config))?;
    let settings = sheets.load_merch_settings(&league).await;

    println!("League:     {league}");
    println!("Design ID:  {}", or_dash(&settings.design_id));
    println!("Product ID: {}", or_dash(&settings.product_id));
    Ok(())
}

struct GenerateArgs {
    document: PathBuf,
    save: Option<PathBuf>,
    template: Option<String>,
    export: bool,
    cloud: Option<bool>,
    case_insensitive: bool,
    delay_ms: Option<u64>,
}

async fn cmd_generate(args: GenerateArgs) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage().await?;
    let base_folder = require_base_folder(&storage).await?;

    let mut batch = BatchConfig::from_app(&config, base_folder);
    if args.export {
        batch = batch.with_export(&config, args.cloud);
    }
    batch.template_override = args.template;
    if args.case_insensitive {
        batch.matching.case_sensitive = false;
    }
    if let Some(ms) = args.delay_ms {
        batch.step_delay = Duration::from_millis(ms);
    }

    let document = SceneDocument::open(&args.document)?;
    let session = DocumentSession::attached(document);
    let mut sheets = SheetSource::new(SheetsConfig::from(&config))?;
    let templates = TemplateRegistry::builtin();
    let deliverer = Deliverer::new(DeliveryConfig::from(&config))?;

    storage
        .insert_batch_run(
            &batch.run_id,
            &batch.league,
            batch.template_override.as_deref().unwrap_or_default(),
        )
        .await?;

    info!(
        run_id = %batch.run_id,
        league = %batch.league,
        document = %args.document.display(),
        "generating designs"
    );

    let reporter = CliProgress::new();
    let report = generate_designs(
        &batch,
        BatchDeps {
            sheets: &mut sheets,
            session: &session,
            templates: &templates,
            deliverer: Some(&deliverer),
            progress: &reporter,
        },
    )
    .await?;

    record_run(&storage, &report).await?;

    if let Some(path) = &args.save {
        // A scene's raster snapshot is the scene file itself.
        session.export_raster(path).await?;
        info!(path = %path.display(), "document saved");
    }

    print_summary(&report.result);
    Ok(())
}

/// Persist final counters and every delivery. A delivery row that fails to
/// insert is logged and skipped.
async fn record_run(storage: &Storage, report: &BatchReport) -> Result<()> {
    let run_id = &report.result.run_id;
    storage.finish_batch_run(run_id, &report.result).await?;

    for delivery in &report.deliveries {
        let record = NewDelivery {
            entity: &delivery.entity,
            local_path: &delivery.local_path,
            remote_key: delivery.remote_key.as_ref().map(|k| k.as_str()),
            remote_url: delivery.report.as_ref().and_then(|r| r.remote_url()),
            status: delivery.status(),
        };
        if let Err(e) = storage.insert_delivery(run_id, record).await {
            warn!(entity = %delivery.entity, error = %e, "failed to record delivery");
        }
    }
    Ok(())
}

fn print_summary(result: &BatchResult) {
    println!();
    println!("  {}", result.status_message());
    if !result.no_data {
        println!("  Run:        {}", result.run_id);
        println!("  Design:     {}", or_dash(&result.design_id));
        println!("  Processed:  {}", result.processed);
        println!("  Unmatched:  {}", result.missing);
        println!("  Skipped:    {}", result.skipped);
        println!("  Failed:     {}", result.failed);
        println!("  No logo:    {}", result.assets_unresolved);
        if result.exported + result.export_failed > 0 {
            println!(
                "  Exported:   {} ({} failed)",
                result.exported, result.export_failed
            );
            println!(
                "  Uploaded:   {} ({} failed)",
                result.uploaded, result.upload_failed
            );
        }
    }
    println!(
        "  Time:       {:.1}s",
        Duration::from_millis(result.elapsed_ms).as_secs_f64()
    );
    println!();
}

async fn cmd_runs(limit: usize) -> Result<()> {
    let storage = open_storage().await?;
    let runs = storage.list_batch_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }
    for run in runs {
        let summary = match &run.result {
            Some(result) => result.status_message(),
            None => "unfinished".to_string(),
        };
        println!(
            "{}  {:<8} {:<14} {}",
            run.started_at,
            run.league,
            or_dash(&run.design_id),
            summary
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn entity_started(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Designing [{current}/{total}] {name}"));
    }

    fn entity_finished(&self, name: &str, outcome: EntityOutcome) {
        match outcome {
            EntityOutcome::Processed => {}
            EntityOutcome::Skipped => self
                .spinner
                .println(format!("  skipped {name}: document lacks a required layer")),
            EntityOutcome::Failed => self
                .spinner
                .println(format!("  failed {name}: template error (see log)")),
        }
    }

    fn done(&self, _result: &BatchResult) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_flags_conflict() {
        let parsed = Cli::try_parse_from([
            "merchgen", "generate", "--document", "a.json", "--cloud", "--no-cloud",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn generate_flags_parse() {
        let cli = Cli::try_parse_from([
            "merchgen",
            "-vv",
            "generate",
            "-d",
            "front.scene.json",
            "--template",
            "26-DivPrev",
            "--export",
            "--no-cloud",
            "--delay-ms",
            "0",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Generate {
                document,
                template,
                export,
                cloud,
                no_cloud,
                delay_ms,
                ..
            } => {
                assert_eq!(document, PathBuf::from("front.scene.json"));
                assert_eq!(template.as_deref(), Some("26-DivPrev"));
                assert!(export && !cloud && no_cloud);
                assert_eq!(delay_ms, Some(0));
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn league_is_folder_name() {
        assert_eq!(league_of(Path::new("/leagues/MLB")).unwrap(), "MLB");
        assert!(league_of(Path::new("/")).is_err());
    }

    #[test]
    fn empty_settings_show_a_dash() {
        assert_eq!(or_dash(""), EMPTY_CELL);
        assert_eq!(or_dash("26-DivPrev"), "26-DivPrev");
    }
}
