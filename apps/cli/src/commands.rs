//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use lingoflow_core::{Orchestrator, PipelineState, ProgressReporter, RunReport};
use lingoflow_llm::OpenAiClient;
use lingoflow_shared::{
    AppConfig, LanguageCode, init_config, load_config, load_config_from, validate_api_keys,
};
use lingoflow_store::NotionClient;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Lingoflow: keep every blog post published in every language.
#[derive(Parser)]
#[command(
    name = "lingoflow",
    version,
    about = "Translate published Notion blog posts into their missing languages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.lingoflow/lingoflow.toml).
    #[arg(long, global = true, env = "LINGOFLOW_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// List published documents that are missing translations.
    Scan {
        /// Print tasks as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Translate one document into one language, start to finish.
    Translate {
        /// Source document id.
        #[arg(long)]
        source: String,

        /// Target language tag (e.g. en, zh-hant).
        #[arg(long)]
        lang: String,

        /// Blog theme (category name) of the source document.
        #[arg(long)]
        theme: String,
    },

    /// Advance a persisted pipeline state by exactly one stage.
    Step {
        /// State file, read if present and rewritten after the step.
        #[arg(long)]
        state: PathBuf,

        /// Source document id for a new state.
        #[arg(long, requires_all = ["lang", "theme"])]
        source: Option<String>,

        /// Target language for a new state.
        #[arg(long)]
        lang: Option<String>,

        /// Blog theme for a new state.
        #[arg(long)]
        theme: Option<String>,
    },

    /// Scan, then translate up to `max_tasks_per_run` tasks.
    Auto {
        /// Override the configured task limit.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
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
        0 => "lingoflow=info",
        1 => "lingoflow=debug",
        _ => "lingoflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Scan { json } => cmd_scan(config_path.as_deref(), json).await,
        Command::Translate {
            source,
            lang,
            theme,
        } => cmd_translate(config_path.as_deref(), &source, &lang, &theme).await,
        Command::Step {
            state,
            source,
            lang,
            theme,
        } => {
            let init = source.map(|source| NewState {
                source,
                lang: lang.unwrap_or_default(),
                theme: theme.unwrap_or_default(),
            });
            cmd_step(config_path.as_deref(), &state, init).await
        }
        Command::Auto { limit } => cmd_auto(config_path.as_deref(), limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Build an orchestrator talking to the configured services.
fn orchestrator(config: AppConfig, progress: Arc<dyn ProgressReporter>) -> Result<Orchestrator> {
    validate_api_keys(&config)?;
    if config.categories.is_empty() {
        return Err(eyre!(
            "no [[categories]] configured; add at least one to the config file"
        ));
    }

    let store = NotionClient::from_config(&config.notion)?;
    let completion = OpenAiClient::from_config(&config.openai)?;
    let orchestrator =
        Orchestrator::new(Arc::new(store), Arc::new(completion), config)?.with_progress(progress);
    Ok(orchestrator)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_scan(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let orchestrator = orchestrator(config, Arc::new(lingoflow_core::SilentProgress))?;

    let tasks = orchestrator.scan().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    if tasks.is_empty() {
        println!("Every published document is fully translated.");
        return Ok(());
    }

    println!();
    for task in &tasks {
        let missing: Vec<&str> = task.missing_languages.iter().map(LanguageCode::as_str).collect();
        println!(
            "  {}  [{}]  {}  missing: {}",
            task.published_at.format("%Y-%m-%d"),
            task.category,
            task.title,
            missing.join(", ")
        );
        println!("      source: {}", task.source_document_id);
    }
    println!();
    println!("  {} task(s)", tasks.len());
    Ok(())
}

async fn cmd_translate(
    config_path: Option<&Path>,
    source: &str,
    lang: &str,
    theme: &str,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let progress = Arc::new(CliProgress::new()?);
    let mut orchestrator = orchestrator(config, progress.clone())?;

    info!(source, lang, theme, "translating document");
    let state = PipelineState::new(source, LanguageCode::new(lang), theme);
    let result = orchestrator.run_to_completion(state).await;
    progress.clear();
    let done = result?;

    println!();
    println!("  Translation complete!");
    println!("  Language:    {}", done.target_language);
    if let Some(title) = &done.translated_title {
        println!("  Title:       {title}");
    }
    if let Some(id) = &done.destination_document_id {
        println!("  Destination: {id}");
    }
    println!("  Slices:      {}", done.total_batches);
    println!();
    Ok(())
}

/// Fields for a state file that does not exist yet.
struct NewState {
    source: String,
    lang: String,
    theme: String,
}

async fn cmd_step(config_path: Option<&Path>, path: &Path, init: Option<NewState>) -> Result<()> {
    let config = resolve_config(config_path)?;

    let state = match init {
        Some(new) => PipelineState::new(new.source, LanguageCode::new(&new.lang), new.theme),
        None if path.exists() => read_state(path)?,
        // No state yet: the first step picks the newest task.
        None => PipelineState::scanning(),
    };
    if state.is_done() {
        println!("Pipeline already done; remove {} to start over.", path.display());
        return Ok(());
    }

    let mut orchestrator = orchestrator(config, Arc::new(lingoflow_core::SilentProgress))?;
    let from = state.stage;
    let next = orchestrator.step(state).await?;
    write_state(path, &next)?;

    info!(from = %from, to = %next.stage, "step complete");
    println!(
        "{} -> {} (slice {}/{})",
        from, next.stage, next.batch_index, next.total_batches
    );
    Ok(())
}

async fn cmd_auto(config_path: Option<&Path>, limit: Option<usize>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let limit = limit.unwrap_or(config.translation.max_tasks_per_run);
    let progress = Arc::new(CliProgress::new()?);
    let mut orchestrator = orchestrator(config, progress.clone())?;

    let tasks = orchestrator.scan().await?;
    info!(tasks = tasks.len(), limit, "starting auto run");
    let report = orchestrator.run_tasks(&tasks, limit).await;

    println!();
    println!("  Processed: {}", report.processed);
    println!("  Succeeded: {}", report.succeeded);
    for failure in &report.errors {
        println!(
            "  Failed:    {} [{}]: {}",
            failure.task, failure.language, failure.message
        );
    }
    println!();

    if report.errors.is_empty() {
        Ok(())
    } else {
        Err(eyre!("{} task(s) failed", report.errors.len()))
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// State files
// ---------------------------------------------------------------------------

fn read_state(path: &Path) -> Result<PipelineState> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read state file {}", path.display()))?;
    serde_json::from_str(&raw)
        .wrap_err_with(|| format!("state file {} is not a pipeline state", path.display()))
}

fn write_state(path: &Path, state: &PipelineState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json)
        .wrap_err_with(|| format!("failed to write state file {}", path.display()))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { spinner })
    }

    fn clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.replace('_', " "));
    }

    fn batch_done(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Writing slice [{current}/{total}]"));
    }

    fn task_started(&self, title: &str, language: &LanguageCode) {
        self.spinner
            .set_message(format!("{title} → {}", language.display_name()));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
