//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Report, Result};
use indicatif::{ProgressBar, ProgressStyle};
use socialflow_core::{
    DiscussRequest, InMemoryConversationStore, OperationStage, Pipeline, ProgressReporter,
    SilentProgress, TopicLocks, publish,
};
use socialflow_generation::{GeminiBackend, GenerationGateway};
use socialflow_shared::{
    AppConfig, ContentType, ErrorPayload, HistoryEntry, HistoryMode, Operation, PipelineConfig,
    RetentionPolicy, SocialFlowError, StoreKind, TopicId, expand_home, init_config, load_config,
    load_config_from, validate_api_key,
};
use socialflow_storage::Storage;
use socialflow_transcript::{TimedTextOptions, TimedTextProvider};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SocialFlow: AI summaries, discussion, and translation for videos.
#[derive(Parser)]
#[command(
    name = "socialflow",
    version,
    about = "Summarize videos, discuss them, and publish translated articles.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print results and failures as JSON on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of ~/.socialflow/socialflow.toml.
    #[arg(long, global = true)]
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

/// `--history-mode` values.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum HistoryModeArg {
    Persisted,
    ClientHeld,
}

impl From<HistoryModeArg> for HistoryMode {
    fn from(arg: HistoryModeArg) -> Self {
        match arg {
            HistoryModeArg::Persisted => HistoryMode::Persisted,
            HistoryModeArg::ClientHeld => HistoryMode::ClientHeld,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch a video's transcript and summarize it.
    Summarize {
        /// Watch URL, short link, or bare video id.
        reference: String,

        /// Content type: general, programming, or podcast.
        #[arg(short = 't', long = "type")]
        content_type: Option<String>,
    },

    /// Ask a follow-up question about a summarized video.
    Discuss {
        /// Video id the conversation belongs to.
        topic: String,

        /// The question.
        question: String,

        /// Summary text the answer is grounded in.
        #[arg(long, conflicts_with = "grounding_file", required_unless_present = "grounding_file")]
        grounding: Option<String>,

        /// Read the grounding summary from a file.
        #[arg(long)]
        grounding_file: Option<PathBuf>,

        /// JSON array of `{role, content}` turns (client-held mode).
        #[arg(long)]
        history_file: Option<PathBuf>,

        /// Override `defaults.history_mode`.
        #[arg(long)]
        history_mode: Option<HistoryModeArg>,
    },

    /// Translate text, keeping its formatting.
    Translate {
        /// Target language, e.g. Hindi.
        #[arg(long)]
        to: String,

        /// Text to translate.
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// Read the text from a file.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Publish content as an article for a video and language.
    Publish {
        /// Video id the article belongs to.
        #[arg(long)]
        topic: String,

        /// Article language.
        #[arg(long)]
        language: String,

        /// Article content.
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// Read the content from a file.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show the stored conversation for a video, or list conversations.
    History {
        /// Video id. Lists all stored conversations when omitted.
        topic: Option<String>,
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
        0 => "socialflow=info",
        1 => "socialflow=debug",
        _ => "socialflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so that stdout stays clean for results.
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
    let out = Output { json: cli.json };
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Summarize {
            reference,
            content_type,
        } => cmd_summarize(config_path, out, &reference, content_type.as_deref()).await,
        Command::Discuss {
            topic,
            question,
            grounding,
            grounding_file,
            history_file,
            history_mode,
        } => {
            let grounding = read_input(grounding, grounding_file.as_deref())?;
            cmd_discuss(
                config_path,
                out,
                &topic,
                question,
                grounding,
                history_file.as_deref(),
                history_mode,
            )
            .await
        }
        Command::Translate { to, text, file } => {
            let text = read_input(text, file.as_deref())?;
            cmd_translate(config_path, out, &text, &to).await
        }
        Command::Publish {
            topic,
            language,
            text,
            file,
        } => {
            let content = read_input(text, file.as_deref())?;
            cmd_publish(config_path, out, &topic, &language, &content).await
        }
        Command::History { topic } => cmd_history(config_path, out, topic.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

/// Print a failure as an [`ErrorPayload`] on stdout.
pub(crate) fn print_error_payload(report: &Report) {
    let payload = match report.downcast_ref::<SocialFlowError>() {
        Some(err) => serde_json::to_value(ErrorPayload::from(err)),
        None => Ok(serde_json::json!({ "kind": "internal_error", "cause": report.to_string() })),
    };
    match payload {
        Ok(value) => println!("{}", serde_json::json!({ "error": value })),
        Err(e) => eprintln!("failed to encode error payload: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_summarize(
    config_path: Option<&Path>,
    out: Output,
    reference: &str,
    content_type: Option<&str>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let tag = content_type.unwrap_or(config.defaults.content_type.as_str());
    info!(reference, content_type = ContentType::from_tag(Some(tag)).as_str(), "summarizing");

    let provider = TimedTextProvider::new(TimedTextOptions::from(&config.transcript))?;
    let pipeline = build_pipeline(&config, None).await?.with_progress(out.progress());
    let outcome = pipeline
        .summarize_reference(&provider, reference, Some(tag))
        .await?;

    if out.json {
        out.print_json(&serde_json::json!({
            "topicId": outcome.topic_id,
            "summary": outcome.summary,
        }))
    } else {
        println!("{}", outcome.summary);
        Ok(())
    }
}

async fn cmd_discuss(
    config_path: Option<&Path>,
    out: Output,
    topic: &str,
    question: String,
    grounding: String,
    history_file: Option<&Path>,
    history_mode: Option<HistoryModeArg>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let topic_id = TopicId::new(topic)?;
    let history = history_file.map(read_history).transpose()?;

    let pipeline = build_pipeline(&config, history_mode.map(Into::into))
        .await?
        .with_progress(out.progress());
    let outcome = pipeline
        .discuss(DiscussRequest {
            topic_id,
            question,
            grounding,
            history,
        })
        .await?;

    if out.json {
        out.print_json(&serde_json::json!({
            "answer": outcome.answer,
            "message": outcome.assistant_message,
        }))
    } else {
        println!("{}", outcome.answer);
        Ok(())
    }
}

async fn cmd_translate(
    config_path: Option<&Path>,
    out: Output,
    text: &str,
    target_language: &str,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let pipeline = build_pipeline(&config, None).await?.with_progress(out.progress());
    let translated = pipeline.translate(text, target_language).await?;

    if out.json {
        out.print_json(&serde_json::json!({ "translatedText": translated }))
    } else {
        println!("{translated}");
        Ok(())
    }
}

async fn cmd_publish(
    config_path: Option<&Path>,
    out: Output,
    topic: &str,
    language: &str,
    content: &str,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let topic_id = TopicId::new(topic)?;
    let storage = open_storage(&config).await?;

    let article = publish(storage.as_ref(), content, language, &topic_id).await?;

    if out.json {
        out.print_json(&serde_json::json!({ "article": article }))
    } else {
        println!();
        println!("  Article published!");
        println!("  Title:  {}", article.title);
        println!("  Slug:   {}", article.slug);
        println!("  ID:     {}", article.id);
        println!();
        Ok(())
    }
}

async fn cmd_history(config_path: Option<&Path>, out: Output, topic: Option<&str>) -> Result<()> {
    let config = resolve_config(config_path)?;
    ensure_persistent_store(&config)?;
    let storage = open_storage_for_reading(&config).await?;

    match topic {
        Some(topic) => {
            let topic_id = TopicId::new(topic)?;
            let messages = storage.list_messages(&topic_id).await?;
            if out.json {
                return out.print_json(&serde_json::json!({ "messages": messages }));
            }
            if messages.is_empty() {
                println!("No messages for {topic_id}.");
            }
            for message in &messages {
                println!(
                    "[{}] {}: {}",
                    message.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    message.sender.as_str(),
                    message.content
                );
            }
        }
        None => {
            let topics = storage.list_topics().await?;
            if out.json {
                let topics: Vec<_> = topics
                    .iter()
                    .map(|(id, count)| serde_json::json!({ "topicId": id, "messages": count }))
                    .collect();
                return out.print_json(&serde_json::json!({ "topics": topics }));
            }
            if topics.is_empty() {
                println!("No conversations stored yet.");
            }
            for (id, count) in &topics {
                println!("  {id:<16} {count} messages");
            }
        }
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config: AppConfig = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = expand_home(&config.defaults.database_path)?;
    Ok(Arc::new(Storage::open(&path).await?))
}

/// An existing database is opened read-only; a missing one is created empty.
async fn open_storage_for_reading(config: &AppConfig) -> Result<Storage> {
    let path = expand_home(&config.defaults.database_path)?;
    let storage = if path.exists() {
        Storage::open_readonly(&path).await?
    } else {
        Storage::open(&path).await?
    };
    Ok(storage)
}

/// Assemble the pipeline: Gemini backend, configured store, and journal.
async fn build_pipeline(
    config: &AppConfig,
    history_mode: Option<HistoryMode>,
) -> Result<Pipeline> {
    let api_key = validate_api_key(config)?;
    let backend = GeminiBackend::from_config(&config.gemini, api_key)?;
    let gateway = GenerationGateway::new(Arc::new(backend));

    let mut pipeline_config = PipelineConfig::from(config);
    if let Some(mode) = history_mode {
        pipeline_config.history_mode = mode;
    }

    Ok(match config.conversation.store {
        StoreKind::Database => {
            let storage = open_storage(config).await?;
            Pipeline::new(gateway, storage.clone(), pipeline_config).with_journal(storage)
        }
        StoreKind::Memory => {
            let locks = Arc::new(TopicLocks::new());
            let store = InMemoryConversationStore::new(RetentionPolicy::from(&config.conversation))
                .with_turn_locks(Arc::clone(&locks));
            Pipeline::new(gateway, Arc::new(store), pipeline_config).with_turn_locks(locks)
        }
    })
}

/// `history` reads the database. An in-memory store never outlives the run
/// that filled it, so there is nothing to show.
fn ensure_persistent_store(config: &AppConfig) -> socialflow_shared::Result<()> {
    match config.conversation.store {
        StoreKind::Database => Ok(()),
        StoreKind::Memory => Err(SocialFlowError::validation(
            "conversation.store is \"memory\"; history is only kept by the database store",
        )),
    }
}

/// Inline value, or the contents of `file`.
fn read_input(inline: Option<String>, file: Option<&Path>) -> Result<String> {
    match (inline, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => Ok(std::fs::read_to_string(path)
            .map_err(|e| SocialFlowError::io(path, e))?),
        (None, None) => Err(SocialFlowError::validation("no input given").into()),
    }
}

fn read_history(path: &Path) -> Result<Vec<HistoryEntry>> {
    let raw = std::fs::read_to_string(path).map_err(|e| SocialFlowError::io(path, e))?;
    let entries = serde_json::from_str(&raw).map_err(|e| {
        SocialFlowError::validation(format!("invalid history file {}: {e}", path.display()))
    })?;
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn progress(&self) -> Arc<dyn ProgressReporter> {
        if self.json {
            Arc::new(SilentProgress)
        } else {
            Arc::new(CliProgress::new())
        }
    }

    fn print_json(&self, value: &serde_json::Value) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, operation: Operation, stage: OperationStage) {
        match stage {
            OperationStage::Assembling => self
                .spinner
                .set_message(format!("Preparing {}", operation.as_str())),
            OperationStage::Generating => self.spinner.set_message("Waiting for Gemini"),
            OperationStage::Persisting => self.spinner.set_message("Saving conversation"),
            OperationStage::Done | OperationStage::Failed => self.spinner.finish_and_clear(),
        }
    }
}
