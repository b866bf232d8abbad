// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

use yaetwai::app_config::{self, Config, TranslationProvider};
use yaetwai::app_controller::{Controller, describe_status};
use yaetwai::job::{JobOptions, Phase};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    #[value(name = "deepseek")]
    DeepSeek,
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
    #[value(name = "lmstudio")]
    LMStudio,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::DeepSeek => TranslationProvider::DeepSeek,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// Options shared by every book command
#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Output EPUB (or output folder when the input is a folder)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Source language code (e.g., 'en', 'ja')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'zh-CN', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// API key of the provider
    #[arg(short = 'k', long, env = "YAETWAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Configuration file path
    #[arg(short, long = "config", default_value = "conf.json")]
    config_path: String,

    /// Segments per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Concurrent documents, batches and requests
    #[arg(long)]
    max_workers: Option<usize>,

    /// Maximum characters per segment
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Discard the checkpoint and cache and start over
    #[arg(short, long)]
    force: bool,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Keep progress in memory only
    #[arg(long)]
    no_checkpoint: bool,
}

#[derive(Args, Debug, Clone)]
struct BookArgs {
    /// EPUB file or folder of EPUB files
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    #[command(flatten)]
    options: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse the book, write mirrors and divide it into batches
    Prepare(BookArgs),
    /// Collect terms that must stay untranslated
    Terminology(BookArgs),
    /// Translate prepared batches and write the translated book
    Translate(BookArgs),
    /// Prepare, analyse terminology and translate (default command)
    All(BookArgs),
    /// Show checkpoint progress of a book
    Status(BookArgs),
    /// Remove the checkpoint of a book
    Clear(BookArgs),
    /// Generate shell completions for yaetwai
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// YAETwAI - Yet Another E-book Translator with AI
///
/// Translates EPUB books with LLM providers, batch by batch, and resumes
/// interrupted runs from a checkpoint kept next to the book.
#[derive(Parser, Debug)]
#[command(name = "yaetwai")]
#[command(author = "YAETwAI Team")]
#[command(version)]
#[command(about = "AI-powered EPUB translation tool")]
#[command(long_about = "YAETwAI translates EPUB books using AI providers, keeping a checkpoint so that interrupted runs continue where they stopped.

EXAMPLES:
    yaetwai book.epub                          # Prepare, analyse terminology and translate
    yaetwai prepare book.epub                  # Only divide the book into batches
    yaetwai translate -t fr book.epub          # Translate prepared batches into French
    yaetwai -f book.epub                       # Start over, ignoring the checkpoint
    yaetwai status book.epub                   # Show progress of a book
    yaetwai -p anthropic -m claude-3-5-haiku-latest book.epub
    yaetwai --max-workers 8 /books/            # Process every EPUB in a folder
    yaetwai completions bash > yaetwai.bash    # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically.

WORKING DIRECTORY:
    Progress, caches and inspection files live in <book>_workdir next to the book.

SUPPORTED PROVIDERS:
    deepseek  - DeepSeek API (default, requires API key)
    openai    - OpenAI API (requires API key)
    anthropic - Anthropic Claude API (requires API key)
    lmstudio  - LM Studio local server (OpenAI-compatible on http://localhost:1234/v1)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// EPUB file or folder of EPUB files
    #[arg(value_name = "INPUT_PATH")]
    input_path: Option<PathBuf>,

    #[command(flatten)]
    options: RunArgs,
}

enum Action {
    Run(Phase),
    Status,
    Clear,
}

// @struct: Custom logger implementation
struct CustomLogger;

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour and marker for a level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("\x1B[1;31m", "✖"),
            Level::Warn => ("\x1B[1;33m", "⚠"),
            Level::Info => ("\x1B[1;32m", " "),
            Level::Debug => ("\x1B[1;36m", "·"),
            Level::Trace => ("\x1B[1;35m", "…"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (colour, marker) = Self::style_for_level(record.level());
            let _ = writeln!(std::io::stderr(), "{}{} {} {}\x1B[0m", colour, now, marker, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Info until the config or the command line says otherwise
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();
    let (action, args) = match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "yaetwai", &mut std::io::stdout());
            return Ok(());
        }
        Some(Commands::Prepare(args)) => (Action::Run(Phase::Prepare), args),
        Some(Commands::Terminology(args)) => (Action::Run(Phase::Terminology), args),
        Some(Commands::Translate(args)) => (Action::Run(Phase::Translate), args),
        Some(Commands::All(args)) => (Action::Run(Phase::All), args),
        Some(Commands::Status(args)) => (Action::Status, args),
        Some(Commands::Clear(args)) => (Action::Clear, args),
        None => {
            let input_path = cli
                .input_path
                .ok_or_else(|| anyhow!("INPUT_PATH is required when no subcommand is specified"))?;
            (Action::Run(Phase::All), BookArgs { input_path, options: cli.options })
        }
    };

    run(action, args).await
}

/// Load the config file and apply command line overrides
fn load_config(options: &RunArgs) -> Result<Config> {
    if let Some(level) = &options.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let (mut config, created) = Config::load_or_create(&options.config_path)?;
    if created {
        warn!("Config file not found at '{}', created a default one.", options.config_path);
    }

    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.set_model(model);
    }
    if let Some(api_key) = options.api_key.as_deref().filter(|k| !k.is_empty()) {
        config.set_api_key(api_key);
    }
    if let Some(source_language) = &options.source_language {
        config.source_language = source_language.clone();
    }
    if let Some(target_language) = &options.target_language {
        config.target_language = target_language.clone();
    }
    if let Some(batch_size) = options.batch_size {
        config.processing.batch_size = batch_size;
    }
    if let Some(max_workers) = options.max_workers {
        config.processing.max_workers = max_workers;
    }
    if let Some(chunk_size) = options.chunk_size {
        config.processing.chunk_size = chunk_size;
    }
    match &options.log_level {
        Some(level) => config.log_level = level.clone().into(),
        None => log::set_max_level(config.log_level.to_level_filter()),
    }
    Ok(config)
}

async fn run(action: Action, args: BookArgs) -> Result<()> {
    let options = &args.options;
    let config = load_config(options)?;
    let input = args.input_path.as_path();
    if !input.exists() {
        return Err(anyhow!("Input path does not exist: {:?}", input));
    }

    let phase = match action {
        Action::Status => return print_status(&Controller::with_config(config)?, input),
        Action::Clear => {
            Controller::with_config(config)?.clear(input, options.output.as_deref())?;
            info!("Checkpoint of {:?} removed", input);
            return Ok(());
        }
        Action::Run(phase) => phase,
    };

    if phase != Phase::Prepare {
        config.validate().context("Configuration validation failed")?;
    }

    let controller = Controller::with_config(config)?;
    let job_options = JobOptions {
        force: options.force,
        use_checkpoint: !options.no_checkpoint,
        show_progress: true,
    };

    tokio::select! {
        result = controller.run(phase, input, options.output.as_deref(), &job_options) => result,
        _ = shutdown_signal() => {
            warn!("Interrupted, saving progress before exit");
            controller.flush_current();
            std::process::exit(1);
        }
    }
}

fn print_status(controller: &Controller, input: &Path) -> Result<()> {
    let books = if input.is_dir() {
        yaetwai::file_utils::FileManager::find_files(input, "epub")?
    } else {
        vec![input.to_path_buf()]
    };
    for book in books {
        match controller.status(&book)? {
            Some(state) => println!("{}: {}", book.display(), describe_status(&state)),
            None => println!("{}: not started", book.display()),
        }
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
