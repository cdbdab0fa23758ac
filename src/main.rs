//! CLI entry point for vindex.
//!
//! Indexes image folders and answers image, text and match queries against
//! an embedded or remote vector store.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vindex::display::{self, THEME};
use vindex::encoder::{ClipEncoder, Encoder, ImageInput};
use vindex::engine::{SearchEngine, image_text_similarity};
use vindex::io::{ExitCode, OutputFormat, OutputManager};
use vindex::store::{Collection, open_store};
use vindex::{Settings, VindexError, VindexResult};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Multimodal image search
#[derive(Parser)]
#[command(
    name = "vindex",
    version = env!("CARGO_PKG_VERSION"),
    about = "Search images by image or by text",
    long_about = "Index image folders with a CLIP-style encoder and search them by example image or by natural language.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Examples:\n  vindex index --folder ./photos --recursive\n  vindex search-text --query \"a cat on a sofa\" --top-k 5\n  vindex search-image --query ./query.jpg\n  vindex match --image ./cat.jpg --text \"a cat\""
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Encoder model name (see `vindex models`)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Embedded store directory
    #[arg(long, global = true, conflicts_with = "host")]
    store_uri: Option<PathBuf>,

    /// Remote vindex server host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Remote vindex server port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Collection name
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Emit results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging (repeat for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Index every supported image in a folder
    Index {
        /// Folder to scan
        #[arg(long)]
        folder: PathBuf,

        /// Descend into subdirectories
        #[arg(long)]
        recursive: bool,

        /// Stay in the top folder even if the config enables recursion
        #[arg(long, conflicts_with = "recursive")]
        no_recursive: bool,

        /// Images per encode/insert batch (overrides config)
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Find images similar to an image
    SearchImage {
        /// Query image path
        #[arg(long)]
        query: PathBuf,

        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum score, inclusive
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Find images matching a text description
    SearchText {
        /// Query text
        #[arg(long)]
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum score, inclusive
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Score how well an image matches a text, in [0, 1]
    Match {
        #[arg(long)]
        image: PathBuf,

        #[arg(long)]
        text: String,
    },

    /// Set up .vindex directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display effective settings as TOML
    Config,

    /// List available encoder models
    Models,

    /// Show backend, dimension, metric and record count of the collection
    Info,

    /// Delete the collection and all its records
    Drop {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Serve the embedded store over HTTP for remote clients
    #[cfg(feature = "http-server")]
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let mut output = OutputManager::new(OutputFormat::from_json_flag(cli.json));

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => return report(&mut output, &e),
    };
    init_tracing(&settings, cli.verbose);

    match run(cli.command, settings, &mut output) {
        Ok(code) => code.into(),
        Err(e) => report(&mut output, &e),
    }
}

/// Layers CLI flags over file and environment settings.
fn load_settings(cli: &Cli) -> VindexResult<Settings> {
    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let mut settings =
        loaded.map_err(|e| VindexError::config(format!("cannot load settings: {e}")))?;

    if let Some(model) = &cli.model {
        settings.model.name = model.clone();
    }
    if let Some(uri) = &cli.store_uri {
        settings.store.uri = Some(uri.clone());
        settings.store.host = None;
    }
    if let Some(host) = &cli.host {
        settings.store.host = Some(host.clone());
        settings.store.uri = None;
    }
    if let Some(port) = cli.port {
        settings.store.port = port;
    }
    if let Some(collection) = &cli.collection {
        settings.store.collection = collection.clone();
    }

    settings.validate()?;
    Ok(settings)
}

fn init_tracing(settings: &Settings, verbose: u8) {
    let level = match verbose {
        0 if settings.debug => "debug",
        0 => settings.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose == 0 {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn report(output: &mut OutputManager, error: &VindexError) -> std::process::ExitCode {
    output
        .error(error)
        .unwrap_or_else(|_| ExitCode::from_error(error))
        .into()
}

/// Stdout closed early (e.g. piped into `head`) is not a failure.
fn emit(result: io::Result<ExitCode>) -> VindexResult<ExitCode> {
    match result {
        Ok(code) => Ok(code),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(ExitCode::Success),
        Err(e) => Err(VindexError::io("<stdout>", e)),
    }
}

fn run(command: Commands, settings: Settings, output: &mut OutputManager) -> VindexResult<ExitCode> {
    match command {
        Commands::Init { force } => {
            let dir = std::env::current_dir().map_err(|e| VindexError::io(".", e))?;
            let path = Settings::init_config_file(&dir, force)?;
            eprintln!(
                "{}",
                THEME.success_with_icon(&format!("Created configuration file at {}", path.display()))
            );
            Ok(ExitCode::Success)
        }

        Commands::Config => emit(output.raw(&settings.to_toml()?)),

        Commands::Models => emit(output.raw(&display::models_table())),

        Commands::Info => {
            let store = open_store(&settings.store, settings.indexing.parallel_threads)?;
            let collection = Collection::new(store, &settings.store.collection)?;
            let info = collection.info()?;
            emit(output.collection_info(&info, &collection.location()))
        }

        Commands::Drop { yes } => {
            if !yes {
                return Err(VindexError::config(format!(
                    "refusing to drop collection '{}' without --yes",
                    settings.store.collection
                )));
            }
            let store = open_store(&settings.store, settings.indexing.parallel_threads)?;
            let collection = Collection::new(store, &settings.store.collection)?;
            let name = collection.name().to_string();
            collection.drop()?;
            eprintln!("{}", THEME.success_with_icon(&format!("Dropped collection '{name}'")));
            Ok(ExitCode::Success)
        }

        Commands::Match { image, text } => {
            let encoder = load_encoder(&settings)?;
            let score = image_text_similarity(encoder.as_ref(), &ImageInput::path(image), &text)?;
            emit(output.similarity(score))
        }

        Commands::Index {
            folder,
            recursive,
            no_recursive,
            batch_size,
        } => {
            let batch_size = batch_size.unwrap_or(settings.indexing.batch_size);
            let recursive = settings
                .indexing
                .recursive_with(recursive_flag(recursive, no_recursive));
            let bar = display::create_progress_bar(0, "indexing");
            let engine = build_engine(&settings)?
                .with_progress(display::index_progress_callback(bar.clone()));
            let result = engine.index_folder(&folder, recursive, batch_size);
            bar.finish_and_clear();
            let report = result?;
            debug!(batches = report.batches, "indexing finished");
            emit(output.index_report(&report))
        }

        Commands::SearchImage {
            query,
            top_k,
            threshold,
        } => {
            let engine = build_engine(&settings)?;
            let results = engine.search_by_image(
                &ImageInput::path(query),
                top_k.unwrap_or(settings.search.top_k),
                threshold.unwrap_or(settings.search.threshold),
            )?;
            emit(output.search_results(&results))
        }

        Commands::SearchText {
            query,
            top_k,
            threshold,
        } => {
            let engine = build_engine(&settings)?;
            let results = engine.search_by_text(
                &query,
                top_k.unwrap_or(settings.search.top_k),
                threshold.unwrap_or(settings.search.threshold),
            )?;
            emit(output.search_results(&results))
        }

        #[cfg(feature = "http-server")]
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
            let uri = match settings.store.backend()? {
                vindex::config::StoreBackend::Embedded { uri } => uri,
                vindex::config::StoreBackend::Remote { .. } => {
                    return Err(VindexError::config(
                        "serve exposes an embedded store, use --store-uri instead of --host",
                    ));
                }
            };
            serve_blocking(
                &uri,
                settings.indexing.parallel_threads,
                &bind,
                settings.server.max_body_bytes,
            )?;
            Ok(ExitCode::Success)
        }
    }
}

fn recursive_flag(recursive: bool, no_recursive: bool) -> Option<bool> {
    match (recursive, no_recursive) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn load_encoder(settings: &Settings) -> VindexResult<Arc<dyn Encoder>> {
    let encoder = display::with_spinner(
        &format!("Loading model {}", settings.model.name),
        || ClipEncoder::from_config(&settings.model),
    )?;
    Ok(Arc::new(encoder))
}

fn build_engine(settings: &Settings) -> VindexResult<SearchEngine> {
    let encoder = load_encoder(settings)?;
    let store = open_store(&settings.store, settings.indexing.parallel_threads)?;
    Ok(SearchEngine::new(
        encoder,
        store,
        &settings.store.collection,
        settings.store.metric,
    )?
    .with_extensions(settings.normalized_extensions())
    .with_id_strategy(settings.indexing.id_strategy))
}

/// The CLI is synchronous; a runtime exists only for the server.
#[cfg(feature = "http-server")]
fn serve_blocking(
    uri: &std::path::Path,
    threads: usize,
    bind: &str,
    max_body_bytes: usize,
) -> VindexResult<()> {
    let store: Arc<dyn vindex::VectorStore> =
        Arc::new(vindex::EmbeddedStore::open(uri, threads)?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| VindexError::backend("serve", e))?;
    runtime
        .block_on(vindex::server::serve(store, bind, max_body_bytes))
        .map_err(|e| VindexError::backend("serve", format!("{e:#}")))
}
