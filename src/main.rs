use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hybridfind::output::ResultPrinter;
use hybridfind::query::{MediaType, QueryBuilder, Range, SortOrder};
use hybridfind::search::{SearchItem, Searcher};
use hybridfind::utils::SearchConfig;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "hybridfind")]
#[command(about = "File search that asks the index first and scans the rest")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log progress and fallback decisions
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search one or more roots
    Search(SearchArgs),
    /// Check whether the index covers a directory
    Probe {
        /// Directory to check
        root: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct SearchArgs {
    /// Directories to search in
    #[arg(required_unless_present = "exact", conflicts_with = "exact")]
    roots: Vec<PathBuf>,

    /// Look up exactly this path instead of searching roots
    #[arg(long)]
    exact: Option<PathBuf>,

    /// Exact file name
    #[arg(long)]
    name: Option<String>,

    /// Name must contain every whitespace-separated word
    #[arg(short, long)]
    substring: Option<String>,

    /// Document text (index only)
    #[arg(long)]
    contains: Option<String>,

    /// Only images
    #[arg(long, conflicts_with = "videos")]
    images: bool,

    /// Only videos
    #[arg(long)]
    videos: bool,

    /// Total pixel range, MIN:MAX (index only)
    #[arg(long, value_name = "MIN:MAX")]
    pixels: Option<Range<u64>>,

    /// Aspect ratio range, MIN:MAX (index only)
    #[arg(long, value_name = "MIN:MAX")]
    aspect: Option<Range<f64>>,

    /// Only files
    #[arg(long, conflicts_with = "dirs_only")]
    files_only: bool,

    /// Only directories
    #[arg(long)]
    dirs_only: bool,

    /// Don't descend into subdirectories
    #[arg(long)]
    no_recurse: bool,

    /// Sort by name, modified or size; prefix with '-' for descending
    #[arg(long, value_name = "KEY", allow_hyphen_values = true)]
    order: Option<SortOrder>,

    /// Index timeout in seconds (0 = none). Without it a timeout is an error.
    #[arg(long)]
    timeout: Option<u64>,

    /// Print JSON lines
    #[arg(long)]
    json: bool,

    /// Fallback scan workers
    #[arg(long)]
    workers: Option<usize>,

    /// Skip the index and scan everything
    #[arg(long)]
    no_index: bool,

    /// Disable colors
    #[arg(long)]
    no_color: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let mut config = SearchConfig::load()?;

    match cli.command {
        Commands::Search(args) => {
            if let Some(workers) = args.workers {
                config.scan_workers = workers;
            }
            run_search(args, config)?;
        }
        Commands::Probe { root } => {
            let root = absolute(&root)?;
            let covered = searcher(config, false).probe(&root)?;
            if covered {
                println!("{} is indexed", root.display());
            } else {
                println!("{} is not indexed", root.display());
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn run_search(args: SearchArgs, config: SearchConfig) -> Result<()> {
    let mut builder = QueryBuilder::new()
        .recurse(!args.no_recurse)
        .include_files(!args.dirs_only)
        .include_dirs(!args.files_only);

    match &args.exact {
        Some(path) => builder = builder.exact_path(absolute(path)?),
        None => {
            for root in &args.roots {
                builder = builder.root(absolute(root)?);
            }
        }
    }
    if let Some(name) = args.name {
        builder = builder.filename(name);
    }
    if let Some(substring) = args.substring {
        builder = builder.substring(substring);
    }
    if let Some(text) = args.contains {
        builder = builder.content_text(text);
    }
    if args.images {
        builder = builder.media_type(MediaType::Images);
    } else if args.videos {
        builder = builder.media_type(MediaType::Videos);
    }
    if let Some(range) = args.pixels {
        builder = builder.total_pixels(range);
    }
    if let Some(range) = args.aspect {
        builder = builder.aspect_ratio(range);
    }
    if let Some(order) = args.order {
        builder = builder.order(order);
    }
    if let Some(secs) = args.timeout {
        builder = builder.timeout_secs(secs);
    }
    let query = builder.build()?;

    let searcher = searcher(config, args.no_index);
    let mut printer = ResultPrinter::stdout(!args.no_color, args.json);

    for item in searcher.search(&query)? {
        let written = match item? {
            SearchItem::Entry(entry) => printer.print_entry(&entry),
            SearchItem::Timeout => printer.print_timeout(),
        };
        match written {
            Ok(()) => {}
            // Reader went away (e.g. piped into head)
            Err(e) if e.kind() == ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }

    printer.flush()?;
    log::debug!("{} results", printer.printed());
    Ok(())
}

#[cfg(unix)]
fn searcher(config: SearchConfig, no_index: bool) -> Searcher {
    use hybridfind::backend::SocketBackend;
    use std::sync::Arc;

    let searcher = if no_index {
        Searcher::without_index()
    } else {
        Searcher::new(Arc::new(SocketBackend::from_config(&config)))
    };
    searcher.with_config(config)
}

#[cfg(not(unix))]
fn searcher(config: SearchConfig, _no_index: bool) -> Searcher {
    Searcher::without_index().with_config(config)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path: {}", path.display()))
}
