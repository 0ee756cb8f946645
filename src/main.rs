use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotrender::config::DEFAULT_SETTINGS_FILE;
use dotrender::{GraphView, Pipeline, RenderConfig};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

#[derive(Parser, Debug)]
#[command(name = "dotrender")]
#[command(about = "Render GraphViz DOT graphs through an external layout engine", long_about = None)]
struct Args {
    /// Settings file (TOML key/value pairs) [default: ./dotrender.toml if present]
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Log every pipeline step
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Render to an in-memory image and save it as PNG (blank placeholder on failure)
    View {
        /// DOT file, or '-' for stdin
        input: Option<PathBuf>,
        #[arg(long, short = 'o')]
        output: PathBuf,
    },
    /// Render to a file in the given format
    Export {
        /// DOT file, or '-' for stdin
        input: Option<PathBuf>,
        /// Renderer output format (e.g. png, svg, pdf)
        #[arg(long = "format", short = 'T')]
        format: String,
        #[arg(long, short = 'o')]
        output: PathBuf,
    },
    /// Render to a file in the renderer's default format
    Save {
        /// DOT file, or '-' for stdin
        input: Option<PathBuf>,
        #[arg(long, short = 'o')]
        output: PathBuf,
    },
    /// Run the renderer on an existing DOT file
    Generate {
        dot_file: PathBuf,
        #[arg(long = "format", short = 'T')]
        format: Option<String>,
        #[arg(long, short = 'o')]
        output: PathBuf,
    },
    /// Write the DOT text to a file
    SaveDot {
        /// DOT file, or '-' for stdin
        input: Option<PathBuf>,
        #[arg(long, short = 'o')]
        output: PathBuf,
    },
    /// Print the effective configuration as JSON
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_filter = init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => RenderConfig::from_file(path),
        None if Path::new(DEFAULT_SETTINGS_FILE).exists() => {
            RenderConfig::from_file(DEFAULT_SETTINGS_FILE)
        }
        None => RenderConfig::defaults(),
    };
    if config.debug() && std::env::var_os("RUST_LOG").is_none() {
        if let Err(err) = log_filter.modify(|filter| *filter = EnvFilter::new("debug")) {
            warn!("Failed to enable debug logging: {}", err);
        }
    }
    let pipeline = Pipeline::new(&config);

    match args.command {
        Cmd::View { input, output } => {
            let dotty = read_input(input.as_deref())?;
            let mut view = GraphView::new(&pipeline);
            view.set_dotty(&pipeline, dotty);
            if view.image().is_none() {
                warn!("Rendering failed, writing blank placeholder (run with --verbose for details)");
            }
            view.paint()
                .save_with_format(&output, image::ImageFormat::Png)
                .with_context(|| format!("Failed to write {}", output.display()))?;
        }
        Cmd::Export { input, format, output } => {
            let dotty = read_input(input.as_deref())?;
            pipeline
                .export(&dotty, &format, &output)
                .context("Export failed")?;
            info!("Wrote {}", output.display());
        }
        Cmd::Save { input, output } => {
            let dotty = read_input(input.as_deref())?;
            pipeline
                .save_image(&dotty, &output)
                .context("Failed to save image")?;
            info!("Wrote {}", output.display());
        }
        Cmd::Generate { dot_file, format, output } => {
            pipeline
                .generate_graph(&dot_file, format.as_deref(), &output)
                .context("Failed to generate graph")?;
            info!("Wrote {}", output.display());
        }
        Cmd::SaveDot { input, output } => {
            let dotty = read_input(input.as_deref())?;
            pipeline
                .save_dotty(&dotty, &output)
                .context("Failed to save dotty")?;
        }
        Cmd::Config => {
            let json = serde_json::to_string_pretty(&config.snapshot())
                .context("Failed to serialize configuration")?;
            println!("{}", json);
        }
    }

    Ok(())
}

/// Install the stderr subscriber. `RUST_LOG` takes precedence over `--verbose`;
/// the returned handle lets the settings file raise the level afterwards.
fn init_logging(verbose: bool) -> reload::Handle<EnvFilter, Registry> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).without_time())
        .init();

    handle
}

/// Read DOT text from a file, or from stdin when no file (or '-') is given
fn read_input(input: Option<&Path>) -> Result<String> {
    let dotty = match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        _ => {
            let mut dotty = String::new();
            io::stdin()
                .read_to_string(&mut dotty)
                .context("Failed to read DOT from stdin")?;
            dotty
        }
    };

    Ok(strip_line_ending(&dotty).to_string())
}

/// Drop one trailing line ending; the pipeline appends its own newline
fn strip_line_ending(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}
