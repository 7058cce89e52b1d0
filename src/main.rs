use clap::{ArgAction, Parser};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use xmlpipe::{Parameters, PipelineConfig, PipelineDeclaration, Request, StageRegistry};

#[derive(Parser)]
#[command(name = "xmlpipe")]
#[command(about = "Run declared XML pipelines: generator, transformers, serializer")]
#[command(version = "0.1.0")]
struct Args {
    /// Pipeline declaration (YAML)
    #[arg(short = 'f', long = "file", value_name = "PIPELINE")]
    pipeline_file: PathBuf,

    /// Request parameter, available to declarations as {KEY}
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", action = ArgAction::Append)]
    params: Vec<String>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long = "output")]
    output_file: Option<PathBuf>,

    /// Stream output through a buffer of N bytes instead of buffering the complete response
    #[arg(long, value_name = "N")]
    buffer_size: Option<usize>,

    /// Print the event pipeline cache key and validity to stderr
    #[arg(long)]
    print_key: bool,

    /// Debug mode - log pipeline lifecycle and show statistics
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn validate(&self) -> Result<(), String> {
        if self.buffer_size == Some(0) {
            return Err("--buffer-size must be greater than 0".to_string());
        }
        for param in &self.params {
            match param.split_once('=') {
                Some((key, _)) if !key.trim().is_empty() => {}
                _ => return Err(format!("Invalid parameter '{}', expected KEY=VALUE", param)),
            }
        }
        Ok(())
    }

    fn parameters(&self) -> Parameters {
        self.params
            .iter()
            .filter_map(|param| param.split_once('='))
            .map(|(key, value)| (key.trim(), value))
            .collect()
    }
}

fn init_tracing(debug: bool) {
    // RUST_LOG wins over --debug
    let default_level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    init_tracing(args.debug);

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let declaration = PipelineDeclaration::from_file(&args.pipeline_file)?;

    let config = match args.buffer_size {
        Some(size) => PipelineConfig::streaming(size),
        None => PipelineConfig::default(),
    };
    let registry = Arc::new(StageRegistry::with_builtins());
    let mut pipeline = declaration.assemble(registry, config)?;

    // Set up output
    let output: Box<dyn Write> = if let Some(output_path) = &args.output_file {
        let file = File::create(output_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create output file '{}': {}",
                output_path.display(),
                e
            )
        })?;
        Box::new(file)
    } else {
        Box::new(io::stdout())
    };
    let mut request = Request::with_parameters(output, args.parameters());

    pipeline.prepare(&request)?;

    if args.print_key {
        match pipeline.key_for_event_pipeline() {
            Some(key) => eprintln!("key: {}", key),
            None => eprintln!("key: (uncacheable)"),
        }
        match pipeline.validity_for_event_pipeline() {
            Some(validity) => eprintln!("validity: {:?}", validity.is_valid()),
            None => eprintln!("validity: (uncacheable)"),
        }
    }

    let mime_type = pipeline.mime_type().map(str::to_string);
    let stats = pipeline.execute(&mut request)?;
    let content_length = request.content_length();
    request.into_output().flush()?;

    if args.debug {
        eprintln!("Final statistics:");
        eprintln!("  Content type: {}", mime_type.as_deref().unwrap_or("-"));
        if let Some(length) = content_length {
            eprintln!("  Content length: {}", length);
        }
        eprintln!("  Events: {}", stats.events);
        eprintln!("  Bytes written: {}", stats.bytes_written);
        eprintln!("  Error pipeline used: {}", stats.substituted);
        eprintln!("  Processing time: {:?}", stats.processing_time);
    }

    Ok(())
}
