mod server;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use merch_contracts::tools::{all_tools, FormFields, ReferenceImage};
use merch_engine::assets::effective_mime;
use merch_engine::StudioEngine;
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "merch-studio", version, about = "Merch design studio server and tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP studio.
    Serve(ServeArgs),
    /// Generate one design from the command line.
    Generate(GenerateArgs),
    /// Print a tool's gallery, newest first.
    Designs(DesignsArgs),
    /// List the creator tools and their form fields.
    Tools,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
    #[arg(long)]
    tool: String,
    /// Form field as `name=value`; repeatable.
    #[arg(long = "field", value_parser = parse_field)]
    fields: Vec<(String, String)>,
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    aspect: Option<String>,
    #[arg(long)]
    reference: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct DesignsArgs {
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
    #[arg(long)]
    tool: String,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        tracing::error!("merch-studio failed: {err:#}");
        eprintln!("merch-studio error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Generate(args) => run_generate(args),
        Command::Designs(args) => run_designs(args),
        Command::Tools => {
            println!("{}", serde_json::to_string_pretty(all_tools())?);
            Ok(())
        }
    }
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let engine = Arc::new(StudioEngine::open(&args.data_dir)?);
    tracing::info!(data_dir = %args.data_dir.display(), "studio data directory ready");
    // Provider clients are blocking and live only inside spawn_blocking tasks.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(server::serve(engine, args.bind))
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let engine = StudioEngine::open(&args.data_dir)?;
    let mut form: FormFields = args.fields.into_iter().collect();
    if let Some(provider) = args.provider {
        form.insert("provider".to_string(), provider);
    }
    if let Some(aspect) = args.aspect {
        form.insert("aspect".to_string(), aspect);
    }
    let reference = args
        .reference
        .as_deref()
        .map(load_reference)
        .transpose()?;

    let design = engine
        .generate_design(&args.tool, &form, reference)
        .map_err(|err| anyhow!("{} error: {}", err.kind(), err.message()))?;
    println!("{}", serde_json::to_string_pretty(&json!({ "design": design }))?);
    Ok(())
}

fn run_designs(args: DesignsArgs) -> Result<()> {
    let engine = StudioEngine::open(&args.data_dir)?;
    let gallery = engine
        .gallery(&args.tool)
        .map_err(|err| anyhow!("{} error: {}", err.kind(), err.message()))?;
    println!("{}", serde_json::to_string_pretty(&gallery)?);
    Ok(())
}

fn load_reference(path: &Path) -> Result<ReferenceImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let declared = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    Ok(ReferenceImage {
        mime_type: effective_mime(&bytes, declared),
        file_name: path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string),
        bytes,
    })
}

fn parse_field(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("expected name=value, got '{raw}'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("field name is empty in '{raw}'");
    }
    Ok((name.to_string(), value.to_string()))
}
