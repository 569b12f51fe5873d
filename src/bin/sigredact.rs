//! HTTP server binary for edgequake-sigredact.
//!
//! A thin shim over the library crate that maps CLI flags to `RedactConfig`,
//! starts the expiry sweeper and serves the router.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_sigredact::{http, CollisionPolicy, RedactConfig, Redactor};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default port with automatic detection from OPENAI_API_KEY
  sigredact

  # Manual-only workflow (no detector), custom port and DPI
  sigredact --no-detect --port 8080 --dpi 200

  # Use a specific vision model
  sigredact --provider anthropic --model claude-sonnet-4-20250514

API:
  POST /api/redact/analyze        multipart, one file field per PDF
  POST /api/redact/confirm        JSON {documents:[{id, filename, pages:[{page_index, boxes}]}]}
  GET  /api/redact/pages/:id/:i   page preview PNG (until confirm or expiry)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Log filter, overrides --verbose
"#;

/// Signature redaction server.
#[derive(Parser, Debug)]
#[command(
    name = "sigredact",
    version,
    about = "Detect and irreversibly redact handwritten signatures in PDF documents",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "SIGREDACT_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "SIGREDACT_PORT", default_value_t = 3000)]
    port: u16,

    /// Rendering DPI (72–400).
    #[arg(long, env = "SIGREDACT_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Longest rendered page edge in pixels.
    #[arg(long, env = "SIGREDACT_MAX_PIXELS", default_value_t = 4000)]
    max_pixels: u32,

    /// Documents processed concurrently per batch.
    #[arg(short, long, env = "SIGREDACT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Parent directory for workspaces (default: system temp dir).
    #[arg(long, env = "SIGREDACT_WORKSPACE_ROOT")]
    workspace_root: Option<PathBuf>,

    /// Seconds before an unconfirmed workspace is swept.
    #[arg(long, env = "SIGREDACT_WORKSPACE_TTL", default_value_t = 3600)]
    workspace_ttl: u64,

    /// Seconds between expiry sweeps.
    #[arg(long, env = "SIGREDACT_SWEEP_INTERVAL", default_value_t = 300)]
    sweep_interval: u64,

    /// Fill colour as hex RGB, e.g. 000000.
    #[arg(long, env = "SIGREDACT_FILL", default_value = "000000", value_parser = parse_hex_rgb)]
    fill: [u8; 3],

    /// Handling of duplicate archive entry names.
    #[arg(long, env = "SIGREDACT_COLLISIONS", value_enum, default_value = "suffix")]
    collisions: CollisionArg,

    /// Drop detections below this confidence (0–1).
    #[arg(long, env = "SIGREDACT_MIN_CONFIDENCE", default_value_t = 0.0)]
    min_confidence: f64,

    /// Per-page detector timeout in seconds.
    #[arg(long, env = "SIGREDACT_DETECT_TIMEOUT", default_value_t = 60)]
    detect_timeout: u64,

    /// Maximum upload body size in bytes.
    #[arg(long, env = "SIGREDACT_MAX_UPLOAD", default_value_t = 100 * 1024 * 1024)]
    max_upload: usize,

    /// PDF user password for encrypted uploads.
    #[arg(long, env = "SIGREDACT_PASSWORD")]
    password: Option<String>,

    /// Explicit pdfium library path.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Vision model ID (e.g. gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Disable automatic detection; every box is drawn by the caller.
    #[arg(long, env = "SIGREDACT_NO_DETECT")]
    no_detect: bool,

    /// Retries per page on detector failure.
    #[arg(long, env = "SIGREDACT_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SIGREDACT_VERBOSE")]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CollisionArg {
    Suffix,
    Overwrite,
}

impl From<CollisionArg> for CollisionPolicy {
    fn from(v: CollisionArg) -> Self {
        match v {
            CollisionArg::Suffix => CollisionPolicy::Suffix,
            CollisionArg::Overwrite => CollisionPolicy::Overwrite,
        }
    }
}

fn parse_hex_rgb(s: &str) -> Result<[u8; 3], String> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(format!("expected 6 hex digits, got '{s}'"));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("invalid hex '{s}': {e}"))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else {
        "info,tower_http=debug"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut builder = RedactConfig::builder()
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .concurrency(cli.concurrency)
        .workspace_ttl_secs(cli.workspace_ttl)
        .sweep_interval_secs(cli.sweep_interval)
        .fill_color(cli.fill)
        .collision_policy(cli.collisions.into())
        .min_confidence(cli.min_confidence)
        .detection_timeout_secs(cli.detect_timeout)
        .max_upload_bytes(cli.max_upload)
        .max_retries(cli.max_retries);
    if let Some(root) = cli.workspace_root {
        builder = builder.workspace_root(root);
    }
    if let Some(pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }
    if let Some(model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    let config = builder.build().context("invalid configuration")?;

    let redactor = if cli.no_detect {
        info!("Automatic detection disabled by --no-detect");
        Redactor::new(
            config.clone(),
            Arc::new(edgequake_sigredact::PdfiumRenderer::new(
                config.pdfium_lib_path.clone(),
            )),
            Arc::new(edgequake_sigredact::NoopDetector),
        )
    } else {
        Redactor::from_config(config)
    }
    .context("failed to start redaction service")?;
    let redactor = Arc::new(redactor);

    info!(
        "Workspaces under {}",
        redactor.store().root().display()
    );
    let sweeper = redactor.spawn_sweeper();

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, http::router(Arc::clone(&redactor)))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await
        .context("server error")?;

    sweeper.abort();
    Ok(())
}
