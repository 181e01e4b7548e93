//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest extraction engine.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_harvest::config::{load_config_with_hash, parse_api_keys, Config, API_KEYS_ENV};
use sumi_harvest::crawler::{CrawlConfig, Crawler};
use sumi_harvest::extract::{Extractor, ExtractorSettings};
use sumi_harvest::inference::{CredentialPool, InferenceClient};
use sumi_harvest::output::{generate_markdown_report, print_run_summary};
use sumi_harvest::render::{build_http_client, RenderSession, StaticHtmlRenderer};
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: structured facts from live web pages
///
/// Extracts data for a query through an ordered fallback chain (direct API,
/// rendered DOM, inference over page text, proxy relay) or crawls a site
/// breadth-first, extracting every visited page.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version)]
#[command(about = "Structured fact extraction from live web pages", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract structured data for a query from the configured targets
    Extract {
        /// Natural-language query, e.g. "bitcoin price"
        query: String,

        /// Ask the inference service before trying targets
        #[arg(long)]
        inference_first: bool,
    },

    /// Crawl a site breadth-first and extract every visited page
    Crawl(CrawlArgs),

    /// List configured targets and which of them match a query
    Targets {
        /// Optional query to check relevance against
        query: Option<String>,
    },
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Start URL
    url: String,

    /// Maximum number of pages to visit
    #[arg(long)]
    max_pages: Option<u32>,

    /// Maximum link distance from the start URL
    #[arg(long)]
    depth_limit: Option<u32>,

    /// Pause after each page (milliseconds)
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Only follow links containing this substring (repeatable)
    #[arg(long = "include", value_name = "PATTERN")]
    include: Vec<String>,

    /// Never follow links containing this substring (repeatable)
    #[arg(long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Follow links to other hosts
    #[arg(long)]
    external: bool,

    /// Write a markdown report of the run to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Print the full run result as JSON instead of the summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let mut config = load_configuration(cli.config.as_deref())?;
    if let Ok(raw) = std::env::var(API_KEYS_ENV) {
        let keys = parse_api_keys(&raw);
        tracing::info!("Using {} API key(s) from {}", keys.len(), API_KEYS_ENV);
        config.inference.api_keys = keys;
    }

    let result = match cli.command {
        Command::Extract {
            query,
            inference_first,
        } => {
            if inference_first {
                config.extraction.inference_first = true;
            }
            handle_extract(&config, &query).await
        }
        Command::Crawl(args) => handle_crawl(&config, args).await,
        Command::Targets { query } => handle_targets(&config, query.as_deref()),
    };

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load_configuration(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        tracing::info!("No configuration file given, using defaults");
        return Ok(Config::default());
    };

    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok(config)
}

/// Wires the HTTP client, static renderer and inference client into an extractor
fn build_extractor(config: &Config) -> anyhow::Result<Extractor> {
    let settings: ExtractorSettings = config.extraction.settings();
    let http = build_http_client(&config.extraction.user_agent, settings.method_timeout)
        .context("Failed to build HTTP client")?;

    let renderer_http = http.clone();
    let session = RenderSession::connect(
        move |tx| StaticHtmlRenderer::new(renderer_http, tx),
        config.extraction.settle_delay(),
    );

    let pool = CredentialPool::new(
        config.inference.api_keys.clone(),
        config.inference.rate_limit_threshold,
    );
    if pool.is_empty() {
        tracing::warn!(
            "No inference credentials configured; inference steps answer offline (set {})",
            API_KEYS_ENV
        );
    }
    let inference = InferenceClient::new(http.clone(), config.inference.settings(), Arc::new(pool));

    Ok(Extractor::new(http, settings)
        .with_targets(config.extraction_targets())
        .with_session(Arc::new(session))
        .with_inference(inference))
}

async fn handle_extract(config: &Config, query: &str) -> anyhow::Result<()> {
    let extractor = build_extractor(config)?;
    tracing::info!(
        "Extracting '{}' across {} target(s)",
        query,
        extractor.targets().len()
    );

    let result = extractor.extract(query).await?;
    if result.is_placeholder() {
        tracing::warn!("All sources failed; returning sample data");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn handle_crawl(config: &Config, args: CrawlArgs) -> anyhow::Result<()> {
    let mut crawl = CrawlConfig::from_settings(&args.url, &config.crawler);
    if let Some(max_pages) = args.max_pages {
        crawl.max_pages = max_pages;
    }
    if let Some(depth_limit) = args.depth_limit {
        crawl.depth_limit = depth_limit;
    }
    if let Some(delay_ms) = args.delay_ms {
        crawl.delay_between_requests_ms = delay_ms;
    }
    if !args.include.is_empty() {
        crawl.url_include_patterns = args.include;
    }
    if !args.exclude.is_empty() {
        crawl.url_exclude_patterns = args.exclude;
    }
    if args.external {
        crawl.follow_external_links = true;
    }
    anyhow::ensure!(crawl.max_pages > 0, "--max-pages must be at least 1");

    let crawler = Crawler::new(build_extractor(config)?);

    let stopper = crawler.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current page");
            stopper.stop();
        }
    });

    let run = crawler.start(crawl).await;
    ctrl_c.abort();
    let run = run?;

    if let Some(path) = &args.report {
        generate_markdown_report(&run, path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!("Report written to: {}", path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run_summary(&run);
    }
    Ok(())
}

/// Dry-run listing of the configured targets
fn handle_targets(config: &Config, query: Option<&str>) -> anyhow::Result<()> {
    let targets = config.extraction_targets();
    println!("=== Configured Targets ({}) ===\n", targets.len());

    for target in &targets {
        let relevance = match query {
            Some(q) if target.matches_query(q) => " [matches]",
            _ => "",
        };
        println!("- {}{}", target.display_name, relevance);
        println!("    url: {}", target.url);
        println!("    domain: {}", target.data_domain());
        if !target.keywords.is_empty() {
            println!("    keywords: {}", target.keywords.join(", "));
        }
        for api in &target.fallback_api_urls {
            println!("    api: {}", api);
        }
        for (name, spec) in &target.field_selectors {
            println!("    field {}: {}", name, spec.selector);
        }
        println!(
            "    ai-assist: {}, proxy: {}",
            target.ai_assist, target.use_proxy
        );
    }

    if let Some(q) = query {
        let matching = targets.iter().filter(|t| t.matches_query(q)).count();
        println!("\n{} of {} target(s) match '{}'", matching, targets.len(), q);
    }

    Ok(())
}
