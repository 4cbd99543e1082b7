use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proxy_sieve::{
    collect_candidates,
    progress::LogProgress,
    proxy::{Candidate, Dispatcher, ProxyCrawler, ProxyParser, ProxySource, ProxyType, RunSummary},
    tui, Config, ResultStore,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// File in the output directory receiving logs while the TUI owns the terminal
const TUI_LOG_FILE: &str = "proxy-sieve.log";

/// Scrapes public proxy lists and keeps the proxies that actually work
#[derive(Parser)]
#[command(name = "proxy-sieve")]
#[command(about = "Scrapes public proxy lists and keeps the proxies that actually work")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to ./proxy-sieve.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for http.txt, https.txt, socks4.txt and socks5.txt
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Number of proxies checked at once
    #[arg(short = 'n', long, global = true)]
    concurrency: Option<usize>,

    /// Timeout in seconds for a single probe attempt
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// URL to test proxies against
    #[arg(long, global = true)]
    test_url: Option<String>,

    /// Show an interactive progress view
    #[arg(long, global = true)]
    tui: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape sources and check every proxy found (the default)
    Run {
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// Scrape sources and print or save the candidates without checking them
    Crawl {
        #[command(flatten)]
        sources: SourceArgs,
        /// Output file for crawled candidates
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Check proxies listed in a file
    Check {
        /// Input file containing proxies
        input: PathBuf,
        /// Protocol for lines without a scheme (http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: ProxyType,
    },
}

#[derive(clap::Args, Default)]
struct SourceArgs {
    /// URLs to crawl proxies from (can specify multiple)
    #[arg(short, long)]
    url: Vec<String>,
    /// File containing list of URLs to crawl (one URL per line)
    #[arg(short = 'f', long)]
    url_file: Option<PathBuf>,
    /// Skip the built-in list of public proxy sites
    #[arg(long)]
    no_common_sources: bool,
}

impl SourceArgs {
    fn sources(&self, config: &Config) -> Result<Vec<ProxySource>> {
        let mut sources = if self.no_common_sources {
            config.sources.iter().map(|s| s.to_source()).collect()
        } else {
            config.sources()
        };

        let mut urls = self.url.clone();
        if let Some(file_path) = &self.url_file {
            urls.extend(read_url_file(file_path)?);
        }
        sources.extend(urls.iter().map(|url| ProxySource::from_url(url)));

        Ok(sources)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(n) = cli.concurrency {
        config.concurrency = n;
    }
    if let Some(secs) = cli.timeout {
        config.probe_timeout_secs = secs;
    }
    if let Some(url) = &cli.test_url {
        config.test_url = url.clone();
    }

    let use_tui = cli.tui && !matches!(cli.command, Some(Commands::Crawl { .. }));
    init_logging(cli.verbose, use_tui.then(|| config.output_dir.join(TUI_LOG_FILE)).as_deref())?;

    match cli.command {
        None => {
            let sources = SourceArgs::default().sources(&config)?;
            let candidates = scrape(&config, &sources).await?;
            check(&config, candidates, use_tui).await?;
        }
        Some(Commands::Run { sources }) => {
            let sources = sources.sources(&config)?;
            let candidates = scrape(&config, &sources).await?;
            check(&config, candidates, use_tui).await?;
        }
        Some(Commands::Crawl { sources, save }) => {
            let sources = sources.sources(&config)?;
            let candidates = scrape(&config, &sources).await?;

            println!("\nTotal unique proxies: {}", candidates.len());
            if let Some(output_path) = save {
                ProxyParser::save_to_file(&candidates, &output_path)?;
                println!("Saved proxies to {:?}", output_path);
            } else {
                for candidate in &candidates {
                    println!("{}", candidate);
                }
            }
        }
        Some(Commands::Check { input, proxy_type }) => {
            let candidates = ProxyParser::parse_file(&input, proxy_type)?;
            info!("Loaded {} proxies from {:?}", candidates.len(), input);
            check(&config, candidates, use_tui).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let log_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn read_url_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read URL file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        // Skip empty lines and comments
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

async fn scrape(config: &Config, sources: &[ProxySource]) -> Result<Vec<Candidate>> {
    let crawler = ProxyCrawler::with_config(config.crawler_config())
        .context("cannot build HTTP client")?;
    Ok(collect_candidates(&crawler, sources).await)
}

async fn check(config: &Config, candidates: Vec<Candidate>, use_tui: bool) -> Result<()> {
    let store = Arc::new(ResultStore::open(&config.output_dir)?);
    let dispatcher = Dispatcher::with_config(&config.checker_config(), Arc::clone(&store));

    let summary = if use_tui {
        tui::run_with_view(dispatcher, candidates).await?
    } else {
        Some(dispatcher.run(candidates, &LogProgress::new()).await?)
    };

    match summary {
        Some(summary) => print_summary(&summary, &store),
        None => println!("Run interrupted; working proxies found so far are saved."),
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, store: &ResultStore) {
    let elapsed = summary
        .finished_at
        .map(|end| (end - summary.started_at).num_seconds())
        .unwrap_or_default();

    println!(
        "Results: {} working, {} failed, {} total in {}s",
        summary.working, summary.failed, summary.total, elapsed
    );
    for protocol in ProxyType::ALL {
        let count = summary.working_for(protocol);
        if count > 0 {
            println!("  {:<6} {:>5} -> {}", protocol.to_string(), count, store.path_for(protocol).display());
        }
    }
}
