//! # Scrivener CLI
//!
//! Runs the research pipeline and the cache maintenance commands.
//! Exit codes: 0 on success, 1 on configuration or unexpected errors, 130
//! when interrupted with Ctrl-C.

mod console;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scrivener_core::cache::ResponseCache;
use scrivener_core::config::PipelineConfig;
use scrivener_core::llm::create_service;
use scrivener_core::report::{save_report, save_summary};
use scrivener_core::swarm::{Coordinator, SwarmEvent};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const DEFAULT_COMPANIES: &[&str] = &["Oracle", "IBM", "Cisco", "SAP", "Walmart", "Salesforce"];

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Scrivener - Multi-agent research on AI investment (Talk vs Walk)"
)]
struct Args {
    /// Reduce output verbosity
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Anthropic API key (overrides .env and environment)
    #[arg(long, global = true, env = "SCRIVENER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// JSON config overlay applied after the environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Analyze companies one at a time
    #[arg(long, global = true, conflicts_with = "parallel")]
    sequential: bool,

    /// Analyze companies concurrently
    #[arg(long, global = true)]
    parallel: bool,

    /// Disable the response cache for this run
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone)]
enum CliCommand {
    /// Run the full analysis (default)
    Run {
        /// Companies to analyze
        #[arg(long, num_args = 1..)]
        companies: Vec<String>,
        /// Report filename inside the output directory
        #[arg(short, long)]
        output: Option<String>,
        /// Directory of `<Company>.txt` / `<Company>.md` documents for the analysts
        #[arg(long)]
        documents_dir: Option<PathBuf>,
        /// Clear the whole cache before running
        #[arg(long)]
        clear_cache: bool,
        /// Clear expired cache entries before running
        #[arg(long)]
        clear_expired_cache: bool,
    },
    /// Clear the cache and exit
    Clear,
    /// Clear expired cache entries and exit
    ClearExpired,
}

impl Default for CliCommand {
    fn default() -> Self {
        CliCommand::Run {
            companies: Vec::new(),
            output: None,
            documents_dir: None,
            clear_cache: false,
            clear_expired_cache: false,
        }
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet {
        "scrivener=warn,scrivener_core=warn"
    } else {
        "scrivener=info,scrivener_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Environment, then overlay file, then command-line flags
fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("Failed to load configuration")?;
    if let Some(path) = &args.config {
        config = config.with_overlay_file(path)?;
    }
    apply_flags(&mut config, args);
    Ok(config)
}

fn apply_flags(config: &mut PipelineConfig, args: &Args) {
    if let Some(key) = &args.api_key {
        config.api_key = Some(key.clone());
    }
    if args.quiet {
        config.verbose = false;
    }
    if args.sequential {
        config.parallel_execution = false;
    }
    if args.parallel {
        config.parallel_execution = true;
    }
    if args.no_cache {
        config.enable_caching = false;
    }
}

fn open_cache(config: &PipelineConfig) -> Result<Option<Arc<ResponseCache>>> {
    if !config.enable_caching {
        return Ok(None);
    }
    let cache = ResponseCache::open(config)
        .with_context(|| format!("Failed to open cache in {}", config.cache_dir.display()))?;
    Ok(Some(Arc::new(cache)))
}

fn clear(cache: Option<&ResponseCache>, expired_only: bool) -> Result<usize> {
    let Some(cache) = cache else {
        return Ok(0);
    };
    let count = if expired_only {
        cache.clear_expired()?
    } else {
        cache.clear()?
    };
    Ok(count)
}

/// Read `<company>.txt` or `<company>.md` from `dir` for each company that has one
async fn load_documents(dir: &Path, companies: &[String]) -> Result<HashMap<String, String>> {
    let mut documents = HashMap::new();
    for company in companies {
        for ext in ["txt", "md"] {
            let path = dir.join(format!("{}.{}", company, ext));
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read document {}", path.display()))?;
            tracing::info!("Using {} for {}", path.display(), company);
            documents.insert(company.clone(), content);
            break;
        }
    }
    Ok(documents)
}

async fn execute(args: Args) -> Result<()> {
    let mut config = build_config(&args)?;

    match args.command.clone().unwrap_or_default() {
        CliCommand::Clear => {
            let cache = open_cache(&config)?;
            let count = clear(cache.as_deref(), false)?;
            println!("✓ Cleared {} cache files", count);
            Ok(())
        }
        CliCommand::ClearExpired => {
            let cache = open_cache(&config)?;
            let count = clear(cache.as_deref(), true)?;
            println!("✓ Cleared {} expired cache files", count);
            Ok(())
        }
        CliCommand::Run {
            companies,
            output,
            documents_dir,
            clear_cache,
            clear_expired_cache,
        } => {
            config.validate()?;
            config.ensure_directories()?;

            let companies: Vec<String> = if companies.is_empty() {
                DEFAULT_COMPANIES.iter().map(|c| c.to_string()).collect()
            } else {
                companies
            };

            let cache = open_cache(&config)?;
            if clear_expired_cache {
                let count = clear(cache.as_deref(), true)?;
                println!("✓ Cleared {} expired cache files", count);
            }
            if clear_cache {
                let count = clear(cache.as_deref(), false)?;
                tracing::info!("Cleared {} cache files", count);
            }

            let documents = match &documents_dir {
                Some(dir) => load_documents(dir, &companies).await?,
                None => HashMap::new(),
            };

            run_analysis(config, cache, companies, documents, output.as_deref()).await
        }
    }
}

async fn run_analysis(
    config: PipelineConfig,
    cache: Option<Arc<ResponseCache>>,
    companies: Vec<String>,
    documents: HashMap<String, String>,
    output: Option<&str>,
) -> Result<()> {
    let verbose = config.verbose;
    let output_dir = config.output_dir.clone();
    let api_key = config.api_key.clone().unwrap_or_default();
    let service = create_service(&config.lead.model, &api_key);

    let (tx, mut rx) = mpsc::channel::<SwarmEvent>(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if verbose {
                if let Some(text) = console::render_event(&event) {
                    println!("{}", text);
                }
            }
        }
    });

    if verbose {
        println!("{}", console::header());
    }
    tracing::info!("Starting analysis for {} companies", companies.len());
    let started = Instant::now();

    let mut coordinator = Coordinator::new(config, service, cache)
        .with_event_channel(tx)
        .with_documents(documents);
    let result = coordinator.run(&companies).await;
    drop(coordinator);
    let _ = printer.await;
    let result = result?;

    let report_path = save_report(&output_dir, &result.report, output, &chrono::Local::now()).await?;
    if let Err(e) = save_summary(&report_path, &result.usage).await {
        tracing::warn!("{:#}", e);
    }

    if verbose {
        println!(
            "{}",
            console::completion(&report_path, started.elapsed().as_secs_f64())
        );
        println!("{}", console::usage_summary(&result.usage));
    } else {
        println!(
            "\n✓ Analysis complete. Report saved to: {}",
            report_path.display()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.quiet);

    tokio::select! {
        result = execute(args) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("{:#}", e);
                eprintln!("\n❌ Error: {:#}", e);
                if e.downcast_ref::<scrivener_core::config::ConfigError>().is_some() {
                    eprintln!("\nPlease check your .env file and ensure ANTHROPIC_API_KEY is set.");
                }
                ExitCode::from(1)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n\n⚠️  Analysis interrupted by user");
            ExitCode::from(130)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let args = Args::try_parse_from(["scrivener"]).unwrap();
        assert!(args.command.is_none());
        assert!(matches!(
            args.command.unwrap_or_default(),
            CliCommand::Run { ref companies, .. } if companies.is_empty()
        ));
    }

    #[test]
    fn test_run_arguments() {
        let args = Args::try_parse_from([
            "scrivener",
            "--parallel",
            "run",
            "--companies",
            "Microsoft",
            "Google",
            "--output",
            "mine.md",
            "--clear-cache",
        ])
        .unwrap();
        assert!(args.parallel);
        match args.command {
            Some(CliCommand::Run {
                companies,
                output,
                clear_cache,
                clear_expired_cache,
                ..
            }) => {
                assert_eq!(companies, vec!["Microsoft", "Google"]);
                assert_eq!(output.as_deref(), Some("mine.md"));
                assert!(clear_cache);
                assert!(!clear_expired_cache);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from(["scrivener", "clear", "--quiet", "--no-cache"]).unwrap();
        assert!(args.quiet);
        assert!(args.no_cache);
        assert!(matches!(args.command, Some(CliCommand::Clear)));
    }

    #[test]
    fn test_sequential_conflicts_with_parallel() {
        assert!(Args::try_parse_from(["scrivener", "--sequential", "--parallel"]).is_err());
    }

    #[test]
    fn test_apply_flags() {
        let args = Args::try_parse_from([
            "scrivener",
            "--quiet",
            "--parallel",
            "--no-cache",
            "--api-key",
            "sk-test",
        ])
        .unwrap();
        let mut config = PipelineConfig::default();
        apply_flags(&mut config, &args);
        assert!(!config.verbose);
        assert!(config.parallel_execution);
        assert!(!config.enable_caching);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_clear_without_cache_is_zero() {
        assert_eq!(clear(None, false).unwrap(), 0);
        let config = PipelineConfig {
            enable_caching: false,
            ..PipelineConfig::default()
        };
        assert!(open_cache(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Oracle.txt"), "oracle filing").unwrap();
        std::fs::write(dir.path().join("IBM.md"), "ibm filing").unwrap();

        let companies = vec!["Oracle".to_string(), "IBM".to_string(), "SAP".to_string()];
        let docs = load_documents(dir.path(), &companies).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs["Oracle"], "oracle filing");
        assert_eq!(docs["IBM"], "ibm filing");
    }
}
