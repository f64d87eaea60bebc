// src/main.rs
//
// cadence — detects likely AI-generated content in git repository
// histories and web pages.
//
// Subcommands: analyze <path>, web <url>, webhook, config, version.

use std::process::ExitCode;
use std::sync::Arc;

use cadence::cli::{Cli, Command};
use cadence::config::Config;
use cadence::data::AnalysisReport;
use cadence::http::{build_router, AppState};
use cadence::metrics::MetricsCollector;
use cadence::plugin::PluginManager;
use cadence::queue::JobQueue;
use cadence::runner::SyncRunner;
use cadence::source::{RepositorySource, WebSource};
use cadence::strategy::detector::{Detector, RepositoryDetector, WebDetector};
use cadence::strategy::registry::{seed_git_registry, seed_web_registry, StrategyRegistry};
use cadence::strategy::{repository_strategies, web_strategies};

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze {
            path,
            branch,
            exclude_files,
        } => {
            let mut excludes = config.exclude_files.clone();
            excludes.extend(exclude_files);

            let mut source = RepositorySource::new(path).with_exclude_patterns(excludes);
            if let Some(b) = branch {
                source = source.with_branch(b);
            }

            let plugins = Arc::new(PluginManager::new());
            let mut detectors: Vec<Box<dyn Detector>> =
                vec![Box::new(RepositoryDetector::new(repository_strategies::default_strategies()))];
            detectors.push(Box::new(plugins.detector()));
            let runner = SyncRunner::with_disabled(config.disabled_strategies());
            let report = runner.run(&source, &detectors).await?;
            emit_report(&report, cli.json, cli.output.as_deref())?;
        }

        Command::Web { url } => {
            let source = WebSource::new(url);
            let plugins = Arc::new(PluginManager::new());
            let mut detectors: Vec<Box<dyn Detector>> =
                vec![Box::new(WebDetector::new(web_strategies::default_strategies()))];
            detectors.push(Box::new(plugins.detector()));
            let runner = SyncRunner::with_disabled(config.disabled_strategies());
            let report = runner.run(&source, &detectors).await?;
            emit_report(&report, cli.json, cli.output.as_deref())?;
        }

        Command::Webhook { port, host } => {
            run_webhook_server(config, host, port).await?;
        }

        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Command::Version => {
            println!("cadence {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn emit_report(report: &AnalysisReport, json: bool, output: Option<&std::path::Path>) -> anyhow::Result<()> {
    let text = if json {
        serde_json::to_string_pretty(report)?
    } else {
        human_readable(report)
    };

    match output {
        Some(path) => std::fs::write(path, text)?,
        None => println!("{text}"),
    }
    Ok(())
}

fn human_readable(report: &AnalysisReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", report.assessment));
    out.push_str(&format!("overall score: {:.1}\n", report.overall_score));
    out.push_str(&format!(
        "detections: {} flagged / {} total ({:.0}% suspicion rate)\n",
        report.detection_count,
        report.total_detections,
        report.suspicion_rate * 100.0
    ));
    out.push_str(&format!(
        "severity: {} high, {} medium, {} low\n",
        report.high_count, report.medium_count, report.low_count
    ));
    for d in report.detections.iter().filter(|d| d.detected) {
        out.push_str(&format!(
            "  [{}] {} (score {:.2}, confidence {:.2}) — {}\n",
            d.severity, d.strategy, d.score, d.confidence, d.description
        ));
    }
    out
}

async fn run_webhook_server(config: Config, host: String, port: u16) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let cache: Arc<dyn cadence::cache::Cache> = Arc::new(cadence::cache::AnalysisCache::new(
        chrono::Duration::hours(1),
        1000,
    ));
    let metrics: Arc<dyn cadence::metrics::Metrics> = Arc::new(MetricsCollector::new());

    let registry = Arc::new(StrategyRegistry::new());
    seed_git_registry(&registry, &repository_strategies::default_strategies());
    seed_web_registry(&registry, &web_strategies::default_strategies());

    let plugins = Arc::new(PluginManager::new());

    let processor = Arc::new(cadence::http::server::WebhookAnalysisProcessor {
        disabled: config.disabled_strategies(),
        exclude_files: config.exclude_files.clone(),
        plugins: plugins.clone(),
        cache: cache.clone(),
        metrics: metrics.clone(),
    });
    let queue = Arc::new(JobQueue::start(config.webhook.max_workers, processor));

    let state = AppState {
        config,
        cache,
        metrics,
        registry,
        plugins,
        queue,
    };

    let app = build_router(state);
    let addr = format!("{host}:{port}");
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
