use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use faultline_core::prediction::FAILURE_PATTERNS;
use faultline_core::{AnalysisReport, Config, DurationSample, SessionStore, Span, Trace};

#[derive(Parser)]
#[command(name = "faultline")]
#[command(
    about = "Root-cause and failure-prediction analysis for multi-agent traces",
    long_about = None
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "faultline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest trace files into one session and print the analysis
    Analyze {
        /// Trace files (JSON trace object or bare span array), ingested in order
        #[arg(required = true)]
        traces: Vec<PathBuf>,

        /// Duration samples to check for latency spikes instead of span durations
        #[arg(short, long)]
        samples: Option<PathBuf>,

        /// Session name used in the report
        #[arg(long, default_value = "cli")]
        session: String,

        /// Output the full JSON report
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration as TOML
    DefaultConfig,

    /// List the built-in failure patterns
    Patterns {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TraceInput {
    Trace(Trace),
    Spans(Vec<Span>),
}

impl From<TraceInput> for Trace {
    fn from(input: TraceInput) -> Self {
        match input {
            TraceInput::Trace(trace) => trace,
            TraceInput::Spans(spans) => Trace::new(spans),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    init_logging(&config);

    match cli.command {
        Commands::Analyze {
            traces,
            samples,
            session,
            json,
        } => {
            let report = analyze(config, &traces, samples.as_deref(), &session)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report);
            }
        }
        Commands::DefaultConfig => {
            print!("{}", Config::default_toml()?);
        }
        Commands::Patterns { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&FAILURE_PATTERNS)?);
            } else {
                for pattern in FAILURE_PATTERNS.iter() {
                    println!(
                        "{:<26} confidence {:.2}  ttf {:>6}ms  {}",
                        pattern.name,
                        pattern.avg_confidence,
                        pattern.avg_time_to_failure_ms,
                        pattern.description
                    );
                }
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    // stdout carries the report
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(config.logging.include_modules)
        .with_max_level(log_level)
        .compact()
        .init();
}

fn analyze(
    config: Config,
    trace_paths: &[PathBuf],
    samples_path: Option<&Path>,
    session_id: &str,
) -> Result<AnalysisReport> {
    let store = SessionStore::new(config)?;
    store.create_session(session_id)?;

    let samples: Option<Vec<DurationSample>> = samples_path
        .map(read_json::<Vec<DurationSample>>)
        .transpose()?;

    for path in trace_paths {
        let trace: Trace = read_json::<TraceInput>(path)?.into();
        let summary = store.ingest_trace(session_id, &trace)?;
        tracing::info!(
            path = %path.display(),
            spans = trace.spans.len(),
            new_nodes = summary.new_nodes,
            new_edges = summary.new_edges,
            orphans = summary.orphans.len(),
            "Ingested trace"
        );

        if samples.is_none() {
            let batch: Vec<DurationSample> = trace.spans.iter().map(DurationSample::from).collect();
            store.detect_anomalies(session_id, &batch)?;
        }
    }

    if let Some(samples) = samples {
        store.detect_anomalies(session_id, &samples)?;
    }

    Ok(store.report(session_id)?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_summary(report: &AnalysisReport) {
    let stats = &report.stats;
    println!("Session {}", report.session_id);
    println!(
        "  graph: {} nodes, {} edges, {} error nodes, max depth {}",
        stats.total_nodes, stats.total_edges, stats.error_nodes, stats.max_depth
    );
    println!(
        "  root causes: {}  impacted: {}  critical path: {}",
        stats.root_causes, stats.impacted_nodes, stats.critical_path_length
    );

    for node_id in &report.graph.root_causes {
        if let Some(node) = report.graph.nodes.iter().find(|node| node.id == *node_id) {
            println!(
                "    {} ({}) p={:.2}",
                node.name, node.span_id, node.root_cause_probability
            );
        }
    }

    println!(
        "  anomalies: {}  cascades: {}",
        report.anomalies.len(),
        report.cascades.len()
    );
    for anomaly in &report.anomalies {
        println!("    [{:?}] {}", anomaly.severity, anomaly.description);
    }

    let prediction_stats = &report.prediction_stats;
    println!(
        "  predictions: {} active, {} resolved",
        prediction_stats.active, prediction_stats.resolved
    );
    for prediction in report.predictions.iter().filter(|p| p.is_active()) {
        println!(
            "    {} score {:.2} confidence {:.2} in ~{}s",
            prediction.pattern_name,
            prediction.match_score,
            prediction.confidence,
            prediction.estimated_time_to_failure_ms / 1000
        );
    }
}
