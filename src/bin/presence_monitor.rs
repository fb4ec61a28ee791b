//! presence_monitor - poll video sources and report presence to the aggregator.
//!
//! 1. Discovers sources on the configured transport
//! 2. Asks the operator which ordinals to monitor (unless pre-answered)
//! 3. Captures, classifies and reports one frame per source per cycle
//! 4. Drains every receiver on Ctrl-C

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use presence_monitor::config::{MonitorConfig, DEFAULT_AGGREGATOR_URL};
use presence_monitor::detect::ClassifierRegistry;
use presence_monitor::operator::{parse_selection, prompt_line, prompt_selection};
use presence_monitor::{
    HttpReporter, LoopSettings, PollingLoop, PresenceDetector, SourceCatalog, SourceTransport,
    StopSignal, SyntheticTransport,
};

#[cfg(feature = "backend-tract")]
const TRACT_INPUT_SIZE: u32 = 224;

#[derive(Parser, Debug)]
#[command(author, version, about = "Monitor video sources for a person in view")]
struct Args {
    /// Aggregator endpoint receiving presence reports.
    #[arg(long, env = "PRESENCE_AGGREGATOR_URL")]
    aggregator_url: Option<String>,

    /// Transport: 'synthetic' (stub:// sources) or 'http' (name=url snapshot cameras).
    #[arg(long, env = "PRESENCE_TRANSPORT")]
    transport: Option<String>,

    /// Source specs, comma separated.
    #[arg(long, env = "PRESENCE_SOURCES", value_delimiter = ',')]
    sources: Vec<String>,

    /// Ordinals to monitor, comma separated (skips the selection prompt).
    #[arg(long, env = "PRESENCE_SELECT")]
    select: Option<String>,

    /// Classifier backend name (default: cpu).
    #[arg(long, env = "PRESENCE_DETECTOR")]
    detector: Option<String>,

    /// ONNX model for the tract backend.
    #[arg(long, env = "PRESENCE_MODEL_PATH")]
    model_path: Option<PathBuf>,

    /// Confidence a region must exceed to count as a person.
    #[arg(long, env = "PRESENCE_DETECTION_THRESHOLD")]
    threshold: Option<f32>,

    #[arg(long, env = "PRESENCE_CAPTURE_TIMEOUT_MS")]
    capture_timeout_ms: Option<u64>,

    #[arg(long, env = "PRESENCE_CYCLE_INTERVAL_MS")]
    cycle_interval_ms: Option<u64>,

    /// Stop after this many polling passes (runs until Ctrl-C otherwise).
    #[arg(long)]
    passes: Option<u64>,

    /// Never prompt; use configured values and defaults.
    #[arg(long)]
    no_prompt: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = apply_args(MonitorConfig::load()?, &args)?;
    log::info!(
        "presence_monitor starting (transport: {}, {} sources configured)",
        config.transport,
        config.sources.len()
    );

    match config.transport.as_str() {
        "synthetic" => {
            let transport = SyntheticTransport::from_specs(&config.sources)?;
            run(transport, config, &args)
        }
        "http" => run_http(config, &args),
        other => Err(anyhow!("unknown transport '{}'", other)),
    }
}

#[cfg(feature = "ingest-http")]
fn run_http(config: MonitorConfig, args: &Args) -> Result<()> {
    let transport = presence_monitor::ingest::HttpSnapshotTransport::from_specs(&config.sources)?;
    run(transport, config, args)
}

#[cfg(not(feature = "ingest-http"))]
fn run_http(_config: MonitorConfig, _args: &Args) -> Result<()> {
    Err(anyhow!(
        "http transport requires building with --features ingest-http"
    ))
}

fn apply_args(mut config: MonitorConfig, args: &Args) -> Result<MonitorConfig> {
    if let Some(url) = &args.aggregator_url {
        config.aggregator_url = url.clone();
    }
    if let Some(transport) = &args.transport {
        config.transport = transport.clone();
    }
    if !args.sources.is_empty() {
        config.sources = args.sources.clone();
    }
    if let Some(select) = &args.select {
        config.select = Some(parse_selection(select));
    }
    if let Some(detector) = &args.detector {
        config.detector = Some(detector.clone());
    }
    if let Some(path) = &args.model_path {
        config.model_path = Some(path.clone());
    }
    if let Some(threshold) = args.threshold {
        config.detection_threshold = threshold;
    }
    if let Some(ms) = args.capture_timeout_ms {
        config.capture_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = args.cycle_interval_ms {
        config.cycle_interval = Duration::from_millis(ms);
    }
    config.validate()?;
    Ok(config)
}

fn build_detector(config: &MonitorConfig) -> Result<impl PresenceDetector> {
    #[allow(unused_mut)]
    let mut registry = ClassifierRegistry::with_builtin();
    #[cfg(feature = "backend-tract")]
    if let Some(path) = &config.model_path {
        registry.register(presence_monitor::detect::backends::TractClassifier::new(
            path,
            TRACT_INPUT_SIZE,
            TRACT_INPUT_SIZE,
        )?);
        registry.set_default("tract")?;
    }
    log::info!("available classifiers: {}", registry.list().join(", "));
    registry.into_detector(config.detector.as_deref(), config.detection_threshold)
}

fn run<T: SourceTransport>(transport: T, config: MonitorConfig, args: &Args) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    let detector = build_detector(&config)?;
    let reporter = HttpReporter::with_timeout(config.aggregator_url.clone(), config.report_timeout);
    let settings = LoopSettings {
        capture_timeout: config.capture_timeout,
        cycle_interval: config.cycle_interval,
    };

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.trigger())
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut pipeline = PollingLoop::new(transport, detector, reporter, settings, stop);
    let catalog = SourceCatalog::new(config.discovery_wait);
    let preselected = config.select.clone();
    let no_prompt = args.no_prompt;
    let mut prompt_error = None;
    let initialized = pipeline.initialize(&catalog, |sources| match preselected {
        Some(ordinals) => ordinals,
        None if no_prompt => sources.iter().map(|source| source.ordinal).collect(),
        None => prompt_selection(&mut input, &mut output, sources).unwrap_or_else(|e| {
            log::error!("selection prompt failed: {:#}", e);
            prompt_error = Some(e);
            Vec::new()
        }),
    });
    if let Some(e) = prompt_error {
        return Err(e.context("reading source selection"));
    }
    initialized?;

    let url_preset = config.aggregator_url != DEFAULT_AGGREGATOR_URL;
    if !args.no_prompt && !url_preset {
        let url = prompt_line(
            &mut input,
            &mut output,
            "Enter server URL",
            Some(&config.aggregator_url),
        )?;
        pipeline.reporter_mut().set_endpoint(url);
    }

    log::info!(
        "reporting to {} every {:?}",
        pipeline.reporter().endpoint(),
        config.cycle_interval
    );
    let summary = pipeline.run_for(args.passes);

    log::info!(
        "presence_monitor stopped: {} passes, {} frames, {} timeouts, {} reports, {} failures, {} receivers destroyed",
        summary.passes,
        summary.frames,
        summary.timeouts,
        summary.reports,
        summary.failures,
        summary.destroyed
    );
    Ok(())
}
