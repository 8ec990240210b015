//! Synheart Mock CLI
//!
//! Commands:
//! - mock start: generate and broadcast HSI events over WS/SSE/UDP
//! - mock record: generate and record events to an NDJSON file
//! - mock replay: replay a recording over WebSocket at original pacing
//! - mock list-scenarios / describe: inspect available scenarios
//! - doctor: environment and port checks
//! - receiver: local HTTP endpoint for HSI exports

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use synheart_mock::dispatcher::Dispatcher;
use synheart_mock::encoding::{encoder_for, EncodingFormat};
use synheart_mock::error::MockError;
use synheart_mock::event::SourceType;
use synheart_mock::flux::{HsiTransformer, PassthroughTransformer};
use synheart_mock::generator::vendor::AGGREGATION_BATCH;
use synheart_mock::generator::{Generator, GeneratorConfig, VendorAggregator, VendorKind};
use synheart_mock::receiver::{
    generate_token, FileWriter, OutputFormat, ReceiverConfig, ReceiverServer, StdoutWriter,
};
use synheart_mock::recorder::{Recorder, Replayer};
use synheart_mock::scenario::{default_scenario_dir, parse_rate, Engine, Registry, Scenario};
use synheart_mock::transport::{
    broadcast_from_channel, Broadcaster, SseServer, UdpServer, WebSocketServer,
};
use synheart_mock::{DEFAULT_PORT, MOCK_VERSION};

/// Synheart Mock - HSI-compatible sensor data streams for local SDK
/// development
#[derive(Parser)]
#[command(name = "synheart-mock")]
#[command(author = "Synheart AI Inc")]
#[command(version = MOCK_VERSION)]
#[command(about = "Mock HSI data generator for local development", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mock data generation commands
    #[command(subcommand)]
    Mock(MockCommands),

    /// Check environment and print connection info
    Doctor,

    /// Start a local HTTP server to receive HSI exports
    Receiver(ReceiverArgs),
}

#[derive(Subcommand)]
enum MockCommands {
    /// Start generating and broadcasting HSI events
    Start(StartArgs),

    /// Generate and record mock data to a file
    Record(RecordArgs),

    /// Replay recorded events over WebSocket
    Replay(ReplayArgs),

    /// List available scenarios
    ListScenarios,

    /// Describe a scenario in detail
    Describe {
        /// Scenario name
        scenario: String,
    },
}

#[derive(Args)]
struct StartArgs {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// WebSocket port; SSE uses port+1, UDP port+2
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Scenario to run
    #[arg(long, default_value = "baseline")]
    scenario: String,

    /// Duration override, e.g. "5m", "1h"
    #[arg(long)]
    duration: Option<String>,

    /// Global tick rate
    #[arg(long, default_value = "50hz")]
    rate: String,

    /// Random seed for deterministic output (time-derived if unset)
    #[arg(long)]
    seed: Option<i64>,

    /// Record broadcast events to this file
    #[arg(long)]
    out: Option<PathBuf>,

    /// Wire encoding for broadcast frames
    #[arg(long, value_enum, default_value = "json")]
    encoding: WireEncoding,
}

#[derive(Args)]
struct RecordArgs {
    /// Scenario to run
    #[arg(long, default_value = "baseline")]
    scenario: String,

    /// Duration to record
    #[arg(long, default_value = "5m")]
    duration: String,

    /// Output file
    #[arg(long, required = true)]
    out: PathBuf,

    /// Random seed (time-derived if unset)
    #[arg(long)]
    seed: Option<i64>,

    /// Global tick rate
    #[arg(long, default_value = "50hz")]
    rate: String,

    /// Record vendor-shaped payloads instead of raw envelopes
    #[arg(long, value_enum)]
    vendor: Option<VendorFormat>,

    /// Route vendor payloads through the HSI transformer
    #[arg(long, requires = "vendor")]
    transform: bool,
}

#[derive(Args)]
struct ReplayArgs {
    /// Input file to replay
    #[arg(long = "in", required = true)]
    input: PathBuf,

    /// Playback speed multiplier
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Loop playback continuously
    #[arg(long = "loop")]
    loop_playback: bool,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// WebSocket port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[derive(Args)]
struct ReceiverArgs {
    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Static bearer token (auto-generated if not provided)
    #[arg(long)]
    token: Option<String>,

    /// Directory to write received payloads (stdout if not set)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Output format: json|ndjson
    #[arg(long, default_value = "json")]
    format: String,

    /// Accept gzip-compressed payloads
    #[arg(long)]
    gzip: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum WireEncoding {
    /// One JSON text frame per envelope
    Json,
    /// One protobuf binary frame per envelope
    Protobuf,
}

impl From<WireEncoding> for EncodingFormat {
    fn from(value: WireEncoding) -> Self {
        match value {
            WireEncoding::Json => EncodingFormat::Json,
            WireEncoding::Protobuf => EncodingFormat::Protobuf,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum VendorFormat {
    Whoop,
    Garmin,
}

impl From<VendorFormat> for VendorKind {
    fn from(value: VendorFormat) -> Self {
        match value {
            VendorFormat::Whoop => VendorKind::Whoop,
            VendorFormat::Garmin => VendorKind::Garmin,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn run(cli: Cli) -> Result<(), MockError> {
    match cli.command {
        Commands::Mock(MockCommands::Start(args)) => cmd_start(args).await,
        Commands::Mock(MockCommands::Record(args)) => cmd_record(args).await,
        Commands::Mock(MockCommands::Replay(args)) => cmd_replay(args).await,
        Commands::Mock(MockCommands::ListScenarios) => cmd_list_scenarios(),
        Commands::Mock(MockCommands::Describe { scenario }) => cmd_describe(&scenario),
        Commands::Doctor => cmd_doctor(),
        Commands::Receiver(args) => cmd_receiver(args).await,
    }
}

/// Install the root cancellation on SIGINT / SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = terminate.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        eprintln!("\nReceived interrupt signal, shutting down...");
        cancel.cancel();
    });
}

fn load_scenario(name: &str, duration_override: Option<&str>) -> Result<Scenario, MockError> {
    let mut registry = Registry::new();
    registry.load_from_dir(&default_scenario_dir())?;

    let mut scenario = registry.get(name)?.clone();
    if let Some(duration) = duration_override {
        scenario.duration = duration.to_string();
        scenario.validate()?;
    }
    Ok(scenario)
}

fn effective_seed(seed: Option<i64>) -> i64 {
    seed.unwrap_or_else(|| {
        chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| chrono::Utc::now().timestamp_micros())
    })
}

async fn cmd_start(args: StartArgs) -> Result<(), MockError> {
    let scenario = load_scenario(&args.scenario, args.duration.as_deref())?;
    let tick_period = parse_rate(&args.rate)?;
    let seed = effective_seed(args.seed);

    let engine = Engine::new(scenario.clone());
    let mut generator = Generator::new(
        engine,
        GeneratorConfig {
            seed,
            tick_period,
            source_type: SourceType::Wearable,
            source_id: "mock-watch-01".to_string(),
            source_side: None,
        },
    );
    let run_id = generator.run_id().to_string();

    let encoder = encoder_for(args.encoding.into());
    let ws: Arc<dyn Broadcaster> =
        Arc::new(WebSocketServer::new(&args.host, args.port, encoder.clone()));
    let sse: Arc<dyn Broadcaster> =
        Arc::new(SseServer::new(&args.host, args.port + 1, encoder.clone()));
    let udp: Arc<dyn Broadcaster> =
        Arc::new(UdpServer::new(&args.host, args.port + 2, encoder.clone()));

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    for server in [&ws, &sse, &udp] {
        server.start(cancel.clone()).await?;
    }

    let (events_tx, events_rx) = mpsc::channel(synheart_mock::generator::OUTPUT_CHANNEL_CAPACITY);
    let dispatcher = Arc::new(Dispatcher::new(events_rx, 100));

    for server in [&ws, &sse, &udp] {
        let subscription = dispatcher.subscribe();
        tokio::spawn(broadcast_from_channel(
            server.clone(),
            cancel.clone(),
            subscription,
        ));
    }

    let recorder = match &args.out {
        Some(path) => {
            let recorder = Arc::new(Recorder::create(path)?);
            let subscription = dispatcher.subscribe();
            let recording = recorder.clone();
            let record_cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(error) = recording
                    .record_from_stream(record_cancel, subscription, |_| {})
                    .await
                {
                    warn!(%error, "recording abandoned");
                }
            });
            Some(recorder)
        }
        None => None,
    };

    {
        let dispatcher = dispatcher.clone();
        let dispatch_cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.run(dispatch_cancel).await });
    }

    println!("Synheart Mock Server Started\n");
    println!("Scenario:     {}", scenario.name);
    println!("Description:  {}", scenario.description);
    println!("WebSocket:    {}", ws.address());
    println!("SSE:          {}", sse.address());
    println!("UDP:          {}", udp.address());
    println!("Seed:         {seed}");
    println!("Run ID:       {run_id}");
    if let Some(path) = &args.out {
        println!("Recording:    {}", path.display());
    }
    println!("\nPress Ctrl+C to stop");
    println!("\nGenerating events...");

    let result = generator.run(cancel.clone(), events_tx).await;

    // Let in-flight dispatches land before tearing the servers down.
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    for server in [&ws, &sse, &udp] {
        server.shutdown().await;
    }
    if let Some(recorder) = recorder {
        recorder.close()?;
        println!("Recorded {} events", recorder.count());
    }
    if dispatcher.dropped_count() > 0 {
        println!(
            "Dropped {} events for slow subscribers",
            dispatcher.dropped_count()
        );
    }

    println!("\nShutdown complete");
    result
}

async fn cmd_record(args: RecordArgs) -> Result<(), MockError> {
    let scenario = load_scenario(&args.scenario, Some(&args.duration))?;
    let tick_period = parse_rate(&args.rate)?;
    let seed = effective_seed(args.seed);

    let engine = Engine::new(scenario.clone());
    let mut generator = Generator::new(
        engine,
        GeneratorConfig {
            seed,
            tick_period,
            source_type: SourceType::Wearable,
            source_id: "mock-watch-01".to_string(),
            source_side: None,
        },
    );
    let run_id = generator.run_id().to_string();

    let recorder = Recorder::create(&args.out)?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    println!("Recording Session Started\n");
    println!("Scenario:   {}", scenario.name);
    println!("Duration:   {}", args.duration);
    println!("Output:     {}", args.out.display());
    println!("Seed:       {seed}");
    if let Some(vendor) = args.vendor {
        println!("Vendor:     {}", VendorKind::from(vendor).as_str());
        println!("Transform:  {}", args.transform);
    }
    println!("Run ID:     {run_id}");
    println!("\nPress Ctrl+C to stop early");
    println!("\nRecording events...");

    let (events_tx, events_rx) = mpsc::channel(synheart_mock::generator::OUTPUT_CHANNEL_CAPACITY);
    let generator_cancel = cancel.clone();
    let generator_task =
        tokio::spawn(async move { generator.run(generator_cancel, events_tx).await });

    match args.vendor {
        Some(vendor) => {
            record_vendor_stream(
                &recorder,
                cancel.clone(),
                events_rx,
                vendor.into(),
                args.transform,
            )
            .await?;
        }
        None => {
            recorder
                .record_from_stream(cancel.clone(), events_rx, |count| {
                    if count % 1000 == 0 {
                        print!("\rRecorded {count} entries...");
                        use std::io::Write;
                        let _ = std::io::stdout().flush();
                    }
                })
                .await?;
        }
    }

    match generator_task.await {
        Ok(result) => result?,
        Err(join_error) => {
            return Err(MockError::Config(format!(
                "generator task failed: {join_error}"
            )))
        }
    }

    recorder.close()?;
    println!("\n\nRecording complete: {}", args.out.display());
    println!("Records written: {}", recorder.count());
    Ok(())
}

/// Batch envelopes into vendor payloads and record one line per batch.
async fn record_vendor_stream(
    recorder: &Recorder,
    cancel: CancellationToken,
    mut events: mpsc::Receiver<synheart_mock::Event>,
    vendor: VendorKind,
    transform: bool,
) -> Result<(), MockError> {
    let transformer: Option<PassthroughTransformer> = transform.then(PassthroughTransformer::default);
    let mut aggregator = VendorAggregator::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                aggregator.add(event);

                if aggregator.count() >= AGGREGATION_BATCH {
                    let payload = aggregator.to_vendor_json(vendor)?;
                    let line = match &transformer {
                        Some(t) => t.transform(vendor, &payload)?,
                        None => payload,
                    };
                    recorder.record_raw(line.as_bytes())?;
                    aggregator.clear();
                }
            }
        }
    }

    recorder.flush()?;
    Ok(())
}

async fn cmd_replay(args: ReplayArgs) -> Result<(), MockError> {
    if args.speed <= 0.0 || !args.speed.is_finite() {
        return Err(MockError::Config(format!(
            "speed must be positive, got {}",
            args.speed
        )));
    }

    let mut replayer = Replayer::new(&args.input, args.speed, args.loop_playback);
    let count = replayer.count()?;
    let first = replayer.first_record()?;

    let encoder = encoder_for(EncodingFormat::Json);
    let ws: Arc<dyn Broadcaster> =
        Arc::new(WebSocketServer::new(&args.host, args.port, encoder));

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());
    ws.start(cancel.clone()).await?;

    println!("Replay Session Started\n");
    println!("File:         {}", args.input.display());
    println!("Events:       {count}");
    if let Some(first) = &first {
        println!("Scenario:     {}", first.session.scenario);
    }
    println!("Speed:        {:.1}x", args.speed);
    println!("Loop:         {}", args.loop_playback);
    println!("WebSocket:    {}", ws.address());
    println!("\nPress Ctrl+C to stop");
    println!("\nReplaying events...");

    let (lines_tx, mut lines_rx) = mpsc::channel::<String>(100);

    let broadcaster = ws.clone();
    let forward_cancel = cancel.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = forward_cancel.cancelled() => break,
                line = lines_rx.recv() => {
                    let Some(line) = line else { break };
                    if let Err(error) = broadcaster.broadcast_bytes(line.as_bytes()).await {
                        warn!(%error, "replay broadcast failed");
                    }
                }
            }
        }
    });

    let result = replayer.replay(cancel.clone(), lines_tx).await;

    cancel.cancel();
    let _ = forwarder.await;
    ws.shutdown().await;

    println!("\nReplay complete");
    result
}

fn cmd_list_scenarios() -> Result<(), MockError> {
    let mut registry = Registry::new();
    registry.load_from_dir(&default_scenario_dir())?;

    let scenarios = registry.list_with_descriptions();
    if scenarios.is_empty() {
        println!("No scenarios found");
        return Ok(());
    }

    println!("Available scenarios:\n");
    for (name, description) in scenarios {
        println!("  {name:<20} {description}");
    }
    println!();
    Ok(())
}

fn cmd_describe(name: &str) -> Result<(), MockError> {
    let mut registry = Registry::new();
    registry.load_from_dir(&default_scenario_dir())?;
    let scenario = registry.get(name)?;

    println!("Scenario: {}", scenario.name);
    println!("Description: {}", scenario.description);
    println!("Duration: {}", scenario.duration);
    println!("Default Rate: {}\n", scenario.default_rate);

    println!("Signals:");
    let mut signal_names: Vec<&String> = scenario.signals.keys().collect();
    signal_names.sort();
    for signal in signal_names {
        let config = &scenario.signals[signal];
        println!("  {signal}");
        if let Some(baseline) = &config.baseline {
            println!("    Baseline: {baseline:?}");
        }
        if let Some(noise) = &config.noise {
            println!("    Noise: {noise:?}");
        }
        if let Some(rate) = &config.rate {
            println!("    Rate: {rate}");
        }
        if let Some(unit) = &config.unit {
            println!("    Unit: {unit}");
        }
        if let Some(value) = &config.value {
            println!("    Value: {value}");
        }
    }

    if !scenario.phases.is_empty() {
        println!("\nPhases:");
        for (index, phase) in scenario.phases.iter().enumerate() {
            println!("  {}. {} (duration: {})", index + 1, phase.name, phase.duration);
            if !phase.overrides.is_empty() {
                println!("     Overrides:");
                let mut override_names: Vec<&String> = phase.overrides.keys().collect();
                override_names.sort();
                for signal in override_names {
                    let config = &phase.overrides[signal];
                    let mut parts = Vec::new();
                    if let Some(add) = config.add {
                        parts.push(format!("add={add:.1}"));
                    }
                    if let Some(multiply) = config.multiply {
                        parts.push(format!("multiply={multiply:.1}"));
                    }
                    if let Some(value) = &config.value {
                        parts.push(format!("value={value}"));
                    }
                    if let Some(baseline) = &config.baseline {
                        parts.push(format!("baseline={baseline:?}"));
                    }
                    if let Some(noise) = &config.noise {
                        parts.push(format!("noise={noise:?}"));
                    }
                    println!("       {signal}: {}", parts.join(" "));
                }
            }
        }
    }

    println!();
    Ok(())
}

fn cmd_doctor() -> Result<(), MockError> {
    println!("Synheart Environment Check\n");
    println!("Version:           {MOCK_VERSION}");
    println!(
        "OS/Arch:           {}/{}\n",
        std::env::consts::OS,
        std::env::consts::ARCH
    );

    let scenarios_dir = default_scenario_dir();
    if scenarios_dir.is_dir() {
        println!("[OK] Scenarios directory found: {}", scenarios_dir.display());
        let mut registry = Registry::new();
        match registry.load_from_dir(&scenarios_dir) {
            Ok(()) => println!(
                "     Found {} scenarios: {:?}\n",
                registry.len(),
                registry.list()
            ),
            Err(error) => println!("     Failed to load scenarios: {error}\n"),
        }
    } else {
        println!(
            "[ERR] Scenarios directory not found: {}\n",
            scenarios_dir.display()
        );
    }

    match std::net::TcpListener::bind(("127.0.0.1", DEFAULT_PORT)) {
        Ok(listener) => {
            drop(listener);
            println!("[OK] Default port {DEFAULT_PORT} is available\n");
        }
        Err(_) => {
            println!("[WARN] Default port {DEFAULT_PORT} is in use");
            println!("       Use --port to specify a different port\n");
        }
    }

    println!("Connection Examples:\n");
    println!("JavaScript:");
    println!("  const ws = new WebSocket('ws://localhost:{DEFAULT_PORT}/hsi');");
    println!("  ws.onmessage = (event) => console.log(JSON.parse(event.data));");
    println!();
    println!("Python:");
    println!("  import websocket, json");
    println!("  ws = websocket.WebSocket()");
    println!("  ws.connect('ws://localhost:{DEFAULT_PORT}/hsi')");
    println!("  while True:");
    println!("      print(json.loads(ws.recv()))");
    println!();
    println!("curl (SSE):");
    println!("  curl -N http://localhost:{}/hsi/sse", DEFAULT_PORT + 1);
    println!();

    println!("Environment check complete");
    Ok(())
}

async fn cmd_receiver(args: ReceiverArgs) -> Result<(), MockError> {
    let format = OutputFormat::parse(&args.format)?;
    let token = match args.token {
        Some(token) => token,
        None => generate_token(),
    };

    let writer: Box<dyn synheart_mock::receiver::ExportWriter> = match &args.out {
        Some(dir) => Box::new(FileWriter::new(dir, format)?),
        None => Box::new(StdoutWriter::new(format)),
    };

    let server = ReceiverServer::new(
        ReceiverConfig {
            host: args.host.clone(),
            port: args.port,
            token: token.clone(),
            format,
            accept_gzip: args.gzip,
        },
        writer,
    );

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());
    server.start(cancel.clone()).await?;

    eprintln!("Synheart Receiver Started\n");
    eprintln!("  Endpoint:  {}/v1/hsi/import", server.address());
    eprintln!("  Token:     {token}\n");
    match &args.out {
        Some(dir) => eprintln!("  Output:    {}/", dir.display()),
        None => eprintln!("  Output:    stdout"),
    }
    eprintln!("  Format:    {}", format.as_str());
    if args.gzip {
        eprintln!("  Gzip:      enabled");
    }
    eprintln!("\nWaiting for exports... (Press Ctrl+C to stop)\n");

    cancel.cancelled().await;

    // Give the listener its shutdown grace before reporting.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = server.stats();
    eprintln!("\nSession Stats:");
    eprintln!("  Received:   {}", stats.received);
    eprintln!("  Duplicates: {}", stats.duplicates);
    eprintln!("  Errors:     {}", stats.errors);
    eprintln!("\nShutdown complete");

    Ok(())
}
