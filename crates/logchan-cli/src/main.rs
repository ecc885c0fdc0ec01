use anyhow::Result;
use clap::Parser;
use logchan::{
    handlers::{tracing_handler, writer_handler},
    Dispatcher, DrainOutcome, LogFormat, LogLevel, LogWriter, LogchanConfig,
};
use logchan_http::HttpLogInfo;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(
    after_help = "Emits synthetic HTTP call events from several producer threads and prints the\ndispatcher statistics as JSON once the queue has drained."
)]
struct Cli {
    /// Configuration file path
    #[arg(long, help = "Path to configuration file")]
    config: Option<PathBuf>,

    /// Producer threads
    #[arg(short, long, default_value_t = 4)]
    producers: usize,

    /// Events sent by each producer
    #[arg(short, long, default_value_t = 25)]
    events: usize,

    /// Override the queue capacity
    #[arg(long, help = "Events buffered before new ones are dropped")]
    capacity: Option<usize>,

    /// Mark every Nth event as failed (0 disables)
    #[arg(long, default_value_t = 0)]
    fail_every: usize,

    /// Application name used in the file format
    #[arg(long)]
    app_name: Option<String>,

    /// Log file path template, e.g. `logs/{appName}-{date}.log`
    #[arg(long)]
    file_format: Option<String>,

    /// Also forward events into `tracing`
    #[arg(long)]
    forward: bool,

    /// Seconds to wait for the queue to drain
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(long, help = "Set log level")]
    log_level: Option<String>,

    /// Set log format (json, pretty, compact)
    #[arg(long, help = "Set log output format")]
    log_format: Option<String>,

    /// Disable the library's own diagnostics
    #[arg(long)]
    no_telemetry: bool,
}

#[derive(Debug)]
struct UpstreamError(usize);

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upstream returned 503 for request {}", self.0)
    }
}

impl std::error::Error for UpstreamError {}

/// Load configuration and apply CLI overrides
async fn create_config(cli: &Cli) -> Result<LogchanConfig> {
    let mut config = LogchanConfig::load(cli.config.as_deref()).await?;

    if cli.no_telemetry {
        config.telemetry.enabled = false;
    }

    if let Some(level) = &cli.log_level {
        config.telemetry.level = level.parse().unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', using default", level);
            config.telemetry.level
        });
    }

    if let Some(format) = &cli.log_format {
        config.telemetry.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                eprintln!("Invalid log format '{}', using default", format);
                config.telemetry.format
            }
        };
    }

    if let Some(capacity) = cli.capacity {
        config.dispatcher.queue_capacity = capacity;
    }
    if let Some(app_name) = &cli.app_name {
        config.dispatcher.sink.app_name = Some(app_name.clone());
    }
    if let Some(file_format) = &cli.file_format {
        config.dispatcher.sink.file_format = Some(file_format.clone());
    }

    config.validate()?;
    Ok(config)
}

fn synthetic_call(producer: usize, seq: usize, fail_every: usize) -> HttpLogInfo {
    let request = producer * 1_000_000 + seq;
    let call = if seq % 2 == 0 {
        HttpLogInfo::new("GET", format!("https://api.example.com/items?page={seq}"))
            .with_input(format!(r#"{{"producer":"{producer}"}}"#))
    } else {
        HttpLogInfo::new("POST", "https://api.example.com/items")
            .with_input(format!(r#"{{"seq":{seq}}}"#))
            .with_output(r#"{"ok":true}"#)
    };
    let call = call.with_name(format!("producer-{producer}"));

    if fail_every > 0 && (seq + 1) % fail_every == 0 {
        call.with_error(UpstreamError(request))
    } else {
        call.with_level(LogLevel::Debug)
    }
}

/// Open the event writer and a dispatcher whose panic reports share it
fn build_dispatcher(config: &LogchanConfig, forward: bool) -> Result<(Arc<Dispatcher>, LogWriter)> {
    let writer = match config.dispatcher.sink.file_format {
        Some(_) => LogWriter::open(&config.dispatcher.sink)?,
        None => LogWriter::stdout(),
    };

    let dispatcher = Arc::new(Dispatcher::with_fallback(
        config.dispatcher.clone(),
        writer.clone(),
    )?);
    dispatcher.register_handler(writer_handler(writer.clone()));
    dispatcher.register_handler_opt(forward.then(tracing_handler));

    Ok((dispatcher, writer))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before parsing configuration
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = create_config(&cli).await?;

    if let Err(e) = logchan::telemetry::init(&config.telemetry) {
        eprintln!("Failed to initialize telemetry: {}", e);
    }

    info!(
        logchan.event = "cli_started",
        producers = cli.producers,
        events = cli.events,
        capacity = config.dispatcher.queue_capacity,
        "Starting logchan demo"
    );

    let (dispatcher, writer) = build_dispatcher(&config, cli.forward)?;
    dispatcher.start()?;

    let producers: Vec<_> = (0..cli.producers)
        .map(|producer| {
            let dispatcher = Arc::clone(&dispatcher);
            let events = cli.events;
            let fail_every = cli.fail_every;
            std::thread::Builder::new()
                .name(format!("producer-{producer}"))
                .spawn(move || {
                    for seq in 0..events {
                        dispatcher.send(synthetic_call(producer, seq, fail_every));
                    }
                })
        })
        .collect::<std::io::Result<_>>()?;

    for producer in producers {
        if producer.join().is_err() {
            error!(logchan.event = "producer_panicked", "Producer thread panicked");
        }
    }

    let outcome = dispatcher
        .shutdown(Duration::from_secs(cli.timeout))
        .await;
    match outcome {
        DrainOutcome::Drained => info!(logchan.event = "drained", "All accepted events delivered"),
        DrainOutcome::TimedOut => warn!(
            logchan.event = "drain_timed_out",
            timeout_secs = cli.timeout,
            "Timed out waiting for the queue to drain"
        ),
        DrainOutcome::ConsumerStopped => {
            error!(logchan.event = "consumer_stopped", "Delivery stopped early")
        }
    }

    if let Err(e) = writer.close() {
        warn!("Failed to close log writer: {}", e);
    }

    let stats = dispatcher.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if outcome == DrainOutcome::Drained {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Dispatcher did not drain: {:?}", outcome))
    }
}
