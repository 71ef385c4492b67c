use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

use voxbridge::{
    AudioSink, CAPTURE_SAMPLE_RATE, ClientConfig, DEFAULT_PLAYBACK_SAMPLE_RATE, GateOutcome,
    NullSink, Session, SessionEvent, WavFileSink, WavFileSource,
};

/// voxbridge - duplex voice client for a live model with browser tool calls
#[derive(Parser, Debug)]
#[command(name = "voxbridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream a 16kHz mono WAV file as microphone input
    Run {
        /// Input WAV file (16-bit PCM, 16kHz)
        #[arg(short = 'i', long = "input")]
        input: PathBuf,

        /// Write model audio to this WAV file
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Feed the file as fast as it can be read instead of in real time
        #[arg(long = "fast")]
        fast: bool,

        /// Seconds to keep listening after the input ends
        #[arg(long = "tail", default_value_t = 10)]
        tail_secs: u64,
    },

    /// Send one text turn and play the spoken reply
    Say {
        text: String,

        /// Write model audio to this WAV file
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Seconds to wait for the reply
        #[arg(long = "timeout", default_value_t = 30)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Must happen before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        ClientConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ClientConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    match cli.command {
        Commands::Run {
            input,
            output,
            fast,
            tail_secs,
        } => run(config, input, output, fast, Duration::from_secs(tail_secs)).await,
        Commands::Say {
            text,
            output,
            timeout_secs,
        } => say(config, text, output, Duration::from_secs(timeout_secs)).await,
    }
}

/// Model audio goes to a WAV file when an output path is given.
struct Output {
    wav: Option<Arc<WavFileSink>>,
}

impl Output {
    fn new(path: Option<PathBuf>) -> Self {
        Self {
            wav: path.map(|p| Arc::new(WavFileSink::new(p, DEFAULT_PLAYBACK_SAMPLE_RATE))),
        }
    }

    fn sink(&self) -> Arc<dyn AudioSink> {
        match &self.wav {
            Some(wav) => wav.clone(),
            None => Arc::new(NullSink),
        }
    }

    fn finish(&self) -> anyhow::Result<()> {
        if let Some(wav) = &self.wav {
            wav.finalize()?;
            info!("Model audio written to {}", wav.path().display());
        }
        Ok(())
    }
}

async fn run(
    config: ClientConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    fast: bool,
    tail: Duration,
) -> anyhow::Result<()> {
    let source = WavFileSource::open(&input, CAPTURE_SAMPLE_RATE)?;
    let source = if fast { source } else { source.realtime() };

    let output = Output::new(output);
    let (session, events) = Session::builder(config)
        .audio_sink(output.sink())
        .start()
        .await?;
    let printer = tokio::spawn(print_events(events));

    session.start_capture(Box::new(source))?;

    tokio::select! {
        result = session.wait_capture() => {
            if let Some(summary) = result.transpose()? {
                info!(
                    blocks = summary.blocks,
                    segments = summary.segments,
                    sent = summary.sent,
                    "Input finished"
                );
            }
            session.wait_playback_idle(Duration::from_secs(2), tail).await;
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    let stats = session.shutdown().await;
    printer.abort();
    println!(
        "played {} chunks, discarded {}, {} intents",
        stats.played,
        stats.discarded,
        session.gate().intents().len()
    );
    output.finish()
}

async fn say(
    config: ClientConfig,
    text: String,
    output: Option<PathBuf>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let output = Output::new(output);
    let (session, mut events) = Session::builder(config)
        .audio_sink(output.sink())
        .start()
        .await?;

    session.send_text(&text).await?;

    let reply = tokio::time::timeout(timeout, async {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::TurnComplete => return true,
                SessionEvent::Closed { reason } => {
                    eprintln!("connection closed: {}", reason.unwrap_or_default());
                    return false;
                }
                other => print_event(&other),
            }
        }
        false
    })
    .await;

    if matches!(reply, Ok(true)) {
        session
            .wait_playback_idle(Duration::from_millis(800), timeout)
            .await;
    } else if reply.is_err() {
        eprintln!("no reply within {}s", timeout.as_secs());
    }

    session.shutdown().await;
    output.finish()
}

async fn print_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        print_event(&event);
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Transcript(text) => println!("model: {text}"),
        SessionEvent::Capture(voxbridge::CaptureEvent::Transcribed {
            text,
            browser_query,
            ..
        }) => {
            let marker = if *browser_query { " [browser]" } else { "" };
            println!("you: {text}{marker}");
        }
        SessionEvent::Intent(GateOutcome::Accepted(intent)) => {
            println!("intent: {} {} ({})", intent.action, intent.target, intent.raw_text);
        }
        SessionEvent::Intent(GateOutcome::Completed { text, .. }) => println!("agent: {text}"),
        SessionEvent::Intent(GateOutcome::Failed { error, .. }) => {
            eprintln!("intent failed: {error}");
        }
        SessionEvent::Notification(notification) => println!("update: {}", notification.text),
        SessionEvent::Interrupted => println!("-- interrupted --"),
        SessionEvent::Closed { reason } => {
            println!("-- closed {} --", reason.as_deref().unwrap_or(""));
        }
        _ => {}
    }
}
